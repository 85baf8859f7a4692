//! Lightweight REPL (Read-Eval-Print-Loop) for flightlog.
//!
//! Provides an interactive mode when no prompt is provided via `-e` or `-f`.
//! Supports minimal commands:
//! - `/quit`, `/exit`, `/q` - Exit the REPL
//! - `/tables` - List the tables of the loaded log
//! - `/load <path>` - Replace the loaded log
//!
//! Any other input is sent as a question to the agent.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;

use super::bootstrap::{CliContext, CLI_SESSION_ID};
use super::runner::{execute_once, load_log};

/// REPL command variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Exit the REPL
    Quit,
    /// List tables of the active log
    Tables,
    /// Load another log file
    Load(PathBuf),
    /// Unknown command (will show help)
    Unknown(String),
    /// Regular question to send to the agent
    Prompt(String),
    /// Empty input (skip)
    Empty,
}

impl ReplCommand {
    /// Parse user input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return ReplCommand::Empty;
        }

        if trimmed.starts_with('/') {
            let (command, rest) = match trimmed.split_once(char::is_whitespace) {
                Some((command, rest)) => (command, rest.trim()),
                None => (trimmed, ""),
            };
            match command.to_lowercase().as_str() {
                "/quit" | "/exit" | "/q" => ReplCommand::Quit,
                "/tables" => ReplCommand::Tables,
                "/load" if !rest.is_empty() => ReplCommand::Load(PathBuf::from(rest)),
                _ => ReplCommand::Unknown(trimmed.to_string()),
            }
        } else {
            ReplCommand::Prompt(trimmed.to_string())
        }
    }
}

fn print_tables(ctx: &CliContext) {
    let tables = ctx
        .service
        .sessions()
        .get(CLI_SESSION_ID)
        .map(|session| session.snapshot().tables)
        .unwrap_or_default();
    if tables.is_empty() {
        eprintln!("No log loaded");
    } else {
        eprintln!("{}", tables.join(", "));
    }
}

/// Run an interactive REPL session.
///
/// Returns when the user exits or on EOF (Ctrl+D).
pub async fn run_repl(ctx: &CliContext) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    // Print banner
    eprintln!("flightlog interactive mode");
    eprintln!("Type /tables to list tables, /quit to exit\n");

    loop {
        // Print prompt
        print!("> ");
        stdout.flush()?;

        // Read line
        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF (Ctrl+D)
            eprintln!("\nGoodbye!");
            break;
        }

        match ReplCommand::parse(&input) {
            ReplCommand::Empty => {
                continue;
            }
            ReplCommand::Quit => {
                eprintln!("Goodbye!");
                break;
            }
            ReplCommand::Tables => print_tables(ctx),
            ReplCommand::Load(path) => {
                if let Err(e) = load_log(ctx, &path).await {
                    eprintln!("Error: {}", e);
                }
            }
            ReplCommand::Unknown(cmd) => {
                eprintln!("Unknown command: {}", cmd);
                eprintln!("Available: /tables, /load <path>, /quit, /exit, /q");
                continue;
            }
            ReplCommand::Prompt(prompt) => {
                if let Err(e) = execute_once(ctx, &prompt).await {
                    eprintln!("Error: {}", e);
                }

                println!(); // Blank line between interactions
            }
        }
    }

    Ok(())
}
