//! CLI execution runner.
//!
//! Loads a log into the CLI session and answers prompts against it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};

use crate::analysis::IngestOutcome;

use super::bootstrap::{CliContext, CLI_SESSION_ID};
use super::output::{print_answer, print_ingest, OutputMode};

impl CliContext {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_flags(self.args.json, self.args.quiet)
    }
}

/// Ingest `path` into the CLI session, replacing any previously loaded log.
pub async fn load_log(ctx: &CliContext, path: &Path) -> Result<IngestOutcome> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow::anyhow!("Log path has no file name: {}", path.display()))?
        .to_string();

    let file =
        File::open(path).with_context(|| format!("Failed to open log: {}", path.display()))?;

    let outcome = ctx
        .service
        .ingest_log(CLI_SESSION_ID, &filename, BufReader::new(file))
        .await?;

    print_ingest(&outcome, ctx.output_mode())?;
    Ok(outcome)
}

/// Answer a single prompt and print the result.
pub async fn execute_once(ctx: &CliContext, prompt: &str) -> Result<()> {
    let outcome = ctx.service.chat(CLI_SESSION_ID, prompt, None).await?;
    print_answer(prompt, &outcome, ctx.output_mode())
}

/// Execute prompts from a file, one per line.
///
/// Each non-empty, non-comment line is executed sequentially.
/// Lines starting with `#` are treated as comments.
/// Execution stops on first error.
pub async fn execute_batch(ctx: &CliContext, file_path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .with_context(|| format!("Failed to read prompt file: {}", file_path.display()))?;

    let prompts = parse_prompts(&content);
    if prompts.is_empty() {
        anyhow::bail!("No prompts found in file: {}", file_path.display());
    }

    let verbose = ctx.output_mode() == OutputMode::Terminal;
    let total = prompts.len();
    if verbose {
        eprintln!(
            "[batch] Executing {} prompt(s) from {}",
            total,
            file_path.display()
        );
    }

    for (i, prompt) in prompts.iter().enumerate() {
        if verbose {
            eprintln!(
                "\n[batch] [{}/{}] Executing: {}",
                i + 1,
                total,
                truncate(prompt, 50)
            );
        }

        execute_once(ctx, prompt).await?;
    }

    if verbose {
        eprintln!("\n[batch] All {} prompt(s) completed successfully", total);
    }

    Ok(())
}

fn parse_prompts(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Truncate a string for display
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::Args;
    use crate::cli::bootstrap::initialize;
    use clap::Parser;

    #[test]
    fn test_parse_prompts_skips_comments_and_blanks() {
        let content = "# questions\nMax altitude?\n\n   \n  Battery low?  \n#skip\n";
        assert_eq!(parse_prompts(content), vec!["Max altitude?", "Battery low?"]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 50), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }

    async fn context(dir: &Path, log: &Path) -> CliContext {
        let config = dir.join("settings.toml");
        std::fs::write(&config, "version = 1\n").unwrap();
        let args = Args::parse_from([
            "flightlog",
            log.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--quiet",
        ]);
        initialize(&args).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_log_from_file() {
        use crate::telemetry::test_support::{DataFlashWriter, Field};

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("flight.bin");
        let mut w = DataFlashWriter::new();
        w.define(10, "ALT", "i", "alt");
        w.write(10, &[Field::I(10)]);
        std::fs::write(&log, w.finish()).unwrap();

        let ctx = context(dir.path(), &log).await;
        let outcome = load_log(&ctx, &log).await.unwrap();
        assert_eq!(outcome.filename, "flight.bin");
        assert!(outcome.report.tables_created.contains(&"ALT".to_string()));
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_log_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("notes.txt");
        std::fs::write(&log, b"hello").unwrap();

        let ctx = context(dir.path(), &log).await;
        let err = load_log(&ctx, &log).await.unwrap_err();
        assert!(err.to_string().contains("Invalid file type"));
    }

    #[tokio::test]
    async fn test_batch_requires_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("flight.bin");
        let prompts = dir.path().join("prompts.txt");
        std::fs::write(&prompts, "# nothing here\n").unwrap();

        let ctx = context(dir.path(), &log).await;
        let err = execute_batch(&ctx, &prompts).await.unwrap_err();
        assert!(err.to_string().contains("No prompts found"));
    }
}
