//! CLI output rendering for ingestion summaries and answers.
//!
//! Three modes: terminal (answer on stdout, progress on stderr), JSON lines
//! on stdout, and quiet (answer only).

use std::io::{self, Write};

use anyhow::Result;
use serde_json::json;

use crate::ai::{AttemptOutcome, ChatOutcome};
use crate::analysis::IngestOutcome;

/// Output mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Terminal,
    Json,
    Quiet,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Terminal
        }
    }
}

/// One-line description of an ingested log.
pub fn ingest_summary(outcome: &IngestOutcome) -> String {
    let mut line = format!(
        "Loaded {} ({:?}): {} records into {} tables",
        outcome.filename,
        outcome.format,
        outcome.report.records_decoded,
        outcome.report.tables_created.len()
    );
    if outcome.skipped_frames > 0 {
        line.push_str(&format!(", {} corrupt frames skipped", outcome.skipped_frames));
    }
    if !outcome.report.failed_tables.is_empty() {
        let failed: Vec<&str> = outcome
            .report
            .failed_tables
            .iter()
            .map(|f| f.table.as_str())
            .collect();
        line.push_str(&format!(", not stored: {}", failed.join(", ")));
    }
    line
}

/// JSON line describing an answered prompt.
pub fn answer_json(prompt: &str, outcome: &ChatOutcome) -> serde_json::Value {
    json!({
        "type": "answer",
        "prompt": prompt,
        "answer": outcome.answer,
        "queries_executed": outcome.queries_executed(),
        "retry_budget_exhausted": outcome.retry_budget_exhausted,
        "attempts": outcome.attempts,
    })
}

fn describe_attempt(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Success { rows, truncated } => {
            let suffix = if *truncated { " (truncated)" } else { "" };
            format!("{} row(s){}", rows, suffix)
        }
        AttemptOutcome::Failure { error } => format!("failed: {}", error),
    }
}

pub fn print_ingest(outcome: &IngestOutcome, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Json => {
            let mut value = serde_json::to_value(outcome)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("type".to_string(), json!("ingest"));
            }
            println!("{}", value);
            io::stdout().flush()?;
        }
        OutputMode::Terminal => eprintln!("{}", ingest_summary(outcome)),
        OutputMode::Quiet => {}
    }
    Ok(())
}

pub fn print_answer(prompt: &str, outcome: &ChatOutcome, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Json => {
            println!("{}", answer_json(prompt, outcome));
        }
        OutputMode::Terminal => {
            for (i, attempt) in outcome.attempts.iter().enumerate() {
                eprintln!(
                    "[query {}] {} -> {}",
                    i + 1,
                    attempt.sql,
                    describe_attempt(&attempt.outcome)
                );
            }
            println!("{}", outcome.answer);
        }
        OutputMode::Quiet => println!("{}", outcome.answer),
    }
    io::stdout().flush()?;
    Ok(())
}
