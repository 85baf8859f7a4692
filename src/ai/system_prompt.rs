//! System instruction building for the log analysis agent.
//!
//! The instruction embeds a schema summary so the agent knows which logical
//! tables and columns it can query, plus the directive syntax it must use.

use std::collections::BTreeMap;

use chrono::Local;

use super::directive::QUERY_MARKER;
use super::orchestrator::MAX_QUERY_ATTEMPTS;

/// Used when the schema of an ingested log could not be read.
pub const SCHEMA_UNAVAILABLE: &str =
    "Could not retrieve data schema information for the log file.";

/// Human-readable listing of logical tables and their columns.
pub fn schema_summary(schema: &BTreeMap<String, Vec<String>>) -> String {
    let mut lines = vec!["Available telemetry message tables and their columns:".to_string()];
    for (table, columns) in schema {
        lines.push(format!("- {}: {}", table, columns.join(", ")));
    }
    lines.join("\n")
}

/// Build the system instruction for a freshly ingested log.
pub fn build_system_instruction(filename: &str, schema_summary: &str) -> String {
    let date = Local::now().format("%Y-%m-%d");

    format!(
        r#"You are a flight telemetry analysis assistant. You help users investigate a parsed vehicle log conversationally and analytically.

## Log
- **File**: {filename}
- **Date**: {date}

{schema_summary}

## Querying
- The tables above live in a SQLite database. To run a query, reply with a line of the form `{marker}<one SELECT statement>`; nothing else on that line.
- Only single read-only SELECT statements are accepted. Use the table names exactly as listed.
- You will receive the rows (or the error) and can then answer or correct the query.
- At most {attempts} queries are allowed per question. If the answer cannot be resolved within that budget, say so.
- Request as little data as possible: aggregate (MIN, MAX, AVG, COUNT) and filter instead of selecting whole tables.

## Behavior
- Check the available tables before answering. If a table is missing, empty or the data looks bad, say that you cannot answer.
- Do not fabricate telemetry. When you infer something, explain the reasoning.
- ArduPilot logs use types like GPS, ATT, BAT, MODE, MSG, ERR, VIBE and PARM; PX4 logs use uORB topic names such as vehicle_gps_position or battery_status, plus LOGGING for text messages.
- When asked about anomalies, look for sudden altitude changes, GPS inconsistency, battery problems, RC loss, error messages and mode changes.
- Ask clarifying questions when needed. Be concise."#,
        filename = filename,
        date = date,
        schema_summary = schema_summary,
        marker = QUERY_MARKER,
        attempts = MAX_QUERY_ATTEMPTS,
    )
}
