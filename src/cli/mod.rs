//! Command-line interface for flightlog.
//!
//! The CLI drives the same [`AnalysisService`](crate::analysis::AnalysisService)
//! as the HTTP server, using the fixed session id `cli`.
//!
//! ```text
//! +-----------+     +-----------------+     +---------------+
//! | runner.rs | --> | AnalysisService | --> | output.rs     |
//! | repl.rs   |     | (ingest / chat) |     | (print/JSON)  |
//! +-----------+     +-----------------+     +---------------+
//! ```
//!
//! # REPL Mode
//!
//! When no prompt is provided via `-e` or `-f`, the CLI enters
//! interactive REPL mode. See `repl.rs` for details.

mod args;
mod bootstrap;
mod output;
mod repl;
mod runner;

#[cfg(feature = "server")]
pub mod server;

pub use args::Args;
pub use bootstrap::{initialize, CliContext, CLI_SESSION_ID};
pub use output::OutputMode;
pub use repl::run_repl;
pub use runner::{execute_batch, execute_once, load_log};
