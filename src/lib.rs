//! Telemetry log ingestion and LLM-driven analysis.
//!
//! A log is decoded ([`telemetry`]) into per-message-type tables of an
//! embedded SQL store ([`store`]). Questions are answered by a reasoning
//! agent that may request `QUERY DB:` statements against those tables
//! ([`ai`]). [`analysis`] ties both together behind per-caller sessions
//! used by the CLI and the HTTP server.

pub mod ai;
pub mod analysis;
pub mod error;
pub mod settings;
pub mod store;
pub mod telemetry;

#[cfg(feature = "cli")]
pub mod cli;
