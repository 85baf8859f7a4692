//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for flightlog.

use clap::Parser;
use std::path::PathBuf;

/// flightlog - Ask questions about vehicle telemetry logs
#[derive(Parser, Debug, Clone)]
#[command(name = "flightlog")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Telemetry log to analyze (.bin, .log, .tlog, .ulg, .px4log)
    #[arg(required_unless_present = "server")]
    pub log: Option<PathBuf>,

    /// Ask a single question and exit
    #[arg(short = 'e', long, conflicts_with = "file")]
    pub execute: Option<String>,

    /// Ask questions from a file (one per line) and exit
    #[arg(short = 'f', long, conflicts_with = "execute")]
    pub file: Option<PathBuf>,

    /// Run the HTTP server instead of analyzing a local log
    #[arg(long, conflicts_with_all = ["log", "execute", "file"])]
    pub server: bool,

    /// Server bind address (overrides settings)
    #[arg(long, requires = "server")]
    pub host: Option<String>,

    /// Server port (overrides settings)
    #[arg(long, requires = "server")]
    pub port: Option<u16>,

    /// Settings file (default: ~/.flightlog/settings.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Override model from settings
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// API key (overrides settings and env vars)
    #[arg(long, env = "FLIGHTLOG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output results as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Only output final answers
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Args {
    /// Resolve the log path, checking that it is a readable file.
    pub fn resolve_log(&self) -> anyhow::Result<PathBuf> {
        let log = self
            .log
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No log file given"))?;

        let canonical = log.canonicalize().map_err(|e| {
            anyhow::anyhow!(
                "Log '{}' does not exist or is not accessible: {}",
                log.display(),
                e
            )
        })?;

        if !canonical.is_file() {
            anyhow::bail!("Log '{}' is not a file", canonical.display());
        }

        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["flightlog", "flight.bin"]);
        assert_eq!(args.log, Some(PathBuf::from("flight.bin")));
        assert!(!args.server);
        assert!(!args.json);
        assert!(!args.quiet);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_execute_flag() {
        let args = Args::parse_from(["flightlog", "flight.ulg", "-e", "Max altitude?"]);
        assert_eq!(args.execute, Some("Max altitude?".to_string()));
    }

    #[test]
    fn test_args_execute_and_file_conflict() {
        let result = Args::try_parse_from(["flightlog", "a.bin", "-e", "q", "-f", "q.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_args_log_required_without_server() {
        assert!(Args::try_parse_from(["flightlog"]).is_err());
    }

    #[test]
    fn test_args_server_mode() {
        let args = Args::parse_from(["flightlog", "--server", "--port", "9000"]);
        assert!(args.server);
        assert_eq!(args.port, Some(9000));
        assert!(args.log.is_none());
    }

    #[test]
    fn test_args_server_rejects_log() {
        assert!(Args::try_parse_from(["flightlog", "--server", "a.bin"]).is_err());
    }

    #[test]
    fn test_args_port_requires_server() {
        assert!(Args::try_parse_from(["flightlog", "a.bin", "--port", "9000"]).is_err());
    }

    #[test]
    fn test_args_output_modes() {
        let args = Args::parse_from(["flightlog", "a.bin", "--json", "--quiet"]);
        assert!(args.json);
        assert!(args.quiet);
    }

    #[test]
    fn test_resolve_log_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flight.bin");

        let args = Args::parse_from(["flightlog", path.to_str().unwrap()]);
        assert!(args.resolve_log().is_err());

        std::fs::write(&path, [0xA3, 0x95]).unwrap();
        assert_eq!(args.resolve_log().unwrap(), path.canonicalize().unwrap());

        let args = Args::parse_from(["flightlog", dir.path().to_str().unwrap()]);
        assert!(args.resolve_log().is_err());
    }
}
