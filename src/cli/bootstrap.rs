//! CLI bootstrap - Initialize settings, logging and the analysis service.
//!
//! The same `CliContext` backs one-shot, batch, REPL and server modes.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::analysis::AnalysisService;
use crate::error::AnalysisError;
use crate::settings::{FlightlogSettings, SettingsManager};

use super::args::Args;

/// Session id used for logs analyzed from the command line.
pub const CLI_SESSION_ID: &str = "cli";

/// Context for CLI execution containing all initialized services.
pub struct CliContext {
    /// Ingestion and chat boundaries
    pub service: Arc<AnalysisService>,

    /// Settings manager
    pub settings_manager: Arc<SettingsManager>,

    /// Effective settings (file + command-line overrides)
    pub settings: FlightlogSettings,

    /// Command-line arguments
    pub args: Args,
}

impl CliContext {
    /// Graceful shutdown - release the CLI session's tables.
    pub async fn shutdown(self) -> Result<()> {
        match self.service.delete_session(CLI_SESSION_ID).await {
            Ok(()) | Err(AnalysisError::SessionNotFound(_)) => Ok(()),
            Err(e) => {
                tracing::warn!("Failed to release CLI session: {}", e);
                Ok(())
            }
        }
    }
}

/// Apply command-line overrides on top of the loaded settings.
pub fn apply_overrides(settings: &mut FlightlogSettings, args: &Args) {
    if let Some(ref model) = args.model {
        settings.agent.model = model.clone();
    }
    if let Some(ref host) = args.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
}

fn init_tracing(args: &Args, settings: &FlightlogSettings) {
    let log_level = if args.verbose {
        "debug"
    } else {
        settings.advanced.log_level.as_str()
    };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in ["flightlog", "gemini_rest"] {
        match format!("{}={}", target, log_level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("[cli] Ignoring log level '{}': {}", log_level, e),
        }
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initialize the CLI context with all services.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        // Only warn on errors other than file not found
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("[cli] Failed to load .env file: {}", e);
        }
    }

    // Load settings
    let settings_manager = Arc::new(
        match args.config {
            Some(ref path) => SettingsManager::with_path(path).await,
            None => SettingsManager::new().await,
        }
        .context("Failed to initialize settings manager")?,
    );

    let mut settings = settings_manager.get();
    apply_overrides(&mut settings, args);

    // Initialize logging based on verbosity
    init_tracing(args, &settings);

    // Ensure settings file exists (creates template on first run)
    if let Err(e) = settings_manager.ensure_settings_file().await {
        tracing::warn!("Failed to create settings template: {}", e);
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
        eprintln!("[cli] Agent provider: {}", settings.agent.provider);
        eprintln!("[cli] Agent model: {}", settings.agent.model);
    }

    let service = AnalysisService::from_settings(&settings, args.api_key.clone())
        .context("Failed to initialize analysis service")?;

    if args.verbose {
        eprintln!("[cli] Agent: {}", service.agent_description());
    }

    Ok(CliContext {
        service: Arc::new(service),
        settings_manager,
        settings,
        args: args.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_overrides_replace_settings() {
        let args = Args::parse_from([
            "flightlog",
            "--server",
            "--host",
            "0.0.0.0",
            "--port",
            "9001",
            "-m",
            "gemini-1.5-pro",
        ]);
        let mut settings = FlightlogSettings::default();
        apply_overrides(&mut settings, &args);

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.agent.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_no_overrides_keep_settings() {
        let args = Args::parse_from(["flightlog", "a.bin"]);
        let mut settings = FlightlogSettings::default();
        apply_overrides(&mut settings, &args);

        assert_eq!(settings.server.port, FlightlogSettings::default().server.port);
        assert_eq!(settings.agent.model, "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn test_initialize_with_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("settings.toml");
        std::fs::write(&config, "[chat]\nmax_result_rows = 7\n").unwrap();

        let args = Args::parse_from([
            "flightlog",
            "a.bin",
            "--config",
            config.to_str().unwrap(),
            "--api-key",
            "test-key",
        ]);
        let ctx = initialize(&args).await.unwrap();

        assert_eq!(ctx.settings.chat.max_result_rows, 7);
        assert_eq!(ctx.service.config().max_result_rows, 7);
        assert!(ctx.service.agent_available());
        ctx.shutdown().await.unwrap();
    }
}
