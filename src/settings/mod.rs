//! TOML-based settings for flightlog.
//!
//! Settings are loaded from `~/.flightlog/settings.toml` (or `--config`) with
//! environment variable interpolation support. Secrets that are not in the
//! file fall back to environment variables through `get_with_env_fallback`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flightlog_lib::settings::{get_with_env_fallback, SettingsManager, API_KEY_ENV_VARS};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get();
//!
//! let api_key = get_with_env_fallback(&settings.agent.api_key, API_KEY_ENV_VARS, None);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager, API_KEY_ENV_VARS};
pub use schema::{
    AdvancedSettings, AgentSettings, ChatSettings, FlightlogSettings, IngestSettings,
    ServerSettings,
};
