//! Settings schema definitions for flightlog.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Root settings structure.
///
/// Loaded from `~/.flightlog/settings.toml` with environment variable interpolation support.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightlogSettings {
    /// Schema version for migrations
    pub version: u32,

    /// HTTP server settings
    pub server: ServerSettings,

    /// Reasoning agent settings
    pub agent: AgentSettings,

    /// Log ingestion settings
    pub ingest: IngestSettings,

    /// Chat request settings
    pub chat: ChatSettings,

    /// Advanced/debug settings
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_sessions: usize,
    /// Idle time after which a session and its tables are released
    pub session_ttl_secs: u64,
    /// Upload body limit in megabytes
    pub max_upload_mb: usize,
    pub cors_origins: Vec<String>,
}

/// Reasoning agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Only "gemini" is supported
    pub provider: String,

    pub model: String,

    /// API key (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom base URL for the provider API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Accepted upload extensions, lowercase without the dot
    pub allowed_extensions: Vec<String>,
    /// Rows buffered per message type before they are written
    pub batch_rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Rows of each query result shown to the agent
    pub max_result_rows: usize,
    /// Per-request deadline
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Log level: "error" | "warn" | "info" | "debug" | "trace"
    pub log_level: String,
}

impl Default for FlightlogSettings {
    fn default() -> Self {
        Self {
            version: 1,
            server: ServerSettings::default(),
            agent: AgentSettings::default(),
            ingest: IngestSettings::default(),
            chat: ChatSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_sessions: 10,
            session_ttl_secs: 30 * 60,
            max_upload_mb: 512,
            cors_origins: vec!["http://localhost:8080".to_string()],
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            request_timeout_secs: 60,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            allowed_extensions: ["bin", "log", "tlog", "ulg", "px4log"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            batch_rows: 5_000,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_result_rows: 200,
            timeout_secs: 120,
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
