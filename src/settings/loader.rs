//! Settings loading and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.flightlog/settings.toml` or an explicit path
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - First-run template generation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::schema::FlightlogSettings;

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Environment variables consulted for the agent API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".flightlog")
        .join("settings.toml")
}

/// Manages settings loading and interpolation.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: FlightlogSettings,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from the global path if available.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Create a SettingsManager backed by `path`.
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings,
            path,
        })
    }

    /// Load settings from a specific path.
    async fn load_from_path(path: &Path) -> Result<FlightlogSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(FlightlogSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;

        // Parse into typed struct
        let mut settings: FlightlogSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        // Resolve environment variable references
        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut FlightlogSettings) {
        fn resolve_opt(value: &mut Option<String>) {
            if let Some(v) = value {
                if v.trim().starts_with('$') {
                    // An unset reference counts as no value so env fallbacks apply.
                    *value = resolve_env_ref(v);
                }
            }
        }

        resolve_opt(&mut settings.agent.api_key);
        resolve_opt(&mut settings.agent.base_url);
    }

    /// Get the current settings (read-only).
    pub fn get(&self) -> FlightlogSettings {
        self.settings.clone()
    }

    /// Get the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false); // Already exists
        }

        // Create parent directory
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write template
        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true) // Created new file
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();

    // Check for $VAR_NAME format
    if trimmed.starts_with('$') {
        let var_name = if trimmed.starts_with("${") && trimmed.ends_with('}') {
            // ${VAR_NAME} format
            &trimmed[2..trimmed.len() - 1]
        } else {
            // $VAR_NAME format
            &trimmed[1..]
        };

        return std::env::var(var_name).ok();
    }

    None
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    // 1. Check settings value
    if let Some(v) = setting {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }

    // 2. Check environment variables
    for env_var in env_vars {
        if let Ok(v) = std::env::var(env_var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }

    // 3. Return default
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_env_ref_dollar_format() {
        std::env::set_var("FLIGHTLOG_TEST_VAR_1", "test_value_1");

        assert_eq!(
            resolve_env_ref("$FLIGHTLOG_TEST_VAR_1"),
            Some("test_value_1".to_string())
        );

        std::env::remove_var("FLIGHTLOG_TEST_VAR_1");
    }

    #[test]
    fn test_resolve_env_ref_braces_format() {
        std::env::set_var("FLIGHTLOG_TEST_VAR_2", "test_value_2");

        assert_eq!(
            resolve_env_ref("${FLIGHTLOG_TEST_VAR_2}"),
            Some("test_value_2".to_string())
        );

        std::env::remove_var("FLIGHTLOG_TEST_VAR_2");
    }

    #[test]
    fn test_resolve_env_ref_no_match() {
        assert_eq!(resolve_env_ref("regular_value"), None);
        assert_eq!(resolve_env_ref("$NONEXISTENT_VAR_XYZ_12345"), None);
    }

    #[test]
    fn test_get_with_env_fallback_from_setting() {
        let setting = Some("from_settings".to_string());
        let result = get_with_env_fallback(&setting, &["SOME_VAR"], None);
        assert_eq!(result, Some("from_settings".to_string()));
    }

    #[test]
    fn test_get_with_env_fallback_from_env() {
        std::env::set_var("FLIGHTLOG_FALLBACK_TEST_VAR", "from_env");

        let result = get_with_env_fallback(&None, &["FLIGHTLOG_FALLBACK_TEST_VAR"], None);
        assert_eq!(result, Some("from_env".to_string()));

        std::env::remove_var("FLIGHTLOG_FALLBACK_TEST_VAR");
    }

    #[test]
    fn test_get_with_env_fallback_default() {
        let result = get_with_env_fallback(
            &None,
            &["NONEXISTENT_VAR_ABC"],
            Some("default_value".to_string()),
        );
        assert_eq!(result, Some("default_value".to_string()));
    }

    #[test]
    fn test_get_with_env_fallback_empty_setting() {
        std::env::set_var("FLIGHTLOG_EMPTY_SETTING_TEST", "from_env");

        // Empty string in setting should fall through to env var
        let setting = Some("".to_string());
        let result = get_with_env_fallback(&setting, &["FLIGHTLOG_EMPTY_SETTING_TEST"], None);
        assert_eq!(result, Some("from_env".to_string()));

        std::env::remove_var("FLIGHTLOG_EMPTY_SETTING_TEST");
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let settings: FlightlogSettings = toml::from_str(TEMPLATE).unwrap();
        let defaults = FlightlogSettings::default();
        assert_eq!(settings.server.port, defaults.server.port);
        assert_eq!(settings.agent.model, defaults.agent.model);
        assert_eq!(
            settings.ingest.allowed_extensions,
            defaults.ingest.allowed_extensions
        );
        assert_eq!(settings.chat.max_result_rows, defaults.chat.max_result_rows);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        assert!(!manager.path().exists());
        let settings = manager.get();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.agent.provider, "gemini");
    }

    #[tokio::test]
    async fn test_ensure_settings_file_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        assert!(manager.ensure_settings_file().await.unwrap());
        assert!(!manager.ensure_settings_file().await.unwrap());
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, TEMPLATE);
    }

    #[tokio::test]
    async fn test_load_resolves_api_key_reference() {
        std::env::set_var("FLIGHTLOG_TEST_GEMINI_KEY", "secret");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[agent]\napi_key = \"$FLIGHTLOG_TEST_GEMINI_KEY\"\nbase_url = \"$FLIGHTLOG_UNSET_URL_XYZ\"\n",
        )
        .unwrap();

        let manager = SettingsManager::with_path(&path).await.unwrap();
        let settings = manager.get();
        assert_eq!(settings.agent.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.agent.base_url, None);

        std::env::remove_var("FLIGHTLOG_TEST_GEMINI_KEY");
    }

    #[tokio::test]
    async fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(SettingsManager::with_path(&path).await.is_err());
    }
}
