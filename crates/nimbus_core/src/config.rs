//! Console configuration.
//!
//! Settings are read from `<workspace>/.nimbus/settings.toml` when present and
//! then overridden by environment variables:
//!
//! - `NIMBUS_API_URL`: base URL of the REST API
//! - `NIMBUS_WS_URL`: URL of the real-time event stream
//! - `NIMBUS_RECONNECT_MS`: fixed delay before a reconnect attempt

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_RECONNECT_MS: u64 = 3000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Shortest reconnect delay the builder and accessor allow.
pub const MIN_RECONNECT_MS: u64 = 100;

/// Runtime configuration for a console client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Base URL of the REST API (no trailing slash)
    pub api_base_url: String,
    /// URL of the real-time event stream
    pub ws_url: String,
    /// Delay before a reconnect attempt, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Per-request timeout, in seconds
    pub request_timeout_secs: u64,
    /// Path of the durable client storage file
    pub storage_path: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_MS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            storage_path: PathBuf::from(".nimbus").join("storage.json"),
        }
    }
}

impl ConsoleConfig {
    /// Load settings for a workspace, then apply environment overrides.
    pub fn load(workspace_root: &Path) -> CoreResult<Self> {
        let settings_path = workspace_root.join(".nimbus").join("settings.toml");

        let mut config = if settings_path.exists() {
            debug!("Loading settings from {}", settings_path.display());
            let content = std::fs::read_to_string(&settings_path)?;
            toml::from_str::<ConsoleConfig>(&content)
                .map_err(|e| CoreError::Config(format!("{}: {}", settings_path.display(), e)))?
        } else {
            Self::default()
        };

        if config.storage_path.is_relative() {
            config.storage_path = workspace_root.join(&config.storage_path);
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Apply `NIMBUS_*` environment overrides.
    pub fn apply_env(&mut self) -> CoreResult<()> {
        if let Ok(url) = std::env::var("NIMBUS_API_URL") {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(url) = std::env::var("NIMBUS_WS_URL") {
            if !url.is_empty() {
                self.ws_url = url;
            }
        }
        if let Ok(ms) = std::env::var("NIMBUS_RECONNECT_MS") {
            self.reconnect_delay_ms = ms
                .parse()
                .map_err(|_| CoreError::Config(format!("NIMBUS_RECONNECT_MS is not a number: {}", ms)))?;
        }
        if self.reconnect_delay_ms == 0 {
            return Err(CoreError::Config(
                "reconnect_delay_ms must be greater than zero".to_string(),
            ));
        }
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis())
            .unwrap_or(u64::MAX)
            .max(MIN_RECONNECT_MS);
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.max(MIN_RECONNECT_MS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempdir().unwrap();
        let nimbus_dir = dir.path().join(".nimbus");
        std::fs::create_dir_all(&nimbus_dir).unwrap();
        std::fs::write(
            nimbus_dir.join("settings.toml"),
            "api_base_url = \"https://console.example.com/\"\nreconnect_delay_ms = 500\n",
        )
        .unwrap();

        let mut config = ConsoleConfig::load(dir.path()).unwrap();
        // Env may be set on the host; only check file-driven fields when it isn't.
        if std::env::var("NIMBUS_API_URL").is_err() {
            assert_eq!(config.api_base_url, "https://console.example.com");
        }
        if std::env::var("NIMBUS_RECONNECT_MS").is_err() {
            assert_eq!(config.reconnect_delay_ms, 500);
        }
        assert_eq!(config.storage_path, dir.path().join(".nimbus").join("storage.json"));

        config = config.with_api_url("http://other:9000/");
        assert_eq!(config.api_base_url, "http://other:9000");
    }

    #[test]
    fn test_zero_reconnect_delay_is_rejected() {
        let dir = tempdir().unwrap();
        let nimbus_dir = dir.path().join(".nimbus");
        std::fs::create_dir_all(&nimbus_dir).unwrap();
        std::fs::write(nimbus_dir.join("settings.toml"), "reconnect_delay_ms = 0\n").unwrap();

        if std::env::var("NIMBUS_RECONNECT_MS").is_err() {
            let err = ConsoleConfig::load(dir.path()).unwrap_err();
            assert!(matches!(err, CoreError::Config(_)));
        }

        let config = ConsoleConfig {
            reconnect_delay_ms: 0,
            ..ConsoleConfig::default()
        };
        assert_eq!(config.reconnect_delay(), Duration::from_millis(MIN_RECONNECT_MS));
    }

    #[test]
    fn test_reconnect_delay_builder_clamps() {
        let config = ConsoleConfig::default().with_reconnect_delay(Duration::ZERO);
        assert_eq!(config.reconnect_delay_ms, MIN_RECONNECT_MS);

        let config = ConsoleConfig::default().with_reconnect_delay(Duration::MAX);
        assert_eq!(config.reconnect_delay_ms, u64::MAX);

        let config = ConsoleConfig::default().with_reconnect_delay(Duration::from_millis(750));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(750));
    }

    #[test]
    fn test_invalid_settings_file() {
        let dir = tempdir().unwrap();
        let nimbus_dir = dir.path().join(".nimbus");
        std::fs::create_dir_all(&nimbus_dir).unwrap();
        std::fs::write(nimbus_dir.join("settings.toml"), "reconnect_delay_ms = \"soon\"").unwrap();

        let err = ConsoleConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
