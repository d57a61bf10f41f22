//! Pipeline configuration
//!
//! Build metadata, the reporting client identifier and the timings used by
//! the reporter and notifier. Loaded from a JSON file, from environment
//! variables, or taken from defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{boundary, defaults, limits, markers, timing};
use crate::error::ConfigError;

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Runtime mode (e.g. "development", "production")
    pub environment: String,
    pub app_version: String,
    pub build_hash: String,
    pub build_time: String,
    /// Client identifier for the crash-reporting service
    ///
    /// When absent, reports go to local diagnostics only.
    pub reporter_dsn: Option<String>,
    /// Origin used to resolve relative API endpoints
    pub page_origin: String,
    pub toast_duration_ms: u64,
    pub dedup_window_secs: u64,
    pub max_retries: u32,
    /// Characters of a response body kept in API envelopes
    pub response_body_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: defaults::ENVIRONMENT.to_string(),
            app_version: defaults::APP_VERSION.to_string(),
            build_hash: markers::UNKNOWN.to_string(),
            build_time: markers::UNKNOWN.to_string(),
            reporter_dsn: None,
            page_origin: defaults::PAGE_ORIGIN.to_string(),
            toast_duration_ms: timing::TOAST_DURATION_MS,
            dedup_window_secs: timing::DEDUP_WINDOW_SECS,
            max_retries: boundary::MAX_RETRIES,
            response_body_limit: limits::RESPONSE_BODY_CHARS,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `dir/fault-relay.json`
    ///
    /// A missing file yields the defaults.
    pub async fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = dir.join(defaults::CONFIG_FILE);

        if !fs::try_exists(&config_path).await? {
            log::debug!("No config at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path).await?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration to `dir/fault-relay.json`
    pub async fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(dir).await?;

        let config_path = dir.join(defaults::CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(&config_path, contents).await?;

        log::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Defaults overridden by `APP_ENV`, `APP_VERSION`, `APP_BUILD_HASH`,
    /// `APP_BUILD_TIME`, `REPORTER_DSN` and `APP_ORIGIN`
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply the same environment overrides on top of `self`
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = lookup("APP_ENV") {
            self.environment = v;
        }
        if let Some(v) = lookup("APP_VERSION") {
            self.app_version = v;
        }
        if let Some(v) = lookup("APP_BUILD_HASH") {
            self.build_hash = v;
        }
        if let Some(v) = lookup("APP_BUILD_TIME") {
            self.build_time = v;
        }
        if let Some(v) = lookup("REPORTER_DSN") {
            self.reporter_dsn = Some(v);
        }
        if let Some(v) = lookup("APP_ORIGIN") {
            self.page_origin = v;
        }
        self
    }

    /// Whether a crash-reporting client should be used
    pub fn has_reporter(&self) -> bool {
        self.reporter_dsn
            .as_deref()
            .is_some_and(|dsn| !dsn.trim().is_empty())
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.toast_duration_ms, 5000);
        assert_eq!(config.dedup_window(), Duration::from_secs(300));
        assert_eq!(config.max_retries, 3);
        assert!(!config.has_reporter());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("APP_VERSION", "2.1.0"),
            ("REPORTER_DSN", "https://key@example.invalid/1"),
            ("APP_BUILD_HASH", "  "),
        ]
        .into_iter()
        .collect();
        let config =
            PipelineConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.app_version, "2.1.0");
        assert!(config.has_reporter());
        // Blank values are ignored
        assert_eq!(config.build_hash, "unknown");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = tokio_test::block_on(PipelineConfig::load(dir.path())).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            environment: "production".to_string(),
            max_retries: 5,
            ..Default::default()
        };
        config.save(dir.path()).await.unwrap();

        let loaded = PipelineConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("fault-relay.json"),
            r#"{"app_version": "3.0.0"}"#,
        )
        .unwrap();
        let loaded = PipelineConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.app_version, "3.0.0");
        assert_eq!(loaded.toast_duration_ms, 5000);
    }

    #[tokio::test]
    async fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fault-relay.json"), "not json").unwrap();
        let err = PipelineConfig::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
