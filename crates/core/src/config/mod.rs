//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TAGPURGE_*)
//! 2. TOML config file (if TAGPURGE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TAGPURGE_*)
/// 2. TOML config file (if TAGPURGE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite tag index.
    ///
    /// Set via TAGPURGE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Bearer token for the cache provider's management API.
    ///
    /// Set via TAGPURGE_API_TOKEN environment variable.
    /// Needs zone read and cache purge permissions.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Base URL of the cache provider's management API.
    ///
    /// Set via TAGPURGE_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// User-Agent string for upstream requests.
    ///
    /// Set via TAGPURGE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upstream request timeout in milliseconds.
    ///
    /// Set via TAGPURGE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Base of the exponential retry delay, in seconds.
    ///
    /// Set via TAGPURGE_BACKOFF_BASE environment variable.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Maximum messages per enqueue when fanning tags out into URL purges.
    ///
    /// Set via TAGPURGE_SEND_BATCH_SIZE environment variable.
    #[serde(default = "default_send_batch_size")]
    pub send_batch_size: usize,

    /// Maximum URLs per upstream purge call. Unset means one call per zone.
    ///
    /// Set via TAGPURGE_MAX_URLS_PER_PURGE environment variable.
    #[serde(default)]
    pub max_urls_per_purge: Option<usize>,

    /// Maximum messages handed to a stage in one batch.
    ///
    /// Set via TAGPURGE_MAX_BATCH_SIZE environment variable.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// How long a consumer waits to fill a batch, in milliseconds.
    ///
    /// Set via TAGPURGE_MAX_BATCH_TIMEOUT_MS environment variable.
    #[serde(default = "default_max_batch_timeout_ms")]
    pub max_batch_timeout_ms: u64,

    /// Deliveries before a message is dead-lettered.
    ///
    /// Set via TAGPURGE_MAX_RETRIES environment variable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tagpurge-index.sqlite")
}

fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".into()
}

fn default_user_agent() -> String {
    "tagpurge/0.1".into()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_backoff_base() -> u64 {
    15
}

fn default_send_batch_size() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    10
}

fn default_max_batch_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_token: None,
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            backoff_base: default_backoff_base(),
            send_batch_size: default_send_batch_size(),
            max_urls_per_purge: None,
            max_batch_size: default_max_batch_size(),
            max_batch_timeout_ms: default_max_batch_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Batch fill window as Duration.
    pub fn max_batch_timeout(&self) -> Duration {
        Duration::from_millis(self.max_batch_timeout_ms)
    }

    /// Retry policy built from `backoff_base`.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_base)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TAGPURGE_`
    /// 2. TOML file from `TAGPURGE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TAGPURGE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TAGPURGE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check that the provider API token is available.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the token is not set.
    pub fn require_api_token(&self) -> Result<&str, ConfigError> {
        self.api_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "api_token".into(),
                hint: "Set TAGPURGE_API_TOKEN environment variable".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./tagpurge-index.sqlite"));
        assert_eq!(config.api_base_url, "https://api.cloudflare.com/client/v4");
        assert_eq!(config.user_agent, "tagpurge/0.1");
        assert_eq!(config.timeout_ms, 10_000);
        assert_eq!(config.backoff_base, 15);
        assert_eq!(config.send_batch_size, 100);
        assert!(config.max_urls_per_purge.is_none());
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.max_retries, 3);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(10_000));
        assert_eq!(config.max_batch_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_backoff_uses_configured_base() {
        let config = AppConfig { backoff_base: 2, ..Default::default() };
        assert_eq!(config.backoff().delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_require_api_token_missing() {
        let config = AppConfig::default();
        let result = config.require_api_token();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_api_token_empty() {
        let config = AppConfig { api_token: Some(String::new()), ..Default::default() };
        assert!(config.require_api_token().is_err());
    }

    #[test]
    fn test_require_api_token_present() {
        let config = AppConfig { api_token: Some("test-token".into()), ..Default::default() };
        let result = config.require_api_token();
        assert_eq!(result.unwrap(), "test-token");
    }
}
