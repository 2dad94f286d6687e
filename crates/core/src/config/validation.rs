//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Upstream ceiling on messages per enqueue call.
const MAX_SEND_BATCH_SIZE: usize = 100;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `backoff_base` is below 2 (delays would not grow)
    /// - `send_batch_size` is 0 or exceeds 100
    /// - `max_urls_per_purge` is set to 0
    /// - `max_batch_size` is 0 or exceeds 100
    /// - `max_retries` is 0, or large enough that retry delays stop growing
    /// - `api_base_url` is not an absolute http(s) URL
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.backoff_base < 2 {
            return Err(ConfigError::Invalid {
                field: "backoff_base".into(),
                reason: "must be at least 2 so retry delays increase".into(),
            });
        }

        if self.send_batch_size == 0 || self.send_batch_size > MAX_SEND_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                field: "send_batch_size".into(),
                reason: format!("must be between 1 and {MAX_SEND_BATCH_SIZE}"),
            });
        }

        if self.max_urls_per_purge == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_urls_per_purge".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_SEND_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                field: "max_batch_size".into(),
                reason: format!("must be between 1 and {MAX_SEND_BATCH_SIZE}"),
            });
        }

        if self.max_retries == 0 {
            return Err(ConfigError::Invalid { field: "max_retries".into(), reason: "must be at least 1".into() });
        }

        let max_attempt = self.backoff().max_attempt();
        if self.max_retries > max_attempt {
            return Err(ConfigError::Invalid {
                field: "max_retries".into(),
                reason: format!("must not exceed {max_attempt} for backoff_base {}", self.backoff_base),
            });
        }

        match url::Url::parse(&self.api_base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(ConfigError::Invalid {
                    field: "api_base_url".into(),
                    reason: format!("unsupported scheme: {}", parsed.scheme()),
                });
            }
            Err(e) => return Err(ConfigError::Invalid { field: "api_base_url".into(), reason: e.to_string() }),
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.max_batch_timeout_ms > self.timeout_ms.saturating_mul(10) {
            tracing::warn!(
                max_batch_timeout_ms = self.max_batch_timeout_ms,
                timeout_ms = self.timeout_ms,
                "max_batch_timeout_ms is much larger than the upstream timeout; \
                 messages may sit in partially filled batches"
            );
        }

        Ok(())
    }
}
