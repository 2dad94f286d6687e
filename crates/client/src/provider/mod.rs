//! Cache provider management API client.
//!
//! Covers the two calls the purge pipeline needs: looking up a zone by name
//! and purging a list of URLs from a zone.
//!
//! ### API surface
//!
//! - **Zone lookup**: `GET {base}/zones?name=<name>`, first match used.
//! - **Purge**: `POST {base}/zones/{zone_id}/purge_cache` with `{"files": [...]}`.
//! - **Authentication**: `Authorization: Bearer <token>`.
//! - **Retries**: none. Every call is a single bounded attempt; the queue
//!   redelivers on failure.

pub mod error;
pub mod response;

pub use error::ProviderError;
pub use response::{ApiMessage, Envelope, PurgeRequest, Zone};

use async_trait::async_trait;
use reqwest::header;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagpurge_core::AppConfig;

/// Default base URL for the management API.
const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "tagpurge/0.1";

/// Zone lookup and purge calls against a cache provider.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// List zones whose name matches `name` exactly.
    async fn list_zones(&self, name: &str) -> Result<Vec<Zone>, ProviderError>;

    /// Evict `urls` from the zone identified by `zone_id`.
    async fn purge_files(&self, zone_id: &str, urls: &[String]) -> Result<(), ProviderError>;
}

/// Provider client configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bearer token with zone read and cache purge permissions.
    pub api_token: String,
    /// Base URL (default: https://api.cloudflare.com/client/v4).
    pub base_url: String,
    /// Request timeout (default: 10s).
    pub timeout: Duration,
    /// User-agent string (default: tagpurge/0.x).
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Build from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_token = config
            .require_api_token()
            .map_err(|_| ProviderError::MissingApiToken)?;

        Ok(Self {
            api_token: api_token.to_string(),
            base_url: config.api_base_url.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        })
    }
}

/// HTTP client for the provider's management API.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_token.is_empty() {
            return Err(ProviderError::MissingApiToken);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Network(Arc::new(e)))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Option<T>, ProviderError> {
        let response = request
            .bearer_auth(&self.config.api_token)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.config.user_agent)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("provider API response status: {}", status);

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }

        if status == 429 {
            return Err(ProviderError::RateLimited);
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(ProviderError::HttpError { status: status.as_u16() });
        }

        let bytes = response.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|e| ProviderError::Parse(e.to_string()))?;

        if !envelope.success {
            return Err(ProviderError::Api(envelope.error_summary()));
        }

        Ok(envelope.result)
    }
}

#[async_trait]
impl CacheProvider for ProviderClient {
    async fn list_zones(&self, name: &str) -> Result<Vec<Zone>, ProviderError> {
        let start = Instant::now();
        let request = self.http.get(self.endpoint("zones")).query(&[("name", name)]);

        let zones: Vec<Zone> = self.send(request).await?.unwrap_or_default();

        tracing::debug!(zone = name, matches = zones.len(), "zone lookup completed in {:?}", start.elapsed());

        Ok(zones)
    }

    async fn purge_files(&self, zone_id: &str, urls: &[String]) -> Result<(), ProviderError> {
        let start = Instant::now();
        let request = self
            .http
            .post(self.endpoint(&format!("zones/{zone_id}/purge_cache")))
            .json(&PurgeRequest { files: urls });

        self.send::<serde_json::Value>(request).await?;

        tracing::debug!(zone_id, urls = urls.len(), "purge completed in {:?}", start.elapsed());

        Ok(())
    }
}
