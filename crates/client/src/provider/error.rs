//! Cache provider API error types.

use std::sync::Arc;

/// Errors from the cache provider's management API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// No API token configured.
    #[error("missing API token: TAGPURGE_API_TOKEN not set")]
    MissingApiToken,

    /// Authentication failed (invalid token or insufficient permissions).
    #[error("authentication failed: token rejected")]
    AuthError,

    /// Rate limited by the provider.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// The provider answered but reported failure.
    #[error("provider error: {0}")]
    Api(String),

    /// No zone matched the hostname or any of its parent domains.
    #[error("zone not found: {0}")]
    ZoneNotFound(String),
}

impl ProviderError {
    /// Whether the same call could succeed later.
    ///
    /// Zone lookups that miss count as transient: the zone may be created
    /// after the message was produced.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProviderError::MissingApiToken | ProviderError::AuthError)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ProviderError::Timeout } else { ProviderError::Network(Arc::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::MissingApiToken;
        assert!(err.to_string().contains("API token"));

        let err = ProviderError::ZoneNotFound("a.example.com".to_string());
        assert!(err.to_string().contains("a.example.com"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::HttpError { status: 502 }.is_transient());
        assert!(ProviderError::ZoneNotFound("example.com".into()).is_transient());
        assert!(!ProviderError::AuthError.is_transient());
        assert!(!ProviderError::MissingApiToken.is_transient());
    }
}
