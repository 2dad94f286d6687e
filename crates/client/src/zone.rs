//! Hostname to zone identifier resolution.
//!
//! Hostnames that are not registered as zones themselves (subdomains) are
//! resolved by dropping the leftmost label and asking again, stopping before
//! a single label remains. Results are memoised for the resolver's lifetime,
//! which callers keep to one batch so provider-side zone changes are picked
//! up on the next delivery.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::provider::{CacheProvider, ProviderError};

/// Per-batch zone resolver.
pub struct ZoneResolver<'a> {
    provider: &'a dyn CacheProvider,
    resolved: Mutex<HashMap<String, String>>,
}

impl<'a> ZoneResolver<'a> {
    pub fn new(provider: &'a dyn CacheProvider) -> Self {
        Self { provider, resolved: Mutex::new(HashMap::new()) }
    }

    /// Resolve `hostname` to the provider's zone id.
    ///
    /// Returns `ProviderError::ZoneNotFound` when neither the hostname nor any
    /// parent with at least two labels is a zone. Lookup failures are returned
    /// as-is; nothing is retried here.
    pub async fn resolve(&self, hostname: &str) -> Result<String, ProviderError> {
        let host = normalize(hostname);

        if let Some(id) = self.resolved.lock().await.get(&host) {
            return Ok(id.clone());
        }

        let mut candidate = host.as_str();
        while candidate.split('.').count() >= 2 {
            let zones = self.provider.list_zones(candidate).await?;

            if let Some(zone) = zones.into_iter().next() {
                tracing::debug!(hostname = %host, zone = candidate, zone_id = %zone.id, "resolved zone");
                self.resolved.lock().await.insert(host.clone(), zone.id.clone());
                return Ok(zone.id);
            }

            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent,
                None => break,
            }
        }

        Err(ProviderError::ZoneNotFound(host))
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}
