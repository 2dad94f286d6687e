//! Purge-by-URL stage: evicts URLs from the provider cache, one call per zone.
//!
//! A zone group succeeds or fails as a unit. On failure every message in
//! the group is retried with its own backoff; other zones are unaffected.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tagpurge_client::{CacheProvider, ProviderError, ZoneResolver};
use tagpurge_core::{Backoff, BatchOutcome, Delivery, PurgeUrlMessage, batch};

use super::{Stage, ack_all, decode, retry_all};

/// Consumer for the `cache-purge-url` queue.
pub struct PurgeUrlStage {
    provider: Arc<dyn CacheProvider>,
    backoff: Backoff,
    max_urls_per_purge: Option<usize>,
}

#[derive(Default)]
struct ZoneGroup<'a> {
    urls: Vec<String>,
    seen: HashSet<String>,
    deliveries: Vec<&'a Delivery>,
}

impl ZoneGroup<'_> {
    fn push(&mut self, url: String) {
        if self.seen.insert(url.clone()) {
            self.urls.push(url);
        }
    }
}

impl PurgeUrlStage {
    pub fn new(provider: Arc<dyn CacheProvider>, backoff: Backoff, max_urls_per_purge: Option<usize>) -> Self {
        Self { provider, backoff, max_urls_per_purge }
    }

    async fn purge_zone(&self, resolver: &ZoneResolver<'_>, zone: &str, urls: &[String]) -> Result<(), ProviderError> {
        let zone_id = resolver.resolve(zone).await?;

        match self.max_urls_per_purge {
            None => self.provider.purge_files(&zone_id, urls).await,
            Some(limit) => {
                for chunk in batch::chunks(urls, limit) {
                    self.provider.purge_files(&zone_id, chunk).await?;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Stage for PurgeUrlStage {
    async fn handle(&self, batch: &[Delivery]) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();

        let mut groups: BTreeMap<String, ZoneGroup<'_>> = BTreeMap::new();
        for (delivery, msg) in decode::<PurgeUrlMessage>(batch, &mut outcome) {
            let group = groups.entry(msg.zone).or_default();
            group.push(msg.url);
            group.deliveries.push(delivery);
        }

        let resolver = ZoneResolver::new(self.provider.as_ref());
        let resolver = &resolver;

        let purges = groups.into_iter().map(|(zone, group)| async move {
            let result = self.purge_zone(resolver, &zone, &group.urls).await;
            (zone, group, result)
        });

        for (zone, group, result) in join_all(purges).await {
            match result {
                Ok(()) => {
                    tracing::info!(zone = %zone, urls = group.urls.len(), "purged URLs");
                    ack_all(&group.deliveries, &mut outcome);
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(zone = %zone, urls = group.urls.len(), "purge failed, retrying: {e}");
                    } else {
                        tracing::error!(zone = %zone, urls = group.urls.len(), "purge failed, retrying: {e}");
                    }
                    retry_all(&group.deliveries, self.backoff, &mut outcome);
                }
            }
        }

        tracing::info!(
            batch = batch.len(),
            acked = outcome.acked(),
            retried = outcome.retried(),
            rejected = outcome.rejected(),
            "purge-url batch processed"
        );

        outcome
    }
}
