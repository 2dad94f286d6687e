//! Purge-by-tag stage: fans a tag out into per-URL purge requests.
//!
//! Index rows are removed only after every emission chunk has been accepted
//! downstream. A crash between the two steps re-emits the same URLs on
//! redelivery, which is harmless because purging is idempotent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use tagpurge_core::{
    Backoff, BatchOutcome, Delivery, Error, Producer, PurgeTagMessage, PurgeUrlMessage, TagIndex, batch,
};

use super::{Stage, ack_all, decode, retry_all};

/// Consumer for the `cache-purge-tag` queue.
pub struct PurgeTagStage {
    index: TagIndex,
    producer: Arc<dyn Producer>,
    backoff: Backoff,
    send_batch_size: usize,
}

#[derive(Default)]
struct ZoneGroup<'a> {
    tags: BTreeSet<String>,
    deliveries: Vec<&'a Delivery>,
}

impl PurgeTagStage {
    pub fn new(index: TagIndex, producer: Arc<dyn Producer>, backoff: Backoff, send_batch_size: usize) -> Self {
        Self { index, producer, backoff, send_batch_size }
    }

    /// Emit purge requests for every URL carrying one of `tags`, then drop
    /// those URLs from the index. Returns the number of URLs emitted.
    async fn purge_group(&self, zone: Option<&str>, tags: &[String]) -> Result<usize, Error> {
        let records = self.index.find_urls_by_tags(tags, zone).await?;
        if records.is_empty() {
            tracing::info!(zone = zone.unwrap_or("*"), ?tags, "no tracked URLs for tags");
            return Ok(0);
        }

        let bodies = records
            .iter()
            .map(|record| {
                serde_json::to_value(PurgeUrlMessage { url: record.url.clone(), zone: record.zone.clone() })
                    .map_err(|e| Error::Queue(format!("failed to encode purge request: {e}")))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        try_join_all(
            batch::chunks(&bodies, self.send_batch_size).map(|chunk| self.producer.send_batch(chunk.to_vec())),
        )
        .await?;

        let fingerprints: Vec<String> = records.into_iter().map(|record| record.fingerprint).collect();
        self.index.delete_by_fingerprints(&fingerprints).await?;

        Ok(fingerprints.len())
    }
}

#[async_trait]
impl Stage for PurgeTagStage {
    async fn handle(&self, batch: &[Delivery]) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();

        // `None` collects requests that apply across every zone.
        let mut groups: BTreeMap<Option<String>, ZoneGroup<'_>> = BTreeMap::new();
        for (delivery, msg) in decode::<PurgeTagMessage>(batch, &mut outcome) {
            let group = groups.entry(msg.zone).or_default();
            group.tags.insert(msg.tag);
            group.deliveries.push(delivery);
        }

        let purges = groups.into_iter().map(|(zone, group)| async move {
            let tags: Vec<String> = group.tags.into_iter().collect();
            let result = self.purge_group(zone.as_deref(), &tags).await;
            (zone, group.deliveries, result)
        });

        for (zone, deliveries, result) in join_all(purges).await {
            let zone = zone.as_deref().unwrap_or("*");
            match result {
                Ok(emitted) => {
                    tracing::debug!(zone, emitted, messages = deliveries.len(), "purged tags");
                    ack_all(&deliveries, &mut outcome);
                }
                Err(e) => {
                    tracing::warn!(zone, messages = deliveries.len(), "tag purge failed, retrying: {e}");
                    retry_all(&deliveries, self.backoff, &mut outcome);
                }
            }
        }

        tracing::info!(
            batch = batch.len(),
            acked = outcome.acked(),
            retried = outcome.retried(),
            rejected = outcome.rejected(),
            "purge-tag batch processed"
        );

        outcome
    }
}
