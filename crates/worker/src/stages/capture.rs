//! Capture stage: records which tags a cached URL carries.
//!
//! Observations of the same URL within one batch are merged before writing,
//! so near-simultaneous captures from different edge locations cannot
//! overwrite each other's tags.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use futures::future::join_all;
use tagpurge_core::{Backoff, BatchOutcome, CaptureMessage, Delivery, TagIndex, fingerprint};

use super::{Stage, ack_all, decode, retry_all};

/// Consumer for the `cache-capture` queue.
pub struct CaptureStage {
    index: TagIndex,
    backoff: Backoff,
}

struct UrlGroup<'a> {
    zone: String,
    tags: BTreeSet<String>,
    deliveries: Vec<&'a Delivery>,
}

impl CaptureStage {
    pub fn new(index: TagIndex, backoff: Backoff) -> Self {
        Self { index, backoff }
    }
}

#[async_trait]
impl Stage for CaptureStage {
    async fn handle(&self, batch: &[Delivery]) -> BatchOutcome {
        let mut outcome = BatchOutcome::new();

        let mut groups: BTreeMap<String, UrlGroup<'_>> = BTreeMap::new();
        for (delivery, msg) in decode::<CaptureMessage>(batch, &mut outcome) {
            let group = groups.entry(msg.url).or_insert_with(|| UrlGroup {
                zone: String::new(),
                tags: BTreeSet::new(),
                deliveries: Vec::new(),
            });
            // Later observations in the batch decide the zone.
            group.zone = msg.zone;
            group.tags.extend(msg.tags);
            group.deliveries.push(delivery);
        }

        let writes = groups.into_iter().map(|(url, group)| async move {
            let tags: Vec<String> = group.tags.into_iter().collect();
            let result = self.index.upsert(&fingerprint(&url), &url, &group.zone, &tags).await;
            (url, tags.len(), group.deliveries, result)
        });

        for (url, tag_count, deliveries, result) in join_all(writes).await {
            match result {
                Ok(()) => {
                    tracing::debug!(url = %url, tags = tag_count, messages = deliveries.len(), "captured tags");
                    ack_all(&deliveries, &mut outcome);
                }
                Err(e) => {
                    tracing::warn!(url = %url, messages = deliveries.len(), "capture failed, retrying: {e}");
                    retry_all(&deliveries, self.backoff, &mut outcome);
                }
            }
        }

        tracing::info!(
            batch = batch.len(),
            acked = outcome.acked(),
            retried = outcome.retried(),
            rejected = outcome.rejected(),
            "capture batch processed"
        );

        outcome
    }
}
