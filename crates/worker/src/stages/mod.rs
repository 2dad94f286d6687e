//! Pipeline stages.
//!
//! Each stage consumes one queue. It receives a batch of deliveries, groups
//! them, performs its side effect per group, and answers with one disposition
//! per delivery. A failing group only affects its own deliveries.

pub mod capture;
pub mod purge_tag;
pub mod purge_url;

use async_trait::async_trait;
use tagpurge_core::message::{self, MessageBody};
use tagpurge_core::{Backoff, BatchOutcome, Delivery};

pub use capture::CaptureStage;
pub use purge_tag::PurgeTagStage;
pub use purge_url::PurgeUrlStage;

/// A queue consumer invoked once per delivered batch.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn handle(&self, batch: &[Delivery]) -> BatchOutcome;
}

/// Parse every delivery in `batch` as `T`.
///
/// Deliveries that fail validation are rejected in `outcome` and left out of
/// the result.
pub(crate) fn decode<'a, T: MessageBody>(batch: &'a [Delivery], outcome: &mut BatchOutcome) -> Vec<(&'a Delivery, T)> {
    let mut decoded = Vec::with_capacity(batch.len());
    for delivery in batch {
        match message::parse::<T>(&delivery.body) {
            Ok(msg) => decoded.push((delivery, msg)),
            Err(e) => {
                tracing::error!(message_id = %delivery.id, body = %delivery.body, "rejecting message: {e}");
                outcome.reject(&delivery.id, e.to_string());
            }
        }
    }
    decoded
}

/// Schedule every delivery for redelivery, each delayed by its own attempt count.
pub(crate) fn retry_all(deliveries: &[&Delivery], backoff: Backoff, outcome: &mut BatchOutcome) {
    for delivery in deliveries {
        outcome.retry(&delivery.id, backoff.delay(delivery.attempts));
    }
}

pub(crate) fn ack_all(deliveries: &[&Delivery], outcome: &mut BatchOutcome) {
    for delivery in deliveries {
        outcome.ack(&delivery.id);
    }
}
