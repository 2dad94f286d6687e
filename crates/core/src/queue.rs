//! Queue delivery model shared by every stage.
//!
//! A stage receives a batch of [`Delivery`] values and answers with a
//! [`BatchOutcome`] holding exactly one [`Disposition`] per message. The
//! transport decides what acknowledging, delaying, or dead-lettering means.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Queues that make up the invalidation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueName {
    #[serde(rename = "cache-capture")]
    Capture,
    #[serde(rename = "cache-purge-tag")]
    PurgeTag,
    #[serde(rename = "cache-purge-url")]
    PurgeUrl,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Capture => "cache-capture",
            QueueName::PurgeTag => "cache-purge-tag",
            QueueName::PurgeUrl => "cache-purge-url",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache-capture" => Ok(QueueName::Capture),
            "cache-purge-tag" => Ok(QueueName::PurgeTag),
            "cache-purge-url" => Ok(QueueName::PurgeUrl),
            other => Err(Error::Queue(format!("unknown queue: {other}"))),
        }
    }
}

/// One pending message in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: String,
    /// Deliveries so far, including this one. The first delivery is 1.
    pub attempts: u32,
    pub body: serde_json::Value,
}

impl Delivery {
    pub fn new(id: impl Into<String>, attempts: u32, body: serde_json::Value) -> Self {
        Self { id: id.into(), attempts, body }
    }
}

/// What the transport should do with a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Side effect committed; drop the message.
    Ack,
    /// Redeliver after `delay`.
    Retry { delay: Duration },
    /// Payload can never succeed; report it instead of retrying.
    Reject { reason: String },
}

/// Per-message dispositions for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    dispositions: BTreeMap<String, Disposition>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ack(&mut self, id: &str) {
        self.set(id, Disposition::Ack);
    }

    pub fn retry(&mut self, id: &str, delay: Duration) {
        self.set(id, Disposition::Retry { delay });
    }

    pub fn reject(&mut self, id: &str, reason: impl Into<String>) {
        self.set(id, Disposition::Reject { reason: reason.into() });
    }

    pub fn set(&mut self, id: &str, disposition: Disposition) {
        self.dispositions.insert(id.to_string(), disposition);
    }

    pub fn get(&self, id: &str) -> Option<&Disposition> {
        self.dispositions.get(id)
    }

    pub fn acked(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Ack))
    }

    pub fn retried(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Retry { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Reject { .. }))
    }

    fn count(&self, pred: impl Fn(&Disposition) -> bool) -> usize {
        self.dispositions.values().filter(|d| pred(d)).count()
    }
}

/// Enqueue side of a downstream queue.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Enqueue all `bodies` or none of them.
    async fn send_batch(&self, bodies: Vec<serde_json::Value>) -> Result<(), Error>;
}
