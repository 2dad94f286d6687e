//! In-process queue transport.
//!
//! Each queue is a bounded channel drained by one consumer task. The consumer
//! hands batches to its stage and applies the returned dispositions:
//! acknowledged messages are dropped, retried messages come back after their
//! delay with one more attempt, and rejected or exhausted messages go to the
//! dead-letter channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tagpurge_core::{AppConfig, Delivery, Disposition, Error, Producer, QueueName};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::stages::Stage;

/// Pending messages a queue holds before producers wait.
pub const QUEUE_CAPACITY: usize = 1024;

/// Batching and redelivery limits for a consumer.
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub max_batch_size: usize,
    pub max_batch_timeout: Duration,
    pub max_retries: u32,
}

impl From<&AppConfig> for QueueSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            max_batch_timeout: config.max_batch_timeout(),
            max_retries: config.max_retries,
        }
    }
}

/// A message that will not be delivered again.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub queue: QueueName,
    pub delivery: Delivery,
    pub reason: String,
}

/// Cloneable enqueue handle for one queue.
#[derive(Clone)]
pub struct QueueSender {
    name: QueueName,
    tx: mpsc::Sender<Delivery>,
    next_id: Arc<AtomicU64>,
}

impl QueueSender {
    /// Enqueue a new message for its first delivery.
    pub async fn send(&self, body: serde_json::Value) -> Result<(), Error> {
        self.enqueue(self.first_delivery(body)).await
    }

    fn first_delivery(&self, body: serde_json::Value) -> Delivery {
        let id = format!("{}-{}", self.name, self.next_id.fetch_add(1, Ordering::Relaxed));
        Delivery::new(id, 1, body)
    }

    async fn enqueue(&self, delivery: Delivery) -> Result<(), Error> {
        self.tx.send(delivery).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> Error {
        Error::Queue(format!("{} is closed", self.name))
    }

    /// Put `delivery` back after `delay`, counting one more attempt.
    fn redeliver(&self, mut delivery: Delivery, delay: Duration) {
        delivery.attempts += 1;
        let sender = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let id = delivery.id.clone();
            if let Err(e) = sender.enqueue(delivery).await {
                tracing::error!(queue = %sender.name, message_id = %id, "redelivery dropped: {e}");
            }
        });
    }
}

#[async_trait]
impl Producer for QueueSender {
    /// Reserves a slot for every body before sending any, so a closed or
    /// undersized queue enqueues nothing.
    async fn send_batch(&self, bodies: Vec<serde_json::Value>) -> Result<(), Error> {
        if bodies.is_empty() {
            return Ok(());
        }
        if bodies.len() > self.tx.max_capacity() {
            return Err(Error::Queue(format!(
                "{} holds at most {} messages, batch has {}",
                self.name,
                self.tx.max_capacity(),
                bodies.len()
            )));
        }

        let permits = self.tx.reserve_many(bodies.len()).await.map_err(|_| self.closed())?;
        for (permit, body) in permits.zip(bodies) {
            permit.send(self.first_delivery(body));
        }
        Ok(())
    }
}

/// A queue before its consumer is started.
pub struct LocalQueue {
    sender: QueueSender,
    rx: mpsc::Receiver<Delivery>,
}

impl LocalQueue {
    pub fn new(name: QueueName, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { sender: QueueSender { name, tx, next_id: Arc::new(AtomicU64::new(1)) }, rx }
    }

    pub fn sender(&self) -> QueueSender {
        self.sender.clone()
    }

    /// Start the consumer task for this queue.
    pub fn consume(
        self, stage: Arc<dyn Stage>, settings: QueueSettings, dead_letters: mpsc::UnboundedSender<DeadLetter>,
    ) -> JoinHandle<()> {
        let consumer = Consumer { sender: self.sender, rx: self.rx, stage, settings, dead_letters };
        tokio::spawn(consumer.run())
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

struct Consumer {
    sender: QueueSender,
    rx: mpsc::Receiver<Delivery>,
    stage: Arc<dyn Stage>,
    settings: QueueSettings,
    dead_letters: mpsc::UnboundedSender<DeadLetter>,
}

impl Consumer {
    async fn run(mut self) {
        tracing::info!(queue = %self.sender.name, "consumer started");
        while let Some(batch) = self.next_batch().await {
            let outcome = self.stage.handle(&batch).await;
            for delivery in batch {
                let disposition = outcome.get(&delivery.id).cloned();
                self.settle(delivery, disposition);
            }
        }
        tracing::info!(queue = %self.sender.name, "consumer stopped");
    }

    /// Wait for one message, then collect more until the batch is full or
    /// the fill window closes.
    async fn next_batch(&mut self) -> Option<Vec<Delivery>> {
        let first = self.rx.recv().await?;
        let deadline = Instant::now() + self.settings.max_batch_timeout;
        let mut batch = vec![first];

        while batch.len() < self.settings.max_batch_size {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(delivery)) => batch.push(delivery),
                Ok(None) | Err(_) => break,
            }
        }

        Some(batch)
    }

    fn settle(&self, delivery: Delivery, disposition: Option<Disposition>) {
        let delay = match disposition {
            Some(Disposition::Ack) => return,
            Some(Disposition::Reject { reason }) => {
                self.dead_letter(delivery, reason);
                return;
            }
            Some(Disposition::Retry { delay }) => delay,
            // Undisposed messages behave like a visibility timeout expiring.
            None => Duration::ZERO,
        };

        if delivery.attempts >= self.settings.max_retries {
            let reason = format!("gave up after {} attempts", delivery.attempts);
            self.dead_letter(delivery, reason);
            return;
        }

        tracing::debug!(
            queue = %self.sender.name,
            message_id = %delivery.id,
            attempts = delivery.attempts,
            delay_secs = delay.as_secs(),
            "scheduling redelivery"
        );
        self.sender.redeliver(delivery, delay);
    }

    fn dead_letter(&self, delivery: Delivery, reason: String) {
        tracing::error!(
            queue = %self.sender.name,
            message_id = %delivery.id,
            attempts = delivery.attempts,
            body = %delivery.body,
            "dead-lettered: {reason}"
        );
        let letter = DeadLetter { queue: self.sender.name, delivery, reason };
        if self.dead_letters.send(letter).is_err() {
            tracing::warn!(queue = %self.sender.name, "dead-letter channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tagpurge_core::BatchOutcome;

    /// Answers each delivery according to `respond` and reports what it saw.
    struct ScriptedStage {
        respond: fn(&Delivery) -> Option<Disposition>,
        seen: mpsc::UnboundedSender<(String, u32)>,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        async fn handle(&self, batch: &[Delivery]) -> BatchOutcome {
            self.batches.lock().unwrap().push(batch.len());
            let mut outcome = BatchOutcome::new();
            for delivery in batch {
                let _ = self.seen.send((delivery.id.clone(), delivery.attempts));
                if let Some(disposition) = (self.respond)(delivery) {
                    outcome.set(&delivery.id, disposition);
                }
            }
            outcome
        }
    }

    fn settings(max_retries: u32) -> QueueSettings {
        QueueSettings { max_batch_size: 10, max_batch_timeout: Duration::from_millis(50), max_retries }
    }

    struct Harness {
        sender: QueueSender,
        seen: mpsc::UnboundedReceiver<(String, u32)>,
        dead: mpsc::UnboundedReceiver<DeadLetter>,
        stage: Arc<ScriptedStage>,
    }

    fn start(respond: fn(&Delivery) -> Option<Disposition>, max_retries: u32) -> Harness {
        let (seen_tx, seen) = mpsc::unbounded_channel();
        let (dead_tx, dead) = mpsc::unbounded_channel();
        let stage = Arc::new(ScriptedStage { respond, seen: seen_tx, batches: Mutex::new(Vec::new()) });
        let queue = LocalQueue::new(QueueName::PurgeUrl, 16);
        let sender = queue.sender();
        queue.consume(stage.clone(), settings(max_retries), dead_tx);
        Harness { sender, seen, dead, stage }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_delivers_once() {
        let mut h = start(|_| Some(Disposition::Ack), 3);
        h.sender.send(json!({"n": 1})).await.unwrap();

        assert_eq!(h.seen.recv().await.unwrap(), ("cache-purge-url-1".to_string(), 1));
        let again = tokio::time::timeout(Duration::from_secs(3600), h.seen.recv()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_redelivers_with_next_attempt() {
        let mut h = start(
            |d| {
                if d.attempts < 2 {
                    Some(Disposition::Retry { delay: Duration::from_secs(15) })
                } else {
                    Some(Disposition::Ack)
                }
            },
            3,
        );
        h.sender.send(json!({"n": 1})).await.unwrap();

        let started = Instant::now();
        assert_eq!(h.seen.recv().await.unwrap().1, 1);
        assert_eq!(h.seen.recv().await.unwrap().1, 2);
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(h.dead.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_dead_letter() {
        let mut h = start(|_| Some(Disposition::Retry { delay: Duration::from_secs(1) }), 2);
        h.sender.send(json!({"n": 1})).await.unwrap();

        let letter = h.dead.recv().await.unwrap();
        assert_eq!(letter.delivery.attempts, 2);
        assert_eq!(letter.queue, QueueName::PurgeUrl);
        assert!(letter.reason.contains("2 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_dead_letters_immediately() {
        let mut h = start(|_| Some(Disposition::Reject { reason: "bad payload".into() }), 3);
        h.sender.send(json!("garbage")).await.unwrap();

        let letter = h.dead.recv().await.unwrap();
        assert_eq!(letter.delivery.attempts, 1);
        assert_eq!(letter.reason, "bad payload");
        assert_eq!(letter.delivery.body, json!("garbage"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undisposed_message_is_redelivered() {
        let mut h = start(|d| if d.attempts == 1 { None } else { Some(Disposition::Ack) }, 3);
        h.sender.send(json!({"n": 1})).await.unwrap();

        assert_eq!(h.seen.recv().await.unwrap().1, 1);
        assert_eq!(h.seen.recv().await.unwrap().1, 2);
    }

    #[tokio::test]
    async fn test_send_batch_larger_than_queue_enqueues_nothing() {
        let mut queue = LocalQueue::new(QueueName::PurgeUrl, 2);
        let sender = queue.sender();

        let result = sender.send_batch(vec![json!(1), json!(2), json!(3)]).await;

        assert!(matches!(result, Err(Error::Queue(_))));
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_send_batch_to_closed_queue_fails() {
        let queue = LocalQueue::new(QueueName::PurgeUrl, 4);
        let sender = queue.sender();
        drop(queue);

        assert!(matches!(sender.send_batch(vec![json!(1)]).await, Err(Error::Queue(_))));
    }

    #[tokio::test]
    async fn test_send_batch_enqueues_in_order() {
        let mut queue = LocalQueue::new(QueueName::PurgeUrl, 4);
        let sender = queue.sender();

        sender.send_batch(vec![json!("a"), json!("b")]).await.unwrap();

        let first = queue.try_recv().unwrap();
        let second = queue.try_recv().unwrap();
        assert_eq!((first.body, first.attempts), (json!("a"), 1));
        assert_eq!(second.body, json!("b"));
        assert_ne!(first.id, second.id);
        assert!(queue.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_fill_up_to_limit() {
        let mut h = start(|_| Some(Disposition::Ack), 3);
        let bodies: Vec<serde_json::Value> = (0..12).map(|n| json!({"n": n})).collect();
        h.sender.send_batch(bodies).await.unwrap();

        for _ in 0..12 {
            h.seen.recv().await.unwrap();
        }
        assert_eq!(*h.stage.batches.lock().unwrap(), vec![10, 2]);
    }
}
