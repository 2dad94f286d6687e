//! Line-delimited JSON ingress.
//!
//! Each line is an envelope `{"queue": "<name>", "body": {...}}`. Bodies are
//! enqueued untouched; stages validate them on delivery.

use serde::Deserialize;
use tagpurge_core::QueueName;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::IngressError;
use crate::transport::QueueSender;

/// Longest line echoed back into skip logs.
const LOG_LINE_LIMIT: usize = 256;

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub queue: QueueName,
    pub body: serde_json::Value,
}

/// Ingress totals for one stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngressStats {
    pub accepted: usize,
    pub skipped: usize,
}

pub struct Router {
    capture: QueueSender,
    purge_tag: QueueSender,
    purge_url: QueueSender,
}

impl Router {
    pub fn new(capture: QueueSender, purge_tag: QueueSender, purge_url: QueueSender) -> Self {
        Self { capture, purge_tag, purge_url }
    }

    fn sender(&self, queue: QueueName) -> &QueueSender {
        match queue {
            QueueName::Capture => &self.capture,
            QueueName::PurgeTag => &self.purge_tag,
            QueueName::PurgeUrl => &self.purge_url,
        }
    }

    /// Parse one line and enqueue its body. Returns the target queue.
    ///
    /// Bytes that are not UTF-8 JSON fail as `Malformed`.
    pub async fn route_line(&self, line: &[u8]) -> Result<QueueName, IngressError> {
        let envelope: Envelope = serde_json::from_slice(line)?;
        self.sender(envelope.queue)
            .send(envelope.body)
            .await
            .map_err(|_| IngressError::QueueClosed(envelope.queue))?;
        Ok(envelope.queue)
    }

    /// Route every line of `reader` until EOF. Blank and malformed lines are
    /// skipped; a closed queue or read failure stops the stream.
    pub async fn run<R: AsyncBufRead + Unpin>(&self, mut reader: R) -> Result<IngressStats, IngressError> {
        let mut stats = IngressStats::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match self.route_line(line).await {
                Ok(queue) => {
                    tracing::debug!(queue = %queue, "accepted message");
                    stats.accepted += 1;
                }
                Err(e @ IngressError::Malformed(_)) => {
                    let shown = String::from_utf8_lossy(&line[..line.len().min(LOG_LINE_LIMIT)]);
                    tracing::warn!(line = %shown, "skipping input line: {e}");
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(accepted = stats.accepted, skipped = stats.skipped, "ingress reached end of input");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalQueue;
    use serde_json::json;

    struct Queues {
        capture: LocalQueue,
        purge_tag: LocalQueue,
        purge_url: LocalQueue,
    }

    fn queues() -> (Queues, Router) {
        let q = Queues {
            capture: LocalQueue::new(QueueName::Capture, 8),
            purge_tag: LocalQueue::new(QueueName::PurgeTag, 8),
            purge_url: LocalQueue::new(QueueName::PurgeUrl, 8),
        };
        let router = Router::new(q.capture.sender(), q.purge_tag.sender(), q.purge_url.sender());
        (q, router)
    }

    #[tokio::test]
    async fn test_routes_by_queue_name() {
        let (mut q, router) = queues();

        let queue = router
            .route_line(br#"{"queue": "cache-purge-tag", "body": {"tag": "t1"}}"#)
            .await
            .unwrap();

        assert_eq!(queue, QueueName::PurgeTag);
        let delivery = q.purge_tag.try_recv().unwrap();
        assert_eq!(delivery.body, json!({"tag": "t1"}));
        assert_eq!(delivery.attempts, 1);
        assert!(q.capture.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unknown_queue_is_malformed() {
        let (_q, router) = queues();

        let err = router.route_line(br#"{"queue": "cache-other", "body": {}}"#).await.unwrap_err();

        assert!(matches!(err, IngressError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_run_skips_bad_lines() {
        let (mut q, router) = queues();
        let input = concat!(
            r#"{"queue": "cache-capture", "body": {"url": "https://example.com", "tags": ["a"], "zone": "example.com"}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"queue": "cache-purge-url", "body": {"url": "https://example.com", "zone": "example.com"}}"#,
            "\n",
        );

        let stats = router.run(input.as_bytes()).await.unwrap();

        assert_eq!(stats, IngressStats { accepted: 2, skipped: 1 });
        assert!(q.capture.try_recv().is_some());
        assert!(q.purge_url.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_run_skips_invalid_utf8_and_keeps_reading() {
        let (mut q, router) = queues();
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(b"{\"queue\": \"cache-purge-tag\", \"body\": {\"tag\": \"caf\xc3\xa9\"}}\n");
        input.extend_from_slice(b"{\"queue\": \"cache-purge-tag\", \"body\": {\"tag\": \"\xff\"}}\n");
        input.extend_from_slice(br#"{"queue": "cache-purge-tag", "body": {"tag": "t1"}}"#);

        let stats = router.run(input.as_slice()).await.unwrap();

        assert_eq!(stats, IngressStats { accepted: 2, skipped: 2 });
        assert_eq!(q.purge_tag.try_recv().unwrap().body, json!({"tag": "caf\u{e9}"}));
        assert_eq!(q.purge_tag.try_recv().unwrap().body, json!({"tag": "t1"}));
        assert!(q.purge_tag.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_run_stops_when_queue_closed() {
        let (q, router) = queues();
        drop(q);

        let err = router
            .run(r#"{"queue": "cache-purge-tag", "body": {"tag": "t1"}}"#.as_bytes())
            .await
            .unwrap_err();

        assert!(matches!(err, IngressError::QueueClosed(QueueName::PurgeTag)));
    }
}
