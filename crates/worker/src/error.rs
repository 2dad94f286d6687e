//! Errors raised while accepting messages from the ingress stream.

use tagpurge_core::QueueName;

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// The line is not a JSON envelope.
    #[error("MALFORMED_ENVELOPE: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The target queue stopped accepting messages.
    #[error("QUEUE_CLOSED: {0}")]
    QueueClosed(QueueName),

    #[error("READ_FAILED: {0}")]
    Read(#[from] std::io::Error),
}
