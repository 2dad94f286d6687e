//! Core types and shared functionality for tagpurge.
//!
//! This crate provides:
//! - Tag index implementation with SQLite backend
//! - Queue message schemas and the delivery model stages answer to
//! - Retry backoff and batching helpers
//! - Unified error types
//! - Configuration structures

pub mod backoff;
pub mod batch;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod message;
pub mod queue;

pub use backoff::Backoff;
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use fingerprint::fingerprint;
pub use index::{IndexWrite, TagIndex, UrlRecord};
pub use message::{CaptureMessage, MessageBody, PurgeTagMessage, PurgeUrlMessage};
pub use queue::{BatchOutcome, Delivery, Disposition, Producer, QueueName};
