//! SQLite-backed tag index.
//!
//! Maps a URL fingerprint to its URL, zone, and current tag set. It supports:
//!
//! - Atomic replace-tags-for-url upserts
//! - Tag lookups scoped to a zone or across all zones
//! - Idempotent deletes by fingerprint
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod migrations;
pub mod records;

pub use crate::Error;

pub use connection::TagIndex;
pub use records::{IndexWrite, UrlRecord};
