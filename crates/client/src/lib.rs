//! Client code for tagpurge.
//!
//! This crate provides the cache provider's management API client and the
//! zone resolution built on top of it.

pub mod provider;
pub mod zone;

pub use provider::{CacheProvider, ProviderClient, ProviderConfig, ProviderError, Zone};
pub use zone::ZoneResolver;
