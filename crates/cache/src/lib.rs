#![warn(clippy::unwrap_used)]

pub mod domain;
pub mod entry;
pub mod key;
pub mod manager;
mod sweep;

pub use domain::{CacheCounters, CacheStats, DomainCache, Lookup};
pub use entry::{CacheEntry, CacheValue};
pub use key::cache_key;
pub use manager::CacheManager;
