//! In-memory key-value cache with per-entry TTL and periodic sweep eviction
//!
//! Entries are checked for expiry when read, and a background task started
//! with the cache removes expired entries that are never read again. The
//! cache is a best-effort accelerator: a miss means "recompute or fetch from
//! the source of truth", whether the key was never set, expired, or swept.

mod cache;
mod sweeper;
mod types;

pub use cache::ExpiringCache;
pub use types::{CacheConfig, CacheStats, Expiration};
