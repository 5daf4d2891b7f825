//! Cache types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long an entry stays valid after it is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Use the cache's configured default TTL
    #[default]
    Default,
    /// Never expires; only `delete` or `clear` removes the entry
    Never,
    /// Expires once the duration has elapsed. `Duration::ZERO` never expires.
    After(Duration),
}

impl Expiration {
    /// Resolve to a concrete TTL, `None` meaning no expiry
    pub(crate) fn resolve(self, default_ttl: Duration) -> Option<Duration> {
        let ttl = match self {
            Expiration::Default => default_ttl,
            Expiration::Never => return None,
            Expiration::After(ttl) => ttl,
        };
        (!ttl.is_zero()).then_some(ttl)
    }
}

impl From<Duration> for Expiration {
    fn from(ttl: Duration) -> Self {
        Expiration::After(ttl)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifespan of entries set without an explicit TTL (zero disables expiry)
    pub default_ttl: Duration,
    /// Cadence of the background eviction pass (zero disables the sweeper)
    pub sweep_interval: Duration,
}

impl CacheConfig {
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            default_ttl,
            sweep_interval,
        }
    }

    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),     // 5 minutes
            sweep_interval: Duration::from_secs(10 * 60), // 10 minutes
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held, including expired ones not yet swept
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because they expired, on read or by the sweeper
    pub expired: u64,
}
