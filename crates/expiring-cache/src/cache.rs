//! Expiring key-value cache with lazy and swept eviction

use crate::sweeper::{Sweep, Sweeper};
use crate::types::{CacheConfig, CacheStats, Expiration};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A cached value and its deadline
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` means the entry never expires
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// State shared between the cache handle and its sweeper
struct Shared<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl<V> Shared<V> {
    fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            before - entries.len()
        };

        self.expired.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}

impl<V: Send + Sync + 'static> Sweep for Shared<V> {
    fn sweep(&self) -> usize {
        self.remove_expired()
    }
}

/// A string-keyed cache whose entries expire after a TTL.
///
/// All operations are synchronous and hold one coarse reader/writer lock for
/// the duration of a map lookup or traversal. Reads share the lock; `set`,
/// `delete` and the sweep take it exclusively.
///
/// When constructed inside a tokio runtime with a non-zero sweep interval, a
/// background task removes expired entries every interval. The task is
/// stopped by [`ExpiringCache::shutdown`] or when the cache is dropped, since
/// dropping the sweeper handle closes its stop channel.
pub struct ExpiringCache<V> {
    shared: Arc<Shared<V>>,
    default_ttl: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        Self::with_config(CacheConfig::new(default_ttl, sweep_interval))
    }

    /// Create a cache from a configuration
    pub fn with_config(config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        });

        let sweeper = if config.sweep_interval.is_zero() {
            None
        } else {
            Sweeper::spawn(Arc::downgrade(&shared), config.sweep_interval)
        };

        Self {
            shared,
            default_ttl: config.default_ttl,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Insert or overwrite `key` with the default TTL
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_expiration(key, value, Expiration::Default);
    }

    /// Insert or overwrite `key` with an explicit TTL (zero never expires)
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_with_expiration(key, value, Expiration::After(ttl));
    }

    /// Insert or overwrite `key`, resetting its expiry clock
    pub fn set_with_expiration(&self, key: impl Into<String>, value: V, expiration: Expiration) {
        let expires_at = expiration
            .resolve(self.default_ttl)
            .map(|ttl| Instant::now() + ttl);

        let key = key.into();
        let mut entries = self.shared.entries.write();
        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Get a value if present and not expired.
    ///
    /// An expired entry is removed on the spot and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.shared.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired_at(Instant::now()) => {
                    self.shared.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.shared.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Re-check under the write lock: a concurrent `set` may have
        // refreshed the entry since the read lock was released.
        {
            let mut entries = self.shared.entries.write();
            if entries
                .get(key)
                .is_some_and(|entry| entry.is_expired_at(Instant::now()))
            {
                entries.remove(key);
                self.shared.expired.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Removed expired cache entry on read");
            }
        }

        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Remove `key`; no-op if absent
    pub fn delete(&self, key: &str) {
        self.shared.entries.write().remove(key);
    }

    /// Whether `key` holds a live (unexpired) entry. Does not count as a hit.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.shared
            .entries
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Run one eviction pass now, returning the number of entries removed
    pub fn delete_expired(&self) -> usize {
        self.shared.remove_expired()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.shared.entries.write().clear();
    }

    /// Number of entries held, including expired entries not yet swept
    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.read().is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            expired: self.shared.expired.load(Ordering::Relaxed),
        }
    }

    /// Whether the background sweep task is still running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|sweeper| sweeper.is_running())
    }

    /// Stop the background sweep task. Idempotent.
    ///
    /// The cache stays usable afterwards, with expiry enforced on read only.
    pub fn shutdown(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
    }
}
