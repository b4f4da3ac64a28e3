//! ThreadSafeCache: exact LRU behind a single mutex
//!
//! `get` moves the entry to the head of the recency chain, so it is a write
//! as far as the chain is concerned. Every operation, reads included, holds
//! the one mutex for its whole duration; there is no reader parallelism.

use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::lru::LruCache;
use crate::stats::CacheStats;
use crate::traits::ConcurrentCache;

/// Thread-safe, fixed-capacity cache with exact LRU eviction
pub struct ThreadSafeCache<K, V> {
    /// Index and recency chain, always updated together
    inner: Mutex<LruCache<K, V>>,

    /// Cache statistics
    stats: CacheStats,

    /// Cache capacity
    capacity: usize,
}

impl<K, V> ThreadSafeCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of items in cache
    ///
    /// # Returns
    /// * `Result<ThreadSafeCache>` - Empty cache, or `CacheError::ZeroCapacity` if
    ///   `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        let inner = LruCache::new(capacity)?;
        debug!(capacity, "created exact lru cache");

        Ok(Self {
            inner: Mutex::new(inner),
            stats: CacheStats::new(),
            capacity,
        })
    }

    /// Create a cache from a config. The recency mode is ignored; this type
    /// is always exact.
    ///
    /// # Arguments
    /// * `config` - Capacity and recency settings
    ///
    /// # Returns
    /// * `Result<ThreadSafeCache>` - Empty cache, or the config's validation error
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.capacity)
    }

    /// Get a copy of the value for `key` and mark it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock();
        match cache.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Some(value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Get a copy of the value without touching recency or statistics
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().peek(key).cloned()
    }

    /// Mark `key` most recently used. Returns `false` if it is not cached.
    pub fn touch(&self, key: &K) -> bool {
        self.inner.lock().touch(key)
    }

    /// Insert or update `key`, evicting the least recently used entry if the
    /// cache is full. Updating an existing key never evicts.
    pub fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock();

        if cache.contains(&key) {
            cache.put(key, value);
            self.stats.record_update();
            return;
        }

        self.stats.record_insert();
        if cache.put(key, value).is_some() {
            self.stats.record_eviction();
            trace!(capacity = self.capacity, "evicted least recently used entry");
        }
    }

    /// Remove `key`, returning whether it was present
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.inner.lock().remove(key).is_some();
        if removed {
            self.stats.record_removal();
        }
        removed
    }

    /// Check whether `key` is cached. Does not affect recency.
    ///
    /// Only momentarily accurate: another thread may change the answer as
    /// soon as the lock is released.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    /// Current number of entries. Only momentarily accurate.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty. Only momentarily accurate.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        let mut cache = self.inner.lock();
        let entries = cache.len();
        cache.clear();
        self.stats.reset();
        debug!(entries, "cleared lru cache");
    }

    /// Copy out all entries, most recently used first
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Check index/chain consistency under the lock
    pub fn validate(&self) -> Result<()> {
        self.inner.lock().check_invariants()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> ConcurrentCache<K, V> for ThreadSafeCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        ThreadSafeCache::get(self, key)
    }

    fn put(&self, key: K, value: V) {
        ThreadSafeCache::put(self, key, value)
    }

    fn remove(&self, key: &K) -> bool {
        ThreadSafeCache::remove(self, key)
    }

    fn contains(&self, key: &K) -> bool {
        ThreadSafeCache::contains(self, key)
    }

    fn len(&self) -> usize {
        ThreadSafeCache::len(self)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&self) {
        ThreadSafeCache::clear(self)
    }

    fn validate(&self) -> Result<()> {
        ThreadSafeCache::validate(self)
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
