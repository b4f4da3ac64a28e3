//! LazyLruCache: approximate LRU with concurrent readers
//!
//! Lookups take the read side of an `RwLock` and leave the recency chain
//! alone. Only `put` and `touch` refresh an entry's position, under the
//! write side. Eviction therefore follows write/touch recency, not read
//! recency: a key that is read constantly but never rewritten still ages
//! out. That is the contract of this type, not a bug.

use std::hash::Hash;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::lru::LruCache;
use crate::stats::CacheStats;
use crate::traits::ConcurrentCache;

/// Thread-safe, fixed-capacity cache with lazily maintained LRU order
pub struct LazyLruCache<K, V> {
    inner: RwLock<LruCache<K, V>>,
    stats: CacheStats,
    capacity: usize,
}

impl<K, V> LazyLruCache<K, V>
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
    /// * `Result<LazyLruCache>` - Empty cache, or `CacheError::ZeroCapacity` if
    ///   `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        let inner = LruCache::new(capacity)?;
        debug!(capacity, "created lazy lru cache");

        Ok(Self {
            inner: RwLock::new(inner),
            stats: CacheStats::new(),
            capacity,
        })
    }

    /// Create a cache from a config. The recency mode is ignored; this type
    /// is always lazy.
    ///
    /// # Arguments
    /// * `config` - Capacity and recency settings
    ///
    /// # Returns
    /// * `Result<LazyLruCache>` - Empty cache, or the config's validation error
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.capacity)
    }

    /// Get a copy of the value for `key`. Shared lock; recency is not updated.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.inner.read().peek(key).cloned();
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    /// Mark `key` most recently used. Returns `false` if it is not cached.
    pub fn touch(&self, key: &K) -> bool {
        self.inner.write().touch(key)
    }

    /// Insert or update `key` and mark it most recently used
    pub fn put(&self, key: K, value: V) {
        let mut cache = self.inner.write();

        if cache.contains(&key) {
            cache.put(key, value);
            self.stats.record_update();
            return;
        }

        self.stats.record_insert();
        if cache.put(key, value).is_some() {
            self.stats.record_eviction();
            trace!(capacity = self.capacity, "evicted least recently written entry");
        }
    }

    /// Remove `key`, returning whether it was present
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.inner.write().remove(key).is_some();
        if removed {
            self.stats.record_removal();
        }
        removed
    }

    /// Check whether `key` is cached. Only momentarily accurate.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().contains(key)
    }

    /// Current number of entries. Only momentarily accurate.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the cache is empty. Only momentarily accurate.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        let mut cache = self.inner.write();
        let entries = cache.len();
        cache.clear();
        self.stats.reset();
        debug!(entries, "cleared lazy lru cache");
    }

    /// Copy out all entries in eviction order, most recently written first
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Check index/chain consistency under the read lock
    pub fn validate(&self) -> Result<()> {
        self.inner.read().check_invariants()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> ConcurrentCache<K, V> for LazyLruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        LazyLruCache::get(self, key)
    }

    fn put(&self, key: K, value: V) {
        LazyLruCache::put(self, key, value)
    }

    fn remove(&self, key: &K) -> bool {
        LazyLruCache::remove(self, key)
    }

    fn contains(&self, key: &K) -> bool {
        LazyLruCache::contains(self, key)
    }

    fn len(&self) -> usize {
        LazyLruCache::len(self)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&self) {
        LazyLruCache::clear(self)
    }

    fn validate(&self) -> Result<()> {
        LazyLruCache::validate(self)
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
