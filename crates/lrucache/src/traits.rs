//! Shared interface of the thread-safe caches

use crate::error::Result;
use crate::stats::CacheStats;

/// A cache that can be shared across threads behind an `Arc`.
///
/// Every method takes `&self`; implementations do their own locking.
/// `len` and `contains` are only momentarily accurate once other threads
/// are mutating the cache.
pub trait ConcurrentCache<K, V>: Send + Sync {
    /// Look up a key, returning a copy of its value
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or update a key
    fn put(&self, key: K, value: V);

    /// Remove a key, returning whether it was present
    fn remove(&self, key: &K) -> bool;

    /// Check whether a key is cached
    fn contains(&self, key: &K) -> bool;

    /// Number of cached entries
    fn len(&self) -> usize;

    /// Whether the cache holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    fn capacity(&self) -> usize;

    /// Drop every entry and reset statistics
    fn clear(&self);

    /// Check internal consistency under the cache's own lock
    fn validate(&self) -> Result<()>;

    /// Hit/miss and mutation counters
    fn stats(&self) -> &CacheStats;
}
