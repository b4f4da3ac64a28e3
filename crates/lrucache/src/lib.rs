//! # lrucache
//!
//! Fixed-capacity, thread-safe LRU cache.
//!
//! ## Architecture
//! - **HashMap**: AHash index from key to arena slot (O(1))
//! - **LRU List**: doubly-linked chain through arena slots, head = most
//!   recently used, tail = next to evict (O(1) relink and eviction)
//! - **Locking**: [`ThreadSafeCache`] serializes every call, `get` included,
//!   on one mutex and keeps exact LRU order. [`LazyLruCache`] lets reads share
//!   an `RwLock` and only refreshes recency on writes and explicit `touch`.
//!
//! ```
//! use lrucache::ThreadSafeCache;
//!
//! let cache = ThreadSafeCache::new(2).unwrap();
//! cache.put("a", 1);
//! cache.put("b", 2);
//! cache.get(&"a");
//! cache.put("c", 3); // evicts "b"
//!
//! assert!(!cache.contains(&"b"));
//! assert_eq!(cache.get(&"a"), Some(1));
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod lazy;
mod lru;
mod stats;
mod traits;

pub use cache::ThreadSafeCache;
pub use config::{CacheConfig, RecencyMode, DEFAULT_CAPACITY};
pub use error::{CacheError, Result};
pub use lazy::LazyLruCache;
pub use lru::{Iter, LruCache};
pub use stats::{CacheStats, StatsSnapshot};
pub use traits::ConcurrentCache;
