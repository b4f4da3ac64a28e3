//! Cache configuration
//!
//! Example document:
//!
//! ```json
//! { "capacity": 512, "recency": "lazy" }
//! ```

use std::fs;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ThreadSafeCache;
use crate::error::{CacheError, Result};
use crate::lazy::LazyLruCache;
use crate::traits::ConcurrentCache;

/// Default cache capacity (number of entries)
pub const DEFAULT_CAPACITY: usize = 10_000;

/// How reads interact with recency ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecencyMode {
    /// Reads move entries to the head; all operations serialize on one mutex
    #[default]
    Exact,
    /// Reads share a read lock and leave ordering untouched
    Lazy,
}

/// Cache construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries, must be > 0
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Recency maintenance mode
    #[serde(default)]
    pub recency: RecencyMode,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            recency: RecencyMode::default(),
        }
    }
}

impl CacheConfig {
    /// Config with the given capacity and exact recency
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject a zero capacity. Never clamped.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(())
    }

    /// Build a shareable cache of the configured mode
    pub fn build_shared<K, V>(&self) -> Result<Arc<dyn ConcurrentCache<K, V>>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Ok(match self.recency {
            RecencyMode::Exact => Arc::new(ThreadSafeCache::<K, V>::with_config(self)?),
            RecencyMode::Lazy => Arc::new(LazyLruCache::<K, V>::with_config(self)?),
        })
    }
}
