//! Error types for lrucache

use std::io;

use thiserror::Error;

/// Result type alias for lrucache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors reported by cache construction, configuration and validation.
///
/// Key misses are never errors: lookups return `Option`, removals `bool`.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Capacity must be at least one entry
    #[error("cache capacity must be greater than 0")]
    ZeroCapacity,

    /// Internal consistency check failed
    #[error("cache invariant violated: {0}")]
    InvariantViolation(String),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed configuration document
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        CacheError::InvariantViolation(msg.into())
    }
}
