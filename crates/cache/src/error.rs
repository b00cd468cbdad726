//! Cache error types.

use thiserror::Error;

/// Errors that can occur in the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Recomputing a view from the authoritative rows failed.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
