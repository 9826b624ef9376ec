//! Error types for the cache subsystem
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Caller passed an empty or oversized key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Storage medium could not be reached or written
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Stored entry could not be serialized or deserialized
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A caller-supplied load or warm function failed
    #[error("Load failed: {0}")]
    LoadFailed(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
