//! Cache Backend Module
//!
//! Uniform storage interface with in-process, filesystem, and networked
//! implementations. Backends are selected once at startup; call sites only
//! ever see the trait.

mod file;
mod memory;
mod network;

use serde::Serialize;

use crate::error::Result;

// Re-export public types
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use network::RedisBackend;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

// == Backend Stats ==
/// Storage-level statistics reported by a backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStats {
    /// Backend kind label
    pub kind: String,
    /// Number of stored entries (expired-but-unswept entries included)
    pub total_keys: usize,
    /// Estimated payload size in bytes
    pub estimated_size_bytes: u64,
    /// Entries whose TTL elapsed but have not been swept yet
    pub expired_keys: usize,
}

// == Cache Backend Trait ==
/// Uniform storage contract shared by all cache backends.
///
/// Backends perform lazy expiry: `get` and `exists` treat an entry whose TTL
/// has elapsed exactly like an absent key, removing it where the medium
/// allows. A background sweep is never required for correctness.
pub trait CacheBackend: Send + Sync {
    /// Backend kind label used in stats and logs.
    fn kind(&self) -> &'static str;

    /// Retrieves a value, or None when the key is absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value with optional TTL, overwriting any previous entry.
    fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        self.set_tagged(key, value, ttl, &[])
    }

    /// Stores a value carrying dependency tags.
    fn set_tagged(&self, key: &str, value: &str, ttl: Option<u64>, tags: &[String])
        -> Result<()>;

    /// Deletes a key. Returns false when the key was absent.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every entry held by this backend.
    fn clear(&self) -> Result<()>;

    /// Expiry-aware existence check.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Storage-level statistics.
    fn stats(&self) -> Result<BackendStats>;

    /// Eagerly removes expired entries, returning the number removed.
    fn cleanup_expired(&self) -> Result<usize>;
}
