//! In-Process Backend Module
//!
//! Memory-backed cache storage guarded by a single mutex.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::backend::{BackendStats, CacheBackend};
use crate::entry::CacheEntry;
use crate::error::Result;

// == Memory Backend ==
/// In-process map backend.
///
/// Holds entries in memory with lazy expiry on access. There is no maximum
/// size or eviction policy; sustained cache-miss churn grows the map without
/// bound until entries expire or are cleared.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Key-value storage
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn set_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Option<u64>,
        tags: &[String],
    ) -> Result<()> {
        let entry = CacheEntry::new(value, ttl).with_tags(tags.to_vec());
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(false)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    fn stats(&self) -> Result<BackendStats> {
        let entries = self.entries.lock();
        let estimated_size_bytes = entries.values().map(|e| e.value.len() as u64).sum();
        let expired_keys = entries.values().filter(|e| e.is_expired()).count();

        Ok(BackendStats {
            kind: self.kind().to_string(),
            total_keys: entries.len(),
            estimated_size_bytes,
            expired_keys,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let mut entries = self.entries.lock();
        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();

        for key in expired_keys {
            entries.remove(&key);
        }

        Ok(count)
    }
}
