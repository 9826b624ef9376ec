//! Filesystem Backend Module
//!
//! Disk-backed cache storage: one JSON file per key with atomic writes and
//! lazy expiry on read.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::{BackendStats, CacheBackend};
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};

// == File Backend ==
/// Filesystem-backed cache storage.
///
/// Each key maps deterministically to `<sha256(key)>.json` under the cache
/// directory. Writes go to a temporary file in the same directory and are
/// renamed into place, so concurrent readers see either the old or the new
/// entry, never a partially written one.
#[derive(Debug)]
pub struct FileBackend {
    /// Root directory for cache files
    dir: PathBuf,
    /// Serializes in-process writers
    write_lock: Mutex<()>,
}

impl FileBackend {
    // == Constructor ==
    /// Creates the backend, ensuring the cache directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "file backend initialized");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // == Entry Path ==
    /// Deterministic file path for a cache key.
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Reads and parses the entry file at `path`.
    ///
    /// A file that cannot be parsed is purged so later reads are not
    /// repeatedly penalized.
    fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(path)?;
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                debug!(path = %path.display(), "purging unreadable cache file");
                let _ = fs::remove_file(path);
                Err(CacheError::Serialization(err.to_string()))
            }
        }
    }

    /// Atomically writes an entry file: temp file in the same directory,
    /// then rename.
    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> Result<()> {
        let raw = serde_json::to_string(entry)?;
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock();
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Iterates over the entry files currently in the cache directory.
    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl CacheBackend for FileBackend {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key);
        match self.read_entry(&path)? {
            Some(entry) if entry.is_expired() => {
                let _guard = self.write_lock.lock();
                let _ = fs::remove_file(&path);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value)),
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
        self.write_entry(&self.entry_path(key), &entry)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        if path.exists() {
            let _guard = self.write_lock.lock();
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        for path in self.entry_files()? {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn stats(&self) -> Result<BackendStats> {
        let files = self.entry_files()?;
        let mut estimated_size_bytes = 0;
        let mut expired_keys = 0;

        for path in &files {
            if let Ok(meta) = fs::metadata(path) {
                estimated_size_bytes += meta.len();
            }
            if let Ok(Some(entry)) = self.read_entry(path) {
                if entry.is_expired() {
                    expired_keys += 1;
                }
            }
        }

        Ok(BackendStats {
            kind: self.kind().to_string(),
            total_keys: files.len(),
            estimated_size_bytes,
            expired_keys,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let mut removed = 0;

        for path in self.entry_files()? {
            match self.read_entry(&path) {
                Ok(Some(entry)) if entry.is_expired() => {
                    let _guard = self.write_lock.lock();
                    if fs::remove_file(&path).is_ok() {
                        removed += 1;
                    }
                }
                Ok(_) => {}
                // read_entry already purged the unreadable file
                Err(_) => {}
            }
        }

        Ok(removed)
    }
}
