//! Config Cache Module
//!
//! Caches a parsed configuration structure keyed by its source path, and
//! invalidates automatically when the source file's modification time
//! changes. External edits are picked up without any explicit caller action.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manager::CacheManager;

type Loader<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

// == Config Cache ==
/// Mtime-gated cache for a parsed configuration structure.
///
/// The caller supplies the load function; the cache only decides when a
/// reload is needed. Load failures propagate untouched so the caller's own
/// error handling applies.
pub struct ConfigCache<T> {
    manager: Arc<CacheManager>,
    source_path: PathBuf,
    cache_ttl: Option<u64>,
    loader: Loader<T>,
    /// Source mtime observed at the last cache fill
    source_mtime: Mutex<Option<SystemTime>>,
    cache_key: String,
}

impl<T> ConfigCache<T>
where
    T: Serialize + DeserializeOwned,
{
    // == Constructor ==
    /// Creates a config cache for the given source path.
    ///
    /// # Arguments
    /// * `manager` - Shared cache manager
    /// * `source_path` - File whose mtime gates invalidation
    /// * `cache_ttl` - TTL in seconds, None for no expiry
    /// * `loader` - Function that loads and parses the configuration
    pub fn new(
        manager: Arc<CacheManager>,
        source_path: impl Into<PathBuf>,
        cache_ttl: Option<u64>,
        loader: impl Fn() -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        let source_path = source_path.into();
        let cache_key = format!("config:{}", source_path.display());
        debug!(path = %source_path.display(), "config cache initialized");

        Self {
            manager,
            source_path,
            cache_ttl,
            loader: Box::new(loader),
            source_mtime: Mutex::new(None),
            cache_key,
        }
    }

    // == Mtime Tracking ==
    fn current_mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.source_path)
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Compares the file's current mtime against the one observed at fill
    /// time, updating the stored value when it moved.
    fn source_changed(&self) -> bool {
        let current = self.current_mtime();
        let mut stored = self.source_mtime.lock();

        match (*stored, current) {
            (None, current) => {
                *stored = current;
                true
            }
            (Some(_), None) => true,
            (Some(previous), Some(now)) => {
                if now != previous {
                    info!(path = %self.source_path.display(), "config source modified, invalidating cache");
                    *stored = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    // == Load ==
    /// Loads the configuration, from cache when the source is unchanged.
    pub fn load(&self) -> Result<T> {
        if self.source_changed() {
            debug!("config cache invalidated by source change");
            self.manager.delete(&self.cache_key)?;
        }

        if let Some(raw) = self.manager.get(&self.cache_key)? {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("config loaded from cache");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(error = %err, "cached config unreadable, reloading");
                    self.manager.delete(&self.cache_key)?;
                }
            }
        }

        debug!(path = %self.source_path.display(), "loading config from source");
        let value = (self.loader)()?;

        let raw = serde_json::to_string(&value)?;
        self.manager.set(&self.cache_key, &raw, self.cache_ttl)?;
        *self.source_mtime.lock() = self.current_mtime();

        Ok(value)
    }

    // == Invalidate ==
    /// Manually removes the cached value.
    ///
    /// Call this after updating the configuration through a channel that
    /// does not touch the file's mtime.
    pub fn invalidate(&self) -> Result<()> {
        self.manager.delete(&self.cache_key)?;
        *self.source_mtime.lock() = self.current_mtime();
        info!(path = %self.source_path.display(), "config cache manually invalidated");
        Ok(())
    }

    // == Stats ==
    /// Returns config cache state for admin tooling.
    pub fn stats(&self) -> ConfigCacheStats {
        let observed = *self.source_mtime.lock();
        let mtime_ms = observed.map(|t| {
            t.duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });

        ConfigCacheStats {
            cache_ttl: self.cache_ttl,
            source_path: self.source_path.display().to_string(),
            source_exists: self.source_path.exists(),
            source_mtime_ms: mtime_ms,
        }
    }
}

// == Config Cache Stats ==
/// Config cache state for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigCacheStats {
    pub cache_ttl: Option<u64>,
    pub source_path: String,
    pub source_exists: bool,
    /// Mtime observed at the last cache fill (Unix milliseconds)
    pub source_mtime_ms: Option<u64>,
}
