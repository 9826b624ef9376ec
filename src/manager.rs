//! Cache Manager Module
//!
//! The single component specialized caches talk to. Wraps one backend with
//! hit/miss statistics, health reporting, and an error-swallowing contract so
//! backend failures degrade to cache misses instead of breaking callers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{BackendStats, CacheBackend, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Health Thresholds ==
/// Error-rate percentage above which health flips to degraded.
const DEGRADED_ERROR_RATE: f64 = 5.0;
/// Hit-rate percentage below which a tuning recommendation is emitted.
const LOW_HIT_RATE: f64 = 50.0;

// == Counters ==
/// Monotonically increasing operation counters.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

// == Cache Stats ==
/// Point-in-time statistics snapshot for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of gets served from cache
    pub hits: u64,
    /// Number of gets that found nothing (or hit a swallowed backend error)
    pub misses: u64,
    /// Percentage of gets served from cache, 0 when no gets occurred
    pub hit_rate: f64,
    /// Number of successful sets
    pub sets: u64,
    /// Number of deletions that removed an entry
    pub deletes: u64,
    /// Number of full clears
    pub clears: u64,
    /// Number of swallowed backend failures
    pub errors: u64,
    /// Seconds since manager creation (or last stats reset)
    pub uptime_seconds: i64,
    /// Manager creation time
    pub created_at: DateTime<Utc>,
    /// Active backend kind
    pub backend: String,
    /// Storage-level statistics, when the backend could report them
    pub backend_stats: Option<BackendStats>,
}

// == Cache Health ==
/// Health status derived from the error rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Health report for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    /// Percentage of operations that failed
    pub error_rate: f64,
    /// Total gets, sets, and deletes observed
    pub total_operations: u64,
    /// Human-readable tuning suggestions
    pub recommendations: Vec<String>,
}

// == Cache Manager ==
/// Wraps a single backend with statistics and a uniform failure contract.
///
/// `get`, `set`, and `delete` never raise for backend-level failures: the
/// failure is counted, logged, and the operation degrades to a miss or no-op.
/// Only `clear` propagates backend errors, since administrative tooling needs
/// visibility into full-clear failures. `InvalidKey` is a caller programming
/// error and is always surfaced.
pub struct CacheManager {
    backend: Box<dyn CacheBackend>,
    counters: Counters,
    created_at: Mutex<DateTime<Utc>>,
}

impl CacheManager {
    // == Constructor ==
    /// Creates a manager owning the given backend.
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        info!(backend = backend.kind(), "cache manager initialized");
        Self {
            backend,
            counters: Counters::default(),
            created_at: Mutex::new(Utc::now()),
        }
    }

    /// Active backend kind label.
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    // == Key Validation ==
    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key must not be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        Ok(())
    }

    fn record_error(&self, op: &str, key: &str, err: &CacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, key, error = %err, "cache backend failure swallowed");
    }

    // == Get ==
    /// Retrieves a value.
    ///
    /// Every call counts as exactly one hit or miss; swallowed backend
    /// failures count as misses. Errors are returned only for invalid keys.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Self::validate_key(key)?;
        match self.backend.get(key) {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit");
                Ok(Some(value))
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache miss");
                Ok(None)
            }
            Err(err) => {
                self.record_error("get", key, &err);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry.
    ///
    /// Returns false when the backend failed and the write was dropped.
    pub fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<bool> {
        self.set_tagged(key, value, ttl, &[])
    }

    /// Stores a value carrying dependency tags.
    pub fn set_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Option<u64>,
        tags: &[String],
    ) -> Result<bool> {
        Self::validate_key(key)?;
        match self.backend.set_tagged(key, value, ttl, tags) {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
                debug!(key, ttl, "cache set");
                Ok(true)
            }
            Err(err) => {
                self.record_error("set", key, &err);
                Ok(false)
            }
        }
    }

    // == Delete ==
    /// Deletes a key.
    ///
    /// Returns false when the key was absent or the backend failed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        Self::validate_key(key)?;
        match self.backend.delete(key) {
            Ok(removed) => {
                if removed {
                    self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "cache delete");
                }
                Ok(removed)
            }
            Err(err) => {
                self.record_error("delete", key, &err);
                Ok(false)
            }
        }
    }

    // == Clear ==
    /// Removes every entry, propagating backend failures to the caller.
    pub fn clear(&self) -> Result<()> {
        match self.backend.clear() {
            Ok(()) => {
                self.counters.clears.fetch_add(1, Ordering::Relaxed);
                info!("cache cleared");
                Ok(())
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    // == Exists ==
    /// Expiry-aware existence check. Does not count as a get.
    pub fn exists(&self, key: &str) -> Result<bool> {
        Self::validate_key(key)?;
        match self.backend.exists(key) {
            Ok(found) => Ok(found),
            Err(err) => {
                self.record_error("exists", key, &err);
                Ok(false)
            }
        }
    }

    // == Get Or Set ==
    /// Returns the cached value, computing and storing it on a miss.
    ///
    /// Concurrent misses for the same key each invoke the factory
    /// independently; there is no single-flight deduplication.
    pub fn get_or_set<F>(&self, key: &str, factory: F, ttl: Option<u64>) -> Result<String>
    where
        F: FnOnce() -> String,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }
        let value = factory();
        self.set(key, &value, ttl)?;
        Ok(value)
    }

    // == Cleanup Expired ==
    /// Eagerly sweeps expired entries, returning the number removed.
    pub fn cleanup_expired(&self) -> usize {
        match self.backend.cleanup_expired() {
            Ok(removed) => removed,
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "expiry sweep failed");
                0
            }
        }
    }

    // == Stats ==
    /// Returns a statistics snapshot including backend-level counters.
    pub fn get_stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 {
            round2(hits as f64 / total_requests as f64 * 100.0)
        } else {
            0.0
        };
        let created_at = *self.created_at.lock();

        CacheStats {
            hits,
            misses,
            hit_rate,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            clears: self.counters.clears.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            uptime_seconds: (Utc::now() - created_at).num_seconds(),
            created_at,
            backend: self.backend.kind().to_string(),
            backend_stats: self.backend.stats().ok(),
        }
    }

    // == Health ==
    /// Derives a health status from the error rate.
    pub fn get_health(&self) -> CacheHealth {
        let stats = self.get_stats();
        let total_operations = stats.hits + stats.misses + stats.sets + stats.deletes;
        let error_rate = if total_operations > 0 {
            round2(stats.errors as f64 / total_operations as f64 * 100.0)
        } else {
            0.0
        };

        let status = if error_rate > DEGRADED_ERROR_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let mut recommendations = Vec::new();
        if stats.hits + stats.misses > 0 && stats.hit_rate < LOW_HIT_RATE {
            recommendations.push(
                "Low cache hit rate. Consider adjusting cache TTL or key strategy.".to_string(),
            );
        }
        if error_rate > DEGRADED_ERROR_RATE {
            recommendations.push(
                "High error rate. Check backend connectivity and storage permissions."
                    .to_string(),
            );
        }

        CacheHealth {
            status,
            error_rate,
            total_operations,
            recommendations,
        }
    }

    // == Reset Stats ==
    /// Resets all counters and the uptime baseline.
    pub fn reset_stats(&self) {
        self.counters.reset();
        *self.created_at.lock() = Utc::now();
        info!("cache statistics reset");
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::Result as CacheResult;

    /// Backend whose every operation fails, for error-contract tests.
    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        fn kind(&self) -> &'static str {
            "failing"
        }
        fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
        fn set_tagged(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<u64>,
            _tags: &[String],
        ) -> CacheResult<()> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
        fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
        fn clear(&self) -> CacheResult<()> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
        fn exists(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
        fn stats(&self) -> CacheResult<crate::backend::BackendStats> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
        fn cleanup_expired(&self) -> CacheResult<usize> {
            Err(CacheError::BackendUnavailable("down".to_string()))
        }
    }

    fn memory_manager() -> CacheManager {
        CacheManager::new(Box::new(MemoryBackend::new()))
    }

    #[test]
    fn test_manager_set_and_get() {
        let manager = memory_manager();

        assert!(manager.set("key1", "value1", None).unwrap());
        assert_eq!(
            manager.get("key1").unwrap(),
            Some("value1".to_string())
        );
    }

    #[test]
    fn test_manager_hit_and_miss_counting() {
        let manager = memory_manager();

        manager.set("key1", "value1", None).unwrap();
        manager.get("key1").unwrap(); // hit
        manager.get("key1").unwrap(); // hit
        manager.get("key2").unwrap(); // miss
        manager.get("key2").unwrap(); // miss

        let stats = manager.get_stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.sets, 1);
    }

    #[test]
    fn test_manager_hit_rate_no_requests() {
        let manager = memory_manager();

        assert_eq!(manager.get_stats().hit_rate, 0.0);
    }

    #[test]
    fn test_manager_invalid_key_is_surfaced() {
        let manager = memory_manager();

        assert!(matches!(
            manager.get(""),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            manager.set("", "value", None),
            Err(CacheError::InvalidKey(_))
        ));

        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            manager.get(&long_key),
            Err(CacheError::InvalidKey(_))
        ));

        // Invalid keys are caller errors, not backend errors
        assert_eq!(manager.get_stats().errors, 0);
    }

    #[test]
    fn test_manager_swallows_backend_failures() {
        let manager = CacheManager::new(Box::new(FailingBackend));

        // get degrades to a miss
        assert_eq!(manager.get("key1").unwrap(), None);
        // set and delete degrade to no-ops
        assert!(!manager.set("key1", "value1", None).unwrap());
        assert!(!manager.delete("key1").unwrap());
        assert!(!manager.exists("key1").unwrap());

        let stats = manager.get_stats();
        assert_eq!(stats.errors, 4);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_manager_clear_propagates_failure() {
        let manager = CacheManager::new(Box::new(FailingBackend));

        assert!(matches!(
            manager.clear(),
            Err(CacheError::BackendUnavailable(_))
        ));
        assert_eq!(manager.get_stats().errors, 1);
    }

    #[test]
    fn test_manager_clear_counts() {
        let manager = memory_manager();

        manager.set("key1", "value1", None).unwrap();
        manager.clear().unwrap();

        assert_eq!(manager.get("key1").unwrap(), None);
        assert_eq!(manager.get_stats().clears, 1);
    }

    #[test]
    fn test_manager_delete_absent_returns_false() {
        let manager = memory_manager();

        assert!(!manager.delete("nonexistent").unwrap());
        assert_eq!(manager.get_stats().deletes, 0);
    }

    #[test]
    fn test_manager_get_or_set_invokes_factory_once() {
        let manager = memory_manager();
        let mut calls = 0;

        let first = manager
            .get_or_set("key1", || {
                calls += 1;
                "computed".to_string()
            }, None)
            .unwrap();
        assert_eq!(first, "computed");
        assert_eq!(calls, 1);

        let second = manager
            .get_or_set("key1", || {
                calls += 1;
                "recomputed".to_string()
            }, None)
            .unwrap();
        assert_eq!(second, "computed");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_manager_health_healthy() {
        let manager = memory_manager();

        for i in 0..10 {
            let key = format!("key{}", i);
            manager.set(&key, "value", None).unwrap();
            manager.get(&key).unwrap();
        }

        let health = manager.get_health();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.error_rate, 0.0);
        assert!(health.recommendations.is_empty());
    }

    #[test]
    fn test_manager_health_degraded() {
        let manager = CacheManager::new(Box::new(FailingBackend));

        for i in 0..10 {
            let key = format!("key{}", i);
            manager.get(&key).unwrap();
        }

        let health = manager.get_health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.error_rate > DEGRADED_ERROR_RATE);
        assert!(!health.recommendations.is_empty());
    }

    #[test]
    fn test_manager_reset_stats() {
        let manager = memory_manager();

        manager.set("key1", "value1", None).unwrap();
        manager.get("key1").unwrap();
        manager.reset_stats();

        let stats = manager.get_stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.sets, 0);
    }

    #[test]
    fn test_manager_backend_stats_included() {
        let manager = memory_manager();
        manager.set("key1", "value1", None).unwrap();

        let stats = manager.get_stats();
        assert_eq!(stats.backend, "memory");
        let backend_stats = stats.backend_stats.unwrap();
        assert_eq!(backend_stats.total_keys, 1);
    }
}
