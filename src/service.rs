//! Cache Service Module
//!
//! Startup wiring: builds the configured backend, the shared manager, and
//! the specialized caches, and aggregates statistics for admin tooling. The
//! backend kind is branched on exactly once, here.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::backend::{CacheBackend, FileBackend, MemoryBackend, RedisBackend};
use crate::config::{BackendKind, CacheConfig};
use crate::error::Result;
use crate::manager::{CacheHealth, CacheManager, CacheStats};
use crate::response_cache::{ResponseCache, ResponseCacheStats};
use crate::template_cache::{TemplateCache, TemplateCacheStats};

// == Backend Factory ==
/// Builds the backend selected by the configuration.
pub fn create_backend(config: &CacheConfig) -> Result<Box<dyn CacheBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Box::new(MemoryBackend::new())),
        BackendKind::File => Ok(Box::new(FileBackend::new(&config.file_dir)?)),
        BackendKind::Redis => Ok(Box::new(RedisBackend::connect(&config.redis)?)),
    }
}

/// Builds a shared manager over the configured backend.
pub fn create_manager(config: &CacheConfig) -> Result<Arc<CacheManager>> {
    Ok(Arc::new(CacheManager::new(create_backend(config)?)))
}

// == Cache Service ==
/// Bundles the shared manager with the template and response caches.
///
/// One service instance is constructed at process start and passed by
/// reference into every caller; nothing here is global state. Config caches
/// are generic over their parsed type, so callers construct those directly
/// with [`ConfigCache::new`](crate::config_cache::ConfigCache::new) against
/// [`manager`](Self::manager).
pub struct CacheService {
    manager: Arc<CacheManager>,
    template_cache: TemplateCache,
    response_cache: ResponseCache,
}

impl CacheService {
    // == Constructors ==
    /// Builds the full service from deployment configuration.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let manager = create_manager(config)?;
        Ok(Self::new(manager, config))
    }

    /// Wires the specialized caches over an existing manager.
    pub fn new(manager: Arc<CacheManager>, config: &CacheConfig) -> Self {
        let template_cache = TemplateCache::new(
            manager.clone(),
            CacheConfig::ttl_option(config.template_ttl),
        );
        let response_cache = ResponseCache::new(
            manager.clone(),
            CacheConfig::ttl_option(config.response_ttl),
            config.response_max_age,
        );
        info!(backend = manager.backend_kind(), "cache service initialized");

        Self {
            manager,
            template_cache,
            response_cache,
        }
    }

    // == Accessors ==
    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub fn template_cache(&self) -> &TemplateCache {
        &self.template_cache
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.response_cache
    }

    // == Administrative Operations ==
    /// Clears every cache sharing the backend. Failures propagate.
    pub fn clear_all(&self) -> Result<()> {
        info!("clearing all caches");
        self.manager.clear()
    }

    /// Removes every tracked template entry, leaving other caches intact.
    pub fn clear_template_cache(&self) -> usize {
        self.template_cache.invalidate_all()
    }

    // == Comprehensive Stats ==
    /// Aggregated statistics and health for admin tooling.
    pub fn comprehensive_stats(&self) -> ServiceStats {
        ServiceStats {
            manager: self.manager.get_stats(),
            health: self.manager.get_health(),
            template: self.template_cache.stats(),
            response: self.response_cache.stats(),
        }
    }
}

// == Service Stats ==
/// Aggregated statistics across the cache subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub manager: CacheStats,
    pub health: CacheHealth,
    pub template: TemplateCacheStats,
    pub response: ResponseCacheStats,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_backend_memory() {
        let config = CacheConfig::default();
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.kind(), "memory");
    }

    #[test]
    fn test_create_backend_file() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig {
            backend: BackendKind::File,
            file_dir: temp.path().to_path_buf(),
            ..CacheConfig::default()
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.kind(), "file");
    }

    #[test]
    fn test_service_wiring() {
        let service = CacheService::from_config(&CacheConfig::default()).unwrap();

        service.manager().set("key1", "value1", None).unwrap();
        assert_eq!(
            service.manager().get("key1").unwrap(),
            Some("value1".to_string())
        );
    }

    #[test]
    fn test_service_clear_all() {
        let service = CacheService::from_config(&CacheConfig::default()).unwrap();

        service.manager().set("key1", "value1", None).unwrap();
        service.clear_all().unwrap();

        assert_eq!(service.manager().get("key1").unwrap(), None);
    }

    #[test]
    fn test_service_clear_template_cache_is_isolated() {
        let service = CacheService::from_config(&CacheConfig::default()).unwrap();
        let ctx = serde_json::Map::new();

        service
            .template_cache()
            .cache_fragment("header", &ctx, |_| "html".to_string(), None, &[])
            .unwrap();
        service
            .response_cache()
            .cache_response("/about", None, || "body".to_string(), None, true)
            .unwrap();

        assert_eq!(service.clear_template_cache(), 1);

        // Response cache untouched
        let info = service.response_cache().cache_info("/about", None).unwrap();
        assert!(info.is_some());
    }

    #[test]
    fn test_comprehensive_stats() {
        let service = CacheService::from_config(&CacheConfig::default()).unwrap();

        service.manager().set("key1", "value1", None).unwrap();
        service.manager().get("key1").unwrap();

        let stats = service.comprehensive_stats();
        assert_eq!(stats.manager.hits, 1);
        assert_eq!(stats.template.tracked_keys, 0);
        assert_eq!(stats.response.max_age, 3600);
    }
}
