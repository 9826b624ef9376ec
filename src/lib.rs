//! sitecache - Multi-backend cache subsystem for site rendering
//!
//! Provides a uniform storage interface over in-process, filesystem, and
//! networked backends, a statistics-tracking cache manager with a uniform
//! error-swallowing contract, and specialized caches for parsed
//! configuration, rendered templates, and HTTP responses.

pub mod backend;
pub mod config;
pub mod config_cache;
pub mod entry;
pub mod error;
pub mod manager;
pub mod response_cache;
pub mod service;
pub mod tasks;
pub mod template_cache;


// Re-export public types
pub use backend::{BackendStats, CacheBackend, FileBackend, MemoryBackend, RedisBackend, MAX_KEY_LENGTH};
pub use config::{BackendKind, CacheConfig, RedisSettings};
pub use config_cache::{ConfigCache, ConfigCacheStats};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use manager::{CacheHealth, CacheManager, CacheStats, HealthStatus};
pub use response_cache::{
    CachedResponse, ConditionalOutcome, ResponseCache, ResponseCacheStats, ResponseInfo,
};
pub use service::{create_backend, create_manager, CacheService, ServiceStats};
pub use tasks::{spawn_sweeper, SweeperHandle};
pub use template_cache::{
    TemplateCache, TemplateCacheStats, TemplateContext, TemplateKey, WarmReport,
};
