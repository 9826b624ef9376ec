//! Configuration Module
//!
//! Deployment configuration: backend selection, per-backend parameters, and
//! per-cache TTL defaults, loaded from environment variables with sensible
//! defaults.

use std::env;
use std::path::PathBuf;

// == Backend Kind ==
/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process map
    Memory,
    /// Filesystem-backed store
    File,
    /// Networked key-value store (redis)
    Redis,
}

impl BackendKind {
    /// Parses a backend name from configuration.
    ///
    /// Accepts `memory`, `file`, and `redis` (alias `networked`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "file" => Some(Self::File),
            "redis" | "networked" => Some(Self::Redis),
            _ => None,
        }
    }
}

// == Redis Settings ==
/// Connection parameters for the networked backend.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database number
    pub db: i64,
    /// Optional password
    pub password: Option<String>,
    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-operation read/write timeout in seconds
    pub io_timeout_secs: u64,
}

impl RedisSettings {
    /// Builds the connection URL for the redis client.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            connect_timeout_secs: 5,
            io_timeout_secs: 2,
        }
    }
}

// == Cache Config ==
/// Cache subsystem configuration.
///
/// All values can be configured via environment variables with sensible
/// defaults. TTLs are in seconds; a TTL of 0 means no expiry.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Selected storage backend
    pub backend: BackendKind,
    /// Directory for the filesystem backend
    pub file_dir: PathBuf,
    /// Connection parameters for the networked backend
    pub redis: RedisSettings,
    /// TTL for cached configuration structures
    pub config_ttl: u64,
    /// TTL for cached template fragments and pages
    pub template_ttl: u64,
    /// TTL for cached HTTP responses
    pub response_ttl: u64,
    /// Max-Age value advertised in response Cache-Control headers
    pub response_max_age: u64,
    /// Expiry sweeper interval in seconds (0 disables the sweeper)
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `memory`, `file`, or `redis` (default: memory)
    /// - `CACHE_FILE_DIR` - Filesystem backend directory (default: .cache)
    /// - `CACHE_REDIS_HOST` / `CACHE_REDIS_PORT` / `CACHE_REDIS_DB` /
    ///   `CACHE_REDIS_PASSWORD` - Networked backend connection
    /// - `CACHE_CONFIG_TTL` - Config cache TTL in seconds (default: 300)
    /// - `CACHE_TEMPLATE_TTL` - Template cache TTL in seconds (default: 3600)
    /// - `CACHE_RESPONSE_TTL` - Response cache TTL in seconds (default: 3600)
    /// - `CACHE_RESPONSE_MAX_AGE` - Cache-Control max-age (default: 3600)
    /// - `CACHE_SWEEP_INTERVAL` - Sweeper interval in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: env::var("CACHE_BACKEND")
                .ok()
                .and_then(|v| BackendKind::parse(&v))
                .unwrap_or(defaults.backend),
            file_dir: env::var("CACHE_FILE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_dir),
            redis: RedisSettings {
                host: env::var("CACHE_REDIS_HOST").unwrap_or(defaults.redis.host),
                port: env::var("CACHE_REDIS_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.redis.port),
                db: env::var("CACHE_REDIS_DB")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.redis.db),
                password: env::var("CACHE_REDIS_PASSWORD").ok(),
                connect_timeout_secs: defaults.redis.connect_timeout_secs,
                io_timeout_secs: defaults.redis.io_timeout_secs,
            },
            config_ttl: env_u64("CACHE_CONFIG_TTL", defaults.config_ttl),
            template_ttl: env_u64("CACHE_TEMPLATE_TTL", defaults.template_ttl),
            response_ttl: env_u64("CACHE_RESPONSE_TTL", defaults.response_ttl),
            response_max_age: env_u64("CACHE_RESPONSE_MAX_AGE", defaults.response_max_age),
            sweep_interval_secs: env_u64("CACHE_SWEEP_INTERVAL", defaults.sweep_interval_secs),
        }
    }

    /// Converts a configured TTL to the form backends expect.
    ///
    /// A TTL of 0 means no expiry.
    pub fn ttl_option(ttl_secs: u64) -> Option<u64> {
        if ttl_secs == 0 {
            None
        } else {
            Some(ttl_secs)
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            file_dir: PathBuf::from(".cache"),
            redis: RedisSettings::default(),
            config_ttl: 300,
            template_ttl: 3600,
            response_ttl: 3600,
            response_max_age: 3600,
            sweep_interval_secs: 60,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.file_dir, PathBuf::from(".cache"));
        assert_eq!(config.config_ttl, 300);
        assert_eq!(config.template_ttl, 3600);
        assert_eq!(config.response_ttl, 3600);
        assert_eq!(config.sweep_interval_secs, 60);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_BACKEND");
        env::remove_var("CACHE_FILE_DIR");
        env::remove_var("CACHE_CONFIG_TTL");
        env::remove_var("CACHE_TEMPLATE_TTL");
        env::remove_var("CACHE_RESPONSE_TTL");

        let config = CacheConfig::from_env();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.config_ttl, 300);
        assert_eq!(config.template_ttl, 3600);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("memory"), Some(BackendKind::Memory));
        assert_eq!(BackendKind::parse("FILE"), Some(BackendKind::File));
        assert_eq!(BackendKind::parse("redis"), Some(BackendKind::Redis));
        assert_eq!(BackendKind::parse("networked"), Some(BackendKind::Redis));
        assert_eq!(BackendKind::parse("unsupported"), None);
    }

    #[test]
    fn test_redis_url() {
        let settings = RedisSettings::default();
        assert_eq!(settings.url(), "redis://localhost:6379/0");

        let with_password = RedisSettings {
            password: Some("secret".to_string()),
            ..RedisSettings::default()
        };
        assert_eq!(with_password.url(), "redis://:secret@localhost:6379/0");
    }

    #[test]
    fn test_ttl_option() {
        assert_eq!(CacheConfig::ttl_option(0), None);
        assert_eq!(CacheConfig::ttl_option(300), Some(300));
    }
}
