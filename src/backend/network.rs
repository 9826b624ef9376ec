//! Networked Backend Module
//!
//! Cache storage delegated to a redis server over a synchronous client
//! connection with bounded timeouts.

use std::time::Duration;

use parking_lot::Mutex;
use redis::{Commands, Connection};
use tracing::{debug, info};

use crate::backend::{BackendStats, CacheBackend};
use crate::config::RedisSettings;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};

// == Redis Backend ==
/// Networked key-value backend.
///
/// Whole entries are stored as JSON; the TTL is additionally passed natively
/// so the server expires entries without any sweep from this process.
/// Connection and I/O failures surface as `BackendUnavailable` and are
/// absorbed by the manager, never raised to the specialized caches.
pub struct RedisBackend {
    /// Client connection, shared across calling threads
    conn: Mutex<Connection>,
}

impl RedisBackend {
    // == Constructor ==
    /// Connects to the configured server and verifies the connection with a
    /// PING.
    pub fn connect(settings: &RedisSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url())?;
        let mut conn = client
            .get_connection_with_timeout(Duration::from_secs(settings.connect_timeout_secs))?;

        let io_timeout = Some(Duration::from_secs(settings.io_timeout_secs));
        conn.set_read_timeout(io_timeout)?;
        conn.set_write_timeout(io_timeout)?;

        redis::cmd("PING").query::<String>(&mut conn)?;
        info!(
            host = %settings.host,
            port = settings.port,
            "redis backend connected"
        );

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheBackend for RedisBackend {
    fn kind(&self) -> &'static str {
        "redis"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.lock();
        let raw: Option<String> = conn.get(key)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.is_expired() => {
                let _: i64 = conn.del(key)?;
                Ok(None)
            }
            Ok(entry) => Ok(Some(entry.value)),
            Err(err) => {
                debug!(key, "purging unreadable redis entry");
                let _: i64 = conn.del(key)?;
                Err(CacheError::Serialization(err.to_string()))
            }
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
        let raw = serde_json::to_string(&entry)?;

        let mut conn = self.conn.lock();
        match ttl {
            Some(secs) if secs > 0 => {
                let _: () = conn.set_ex(key, raw, secs)?;
            }
            _ => {
                let _: () = conn.set(key, raw)?;
            }
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.lock();
        let removed: i64 = conn.del(key)?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        redis::cmd("FLUSHDB").query::<()>(&mut conn)?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        // Native TTL keeps the server view expiry-accurate
        let mut conn = self.conn.lock();
        let exists: bool = conn.exists(key)?;
        Ok(exists)
    }

    fn stats(&self) -> Result<BackendStats> {
        let mut conn = self.conn.lock();
        let total_keys: usize = redis::cmd("DBSIZE").query(&mut conn)?;

        Ok(BackendStats {
            kind: self.kind().to_string(),
            total_keys,
            // The server does not expose per-key payload sizes cheaply
            estimated_size_bytes: 0,
            expired_keys: 0,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        // Expiry is handled server-side via native TTL
        Ok(0)
    }
}
