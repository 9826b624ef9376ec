//! Response Cache Module
//!
//! Caches fully rendered response bodies keyed by URL and answers
//! conditional requests from stored ETags and timestamps, so unchanged
//! content is confirmed without re-rendering or resending.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manager::CacheManager;

// == Cached Response ==
/// A cached rendered response with its validators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Rendered response body
    pub body: String,
    /// Headers to attach when delivering the body
    pub headers: Vec<(String, String)>,
    /// Content hash of the body
    pub etag: String,
    /// Render time, used for If-Modified-Since
    pub last_modified: DateTime<Utc>,
}

// == Conditional Outcome ==
/// Result of a conditional request lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalOutcome {
    /// No cached record; the caller renders normally
    NotCached,
    /// Validators matched; the caller responds 304 without a body
    NotModified {
        etag: String,
        last_modified: DateTime<Utc>,
    },
    /// Validators did not match; full cached response for normal delivery
    Fresh(CachedResponse),
}

// == Response Cache ==
/// Response body caching with ETag and conditional request support.
pub struct ResponseCache {
    manager: Arc<CacheManager>,
    /// TTL applied when callers pass none, None for no expiry
    default_ttl: Option<u64>,
    /// Max-Age advertised in Cache-Control headers
    max_age: u64,
}

impl ResponseCache {
    // == Constructor ==
    /// Creates a response cache over the shared manager.
    pub fn new(manager: Arc<CacheManager>, default_ttl: Option<u64>, max_age: u64) -> Self {
        debug!("response cache initialized");
        Self {
            manager,
            default_ttl,
            max_age,
        }
    }

    // == Key Construction ==
    /// Cache key for a URL with an optional variant discriminator
    /// (e.g. a query string).
    fn response_key(url: &str, variant: Option<&str>) -> String {
        match variant {
            Some(variant) => format!("response:{}?{}", url, variant),
            None => format!("response:{}", url),
        }
    }

    // == ETag ==
    /// Content hash of a response body.
    ///
    /// Identical bodies always produce identical ETags.
    pub(crate) fn generate_etag(body: &str) -> String {
        let digest = Sha256::digest(body.as_bytes());
        hex::encode(&digest[..8])
    }

    fn build_cache_control(&self, public: bool) -> String {
        let scope = if public { "public" } else { "private" };
        format!("{}, max-age={}, must-revalidate", scope, self.max_age)
    }

    /// Fetches and parses the cached record, purging it when unreadable.
    fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        let Some(raw) = self.manager.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(key, error = %err, "cached response unreadable, purging");
                self.manager.delete(key)?;
                Ok(None)
            }
        }
    }

    // == Cache Response ==
    /// Returns the cached response, rendering and storing it on a miss.
    ///
    /// # Arguments
    /// * `url` - Request URL
    /// * `variant` - Optional variant discriminator (e.g. query string)
    /// * `render_fn` - Renderer invoked only on a miss
    /// * `ttl` - TTL in seconds, falling back to the cache default
    /// * `public` - Whether the response is publicly cacheable
    pub fn cache_response<F>(
        &self,
        url: &str,
        variant: Option<&str>,
        render_fn: F,
        ttl: Option<u64>,
        public: bool,
    ) -> Result<CachedResponse>
    where
        F: FnOnce() -> String,
    {
        let key = Self::response_key(url, variant);

        if let Some(record) = self.lookup(&key)? {
            debug!(url, "response served from cache");
            return Ok(record);
        }

        debug!(url, "rendering response");
        let body = render_fn();
        let etag = Self::generate_etag(&body);
        let last_modified = Utc::now();

        let headers = vec![
            ("Cache-Control".to_string(), self.build_cache_control(public)),
            ("ETag".to_string(), format!("\"{}\"", etag)),
            ("Last-Modified".to_string(), last_modified.to_rfc3339()),
            ("Vary".to_string(), "Accept-Encoding".to_string()),
        ];

        let record = CachedResponse {
            body,
            headers,
            etag,
            last_modified,
        };

        let raw = serde_json::to_string(&record)?;
        self.manager
            .set(&key, &raw, ttl.or(self.default_ttl))?;

        Ok(record)
    }

    // == Conditional Requests ==
    /// Answers a conditional request from the cached record.
    ///
    /// Returns `NotModified` when `If-None-Match` equals the stored ETag
    /// (quotes ignored) or `If-Modified-Since` is not older than the stored
    /// render time. Timestamps use RFC 3339, matching the `Last-Modified`
    /// values this cache hands out; unparseable values are ignored.
    pub fn handle_conditional_request(
        &self,
        url: &str,
        variant: Option<&str>,
        if_none_match: Option<&str>,
        if_modified_since: Option<&str>,
    ) -> Result<ConditionalOutcome> {
        let key = Self::response_key(url, variant);

        let Some(record) = self.lookup(&key)? else {
            return Ok(ConditionalOutcome::NotCached);
        };

        if let Some(candidate) = if_none_match {
            if candidate.trim_matches('"') == record.etag {
                debug!(url, "not modified (etag)");
                return Ok(ConditionalOutcome::NotModified {
                    etag: record.etag,
                    last_modified: record.last_modified,
                });
            }
        }

        if let Some(candidate) = if_modified_since {
            match DateTime::parse_from_rfc3339(candidate) {
                Ok(since) if since.with_timezone(&Utc) >= record.last_modified => {
                    debug!(url, "not modified (last-modified)");
                    return Ok(ConditionalOutcome::NotModified {
                        etag: record.etag,
                        last_modified: record.last_modified,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(url, error = %err, "ignoring unparseable If-Modified-Since")
                }
            }
        }

        Ok(ConditionalOutcome::Fresh(record))
    }

    // == Invalidate ==
    /// Removes the cached response for a URL. Returns false when nothing was
    /// cached.
    pub fn invalidate_response(&self, url: &str, variant: Option<&str>) -> Result<bool> {
        let key = Self::response_key(url, variant);
        let removed = self.manager.delete(&key)?;
        if removed {
            info!(url, "response invalidated");
        }
        Ok(removed)
    }

    // == Cache Info ==
    /// Returns validator info for a cached URL, or None when absent.
    pub fn cache_info(&self, url: &str, variant: Option<&str>) -> Result<Option<ResponseInfo>> {
        let key = Self::response_key(url, variant);
        Ok(self.lookup(&key)?.map(|record| ResponseInfo {
            url: url.to_string(),
            etag: record.etag,
            last_modified: record.last_modified,
            content_length: record.body.len(),
        }))
    }

    // == Stats ==
    /// Returns response cache settings for admin tooling.
    pub fn stats(&self) -> ResponseCacheStats {
        ResponseCacheStats {
            default_ttl: self.default_ttl,
            max_age: self.max_age,
        }
    }
}

// == Response Info ==
/// Validator info for a cached URL.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseInfo {
    pub url: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_length: usize,
}

// == Response Cache Stats ==
/// Response cache settings for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseCacheStats {
    pub default_ttl: Option<u64>,
    pub max_age: u64,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn response_cache() -> ResponseCache {
        let manager = Arc::new(CacheManager::new(Box::new(MemoryBackend::new())));
        ResponseCache::new(manager, Some(3600), 3600)
    }

    fn counting_render<'a>(calls: &'a AtomicU64, body: &'a str) -> impl FnOnce() -> String + 'a {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            body.to_string()
        }
    }

    #[test]
    fn test_response_rendered_once_while_cached() {
        let cache = response_cache();
        let calls = AtomicU64::new(0);

        let first = cache
            .cache_response("/about", None, counting_render(&calls, "<html>about</html>"), None, true)
            .unwrap();
        let second = cache
            .cache_response("/about", None, counting_render(&calls, "<html>about</html>"), None, true)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_etag_determinism() {
        let etag_a1 = ResponseCache::generate_etag("body A");
        let etag_a2 = ResponseCache::generate_etag("body A");
        let etag_b = ResponseCache::generate_etag("body B");

        assert_eq!(etag_a1, etag_a2);
        assert_ne!(etag_a1, etag_b);
    }

    #[test]
    fn test_response_headers() {
        let cache = response_cache();

        let record = cache
            .cache_response("/about", None, || "<html></html>".to_string(), None, true)
            .unwrap();

        let header = |name: &str| {
            record
                .headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(
            header("Cache-Control").unwrap(),
            "public, max-age=3600, must-revalidate"
        );
        assert_eq!(header("ETag").unwrap(), format!("\"{}\"", record.etag));
        assert!(header("Last-Modified").is_some());
        assert_eq!(header("Vary").unwrap(), "Accept-Encoding");
    }

    #[test]
    fn test_private_cache_control() {
        let cache = response_cache();

        let record = cache
            .cache_response("/account", None, || "<html></html>".to_string(), None, false)
            .unwrap();

        let cache_control = record
            .headers
            .iter()
            .find(|(n, _)| n == "Cache-Control")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(cache_control.starts_with("private"));
    }

    #[test]
    fn test_conditional_etag_match_short_circuits() {
        let cache = response_cache();
        let calls = AtomicU64::new(0);

        let record = cache
            .cache_response("/about", None, counting_render(&calls, "<html>about</html>"), None, true)
            .unwrap();

        let outcome = cache
            .handle_conditional_request("/about", None, Some(&record.etag), None)
            .unwrap();

        assert!(matches!(outcome, ConditionalOutcome::NotModified { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "render_fn not invoked again");
    }

    #[test]
    fn test_conditional_etag_quotes_are_stripped() {
        let cache = response_cache();

        let record = cache
            .cache_response("/about", None, || "body".to_string(), None, true)
            .unwrap();

        let quoted = format!("\"{}\"", record.etag);
        let outcome = cache
            .handle_conditional_request("/about", None, Some(&quoted), None)
            .unwrap();

        assert!(matches!(outcome, ConditionalOutcome::NotModified { .. }));
    }

    #[test]
    fn test_conditional_etag_mismatch_returns_body() {
        let cache = response_cache();

        cache
            .cache_response("/about", None, || "body".to_string(), None, true)
            .unwrap();

        let outcome = cache
            .handle_conditional_request("/about", None, Some("stale-etag"), None)
            .unwrap();

        match outcome {
            ConditionalOutcome::Fresh(record) => assert_eq!(record.body, "body"),
            other => panic!("expected fresh response, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_if_modified_since() {
        let cache = response_cache();

        let record = cache
            .cache_response("/about", None, || "body".to_string(), None, true)
            .unwrap();

        // Client timestamp at (or after) the render time: not modified
        let current = record.last_modified.to_rfc3339();
        let outcome = cache
            .handle_conditional_request("/about", None, None, Some(&current))
            .unwrap();
        assert!(matches!(outcome, ConditionalOutcome::NotModified { .. }));

        // Older client timestamp: full response
        let stale = (record.last_modified - chrono::Duration::seconds(60)).to_rfc3339();
        let outcome = cache
            .handle_conditional_request("/about", None, None, Some(&stale))
            .unwrap();
        assert!(matches!(outcome, ConditionalOutcome::Fresh(_)));
    }

    #[test]
    fn test_conditional_unparseable_date_is_ignored() {
        let cache = response_cache();

        cache
            .cache_response("/about", None, || "body".to_string(), None, true)
            .unwrap();

        let outcome = cache
            .handle_conditional_request("/about", None, None, Some("not a date"))
            .unwrap();
        assert!(matches!(outcome, ConditionalOutcome::Fresh(_)));
    }

    #[test]
    fn test_conditional_uncached_url() {
        let cache = response_cache();

        let outcome = cache
            .handle_conditional_request("/missing", None, Some("etag"), None)
            .unwrap();
        assert_eq!(outcome, ConditionalOutcome::NotCached);
    }

    #[test]
    fn test_variant_keys_are_distinct() {
        let cache = response_cache();
        let calls = AtomicU64::new(0);

        cache
            .cache_response("/list", Some("page=1"), counting_render(&calls, "page one"), None, true)
            .unwrap();
        cache
            .cache_response("/list", Some("page=2"), counting_render(&calls, "page two"), None, true)
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let outcome = cache
            .handle_conditional_request("/list", Some("page=1"), None, None)
            .unwrap();
        match outcome {
            ConditionalOutcome::Fresh(record) => assert_eq!(record.body, "page one"),
            other => panic!("expected fresh response, got {:?}", other),
        }
    }

    #[test]
    fn test_invalidate_response() {
        let cache = response_cache();
        let calls = AtomicU64::new(0);

        cache
            .cache_response("/about", None, counting_render(&calls, "body"), None, true)
            .unwrap();
        assert!(cache.invalidate_response("/about", None).unwrap());
        assert!(!cache.invalidate_response("/about", None).unwrap());

        cache
            .cache_response("/about", None, counting_render(&calls, "body"), None, true)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "invalidation forces re-render");
    }

    #[test]
    fn test_cache_info() {
        let cache = response_cache();

        assert!(cache.cache_info("/about", None).unwrap().is_none());

        let record = cache
            .cache_response("/about", None, || "body".to_string(), None, true)
            .unwrap();

        let info = cache.cache_info("/about", None).unwrap().unwrap();
        assert_eq!(info.etag, record.etag);
        assert_eq!(info.content_length, 4);
    }
}
