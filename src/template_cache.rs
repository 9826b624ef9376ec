//! Template Cache Module
//!
//! Caches rendered fragments and pages keyed by template identity and a
//! stable context hash, with tag-based invalidation through an explicit
//! reverse index.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manager::CacheManager;

/// Context mapping handed to render functions.
pub type TemplateContext = Map<String, Value>;

type Warmer = Box<dyn Fn() -> Result<()> + Send + Sync>;

// == Template Keys ==
/// Builders for the template cache keyspace.
///
/// Fragments and pages share one keyspace and one tag mechanism; they differ
/// only in how the key is constructed.
pub struct TemplateKey;

impl TemplateKey {
    /// Cache key for a template fragment.
    pub fn fragment(template_id: &str, context_hash: &str) -> String {
        format!("template:fragment:{}:{}", template_id, context_hash)
    }

    /// Cache key for a full page.
    pub fn page(url: &str, context_hash: &str) -> String {
        format!("template:page:{}:{}", url, context_hash)
    }

    /// Stable hash of a context map, independent of insertion order.
    pub fn context_hash(context: &TemplateContext) -> String {
        let ordered: BTreeMap<&String, &Value> = context.iter().collect();
        match serde_json::to_string(&ordered) {
            Ok(canonical) => {
                let digest = Sha256::digest(canonical.as_bytes());
                hex::encode(&digest[..8])
            }
            Err(err) => {
                warn!(error = %err, "could not hash template context");
                "unknown".to_string()
            }
        }
    }
}

// == Tag Index ==
/// Tracks every cached template key and its dependency tags.
///
/// Both directions are kept so tag invalidation never scans the keyspace and
/// overwrites never leak stale tag links.
#[derive(Debug, Default)]
struct TagIndex {
    /// Every tracked key with the tags it was stored under
    keys: HashMap<String, Vec<String>>,
    /// Reverse index from dependency tag to the keys carrying it
    tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    fn insert(&mut self, key: &str, tags: &[String]) {
        self.remove(key);
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.keys.insert(key.to_string(), tags.to_vec());
    }

    fn remove(&mut self, key: &str) {
        if let Some(tags) = self.keys.remove(key) {
            for tag in tags {
                if let Some(keys) = self.tags.get_mut(&tag) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.tags.remove(&tag);
                    }
                }
            }
        }
    }

    /// Removes a tag entirely, returning the keys that carried it.
    fn take_tag(&mut self, tag: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .tags
            .remove(tag)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        for key in &keys {
            self.remove(key);
        }
        keys
    }

    /// Returns tracked keys starting with the given prefix.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

// == Template Cache ==
/// Fragment and page caching with dependency-based invalidation.
pub struct TemplateCache {
    manager: Arc<CacheManager>,
    /// TTL applied when callers pass none, None for no expiry
    default_ttl: Option<u64>,
    index: Mutex<TagIndex>,
    warmers: Mutex<Vec<(String, Warmer)>>,
}

impl TemplateCache {
    // == Constructor ==
    /// Creates a template cache over the shared manager.
    pub fn new(manager: Arc<CacheManager>, default_ttl: Option<u64>) -> Self {
        debug!("template cache initialized");
        Self {
            manager,
            default_ttl,
            index: Mutex::new(TagIndex::default()),
            warmers: Mutex::new(Vec::new()),
        }
    }

    // == Cache Fragment ==
    /// Returns the cached fragment, rendering and storing it on a miss.
    ///
    /// # Arguments
    /// * `template_id` - Template identifier
    /// * `context` - Render context; hashed into the cache key
    /// * `render_fn` - Renderer invoked only on a miss
    /// * `ttl` - TTL in seconds, falling back to the cache default
    /// * `dependencies` - Tags under which the entry can be invalidated
    pub fn cache_fragment<F>(
        &self,
        template_id: &str,
        context: &TemplateContext,
        render_fn: F,
        ttl: Option<u64>,
        dependencies: &[String],
    ) -> Result<String>
    where
        F: FnOnce(&TemplateContext) -> String,
    {
        let context_hash = TemplateKey::context_hash(context);
        let key = TemplateKey::fragment(template_id, &context_hash);
        self.render_through(&key, template_id, context, render_fn, ttl, dependencies)
    }

    // == Cache Page ==
    /// Returns the cached page, rendering and storing it on a miss.
    ///
    /// Same mechanism as fragments, keyed by page URL instead of template
    /// identifier.
    pub fn cache_page<F>(
        &self,
        url: &str,
        context: &TemplateContext,
        render_fn: F,
        ttl: Option<u64>,
        dependencies: &[String],
    ) -> Result<String>
    where
        F: FnOnce(&TemplateContext) -> String,
    {
        let context_hash = TemplateKey::context_hash(context);
        let key = TemplateKey::page(url, &context_hash);
        self.render_through(&key, url, context, render_fn, ttl, dependencies)
    }

    fn render_through<F>(
        &self,
        key: &str,
        what: &str,
        context: &TemplateContext,
        render_fn: F,
        ttl: Option<u64>,
        dependencies: &[String],
    ) -> Result<String>
    where
        F: FnOnce(&TemplateContext) -> String,
    {
        if let Some(cached) = self.manager.get(key)? {
            debug!(what, "template served from cache");
            return Ok(cached);
        }

        debug!(what, "rendering template");
        let rendered = render_fn(context);

        if self
            .manager
            .set_tagged(key, &rendered, ttl.or(self.default_ttl), dependencies)?
        {
            self.index.lock().insert(key, dependencies);
        }

        Ok(rendered)
    }

    // == Invalidate Fragment ==
    /// Removes every cached version of a fragment, any context hash.
    ///
    /// Returns the number of entries invalidated.
    pub fn invalidate_fragment(&self, template_id: &str) -> usize {
        let prefix = format!("template:fragment:{}:", template_id);
        let invalidated = self.invalidate_prefix(&prefix);
        if invalidated > 0 {
            info!(template_id, invalidated, "fragment invalidated");
        }
        invalidated
    }

    // == Invalidate Page ==
    /// Removes every cached version of a page, any context hash.
    pub fn invalidate_page(&self, url: &str) -> usize {
        let prefix = format!("template:page:{}:", url);
        let invalidated = self.invalidate_prefix(&prefix);
        if invalidated > 0 {
            info!(url, invalidated, "page invalidated");
        }
        invalidated
    }

    // == Invalidate All Pages ==
    /// Removes every cached page.
    pub fn invalidate_all_pages(&self) -> usize {
        let invalidated = self.invalidate_prefix("template:page:");
        if invalidated > 0 {
            info!(invalidated, "all cached pages invalidated");
        }
        invalidated
    }

    /// Removes every tracked template entry, fragments and pages alike.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_prefix("template:")
    }

    fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys = {
            let index = self.index.lock();
            index.keys_with_prefix(prefix)
        };

        let mut invalidated = 0;
        for key in keys {
            match self.manager.delete(&key) {
                Ok(_) => invalidated += 1,
                Err(err) => warn!(key = %key, error = %err, "template invalidation failed"),
            }
            self.index.lock().remove(&key);
        }
        invalidated
    }

    // == Invalidate By Dependency ==
    /// Removes every entry registered under a dependency tag.
    ///
    /// Partial backend failures are logged, but the tag's index entry is
    /// always cleared so stale tag references never accumulate. Invalidating
    /// an unknown tag is a no-op.
    pub fn invalidate_by_dependency(&self, tag: &str) -> usize {
        let keys = self.index.lock().take_tag(tag);
        if keys.is_empty() {
            return 0;
        }

        let mut invalidated = 0;
        for key in &keys {
            match self.manager.delete(key) {
                Ok(_) => invalidated += 1,
                Err(err) => warn!(key = %key, error = %err, "dependency invalidation failed"),
            }
        }

        info!(tag, invalidated, "invalidated entries by dependency");
        invalidated
    }

    // == Cache Warming ==
    /// Registers a named warm function for [`warm`](Self::warm).
    pub fn register_warmer(
        &self,
        name: impl Into<String>,
        warmer: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!(name = %name, "registered cache warmer");
        self.warmers.lock().push((name, Box::new(warmer)));
    }

    /// Runs every registered warm function, collecting failures.
    pub fn warm(&self) -> WarmReport {
        let warmers = self.warmers.lock();
        info!(total = warmers.len(), "starting cache warming");

        let mut report = WarmReport {
            total: warmers.len(),
            successful: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for (name, warmer) in warmers.iter() {
            match warmer() {
                Ok(()) => report.successful += 1,
                Err(err) => {
                    warn!(name = %name, error = %err, "cache warming failed");
                    report.failed += 1;
                    report.errors.push(WarmError {
                        name: name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            successful = report.successful,
            total = report.total,
            "cache warming complete"
        );
        report
    }

    // == Stats ==
    /// Returns template cache state for admin tooling.
    pub fn stats(&self) -> TemplateCacheStats {
        let index = self.index.lock();
        TemplateCacheStats {
            tracked_keys: index.keys.len(),
            tracked_tags: index.tags.len(),
            registered_warmers: self.warmers.lock().len(),
            default_ttl: self.default_ttl,
        }
    }
}

// == Warm Report ==
/// Outcome of a cache warming run.
#[derive(Debug, Clone, Serialize)]
pub struct WarmReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<WarmError>,
}

/// A single warmer failure.
#[derive(Debug, Clone, Serialize)]
pub struct WarmError {
    pub name: String,
    pub error: String,
}

// == Template Cache Stats ==
/// Template cache state for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateCacheStats {
    pub tracked_keys: usize,
    pub tracked_tags: usize,
    pub registered_warmers: usize,
    pub default_ttl: Option<u64>,
}
