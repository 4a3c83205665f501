//! Tool Result Cache
//!
//! Content-addressed cache for side-effect free tools (Read, Glob, Grep,
//! Search, LS). Tools with side effects (Bash, Write, Edit) are never
//! cached.
//!
//! # Lookup
//!
//! 1. Exact key: tool name + hash of canonical params + target path
//! 2. Fuzzy: same tool and target scope, param signature similarity at or
//!    above `fuzzy_match_threshold`. Fuzzy hits are flagged so the caller
//!    can annotate the output as `(cached, similar query)`.
//!
//! # Invalidation
//!
//! Selective only. A modified path drops entries that target it, target a
//! directory containing it, or mention it in their params.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::stats::{CacheCounters, CacheStats, CacheStatus};
use super::util::{
    canonical_json, hash_json, max_possible_similarity, similarity, InsertOutcome, Lookup,
    LruCache, LruCacheConfig,
};
use crate::Error;

/// Signatures longer than this are only matched exactly
const MAX_FUZZY_SIGNATURE_LEN: usize = 4096;

/// Cache key for tool results
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCacheKey {
    tool: String,
    param_hash: u64,
    target: Option<PathBuf>,
}

impl ToolCacheKey {
    pub fn new(tool: &str, params: &Value, target: Option<&Path>) -> Self {
        Self {
            tool: tool.to_string(),
            param_hash: hash_json(params),
            target: target.map(normalize_path),
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }
}

/// Cached tool result entry
#[derive(Debug)]
pub struct CachedResult {
    result: Arc<str>,
    signature: String,
    scope: Option<String>,
    referenced_paths: Vec<PathBuf>,
    created_at: Instant,
    access_count: AtomicU64,
}

impl CachedResult {
    pub fn result(&self) -> &Arc<str> {
        &self.result
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    fn touch(&self) -> Arc<str> {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        Arc::clone(&self.result)
    }

    fn size_bytes(&self) -> usize {
        self.result.len() + self.signature.len()
    }

    fn depends_on(&self, key: &ToolCacheKey, changed: &Path) -> bool {
        if let Some(target) = &key.target {
            if changed.starts_with(target) {
                return true;
            }
        }
        self.referenced_paths
            .iter()
            .any(|p| changed.starts_with(p) || p.starts_with(changed))
    }
}

/// A cache hit
#[derive(Debug, Clone)]
pub struct ToolHit {
    pub result: Arc<str>,
    pub status: CacheStatus,
    /// 1.0 for exact hits
    pub similarity: f64,
}

impl ToolHit {
    pub fn exact(&self) -> bool {
        self.status.is_exact()
    }
}

/// Tool Result Cache
pub struct ToolResultCache {
    inner: RwLock<LruCache<ToolCacheKey, CachedResult>>,
    cacheable_tools: HashSet<String>,
    fuzzy_threshold: f64,
    lock_timeout: Duration,
    counters: CacheCounters,
}

impl ToolResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_limits(
            config,
            LruCacheConfig::with_limits(config.max_tool_entries, config.memory_limit_bytes)
                .ttl(config.ttl()),
        )
    }

    /// Override the entry lifetime
    pub fn with_ttl(config: &CacheConfig, ttl: Duration) -> Self {
        Self::with_limits(
            config,
            LruCacheConfig::with_limits(config.max_tool_entries, config.memory_limit_bytes)
                .ttl(ttl),
        )
    }

    fn with_limits(config: &CacheConfig, limits: LruCacheConfig) -> Self {
        Self {
            inner: RwLock::new(LruCache::with_config(limits)),
            cacheable_tools: config.cacheable_tools.iter().cloned().collect(),
            fuzzy_threshold: config.fuzzy_match_threshold,
            lock_timeout: config.lock_timeout(),
            counters: CacheCounters::new(),
        }
    }

    /// Check if a tool is cacheable
    pub fn is_cacheable(&self, tool: &str) -> bool {
        self.cacheable_tools.contains(tool)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Look up a result, exact key first, then fuzzy
    pub fn get(&self, tool: &str, params: &Value, target: Option<&Path>) -> Option<ToolHit> {
        if !self.is_cacheable(tool) {
            return None;
        }

        let key = ToolCacheKey::new(tool, params, target);
        let expired = {
            let Some(cache) = self.inner.try_read_for(self.lock_timeout) else {
                self.lock_failed("get", tool);
                return None;
            };

            let expired = match cache.lookup(&key) {
                Lookup::Fresh(entry) => {
                    self.counters.record_hit(entry.result.len());
                    return Some(ToolHit {
                        result: entry.touch(),
                        status: CacheStatus::Hit,
                        similarity: 1.0,
                    });
                }
                Lookup::Expired => true,
                Lookup::Missing => false,
            };

            let signature = canonical_json(params);
            let scope = scope_of(target);
            if let Some((entry, score)) = self.best_fuzzy(&cache, &key, &signature, &scope) {
                debug!(tool, similarity = score, "Fuzzy tool cache hit");
                self.counters.record_fuzzy_hit(entry.result.len());
                return Some(ToolHit {
                    result: entry.touch(),
                    status: CacheStatus::FuzzyHit,
                    similarity: score,
                });
            }
            expired
        };

        self.counters.record_miss();
        if expired {
            if let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) {
                if cache.remove(&key).is_some() {
                    self.counters.record_evictions(1);
                }
            }
        }
        None
    }

    fn best_fuzzy<'a>(
        &self,
        cache: &'a LruCache<ToolCacheKey, CachedResult>,
        key: &ToolCacheKey,
        signature: &str,
        scope: &Option<String>,
    ) -> Option<(&'a CachedResult, f64)> {
        if signature.len() > MAX_FUZZY_SIGNATURE_LEN {
            return None;
        }

        let mut best: Option<(&CachedResult, f64)> = None;
        for (candidate_key, entry) in cache.iter() {
            if candidate_key.tool != key.tool || &entry.scope != scope {
                continue;
            }
            if entry.signature.len() > MAX_FUZZY_SIGNATURE_LEN
                || max_possible_similarity(signature.len(), entry.signature.len())
                    < self.fuzzy_threshold
            {
                continue;
            }

            let score = similarity(signature, &entry.signature);
            if score < self.fuzzy_threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((current, s)) => {
                    score > s || (score == s && entry.signature < current.signature)
                }
            };
            if better {
                best = Some((entry, score));
            }
        }
        best
    }

    // ========================================================================
    // Store
    // ========================================================================

    /// Store a result, replacing any entry with the same key
    ///
    /// Returns false for non-cacheable tools, oversized results, or when
    /// the lock could not be acquired.
    pub fn put(
        &self,
        tool: &str,
        params: &Value,
        target: Option<&Path>,
        result: impl Into<Arc<str>>,
    ) -> bool {
        if !self.is_cacheable(tool) {
            return false;
        }

        let key = ToolCacheKey::new(tool, params, target);
        let entry = CachedResult {
            result: result.into(),
            signature: canonical_json(params),
            scope: scope_of(target),
            referenced_paths: referenced_paths(params),
            created_at: Instant::now(),
            access_count: AtomicU64::new(0),
        };
        let size = entry.size_bytes();

        let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) else {
            self.lock_failed("put", tool);
            return false;
        };

        let expired = cache.purge_expired();
        match cache.insert(key, entry, size) {
            InsertOutcome::Stored { evicted } => {
                self.counters.record_evictions(expired + evicted.len());
                true
            }
            InsertOutcome::Rejected => {
                self.counters.record_evictions(expired);
                debug!(tool, size, "Tool result larger than cache limit, not cached");
                false
            }
        }
    }

    /// Return a cached result or run `exec` and cache its output
    ///
    /// Execution errors are returned as-is and never cached.
    pub async fn get_or_execute<F, Fut, E>(
        &self,
        tool: &str,
        params: &Value,
        target: Option<&Path>,
        exec: F,
    ) -> std::result::Result<(Arc<str>, CacheStatus), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<String, E>>,
    {
        if let Some(hit) = self.get(tool, params, target) {
            return Ok((hit.result, hit.status));
        }

        let output: Arc<str> = exec().await?.into();
        self.put(tool, params, target, Arc::clone(&output));
        Ok((output, CacheStatus::Miss))
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Drop every entry that depends on a modified path
    pub fn invalidate_for_path(&self, path: &Path) -> usize {
        let changed = normalize_path(path);
        let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) else {
            self.lock_failed("invalidate", &path.display().to_string());
            return 0;
        };

        let removed = cache
            .retain(|key, entry| !entry.depends_on(key, &changed))
            .len();
        if removed > 0 {
            debug!(path = %path.display(), removed, "Invalidated cached tool results");
            self.counters.record_invalidations(removed);
        }
        removed
    }

    pub fn clear(&self) {
        if let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) {
            cache.clear();
        }
    }

    // ========================================================================
    // Stats
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = self
            .inner
            .try_read_for(self.lock_timeout)
            .map(|cache| (cache.len(), cache.current_bytes()))
            .unwrap_or_default();
        self.counters.snapshot(entries, bytes)
    }

    pub fn len(&self) -> usize {
        self.inner
            .try_read_for(self.lock_timeout)
            .map(|cache| cache.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_failed(&self, op: &str, subject: &str) {
        let error = Error::CacheUnavailable(format!(
            "tool cache lock not acquired within {}ms",
            self.lock_timeout.as_millis()
        ));
        warn!(op, subject, %error, "Treating as uncached");
        self.counters.record_lock_failure();
    }
}

impl std::fmt::Debug for ToolResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResultCache")
            .field("cacheable_tools", &self.cacheable_tools)
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Drop `.` components so `./src/a.rs` and `src/a.rs` compare equal
fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Fuzzy matching scope: normalized target, trailing separators dropped
fn scope_of(target: Option<&Path>) -> Option<String> {
    target.map(|p| normalize_path(p).to_string_lossy().into_owned())
}

/// Path-like string values inside tool params
fn referenced_paths(params: &Value) -> Vec<PathBuf> {
    let mut out = Vec::new();
    collect_paths(params, &mut out);
    out
}

fn collect_paths(value: &Value, out: &mut Vec<PathBuf>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && !s.contains(char::is_whitespace) {
                let path = normalize_path(Path::new(s));
                if !path.as_os_str().is_empty() {
                    out.push(path);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_paths(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_paths(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> ToolResultCache {
        ToolResultCache::new(&CacheConfig::default())
    }

    #[test]
    fn test_exact_round_trip() {
        let cache = cache();
        let params = json!({"file_path": "src/main.rs"});
        let target = Some(Path::new("src/main.rs"));

        assert!(cache.get("Read", &params, target).is_none());
        assert!(cache.put("Read", &params, target, "fn main() {}"));

        let hit = cache.get("Read", &params, target).unwrap();
        assert!(hit.exact());
        assert_eq!(&*hit.result, "fn main() {}");
        assert_eq!(hit.status.marker(), "(cached)");
    }

    #[test]
    fn test_param_order_is_irrelevant() {
        let cache = cache();
        cache.put("Grep", &json!({"pattern": "foo", "path": "src"}), None, "hits");

        let hit = cache
            .get("Grep", &json!({"path": "src", "pattern": "foo"}), None)
            .unwrap();
        assert!(hit.exact());
    }

    #[test]
    fn test_side_effect_tools_not_cached() {
        let cache = cache();
        let params = json!({"command": "cargo build"});
        assert!(!cache.put("Bash", &params, None, "ok"));
        assert!(cache.get("Bash", &params, None).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_trailing_separator_is_fuzzy_hit() {
        let cache = cache();
        cache.put(
            "Grep",
            &json!({"pattern": "fn main", "path": "src/"}),
            Some(Path::new("src/")),
            "src/main.rs:1:fn main()",
        );

        let hit = cache
            .get(
                "Grep",
                &json!({"pattern": "fn main", "path": "src"}),
                Some(Path::new("src")),
            )
            .unwrap();
        assert_eq!(hit.status, CacheStatus::FuzzyHit);
        assert!(hit.similarity >= 0.85);
        assert_eq!(hit.status.marker(), "(cached, similar query)");
        assert_eq!(cache.stats().fuzzy_hits, 1);
    }

    #[test]
    fn test_fuzzy_requires_same_tool_and_scope() {
        let cache = cache();
        cache.put("Grep", &json!({"pattern": "fn main"}), Some(Path::new("src")), "x");

        assert!(cache
            .get("Glob", &json!({"pattern": "fn main"}), Some(Path::new("src")))
            .is_none());
        assert!(cache
            .get("Grep", &json!({"pattern": "fn mainx"}), Some(Path::new("lib")))
            .is_none());
    }

    #[test]
    fn test_dissimilar_query_misses() {
        let cache = cache();
        cache.put("Grep", &json!({"pattern": "fn main"}), None, "x");
        assert!(cache
            .get("Grep", &json!({"pattern": "struct Config"}), None)
            .is_none());
    }

    #[test]
    fn test_selective_invalidation() {
        let cache = cache();
        cache.put("Read", &json!({"file_path": "src/a.rs"}), Some(Path::new("src/a.rs")), "a");
        cache.put("Read", &json!({"file_path": "src/b.rs"}), Some(Path::new("src/b.rs")), "b");
        cache.put("Read", &json!({"file_path": "src/data.rs"}), Some(Path::new("src/data.rs")), "d");

        assert_eq!(cache.invalidate_for_path(Path::new("src/a.rs")), 1);
        assert!(cache
            .get("Read", &json!({"file_path": "src/b.rs"}), Some(Path::new("src/b.rs")))
            .is_some());
        assert!(cache
            .get("Read", &json!({"file_path": "src/data.rs"}), Some(Path::new("src/data.rs")))
            .is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_directory_scoped_results_invalidated() {
        let cache = cache();
        cache.put("Glob", &json!({"pattern": "*.rs"}), Some(Path::new("src")), "a.rs");
        cache.put("Grep", &json!({"pattern": "x", "path": "./src"}), None, "hit");
        cache.put("Glob", &json!({"pattern": "*.rs"}), Some(Path::new("tests")), "t.rs");

        assert_eq!(cache.invalidate_for_path(Path::new("src/new.rs")), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ToolResultCache::with_ttl(&CacheConfig::default(), Duration::from_millis(300));
        let params = json!({"pattern": "*"});
        cache.put("Glob", &params, None, "x");
        assert!(cache.get("Glob", &params, None).is_some());

        std::thread::sleep(Duration::from_millis(600));
        assert!(cache.get("Glob", &params, None).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lock_timeout_is_a_miss() {
        let cache = cache();
        let params = json!({"pattern": "*"});
        cache.put("Glob", &params, None, "x");

        {
            let _held = cache.inner.write();
            assert!(cache.get("Glob", &params, None).is_none());
            assert!(!cache.put("Glob", &params, None, "y"));
        }

        let stats = cache.stats();
        assert_eq!(stats.lock_failures, 2);
        assert!(cache.get("Glob", &params, None).is_some());
    }

    #[test]
    fn test_access_count_and_shared_buffer() {
        let cache = cache();
        let params = json!({"pattern": "*"});
        cache.put("Glob", &params, None, "big result");

        let a = cache.get("Glob", &params, None).unwrap().result;
        let b = cache.get("Glob", &params, None).unwrap().result;
        assert!(Arc::ptr_eq(&a, &b));

        let key = ToolCacheKey::new("Glob", &params, None);
        let guard = cache.inner.read();
        assert_eq!(guard.peek(&key).unwrap().access_count(), 2);
    }

    #[tokio::test]
    async fn test_get_or_execute() {
        let cache = cache();
        let params = json!({"pattern": "TODO"});

        let (out, status) = cache
            .get_or_execute("Grep", &params, None, || async {
                Ok::<_, std::io::Error>("a.rs:3: TODO".to_string())
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(&*out, "a.rs:3: TODO");

        let (_, status) = cache
            .get_or_execute("Grep", &params, None, || async {
                Err::<String, _>(std::io::Error::other("should not run"))
            })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access() {
        let cache = Arc::new(cache());
        let mut handles = Vec::new();

        for i in 0..32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let path = PathBuf::from(format!("src/f{}.rs", i % 8));
                let params = json!({"file_path": path});
                for _ in 0..50 {
                    if cache.get("Read", &params, Some(&path)).is_none() {
                        cache.put("Read", &params, Some(&path), format!("content {}", i % 8));
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 8);
        let stats = cache.stats();
        assert!(stats.hits > 0);
    }
}
