//! Unified Cache Manager
//!
//! Owns the file content cache and the tool result cache. Each cache keeps
//! its own lock; the manager only fans out invalidation and aggregates
//! statistics.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::config::CacheConfig;
use super::file::FileContentCache;
use super::stats::CacheStats;
use super::tool::ToolResultCache;
use crate::config::WorksetConfig;
use crate::tokenizer::TokenEstimator;

/// Unified Cache Manager
///
/// Constructed explicitly and handed to the tool execution layer; there is
/// no process-wide instance.
///
/// ```rust,ignore
/// let config = WorksetConfig::load()?;
/// let estimator = TokenEstimator::from_config(&config.tokens)?;
/// let caches = CacheManager::new(&config, estimator);
///
/// let read = caches.files().read(path, None, None)?;
/// if let Some(hit) = caches.tools().get("Grep", &params, Some(dir)) {
///     return format!("{} {}", hit.status.marker(), hit.result);
/// }
///
/// // after an Edit/Write
/// caches.on_file_changed(path);
/// ```
#[derive(Debug, Clone)]
pub struct CacheManager {
    config: CacheConfig,
    files: Arc<FileContentCache>,
    tools: Arc<ToolResultCache>,
}

impl CacheManager {
    pub fn new(config: &WorksetConfig, estimator: TokenEstimator) -> Self {
        let files = FileContentCache::new(&config.cache, estimator, config.tokens.max_file_tokens);
        Self::from_parts(config.cache.clone(), files, ToolResultCache::new(&config.cache))
    }

    /// Assemble from pre-built caches
    pub fn from_parts(config: CacheConfig, files: FileContentCache, tools: ToolResultCache) -> Self {
        Self {
            config,
            files: Arc::new(files),
            tools: Arc::new(tools),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn files(&self) -> &Arc<FileContentCache> {
        &self.files
    }

    pub fn tools(&self) -> &Arc<ToolResultCache> {
        &self.tools
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Notify both caches that a path was modified
    pub fn on_file_changed(&self, path: &Path) -> InvalidationReport {
        let report = InvalidationReport {
            files: self.files.invalidate(path),
            tool_results: self.tools.invalidate_for_path(path),
        };
        debug!(path = %path.display(), files = report.files, tool_results = report.tool_results,
            "File change propagated to caches");
        report
    }

    /// Notify both caches about several modified paths
    pub fn on_files_changed<'a, I>(&self, paths: I) -> InvalidationReport
    where
        I: IntoIterator<Item = &'a Path>,
    {
        paths
            .into_iter()
            .map(|p| self.on_file_changed(p))
            .fold(InvalidationReport::default(), |acc, r| InvalidationReport {
                files: acc.files + r.files,
                tool_results: acc.tool_results + r.tool_results,
            })
    }

    pub fn clear(&self) {
        self.files.clear();
        self.tools.clear();
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub fn stats(&self) -> CacheManagerStats {
        CacheManagerStats {
            files: self.files.stats(),
            tools: self.tools.stats(),
        }
    }
}

/// Entries removed by a file change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub files: usize,
    pub tool_results: usize,
}

/// Statistics from both caches
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheManagerStats {
    pub files: CacheStats,
    pub tools: CacheStats,
}

impl CacheManagerStats {
    pub fn combined(&self) -> CacheStats {
        self.files.combined(&self.tools)
    }

    pub fn total_bytes_saved(&self) -> u64 {
        self.files.bytes_saved + self.tools.bytes_saved
    }
}

impl std::fmt::Display for CacheManagerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "files: {}", self.files)?;
        write!(f, "tools: {}", self.tools)
    }
}
