//! File Content Cache
//!
//! Path-keyed cache of raw file reads. Each entry remembers which line
//! ranges have already been handed to the model so repeated reads return a
//! reference marker (or only the unseen delta) instead of duplicate bytes.
//!
//! # Invalidation
//!
//! - **mtime**: every access compares the source mtime with the stored one
//! - **TTL**: checked lazily on access, no background sweep
//! - **LRU**: inline on insert once the byte limit would be exceeded
//!
//! # Locking
//!
//! One `RwLock` owned by this cache alone. Every acquisition is bounded by
//! `lock_timeout`; a timeout is logged and treated as a miss.

use parking_lot::RwLock;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::stats::{CacheCounters, CacheStats, CacheStatus};
use super::util::{InsertOutcome, Lookup, LruCache, LruCacheConfig};
use crate::tokenizer::TokenEstimator;
use crate::{Error, Result};

/// Lines returned when a read has no explicit limit
pub const DEFAULT_READ_LIMIT: usize = 2000;

// ============================================================================
// File source
// ============================================================================

/// Where file metadata and content come from
pub trait FileSource: Send + Sync {
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
    fn load(&self, path: &Path) -> io::Result<String>;
}

/// Local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl FileSource for FsSource {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn load(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

// ============================================================================
// Line ranges
// ============================================================================

/// Inclusive, 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Resolve an offset/limit request against a file's line count
    ///
    /// Returns `None` when the request starts past the end of the file.
    pub fn requested(offset: Option<usize>, limit: Option<usize>, line_count: usize) -> Option<Self> {
        let start = offset.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_READ_LIMIT).max(1);
        if start > line_count {
            return None;
        }
        let end = start.saturating_add(limit - 1).min(line_count);
        Some(Self::new(start, end))
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Sorted, merged set of line ranges already delivered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoveredRanges {
    ranges: Vec<LineRange>,
}

impl CoveredRanges {
    pub fn ranges(&self) -> &[LineRange] {
        &self.ranges
    }

    pub fn insert(&mut self, range: LineRange) {
        self.ranges.push(range);
        self.ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<LineRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end + 1 => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        self.ranges = merged;
    }

    /// Parts of `range` not yet covered
    pub fn uncovered(&self, range: LineRange) -> Vec<LineRange> {
        let mut gaps = Vec::new();
        let mut cursor = range.start;

        for covered in &self.ranges {
            if covered.end < cursor {
                continue;
            }
            if covered.start > range.end {
                break;
            }
            if covered.start > cursor {
                gaps.push(LineRange::new(cursor, covered.start - 1));
            }
            cursor = cursor.max(covered.end + 1);
            if cursor > range.end {
                break;
            }
        }

        if cursor <= range.end {
            gaps.push(LineRange::new(cursor, range.end));
        }
        gaps
    }

    pub fn covers(&self, range: LineRange) -> bool {
        self.uncovered(range).is_empty()
    }

    pub fn is_full(&self, line_count: usize) -> bool {
        line_count > 0 && self.covers(LineRange::new(1, line_count))
    }
}

// ============================================================================
// Entries and results
// ============================================================================

/// Cached file entry
#[derive(Debug, Clone)]
pub struct CachedFile {
    content: Arc<str>,
    mtime: SystemTime,
    size: usize,
    line_count: usize,
    covered: CoveredRanges,
}

impl CachedFile {
    fn new(content: Arc<str>, mtime: SystemTime) -> Self {
        Self {
            size: content.len(),
            line_count: content.lines().count(),
            content,
            mtime,
            covered: CoveredRanges::default(),
        }
    }

    pub fn content(&self) -> &Arc<str> {
        &self.content
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn covered(&self) -> &CoveredRanges {
        &self.covered
    }

    pub fn is_full(&self) -> bool {
        self.covered.is_full(self.line_count)
    }
}

/// Result of [`FileContentCache::get`]
#[derive(Debug, Clone)]
pub struct FileHit {
    pub content: Arc<str>,
    /// Whole file already delivered to the model
    pub is_full: bool,
    pub covered: Vec<LineRange>,
}

/// Result of [`FileContentCache::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRead {
    /// Nothing in range had been delivered before
    Content { text: String, range: Option<LineRange> },
    /// Only the lines not delivered before
    Delta { text: String, ranges: Vec<LineRange> },
    /// Whole range already delivered; no content is repeated
    AlreadyInContext { path: PathBuf, range: LineRange },
}

impl FileRead {
    /// Text to place in the context (empty for a reference marker)
    pub fn text(&self) -> &str {
        match self {
            FileRead::Content { text, .. } | FileRead::Delta { text, .. } => text,
            FileRead::AlreadyInContext { .. } => "",
        }
    }

    pub fn status(&self) -> CacheStatus {
        match self {
            FileRead::Content { .. } => CacheStatus::Miss,
            FileRead::Delta { .. } | FileRead::AlreadyInContext { .. } => CacheStatus::Hit,
        }
    }

    /// Annotation for the model, if this read reused earlier output
    pub fn marker(&self) -> Option<String> {
        match self {
            FileRead::Content { .. } => None,
            FileRead::Delta { ranges, .. } => Some(format!(
                "{} showing only new lines {}",
                CacheStatus::Hit.marker(),
                join_ranges(ranges)
            )),
            FileRead::AlreadyInContext { path, range } => Some(format!(
                "{} lines {} of {} already in context",
                CacheStatus::Hit.marker(),
                range,
                path.display()
            )),
        }
    }
}

fn join_ranges(ranges: &[LineRange]) -> String {
    ranges
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn slice_lines(content: &str, range: LineRange) -> String {
    content
        .lines()
        .skip(range.start - 1)
        .take(range.len())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cache state seen before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prior {
    Reusable,
    Modified,
    Expired,
    Missing,
}

/// Entry fields copied out so the lock can be released
struct Snapshot {
    content: Arc<str>,
    line_count: usize,
    covered: CoveredRanges,
}

fn normalize_key(path: &Path) -> PathBuf {
    path.components().collect()
}

// ============================================================================
// File Content Cache
// ============================================================================

/// Path-keyed file content cache
pub struct FileContentCache {
    inner: RwLock<LruCache<PathBuf, CachedFile>>,
    limits: LruCacheConfig,
    source: Arc<dyn FileSource>,
    estimator: TokenEstimator,
    max_file_tokens: usize,
    lock_timeout: Duration,
    counters: CacheCounters,
}

impl FileContentCache {
    pub fn new(config: &CacheConfig, estimator: TokenEstimator, max_file_tokens: usize) -> Self {
        let limits = LruCacheConfig::with_limits(config.max_file_entries, config.memory_limit_bytes)
            .ttl(config.ttl());
        Self {
            inner: RwLock::new(LruCache::with_config(limits.clone())),
            limits,
            source: Arc::new(FsSource),
            estimator,
            max_file_tokens,
            lock_timeout: config.lock_timeout(),
            counters: CacheCounters::new(),
        }
    }

    /// Replace the file source (tests, virtual filesystems)
    pub fn with_source(mut self, source: Arc<dyn FileSource>) -> Self {
        self.source = source;
        self
    }

    /// Override the entry lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.limits = self.limits.clone().ttl(ttl);
        self.inner = RwLock::new(LruCache::with_config(self.limits.clone()));
        self
    }

    pub fn max_file_tokens(&self) -> usize {
        self.max_file_tokens
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Cached content for a path
    ///
    /// Returns `None` on a miss, after TTL expiry, when the source mtime no
    /// longer matches (the stale entry is dropped), or when the lock could
    /// not be acquired in time.
    pub fn get(&self, path: &Path) -> Option<FileHit> {
        let key = normalize_key(path);
        let current_mtime = self.source.modified(path).ok();

        let stale = {
            let Some(cache) = self.inner.try_read_for(self.lock_timeout) else {
                self.lock_failed("get", path);
                return None;
            };

            match cache.lookup(&key) {
                Lookup::Missing => {
                    self.counters.record_miss();
                    return None;
                }
                Lookup::Fresh(entry) if Some(entry.mtime) == current_mtime => {
                    self.counters.record_hit(entry.size);
                    return Some(FileHit {
                        content: Arc::clone(&entry.content),
                        is_full: entry.is_full(),
                        covered: entry.covered.ranges().to_vec(),
                    });
                }
                Lookup::Fresh(_) => true,
                Lookup::Expired => false,
            }
        };

        self.counters.record_miss();
        if stale {
            debug!(path = %path.display(), "File modified since cached");
            self.invalidate(path);
        } else if let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) {
            if cache.remove(&key).is_some() {
                self.counters.record_evictions(1);
            }
        }
        None
    }

    /// Store content read by the caller
    ///
    /// Returns false if the content alone exceeds the memory limit or the
    /// lock could not be acquired.
    pub fn put(&self, path: &Path, content: impl Into<Arc<str>>, mtime: SystemTime) -> bool {
        let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) else {
            self.lock_failed("put", path);
            return false;
        };
        self.store(&mut cache, normalize_key(path), CachedFile::new(content.into(), mtime))
    }

    /// Read a line range through the cache
    ///
    /// `offset` is 1-based; `limit` defaults to [`DEFAULT_READ_LIMIT`]
    /// lines. Fails with `TokenLimitExceeded` when the text to return is
    /// larger than `max_file_tokens`; coverage is only recorded for reads
    /// that succeed.
    ///
    /// Loading and token counting run without the lock held; the write
    /// lock is taken only to store the entry and record coverage.
    pub fn read(&self, path: &Path, offset: Option<usize>, limit: Option<usize>) -> Result<FileRead> {
        if limit == Some(0) {
            return Err(Error::InvalidInput(format!(
                "read of {} asked for 0 lines",
                path.display()
            )));
        }
        let key = normalize_key(path);
        let mtime = self.source.modified(path)?;

        let (prior, cached) = {
            let Some(cache) = self.inner.try_read_for(self.lock_timeout) else {
                self.lock_failed("read", path);
                return self.read_uncached(path, offset, limit);
            };
            match cache.lookup(&key) {
                Lookup::Fresh(entry) if entry.mtime == mtime => (
                    Prior::Reusable,
                    Some(Snapshot {
                        content: Arc::clone(&entry.content),
                        line_count: entry.line_count,
                        covered: entry.covered.clone(),
                    }),
                ),
                Lookup::Fresh(_) => (Prior::Modified, None),
                Lookup::Expired => (Prior::Expired, None),
                Lookup::Missing => (Prior::Missing, None),
            }
        };

        let snapshot = match cached {
            Some(snapshot) => snapshot,
            None => {
                let content: Arc<str> = self.source.load(path)?.into();
                Snapshot {
                    line_count: content.lines().count(),
                    content,
                    covered: CoveredRanges::default(),
                }
            }
        };

        let Some(range) = LineRange::requested(offset, limit, snapshot.line_count) else {
            self.record_delivery(&key, path, mtime, prior, snapshot.content, None);
            self.counters.record_miss();
            return Ok(FileRead::Content {
                text: String::new(),
                range: None,
            });
        };

        let gaps = snapshot.covered.uncovered(range);
        if gaps.is_empty() {
            self.counters
                .record_hit(slice_lines(&snapshot.content, range).len());
            return Ok(FileRead::AlreadyInContext {
                path: path.to_path_buf(),
                range,
            });
        }

        let text = gaps
            .iter()
            .map(|gap| slice_lines(&snapshot.content, *gap))
            .collect::<Vec<_>>()
            .join("\n");
        let within_limit = self
            .estimator
            .check_limit(&path.display().to_string(), &text, self.max_file_tokens);
        let full = if gaps.len() == 1 && gaps[0] == range {
            None
        } else {
            Some(slice_lines(&snapshot.content, range).len())
        };

        let delivered = within_limit.is_ok().then_some(range);
        self.record_delivery(&key, path, mtime, prior, snapshot.content, delivered);
        within_limit?;

        match full {
            None => {
                self.counters.record_miss();
                Ok(FileRead::Content {
                    text,
                    range: Some(range),
                })
            }
            Some(full) => {
                self.counters.record_hit(full.saturating_sub(text.len()));
                Ok(FileRead::Delta { text, ranges: gaps })
            }
        }
    }

    /// Store freshly loaded content and mark `delivered` as seen
    ///
    /// If the entry changed since the snapshot was taken (another read
    /// refreshed or evicted it), the content read here replaces it.
    fn record_delivery(
        &self,
        key: &Path,
        path: &Path,
        mtime: SystemTime,
        prior: Prior,
        content: Arc<str>,
        delivered: Option<LineRange>,
    ) {
        let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) else {
            self.lock_failed("read", path);
            return;
        };
        let key = key.to_path_buf();

        if let Some(entry) = cache.get_mut(&key).filter(|e| e.mtime == mtime) {
            if let Some(range) = delivered {
                entry.covered.insert(range);
            }
            return;
        }

        if cache.remove(&key).is_some() {
            match prior {
                Prior::Expired => self.counters.record_evictions(1),
                _ => {
                    debug!(path = %path.display(), "Refreshing modified file");
                    self.counters.record_invalidations(1);
                }
            }
        }
        let mut file = CachedFile::new(content, mtime);
        if let Some(range) = delivered {
            file.covered.insert(range);
        }
        self.store(&mut cache, key, file);
    }

    fn read_uncached(&self, path: &Path, offset: Option<usize>, limit: Option<usize>) -> Result<FileRead> {
        let content = self.source.load(path)?;
        let range = LineRange::requested(offset, limit, content.lines().count());
        let text = range
            .map(|r| slice_lines(&content, r))
            .unwrap_or_default();
        self.estimator
            .check_limit(&path.display().to_string(), &text, self.max_file_tokens)?;
        Ok(FileRead::Content { text, range })
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Drop the entry for a path, and for every cached file below it when
    /// the path is a directory. Returns how many entries were removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        let key = normalize_key(path);
        let Some(mut cache) = self.inner.try_write_for(self.lock_timeout) else {
            self.lock_failed("invalidate", path);
            return 0;
        };
        let removed = cache.retain(|cached, _| !cached.starts_with(&key)).len();
        if removed > 0 {
            debug!(path = %path.display(), removed, "Invalidated cached files");
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

    // ========================================================================
    // Internals
    // ========================================================================

    fn store(&self, cache: &mut LruCache<PathBuf, CachedFile>, key: PathBuf, file: CachedFile) -> bool {
        let size = file.size;
        match cache.insert(key, file, size) {
            InsertOutcome::Stored { evicted } => {
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Evicted least recently used files");
                    self.counters.record_evictions(evicted.len());
                }
                true
            }
            InsertOutcome::Rejected => {
                debug!(size, limit = cache.max_bytes(), "File larger than cache limit, not cached");
                false
            }
        }
    }

    fn lock_failed(&self, op: &str, path: &Path) {
        let error = Error::CacheUnavailable(format!(
            "file cache lock not acquired within {}ms",
            self.lock_timeout.as_millis()
        ));
        warn!(op, path = %path.display(), %error, "Treating as uncached");
        self.counters.record_lock_failure();
    }
}

impl std::fmt::Debug for FileContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContentCache")
            .field("limits", &self.limits)
            .field("max_file_tokens", &self.max_file_tokens)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}
