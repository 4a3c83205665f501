//! # Workset Cache System
//!
//! Keeps content the model has already seen from re-entering the context
//! window.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CacheManager                           │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │  FileContentCache            │  ToolResultCache              │
//! │  path → content + coverage   │  (tool, params, target) →     │
//! │  mtime / TTL / LRU           │  result, fuzzy reuse          │
//! │  own RwLock                  │  own RwLock                   │
//! └──────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! Lock acquisition is bounded by `lockTimeoutMs`. A timeout is logged and
//! treated as a miss, so a contended cache slows nothing down.
//!
//! ## Modules
//!
//! - [`config`] - Cache configuration
//! - [`file`] - File content cache
//! - [`tool`] - Tool result cache
//! - [`manager`] - Cache manager
//! - [`stats`] - Counters and snapshots
//! - [`util`] - LRU, hashing, similarity

pub mod config;
pub mod file;
pub mod manager;
pub mod stats;
pub mod tool;
pub mod util;

pub use config::CacheConfig;
pub use file::{
    CachedFile, CoveredRanges, FileContentCache, FileHit, FileRead, FileSource, FsSource,
    LineRange, DEFAULT_READ_LIMIT,
};
pub use manager::{CacheManager, CacheManagerStats, InvalidationReport};
pub use stats::{CacheCounters, CacheStats, CacheStatus};
pub use tool::{CachedResult, ToolCacheKey, ToolHit, ToolResultCache};
