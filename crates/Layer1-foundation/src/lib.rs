//! # workset-foundation
//!
//! Foundation layer for Workset:
//! - Error: 에러 분류 (TokenLimitExceeded, CompactionDegraded, CacheUnavailable 등)
//! - Config: 통합 설정 (WorksetConfig, JsonStore)
//! - Tokenizer: 토큰 계산 (TokenEstimator)
//! - Cache: 파일 내용 캐시, 도구 결과 캐시
//! - Telemetry: 로깅 초기화
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Agent loop (external)                                   │
//! │        │ file read / search tool                         │
//! │        ▼                                                 │
//! │  CacheManager ──┬── FileContentCache ──┐                 │
//! │                 └── ToolResultCache    │                 │
//! │                                        ▼                 │
//! │                              TokenEstimator (limit)      │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod tokenizer;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    CompactionSettings, CompactionStrategy, JsonStore, TokenSettings, WorksetConfig,
};

// ============================================================================
// Tokenizer
// ============================================================================
pub use tokenizer::{
    TiktokenTokenizer, TokenEstimator, Tokenizer, TokenizerError, TokenizerType,
    WhitespaceTokenizer,
};

// ============================================================================
// Cache
// ============================================================================
pub use cache::{
    CacheConfig, CacheManager, CacheManagerStats, CacheStats, CacheStatus, FileContentCache,
    FileRead, FileSource, FsSource, LineRange, ToolHit, ToolResultCache,
};

// ============================================================================
// Telemetry
// ============================================================================
pub use telemetry::init_tracing;
