//! Config Module - 통합 설정
//!
//! - WorksetConfig: 토큰 / 캐시 / compaction 설정
//! - JsonStore: 글로벌, 프로젝트 JSON 설정 파일

mod store;
mod workset;

pub use store::{ConfigScope, JsonStore, APP_DIR};
pub use workset::{
    CompactionSettings, CompactionStrategy, TokenSettings, WorksetConfig,
    ENV_ANCHOR_CONFIDENCE_THRESHOLD, ENV_CACHE_MEMORY_LIMIT_BYTES, ENV_CACHE_TTL_SECONDS,
    ENV_FUZZY_MATCH_THRESHOLD, ENV_MAX_FILE_TOKENS, ENV_TURNS_ALWAYS_KEPT, MIN_ANCHOR_CONFIDENCE,
    WORKSET_CONFIG_FILE,
};
