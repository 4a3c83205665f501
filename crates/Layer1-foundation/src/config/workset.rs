//! Workset Config - 통합 설정
//!
//! 기본값 → 글로벌 파일 → 프로젝트 파일 → 환경 변수 순서로 병합합니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

use super::store::JsonStore;
use crate::cache::CacheConfig;
use crate::{Error, Result};

/// 설정 파일명
pub const WORKSET_CONFIG_FILE: &str = "config.json";

/// 앵커 확정에 필요한 최소 신뢰도 (낮출 수 없음)
pub const MIN_ANCHOR_CONFIDENCE: f64 = 0.9;

// Environment variable names
pub const ENV_MAX_FILE_TOKENS: &str = "WORKSET_MAX_FILE_TOKENS";
pub const ENV_CACHE_TTL_SECONDS: &str = "WORKSET_CACHE_TTL_SECONDS";
pub const ENV_CACHE_MEMORY_LIMIT_BYTES: &str = "WORKSET_CACHE_MEMORY_LIMIT_BYTES";
pub const ENV_FUZZY_MATCH_THRESHOLD: &str = "WORKSET_FUZZY_MATCH_THRESHOLD";
pub const ENV_ANCHOR_CONFIDENCE_THRESHOLD: &str = "WORKSET_ANCHOR_CONFIDENCE_THRESHOLD";
pub const ENV_TURNS_ALWAYS_KEPT: &str = "WORKSET_TURNS_ALWAYS_KEPT";

// ============================================================================
// Workset Config (통합)
// ============================================================================

/// Workset 통합 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksetConfig {
    /// 토큰 계산 설정
    #[serde(default)]
    pub tokens: TokenSettings,

    /// 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,

    /// Compaction 설정
    #[serde(default)]
    pub compaction: CompactionSettings,
}

/// 토큰 계산 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSettings {
    /// 파일 읽기 1회당 최대 토큰 수
    #[serde(default = "default_max_file_tokens")]
    pub max_file_tokens: usize,

    /// 토크나이저 인코딩 이름
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

/// Compaction 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionSettings {
    /// 앵커 확정 신뢰도 (0.9 미만은 0.9로 간주)
    #[serde(default = "default_anchor_confidence_threshold")]
    pub anchor_confidence_threshold: f64,

    /// 항상 원문으로 유지하는 최근 턴 수
    #[serde(default = "default_turns_always_kept")]
    pub turns_always_kept: usize,

    /// 이 값 미만의 압축률이면 경고
    #[serde(default = "default_min_compression_ratio")]
    pub min_compression_ratio: f64,

    /// 모델 컨텍스트 윈도우 (토큰)
    #[serde(default = "default_context_window")]
    pub context_window: u64,

    /// 윈도우 대비 compaction 트리거 비율
    #[serde(default = "default_threshold_ratio")]
    pub threshold_ratio: f64,

    /// compaction 이후 확보할 여유 토큰
    #[serde(default = "default_autocompact_buffer")]
    pub autocompact_buffer: u64,

    /// 요약 경계 결정 방식
    #[serde(default)]
    pub strategy: CompactionStrategy,
}

/// 요약 경계 결정 방식
///
/// JSON: `{"kind": "anchorBased"}`, `{"kind": "simpleTruncate", "keepLast": 5}`,
/// `{"kind": "none"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CompactionStrategy {
    /// 가장 무거운 앵커부터 원문 유지
    #[default]
    AnchorBased,
    /// 앵커 없이 마지막 `keep_last` 턴만 유지 (turnsAlwaysKept 미만으로는 줄지 않음)
    SimpleTruncate {
        #[serde(rename = "keepLast")]
        keep_last: usize,
    },
    /// 아무것도 요약하지 않음
    None,
}

// Default value functions
fn default_max_file_tokens() -> usize {
    25_000
}
fn default_encoding() -> String {
    "cl100k_base".to_string()
}
fn default_anchor_confidence_threshold() -> f64 {
    MIN_ANCHOR_CONFIDENCE
}
fn default_turns_always_kept() -> usize {
    3
}
fn default_min_compression_ratio() -> f64 {
    0.6
}
fn default_context_window() -> u64 {
    200_000
}
fn default_threshold_ratio() -> f64 {
    0.9
}
fn default_autocompact_buffer() -> u64 {
    50_000
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            max_file_tokens: default_max_file_tokens(),
            encoding: default_encoding(),
        }
    }
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            anchor_confidence_threshold: default_anchor_confidence_threshold(),
            turns_always_kept: default_turns_always_kept(),
            min_compression_ratio: default_min_compression_ratio(),
            context_window: default_context_window(),
            threshold_ratio: default_threshold_ratio(),
            autocompact_buffer: default_autocompact_buffer(),
            strategy: CompactionStrategy::default(),
        }
    }
}

impl CompactionSettings {
    /// 실제 적용되는 앵커 신뢰도 임계값
    pub fn confidence_threshold(&self) -> f64 {
        self.anchor_confidence_threshold.max(MIN_ANCHOR_CONFIDENCE)
    }
}

impl WorksetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 + 환경 변수 병합 로드
    pub fn load() -> Result<Self> {
        let mut stores = Vec::new();
        if let Ok(global) = JsonStore::global() {
            stores.push(global);
        }
        if let Ok(project) = JsonStore::current_project() {
            stores.push(project);
        }

        let mut config = Self::load_layers(&stores)?;
        config.apply_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// 저장소 목록을 순서대로 병합 (뒤쪽이 우선)
    ///
    /// 파일에 없는 필드는 앞 단계의 값을 유지합니다.
    pub fn load_layers(stores: &[JsonStore]) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        for store in stores {
            if let Some(layer) = store.load_optional::<Value>(WORKSET_CONFIG_FILE)? {
                debug!(path = %store.file_path(WORKSET_CONFIG_FILE).display(), "Merging config layer");
                merge_json(&mut merged, layer);
            }
        }

        serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// 환경 변수 오버라이드 적용
    ///
    /// 파싱할 수 없는 값은 경고 후 무시합니다.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_env(&lookup, ENV_MAX_FILE_TOKENS) {
            self.tokens.max_file_tokens = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_CACHE_TTL_SECONDS) {
            self.cache.ttl_seconds = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_CACHE_MEMORY_LIMIT_BYTES) {
            self.cache.memory_limit_bytes = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_FUZZY_MATCH_THRESHOLD) {
            self.cache.fuzzy_match_threshold = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_ANCHOR_CONFIDENCE_THRESHOLD) {
            self.compaction.anchor_confidence_threshold = v;
        }
        if let Some(v) = parse_env(&lookup, ENV_TURNS_ALWAYS_KEPT) {
            self.compaction.turns_always_kept = v;
        }

        if self.compaction.anchor_confidence_threshold < MIN_ANCHOR_CONFIDENCE {
            warn!(
                requested = self.compaction.anchor_confidence_threshold,
                applied = MIN_ANCHOR_CONFIDENCE,
                "Anchor confidence threshold cannot be lowered"
            );
        }
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.cache.fuzzy_match_threshold) {
            return Err(Error::Config(format!(
                "fuzzyMatchThreshold must be within 0..=1, got {}",
                self.cache.fuzzy_match_threshold
            )));
        }
        if !unit.contains(&self.compaction.anchor_confidence_threshold) {
            return Err(Error::Config(format!(
                "anchorConfidenceThreshold must be within 0..=1, got {}",
                self.compaction.anchor_confidence_threshold
            )));
        }
        if !unit.contains(&self.compaction.min_compression_ratio) {
            return Err(Error::Config(format!(
                "minCompressionRatio must be within 0..=1, got {}",
                self.compaction.min_compression_ratio
            )));
        }
        if self.cache.memory_limit_bytes == 0 {
            return Err(Error::Config("memoryLimitBytes must be positive".to_string()));
        }
        if self.compaction.turns_always_kept == 0 {
            return Err(Error::Config("turnsAlwaysKept must be positive".to_string()));
        }
        if self.compaction.strategy == (CompactionStrategy::SimpleTruncate { keep_last: 0 }) {
            return Err(Error::Config("strategy.keepLast must be positive".to_string()));
        }
        if self.tokens.max_file_tokens == 0 {
            return Err(Error::Config("maxFileTokens must be positive".to_string()));
        }
        Ok(())
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(WORKSET_CONFIG_FILE, self)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// JSON 객체 재귀 병합 (overlay 우선)
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_contract() {
        let config = WorksetConfig::default();
        assert_eq!(config.tokens.max_file_tokens, 25_000);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.cache.memory_limit_bytes, 50 * 1024 * 1024);
        assert!((config.cache.fuzzy_match_threshold - 0.85).abs() < f64::EPSILON);
        assert!((config.compaction.confidence_threshold() - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.compaction.turns_always_kept, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layers_merge_field_by_field() {
        let global_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let global = JsonStore::new(global_dir.path());
        let project = JsonStore::project(project_dir.path());

        global
            .save(
                WORKSET_CONFIG_FILE,
                &serde_json::json!({"cache": {"ttlSeconds": 60, "memoryLimitBytes": 1024}}),
            )
            .unwrap();
        project
            .save(
                WORKSET_CONFIG_FILE,
                &serde_json::json!({"cache": {"ttlSeconds": 10}, "compaction": {"turnsAlwaysKept": 5}}),
            )
            .unwrap();

        let config = WorksetConfig::load_layers(&[global, project]).unwrap();
        assert_eq!(config.cache.ttl_seconds, 10);
        assert_eq!(config.cache.memory_limit_bytes, 1024);
        assert_eq!(config.compaction.turns_always_kept, 5);
        assert_eq!(config.tokens.max_file_tokens, 25_000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_MAX_FILE_TOKENS, "50000"),
            (ENV_FUZZY_MATCH_THRESHOLD, "0.9"),
            (ENV_TURNS_ALWAYS_KEPT, "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = WorksetConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tokens.max_file_tokens, 50_000);
        assert!((config.cache.fuzzy_match_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.compaction.turns_always_kept, 3);
    }

    #[test]
    fn test_anchor_threshold_cannot_be_lowered() {
        let mut config = WorksetConfig::default();
        config.apply_env_with(|key| (key == ENV_ANCHOR_CONFIDENCE_THRESHOLD).then(|| "0.5".to_string()));
        assert!((config.compaction.confidence_threshold() - 0.9).abs() < f64::EPSILON);

        config.compaction.anchor_confidence_threshold = 0.95;
        assert!((config.compaction.confidence_threshold() - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_strategy_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        store
            .save(
                WORKSET_CONFIG_FILE,
                &serde_json::json!({"compaction": {"strategy": {"kind": "simpleTruncate", "keepLast": 6}}}),
            )
            .unwrap();

        let config = WorksetConfig::load_layers(&[store]).unwrap();
        assert_eq!(
            config.compaction.strategy,
            CompactionStrategy::SimpleTruncate { keep_last: 6 }
        );
        assert_eq!(
            WorksetConfig::default().compaction.strategy,
            CompactionStrategy::AnchorBased
        );

        let none: CompactionStrategy = serde_json::from_str(r#"{"kind": "none"}"#).unwrap();
        assert_eq!(none, CompactionStrategy::None);
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let mut config = WorksetConfig::default();
        config.cache.fuzzy_match_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = WorksetConfig::default();
        config.compaction.turns_always_kept = 0;
        assert!(config.validate().is_err());

        let mut config = WorksetConfig::default();
        config.compaction.strategy = CompactionStrategy::SimpleTruncate { keep_last: 0 };
        assert!(config.validate().is_err());
    }
}
