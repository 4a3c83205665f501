//! Cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache system configuration
///
/// Shared by the file content cache and the tool result cache. Each cache
/// still owns its own lock and byte budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Time-to-live for cached entries (seconds)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum total bytes held by each cache
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: usize,

    /// Minimum similarity for a fuzzy tool result hit (0.0 - 1.0)
    #[serde(default = "default_fuzzy_match_threshold")]
    pub fuzzy_match_threshold: f64,

    /// How long a caller waits for a cache lock before treating it as a miss
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Maximum number of cached files
    #[serde(default = "default_max_file_entries")]
    pub max_file_entries: usize,

    /// Maximum number of cached tool results
    #[serde(default = "default_max_tool_entries")]
    pub max_tool_entries: usize,

    /// Tools whose results may be cached (side-effect free tools only)
    #[serde(default = "default_cacheable_tools")]
    pub cacheable_tools: Vec<String>,
}

// Default value functions
fn default_ttl_seconds() -> u64 {
    300
} // 5 minutes
fn default_memory_limit_bytes() -> usize {
    50 * 1024 * 1024
} // 50MB
fn default_fuzzy_match_threshold() -> f64 {
    0.85
}
fn default_lock_timeout_ms() -> u64 {
    50
}
fn default_max_file_entries() -> usize {
    1024
}
fn default_max_tool_entries() -> usize {
    512
}
fn default_cacheable_tools() -> Vec<String> {
    ["Read", "Glob", "Grep", "Search", "LS"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            memory_limit_bytes: default_memory_limit_bytes(),
            fuzzy_match_threshold: default_fuzzy_match_threshold(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_file_entries: default_max_file_entries(),
            max_tool_entries: default_max_tool_entries(),
            cacheable_tools: default_cacheable_tools(),
        }
    }
}

impl CacheConfig {
    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Get lock timeout as Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert_eq!(config.memory_limit_bytes, 52_428_800);
        assert!((config.fuzzy_match_threshold - 0.85).abs() < f64::EPSILON);
        assert!(config.cacheable_tools.iter().any(|t| t == "Grep"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"ttlSeconds": 30}"#).unwrap();
        assert_eq!(config.ttl_seconds, 30);
        assert_eq!(config.memory_limit_bytes, default_memory_limit_bytes());
    }
}
