//! Error types for Workset
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

use crate::tokenizer::TokenizerError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Workset 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 토큰 관련
    // ========================================================================
    #[error("Token limit exceeded for {path}: ~{estimated_tokens} tokens (limit {limit})")]
    TokenLimitExceeded {
        path: String,
        estimated_tokens: usize,
        limit: usize,
    },

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    // ========================================================================
    // Compaction / Cache 관련
    // ========================================================================
    #[error("Compaction degraded: {reason}")]
    CompactionDegraded { reason: String },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::TokenLimitExceeded { .. } | Error::InvalidInput(_)
        )
    }

    /// 캐시 경계에서 흡수되어야 하는 에러인지 확인
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::CacheUnavailable(_) | Error::CompactionDegraded { .. }
        )
    }

    /// TokenLimitExceeded 생성 헬퍼
    pub fn token_limit(path: impl Into<String>, estimated_tokens: usize, limit: usize) -> Self {
        Error::TokenLimitExceeded {
            path: path.into(),
            estimated_tokens,
            limit,
        }
    }

    /// CompactionDegraded 생성 헬퍼
    pub fn degraded(reason: impl Into<String>) -> Self {
        Error::CompactionDegraded {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_limit_message_explains_rejection() {
        let err = Error::token_limit("src/huge.rs", 31_000, 25_000);
        let msg = err.to_string();
        assert!(msg.contains("src/huge.rs"));
        assert!(msg.contains("31000"));
        assert!(msg.contains("25000"));
        assert!(err.is_user_facing());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recoverable_errors_are_not_user_facing() {
        let degraded = Error::degraded("turn 3 has an empty tool name");
        assert!(degraded.is_recoverable());
        assert!(!degraded.is_user_facing());

        let cache = Error::CacheUnavailable("lock timeout".to_string());
        assert!(cache.is_recoverable());
    }
}
