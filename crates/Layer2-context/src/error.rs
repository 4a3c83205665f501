//! Context layer errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    /// 분석할 수 없는 턴 (도구 이름 없음, 경로 없는 파일 도구 등)
    #[error("Malformed turn {turn_index}: {reason}")]
    MalformedTurn { turn_index: usize, reason: String },
}

impl ContextError {
    pub fn malformed(turn_index: usize, reason: impl Into<String>) -> Self {
        ContextError::MalformedTurn {
            turn_index,
            reason: reason.into(),
        }
    }

    /// Foundation 에러로 변환 (CompactionDegraded)
    pub fn into_degraded(self) -> workset_foundation::Error {
        workset_foundation::Error::degraded(self.to_string())
    }
}
