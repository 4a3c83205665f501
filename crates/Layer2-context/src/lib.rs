//! workset-context: 대화 compaction
//!
//! Layer2 - 오래된 턴을 요약하면서 작업에 필요한 사실을 보존하는 레이어
//!
//! # 주요 모듈
//!
//! - `turn`: 대화 턴 모델 (TurnLog, ConversationTurn, ToolInvocation)
//! - `signals`: 도구 출력의 pass/fail 판별
//! - `anchor`: 요약 경계가 되는 앵커 감지
//! - `preservation`: 파일, 목표, 에러, 빌드 상태 추출
//! - `selector`: 원문 유지 턴과 요약 대상 턴 분리
//! - `compactor`: 위 단계를 묶어 CompactionResult 생성
//! - `trigger`: 토큰 사용량 기반 compaction 시점 판단
//!
//! # 사용 예시
//!
//! ```ignore
//! use workset_context::{Compactor, CompactionTrigger, TurnLog};
//! use workset_foundation::{TokenEstimator, WorksetConfig};
//!
//! let config = WorksetConfig::load()?;
//! let trigger = CompactionTrigger::from_settings(&config.compaction);
//!
//! if trigger.should_compact_usage(&usage) {
//!     let compactor = Compactor::new(&config.compaction, TokenEstimator::from_config(&config.tokens)?);
//!     let result = compactor.compact(log.turns());
//!     for warning in &result.warnings {
//!         eprintln!("{warning}");
//!     }
//!     let history = result.kept(log.turns());
//! }
//! ```

pub mod anchor;
pub mod compactor;
pub mod error;
pub mod preservation;
pub mod selector;
pub mod signals;
pub mod trigger;
pub mod turn;

// Re-exports: Error
pub use error::{ContextError, Result};

// Re-exports: Turn model
pub use turn::{ConversationTurn, Role, ToolInvocation, ToolKind, ToolOutcome, TurnLog};

// Re-exports: Detection
pub use anchor::{Anchor, AnchorDetector, AnchorType};
pub use signals::{classify, classify_outcome, Signal, SignalScope, Verdict};

// Re-exports: Extraction / Selection
pub use preservation::{BuildStatus, PreservationContext};
pub use selector::{TurnSelection, TurnSelector};

// Re-exports: Compaction
pub use compactor::{
    CompactionMetrics, CompactionResult, CompactionState, Compactor, DEGRADED_SUMMARY,
};
pub use trigger::{CompactionTrigger, TokenUsage};
