//! 로깅 초기화
//!
//! `RUST_LOG`이 설정되어 있으면 우선 적용하고, 없으면 전달받은 기본 필터를
//! 사용합니다.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 기본 로그 필터
pub const DEFAULT_FILTER: &str = "workset_foundation=info,workset_context=info";

/// tracing subscriber 설치
///
/// 이미 설치되어 있으면 false를 반환합니다 (테스트에서 반복 호출 가능).
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}
