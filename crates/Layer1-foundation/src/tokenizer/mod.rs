//! Tokenizer Module - 토큰 계산
//!
//! 고정된 인코딩으로 텍스트의 토큰 수를 계산합니다. 토큰 제한은 모두 이
//! 모듈이 반환하는 값을 기준으로 하며, 바이트 길이 기반 추정은 사용하지
//! 않습니다.
//!
//! ## 지원 토크나이저
//!
//! | 인코딩 | 토크나이저 | 라이브러리 |
//! |--------|-----------|-----------|
//! | cl100k_base | tiktoken (BPE) | tiktoken-rs |
//! | o200k_base | tiktoken (BPE) | tiktoken-rs |
//! | custom | 주입된 구현체 | - |
//!
//! ## 사용법
//!
//! ```ignore
//! use workset_foundation::tokenizer::TokenEstimator;
//!
//! let estimator = TokenEstimator::cl100k()?;
//! let count = estimator.count("Hello, world!");
//! ```

mod estimator;
mod traits;
mod types;

pub use estimator::{TiktokenTokenizer, TokenEstimator};
pub use traits::{Tokenizer, WhitespaceTokenizer};
pub use types::{TokenizerError, TokenizerType};
