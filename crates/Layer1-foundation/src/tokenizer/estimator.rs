//! 토크나이저 구현체와 TokenEstimator 핸들
//!
//! - TiktokenTokenizer: tiktoken-rs 기반 BPE 토크나이저
//! - TokenEstimator: 모든 컴포넌트가 공유하는 단일 토큰 계산 진입점

use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::debug;

use super::traits::Tokenizer;
use super::types::{TokenizerError, TokenizerType};
use crate::config::TokenSettings;
use crate::{Error, Result};

// ============================================================================
// Tiktoken
// ============================================================================

/// tiktoken 기반 토크나이저
///
/// 인코더 초기화에 실패하면 에러를 반환합니다. 바이트 길이 기반 추정으로
/// 대체하지 않습니다.
pub struct TiktokenTokenizer {
    tokenizer_type: TokenizerType,
    encoder: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn cl100k() -> std::result::Result<Self, TokenizerError> {
        Self::new(TokenizerType::TiktokenCl100k)
    }

    pub fn o200k() -> std::result::Result<Self, TokenizerError> {
        Self::new(TokenizerType::TiktokenO200k)
    }

    pub fn new(tokenizer_type: TokenizerType) -> std::result::Result<Self, TokenizerError> {
        let encoder = match tokenizer_type {
            TokenizerType::TiktokenCl100k => tiktoken_rs::cl100k_base(),
            TokenizerType::TiktokenO200k => tiktoken_rs::o200k_base(),
            TokenizerType::Custom => {
                return Err(TokenizerError::UnsupportedEncoding(
                    tokenizer_type.encoding_name().to_string(),
                ))
            }
        }
        .map_err(|e| TokenizerError::Initialization {
            encoding: tokenizer_type.encoding_name().to_string(),
            message: e.to_string(),
        })?;

        debug!(encoding = %tokenizer_type, "Initialized tiktoken encoder");
        Ok(Self {
            tokenizer_type,
            encoder,
        })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn tokenizer_type(&self) -> TokenizerType {
        self.tokenizer_type
    }

    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoder.encode_with_special_tokens(text).len()
    }
}

// ============================================================================
// TokenEstimator
// ============================================================================

/// 토큰 계산의 단일 진입점
///
/// 복제 비용이 낮은 핸들이며, 내부 토크나이저를 교체할 수 있습니다.
/// 다른 컴포넌트는 자체적으로 바이트 길이 추정을 하지 않고 항상 이 핸들을
/// 통해 토큰 수를 얻습니다.
///
/// # Example
///
/// ```rust,ignore
/// let estimator = TokenEstimator::cl100k()?;
/// let tokens = estimator.count("Hello, world!");
/// estimator.check_limit("src/main.rs", &content, 25_000)?;
/// ```
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenEstimator {
    /// cl100k_base 인코딩으로 생성 (초기화 실패 시 에러)
    pub fn cl100k() -> Result<Self> {
        Ok(Self::with_tokenizer(Arc::new(TiktokenTokenizer::cl100k()?)))
    }

    /// 설정된 인코딩으로 생성
    pub fn from_config(settings: &TokenSettings) -> Result<Self> {
        let tokenizer_type = TokenizerType::from_encoding_name(&settings.encoding)
            .ok_or_else(|| TokenizerError::UnsupportedEncoding(settings.encoding.clone()))?;
        Ok(Self::with_tokenizer(Arc::new(TiktokenTokenizer::new(
            tokenizer_type,
        )?)))
    }

    /// 임의의 토크나이저 주입
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer_type(&self) -> TokenizerType {
        self.tokenizer.tokenizer_type()
    }

    /// 텍스트의 토큰 수
    pub fn count(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// 여러 텍스트의 토큰 수 합계
    pub fn count_many(&self, texts: &[&str]) -> usize {
        self.tokenizer.count_many(texts)
    }

    /// 파일 내용이 토큰 제한 이내인지 확인
    ///
    /// 제한 이내면 토큰 수를, 초과하면 `Error::TokenLimitExceeded`를 반환합니다.
    pub fn check_limit(&self, path: &str, content: &str, limit: usize) -> Result<usize> {
        let estimated_tokens = self.count(content);
        if estimated_tokens > limit {
            return Err(Error::token_limit(path, estimated_tokens, limit));
        }
        Ok(estimated_tokens)
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("tokenizer_type", &self.tokenizer_type())
            .finish()
    }
}
