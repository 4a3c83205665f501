//! Tokenizer 타입 정의

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 토크나이저 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerType {
    /// OpenAI tiktoken (cl100k_base - GPT-4, Claude 호환 근사)
    #[serde(rename = "cl100k_base")]
    TiktokenCl100k,
    /// OpenAI tiktoken (o200k_base - GPT-4o, o1)
    #[serde(rename = "o200k_base")]
    TiktokenO200k,
    /// 테스트/외부 주입용 커스텀 토크나이저
    Custom,
}

impl Default for TokenizerType {
    fn default() -> Self {
        Self::TiktokenCl100k
    }
}

impl TokenizerType {
    /// 인코딩 이름
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Self::TiktokenCl100k => "cl100k_base",
            Self::TiktokenO200k => "o200k_base",
            Self::Custom => "custom",
        }
    }

    /// 인코딩 이름으로 타입 조회
    pub fn from_encoding_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cl100k_base" | "cl100k" => Some(Self::TiktokenCl100k),
            "o200k_base" | "o200k" => Some(Self::TiktokenO200k),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenizerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encoding_name())
    }
}

/// 토크나이저 에러
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("Failed to initialize {encoding} encoder: {message}")]
    Initialization { encoding: String, message: String },

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}
