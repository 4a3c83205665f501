//! Tokenizer Trait 정의

use super::types::TokenizerType;

/// 토크나이저 트레이트
///
/// 모든 토크나이저 구현체가 따라야 하는 인터페이스입니다.
/// `count`는 고정된 인코딩에 대해 결정적이어야 하며 부작용이 없어야 합니다.
pub trait Tokenizer: Send + Sync {
    /// 토크나이저 타입
    fn tokenizer_type(&self) -> TokenizerType;

    /// 텍스트를 토큰 수로 계산
    fn count(&self, text: &str) -> usize;

    /// 여러 텍스트의 토큰 수 합계
    fn count_many(&self, texts: &[&str]) -> usize {
        texts.iter().map(|text| self.count(text)).sum()
    }

    /// 텍스트가 토큰 제한을 초과하는지 확인
    fn exceeds_limit(&self, text: &str, max_tokens: usize) -> bool {
        self.count(text) > max_tokens
    }
}

/// 공백 단위 토크나이저
///
/// 단어 하나를 토큰 하나로 계산합니다. 압축률 테스트가 BPE 세부사항에
/// 의존하지 않도록 할 때 사용합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenizer_type(&self) -> TokenizerType {
        TokenizerType::Custom
    }

    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_many() {
        let tokenizer = WhitespaceTokenizer;
        assert_eq!(tokenizer.count_many(&["Hello world", "Test"]), 3);
    }

    #[test]
    fn test_exceeds_limit() {
        let tokenizer = WhitespaceTokenizer;

        assert!(!tokenizer.exceeds_limit("Hi", 100));
        assert!(tokenizer.exceeds_limit("a b c d e f g h i j k", 10));
    }
}
