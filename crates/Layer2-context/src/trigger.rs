//! When to compact
//!
//! The agent loop reports per-request usage; cache reads are billed at a
//! fraction of fresh input, so they only count 10% toward the window.

use serde::{Deserialize, Serialize};

use workset_foundation::config::CompactionSettings;

/// Share of cache-read tokens taken off the input count
const CACHE_READ_DISCOUNT: f64 = 0.9;
/// Budget share used when the window is not larger than the buffer
const SMALL_WINDOW_BUDGET_RATIO: f64 = 0.8;

/// Token usage reported by the model API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

impl TokenUsage {
    /// Input tokens with cache reads discounted by 90%
    pub fn effective_tokens(&self) -> u64 {
        let discount = (self.cache_read_input_tokens as f64 * CACHE_READ_DISCOUNT) as u64;
        self.input_tokens.saturating_sub(discount)
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate another response's usage
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionTrigger {
    pub context_window: u64,
    pub threshold_ratio: f64,
    pub autocompact_buffer: u64,
}

impl Default for CompactionTrigger {
    fn default() -> Self {
        Self::from_settings(&CompactionSettings::default())
    }
}

impl CompactionTrigger {
    pub fn new(context_window: u64) -> Self {
        Self {
            context_window,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &CompactionSettings) -> Self {
        Self {
            context_window: settings.context_window,
            threshold_ratio: settings.threshold_ratio,
            autocompact_buffer: settings.autocompact_buffer,
        }
    }

    /// Token count at which compaction starts
    pub fn threshold(&self) -> u64 {
        (self.context_window as f64 * self.threshold_ratio) as u64
    }

    /// Tokens a compacted history should fit in
    pub fn budget(&self) -> u64 {
        if self.context_window > self.autocompact_buffer {
            self.context_window - self.autocompact_buffer
        } else {
            (self.context_window as f64 * SMALL_WINDOW_BUDGET_RATIO) as u64
        }
    }

    pub fn should_compact(&self, effective_tokens: u64) -> bool {
        effective_tokens > self.threshold()
    }

    pub fn should_compact_usage(&self, usage: &TokenUsage) -> bool {
        self.should_compact(usage.effective_tokens())
    }
}
