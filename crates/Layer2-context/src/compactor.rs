//! Compactor
//!
//! Runs anchor detection, preservation extraction and turn selection over a
//! turn list and produces a [`CompactionResult`]. Malformed input degrades to
//! keeping the recent-turn floor; `compact` itself never fails.
//!
//! ```text
//! Idle → Extracting → Selecting → Summarizing → Done
//!            │
//!            └──────────────────────────────→ Degraded
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use workset_foundation::config::{CompactionSettings, CompactionStrategy};
use workset_foundation::TokenEstimator;

use crate::anchor::{Anchor, AnchorDetector};
use crate::error::ContextError;
use crate::preservation::PreservationContext;
use crate::selector::{TurnSelection, TurnSelector};
use crate::turn::{display_name, truncate, ConversationTurn};

pub const DEGRADED_SUMMARY: &str = "(extraction failed, preserving recent turns only)";

/// Longest outcome line taken from a turn's message
const MAX_OUTCOME_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompactionState {
    Idle,
    Extracting,
    Selecting,
    Summarizing,
    Done,
    Degraded,
}

impl CompactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompactionState::Done | CompactionState::Degraded)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactionMetrics {
    pub original_tokens: usize,
    pub summarized_tokens: usize,
    pub summary_tokens: usize,
    /// `None` when nothing was summarized
    pub compression_ratio: Option<f64>,
    pub turns_kept: usize,
    pub turns_summarized: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionResult {
    pub kept_turns: Vec<usize>,
    pub summarized_turns: Vec<usize>,
    pub anchors: Vec<Anchor>,
    pub summary_text: String,
    pub warnings: Vec<String>,
    pub metrics: CompactionMetrics,
    pub state: CompactionState,
}

impl CompactionResult {
    /// Kept turns in their original order
    pub fn kept<'a>(&self, turns: &'a [ConversationTurn]) -> Vec<&'a ConversationTurn> {
        self.kept_turns.iter().filter_map(|&i| turns.get(i)).collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.state == CompactionState::Degraded
    }
}

// ============================================================================
// Compactor
// ============================================================================

#[derive(Debug, Clone)]
pub struct Compactor {
    detector: AnchorDetector,
    selector: TurnSelector,
    estimator: TokenEstimator,
    min_compression_ratio: f64,
    strategy: CompactionStrategy,
}

/// Tracks one compaction pass for logging
struct Pass {
    id: Uuid,
    state: CompactionState,
}

impl Pass {
    fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: CompactionState::Idle,
        }
    }

    fn advance(&mut self, next: CompactionState) {
        debug!(compaction_id = %self.id, from = ?self.state, to = ?next, "Compaction state");
        self.state = next;
    }
}

impl Compactor {
    pub fn new(settings: &CompactionSettings, estimator: TokenEstimator) -> Self {
        Self {
            detector: AnchorDetector::from_settings(settings),
            selector: TurnSelector::from_settings(settings),
            estimator,
            min_compression_ratio: settings.min_compression_ratio,
            strategy: settings.strategy,
        }
    }

    pub fn with_strategy(mut self, strategy: CompactionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> CompactionStrategy {
        self.strategy
    }

    pub fn detector(&self) -> &AnchorDetector {
        &self.detector
    }

    pub fn selector(&self) -> &TurnSelector {
        &self.selector
    }

    pub fn compact(&self, turns: &[ConversationTurn]) -> CompactionResult {
        let mut pass = Pass::start();

        if turns.is_empty() {
            pass.advance(CompactionState::Done);
            return CompactionResult {
                kept_turns: Vec::new(),
                summarized_turns: Vec::new(),
                anchors: Vec::new(),
                summary_text: String::new(),
                warnings: vec!["No turns to compact".to_string()],
                metrics: CompactionMetrics::default(),
                state: pass.state,
            };
        }

        if self.strategy == CompactionStrategy::None {
            return self.keep_everything(&mut pass, turns);
        }

        pass.advance(CompactionState::Extracting);
        if let Err(e) = validate_all(turns) {
            return self.degrade(&mut pass, turns, e);
        }

        let anchors = self.find_anchors(turns);
        let context = PreservationContext::extract(turns);

        pass.advance(CompactionState::Selecting);
        let selection = self.select(turns.len(), &anchors);

        pass.advance(CompactionState::Summarizing);
        let summary_text = build_summary(&context, &anchors, &selection, turns);

        let original_tokens = self.count_turns(turns, 0..turns.len());
        let summarized_tokens = self.count_turns(turns, selection.summarized.iter().copied());
        let summary_tokens = self.estimator.count(&summary_text);
        let compression_ratio = (summarized_tokens > 0)
            .then(|| 1.0 - summary_tokens as f64 / summarized_tokens as f64);

        let mut warnings = Vec::new();
        if let Some(ratio) = compression_ratio {
            if ratio < self.min_compression_ratio {
                warnings.push(format!(
                    "Compression ratio below {:.0}% ({:.1}%) - consider starting fresh conversation",
                    self.min_compression_ratio * 100.0,
                    ratio * 100.0
                ));
            }
        }

        pass.advance(CompactionState::Done);
        info!(
            compaction_id = %pass.id,
            strategy = ?self.strategy,
            kept = selection.kept.len(),
            summarized = selection.summarized.len(),
            anchors = anchors.len(),
            ratio = ?compression_ratio,
            "Compaction finished"
        );

        CompactionResult {
            metrics: CompactionMetrics {
                original_tokens,
                summarized_tokens,
                summary_tokens,
                compression_ratio,
                turns_kept: selection.kept.len(),
                turns_summarized: selection.summarized.len(),
            },
            kept_turns: selection.kept,
            summarized_turns: selection.summarized,
            anchors,
            summary_text,
            warnings,
            state: pass.state,
        }
    }

    /// Anchors for the boundary; truncation ignores them
    fn find_anchors(&self, turns: &[ConversationTurn]) -> Vec<Anchor> {
        if let CompactionStrategy::SimpleTruncate { .. } = self.strategy {
            return Vec::new();
        }
        let mut anchors = self.detector.detect(turns);
        if anchors.is_empty() {
            anchors.push(Anchor::synthetic(turns.len() - 1));
        }
        anchors
    }

    fn select(&self, turn_count: usize, anchors: &[Anchor]) -> TurnSelection {
        match self.strategy {
            CompactionStrategy::SimpleTruncate { keep_last } => {
                let keep = keep_last.max(self.selector.turns_always_kept());
                TurnSelector::new(keep).select(turn_count, &[])
            }
            _ => self.selector.select(turn_count, anchors),
        }
    }

    /// Compaction switched off: every turn stays verbatim
    fn keep_everything(&self, pass: &mut Pass, turns: &[ConversationTurn]) -> CompactionResult {
        debug!(compaction_id = %pass.id, turns = turns.len(), "Compaction disabled, keeping all turns");
        pass.advance(CompactionState::Done);

        CompactionResult {
            metrics: CompactionMetrics {
                original_tokens: self.count_turns(turns, 0..turns.len()),
                turns_kept: turns.len(),
                ..CompactionMetrics::default()
            },
            kept_turns: (0..turns.len()).collect(),
            summarized_turns: Vec::new(),
            anchors: Vec::new(),
            summary_text: String::new(),
            warnings: Vec::new(),
            state: pass.state,
        }
    }

    /// Keep the recency floor, summarize nothing
    fn degrade(&self, pass: &mut Pass, turns: &[ConversationTurn], error: ContextError) -> CompactionResult {
        let error = error.into_degraded();
        warn!(compaction_id = %pass.id, error = %error, "Compaction degraded");
        pass.advance(CompactionState::Degraded);

        let selection = self.selector.select(turns.len(), &[]);
        let original_tokens = self.count_turns(turns, 0..turns.len());
        let summarized_tokens = self.count_turns(turns, selection.summarized.iter().copied());

        CompactionResult {
            metrics: CompactionMetrics {
                original_tokens,
                summarized_tokens,
                summary_tokens: self.estimator.count(DEGRADED_SUMMARY),
                compression_ratio: None,
                turns_kept: selection.kept.len(),
                turns_summarized: selection.summarized.len(),
            },
            kept_turns: selection.kept,
            summarized_turns: selection.summarized,
            anchors: Vec::new(),
            summary_text: DEGRADED_SUMMARY.to_string(),
            warnings: vec![error.to_string()],
            state: pass.state,
        }
    }

    fn count_turns(&self, turns: &[ConversationTurn], indices: impl Iterator<Item = usize>) -> usize {
        indices
            .filter_map(|i| turns.get(i))
            .map(|turn| self.estimator.count(&turn.full_text()))
            .sum()
    }
}

fn validate_all(turns: &[ConversationTurn]) -> crate::error::Result<()> {
    turns
        .iter()
        .enumerate()
        .try_for_each(|(index, turn)| turn.validate(index))
}

// ============================================================================
// Summary text
// ============================================================================

fn build_summary(
    context: &PreservationContext,
    anchors: &[Anchor],
    selection: &TurnSelection,
    turns: &[ConversationTurn],
) -> String {
    let mut sections = Vec::new();

    let facts = context.format_for_summary();
    if !facts.is_empty() {
        sections.push(facts);
    }

    if !anchors.is_empty() {
        let listing: Vec<String> = anchors
            .iter()
            .map(|a| format!("- turn {} [{}]: {}", a.turn_index, a.anchor_type, a.description))
            .collect();
        sections.push(format!("Anchors:\n{}", listing.join("\n")));
    }

    let outcomes: Vec<String> = selection
        .summarized
        .iter()
        .filter_map(|&i| outcome_line(i, turns.get(i)?, anchors))
        .collect();
    if !outcomes.is_empty() {
        sections.push(format!("Key outcomes:\n{}", outcomes.join("\n")));
    }

    sections.join("\n\n")
}

/// One line per summarized turn that changed files or carried an anchor
fn outcome_line(index: usize, turn: &ConversationTurn, anchors: &[Anchor]) -> Option<String> {
    if let Some(anchor) = anchors.iter().find(|a| a.turn_index == index) {
        return Some(format!("[ANCHOR] {}", anchor.description));
    }

    let mut modified: Vec<String> = Vec::new();
    let mut failed = false;
    for call in &turn.tool_calls {
        failed |= call.is_failure();
        if call.kind().modifies_files() {
            if let Some(name) = call.path().map(display_name) {
                if !modified.contains(&name) {
                    modified.push(name);
                }
            }
        }
    }
    if modified.is_empty() {
        return None;
    }

    let mark = if failed { "✗" } else { "✓" };
    let headline = first_sentence(&turn.content);
    if headline.is_empty() {
        Some(format!("{mark} Modified {}", modified.join(", ")))
    } else {
        Some(format!(
            "{mark} Modified {}: {}",
            modified.join(", "),
            truncate(&headline, MAX_OUTCOME_CHARS)
        ))
    }
}

fn first_sentence(text: &str) -> String {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorType;
    use crate::turn::ToolInvocation;
    use serde_json::json;
    use std::sync::Arc;
    use workset_foundation::WhitespaceTokenizer;

    fn compactor() -> Compactor {
        Compactor::new(
            &CompactionSettings::default(),
            TokenEstimator::with_tokenizer(Arc::new(WhitespaceTokenizer)),
        )
    }

    fn chatter(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| ConversationTurn::user(format!("message number {i} with a few words of filler text")))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = compactor().compact(&[]);
        assert!(result.kept_turns.is_empty());
        assert!(result.anchors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.state, CompactionState::Done);
    }

    #[test]
    fn test_synthetic_anchor_when_none_detected() {
        let result = compactor().compact(&chatter(6));
        assert_eq!(result.anchors.len(), 1);
        let anchor = &result.anchors[0];
        assert!(anchor.synthetic);
        assert_eq!(anchor.anchor_type, AnchorType::UserCheckpoint);
        assert_eq!(anchor.turn_index, 5);
        assert_eq!(result.kept_turns, vec![3, 4, 5]);
        assert_eq!(result.summarized_turns, vec![0, 1, 2]);
        assert!(result.summary_text.contains("Synthetic checkpoint"));
    }

    #[test]
    fn test_malformed_turn_degrades() {
        let mut turns = chatter(5);
        turns[1] = ConversationTurn::assistant("broken").with_tool_call(ToolInvocation::new("", json!({})));

        let result = compactor().compact(&turns);
        assert!(result.is_degraded());
        assert_eq!(result.kept_turns, vec![2, 3, 4]);
        assert_eq!(result.summarized_turns, vec![0, 1]);
        assert_eq!(result.summary_text, DEGRADED_SUMMARY);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Malformed turn 1"));
    }

    #[test]
    fn test_summary_lists_outcomes_and_anchor() {
        let turns = vec![
            ConversationTurn::user("Please fix the auth bug"),
            ConversationTurn::assistant("Patched the token check. Running tests next")
                .with_tool_call(ToolInvocation::new("Edit", json!({"file_path": "src/auth.rs"})).succeeded("ok")),
            ConversationTurn::assistant("Tests")
                .with_tool_call(ToolInvocation::new("Bash", json!({"command": "cargo test"})).succeeded("All 15 tests passed")),
            ConversationTurn::user("thanks"),
            ConversationTurn::assistant("sure"),
            ConversationTurn::user("ok"),
        ];

        let result = compactor().compact(&turns);
        assert_eq!(result.anchors.len(), 1);
        assert_eq!(result.anchors[0].turn_index, 1);
        assert_eq!(result.summarized_turns, vec![0]);
        assert_eq!(result.kept_turns, vec![1, 2, 3, 4, 5]);

        let summary = &result.summary_text;
        assert!(summary.contains("Active files: auth.rs"));
        assert!(summary.contains("Goals: Fix the auth bug"));
        assert!(summary.contains("Build: passing"));
        assert!(summary.contains("Anchors:\n- turn 1 [task completion]"));
    }

    #[test]
    fn test_outcome_line_marks() {
        let ok = ConversationTurn::assistant("Renamed the handler. Done")
            .with_tool_call(ToolInvocation::new("Edit", json!({"file_path": "a/b.rs"})).succeeded("ok"))
            .with_tool_call(ToolInvocation::new("Write", json!({"file_path": "c.rs"})).succeeded("ok"));
        assert_eq!(
            outcome_line(0, &ok, &[]).as_deref(),
            Some("✓ Modified b.rs, c.rs: Renamed the handler")
        );

        let bad = ConversationTurn::assistant("")
            .with_tool_call(ToolInvocation::new("Edit", json!({"file_path": "x.rs"})).failed("no match"));
        assert_eq!(outcome_line(0, &bad, &[]).as_deref(), Some("✗ Modified x.rs"));

        assert_eq!(outcome_line(0, &ConversationTurn::user("hi"), &[]), None);
    }

    #[test]
    fn test_low_compression_warning() {
        // tiny summarized prefix: summary is larger than what it replaces
        let mut turns = vec![ConversationTurn::user("hi")];
        turns.extend(chatter(3));

        let result = compactor().compact(&turns);
        assert_eq!(result.summarized_turns, vec![0]);
        let ratio = result.metrics.compression_ratio.unwrap_or(1.0);
        assert!(ratio < 0.6);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("Compression ratio below 60%")));
    }

    #[test]
    fn test_nothing_summarized_has_no_ratio() {
        let result = compactor().compact(&chatter(2));
        assert!(result.summarized_turns.is_empty());
        assert_eq!(result.metrics.compression_ratio, None);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_kept_returns_turns_in_order() {
        let turns = chatter(5);
        let result = compactor().compact(&turns);
        let kept: Vec<&str> = result.kept(&turns).iter().map(|t| t.content.as_str()).collect();
        assert_eq!(kept.len(), 3);
        assert!(kept[0].contains("number 2"));
        assert!(kept[2].contains("number 4"));
    }

    #[test]
    fn test_simple_truncate_ignores_anchors() {
        let mut turns = vec![
            ConversationTurn::user("Please fix the auth bug"),
            ConversationTurn::assistant("Patched")
                .with_tool_call(ToolInvocation::new("Edit", json!({"file_path": "src/auth.rs"})).succeeded("ok"))
                .with_tool_call(ToolInvocation::new("Bash", json!({"command": "cargo test"})).succeeded("All 15 tests passed")),
        ];
        turns.extend(chatter(6));

        let result = compactor()
            .with_strategy(CompactionStrategy::SimpleTruncate { keep_last: 4 })
            .compact(&turns);
        assert_eq!(result.state, CompactionState::Done);
        assert!(result.anchors.is_empty());
        assert_eq!(result.kept_turns, vec![4, 5, 6, 7]);
        assert_eq!(result.summarized_turns, vec![0, 1, 2, 3]);
        assert!(result.summary_text.contains("Goals: Fix the auth bug"));
        assert!(!result.summary_text.contains("Anchors:"));
        assert!(result.summary_text.contains("✓ Modified auth.rs"));
    }

    #[test]
    fn test_simple_truncate_respects_recency_floor() {
        let result = compactor()
            .with_strategy(CompactionStrategy::SimpleTruncate { keep_last: 1 })
            .compact(&chatter(6));
        assert_eq!(result.kept_turns, vec![3, 4, 5]);
    }

    #[test]
    fn test_strategy_none_keeps_everything() {
        let settings = CompactionSettings {
            strategy: CompactionStrategy::None,
            ..Default::default()
        };
        let compactor = Compactor::new(
            &settings,
            TokenEstimator::with_tokenizer(Arc::new(WhitespaceTokenizer)),
        );
        assert_eq!(compactor.strategy(), CompactionStrategy::None);

        let turns = chatter(8);
        let result = compactor.compact(&turns);
        assert_eq!(result.state, CompactionState::Done);
        assert_eq!(result.kept_turns, (0..8).collect::<Vec<_>>());
        assert!(result.summarized_turns.is_empty());
        assert!(result.summary_text.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.metrics.compression_ratio, None);
        assert!(result.metrics.original_tokens > 0);
    }
}
