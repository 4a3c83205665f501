//! Anchor detection
//!
//! An anchor marks a turn before which history can be summarized without
//! losing task-critical context. Detection is binary at the confidence
//! gate: a turn either yields one anchor at or above the threshold, or
//! nothing.
//!
//! | Type | Weight | Confidence | Pattern |
//! |------|--------|------------|---------|
//! | ErrorResolution | 0.9 | 0.95 | edit → passing tests, after an error |
//! | FeatureMilestone | 0.75 | 0.93 | ≥2 files edited, build and tests pass |
//! | TaskCompletion | 0.8 | 0.92 | edit → passing tests, or shell milestone |
//! | UserCheckpoint | 0.7 | 0.91 | search results synthesized |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use workset_foundation::config::{CompactionSettings, MIN_ANCHOR_CONFIDENCE};

use crate::signals::{classify, Verdict};
use crate::turn::{display_name, truncate, ConversationTurn, Role, ToolInvocation, ToolKind};

const ERROR_RESOLUTION_CONFIDENCE: f64 = 0.95;
const FEATURE_MILESTONE_CONFIDENCE: f64 = 0.93;
const TASK_COMPLETION_CONFIDENCE: f64 = 0.92;
const SEARCH_SYNTHESIS_CONFIDENCE: f64 = 0.91;

/// Search output shorter than this is not worth anchoring on
const MIN_SEARCH_OUTPUT_BYTES: usize = 100;

const MILESTONE_WORDS: &[&str] = &["successfully", "installed", "built", "compiled", "completed"];
const SYNTHESIS_PHRASES: &[&str] = &[
    "based on",
    "according to",
    "the results show",
    "search results show",
    "search results,",
];

// ============================================================================
// Anchor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorType {
    ErrorResolution,
    TaskCompletion,
    FeatureMilestone,
    UserCheckpoint,
}

impl AnchorType {
    /// Fixed per type
    pub fn weight(&self) -> f64 {
        match self {
            AnchorType::ErrorResolution => 0.9,
            AnchorType::TaskCompletion => 0.8,
            AnchorType::FeatureMilestone => 0.75,
            AnchorType::UserCheckpoint => 0.7,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnchorType::ErrorResolution => "error resolution",
            AnchorType::TaskCompletion => "task completion",
            AnchorType::FeatureMilestone => "feature milestone",
            AnchorType::UserCheckpoint => "checkpoint",
        }
    }
}

impl std::fmt::Display for AnchorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub anchor_type: AnchorType,
    pub weight: f64,
    pub confidence: f64,
    pub turn_index: usize,
    pub description: String,
    pub synthetic: bool,
}

impl Anchor {
    pub fn new(
        anchor_type: AnchorType,
        confidence: f64,
        turn_index: usize,
        description: impl Into<String>,
    ) -> Self {
        Self {
            anchor_type,
            weight: anchor_type.weight(),
            confidence,
            turn_index,
            description: description.into(),
            synthetic: false,
        }
    }

    /// Fallback checkpoint used when no natural anchor was found
    pub fn synthetic(turn_index: usize) -> Self {
        Self {
            anchor_type: AnchorType::UserCheckpoint,
            weight: AnchorType::UserCheckpoint.weight(),
            confidence: 1.0,
            turn_index,
            description: "Synthetic checkpoint at the latest turn (no natural anchor detected)"
                .to_string(),
            synthetic: true,
        }
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Scans a turn list for anchors
#[derive(Debug, Clone)]
pub struct AnchorDetector {
    confidence_threshold: f64,
}

impl Default for AnchorDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-turn analysis result before the confidence gate
struct TurnFindings {
    candidate: Option<Anchor>,
    /// Error state left open at the end of the turn
    pending_error: bool,
}

impl AnchorDetector {
    pub fn new() -> Self {
        Self {
            confidence_threshold: MIN_ANCHOR_CONFIDENCE,
        }
    }

    /// Threshold below 0.9 is raised to 0.9
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            confidence_threshold: threshold.max(MIN_ANCHOR_CONFIDENCE),
        }
    }

    pub fn from_settings(settings: &CompactionSettings) -> Self {
        Self::with_threshold(settings.confidence_threshold())
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Detect anchors, at most one per turn, ordered by turn index
    pub fn detect(&self, turns: &[ConversationTurn]) -> Vec<Anchor> {
        let mut found: BTreeMap<usize, Anchor> = BTreeMap::new();
        let mut pending_error = false;

        for (index, turn) in turns.iter().enumerate() {
            let findings = self.analyze_turn(turns, index, pending_error || turn.previous_error);
            pending_error = findings.pending_error;

            if let Some(anchor) = findings.candidate {
                offer(&mut found, anchor);
            }
            if let Some(anchor) = detect_search_synthesis(turns, index) {
                offer(&mut found, anchor);
            }
        }

        let anchors: Vec<Anchor> = found
            .into_values()
            .filter(|a| a.confidence >= self.confidence_threshold)
            .collect();
        debug!(turns = turns.len(), anchors = anchors.len(), "Anchor detection finished");
        anchors
    }

    fn analyze_turn(&self, turns: &[ConversationTurn], index: usize, error_open: bool) -> TurnFindings {
        let turn = &turns[index];
        let calls = &turn.tool_calls;
        let mut pending = error_open;

        let mut resolution: Option<Resolution> = None;
        let mut edited: BTreeSet<String> = BTreeSet::new();
        let mut build_passed = false;

        for (j, call) in calls.iter().enumerate() {
            let signal = call.signal();

            if call.is_failure() || signal.is_some_and(|s| s.verdict == Verdict::Fail) {
                pending = true;
                continue;
            }
            if signal.is_some_and(|s| s.is_build_pass()) {
                build_passed = true;
            }

            if call.kind().modifies_files() {
                if let Some(path) = call.path() {
                    edited.insert(display_name(path));
                }
                if resolution.is_none() {
                    if let Some(test_at) = passing_test_after(turns, index, j) {
                        resolution = Some(Resolution {
                            had_error: pending,
                            test_call: test_at,
                        });
                    }
                }
            }

            if resolution.as_ref().is_some_and(|r| r.test_call == TestCall::Same(j)) {
                pending = false;
            }
        }

        // Resolution confirmed by the first call of the next turn
        if resolution
            .as_ref()
            .is_some_and(|r| r.test_call == TestCall::NextTurn)
        {
            pending = false;
        }

        let files: Vec<String> = edited.into_iter().collect();
        let candidate = match resolution {
            Some(r) if r.had_error => Some(Anchor::new(
                AnchorType::ErrorResolution,
                ERROR_RESOLUTION_CONFIDENCE,
                index,
                format!("Error resolved: edited {}, tests pass", files.join(", ")),
            )),
            Some(r) if files.len() >= 2 && build_passed && r.test_call != TestCall::NextTurn => {
                Some(Anchor::new(
                    AnchorType::FeatureMilestone,
                    FEATURE_MILESTONE_CONFIDENCE,
                    index,
                    format!(
                        "Feature milestone: {} files changed ({}), build and tests pass",
                        files.len(),
                        files.join(", ")
                    ),
                ))
            }
            Some(_) => Some(Anchor::new(
                AnchorType::TaskCompletion,
                TASK_COMPLETION_CONFIDENCE,
                index,
                format!("Task completed: edited {}, tests pass", files.join(", ")),
            )),
            None => detect_shell_milestone(calls, index),
        };

        TurnFindings {
            candidate,
            pending_error: pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestCall {
    Same(usize),
    NextTurn,
}

struct Resolution {
    had_error: bool,
    test_call: TestCall,
}

/// Keep the stronger anchor when two land on the same turn
fn offer(found: &mut BTreeMap<usize, Anchor>, anchor: Anchor) {
    match found.get(&anchor.turn_index) {
        Some(existing) if existing.confidence >= anchor.confidence => {}
        _ => {
            found.insert(anchor.turn_index, anchor);
        }
    }
}

/// The passing test run that immediately follows an edit
///
/// Later calls in the same turn are scanned up to the first pass/fail
/// signal; build passes and signal-free calls are skipped. An edit that
/// closes its turn is confirmed by the next turn's first call.
fn passing_test_after(turns: &[ConversationTurn], index: usize, edit_at: usize) -> Option<TestCall> {
    let calls = &turns[index].tool_calls;

    if edit_at + 1 < calls.len() {
        for (k, call) in calls.iter().enumerate().skip(edit_at + 1) {
            let Some(signal) = call.signal() else {
                continue;
            };
            if signal.is_test_pass() {
                return Some(TestCall::Same(k));
            }
            if signal.verdict == Verdict::Fail {
                return None;
            }
        }
        return None;
    }

    let first_next = turns.get(index + 1)?.tool_calls.first()?;
    first_next
        .signal()
        .filter(|s| s.is_test_pass())
        .map(|_| TestCall::NextTurn)
}

fn detect_shell_milestone(calls: &[ToolInvocation], index: usize) -> Option<Anchor> {
    calls.iter().find_map(|call| {
        if call.kind() != ToolKind::Shell || !call.is_success() {
            return None;
        }
        let output = &call.result.as_ref()?.output;
        let lower = output.to_lowercase();
        if !MILESTONE_WORDS.iter().any(|w| lower.contains(w)) {
            return None;
        }
        if classify(output).is_some_and(|s| s.verdict == Verdict::Fail) {
            return None;
        }

        let headline = output
            .lines()
            .map(str::trim)
            .find(|l| {
                let l = l.to_lowercase();
                MILESTONE_WORDS.iter().any(|w| l.contains(w))
            })
            .unwrap_or_default();
        Some(Anchor::new(
            AnchorType::TaskCompletion,
            TASK_COMPLETION_CONFIDENCE,
            index,
            format!("Shell milestone: {}", truncate(headline, 80)),
        ))
    })
}

/// A substantial search result followed by explicit synthesis
///
/// The anchor lands on whichever turn does the synthesizing: the search
/// turn itself, or the next assistant turn.
fn detect_search_synthesis(turns: &[ConversationTurn], index: usize) -> Option<Anchor> {
    let turn = &turns[index];
    let search = turn.tool_calls.iter().find(|call| {
        call.kind() == ToolKind::Search
            && call
                .result
                .as_ref()
                .is_some_and(|r| r.success && r.output.len() > MIN_SEARCH_OUTPUT_BYTES)
    })?;

    let at = if synthesizes(&turn.content) {
        index
    } else {
        let next = turns.get(index + 1)?;
        if next.role != Role::Assistant || !synthesizes(&next.content) {
            return None;
        }
        index + 1
    };

    Some(Anchor::new(
        AnchorType::UserCheckpoint,
        SEARCH_SYNTHESIS_CONFIDENCE,
        at,
        format!("{} results synthesized", search.tool),
    ))
}

fn synthesizes(text: &str) -> bool {
    let lower = text.to_lowercase();
    SYNTHESIS_PHRASES.iter().any(|p| lower.contains(p))
}
