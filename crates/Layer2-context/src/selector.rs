//! Turn selection
//!
//! Splits turn indices into those kept verbatim and those handed to the
//! summary. The last `turns_always_kept` turns are never summarized.

use serde::{Deserialize, Serialize};

use workset_foundation::config::CompactionSettings;

use crate::anchor::Anchor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSelection {
    /// Ascending
    pub kept: Vec<usize>,
    /// Ascending
    pub summarized: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct TurnSelector {
    turns_always_kept: usize,
}

impl Default for TurnSelector {
    fn default() -> Self {
        Self::new(3)
    }
}

impl TurnSelector {
    pub fn new(turns_always_kept: usize) -> Self {
        Self { turns_always_kept }
    }

    pub fn from_settings(settings: &CompactionSettings) -> Self {
        Self::new(settings.turns_always_kept)
    }

    pub fn turns_always_kept(&self) -> usize {
        self.turns_always_kept
    }

    /// The anchor that decides the summary boundary
    ///
    /// Highest weight wins; among equal weights the later turn wins.
    pub fn boundary_anchor<'a>(&self, anchors: &'a [Anchor]) -> Option<&'a Anchor> {
        anchors.iter().max_by(|a, b| {
            a.weight
                .total_cmp(&b.weight)
                .then(a.turn_index.cmp(&b.turn_index))
        })
    }

    pub fn select(&self, turn_count: usize, anchors: &[Anchor]) -> TurnSelection {
        let recent_start = turn_count.saturating_sub(self.turns_always_kept);
        let boundary = self
            .boundary_anchor(anchors)
            .map(|a| a.turn_index.min(recent_start))
            .unwrap_or(recent_start);

        TurnSelection {
            kept: (boundary..turn_count).collect(),
            summarized: (0..boundary).collect(),
        }
    }
}
