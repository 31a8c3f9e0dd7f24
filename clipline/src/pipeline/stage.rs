//! The fixed stage machine.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Position of a pipeline in the stage machine.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Pending,
    Queued,
    Validation,
    Enrichment,
    Persistence,
    Indexing,
    PostProcessing,
    Complete,
    Failed,
}

impl Stage {
    /// Executable stages, in order.
    pub const SEQUENCE: [Stage; 5] = [
        Stage::Validation,
        Stage::Enrichment,
        Stage::Persistence,
        Stage::Indexing,
        Stage::PostProcessing,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }

    pub fn is_executable(self) -> bool {
        self.sequence_index().is_some()
    }

    /// Index within [`Stage::SEQUENCE`], if executable.
    pub fn sequence_index(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| *s == self)
    }

    /// Progress percentage after `completed` stages succeeded.
    pub fn progress_for(completed: usize) -> u8 {
        let total = Self::SEQUENCE.len();
        ((completed.min(total) * 100) / total) as u8
    }
}
