//! Durable snapshot of the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::QueueEntry;
use super::stats::QueueStatistics;

/// Snapshot format version.
pub const STATE_VERSION: u32 = 1;

/// Everything the queue writes to the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueState {
    pub version: u32,
    pub pending: Vec<QueueEntry>,
    /// Requeued at the front of pending on restore.
    pub in_flight: Vec<QueueEntry>,
    /// Most recent completed entries, oldest first.
    pub completed: Vec<QueueEntry>,
    /// Completed entries left out of this snapshot by the persisted cap.
    #[serde(default)]
    pub completed_truncated: u64,
    pub dead_letter: Vec<QueueEntry>,
    pub statistics: QueueStatistics,
    pub saved_at: DateTime<Utc>,
}

impl QueueState {
    pub fn capture<'a>(
        pending: &[QueueEntry],
        in_flight: &[QueueEntry],
        completed: impl ExactSizeIterator<Item = &'a QueueEntry> + DoubleEndedIterator,
        dead_letter: &[QueueEntry],
        statistics: &QueueStatistics,
        persisted_completed: usize,
    ) -> Self {
        let total_completed = completed.len();
        let mut tail: Vec<QueueEntry> = completed
            .rev()
            .take(persisted_completed)
            .cloned()
            .collect();
        tail.reverse();

        Self {
            version: STATE_VERSION,
            pending: pending.to_vec(),
            in_flight: in_flight.to_vec(),
            completed_truncated: (total_completed - tail.len()) as u64,
            completed: tail,
            dead_letter: dead_letter.to_vec(),
            statistics: statistics.clone(),
            saved_at: Utc::now(),
        }
    }

    /// Pending order after a restart: interrupted work first.
    pub fn restored_pending(&self) -> Vec<QueueEntry> {
        self.in_flight
            .iter()
            .cloned()
            .map(|mut entry| {
                entry.reset_for_requeue();
                entry
            })
            .chain(self.pending.iter().cloned())
            .collect()
    }
}
