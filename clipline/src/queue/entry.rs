//! Queue entries and priority tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentRecord;

/// Admission priority tier.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Ordinal tier; higher is admitted first.
    pub fn tier(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
        }
    }
}

/// One processing attempt in an entry's diagnostic trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A content record waiting in or passing through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub content: ContentRecord,
    /// Fixed at enqueue.
    pub priority: Priority,
    pub added_at: DateTime<Utc>,
    /// Queue-level processing attempts started.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub processing_history: Vec<AttemptRecord>,
    /// Backoff gate: the entry is not admitted before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the entry is dead-lettered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl QueueEntry {
    pub fn new(content: ContentRecord, priority: Priority) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            priority,
            added_at: Utc::now(),
            attempts: 0,
            last_error: None,
            processing_history: Vec::new(),
            not_before: None,
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    /// Whether the backoff gate has passed.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|at| at <= now)
    }

    /// Milliseconds between enqueue and the start of the current attempt.
    pub fn wait_time_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        Some((started - self.added_at).num_milliseconds().max(0) as u64)
    }

    /// Put the entry back into a pending-ready shape after a restart.
    pub(crate) fn reset_for_requeue(&mut self) {
        self.started_at = None;
        self.not_before = None;
    }
}

/// Insert `entry` before the first entry of a strictly lower tier.
///
/// Returns the 0-based index it landed at.
pub(crate) fn insert_by_priority(pending: &mut Vec<QueueEntry>, entry: QueueEntry) -> usize {
    let tier = entry.priority.tier();
    let index = pending
        .iter()
        .position(|e| e.priority.tier() < tier)
        .unwrap_or(pending.len());
    pending.insert(index, entry);
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, priority: Priority) -> QueueEntry {
        let mut e = QueueEntry::new(ContentRecord::new(id, "t", "b"), priority);
        e.id = id.to_string();
        e
    }

    fn ids(pending: &[QueueEntry]) -> Vec<&str> {
        pending.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_priority_insertion() {
        let mut pending = Vec::new();
        insert_by_priority(&mut pending, entry("low", Priority::Low));
        insert_by_priority(&mut pending, entry("high", Priority::High));
        insert_by_priority(&mut pending, entry("normal", Priority::Normal));
        assert_eq!(ids(&pending), vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut pending = Vec::new();
        insert_by_priority(&mut pending, entry("n1", Priority::Normal));
        insert_by_priority(&mut pending, entry("l1", Priority::Low));
        insert_by_priority(&mut pending, entry("n2", Priority::Normal));
        let at = insert_by_priority(&mut pending, entry("h1", Priority::High));
        insert_by_priority(&mut pending, entry("h2", Priority::High));
        assert_eq!(at, 0);
        assert_eq!(ids(&pending), vec!["h1", "h2", "n1", "n2", "l1"]);
    }

    #[test]
    fn test_priority_serde() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        assert_eq!(Priority::Low.to_string(), "low");
        assert!(Priority::High.tier() > Priority::Normal.tier());
    }

    #[test]
    fn test_ready_gate() {
        let mut e = entry("a", Priority::Normal);
        let now = Utc::now();
        assert!(e.is_ready(now));
        e.not_before = Some(now + chrono::Duration::seconds(5));
        assert!(!e.is_ready(now));
    }
}
