//! Rolling queue statistics and completion estimates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Samples kept per rolling average.
pub const SAMPLE_WINDOW: usize = 100;

/// Processing time assumed before any attempt has completed.
const DEFAULT_PROCESSING_ESTIMATE_MS: f64 = 1000.0;

/// Persisted counters and samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStatistics {
    pub total_enqueued: u64,
    /// Entries dropped by `remove`, purges and `clear_completed`.
    pub total_removed: u64,
    /// Completed entries dropped from the bounded history.
    pub total_evicted: u64,
    pub total_completed: u64,
    pub total_failed_attempts: u64,
    pub total_dead_lettered: u64,
    pub wait_times_ms: VecDeque<u64>,
    pub processing_times_ms: VecDeque<u64>,
    pub peak_queue_size: usize,
    pub peak_observed_at: Option<DateTime<Utc>>,
}

impl QueueStatistics {
    pub fn record_wait(&mut self, ms: u64) {
        push_sample(&mut self.wait_times_ms, ms);
    }

    pub fn record_processing(&mut self, ms: u64) {
        push_sample(&mut self.processing_times_ms, ms);
    }

    pub fn observe_queue_size(&mut self, size: usize) {
        if size > self.peak_queue_size {
            self.peak_queue_size = size;
            self.peak_observed_at = Some(Utc::now());
        }
    }

    /// Fold in counters and samples gathered separately, e.g. before a restore.
    pub fn merge(&mut self, other: &QueueStatistics) {
        self.total_enqueued += other.total_enqueued;
        self.total_removed += other.total_removed;
        self.total_evicted += other.total_evicted;
        self.total_completed += other.total_completed;
        self.total_failed_attempts += other.total_failed_attempts;
        self.total_dead_lettered += other.total_dead_lettered;
        for ms in &other.wait_times_ms {
            self.record_wait(*ms);
        }
        for ms in &other.processing_times_ms {
            self.record_processing(*ms);
        }
        if other.peak_queue_size > self.peak_queue_size {
            self.peak_queue_size = other.peak_queue_size;
            self.peak_observed_at = other.peak_observed_at;
        }
    }

    pub fn average_wait_ms(&self) -> Option<f64> {
        average(&self.wait_times_ms)
    }

    pub fn average_processing_ms(&self) -> Option<f64> {
        average(&self.processing_times_ms)
    }

    /// Dead-lettered share of enqueued entries.
    pub fn error_rate(&self) -> f64 {
        if self.total_enqueued == 0 {
            return 0.0;
        }
        self.total_dead_lettered as f64 / self.total_enqueued as f64
    }

    /// Entries the four collections should hold between them.
    pub fn expected_resident(&self) -> u64 {
        self.total_enqueued
            .saturating_sub(self.total_removed)
            .saturating_sub(self.total_evicted)
    }

    pub fn report(&self, max_concurrent_jobs: usize) -> StatisticsReport {
        let average_processing_ms = self.average_processing_ms();
        let throughput_per_minute = average_processing_ms
            .filter(|avg| *avg > 0.0)
            .map(|avg| 60_000.0 / avg * max_concurrent_jobs as f64);

        StatisticsReport {
            total_enqueued: self.total_enqueued,
            total_completed: self.total_completed,
            total_failed_attempts: self.total_failed_attempts,
            total_dead_lettered: self.total_dead_lettered,
            total_removed: self.total_removed,
            average_wait_ms: self.average_wait_ms(),
            average_processing_ms,
            throughput_per_minute,
            error_rate: self.error_rate(),
            peak_queue_size: self.peak_queue_size,
            peak_observed_at: self.peak_observed_at,
        }
    }
}

fn push_sample(samples: &mut VecDeque<u64>, value: u64) {
    samples.push_back(value);
    while samples.len() > SAMPLE_WINDOW {
        samples.pop_front();
    }
}

fn average(samples: &VecDeque<u64>) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
}

/// Derived view returned by `ProcessingQueue::get_statistics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_failed_attempts: u64,
    pub total_dead_lettered: u64,
    pub total_removed: u64,
    pub average_wait_ms: Option<f64>,
    pub average_processing_ms: Option<f64>,
    /// Completions per minute at full concurrency.
    pub throughput_per_minute: Option<f64>,
    pub error_rate: f64,
    pub peak_queue_size: usize,
    pub peak_observed_at: Option<DateTime<Utc>>,
}

/// Expected start and completion of a pending entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEstimate {
    pub entry_id: String,
    /// 1-based position in the pending list.
    pub position: usize,
    pub estimated_start_ms: u64,
    pub estimated_completion_ms: u64,
    pub estimated_completion_at: DateTime<Utc>,
}

/// Estimate completion for each pending id, in pending order.
///
/// Entries are assumed to start in waves of `max_concurrent_jobs`, after
/// the `in_flight` entries free their slots.
pub fn completion_estimates(
    pending_ids: &[String],
    in_flight: usize,
    max_concurrent_jobs: usize,
    average_processing_ms: Option<f64>,
) -> Vec<CompletionEstimate> {
    let slots = max_concurrent_jobs.max(1);
    let per_item = average_processing_ms.unwrap_or(DEFAULT_PROCESSING_ESTIMATE_MS);
    let now = Utc::now();

    pending_ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let wave = (index + in_flight) / slots;
            let start = (wave as f64 * per_item) as u64;
            let completion = start + per_item as u64;
            CompletionEstimate {
                entry_id: id.clone(),
                position: index + 1,
                estimated_start_ms: start,
                estimated_completion_ms: completion,
                estimated_completion_at: now + chrono::Duration::milliseconds(completion as i64),
            }
        })
        .collect()
}
