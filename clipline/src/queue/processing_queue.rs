//! Durable priority queue in front of the orchestrator.
//!
//! Every entry lives in exactly one of four collections: pending, in-flight,
//! completed (bounded) or dead-letter. Mutations happen under one lock and
//! are followed by a full-state write to the [`StateStore`].

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::entry::{AttemptRecord, Priority, QueueEntry, insert_by_priority};
use super::rate_limit::RateLimiter;
use super::scheduler::DelayScheduler;
use super::state::QueueState;
use super::stats::{CompletionEstimate, QueueStatistics, StatisticsReport, completion_estimates};
use crate::config::QueueConfig;
use crate::content::ContentRecord;
use crate::events::{EventBus, QueueEvent, QueueEventKind};
use crate::services::StateStore;
use crate::{Error, Result};

/// Executes one queue-level processing attempt.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    async fn process(&self, entry: &QueueEntry) -> Result<()>;
}

/// Collection sizes at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub dead_letter: usize,
    pub paused: bool,
    pub max_concurrent_jobs: usize,
    pub max_queue_size: usize,
}

impl QueueStatus {
    pub fn resident(&self) -> usize {
        self.pending + self.in_flight + self.completed + self.dead_letter
    }
}

struct QueueInner {
    pending: Vec<QueueEntry>,
    in_flight: Vec<QueueEntry>,
    completed: VecDeque<QueueEntry>,
    dead_letter: Vec<QueueEntry>,
    stats: QueueStatistics,
    rate_limiter: RateLimiter,
    paused: bool,
}

impl QueueInner {
    fn take_in_flight(&mut self, id: &str) -> Option<QueueEntry> {
        let index = self.in_flight.iter().position(|e| e.id == id)?;
        Some(self.in_flight.remove(index))
    }
}

/// What `admit` decided under the lock.
#[derive(Default)]
struct Admission {
    started: Vec<QueueEntry>,
    /// Entry held at the front and the denial that held it.
    rate_limited: Option<(String, Error)>,
    wake_in: Option<Duration>,
}

pub struct ProcessingQueue {
    config: QueueConfig,
    processor: Arc<dyn QueueProcessor>,
    store: Arc<dyn StateStore>,
    events: EventBus,
    inner: Mutex<QueueInner>,
    /// Serializes state writes so snapshots land in order.
    write_lock: tokio::sync::Mutex<()>,
    scheduler: DelayScheduler,
    cancellation_token: CancellationToken,
    weak_self: Weak<Self>,
}

impl ProcessingQueue {
    /// Create the queue. Must be called inside a Tokio runtime.
    pub fn new(
        config: QueueConfig,
        processor: Arc<dyn QueueProcessor>,
        store: Arc<dyn StateStore>,
        events: EventBus,
    ) -> Arc<Self> {
        info!(
            "Creating processing queue (max {} concurrent jobs, max {} pending)",
            config.max_concurrent_jobs, config.max_queue_size
        );
        let cancellation_token = CancellationToken::new();

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let wake = weak.clone();
            let scheduler = DelayScheduler::spawn(
                move || {
                    if let Some(queue) = wake.upgrade() {
                        queue.pump();
                    }
                },
                cancellation_token.child_token(),
            );

            Self {
                inner: Mutex::new(QueueInner {
                    pending: Vec::new(),
                    in_flight: Vec::new(),
                    completed: VecDeque::new(),
                    dead_letter: Vec::new(),
                    stats: QueueStatistics::default(),
                    rate_limiter: RateLimiter::new(config.rate_limit.clone()),
                    paused: false,
                }),
                config,
                processor,
                store,
                events,
                write_lock: tokio::sync::Mutex::new(()),
                scheduler,
                cancellation_token,
                weak_self: weak.clone(),
            }
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe_queue()
    }

    /// Add a record. Fails with `Capacity` when the pending list is full.
    pub async fn enqueue(&self, content: ContentRecord, priority: Priority) -> Result<String> {
        if content.id.trim().is_empty() {
            return Err(Error::validation("content id is required"));
        }

        let entry = QueueEntry::new(content, priority);
        let id = entry.id.clone();
        let position = {
            let mut inner = self.inner.lock();
            if inner.pending.len() >= self.config.max_queue_size {
                return Err(Error::Capacity {
                    max: self.config.max_queue_size,
                });
            }
            let index = insert_by_priority(&mut inner.pending, entry);
            inner.stats.total_enqueued += 1;
            let size = inner.pending.len();
            inner.stats.observe_queue_size(size);
            index + 1
        };

        debug!("Enqueued {} ({}) at position {}", id, priority, position);
        self.publish(&id, QueueEventKind::Enqueued { priority, position });
        self.persist_logged().await;
        self.pump();
        Ok(id)
    }

    /// Drop a pending entry. Entries already running or finalized are untouched.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.pending.iter().position(|e| e.id == id) {
                Some(index) => {
                    inner.pending.remove(index);
                    inner.stats.total_removed += 1;
                    true
                }
                None => false,
            }
        };

        if removed {
            self.publish(id, QueueEventKind::Removed);
            self.persist_logged().await;
        }
        removed
    }

    /// 1-based position in the pending list.
    pub fn get_position(&self, id: &str) -> Option<usize> {
        self.inner
            .lock()
            .pending
            .iter()
            .position(|e| e.id == id)
            .map(|index| index + 1)
    }

    pub fn get_status(&self) -> QueueStatus {
        let inner = self.inner.lock();
        QueueStatus {
            pending: inner.pending.len(),
            in_flight: inner.in_flight.len(),
            completed: inner.completed.len(),
            dead_letter: inner.dead_letter.len(),
            paused: inner.paused,
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            max_queue_size: self.config.max_queue_size,
        }
    }

    pub fn get_pending_items(&self) -> Vec<QueueEntry> {
        self.inner.lock().pending.clone()
    }

    pub fn get_in_flight_items(&self) -> Vec<QueueEntry> {
        self.inner.lock().in_flight.clone()
    }

    pub fn get_completed_items(&self) -> Vec<QueueEntry> {
        self.inner.lock().completed.iter().cloned().collect()
    }

    pub fn get_dead_letter_queue(&self) -> Vec<QueueEntry> {
        self.inner.lock().dead_letter.clone()
    }

    /// Raw persisted counters.
    pub fn statistics(&self) -> QueueStatistics {
        self.inner.lock().stats.clone()
    }

    pub fn get_statistics(&self) -> StatisticsReport {
        self.inner
            .lock()
            .stats
            .report(self.config.max_concurrent_jobs)
    }

    pub fn get_completion_estimates(&self) -> Vec<CompletionEstimate> {
        let inner = self.inner.lock();
        let ids: Vec<String> = inner.pending.iter().map(|e| e.id.clone()).collect();
        completion_estimates(
            &ids,
            inner.in_flight.len(),
            self.config.max_concurrent_jobs,
            inner.stats.average_processing_ms(),
        )
    }

    /// True when nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock();
        inner.pending.is_empty() && inner.in_flight.is_empty()
    }

    /// Stop admitting work. Running attempts continue.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
        info!("Processing queue paused");
    }

    pub fn resume(&self) {
        self.inner.lock().paused = false;
        info!("Processing queue resumed");
        self.pump();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Load persisted state. Interrupted work is requeued at the front.
    ///
    /// Call once at startup. Entries accepted before the call are merged with
    /// the persisted ones. Returns the number of requeued entries.
    pub async fn restore(&self) -> Result<usize> {
        let Some(blob) = self.store.get(&self.config.state_key).await? else {
            debug!("No persisted queue state under {}", self.config.state_key);
            return Ok(0);
        };
        let state: QueueState = serde_json::from_str(&blob)?;
        let requeued = state.in_flight.len();

        {
            let mut inner = self.inner.lock();
            // work accepted before restore is kept alongside the persisted state
            let mut pending = state.restored_pending();
            for entry in std::mem::take(&mut inner.pending) {
                insert_by_priority(&mut pending, entry);
            }
            inner.pending = pending;

            let mut completed: VecDeque<QueueEntry> = state.completed.into_iter().collect();
            completed.extend(std::mem::take(&mut inner.completed));
            inner.completed = completed;

            let mut dead_letter = state.dead_letter;
            dead_letter.append(&mut inner.dead_letter);
            inner.dead_letter = dead_letter;

            let mut stats = state.statistics;
            stats.total_evicted += state.completed_truncated;
            stats.merge(&inner.stats);
            inner.stats = stats;

            while inner.completed.len() > self.config.completed_history {
                inner.completed.pop_front();
                inner.stats.total_evicted += 1;
            }
            let size = inner.pending.len();
            inner.stats.observe_queue_size(size);
        }

        info!(
            "Restored queue state ({} pending, {} requeued from in-flight)",
            self.get_status().pending,
            requeued
        );
        self.publish("", QueueEventKind::Restored { requeued });
        self.persist_logged().await;
        self.pump();
        Ok(requeued)
    }

    /// Move a dead-lettered entry back to pending with its attempts reset.
    pub async fn retry_dead_letter(&self, id: &str) -> Result<()> {
        let priority = {
            let mut inner = self.inner.lock();
            let index = inner
                .dead_letter
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| Error::not_found("dead-letter entry", id))?;
            if inner.pending.len() >= self.config.max_queue_size {
                return Err(Error::Capacity {
                    max: self.config.max_queue_size,
                });
            }
            let mut entry = inner.dead_letter.remove(index);
            entry.attempts = 0;
            entry.failure_reason = None;
            entry.finished_at = None;
            entry.reset_for_requeue();
            let priority = entry.priority;
            insert_by_priority(&mut inner.pending, entry);
            priority
        };

        info!("Dead-letter entry {} requeued", id);
        let position = self.get_position(id).unwrap_or_default();
        self.publish(id, QueueEventKind::Enqueued { priority, position });
        self.persist_logged().await;
        self.pump();
        Ok(())
    }

    /// Drop dead-letter entries older than the retention window.
    pub async fn purge_dead_letters(&self) -> usize {
        let retention_days = self.config.dead_letter.retention_days;
        if retention_days == 0 {
            return 0;
        }
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

        let purged = {
            let mut inner = self.inner.lock();
            let before = inner.dead_letter.len();
            inner
                .dead_letter
                .retain(|e| e.finished_at.unwrap_or(e.added_at) >= cutoff);
            let purged = before - inner.dead_letter.len();
            inner.stats.total_removed += purged as u64;
            purged
        };

        if purged > 0 {
            info!("Purged {} expired dead-letter entries", purged);
            self.persist_logged().await;
        }
        purged
    }

    /// Drop the completed history.
    pub async fn clear_completed(&self) -> usize {
        let cleared = {
            let mut inner = self.inner.lock();
            let cleared = inner.completed.len();
            inner.completed.clear();
            inner.stats.total_removed += cleared as u64;
            cleared
        };
        if cleared > 0 {
            self.persist_logged().await;
        }
        cleared
    }

    /// Stop admission and timers. Running attempts finish on their own.
    pub fn shutdown(&self) {
        info!("Shutting down processing queue");
        self.cancellation_token.cancel();
        self.scheduler.stop();
    }

    /// Write the full state to the store.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let state = {
            let inner = self.inner.lock();
            QueueState::capture(
                &inner.pending,
                &inner.in_flight,
                inner.completed.iter(),
                &inner.dead_letter,
                &inner.stats,
                self.config.persisted_completed,
            )
        };
        let blob = serde_json::to_string(&state)?;
        self.store.set(&self.config.state_key, &blob).await
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!("Failed to persist queue state: {}", e);
        }
    }

    /// Admit as much pending work as the caps allow.
    fn pump(&self) {
        if self.cancellation_token.is_cancelled() {
            return;
        }
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };

        let admission = self.admit();

        if let Some((id, reason)) = &admission.rate_limited {
            debug!("{}; {} stays at the front", reason, id);
            if let Error::RateLimited { retry_after_ms } = reason {
                self.publish(
                    id,
                    QueueEventKind::RateLimited {
                        retry_in_ms: *retry_after_ms,
                    },
                );
            }
        }
        if let Some(delay) = admission.wake_in {
            self.scheduler.schedule(delay);
        }

        for entry in admission.started {
            let queue = Arc::clone(&this);
            tokio::spawn(async move {
                queue.run_entry(entry).await;
            });
        }
    }

    fn admit(&self) -> Admission {
        let mut admission = Admission::default();
        let mut inner = self.inner.lock();
        if inner.paused {
            return admission;
        }

        let now = Utc::now();
        while inner.in_flight.len() < self.config.max_concurrent_jobs {
            let Some(index) = inner.pending.iter().position(|e| e.is_ready(now)) else {
                admission.wake_in = inner
                    .pending
                    .iter()
                    .filter_map(|e| e.not_before)
                    .min()
                    .map(|at| (at - now).to_std().unwrap_or_default());
                break;
            };

            if let Err(denied) = inner.rate_limiter.try_acquire() {
                if let Error::RateLimited { retry_after_ms } = &denied {
                    admission.wake_in = Some(Duration::from_millis(*retry_after_ms));
                }
                admission.rate_limited = Some((inner.pending[index].id.clone(), denied));
                break;
            }

            let mut entry = inner.pending.remove(index);
            entry.attempts += 1;
            entry.started_at = Some(now);
            entry.not_before = None;
            if entry.attempts == 1
                && let Some(wait) = entry.wait_time_ms()
            {
                inner.stats.record_wait(wait);
            }
            inner.in_flight.push(entry.clone());
            admission.started.push(entry);
        }
        admission
    }

    async fn run_entry(self: Arc<Self>, entry: QueueEntry) {
        // admission moved the entry to in-flight
        self.persist_logged().await;
        self.publish(
            &entry.id,
            QueueEventKind::Started {
                attempt: entry.attempts,
            },
        );
        let clock = Instant::now();
        let started_at = entry.started_at.unwrap_or_else(Utc::now);

        let result = match self.config.job_timeout_ms {
            Some(ms) => {
                match tokio::time::timeout(
                    Duration::from_millis(ms),
                    self.processor.process(&entry),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout(format!("queue entry {}", entry.id), ms)),
                }
            }
            None => self.processor.process(&entry).await,
        };
        let elapsed_ms = clock.elapsed().as_millis() as u64;

        let record = AttemptRecord {
            attempt: entry.attempts,
            started_at,
            finished_at: Utc::now(),
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };

        match result {
            Ok(()) => self.on_success(&entry.id, record, elapsed_ms),
            Err(e) => self.on_failure(&entry.id, record, e),
        }

        self.persist_logged().await;
        self.pump();
    }

    fn on_success(&self, id: &str, record: AttemptRecord, elapsed_ms: u64) {
        {
            let mut inner = self.inner.lock();
            let Some(mut entry) = inner.take_in_flight(id) else {
                return;
            };
            entry.processing_history.push(record);
            entry.finished_at = Some(Utc::now());
            inner.stats.record_processing(elapsed_ms);
            inner.stats.total_completed += 1;
            inner.completed.push_back(entry);
            while inner.completed.len() > self.config.completed_history {
                inner.completed.pop_front();
                inner.stats.total_evicted += 1;
            }
        }

        debug!("Queue entry {} completed in {}ms", id, elapsed_ms);
        self.publish(
            id,
            QueueEventKind::Completed {
                duration_ms: elapsed_ms,
            },
        );
    }

    fn on_failure(&self, id: &str, record: AttemptRecord, err: Error) {
        let message = err.to_string();
        let max_attempts = self.config.dead_letter.max_retry_attempts;

        let event = {
            let mut inner = self.inner.lock();
            let Some(mut entry) = inner.take_in_flight(id) else {
                return;
            };
            inner.stats.total_failed_attempts += 1;
            entry.processing_history.push(record);
            entry.last_error = Some(message.clone());
            let attempts = entry.attempts;

            if attempts >= max_attempts {
                let reason = format!("{} (after {} attempts)", message, attempts);
                entry.failure_reason = Some(reason.clone());
                entry.finished_at = Some(Utc::now());
                inner.dead_letter.push(entry);
                inner.stats.total_dead_lettered += 1;
                warn!("Queue entry {} dead-lettered: {}", id, reason);
                QueueEventKind::DeadLettered { attempts, reason }
            } else {
                let delay = self.config.backoff.delay_for_attempt(attempts);
                entry.started_at = None;
                entry.not_before = chrono::Duration::from_std(delay)
                    .ok()
                    .map(|d| Utc::now() + d);
                insert_by_priority(&mut inner.pending, entry);
                self.scheduler.schedule(delay);
                warn!(
                    "Queue entry {} attempt {}/{} failed: {} (retrying in {:?})",
                    id, attempts, max_attempts, message, delay
                );
                QueueEventKind::RetryScheduled {
                    attempt: attempts,
                    delay_ms: delay.as_millis() as u64,
                    error: message,
                }
            }
        };

        self.publish(id, event);
    }

    fn publish(&self, id: &str, kind: QueueEventKind) {
        self.events.publish_queue(QueueEvent::new(id, kind));
    }
}

impl Drop for ProcessingQueue {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
