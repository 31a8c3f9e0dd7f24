//! Lifecycle notifications published by the orchestrator and the queue.
//!
//! Each component publishes on its own typed topic; observers subscribe to
//! the topic they care about. Publishing never waits on subscribers.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::pipeline::Stage;
use crate::queue::Priority;

/// Default channel capacity per topic.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// What happened to a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEventKind {
    /// Admitted and scheduled for execution.
    Started,
    /// Parked on the wait list because the concurrency cap was reached.
    Waiting { position: usize },
    StageStarted,
    StageCompleted { duration_ms: u64 },
    StageRetry { attempt: u32, delay_ms: u64, error: String },
    Completed { duration_ms: u64 },
    Failed { message: String },
    RolledBack { actions: usize, failures: usize },
}

/// A pipeline lifecycle notification.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub pipeline_id: String,
    pub content_id: String,
    pub kind: PipelineEventKind,
    pub stage: Stage,
    pub progress: u8,
    pub timestamp: DateTime<Utc>,
}

/// What happened to a queue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEventKind {
    Enqueued { priority: Priority, position: usize },
    Removed,
    Started { attempt: u32 },
    Completed { duration_ms: u64 },
    RetryScheduled { attempt: u32, delay_ms: u64, error: String },
    DeadLettered { attempts: u32, reason: String },
    /// Admission was deferred by the rate limiter.
    RateLimited { retry_in_ms: u64 },
    Restored { requeued: usize },
}

/// A queue lifecycle notification.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    /// Entry id; empty for queue-wide events.
    pub entry_id: String,
    pub kind: QueueEventKind,
    pub timestamp: DateTime<Utc>,
}

impl QueueEvent {
    pub fn new(entry_id: impl Into<String>, kind: QueueEventKind) -> Self {
        Self {
            entry_id: entry_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Typed publish/subscribe hub shared by the engine components.
#[derive(Clone)]
pub struct EventBus {
    pipeline_tx: broadcast::Sender<PipelineEvent>,
    queue_tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Create a bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given per-topic capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (pipeline_tx, _) = broadcast::channel(capacity);
        let (queue_tx, _) = broadcast::channel(capacity);
        Self {
            pipeline_tx,
            queue_tx,
        }
    }

    pub fn subscribe_pipeline(&self) -> broadcast::Receiver<PipelineEvent> {
        self.pipeline_tx.subscribe()
    }

    pub fn subscribe_queue(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue_tx.subscribe()
    }

    /// Publish a pipeline event. Returns the number of receivers reached.
    pub fn publish_pipeline(&self, event: PipelineEvent) -> usize {
        tracing::trace!(
            pipeline_id = %event.pipeline_id,
            stage = %event.stage,
            "Publishing pipeline event: {:?}",
            event.kind
        );
        // send() fails only when nobody is listening
        self.pipeline_tx.send(event).unwrap_or(0)
    }

    /// Publish a queue event. Returns the number of receivers reached.
    pub fn publish_queue(&self, event: QueueEvent) -> usize {
        tracing::trace!(entry_id = %event.entry_id, "Publishing queue event: {:?}", event.kind);
        self.queue_tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.pipeline_tx.receiver_count() + self.queue_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
