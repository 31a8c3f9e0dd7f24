//! Per-pipeline execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rollback::{RollbackAction, RollbackRecord};
use super::stage::Stage;
use crate::content::ContentRecord;

/// One entry of the append-only stage log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// Terminal failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFailure {
    /// Stage that exhausted its retries.
    pub stage: Stage,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Options accepted by `Orchestrator::start`.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Tag the pipeline with a batch id.
    pub batch_id: Option<String>,
    /// Override the configured rollback switch for this pipeline.
    pub enable_rollback: Option<bool>,
}

impl StartOptions {
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.enable_rollback = Some(enabled);
        self
    }
}

/// State of one content record travelling through the stage machine.
///
/// Snapshots of this type are what status queries return; the live payload
/// is held by the running pipeline in a [`PayloadSlot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingItem {
    pub id: String,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub payload: ContentRecord,
    pub stage: Stage,
    pub stage_history: Vec<StageTransition>,
    pub completed_stages: Vec<Stage>,
    pub rollback_actions: Vec<RollbackAction>,
    /// Rollback actions executed, in execution order.
    pub rollback_log: Vec<RollbackRecord>,
    /// Stage-level retries consumed.
    pub retry_attempts: u32,
    pub error: Option<PipelineFailure>,
    pub progress: u8,
    pub enable_rollback: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessingItem {
    pub fn new(payload: ContentRecord, enable_rollback: bool) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: payload.id.clone(),
            batch_id: None,
            payload,
            stage: Stage::Pending,
            stage_history: vec![StageTransition {
                stage: Stage::Pending,
                at: now,
            }],
            completed_stages: Vec::new(),
            rollback_actions: Vec::new(),
            rollback_log: Vec::new(),
            retry_attempts: 0,
            error: None,
            progress: 0,
            enable_rollback,
            created_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `stage`, appending to the history.
    pub fn transition(&mut self, stage: Stage) {
        self.stage = stage;
        self.stage_history.push(StageTransition {
            stage,
            at: Utc::now(),
        });
    }

    /// Record a successful stage and its compensation.
    pub fn complete_stage(&mut self, stage: Stage, action: RollbackAction) {
        self.completed_stages.push(stage);
        self.rollback_actions.push(action);
        self.progress = Stage::progress_for(self.completed_stages.len());
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Whether `completed_stages` is a prefix of the stage sequence.
    pub fn completed_is_prefix(&self) -> bool {
        self.completed_stages.len() <= Stage::SEQUENCE.len()
            && self
                .completed_stages
                .iter()
                .zip(Stage::SEQUENCE.iter())
                .all(|(a, b)| a == b)
    }

    /// Wall-clock run time, if the pipeline started.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds().max(0) as u64)
    }
}

/// Exclusive handle on a pipeline's in-flight payload.
///
/// Not `Clone`: only the task running the pipeline holds it, and stages
/// borrow the record mutably through it one at a time.
#[derive(Debug)]
pub struct PayloadSlot {
    record: ContentRecord,
}

impl PayloadSlot {
    pub fn new(record: ContentRecord) -> Self {
        Self { record }
    }

    pub fn get(&self) -> &ContentRecord {
        &self.record
    }

    pub fn get_mut(&mut self) -> &mut ContentRecord {
        &mut self.record
    }

    /// Copy for publication in status snapshots.
    pub fn snapshot(&self) -> ContentRecord {
        self.record.clone()
    }

    pub fn into_inner(self) -> ContentRecord {
        self.record
    }
}
