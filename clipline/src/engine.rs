//! Engine facade: queue-mediated and direct submission over one orchestrator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{EngineConfig, OrchestratorConfig};
use crate::content::ContentRecord;
use crate::events::EventBus;
use crate::pipeline::{Orchestrator, ProcessingItem, Stage, StartOptions};
use crate::queue::{Priority, ProcessingQueue, QueueEntry, QueueProcessor};
use crate::services::{Collaborators, StateStore};
use crate::{Error, Result};

/// Budget assumed for a stage without a configured timeout.
const UNBOUNDED_STAGE_BUDGET: Duration = Duration::from_secs(60);

/// Longest a pipeline can take once admitted: every stage using every
/// attempt, plus the retry delays in between.
pub fn pipeline_budget(config: &OrchestratorConfig) -> Duration {
    let attempts = config.retry.max_attempts.max(1);
    let retry_delays: Duration = (1..attempts)
        .map(|retry| config.retry.delay_for_retry(retry))
        .sum();

    Stage::SEQUENCE
        .iter()
        .map(|stage| {
            config
                .stage_timeout(*stage)
                .unwrap_or(UNBOUNDED_STAGE_BUDGET)
                * attempts
                + retry_delays
        })
        .sum()
}

/// Runs one queue attempt as a full pipeline.
///
/// An attempt abandoned by a timeout leaves its pipeline running. The next
/// attempt for the same entry waits on that pipeline instead of starting a
/// second one over the same record.
pub struct PipelineProcessor {
    orchestrator: Arc<Orchestrator>,
    wait_timeout: Duration,
    /// Queue entry id -> pipeline started for it and not yet settled.
    pipelines: Mutex<HashMap<String, String>>,
}

impl PipelineProcessor {
    pub fn new(orchestrator: Arc<Orchestrator>, wait_timeout: Duration) -> Self {
        Self {
            orchestrator,
            wait_timeout,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Pipeline to wait on for this attempt, starting one if none is reusable.
    fn pipeline_for(&self, entry: &QueueEntry) -> String {
        let mut pipelines = self.pipelines.lock();
        // drop mappings whose pipeline has since finished or left history
        pipelines.retain(|entry_id, pipeline_id| {
            entry_id == &entry.id
                || self
                    .orchestrator
                    .get_status(pipeline_id)
                    .is_some_and(|item| !item.is_terminal())
        });

        if let Some(pipeline_id) = pipelines.get(&entry.id)
            && let Some(previous) = self.orchestrator.get_status(pipeline_id)
            && (!previous.is_terminal() || previous.stage == Stage::Complete)
        {
            debug!(
                "Entry {} attempt {} reuses pipeline {}",
                entry.id, entry.attempts, pipeline_id
            );
            return pipeline_id.clone();
        }

        let pipeline_id = self
            .orchestrator
            .start(entry.content.clone(), StartOptions::default());
        pipelines.insert(entry.id.clone(), pipeline_id.clone());
        pipeline_id
    }
}

#[async_trait]
impl QueueProcessor for PipelineProcessor {
    async fn process(&self, entry: &QueueEntry) -> Result<()> {
        let pipeline_id = self.pipeline_for(entry);
        let item = self
            .orchestrator
            .wait_for_completion(&pipeline_id, self.wait_timeout)
            .await?;
        self.pipelines.lock().remove(&entry.id);

        match item.error {
            None => Ok(()),
            Some(failure) => Err(Error::PipelineFailed {
                stage: failure.stage.to_string(),
                message: failure.message,
            }),
        }
    }
}

/// Owns the event bus, the orchestrator and the queue feeding it.
pub struct ContentEngine {
    events: EventBus,
    orchestrator: Arc<Orchestrator>,
    queue: Arc<ProcessingQueue>,
}

impl ContentEngine {
    /// Wire the components. Must be called inside a Tokio runtime.
    pub fn new(
        config: EngineConfig,
        services: Collaborators,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new();
        // pipelines may also wait behind direct submissions
        let wait_timeout = pipeline_budget(&config.orchestrator) * 2;
        let orchestrator = Arc::new(Orchestrator::new(
            config.orchestrator,
            services,
            events.clone(),
        ));
        let processor = Arc::new(PipelineProcessor::new(orchestrator.clone(), wait_timeout));
        let queue = ProcessingQueue::new(config.queue, processor, store, events.clone());

        Ok(Self {
            events,
            orchestrator,
            queue,
        })
    }

    /// Restore persisted queue state and begin admission.
    pub async fn start(&self) -> Result<usize> {
        let requeued = self.queue.restore().await?;
        info!("Content engine started ({} entries requeued)", requeued);
        Ok(requeued)
    }

    /// Queue a record for processing.
    pub async fn submit(&self, record: ContentRecord, priority: Priority) -> Result<String> {
        self.queue.enqueue(record, priority).await
    }

    /// Bypass the queue. Returns the pipeline id.
    pub fn process_now(&self, record: ContentRecord) -> String {
        self.orchestrator.start(record, StartOptions::default())
    }

    /// Bypass the queue and wait for the terminal snapshot.
    pub async fn process_and_wait(
        &self,
        record: ContentRecord,
        timeout: Duration,
    ) -> Result<ProcessingItem> {
        let pipeline_id = self.process_now(record);
        self.orchestrator
            .wait_for_completion(&pipeline_id, timeout)
            .await
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn queue(&self) -> &Arc<ProcessingQueue> {
        &self.queue
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stop queue admission and flush its state.
    pub async fn shutdown(&self) -> Result<()> {
        self.queue.shutdown();
        self.queue.persist().await?;
        info!("Content engine shut down");
        Ok(())
    }
}
