//! Pipeline orchestrator.
//!
//! Admits content records into the stage machine under a global concurrency
//! cap, retries stages with exponential backoff, and compensates completed
//! stages when a pipeline is abandoned.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, broadcast};
use tracing::{debug, info, warn};

use super::item::{PayloadSlot, PipelineFailure, ProcessingItem, StartOptions};
use super::metrics::{Bottleneck, HealthStatus, PipelineMetrics};
use super::rollback::{RollbackAction, run_rollback};
use super::stage::Stage;
use super::stages::StageRunner;
use crate::config::OrchestratorConfig;
use crate::content::ContentRecord;
use crate::events::{EventBus, PipelineEvent, PipelineEventKind};
use crate::services::Collaborators;
use crate::{Error, Result};

/// Aggregate state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Processing,
    Completed,
    Partial,
    Failed,
}

/// Counts for a batch submitted through `process_batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
    pub status: BatchState,
}

#[derive(Debug, Default)]
struct BatchRecord {
    pipeline_ids: Vec<String>,
    /// Terminal outcome per pipeline (true = complete).
    outcomes: HashMap<String, bool>,
    /// Still receiving submissions from `process_batch`.
    open: bool,
}

impl BatchRecord {
    fn is_settled(&self) -> bool {
        !self.open && self.outcomes.len() == self.pipeline_ids.len()
    }
}

#[derive(Debug, Default)]
struct OrchestratorState {
    active: HashMap<String, ProcessingItem>,
    waiting: VecDeque<ProcessingItem>,
    finished: VecDeque<ProcessingItem>,
    /// Settled batch ids, oldest first.
    settled_batches: VecDeque<String>,
    peak_active: usize,
}

/// Drives content records through the stage machine.
pub struct Orchestrator {
    config: OrchestratorConfig,
    runner: StageRunner,
    events: EventBus,
    state: Mutex<OrchestratorState>,
    batches: DashMap<String, BatchRecord>,
    metrics: Mutex<PipelineMetrics>,
    /// Signalled whenever a pipeline finalizes.
    finalized: Notify,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, services: Collaborators, events: EventBus) -> Self {
        info!(
            "Creating pipeline orchestrator (max {} concurrent pipelines, rollback {})",
            config.max_concurrent_pipelines,
            if config.enable_rollback { "on" } else { "off" }
        );
        Self {
            config,
            runner: StageRunner::new(services),
            events,
            state: Mutex::new(OrchestratorState::default()),
            batches: DashMap::new(),
            metrics: Mutex::new(PipelineMetrics::default()),
            finalized: Notify::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe_pipeline()
    }

    /// Submit a record. Returns the pipeline id without waiting for execution.
    ///
    /// The pipeline runs as soon as a concurrency slot is free; otherwise it
    /// waits in FIFO order.
    pub fn start(self: &Arc<Self>, record: ContentRecord, options: StartOptions) -> String {
        let enable_rollback = options
            .enable_rollback
            .unwrap_or(self.config.enable_rollback);
        let mut item = ProcessingItem::new(record, enable_rollback);
        item.batch_id = options.batch_id.clone();
        let id = item.id.clone();

        if let Some(batch_id) = &options.batch_id {
            self.batches
                .entry(batch_id.clone())
                .or_default()
                .pipeline_ids
                .push(id.clone());
        }

        let admitted = {
            let mut state = self.state.lock();
            if state.active.len() < self.config.max_concurrent_pipelines {
                item.transition(Stage::Queued);
                state.active.insert(id.clone(), item.clone());
                state.peak_active = state.peak_active.max(state.active.len());
                Some(item)
            } else {
                state.waiting.push_back(item.clone());
                let position = state.waiting.len();
                drop(state);
                debug!("Pipeline {} waiting at position {}", id, position);
                self.publish(&item, PipelineEventKind::Waiting { position });
                None
            }
        };

        if let Some(item) = admitted {
            self.spawn_pipeline(item);
        }
        id
    }

    /// Submit several records under one batch id.
    pub fn process_batch(
        self: &Arc<Self>,
        records: Vec<ContentRecord>,
        options: StartOptions,
    ) -> String {
        let batch_id = options
            .batch_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.batches.entry(batch_id.clone()).or_default().open = true;

        info!("Starting batch {} with {} items", batch_id, records.len());
        let options = options.with_batch(batch_id.clone());
        for record in records {
            self.start(record, options.clone());
        }

        let settled = self.batches.get_mut(&batch_id).is_some_and(|mut batch| {
            batch.open = false;
            batch.is_settled()
        });
        if settled {
            self.retire_batch(&batch_id);
        }
        batch_id
    }

    /// Aggregate the state of a batch.
    pub fn get_batch_status(&self, batch_id: &str) -> Option<BatchStatus> {
        let batch = self.batches.get(batch_id)?;
        let total = batch.pipeline_ids.len();
        let completed = batch.outcomes.values().filter(|ok| **ok).count();
        let failed = batch.outcomes.len() - completed;
        let processing = total - batch.outcomes.len();

        let status = if processing > 0 || batch.open {
            BatchState::Processing
        } else if failed == 0 {
            BatchState::Completed
        } else if completed == 0 {
            BatchState::Failed
        } else {
            BatchState::Partial
        };

        Some(BatchStatus {
            batch_id: batch_id.to_string(),
            total,
            completed,
            failed,
            processing,
            status,
        })
    }

    /// Snapshot of a pipeline from whichever collection holds it.
    pub fn get_status(&self, pipeline_id: &str) -> Option<ProcessingItem> {
        let state = self.state.lock();
        if let Some(item) = state.active.get(pipeline_id) {
            return Some(item.clone());
        }
        state
            .waiting
            .iter()
            .chain(state.finished.iter().rev())
            .find(|item| item.id == pipeline_id)
            .cloned()
    }

    /// Wait until the pipeline is terminal.
    ///
    /// A timeout only abandons the wait; the pipeline keeps running.
    pub async fn wait_for_completion(
        &self,
        pipeline_id: &str,
        timeout: Duration,
    ) -> Result<ProcessingItem> {
        let poll_interval = Duration::from_millis(self.config.wait_poll_interval_ms.max(1));

        let wait = async {
            loop {
                // Register before checking so a finalization in between is not missed.
                let notified = self.finalized.notified();

                match self.get_status(pipeline_id) {
                    None => return Err(Error::not_found("pipeline", pipeline_id)),
                    Some(item) if item.is_terminal() => return Ok(item),
                    Some(_) => {}
                }

                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("waiting for pipeline {}", pipeline_id),
                timeout.as_millis() as u64,
            )),
        }
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Highest number of simultaneously active pipelines observed.
    pub fn peak_active(&self) -> usize {
        self.state.lock().peak_active
    }

    /// Snapshots of finalized pipelines still held in history, oldest first.
    pub fn finished(&self) -> Vec<ProcessingItem> {
        self.state.lock().finished.iter().cloned().collect()
    }

    pub fn get_metrics(&self) -> PipelineMetrics {
        self.metrics.lock().clone()
    }

    pub fn get_bottlenecks(&self) -> Vec<Bottleneck> {
        self.metrics
            .lock()
            .bottlenecks(self.config.bottleneck_threshold_ms)
    }

    pub fn get_health(&self) -> HealthStatus {
        self.metrics.lock().health()
    }

    fn spawn_pipeline(self: &Arc<Self>, item: ProcessingItem) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_pipeline(item).await;
        });
    }

    async fn run_pipeline(self: Arc<Self>, mut item: ProcessingItem) {
        let clock = Instant::now();
        item.started_at = Some(Utc::now());
        self.metrics.lock().started += 1;
        let mut slot = PayloadSlot::new(item.payload.clone());

        info!("Pipeline {} started for content {}", item.id, item.content_id);
        self.publish(&item, PipelineEventKind::Started);

        let mut failure: Option<(Stage, Error)> = None;
        for stage in Stage::SEQUENCE {
            item.transition(stage);
            self.sync(&item);
            self.publish(&item, PipelineEventKind::StageStarted);

            let stage_clock = Instant::now();
            match self.run_stage_with_retry(&mut item, stage, &mut slot).await {
                Ok(action) => {
                    item.complete_stage(stage, action);
                    item.payload = slot.snapshot();
                    self.sync(&item);
                    self.publish(
                        &item,
                        PipelineEventKind::StageCompleted {
                            duration_ms: stage_clock.elapsed().as_millis() as u64,
                        },
                    );
                }
                Err(e) => {
                    failure = Some((stage, e));
                    break;
                }
            }
        }

        match failure {
            None => {
                item.transition(Stage::Complete);
                item.progress = 100;
            }
            Some((stage, err)) => {
                let message = err.to_string();
                warn!("Pipeline {} failed at {}: {}", item.id, stage, message);
                item.error = Some(PipelineFailure {
                    stage,
                    message,
                    timestamp: Utc::now(),
                });
                if item.enable_rollback {
                    self.rollback(&mut item, stage, &mut slot).await;
                }
                item.transition(Stage::Failed);
            }
        }

        item.payload = slot.into_inner();
        item.finished_at = Some(Utc::now());
        self.finalize(item, clock.elapsed());
    }

    /// Run one stage, retrying up to the configured attempt limit.
    async fn run_stage_with_retry(
        &self,
        item: &mut ProcessingItem,
        stage: Stage,
        slot: &mut PayloadSlot,
    ) -> Result<RollbackAction> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let clock = Instant::now();
            let outcome = match self.config.stage_timeout(stage) {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.runner.execute(stage, slot.get_mut()))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout(
                            format!("stage {}", stage),
                            limit.as_millis() as u64,
                        )),
                    }
                }
                None => self.runner.execute(stage, slot.get_mut()).await,
            };
            self.metrics.lock().record_stage(
                stage,
                clock.elapsed().as_millis() as u64,
                outcome.is_ok(),
            );

            match outcome {
                Ok(action) => {
                    debug!(
                        "Pipeline {} stage {} succeeded on attempt {}",
                        item.id, stage, attempt
                    );
                    return Ok(action);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.config.retry.delay_for_retry(attempt);
                    item.retry_attempts += 1;
                    if e.is_retryable() {
                        warn!(
                            "Pipeline {} stage {} attempt {}/{} failed: {} (retrying in {:?})",
                            item.id, stage, attempt, max_attempts, e, delay
                        );
                    } else {
                        // deterministic failures still use the stage retry budget
                        warn!(
                            "Pipeline {} stage {} attempt {}/{} rejected: {} (retrying in {:?})",
                            item.id, stage, attempt, max_attempts, e, delay
                        );
                    }
                    self.sync(item);
                    self.publish(
                        item,
                        PipelineEventKind::StageRetry {
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                            error: e.to_string(),
                        },
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn rollback(
        &self,
        item: &mut ProcessingItem,
        failed_stage: Stage,
        slot: &mut PayloadSlot,
    ) {
        let mut entries: Vec<(Stage, RollbackAction)> = item
            .completed_stages
            .iter()
            .copied()
            .zip(item.rollback_actions.iter().cloned())
            .collect();

        if self.config.recover_partial_writes
            && let Some(action) = StageRunner::partial_write_recovery(failed_stage, slot.get())
        {
            entries.push((failed_stage, action));
        }

        info!(
            "Rolling back pipeline {} ({} actions)",
            item.id,
            entries.len()
        );
        let log = run_rollback(&item.id, &entries, self.runner.services(), slot.get_mut()).await;
        let failures = log.iter().filter(|r| !r.succeeded).count();

        {
            let mut metrics = self.metrics.lock();
            metrics.rollbacks += 1;
            metrics.rollback_failures += failures as u64;
        }

        item.rollback_log = log;
        self.publish(
            item,
            PipelineEventKind::RolledBack {
                actions: entries.len(),
                failures,
            },
        );
    }

    /// Move a terminal pipeline to history and admit waiting work.
    fn finalize(self: &Arc<Self>, item: ProcessingItem, elapsed: Duration) {
        let success = item.stage == Stage::Complete;

        let admitted = {
            let mut state = self.state.lock();
            state.active.remove(&item.id);
            state.finished.push_back(item.clone());
            while state.finished.len() > self.config.max_history {
                state.finished.pop_front();
            }

            let mut admitted = Vec::new();
            while state.active.len() < self.config.max_concurrent_pipelines {
                let Some(mut next) = state.waiting.pop_front() else {
                    break;
                };
                next.transition(Stage::Queued);
                state.active.insert(next.id.clone(), next.clone());
                admitted.push(next);
            }
            state.peak_active = state.peak_active.max(state.active.len());
            admitted
        };

        if let Some(batch_id) = &item.batch_id {
            let settled = self.batches.get_mut(batch_id).is_some_and(|mut batch| {
                batch.outcomes.insert(item.id.clone(), success);
                batch.is_settled()
            });
            if settled {
                self.retire_batch(batch_id);
            }
        }

        let duration_ms = elapsed.as_millis() as u64;
        self.metrics.lock().record_finalized(success, duration_ms);

        if success {
            info!("Pipeline {} completed in {}ms", item.id, duration_ms);
            self.publish(&item, PipelineEventKind::Completed { duration_ms });
        } else {
            let message = item
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            self.publish(&item, PipelineEventKind::Failed { message });
        }

        self.finalized.notify_waiters();

        for next in admitted {
            debug!("Admitting waiting pipeline {}", next.id);
            self.spawn_pipeline(next);
        }
    }

    /// Keep a settled batch queryable until `max_history` newer batches settle.
    fn retire_batch(&self, batch_id: &str) {
        let evicted: Vec<String> = {
            let mut state = self.state.lock();
            if !state.settled_batches.iter().any(|id| id == batch_id) {
                state.settled_batches.push_back(batch_id.to_string());
            }
            let excess = state
                .settled_batches
                .len()
                .saturating_sub(self.config.max_history);
            state.settled_batches.drain(..excess).collect()
        };
        for id in evicted {
            debug!("Evicting settled batch {}", id);
            self.batches.remove(&id);
        }
    }

    /// Publish the running pipeline's state for status queries.
    fn sync(&self, item: &ProcessingItem) {
        let mut state = self.state.lock();
        if let Some(entry) = state.active.get_mut(&item.id) {
            *entry = item.clone();
        }
    }

    fn publish(&self, item: &ProcessingItem, kind: PipelineEventKind) {
        self.events.publish_pipeline(PipelineEvent {
            pipeline_id: item.id.clone(),
            content_id: item.content_id.clone(),
            kind,
            stage: item.stage,
            progress: item.progress,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EnrichmentResult;
    use crate::services::{ContentRepository, EnrichmentService, SearchIndexer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Services {
        enrich_calls: AtomicU32,
        fail_enrichment: bool,
        slow_ms: u64,
    }

    #[async_trait]
    impl ContentRepository for Services {
        async fn save(&self, _record: &ContentRecord) -> Result<()> {
            if self.slow_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.slow_ms)).await;
            }
            Ok(())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SearchIndexer for Services {
        async fn index(&self, _records: &[ContentRecord]) -> Result<()> {
            Ok(())
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl EnrichmentService for Services {
        async fn process(&self, _record: &ContentRecord) -> Result<EnrichmentResult> {
            self.enrich_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_enrichment {
                return Err(Error::collaborator("enrichment", "unavailable"));
            }
            Ok(EnrichmentResult {
                summary: "summary".into(),
                tags: vec!["t".into()],
                categories: vec![],
            })
        }
    }

    fn config(max: usize) -> OrchestratorConfig {
        let mut config = OrchestratorConfig {
            max_concurrent_pipelines: max,
            wait_poll_interval_ms: 5,
            ..Default::default()
        };
        config.retry.base_delay_ms = 1;
        config
    }

    fn orchestrator(max: usize, services: Services) -> Arc<Orchestrator> {
        let services = Arc::new(services);
        Arc::new(Orchestrator::new(
            config(max),
            Collaborators::new(services.clone(), services.clone(), services),
            EventBus::new(),
        ))
    }

    #[tokio::test]
    async fn test_pipeline_completes() {
        let orch = orchestrator(2, Services::default());
        let id = orch.start(ContentRecord::new("c1", "t", "body"), StartOptions::default());

        let item = orch
            .wait_for_completion(&id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(item.stage, Stage::Complete);
        assert_eq!(item.progress, 100);
        assert_eq!(item.completed_stages, Stage::SEQUENCE.to_vec());
        assert!(item.payload.flags.processed);
        assert!(item.payload.flags.indexed);
        assert_eq!(orch.active_count(), 0);
        assert_eq!(orch.get_health(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_enrichment_failure_exhausts_retries() {
        let orch = orchestrator(
            1,
            Services {
                fail_enrichment: true,
                ..Default::default()
            },
        );
        let id = orch.start(ContentRecord::new("c1", "t", "body"), StartOptions::default());
        let item = orch
            .wait_for_completion(&id, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(item.stage, Stage::Failed);
        assert_eq!(item.error.as_ref().unwrap().stage, Stage::Enrichment);
        assert_eq!(item.retry_attempts, 2);
        assert_eq!(item.completed_stages, vec![Stage::Validation]);
        assert_eq!(item.rollback_log.len(), 1);
        assert_eq!(item.rollback_log[0].stage, Stage::Validation);
        assert_eq!(item.rollback_log[0].action, "noop");
    }

    #[tokio::test]
    async fn test_rollback_can_be_disabled_per_pipeline() {
        let orch = orchestrator(
            1,
            Services {
                fail_enrichment: true,
                ..Default::default()
            },
        );
        let id = orch.start(
            ContentRecord::new("c1", "t", "body"),
            StartOptions::default().with_rollback(false),
        );
        let item = orch
            .wait_for_completion(&id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(item.stage, Stage::Failed);
        assert!(item.rollback_log.is_empty());
    }

    #[tokio::test]
    async fn test_wait_timeout_does_not_alter_pipeline() {
        let orch = orchestrator(
            1,
            Services {
                slow_ms: 200,
                ..Default::default()
            },
        );
        let id = orch.start(ContentRecord::new("c1", "t", "body"), StartOptions::default());

        let err = orch
            .wait_for_completion(&id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        let item = orch
            .wait_for_completion(&id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(item.stage, Stage::Complete);
    }

    #[tokio::test]
    async fn test_unknown_pipeline() {
        let orch = orchestrator(1, Services::default());
        assert!(orch.get_status("missing").is_none());
        let err = orch
            .wait_for_completion("missing", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_batch_status() {
        let orch = orchestrator(2, Services::default());
        let batch_id = orch.process_batch(
            vec![
                ContentRecord::new("c1", "t", "body"),
                ContentRecord::new("c2", "t", ""),
                ContentRecord::new("c3", "t", "body"),
            ],
            StartOptions::default(),
        );

        let status = orch.get_batch_status(&batch_id).unwrap();
        assert_eq!(status.total, 3);

        for _ in 0..200 {
            if orch.get_batch_status(&batch_id).unwrap().processing == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = orch.get_batch_status(&batch_id).unwrap();
        assert_eq!(status.completed, 2);
        assert_eq!(status.failed, 1);
        assert_eq!(status.status, BatchState::Partial);
        assert!(orch.get_batch_status("nope").is_none());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let services = Arc::new(Services::default());
        let mut cfg = config(4);
        cfg.max_history = 2;
        let orch = Arc::new(Orchestrator::new(
            cfg,
            Collaborators::new(services.clone(), services.clone(), services),
            EventBus::new(),
        ));

        let ids: Vec<String> = (0..4)
            .map(|i| {
                orch.start(
                    ContentRecord::new(format!("c{}", i), "t", "b"),
                    StartOptions::default(),
                )
            })
            .collect();
        for _ in 0..200 {
            if orch.active_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(orch.finished().len(), 2);
        let known = ids.iter().filter(|id| orch.get_status(id).is_some()).count();
        assert_eq!(known, 2);
    }

    #[tokio::test]
    async fn test_settled_batches_are_bounded() {
        let services = Arc::new(Services::default());
        let mut cfg = config(4);
        cfg.max_history = 2;
        let orch = Arc::new(Orchestrator::new(
            cfg,
            Collaborators::new(services.clone(), services.clone(), services),
            EventBus::new(),
        ));

        let mut batch_ids = Vec::new();
        for i in 0..4 {
            let batch_id = orch.process_batch(
                vec![
                    ContentRecord::new(format!("a{}", i), "t", "b"),
                    ContentRecord::new(format!("b{}", i), "t", "b"),
                ],
                StartOptions::default(),
            );
            for _ in 0..200 {
                if orch
                    .get_batch_status(&batch_id)
                    .is_some_and(|s| s.status == BatchState::Completed)
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            batch_ids.push(batch_id);
        }

        assert!(orch.get_batch_status(&batch_ids[0]).is_none());
        assert!(orch.get_batch_status(&batch_ids[1]).is_none());
        assert_eq!(orch.get_batch_status(&batch_ids[2]).unwrap().completed, 2);
        assert_eq!(orch.get_batch_status(&batch_ids[3]).unwrap().completed, 2);
        assert!(orch.batches.len() <= 2);
    }

    #[tokio::test]
    async fn test_empty_batch_settles_immediately() {
        let orch = orchestrator(1, Services::default());
        let batch_id = orch.process_batch(Vec::new(), StartOptions::default());
        let status = orch.get_batch_status(&batch_id).unwrap();
        assert_eq!(status.total, 0);
        assert_eq!(status.status, BatchState::Completed);
    }
}
