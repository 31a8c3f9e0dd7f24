#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use clipline::config::{EngineConfig, OrchestratorConfig, QueueConfig};
use clipline::{
    Collaborators, ContentRecord, ContentRepository, EnrichmentResult, EnrichmentService, Error,
    Result, SearchIndexer,
};

/// In-memory repository, indexer and enrichment service with failure switches.
#[derive(Default)]
pub struct InMemoryServices {
    pub saved: Mutex<HashMap<String, ContentRecord>>,
    pub indexed: Mutex<HashSet<String>>,
    /// Collaborator calls in order, e.g. `save:c1`, `unindex:c1`.
    pub calls: Mutex<Vec<String>>,
    pub fail_enrichment: AtomicBool,
    pub fail_indexing: AtomicBool,
    pub enrichment_calls: AtomicU32,
    /// Delay applied inside `save`.
    pub save_delay_ms: u64,
    in_save: AtomicUsize,
    pub peak_in_save: AtomicUsize,
}

impl InMemoryServices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_save_delay(ms: u64) -> Arc<Self> {
        Arc::new(Self {
            save_delay_ms: ms,
            ..Default::default()
        })
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators::new(self.clone(), self.clone(), self.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl ContentRepository for InMemoryServices {
    async fn save(&self, record: &ContentRecord) -> Result<()> {
        let now = self.in_save.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_save.fetch_max(now, Ordering::SeqCst);
        if self.save_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.save_delay_ms)).await;
        }
        self.in_save.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().push(format!("save:{}", record.id));
        self.saved.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.calls.lock().push(format!("delete:{}", id));
        self.saved.lock().remove(id);
        Ok(())
    }
}

#[async_trait]
impl SearchIndexer for InMemoryServices {
    async fn index(&self, records: &[ContentRecord]) -> Result<()> {
        if self.fail_indexing.load(Ordering::SeqCst) {
            return Err(Error::collaborator("indexer", "index unavailable"));
        }
        let mut indexed = self.indexed.lock();
        for record in records {
            self.calls.lock().push(format!("index:{}", record.id));
            indexed.insert(record.id.clone());
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.calls.lock().push(format!("unindex:{}", id));
        self.indexed.lock().remove(id);
        Ok(())
    }
}

#[async_trait]
impl EnrichmentService for InMemoryServices {
    async fn process(&self, record: &ContentRecord) -> Result<EnrichmentResult> {
        self.enrichment_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enrichment.load(Ordering::SeqCst) {
            return Err(Error::collaborator("enrichment", "model unavailable"));
        }
        Ok(EnrichmentResult {
            summary: format!("Summary of {}", record.title),
            tags: vec!["news".into(), "News".into(), "rust".into()],
            categories: vec!["tech".into()],
        })
    }
}

/// Orchestrator settings with millisecond-scale delays.
pub fn fast_orchestrator(max_concurrent: usize) -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        max_concurrent_pipelines: max_concurrent,
        wait_poll_interval_ms: 5,
        ..Default::default()
    };
    config.retry.base_delay_ms = 5;
    config
}

/// Queue settings with millisecond-scale backoff.
pub fn fast_queue(max_concurrent: usize) -> QueueConfig {
    let mut config = QueueConfig {
        max_concurrent_jobs: max_concurrent,
        ..Default::default()
    };
    config.backoff.base_delay_ms = 5;
    config.backoff.jitter_ratio = 0.2;
    config
}

pub fn fast_engine() -> EngineConfig {
    EngineConfig {
        orchestrator: fast_orchestrator(2),
        queue: fast_queue(2),
    }
}

pub fn record(id: &str) -> ContentRecord {
    ContentRecord::new(id, format!("Title {}", id), format!("Body of {}", id))
}

/// Poll `check` every 10ms for up to `timeout`.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
