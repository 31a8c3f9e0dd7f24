//! Collaborator interfaces consumed by the engine.
//!
//! The engine never creates stand-ins for these; every implementation is
//! injected through [`Collaborators`] or the queue constructor.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::Result;
use crate::content::{ContentRecord, EnrichmentResult};

/// Content repository (save/delete by id).
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn save(&self, record: &ContentRecord) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Search indexer (add/remove documents).
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, records: &[ContentRecord]) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
}

/// Black-box enrichment capability.
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    async fn process(&self, record: &ContentRecord) -> Result<EnrichmentResult>;
}

/// Durable key-value store for opaque state blobs.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, blob: &str) -> Result<()>;
}

/// The collaborators a pipeline stage machine needs.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn ContentRepository>,
    pub indexer: Arc<dyn SearchIndexer>,
    pub enrichment: Arc<dyn EnrichmentService>,
}

impl Collaborators {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        indexer: Arc<dyn SearchIndexer>,
        enrichment: Arc<dyn EnrichmentService>,
    ) -> Self {
        Self {
            repository,
            indexer,
            enrichment,
        }
    }
}

/// In-process [`StateStore`].
///
/// Survives queue instances within one process; used for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, blob: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }
}
