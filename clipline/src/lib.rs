//! clipline: asynchronous content-processing engine.
//!
//! A [`pipeline::Orchestrator`] drives content records through a fixed stage
//! sequence with retry and compensating rollback. A durable
//! [`queue::ProcessingQueue`] sits in front of it, adding priority admission,
//! rate limiting, backoff and a dead-letter store. [`engine::ContentEngine`]
//! wires the two together.

pub mod config;
pub mod content;
pub mod database;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod services;

pub use config::EngineConfig;
pub use content::{ContentRecord, EnrichmentResult};
pub use engine::ContentEngine;
pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent, PipelineEventKind, QueueEvent, QueueEventKind};
pub use pipeline::{Orchestrator, ProcessingItem, Stage, StartOptions};
pub use queue::{Priority, ProcessingQueue, QueueEntry};
pub use services::{
    Collaborators, ContentRepository, EnrichmentService, MemoryStateStore, SearchIndexer,
    StateStore,
};
