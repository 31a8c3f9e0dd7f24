//! Pipeline Orchestrator: the per-item stage machine, retry, rollback and
//! admission under a global concurrency cap.

pub mod item;
pub mod metrics;
pub mod orchestrator;
pub mod rollback;
pub mod stage;
pub mod stages;

pub use item::{PayloadSlot, PipelineFailure, ProcessingItem, StageTransition, StartOptions};
pub use metrics::{Bottleneck, BottleneckReason, HealthStatus, PipelineMetrics, StageStats};
pub use orchestrator::{BatchState, BatchStatus, Orchestrator};
pub use rollback::{RollbackAction, RollbackRecord, run_rollback};
pub use stage::Stage;
pub use stages::StageRunner;
