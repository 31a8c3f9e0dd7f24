//! Processing Queue: priority admission, rate limiting, retry with backoff,
//! dead-letter isolation and durable state.

pub mod entry;
pub mod processing_queue;
pub mod rate_limit;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use entry::{AttemptRecord, Priority, QueueEntry};
pub use processing_queue::{ProcessingQueue, QueueProcessor, QueueStatus};
pub use rate_limit::RateLimiter;
pub use state::QueueState;
pub use stats::{CompletionEstimate, QueueStatistics, StatisticsReport};
