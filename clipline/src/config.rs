//! Engine configuration.
//!
//! Every field has a default, so partial JSON documents are accepted.
//! `CLIPLINE_*` environment variables override file values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::pipeline::Stage;
use crate::{Error, Result};

/// Retry policy for pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per stage, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.exponential_base.powi(retry.saturating_sub(1) as i32);
        Duration::from_millis((self.base_delay_ms as f64 * factor) as u64)
    }
}

fn default_stage_timeouts() -> BTreeMap<Stage, u64> {
    BTreeMap::from([
        (Stage::Validation, 5_000),
        (Stage::Enrichment, 30_000),
        (Stage::Persistence, 10_000),
        (Stage::Indexing, 10_000),
        (Stage::PostProcessing, 5_000),
    ])
}

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_pipelines: usize,
    /// Per-stage attempt budget in milliseconds.
    pub stage_timeouts_ms: BTreeMap<Stage, u64>,
    pub retry: RetryPolicy,
    pub enable_rollback: bool,
    /// Also compensate the stage that failed when it writes externally
    /// (persistence, indexing), in case the failed write partially landed.
    pub recover_partial_writes: bool,
    /// Finalized pipelines kept for status queries.
    pub max_history: usize,
    pub bottleneck_threshold_ms: u64,
    pub wait_poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pipelines: 3,
            stage_timeouts_ms: default_stage_timeouts(),
            retry: RetryPolicy::default(),
            enable_rollback: true,
            recover_partial_writes: false,
            max_history: 100,
            bottleneck_threshold_ms: 1000,
            wait_poll_interval_ms: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Timeout for one attempt of `stage`, if configured.
    pub fn stage_timeout(&self, stage: Stage) -> Option<Duration> {
        self.stage_timeouts_ms
            .get(&stage)
            .copied()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Sliding-window rate limiting applied at queue admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub burst_limit: u32,
    pub burst_window_ms: u64,
    /// Delay before admission is retried after a denial.
    pub retry_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: 60,
            burst_limit: 10,
            burst_window_ms: 1000,
            retry_delay_ms: 1000,
        }
    }
}

/// Dead-letter policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Processing attempts before an entry is dead-lettered.
    pub max_retry_attempts: u32,
    /// Days dead-lettered entries are retained; 0 keeps them forever.
    pub retention_days: u32,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retention_days: 7,
        }
    }
}

/// Backoff between queue-level attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub exponential_base: f64,
    pub max_delay_ms: u64,
    /// Up to this fraction of the delay is added as random jitter.
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            exponential_base: 2.0,
            max_delay_ms: 60_000,
            jitter_ratio: 0.25,
        }
    }
}

impl BackoffConfig {
    /// Delay after failed attempt number `attempt` (1-based), jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64
            * self
                .exponential_base
                .powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter = capped * self.jitter_ratio * rand::random::<f64>();
        Duration::from_millis((capped + jitter) as u64)
    }
}

/// Configuration for the processing queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent_jobs: usize,
    pub max_queue_size: usize,
    pub rate_limit: RateLimitConfig,
    pub dead_letter: DeadLetterConfig,
    pub backoff: BackoffConfig,
    /// Completed entries kept in memory.
    pub completed_history: usize,
    /// Completed entries written to the durable store.
    pub persisted_completed: usize,
    /// Budget for a single processing attempt.
    pub job_timeout_ms: Option<u64>,
    /// Key of the serialized queue state in the durable store.
    pub state_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_queue_size: 1000,
            rate_limit: RateLimitConfig::default(),
            dead_letter: DeadLetterConfig::default(),
            backoff: BackoffConfig::default(),
            completed_history: 100,
            persisted_completed: 50,
            job_timeout_ms: None,
            state_key: "processing_queue_state".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub orchestrator: OrchestratorConfig,
    pub queue: QueueConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file, apply environment overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CLIPLINE_*` overrides from the process environment (and `.env`).
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        dotenvy::dotenv().ok();
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLIPLINE_MAX_CONCURRENT_PIPELINES") {
            self.orchestrator.max_concurrent_pipelines =
                parse_var("CLIPLINE_MAX_CONCURRENT_PIPELINES", &v)?;
        }
        if let Some(v) = lookup("CLIPLINE_ENABLE_ROLLBACK") {
            self.orchestrator.enable_rollback = parse_var("CLIPLINE_ENABLE_ROLLBACK", &v)?;
        }
        if let Some(v) = lookup("CLIPLINE_STAGE_MAX_ATTEMPTS") {
            self.orchestrator.retry.max_attempts = parse_var("CLIPLINE_STAGE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("CLIPLINE_MAX_CONCURRENT_JOBS") {
            self.queue.max_concurrent_jobs = parse_var("CLIPLINE_MAX_CONCURRENT_JOBS", &v)?;
        }
        if let Some(v) = lookup("CLIPLINE_MAX_QUEUE_SIZE") {
            self.queue.max_queue_size = parse_var("CLIPLINE_MAX_QUEUE_SIZE", &v)?;
        }
        if let Some(v) = lookup("CLIPLINE_RATE_LIMIT_ENABLED") {
            self.queue.rate_limit.enabled = parse_var("CLIPLINE_RATE_LIMIT_ENABLED", &v)?;
        }
        if let Some(v) = lookup("CLIPLINE_QUEUE_STATE_KEY") {
            self.queue.state_key = v;
        }
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let o = &self.orchestrator;
        let q = &self.queue;

        if o.max_concurrent_pipelines < 1 {
            return Err(Error::config("max_concurrent_pipelines must be at least 1"));
        }
        if o.retry.max_attempts < 1 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if o.retry.exponential_base < 1.0 {
            return Err(Error::config("retry.exponential_base must be >= 1.0"));
        }
        if q.max_concurrent_jobs < 1 {
            return Err(Error::config("max_concurrent_jobs must be at least 1"));
        }
        if q.max_queue_size < 1 {
            return Err(Error::config("max_queue_size must be at least 1"));
        }
        if q.dead_letter.max_retry_attempts < 1 {
            return Err(Error::config(
                "dead_letter.max_retry_attempts must be at least 1",
            ));
        }
        if q.backoff.exponential_base < 1.0 {
            return Err(Error::config("backoff.exponential_base must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&q.backoff.jitter_ratio) {
            return Err(Error::config("backoff.jitter_ratio must be within [0, 1]"));
        }
        if q.rate_limit.enabled
            && (q.rate_limit.burst_limit == 0 || q.rate_limit.requests_per_minute == 0)
        {
            return Err(Error::config(
                "rate_limit.burst_limit and requests_per_minute must be positive when enabled",
            ));
        }
        if q.state_key.trim().is_empty() {
            return Err(Error::config("state_key must not be empty"));
        }
        debug!("Engine configuration validated");
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {}: {:?}", key, value)))
}
