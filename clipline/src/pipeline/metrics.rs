//! Stage timing counters, bottleneck detection and health.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stage::Stage;

/// Cumulative counters for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub total_time_ms: u64,
    pub successes: u64,
    pub failures: u64,
}

impl StageStats {
    pub fn executions(&self) -> u64 {
        self.successes + self.failures
    }

    /// Mean attempt duration in milliseconds.
    pub fn average_ms(&self) -> Option<f64> {
        let n = self.executions();
        (n > 0).then(|| self.total_time_ms as f64 / n as f64)
    }
}

/// Overall health derived from the pipeline failure ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// A stage flagged as slow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub stage: Stage,
    pub average_ms: f64,
    pub reason: BottleneckReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckReason {
    /// Average exceeded the absolute threshold.
    AboveThreshold,
    /// Average exceeded twice the cross-stage average.
    AbovePeers,
}

/// Orchestrator-wide counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub stages: BTreeMap<Stage, StageStats>,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
    pub rollbacks: u64,
    pub rollback_failures: u64,
}

impl PipelineMetrics {
    pub fn record_stage(&mut self, stage: Stage, elapsed_ms: u64, success: bool) {
        let stats = self.stages.entry(stage).or_default();
        stats.total_time_ms = stats.total_time_ms.saturating_add(elapsed_ms);
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
    }

    pub fn record_finalized(&mut self, success: bool, duration_ms: u64) {
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
    }

    pub fn finalized(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn average_duration_ms(&self) -> Option<f64> {
        let n = self.finalized();
        (n > 0).then(|| self.total_duration_ms as f64 / n as f64)
    }

    /// Failed share of finalized pipelines.
    pub fn failure_ratio(&self) -> f64 {
        match self.finalized() {
            0 => 0.0,
            n => self.failed as f64 / n as f64,
        }
    }

    pub fn health(&self) -> HealthStatus {
        let ratio = self.failure_ratio();
        if ratio > 0.5 {
            HealthStatus::Unhealthy
        } else if ratio > 0.2 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Stages whose average exceeds `threshold_ms` or twice the mean of all
    /// stage averages.
    pub fn bottlenecks(&self, threshold_ms: u64) -> Vec<Bottleneck> {
        let averages: Vec<(Stage, f64)> = self
            .stages
            .iter()
            .filter_map(|(stage, stats)| stats.average_ms().map(|avg| (*stage, avg)))
            .collect();
        if averages.is_empty() {
            return Vec::new();
        }

        let overall = averages.iter().map(|(_, avg)| avg).sum::<f64>() / averages.len() as f64;

        averages
            .into_iter()
            .filter_map(|(stage, average_ms)| {
                let reason = if average_ms > threshold_ms as f64 {
                    BottleneckReason::AboveThreshold
                } else if average_ms > overall * 2.0 {
                    BottleneckReason::AbovePeers
                } else {
                    return None;
                };
                Some(Bottleneck {
                    stage,
                    average_ms,
                    reason,
                })
            })
            .collect()
    }
}
