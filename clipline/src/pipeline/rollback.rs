//! Compensating actions for completed stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::stage::Stage;
use crate::Result;
use crate::content::{ContentRecord, DerivedFields};
use crate::services::Collaborators;

/// Compensation registered by a stage once it succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackAction {
    Noop,
    /// Put back the derived fields captured before enrichment ran.
    RestoreDerived { previous: DerivedFields },
    DeleteRecord { content_id: String },
    RemoveFromIndex { content_id: String },
}

impl RollbackAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::RestoreDerived { .. } => "restore_derived",
            Self::DeleteRecord { .. } => "delete_record",
            Self::RemoveFromIndex { .. } => "remove_from_index",
        }
    }

    /// Run the compensation.
    pub async fn execute(
        &self,
        services: &Collaborators,
        payload: &mut ContentRecord,
    ) -> Result<()> {
        match self {
            Self::Noop => Ok(()),
            Self::RestoreDerived { previous } => {
                payload.restore_derived(previous.clone());
                Ok(())
            }
            Self::DeleteRecord { content_id } => services.repository.delete(content_id).await,
            Self::RemoveFromIndex { content_id } => services.indexer.remove(content_id).await,
        }
    }
}

/// Outcome of one executed compensation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub stage: Stage,
    pub action: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Execute compensations last-completed-first.
///
/// `entries` pairs each completed stage with the action it registered, in
/// completion order. Failures are recorded and do not stop the remaining
/// actions.
pub async fn run_rollback(
    pipeline_id: &str,
    entries: &[(Stage, RollbackAction)],
    services: &Collaborators,
    payload: &mut ContentRecord,
) -> Vec<RollbackRecord> {
    let mut log = Vec::with_capacity(entries.len());

    for (stage, action) in entries.iter().rev() {
        let outcome = action.execute(services, payload).await;
        let record = match outcome {
            Ok(()) => {
                debug!(
                    "Pipeline {} rolled back {} ({})",
                    pipeline_id,
                    stage,
                    action.name()
                );
                RollbackRecord {
                    stage: *stage,
                    action: action.name().to_string(),
                    succeeded: true,
                    error: None,
                    at: Utc::now(),
                }
            }
            Err(e) => {
                warn!(
                    "Pipeline {} rollback of {} ({}) failed: {}",
                    pipeline_id,
                    stage,
                    action.name(),
                    e
                );
                RollbackRecord {
                    stage: *stage,
                    action: action.name().to_string(),
                    succeeded: false,
                    error: Some(e.to_string()),
                    at: Utc::now(),
                }
            }
        };
        log.push(record);
    }

    log
}
