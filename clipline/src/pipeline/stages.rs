//! Stage implementations.

use chrono::Utc;
use tracing::debug;

use super::rollback::RollbackAction;
use super::stage::Stage;
use crate::content::ContentRecord;
use crate::services::Collaborators;
use crate::{Error, Result};

/// Runs individual stages against the injected collaborators.
#[derive(Clone)]
pub struct StageRunner {
    services: Collaborators,
}

impl StageRunner {
    pub fn new(services: Collaborators) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Collaborators {
        &self.services
    }

    /// Execute one attempt of `stage`.
    ///
    /// On success returns the compensation the stage registers. A failed
    /// attempt leaves `record` unchanged.
    pub async fn execute(
        &self,
        stage: Stage,
        record: &mut ContentRecord,
    ) -> Result<RollbackAction> {
        match stage {
            Stage::Validation => {
                record.validate()?;
                Ok(RollbackAction::Noop)
            }
            Stage::Enrichment => {
                let previous = record.derived_fields();
                let result = self.services.enrichment.process(record).await?;
                result.validate()?;
                debug!(
                    "Enriched {} with {} tags, {} categories",
                    record.id,
                    result.tags.len(),
                    result.categories.len()
                );
                record.apply_enrichment(result);
                Ok(RollbackAction::RestoreDerived { previous })
            }
            Stage::Persistence => {
                self.services.repository.save(record).await?;
                Ok(RollbackAction::DeleteRecord {
                    content_id: record.id.clone(),
                })
            }
            Stage::Indexing => {
                self.services
                    .indexer
                    .index(std::slice::from_ref(record))
                    .await?;
                record.flags.indexed = true;
                Ok(RollbackAction::RemoveFromIndex {
                    content_id: record.id.clone(),
                })
            }
            Stage::PostProcessing => {
                record.flags.processed = true;
                record.processed_at = Some(Utc::now());
                Ok(RollbackAction::Noop)
            }
            other => Err(Error::Other(format!("stage {} is not executable", other))),
        }
    }

    /// Compensation for a stage whose external write may have partially
    /// landed before it reported failure.
    pub fn partial_write_recovery(stage: Stage, record: &ContentRecord) -> Option<RollbackAction> {
        match stage {
            Stage::Persistence => Some(RollbackAction::DeleteRecord {
                content_id: record.id.clone(),
            }),
            Stage::Indexing => Some(RollbackAction::RemoveFromIndex {
                content_id: record.id.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EnrichmentResult;
    use crate::services::{ContentRepository, EnrichmentService, SearchIndexer};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Fixed {
        malformed: bool,
    }

    #[async_trait]
    impl ContentRepository for Fixed {
        async fn save(&self, _record: &ContentRecord) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SearchIndexer for Fixed {
        async fn index(&self, _records: &[ContentRecord]) -> Result<()> {
            Ok(())
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl EnrichmentService for Fixed {
        async fn process(&self, _record: &ContentRecord) -> Result<EnrichmentResult> {
            if self.malformed {
                return Ok(EnrichmentResult::default());
            }
            Ok(EnrichmentResult {
                summary: "A summary".into(),
                tags: vec!["news".into()],
                categories: vec!["world".into()],
            })
        }
    }

    fn runner(malformed: bool) -> StageRunner {
        let svc = Arc::new(Fixed { malformed });
        StageRunner::new(Collaborators::new(svc.clone(), svc.clone(), svc))
    }

    #[tokio::test]
    async fn test_enrichment_registers_snapshot() {
        let runner = runner(false);
        let mut record = ContentRecord::new("c1", "t", "body");
        let action = runner.execute(Stage::Enrichment, &mut record).await.unwrap();

        assert_eq!(record.summary.as_deref(), Some("A summary"));
        match action {
            RollbackAction::RestoreDerived { previous } => assert!(previous.summary.is_none()),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_enrichment_leaves_record_untouched() {
        let runner = runner(true);
        let mut record = ContentRecord::new("c1", "t", "body");
        let err = runner
            .execute(Stage::Enrichment, &mut record)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Collaborator { .. }));
        assert!(record.summary.is_none());
        assert!(!record.flags.enriched);
    }

    #[tokio::test]
    async fn test_non_executable_stage() {
        let runner = runner(false);
        let mut record = ContentRecord::new("c1", "t", "body");
        assert!(runner.execute(Stage::Complete, &mut record).await.is_err());
    }

    #[test]
    fn test_partial_write_recovery() {
        let record = ContentRecord::new("c1", "t", "body");
        assert!(StageRunner::partial_write_recovery(Stage::Persistence, &record).is_some());
        assert!(StageRunner::partial_write_recovery(Stage::Indexing, &record).is_some());
        assert!(StageRunner::partial_write_recovery(Stage::Enrichment, &record).is_none());
    }
}
