//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Fan-out of lifecycle operations across many stations."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use rsl_inventory::{StationFilter, StationRecord};
use rsl_logging::{log_system_event, station_warn, LogContext, SystemEventOutcome};
use serde::Serialize;
use tracing::info;

use crate::confirm::{Confirmer, StaticConfirmer, PURGE_CONFIRMATION_WORD};
use crate::error::{ErrorKind, LifecycleError, Result};
use crate::orchestrator::LifecycleOrchestrator;
use crate::report::{BackupMode, TeardownOptions};

/// Operation applied to every selected station.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BulkOperation {
    Update,
    Backup { mode: BackupMode },
    Status,
    Remove { purge_data: bool },
}

impl BulkOperation {
    pub fn name(&self) -> &'static str {
        match self {
            BulkOperation::Update => "update",
            BulkOperation::Backup { .. } => "backup",
            BulkOperation::Status => "status",
            BulkOperation::Remove { purge_data: true } => "purge",
            BulkOperation::Remove { purge_data: false } => "remove",
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, BulkOperation::Remove { .. })
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result for one station, always attributed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationOutcome {
    pub id: u32,
    pub hostname: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub message: String,
}

/// Aggregate over one bulk pass. `outcomes` is in store order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub operation: String,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<StationOutcome>,
}

impl BulkReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failed_ids(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded)
            .map(|outcome| outcome.id)
            .collect()
    }

    fn from_outcomes(operation: &str, outcomes: Vec<StationOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|outcome| outcome.succeeded).count();
        Self {
            operation: operation.to_owned(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }
}

/// Apply `op` to each record with at most `concurrency` in flight.
///
/// One failure never stops the pass, and outcomes come back in input order
/// whatever order the work finishes in.
pub async fn run_each<F, Fut>(
    records: Vec<StationRecord>,
    concurrency: usize,
    op: F,
) -> Vec<StationOutcome>
where
    F: Fn(StationRecord) -> Fut,
    Fut: Future<Output = (StationRecord, Result<String>)>,
{
    stream::iter(records.into_iter().map(op))
        .buffered(concurrency.max(1))
        .map(|(record, result)| match result {
            Ok(message) => StationOutcome {
                id: record.id,
                hostname: record.hostname,
                succeeded: true,
                error_kind: None,
                message,
            },
            Err(err) => StationOutcome {
                id: record.id,
                hostname: record.hostname,
                succeeded: false,
                error_kind: Some(err.kind()),
                message: err.to_string(),
            },
        })
        .collect()
        .await
}

#[derive(Debug, Clone)]
pub struct BulkExecutor {
    orchestrator: LifecycleOrchestrator,
    concurrency: usize,
}

impl BulkExecutor {
    pub fn new(orchestrator: LifecycleOrchestrator, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    /// Concurrency taken from `bulk.concurrency` in the orchestrator's config.
    pub fn from_config(orchestrator: LifecycleOrchestrator) -> Self {
        let concurrency = orchestrator.config().bulk.concurrency;
        Self::new(orchestrator, concurrency)
    }

    pub async fn run(
        &self,
        filter: StationFilter,
        operation: BulkOperation,
        confirmer: &dyn Confirmer,
    ) -> Result<BulkReport> {
        let targets = self.orchestrator.list(filter)?;
        if operation.is_destructive() && !targets.is_empty() {
            let hostnames: Vec<&str> = targets.iter().map(|record| record.hostname.as_str()).collect();
            let volumes = match operation {
                BulkOperation::Remove { purge_data: true } => " and destroy their volumes",
                _ => "",
            };
            let prompt = format!(
                "This will remove {} station(s){volumes}: {}. Type {PURGE_CONFIRMATION_WORD} to continue",
                targets.len(),
                hostnames.join(", ")
            );
            let confirmed = confirmer
                .confirm_phrase(&prompt, PURGE_CONFIRMATION_WORD)
                .map_err(|err| LifecycleError::external("confirm", err))?;
            if !confirmed {
                return Err(LifecycleError::ConfirmationDeclined);
            }
        }

        info!(
            operation = operation.name(),
            stations = targets.len(),
            concurrency = self.concurrency,
            "bulk operation starting"
        );
        let outcomes = run_each(targets, self.concurrency, |record| async move {
            let result = self.apply(&record, operation).await;
            (record, result)
        })
        .await;

        let report = BulkReport::from_outcomes(operation.name(), outcomes);
        for outcome in &report.outcomes {
            if let Some(metrics) = self.orchestrator.metrics() {
                metrics.record_bulk_outcome(operation.name(), outcome.succeeded);
            }
            if !outcome.succeeded {
                station_warn!(
                    context = LogContext::new()
                        .with_station(outcome.id)
                        .with_operation(operation.name()),
                    "{} failed: {}",
                    outcome.hostname,
                    outcome.message
                );
            }
        }
        let summary = format!(
            "{} succeeded, {} failed of {}",
            report.succeeded,
            report.failed,
            report.total()
        );
        let outcome = if report.is_success() {
            SystemEventOutcome::Success
        } else {
            SystemEventOutcome::Degraded
        };
        log_system_event(
            Some(&LogContext::new().with_operation(operation.name())),
            "bulk.completed",
            &summary,
            outcome,
        );
        Ok(report)
    }

    async fn apply(&self, record: &StationRecord, operation: BulkOperation) -> Result<String> {
        match operation {
            BulkOperation::Update => {
                self.orchestrator.update(record.id).await?;
                Ok("updated".to_owned())
            }
            BulkOperation::Backup { mode } => {
                let report = self.orchestrator.backup(record.id, mode).await?;
                if report.is_complete() {
                    Ok(format!("{mode} backup completed"))
                } else {
                    Err(LifecycleError::ExternalTool {
                        stage: "backup".to_owned(),
                        message: report.failure_summary(),
                    })
                }
            }
            BulkOperation::Status => {
                let status = self.orchestrator.status(record.id).await?;
                Ok(format!("{} ({})", status.current, status.health))
            }
            BulkOperation::Remove { purge_data } => {
                // The phrase confirmation above covers every station.
                let options = TeardownOptions {
                    purge_data,
                    force: true,
                };
                let report = self
                    .orchestrator
                    .teardown(record.id, options, &StaticConfirmer(true))
                    .await?;
                Ok(format!("{} removed", report.hostname))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rsl_common::Platform;
    use std::time::Duration;

    fn record(id: u32) -> StationRecord {
        StationRecord::new(
            id,
            Platform::Azuracast,
            &format!("s{id}"),
            format!("10.0.0.{}", id - 100),
            "",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn failures_are_isolated_and_attributed() {
        let records: Vec<StationRecord> = (100..110).map(record).collect();
        let outcomes = run_each(records, 1, |record| async move {
            let result = if record.id % 3 == 0 {
                Err(LifecycleError::validation("boom"))
            } else {
                Ok("ok".to_owned())
            };
            (record, result)
        })
        .await;
        let report = BulkReport::from_outcomes("update", outcomes);
        assert_eq!(report.total(), 10);
        assert_eq!(report.failed_ids(), vec![102, 105, 108]);
        assert_eq!(report.succeeded, 7);
    }

    #[tokio::test]
    async fn concurrent_outcomes_keep_store_order() {
        let records: Vec<StationRecord> = (100..106).map(record).collect();
        let outcomes = run_each(records, 4, |record| async move {
            // Earlier stations finish last.
            let delay = 60 - (record.id - 100) * 10;
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            (record, Ok(String::new()))
        })
        .await;
        let ids: Vec<u32> = outcomes.iter().map(|outcome| outcome.id).collect();
        assert_eq!(ids, vec![100, 101, 102, 103, 104, 105]);
    }
}
