//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Structured outcomes returned by lifecycle operations."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rsl_inventory::{JournalEntry, StationRecord, StationStatus};
use serde::Serialize;

use crate::collaborators::HealthState;
use crate::error::LifecycleError;
use crate::stage::StageOutcome;

/// Successful deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub record: StationRecord,
    pub stages: Vec<StageOutcome>,
    /// Non-fatal problems, e.g. a health poll that timed out.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownOptions {
    /// Also destroy the storage volume (asked separately).
    pub purge_data: bool,
    /// Skip every confirmation prompt.
    pub force: bool,
}

/// What happened to a station's volume during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum VolumeDisposition {
    Preserved { dataset: String, host_path: PathBuf },
    Destroyed { dataset: String },
    /// Purge was requested but no volume existed.
    Absent { dataset: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    pub id: u32,
    pub hostname: String,
    /// False when the compute unit was already gone.
    pub compute_destroyed: bool,
    pub volume: VolumeDisposition,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Compute-level archive only.
    Compute,
    /// The platform's own backup only.
    Application,
    /// Both, plus a timestamped volume snapshot.
    Full,
}

impl BackupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupMode::Compute => "compute",
            BackupMode::Application => "application",
            BackupMode::Full => "full",
        }
    }

    pub fn includes_compute(&self) -> bool {
        matches!(self, BackupMode::Compute | BackupMode::Full)
    }

    pub fn includes_application(&self) -> bool {
        matches!(self, BackupMode::Application | BackupMode::Full)
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupMode {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compute" | "container" => Ok(BackupMode::Compute),
            "application" | "app" => Ok(BackupMode::Application),
            "full" => Ok(BackupMode::Full),
            other => Err(LifecycleError::validation(format!(
                "unknown backup mode '{other}', expected compute, application or full"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStep {
    Compute,
    Application,
    VolumeSnapshot,
}

impl fmt::Display for BackupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackupStep::Compute => "compute",
            BackupStep::Application => "application",
            BackupStep::VolumeSnapshot => "volume_snapshot",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupStepOutcome {
    pub step: BackupStep,
    pub succeeded: bool,
    pub detail: String,
}

/// Per-sub-operation backup result. Partial failure is not collapsed.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub id: u32,
    pub mode: BackupMode,
    pub steps: Vec<BackupStepOutcome>,
}

impl BackupReport {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|step| step.succeeded)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &BackupStepOutcome> {
        self.steps.iter().filter(|step| !step.succeeded)
    }

    pub fn failure_summary(&self) -> String {
        self.failed_steps()
            .map(|step| format!("{}: {}", step.step, step.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub id: u32,
    pub health: HealthState,
    pub previous: StationStatus,
    pub current: StationStatus,
}

impl StatusReport {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Everything known about one station.
#[derive(Debug, Clone, Serialize)]
pub struct StationInfo {
    pub record: StationRecord,
    pub health: HealthState,
    pub dataset_path: String,
    pub host_path: PathBuf,
    pub mount_path: Option<PathBuf>,
    pub journal: Vec<JournalEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_mode_parses_aliases() {
        assert_eq!("Full".parse::<BackupMode>().unwrap(), BackupMode::Full);
        assert_eq!("container".parse::<BackupMode>().unwrap(), BackupMode::Compute);
        assert!("nightly".parse::<BackupMode>().is_err());
    }

    #[test]
    fn partial_backup_lists_each_failure() {
        let report = BackupReport {
            id: 340,
            mode: BackupMode::Full,
            steps: vec![
                BackupStepOutcome {
                    step: BackupStep::Compute,
                    succeeded: true,
                    detail: "vzdump archive".into(),
                },
                BackupStepOutcome {
                    step: BackupStep::VolumeSnapshot,
                    succeeded: false,
                    detail: "dataset busy".into(),
                },
            ],
        };
        assert!(!report.is_complete());
        assert_eq!(report.failure_summary(), "volume_snapshot: dataset busy");
    }
}
