//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Provisioning stages and per-stage outcomes."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;

/// Linear provisioning state machine. `Registered` and `Failed` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStage {
    Requested,
    Validated,
    StorageProvisioned,
    ComputeProvisioned,
    StorageAttached,
    ComputeRunning,
    SystemBootstrapped,
    PlatformInstalled,
    Registered,
    Failed,
}

impl ProvisionStage {
    /// Stages that touch host resources, in execution order.
    pub const HOST_STEPS: [ProvisionStage; 6] = [
        ProvisionStage::StorageProvisioned,
        ProvisionStage::ComputeProvisioned,
        ProvisionStage::StorageAttached,
        ProvisionStage::ComputeRunning,
        ProvisionStage::SystemBootstrapped,
        ProvisionStage::PlatformInstalled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStage::Requested => "requested",
            ProvisionStage::Validated => "validated",
            ProvisionStage::StorageProvisioned => "storage_provisioned",
            ProvisionStage::ComputeProvisioned => "compute_provisioned",
            ProvisionStage::StorageAttached => "storage_attached",
            ProvisionStage::ComputeRunning => "compute_running",
            ProvisionStage::SystemBootstrapped => "system_bootstrapped",
            ProvisionStage::PlatformInstalled => "platform_installed",
            ProvisionStage::Registered => "registered",
            ProvisionStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisionStage::Registered | ProvisionStage::Failed)
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage did on this run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageAction {
    Performed,
    /// Already satisfied; nothing was changed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: ProvisionStage,
    pub action: StageAction,
}
