//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Primary orchestration and lifecycle management."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! Station lifecycle core: allocation, staged provisioning, teardown, and bulk execution.

pub mod allocator;
pub mod bulk;
pub mod collaborators;
pub mod confirm;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod report;
pub mod stage;

pub use allocator::{derive_address, ResourceAllocator};
pub use bulk::{run_each, BulkExecutor, BulkOperation, BulkReport, StationOutcome};
pub use collaborators::{
    ComputeManager, ComputeSpec, HealthState, IdMapping, PlatformInstaller, StorageManager,
    VolumeSpec,
};
pub use confirm::{AssumeYes, Confirmer, ScriptedConfirmer, StaticConfirmer, PURGE_CONFIRMATION_WORD};
pub use error::{ErrorKind, LifecycleError, Result};
pub use metrics::{new_registry, LifecycleMetrics, SharedRegistry};
pub use orchestrator::LifecycleOrchestrator;
pub use plan::{swap_for, DeployRequest, Quota, StationSpec};
pub use registry::PlatformRegistry;
pub use report::{
    BackupMode, BackupReport, BackupStep, BackupStepOutcome, DeployReport, StationInfo,
    StatusReport, TeardownOptions, TeardownReport, VolumeDisposition,
};
pub use stage::{ProvisionStage, StageAction, StageOutcome};
