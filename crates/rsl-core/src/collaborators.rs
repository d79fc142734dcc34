//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Capabilities the lifecycle core consumes from the host."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rsl_common::Platform;
use serde::Serialize;

use crate::plan::Quota;

/// Health reported by the compute collaborator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Running,
    /// Up, but init reports failed units.
    Degraded,
    Stopped,
    Unknown,
}

impl HealthState {
    /// Running or degraded-but-up.
    pub fn is_up(&self) -> bool {
        matches!(self, HealthState::Running | HealthState::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Running => "running",
            HealthState::Degraded => "degraded",
            HealthState::Stopped => "stopped",
            HealthState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to create one compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputeSpec {
    pub id: u32,
    pub hostname: String,
    pub cores: u32,
    pub memory_mb: u32,
    pub swap_mb: u32,
    pub address: String,
    pub prefix_len: u8,
    pub gateway: String,
    pub bridge: String,
    pub description: String,
    pub base_image: String,
    pub rootfs_storage: String,
    pub rootfs_size_gb: u32,
}

/// Volume creation request with media-oriented tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeSpec {
    pub path: String,
    pub mountpoint: PathBuf,
    pub quota: Quota,
    pub block_size: String,
    pub compression: String,
    pub atime: bool,
}

/// Host-side uid/gid that container root maps to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct IdMapping {
    pub uid: u32,
    pub gid: u32,
}

/// Container manager.
#[async_trait]
pub trait ComputeManager: Send + Sync {
    async fn exists(&self, id: u32) -> anyhow::Result<bool>;

    async fn create(&self, spec: &ComputeSpec) -> anyhow::Result<()>;

    async fn start(&self, id: u32) -> anyhow::Result<()>;

    async fn stop(&self, id: u32, timeout: Duration) -> anyhow::Result<()>;

    async fn destroy(&self, id: u32) -> anyhow::Result<()>;

    async fn health(&self, id: u32) -> anyhow::Result<HealthState>;

    /// Configured IPv4 address of an existing unit, `None` when it has none.
    async fn address(&self, id: u32) -> anyhow::Result<Option<String>>;

    /// Bind `host_path` into the unit at `mount_path`. Re-attaching the same
    /// pair must succeed without creating a second mount.
    async fn attach_volume(&self, id: u32, host_path: &Path, mount_path: &Path)
        -> anyhow::Result<()>;

    /// Baseline OS preparation inside the unit. Safe to repeat.
    async fn exec_bootstrap(&self, id: u32, timezone: &str) -> anyhow::Result<()>;

    /// Compute-level backup. Returns a description of the produced archive.
    async fn snapshot_backup(&self, id: u32) -> anyhow::Result<String>;
}

/// Volume manager.
#[async_trait]
pub trait StorageManager: Send + Sync {
    async fn pool_healthy(&self, pool: &str) -> anyhow::Result<bool>;

    async fn pool_free_capacity(&self, pool: &str) -> anyhow::Result<u64>;

    async fn volume_exists(&self, path: &str) -> anyhow::Result<bool>;

    async fn create_volume(&self, spec: &VolumeSpec) -> anyhow::Result<()>;

    async fn destroy_volume(&self, path: &str) -> anyhow::Result<()>;

    async fn set_quota(&self, path: &str, quota: Quota) -> anyhow::Result<()>;

    async fn snapshot(&self, path: &str, name: &str) -> anyhow::Result<()>;

    async fn snapshot_exists(&self, path: &str, name: &str) -> anyhow::Result<bool>;

    async fn rollback(&self, path: &str, name: &str) -> anyhow::Result<()>;

    async fn set_ownership(&self, mountpoint: &Path, mapping: IdMapping) -> anyhow::Result<()>;
}

/// One radio platform's install/update/backup/logs capability.
#[async_trait]
pub trait PlatformInstaller: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether the platform is already installed in the unit.
    async fn installed(&self, _compute_id: u32) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn install(
        &self,
        compute_id: u32,
        mount_path: &Path,
        install_path: &Path,
        version: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn update(&self, compute_id: u32) -> anyhow::Result<()>;

    /// Application-level backup. Returns a description of what was produced.
    async fn backup(&self, compute_id: u32) -> anyhow::Result<String>;

    async fn logs(&self, compute_id: u32, lines: usize) -> anyhow::Result<String>;
}
