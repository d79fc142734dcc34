//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "In-memory volume manager."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use rsl_core::{IdMapping, Quota, StorageManager, VolumeSpec};

use crate::failures::FailurePlan;

#[derive(Debug, Clone)]
pub struct FakeVolume {
    pub spec: VolumeSpec,
    pub snapshots: Vec<String>,
    /// Snapshot most recently rolled back to.
    pub rolled_back_to: Option<String>,
}

/// Single-pool volume manager. Free capacity is pool size minus the sum of quotas.
#[derive(Debug)]
pub struct FakeStorage {
    pool: String,
    capacity: u64,
    healthy: AtomicBool,
    volumes: Mutex<BTreeMap<String, FakeVolume>>,
    ownership: Mutex<BTreeMap<PathBuf, IdMapping>>,
    pub failures: FailurePlan,
}

impl FakeStorage {
    pub fn new(pool: impl Into<String>, capacity: u64) -> Self {
        Self {
            pool: pool.into(),
            capacity,
            healthy: AtomicBool::new(true),
            volumes: Mutex::new(BTreeMap::new()),
            ownership: Mutex::new(BTreeMap::new()),
            failures: FailurePlan::default(),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn volume(&self, path: &str) -> Option<FakeVolume> {
        self.volumes.lock().get(path).cloned()
    }

    pub fn ownership(&self, mountpoint: &Path) -> Option<IdMapping> {
        self.ownership.lock().get(mountpoint).copied()
    }

    pub fn add_snapshot(&self, path: &str, name: &str) {
        if let Some(volume) = self.volumes.lock().get_mut(path) {
            volume.snapshots.push(name.to_owned());
        }
    }

    fn check_pool(&self, pool: &str) -> anyhow::Result<()> {
        if pool != self.pool {
            bail!("no such pool: {pool}");
        }
        Ok(())
    }

    fn used(&self) -> u64 {
        self.volumes
            .lock()
            .values()
            .map(|volume| volume.spec.quota.bytes())
            .sum()
    }
}

#[async_trait]
impl StorageManager for FakeStorage {
    async fn pool_healthy(&self, pool: &str) -> anyhow::Result<bool> {
        self.check_pool(pool)?;
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    async fn pool_free_capacity(&self, pool: &str) -> anyhow::Result<u64> {
        self.check_pool(pool)?;
        Ok(self.capacity.saturating_sub(self.used()))
    }

    async fn volume_exists(&self, path: &str) -> anyhow::Result<bool> {
        self.failures.check("volume_exists", path)?;
        Ok(self.volumes.lock().contains_key(path))
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> anyhow::Result<()> {
        self.failures.check("create_volume", &spec.path)?;
        let mut volumes = self.volumes.lock();
        if volumes.contains_key(&spec.path) {
            bail!("dataset already exists: {}", spec.path);
        }
        volumes.insert(
            spec.path.clone(),
            FakeVolume {
                spec: spec.clone(),
                snapshots: Vec::new(),
                rolled_back_to: None,
            },
        );
        Ok(())
    }

    async fn destroy_volume(&self, path: &str) -> anyhow::Result<()> {
        self.failures.check("destroy_volume", path)?;
        self.volumes
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("dataset does not exist: {path}"))
    }

    async fn set_quota(&self, path: &str, quota: Quota) -> anyhow::Result<()> {
        self.failures.check("set_quota", path)?;
        let mut volumes = self.volumes.lock();
        let volume = volumes
            .get_mut(path)
            .ok_or_else(|| anyhow!("dataset does not exist: {path}"))?;
        volume.spec.quota = quota;
        Ok(())
    }

    async fn snapshot(&self, path: &str, name: &str) -> anyhow::Result<()> {
        self.failures.check("snapshot", path)?;
        let mut volumes = self.volumes.lock();
        let volume = volumes
            .get_mut(path)
            .ok_or_else(|| anyhow!("dataset does not exist: {path}"))?;
        if volume.snapshots.iter().any(|snapshot| snapshot == name) {
            bail!("snapshot {path}@{name} already exists");
        }
        volume.snapshots.push(name.to_owned());
        Ok(())
    }

    async fn snapshot_exists(&self, path: &str, name: &str) -> anyhow::Result<bool> {
        Ok(self
            .volumes
            .lock()
            .get(path)
            .map(|volume| volume.snapshots.iter().any(|snapshot| snapshot == name))
            .unwrap_or(false))
    }

    async fn rollback(&self, path: &str, name: &str) -> anyhow::Result<()> {
        self.failures.check("rollback", path)?;
        let mut volumes = self.volumes.lock();
        let volume = volumes
            .get_mut(path)
            .ok_or_else(|| anyhow!("dataset does not exist: {path}"))?;
        let position = volume
            .snapshots
            .iter()
            .position(|snapshot| snapshot == name)
            .ok_or_else(|| anyhow!("snapshot does not exist: {path}@{name}"))?;
        // Rolling back discards newer snapshots, as zfs rollback -r does.
        volume.snapshots.truncate(position + 1);
        volume.rolled_back_to = Some(name.to_owned());
        Ok(())
    }

    async fn set_ownership(&self, mountpoint: &Path, mapping: IdMapping) -> anyhow::Result<()> {
        self.failures.check("set_ownership", mountpoint.display())?;
        self.ownership
            .lock()
            .insert(mountpoint.to_path_buf(), mapping);
        Ok(())
    }
}
