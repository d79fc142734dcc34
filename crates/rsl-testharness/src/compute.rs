//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "In-memory compute manager."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use rsl_core::{ComputeManager, ComputeSpec, HealthState};

use crate::failures::FailurePlan;

#[derive(Debug, Clone)]
pub struct FakeUnit {
    pub spec: Option<ComputeSpec>,
    pub state: HealthState,
    pub mounts: Vec<(PathBuf, PathBuf)>,
    pub bootstraps: u32,
    pub backups: u32,
}

impl FakeUnit {
    fn new(spec: Option<ComputeSpec>) -> Self {
        Self {
            spec,
            state: HealthState::Stopped,
            mounts: Vec::new(),
            bootstraps: 0,
            backups: 0,
        }
    }
}

/// Compute manager holding units in a map. Started units report running
/// unless they were told to hang.
#[derive(Debug, Default)]
pub struct FakeCompute {
    units: Mutex<BTreeMap<u32, FakeUnit>>,
    never_boot: Mutex<HashSet<u32>>,
    calls: Mutex<Vec<String>>,
    pub failures: FailurePlan,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// A unit that exists without any inventory record, stopped.
    pub fn add_unmanaged(&self, id: u32) {
        self.units.lock().insert(id, FakeUnit::new(None));
    }

    /// Started units stay stopped, so health polling times out.
    pub fn never_boot(&self, id: u32) {
        self.never_boot.lock().insert(id);
    }

    pub fn set_state(&self, id: u32, state: HealthState) {
        if let Some(unit) = self.units.lock().get_mut(&id) {
            unit.state = state;
        }
    }

    /// Remove a unit behind the orchestrator's back.
    pub fn vanish(&self, id: u32) {
        self.units.lock().remove(&id);
    }

    pub fn unit(&self, id: u32) -> Option<FakeUnit> {
        self.units.lock().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.units.lock().keys().copied().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// How many times `operation` was called for `id`.
    pub fn call_count(&self, operation: &str, id: u32) -> usize {
        let needle = format!("{operation} {id}");
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == needle)
            .count()
    }

    fn record(&self, operation: &str, id: u32) -> anyhow::Result<()> {
        self.calls.lock().push(format!("{operation} {id}"));
        self.failures.check(operation, id)
    }
}

#[async_trait]
impl ComputeManager for FakeCompute {
    async fn exists(&self, id: u32) -> anyhow::Result<bool> {
        self.failures.check("exists", id)?;
        Ok(self.units.lock().contains_key(&id))
    }

    async fn address(&self, id: u32) -> anyhow::Result<Option<String>> {
        self.failures.check("address", id)?;
        Ok(self
            .units
            .lock()
            .get(&id)
            .and_then(|unit| unit.spec.as_ref())
            .map(|spec| spec.address.clone()))
    }

    async fn create(&self, spec: &ComputeSpec) -> anyhow::Result<()> {
        self.record("create", spec.id)?;
        let mut units = self.units.lock();
        if units.contains_key(&spec.id) {
            bail!("compute unit {} already exists", spec.id);
        }
        units.insert(spec.id, FakeUnit::new(Some(spec.clone())));
        Ok(())
    }

    async fn start(&self, id: u32) -> anyhow::Result<()> {
        self.record("start", id)?;
        let hang = self.never_boot.lock().contains(&id);
        let mut units = self.units.lock();
        let unit = units
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no compute unit {id}"))?;
        if !hang {
            unit.state = HealthState::Running;
        }
        Ok(())
    }

    async fn stop(&self, id: u32, _timeout: Duration) -> anyhow::Result<()> {
        self.record("stop", id)?;
        let mut units = self.units.lock();
        let unit = units
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no compute unit {id}"))?;
        unit.state = HealthState::Stopped;
        Ok(())
    }

    async fn destroy(&self, id: u32) -> anyhow::Result<()> {
        self.record("destroy", id)?;
        let mut units = self.units.lock();
        match units.get(&id) {
            Some(unit) if unit.state.is_up() => bail!("compute unit {id} is still running"),
            Some(_) => {
                units.remove(&id);
                Ok(())
            }
            None => bail!("no compute unit {id}"),
        }
    }

    async fn health(&self, id: u32) -> anyhow::Result<HealthState> {
        self.failures.check("health", id)?;
        Ok(self
            .units
            .lock()
            .get(&id)
            .map(|unit| unit.state)
            .unwrap_or(HealthState::Unknown))
    }

    async fn attach_volume(
        &self,
        id: u32,
        host_path: &Path,
        mount_path: &Path,
    ) -> anyhow::Result<()> {
        self.record("attach_volume", id)?;
        let mut units = self.units.lock();
        let unit = units
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no compute unit {id}"))?;
        let mount = (host_path.to_path_buf(), mount_path.to_path_buf());
        if !unit.mounts.contains(&mount) {
            unit.mounts.push(mount);
        }
        Ok(())
    }

    async fn exec_bootstrap(&self, id: u32, _timezone: &str) -> anyhow::Result<()> {
        self.record("exec_bootstrap", id)?;
        let mut units = self.units.lock();
        let unit = units
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no compute unit {id}"))?;
        unit.bootstraps += 1;
        Ok(())
    }

    async fn snapshot_backup(&self, id: u32) -> anyhow::Result<String> {
        self.record("snapshot_backup", id)?;
        let mut units = self.units.lock();
        let unit = units
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no compute unit {id}"))?;
        unit.backups += 1;
        Ok(format!("vzdump-lxc-{id}-{}.tar.zst", unit.backups))
    }
}
