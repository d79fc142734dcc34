//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Recording platform installer."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rsl_common::Platform;
use rsl_core::PlatformInstaller;

use crate::failures::FailurePlan;

/// Installer that remembers which units it installed into.
#[derive(Debug)]
pub struct FakeInstaller {
    platform: Platform,
    installed: Mutex<HashSet<u32>>,
    calls: Mutex<Vec<String>>,
    pub failures: FailurePlan,
}

impl FakeInstaller {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            installed: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            failures: FailurePlan::default(),
        }
    }

    pub fn is_installed(&self, compute_id: u32) -> bool {
        self.installed.lock().contains(&compute_id)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str, compute_id: u32) -> usize {
        let needle = format!("{operation} {compute_id}");
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == needle)
            .count()
    }

    fn record(&self, operation: &str, compute_id: u32) -> anyhow::Result<()> {
        self.calls.lock().push(format!("{operation} {compute_id}"));
        self.failures.check(operation, compute_id)
    }
}

#[async_trait]
impl PlatformInstaller for FakeInstaller {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn installed(&self, compute_id: u32) -> anyhow::Result<bool> {
        Ok(self.is_installed(compute_id))
    }

    async fn install(
        &self,
        compute_id: u32,
        _mount_path: &Path,
        _install_path: &Path,
        _version: Option<&str>,
    ) -> anyhow::Result<()> {
        self.record("install", compute_id)?;
        self.installed.lock().insert(compute_id);
        Ok(())
    }

    async fn update(&self, compute_id: u32) -> anyhow::Result<()> {
        self.record("update", compute_id)
    }

    async fn backup(&self, compute_id: u32) -> anyhow::Result<String> {
        self.record("backup", compute_id)?;
        Ok(format!("{}-backup-{compute_id}.tar.gz", self.platform))
    }

    async fn logs(&self, compute_id: u32, lines: usize) -> anyhow::Result<String> {
        self.record("logs", compute_id)?;
        Ok((1..=lines)
            .map(|line| format!("{} {compute_id} line {line}", self.platform))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
