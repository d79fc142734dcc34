//! ---
//! rsl_section: "15-testing-qa-runbook"
//! rsl_subsection: "01-bootstrap"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Fake collaborators and a ready-made lifecycle fixture."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! In-memory stand-ins for the compute manager, volume manager and platform
//! installers. Every call is recorded, and any operation can be made to fail
//! for a chosen key so tests can drive partial failures deterministically.

use std::sync::Arc;
use std::time::Duration;

use rsl_common::{AppConfig, Platform};
use rsl_core::{LifecycleOrchestrator, PlatformRegistry};
use rsl_inventory::{CsvInventory, Journal};
use tempfile::TempDir;

mod compute;
mod failures;
mod installer;
mod storage;

pub use compute::FakeCompute;
pub use failures::FailurePlan;
pub use installer::FakeInstaller;
pub use storage::FakeStorage;

/// Pool size used by [`Fixture`]: 4 TiB.
pub const FIXTURE_POOL_BYTES: u64 = 4 << 40;

/// A CSV-backed orchestrator wired to fakes inside a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config: Arc<AppConfig>,
    pub inventory: Arc<CsvInventory>,
    pub journal: Arc<Journal>,
    pub compute: Arc<FakeCompute>,
    pub storage: Arc<FakeStorage>,
    pub azuracast: Arc<FakeInstaller>,
    pub libretime: Arc<FakeInstaller>,
    pub orchestrator: LifecycleOrchestrator,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(AppConfig::default())
    }

    /// Inventory paths are redirected into the temp dir and health polling
    /// is shortened; everything else in `config` is kept.
    pub fn with_config(mut config: AppConfig) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        config.inventory.path = dir.path().join("stations.csv");
        config.inventory.backup_dir = Some(dir.path().join("backups"));
        config.inventory.journal_path = Some(dir.path().join("journal.log"));
        config.compute.health_poll_attempts = 3;
        config.compute.health_poll_interval = Duration::from_millis(1);
        let config = Arc::new(config);

        let inventory = Arc::new(CsvInventory::from_config(&config.inventory)?);
        let journal = Arc::new(Journal::open(config.inventory.journal_path())?);
        let compute = Arc::new(FakeCompute::new());
        let storage = Arc::new(FakeStorage::new(
            config.storage.pool.clone(),
            FIXTURE_POOL_BYTES,
        ));
        let azuracast = Arc::new(FakeInstaller::new(Platform::Azuracast));
        let libretime = Arc::new(FakeInstaller::new(Platform::Libretime));
        let platforms = PlatformRegistry::new()
            .with(azuracast.clone())
            .with(libretime.clone());

        let orchestrator = LifecycleOrchestrator::new(
            config.clone(),
            inventory.clone(),
            compute.clone(),
            storage.clone(),
            platforms,
        )
        .with_journal(journal.clone());

        Ok(Self {
            dir,
            config,
            inventory,
            journal,
            compute,
            storage,
            azuracast,
            libretime,
            orchestrator,
        })
    }

    pub fn installer(&self, platform: Platform) -> Option<&Arc<FakeInstaller>> {
        match platform {
            Platform::Azuracast => Some(&self.azuracast),
            Platform::Libretime => Some(&self.libretime),
            Platform::Icecast => None,
        }
    }
}
