//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Host command adapters for compute, storage and platforms."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! Collaborator implementations for a single Proxmox host: `pct` containers,
//! ZFS datasets and in-container platform installers. Every process goes
//! through a [`CommandRunner`] so the adapters can be exercised without a host.

use std::sync::Arc;

use rsl_common::AppConfig;
use rsl_core::PlatformRegistry;

pub mod installer;
pub mod pct;
pub mod runner;
pub mod zfs;

pub use installer::{AzuracastInstaller, LibretimeInstaller};
pub use pct::PctCompute;
pub use runner::{command_line, shell_quote, CommandOutput, CommandRunner, RecordingRunner, SystemRunner};
pub use zfs::ZfsStorage;

/// The three collaborators wired to one runner.
#[derive(Debug, Clone)]
pub struct HostAdapters {
    pub compute: Arc<PctCompute>,
    pub storage: Arc<ZfsStorage>,
    pub platforms: PlatformRegistry,
}

impl HostAdapters {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &AppConfig) -> Self {
        let platforms = PlatformRegistry::new()
            .with(Arc::new(AzuracastInstaller::new(
                runner.clone(),
                &config.platforms.azuracast,
            )))
            .with(Arc::new(LibretimeInstaller::new(
                runner.clone(),
                &config.platforms.libretime,
            )));
        Self {
            compute: Arc::new(PctCompute::from_config(runner.clone(), &config.compute)),
            storage: Arc::new(ZfsStorage::new(runner)),
            platforms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsl_common::Platform;

    #[test]
    fn registry_covers_implemented_platforms() {
        let runner: Arc<dyn CommandRunner> = Arc::new(RecordingRunner::new());
        let adapters = HostAdapters::new(runner, &AppConfig::default());
        assert!(adapters.platforms.resolve(Platform::Azuracast).is_ok());
        assert!(adapters.platforms.resolve(Platform::Libretime).is_ok());
        assert!(adapters.platforms.resolve(Platform::Icecast).is_err());
    }
}
