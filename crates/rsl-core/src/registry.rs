//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Resolution of platform identifiers to installer implementations."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use rsl_common::Platform;

use crate::collaborators::PlatformInstaller;
use crate::error::{LifecycleError, Result};

/// Installers keyed by platform, resolved once at the top of each operation.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    installers: HashMap<Platform, Arc<dyn PlatformInstaller>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, installer: Arc<dyn PlatformInstaller>) -> &mut Self {
        self.installers.insert(installer.platform(), installer);
        self
    }

    pub fn with(mut self, installer: Arc<dyn PlatformInstaller>) -> Self {
        self.register(installer);
        self
    }

    pub fn resolve(&self, platform: Platform) -> Result<Arc<dyn PlatformInstaller>> {
        if !platform.is_implemented() {
            return Err(LifecycleError::validation(format!(
                "platform {platform} is reserved and has no installer"
            )));
        }
        self.installers.get(&platform).cloned().ok_or_else(|| {
            LifecycleError::validation(format!("no installer registered for platform {platform}"))
        })
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.installers.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    struct Noop(Platform);

    #[async_trait]
    impl PlatformInstaller for Noop {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn install(&self, _: u32, _: &Path, _: &Path, _: Option<&str>) -> anyhow::Result<()> {
            Ok(())
        }

        async fn update(&self, _: u32) -> anyhow::Result<()> {
            Ok(())
        }

        async fn backup(&self, _: u32) -> anyhow::Result<String> {
            Ok(String::new())
        }

        async fn logs(&self, _: u32, _: usize) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn icecast_is_reserved() {
        let registry = PlatformRegistry::new().with(Arc::new(Noop(Platform::Icecast)));
        let err = registry.resolve(Platform::Icecast).err().unwrap();
        assert!(matches!(err, LifecycleError::Validation(ref msg) if msg.contains("reserved")));
    }

    #[test]
    fn resolves_registered_installers() {
        let registry = PlatformRegistry::new().with(Arc::new(Noop(Platform::Libretime)));
        assert_eq!(
            registry.resolve(Platform::Libretime).unwrap().platform(),
            Platform::Libretime
        );
        assert!(registry.resolve(Platform::Azuracast).is_err());
    }
}
