//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Station volumes as ZFS datasets."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use rsl_core::{IdMapping, Quota, StorageManager, VolumeSpec};
use tracing::info;

use crate::runner::CommandRunner;

const ZFS: &str = "zfs";
const ZPOOL: &str = "zpool";

/// Volume manager driving `zfs` and `zpool`.
#[derive(Debug, Clone)]
pub struct ZfsStorage {
    runner: Arc<dyn CommandRunner>,
}

impl ZfsStorage {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// `zfs list` on one name: `Ok(false)` when zfs says it does not exist.
    async fn dataset_exists(&self, name: &str, kind: &str) -> anyhow::Result<bool> {
        let output = self
            .runner
            .run(ZFS, &crate::args!["list", "-H", "-t", kind, "-o", "name", name])
            .await?;
        if output.success() {
            return Ok(true);
        }
        if output.stderr.contains("does not exist") {
            return Ok(false);
        }
        bail!("zfs list {name} failed: {}", output.stderr.trim());
    }
}

#[async_trait]
impl StorageManager for ZfsStorage {
    async fn pool_healthy(&self, pool: &str) -> anyhow::Result<bool> {
        let health = self
            .runner
            .run_checked(ZPOOL, &crate::args!["list", "-H", "-o", "health", pool])
            .await
            .with_context(|| format!("querying health of pool {pool}"))?;
        Ok(health == "ONLINE")
    }

    async fn pool_free_capacity(&self, pool: &str) -> anyhow::Result<u64> {
        let available = self
            .runner
            .run_checked(ZFS, &crate::args!["get", "-Hp", "-o", "value", "available", pool])
            .await
            .with_context(|| format!("querying free space of pool {pool}"))?;
        available
            .parse::<u64>()
            .with_context(|| format!("unexpected `available` value for {pool}: {available}"))
    }

    async fn volume_exists(&self, path: &str) -> anyhow::Result<bool> {
        self.dataset_exists(path, "filesystem").await
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> anyhow::Result<()> {
        let atime = if spec.atime { "on" } else { "off" };
        self.runner
            .run_checked(ZFS, &crate::args![
                "create",
                "-p",
                "-o",
                format!("quota={}", spec.quota.bytes()),
                "-o",
                format!("recordsize={}", spec.block_size),
                "-o",
                format!("compression={}", spec.compression),
                "-o",
                format!("atime={atime}"),
                "-o",
                format!("mountpoint={}", spec.mountpoint.display()),
                spec.path,
            ])
            .await
            .with_context(|| format!("creating dataset {}", spec.path))?;
        info!(dataset = %spec.path, quota = %spec.quota, "dataset created");
        Ok(())
    }

    async fn destroy_volume(&self, path: &str) -> anyhow::Result<()> {
        self.runner
            .run_checked(ZFS, &crate::args!["destroy", "-r", path])
            .await
            .with_context(|| format!("destroying dataset {path}"))?;
        Ok(())
    }

    async fn set_quota(&self, path: &str, quota: Quota) -> anyhow::Result<()> {
        self.runner
            .run_checked(ZFS, &crate::args![
                "set",
                format!("quota={}", quota.bytes()),
                path
            ])
            .await
            .with_context(|| format!("setting quota on {path}"))?;
        Ok(())
    }

    async fn snapshot(&self, path: &str, name: &str) -> anyhow::Result<()> {
        self.runner
            .run_checked(ZFS, &crate::args!["snapshot", format!("{path}@{name}")])
            .await
            .with_context(|| format!("snapshotting {path}"))?;
        Ok(())
    }

    async fn snapshot_exists(&self, path: &str, name: &str) -> anyhow::Result<bool> {
        self.dataset_exists(&format!("{path}@{name}"), "snapshot")
            .await
    }

    async fn rollback(&self, path: &str, name: &str) -> anyhow::Result<()> {
        self.runner
            .run_checked(ZFS, &crate::args!["rollback", "-r", format!("{path}@{name}")])
            .await
            .with_context(|| format!("rolling {path} back to {name}"))?;
        Ok(())
    }

    async fn set_ownership(&self, mountpoint: &Path, mapping: IdMapping) -> anyhow::Result<()> {
        self.runner
            .run_checked("chown", &crate::args![
                "-R",
                format!("{}:{}", mapping.uid, mapping.gid),
                mountpoint.display()
            ])
            .await
            .with_context(|| format!("changing owner of {}", mountpoint.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::runner::{CommandOutput, RecordingRunner};

    fn storage() -> (Arc<RecordingRunner>, ZfsStorage) {
        let runner = Arc::new(RecordingRunner::new());
        (runner.clone(), ZfsStorage::new(runner))
    }

    #[tokio::test]
    async fn create_applies_media_tuning() {
        let (runner, zfs) = storage();
        let spec = VolumeSpec {
            path: "tank/radio/azuracast-main".to_owned(),
            mountpoint: PathBuf::from("/tank/radio/azuracast-main"),
            quota: "500G".parse().unwrap(),
            block_size: "1M".to_owned(),
            compression: "lz4".to_owned(),
            atime: false,
        };
        zfs.create_volume(&spec).await.unwrap();
        assert_eq!(
            runner.calls(),
            vec![format!(
                "zfs create -p -o quota={} -o recordsize=1M -o compression=lz4 -o atime=off -o mountpoint=/tank/radio/azuracast-main tank/radio/azuracast-main",
                500u64 << 30
            )]
        );
    }

    #[tokio::test]
    async fn pool_queries_parse_output() {
        let (runner, zfs) = storage();
        runner.respond("zpool list", CommandOutput::ok("DEGRADED\n"));
        runner.respond("zfs get", CommandOutput::ok("1099511627776\n"));
        assert!(!zfs.pool_healthy("tank").await.unwrap());
        assert_eq!(zfs.pool_free_capacity("tank").await.unwrap(), 1 << 40);

        runner.respond("zfs get", CommandOutput::ok("lots\n"));
        assert!(zfs.pool_free_capacity("tank").await.is_err());
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_an_error() {
        let (runner, zfs) = storage();
        runner.respond(
            "zfs list -H -t snapshot",
            CommandOutput::failed(1, "cannot open 'tank/radio/x@nightly': dataset does not exist"),
        );
        assert!(!zfs.snapshot_exists("tank/radio/x", "nightly").await.unwrap());
        assert!(zfs.volume_exists("tank/radio/x").await.unwrap());
    }

    #[tokio::test]
    async fn ownership_uses_id_mapping() {
        let (runner, zfs) = storage();
        zfs.set_ownership(
            Path::new("/tank/radio/azuracast-main"),
            IdMapping {
                uid: 100_000,
                gid: 100_000,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            runner.calls(),
            vec!["chown -R 100000:100000 /tank/radio/azuracast-main"]
        );
    }
}
