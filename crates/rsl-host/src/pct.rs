//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Container lifecycle through the pct and vzdump tools."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use rsl_common::ComputeConfig;
use rsl_core::{ComputeManager, ComputeSpec, HealthState};
use tracing::info;

use crate::runner::{shell_quote, CommandRunner};

const PCT: &str = "pct";
const VZDUMP: &str = "vzdump";
const BOOTSTRAP_PACKAGES: &str = "curl wget git ca-certificates gnupg tzdata";

/// Compute manager backed by LXC containers on a Proxmox host.
#[derive(Debug, Clone)]
pub struct PctCompute {
    runner: Arc<dyn CommandRunner>,
    backup_storage: String,
}

impl PctCompute {
    pub fn new(runner: Arc<dyn CommandRunner>, backup_storage: impl Into<String>) -> Self {
        Self {
            runner,
            backup_storage: backup_storage.into(),
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &ComputeConfig) -> Self {
        Self::new(runner, config.backup_storage.clone())
    }

    /// Run a shell script inside the container.
    pub async fn exec_script(&self, id: u32, script: &str) -> anyhow::Result<String> {
        exec_in(self.runner.as_ref(), id, script).await
    }

    async fn container_state(&self, id: u32) -> anyhow::Result<Option<String>> {
        let output = self.runner.run(PCT, &crate::args!["status", id]).await?;
        if !output.success() {
            if output.stderr.contains("does not exist") {
                return Ok(None);
            }
            bail!("pct status {id} failed: {}", output.stderr.trim());
        }
        let state = output
            .stdout
            .trim()
            .strip_prefix("status:")
            .map(str::trim)
            .unwrap_or_default()
            .to_owned();
        Ok(Some(state))
    }
}

#[async_trait]
impl ComputeManager for PctCompute {
    async fn exists(&self, id: u32) -> anyhow::Result<bool> {
        Ok(self.container_state(id).await?.is_some())
    }

    async fn create(&self, spec: &ComputeSpec) -> anyhow::Result<()> {
        let net0 = format!(
            "name=eth0,bridge={},ip={}/{},gw={}",
            spec.bridge, spec.address, spec.prefix_len, spec.gateway
        );
        let rootfs = format!("{}:{}", spec.rootfs_storage, spec.rootfs_size_gb);
        let mut args = crate::args![
            "create",
            spec.id,
            spec.base_image,
            "--hostname",
            spec.hostname,
            "--cores",
            spec.cores,
            "--memory",
            spec.memory_mb,
            "--swap",
            spec.swap_mb,
            "--net0",
            net0,
            "--rootfs",
            rootfs,
            "--unprivileged",
            1,
            "--features",
            "nesting=1,keyctl=1",
            "--onboot",
            1,
        ];
        if !spec.description.is_empty() {
            args.push("--description".to_owned());
            args.push(spec.description.clone());
        }
        self.runner
            .run_checked(PCT, &args)
            .await
            .with_context(|| format!("creating container {} ({})", spec.id, spec.hostname))?;
        info!(container = spec.id, hostname = %spec.hostname, "container created");
        Ok(())
    }

    async fn start(&self, id: u32) -> anyhow::Result<()> {
        self.runner
            .run_checked(PCT, &crate::args!["start", id])
            .await
            .with_context(|| format!("starting container {id}"))?;
        Ok(())
    }

    async fn stop(&self, id: u32, timeout: Duration) -> anyhow::Result<()> {
        let clean = self
            .runner
            .run(PCT, &crate::args!["shutdown", id, "--timeout", timeout.as_secs()])
            .await?;
        if clean.success() {
            return Ok(());
        }
        tracing::warn!(container = id, "clean shutdown failed; forcing stop");
        self.runner
            .run_checked(PCT, &crate::args!["stop", id])
            .await
            .with_context(|| format!("stopping container {id}"))?;
        Ok(())
    }

    async fn destroy(&self, id: u32) -> anyhow::Result<()> {
        self.runner
            .run_checked(PCT, &crate::args!["destroy", id, "--purge"])
            .await
            .with_context(|| format!("destroying container {id}"))?;
        Ok(())
    }

    async fn health(&self, id: u32) -> anyhow::Result<HealthState> {
        match self.container_state(id).await?.as_deref() {
            None => Ok(HealthState::Unknown),
            Some("stopped") => Ok(HealthState::Stopped),
            Some("running") => {
                // is-system-running exits non-zero when degraded, so read stdout only.
                let output = self
                    .runner
                    .run(PCT, &crate::args![
                        "exec", id, "--", "systemctl", "is-system-running"
                    ])
                    .await?;
                Ok(match output.stdout.trim() {
                    "running" => HealthState::Running,
                    "degraded" => HealthState::Degraded,
                    _ => HealthState::Unknown,
                })
            }
            Some(_) => Ok(HealthState::Unknown),
        }
    }

    async fn address(&self, id: u32) -> anyhow::Result<Option<String>> {
        let config = self
            .runner
            .run_checked(PCT, &crate::args!["config", id])
            .await
            .with_context(|| format!("reading configuration of container {id}"))?;
        Ok(net0_address(&config))
    }

    async fn attach_volume(
        &self,
        id: u32,
        host_path: &Path,
        mount_path: &Path,
    ) -> anyhow::Result<()> {
        let mp0 = format!("{},mp={}", host_path.display(), mount_path.display());
        self.runner
            .run_checked(PCT, &crate::args!["set", id, "--mp0", mp0])
            .await
            .with_context(|| format!("attaching {} to container {id}", host_path.display()))?;
        Ok(())
    }

    async fn exec_bootstrap(&self, id: u32, timezone: &str) -> anyhow::Result<()> {
        if timezone.is_empty()
            || !timezone
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || "/_+-".contains(ch))
        {
            bail!("invalid timezone '{timezone}'");
        }
        let zone = shell_quote(&format!("/usr/share/zoneinfo/{timezone}"));
        let script = format!(
            "set -e; export DEBIAN_FRONTEND=noninteractive; \
             apt-get update -q; apt-get upgrade -y -q; \
             apt-get install -y -q {BOOTSTRAP_PACKAGES}; \
             ln -sf {zone} /etc/localtime; echo {tz} > /etc/timezone",
            tz = shell_quote(timezone),
        );
        self.exec_script(id, &script)
            .await
            .with_context(|| format!("bootstrapping container {id}"))?;
        Ok(())
    }

    async fn snapshot_backup(&self, id: u32) -> anyhow::Result<String> {
        let output = self
            .runner
            .run_checked(VZDUMP, &crate::args![
                id,
                "--storage",
                self.backup_storage,
                "--mode",
                "snapshot",
                "--compress",
                "zstd"
            ])
            .await
            .with_context(|| format!("vzdump of container {id}"))?;
        Ok(archive_name(&output)
            .unwrap_or_else(|| format!("vzdump of {id} stored on {}", self.backup_storage)))
    }
}

/// `pct exec <id> -- bash -lc <script>`, failing on a non-zero exit.
pub(crate) async fn exec_in(
    runner: &dyn CommandRunner,
    id: u32,
    script: &str,
) -> anyhow::Result<String> {
    runner
        .run_checked(PCT, &crate::args!["exec", id, "--", "bash", "-lc", script])
        .await
}

/// Static IPv4 from the `net0:` line of `pct config`, without the prefix length.
fn net0_address(config: &str) -> Option<String> {
    let net0 = config
        .lines()
        .find_map(|line| line.strip_prefix("net0:"))?;
    net0.trim()
        .split(',')
        .find_map(|field| field.strip_prefix("ip="))
        .map(|ip| ip.split('/').next().unwrap_or(ip))
        .filter(|ip| *ip != "dhcp" && *ip != "manual")
        .map(str::to_owned)
}

/// Archive path from vzdump's "creating ... archive '<path>'" line.
fn archive_name(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("archive '"))
        .and_then(|line| line.split('\'').nth(1))
        .map(str::to_owned)
}
