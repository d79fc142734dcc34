//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Platform installers run inside station containers."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! Each installer drives the platform's own tooling through `pct exec`.
//! Paths come from the `[platforms.<name>]` config section and are shell
//! quoted before they reach a script.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use rsl_common::{Platform, PlatformConfig};
use rsl_core::PlatformInstaller;
use tracing::info;

use crate::pct::exec_in;
use crate::runner::{shell_quote, CommandRunner};

const AZURACAST_REPO_RAW: &str = "https://raw.githubusercontent.com/AzuraCast/AzuraCast";
const LIBRETIME_REPO: &str = "https://github.com/libretime/libretime.git";
const LIBRETIME_CONFIG: &str = "/etc/libretime/config.yml";

/// `pct exec <id> -- test -e <path>`. Exit 1 means absent; anything else
/// non-zero is a failure to ask.
async fn path_exists(runner: &dyn CommandRunner, id: u32, path: &Path) -> anyhow::Result<bool> {
    let output = runner
        .run("pct", &crate::args!["exec", id, "--", "test", "-e", path.display()])
        .await?;
    match output.code {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => bail!(
            "could not inspect {} in container {id}: {}",
            path.display(),
            output.stderr.trim()
        ),
    }
}

fn quoted(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}

/// AzuraCast through its `docker.sh` helper.
#[derive(Debug, Clone)]
pub struct AzuracastInstaller {
    runner: Arc<dyn CommandRunner>,
    install_path: PathBuf,
    default_version: Option<String>,
}

impl AzuracastInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PlatformConfig) -> Self {
        Self {
            runner,
            install_path: config.install_path.clone(),
            default_version: config.version.clone(),
        }
    }

    fn helper(&self) -> String {
        quoted(&self.install_path.join("docker.sh"))
    }
}

#[async_trait]
impl PlatformInstaller for AzuracastInstaller {
    fn platform(&self) -> Platform {
        Platform::Azuracast
    }

    async fn installed(&self, compute_id: u32) -> anyhow::Result<bool> {
        path_exists(
            self.runner.as_ref(),
            compute_id,
            &self.install_path.join("docker-compose.yml"),
        )
        .await
    }

    async fn install(
        &self,
        compute_id: u32,
        mount_path: &Path,
        install_path: &Path,
        version: Option<&str>,
    ) -> anyhow::Result<()> {
        let channel = version
            .or(self.default_version.as_deref())
            .unwrap_or("stable");
        let mut script = format!(
            "set -e; mkdir -p {install} {mount}; cd {install}; \
             curl -fsSL {AZURACAST_REPO_RAW}/main/docker.sh -o docker.sh; chmod +x docker.sh; ",
            install = quoted(install_path),
            mount = quoted(mount_path),
        );
        if channel != "stable" {
            script.push_str(&format!(
                "yes | ./docker.sh setup-release --release-channel {}; ",
                shell_quote(channel)
            ));
        }
        script.push_str("yes '' | ./docker.sh install");
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("installing AzuraCast in container {compute_id}"))?;
        info!(container = compute_id, channel, "azuracast installed");
        Ok(())
    }

    async fn update(&self, compute_id: u32) -> anyhow::Result<()> {
        let script = format!(
            "set -e; yes | {helper} update-self; yes | {helper} update",
            helper = self.helper()
        );
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("updating AzuraCast in container {compute_id}"))?;
        Ok(())
    }

    async fn backup(&self, compute_id: u32) -> anyhow::Result<String> {
        let archive = format!("/var/azuracast/backups/station-{compute_id}.zip");
        let script = format!(
            "set -e; {helper} backup {archive}",
            helper = self.helper(),
            archive = shell_quote(&archive)
        );
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("AzuraCast backup in container {compute_id}"))?;
        Ok(archive)
    }

    async fn logs(&self, compute_id: u32, lines: usize) -> anyhow::Result<String> {
        let script = format!(
            "cd {install}; docker compose logs --no-color --tail {lines}",
            install = quoted(&self.install_path)
        );
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("reading AzuraCast logs in container {compute_id}"))
    }
}

/// LibreTime from a git checkout and its `install` script.
#[derive(Debug, Clone)]
pub struct LibretimeInstaller {
    runner: Arc<dyn CommandRunner>,
    install_path: PathBuf,
    mount_path: PathBuf,
    default_version: Option<String>,
}

impl LibretimeInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PlatformConfig) -> Self {
        Self {
            runner,
            install_path: config.install_path.clone(),
            mount_path: config.mount_path.clone(),
            default_version: config.version.clone(),
        }
    }

    fn install_command(&self, mount_path: &Path) -> String {
        format!(
            "./install --storage-path {} http://localhost",
            quoted(mount_path)
        )
    }
}

#[async_trait]
impl PlatformInstaller for LibretimeInstaller {
    fn platform(&self) -> Platform {
        Platform::Libretime
    }

    async fn installed(&self, compute_id: u32) -> anyhow::Result<bool> {
        path_exists(self.runner.as_ref(), compute_id, Path::new(LIBRETIME_CONFIG)).await
    }

    async fn install(
        &self,
        compute_id: u32,
        mount_path: &Path,
        install_path: &Path,
        version: Option<&str>,
    ) -> anyhow::Result<()> {
        let branch = version
            .or(self.default_version.as_deref())
            .unwrap_or("main");
        let script = format!(
            "set -e; mkdir -p {mount}; \
             if [ ! -d {install}/.git ]; then git clone --depth 1 --branch {branch} {LIBRETIME_REPO} {install}; fi; \
             cd {install}; {command}",
            mount = quoted(mount_path),
            install = quoted(install_path),
            branch = shell_quote(branch),
            command = self.install_command(mount_path),
        );
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("installing LibreTime in container {compute_id}"))?;
        info!(container = compute_id, branch, "libretime installed");
        Ok(())
    }

    async fn update(&self, compute_id: u32) -> anyhow::Result<()> {
        let script = format!(
            "set -e; cd {install}; git pull --ff-only; {command}",
            install = quoted(&self.install_path),
            command = self.install_command(&self.mount_path),
        );
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("updating LibreTime in container {compute_id}"))?;
        Ok(())
    }

    async fn backup(&self, compute_id: u32) -> anyhow::Result<String> {
        let dir = self.install_path.join("backups");
        let script = format!(
            "set -e; mkdir -p {dir}; out={dir}/libretime-$(date -u +%Y%m%dT%H%M%SZ).sql.gz; \
             sudo -u postgres pg_dump --no-owner libretime | gzip > \"$out\"; echo \"$out\"",
            dir = quoted(&dir)
        );
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("LibreTime backup in container {compute_id}"))
    }

    async fn logs(&self, compute_id: u32, lines: usize) -> anyhow::Result<String> {
        let script =
            format!("journalctl --no-pager --output=short-iso -n {lines} -u 'libretime*'");
        exec_in(self.runner.as_ref(), compute_id, &script)
            .await
            .with_context(|| format!("reading LibreTime logs in container {compute_id}"))
    }
}
