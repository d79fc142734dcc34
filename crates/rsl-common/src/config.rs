//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Shared primitives and utilities for the core runtime."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;
use crate::platform::Platform;

/// Lowest station identifier the system will ever hand out or accept.
pub const MIN_STATION_ID: u32 = 100;
/// Highest station identifier the system will ever hand out or accept.
pub const MAX_STATION_ID: u32 = 999_999;

fn default_inventory_path() -> PathBuf {
    PathBuf::from("/var/lib/rsl/stations.csv")
}

fn default_retain_backups() -> usize {
    10
}

fn default_network_prefix() -> String {
    "192.168.2".to_owned()
}

fn default_prefix_len() -> u8 {
    24
}

fn default_gateway() -> String {
    "192.168.2.1".to_owned()
}

fn default_bridge() -> String {
    "vmbr0".to_owned()
}

fn default_range_start() -> u32 {
    MIN_STATION_ID
}

fn default_range_end() -> u32 {
    999
}

fn default_pool() -> String {
    "tank".to_owned()
}

fn default_dataset_prefix() -> String {
    "radio".to_owned()
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("/tank/radio")
}

fn default_block_size() -> String {
    "1M".to_owned()
}

fn default_compression() -> String {
    "lz4".to_owned()
}

fn default_id_map_offset() -> u32 {
    100_000
}

fn default_base_image() -> String {
    "local:vztmpl/ubuntu-22.04-standard_22.04-1_amd64.tar.zst".to_owned()
}

fn default_rootfs_storage() -> String {
    "local-lvm".to_owned()
}

fn default_rootfs_size_gb() -> u32 {
    16
}

fn default_cores() -> u32 {
    2
}

fn default_memory_mb() -> u32 {
    4096
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_health_poll_attempts() -> u32 {
    30
}

fn default_health_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_backup_storage() -> String {
    "local".to_owned()
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_concurrency() -> usize {
    1
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/var/log/rsl")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object for the station lifecycle tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RSL_CONFIG";

    /// Load configuration from disk, respecting the `RSL_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        let loaded = Self::load_or_default(candidates)?;
        if loaded.source.is_none() {
            return Err(anyhow!(
                "no configuration files found. inspected: {}",
                candidates
                    .iter()
                    .map(|p| p.as_ref().display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        Ok(loaded.config)
    }

    /// Load the first existing candidate, or fall back to built-in defaults.
    ///
    /// An explicit `RSL_CONFIG` path must exist; only the implicit candidate
    /// list is allowed to come up empty.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    /// Parse and validate one file, ignoring `RSL_CONFIG`.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.inventory.validate()?;
        self.network.validate()?;
        self.allocation.validate()?;
        self.compute.validate()?;
        if self.bulk.concurrency == 0 {
            return Err(anyhow!("bulk.concurrency must be at least 1"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Location and retention of the inventory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_inventory_path")]
    pub path: PathBuf,
    /// Defaults to a `backups` directory beside the inventory file.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default = "default_retain_backups")]
    pub retain_backups: usize,
    /// Defaults to `journal.log` beside the inventory file.
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: default_inventory_path(),
            backup_dir: None,
            retain_backups: default_retain_backups(),
            journal_path: None,
        }
    }
}

impl InventoryConfig {
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| sibling(&self.path, "backups"))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.journal_path
            .clone()
            .unwrap_or_else(|| sibling(&self.path, "journal.log"))
    }

    fn validate(&self) -> Result<()> {
        if self.retain_backups == 0 {
            return Err(anyhow!("inventory.retain_backups must be at least 1"));
        }
        if self.path.file_name().is_none() {
            return Err(anyhow!(
                "inventory.path {} does not name a file",
                self.path.display()
            ));
        }
        Ok(())
    }
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Station network layout. Addresses are `<prefix>.<suffix>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_prefix")]
    pub prefix: String,
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,
    #[serde(default = "default_gateway")]
    pub gateway: String,
    #[serde(default = "default_bridge")]
    pub bridge: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            prefix: default_network_prefix(),
            prefix_len: default_prefix_len(),
            gateway: default_gateway(),
            bridge: default_bridge(),
        }
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        let octets: Vec<&str> = self.prefix.split('.').collect();
        if octets.len() != 3 || octets.iter().any(|octet| octet.parse::<u8>().is_err()) {
            return Err(anyhow!(
                "network.prefix '{}' must be three dotted octets (e.g. 192.168.2)",
                self.prefix
            ));
        }
        if self.prefix_len > 32 {
            return Err(anyhow!("network.prefix_len must be between 0 and 32"));
        }
        Ok(())
    }
}

/// Closed interval scanned when no station id is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default = "default_range_start")]
    pub range_start: u32,
    #[serde(default = "default_range_end")]
    pub range_end: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
        }
    }
}

impl AllocationConfig {
    fn validate(&self) -> Result<()> {
        if self.range_start < MIN_STATION_ID || self.range_end > MAX_STATION_ID {
            return Err(anyhow!(
                "allocation range must lie within {}..={}",
                MIN_STATION_ID,
                MAX_STATION_ID
            ));
        }
        if self.range_start > self.range_end {
            return Err(anyhow!(
                "allocation.range_start ({}) exceeds range_end ({})",
                self.range_start,
                self.range_end
            ));
        }
        Ok(())
    }
}

/// Storage pool and the media-oriented tuning applied to every station volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_pool")]
    pub pool: String,
    #[serde(default = "default_dataset_prefix")]
    pub dataset_prefix: String,
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    #[serde(default = "default_block_size")]
    pub block_size: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default)]
    pub atime: bool,
    /// Host uid that root inside an unprivileged container maps to.
    #[serde(default = "default_id_map_offset")]
    pub uid_offset: u32,
    #[serde(default = "default_id_map_offset")]
    pub gid_offset: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool: default_pool(),
            dataset_prefix: default_dataset_prefix(),
            mount_root: default_mount_root(),
            block_size: default_block_size(),
            compression: default_compression(),
            atime: false,
            uid_offset: default_id_map_offset(),
            gid_offset: default_id_map_offset(),
        }
    }
}

impl StorageConfig {
    /// Dataset path for a station, `<pool>/<prefix>/<hostname>`.
    pub fn dataset_path(&self, hostname: &str) -> String {
        if self.dataset_prefix.is_empty() {
            format!("{}/{}", self.pool, hostname)
        } else {
            format!("{}/{}/{}", self.pool, self.dataset_prefix, hostname)
        }
    }

    /// Host directory where the station dataset is mounted.
    pub fn host_path(&self, hostname: &str) -> PathBuf {
        self.mount_root.join(hostname)
    }
}

/// Compute unit template, sizing defaults, and health polling.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default = "default_base_image")]
    pub base_image: String,
    #[serde(default = "default_rootfs_storage")]
    pub rootfs_storage: String,
    #[serde(default = "default_rootfs_size_gb")]
    pub rootfs_size_gb: u32,
    #[serde(default = "default_cores")]
    pub default_cores: u32,
    #[serde(default = "default_memory_mb")]
    pub default_memory_mb: u32,
    #[serde(default = "default_stop_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stop_timeout: Duration,
    #[serde(default = "default_health_poll_attempts")]
    pub health_poll_attempts: u32,
    #[serde(default = "default_health_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub health_poll_interval: Duration,
    #[serde(default = "default_backup_storage")]
    pub backup_storage: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            rootfs_storage: default_rootfs_storage(),
            rootfs_size_gb: default_rootfs_size_gb(),
            default_cores: default_cores(),
            default_memory_mb: default_memory_mb(),
            stop_timeout: default_stop_timeout(),
            health_poll_attempts: default_health_poll_attempts(),
            health_poll_interval: default_health_poll_interval(),
            backup_storage: default_backup_storage(),
            timezone: default_timezone(),
        }
    }
}

impl ComputeConfig {
    fn validate(&self) -> Result<()> {
        if self.health_poll_attempts == 0 {
            return Err(anyhow!("compute.health_poll_attempts must be at least 1"));
        }
        if self.default_cores == 0 || self.default_memory_mb == 0 {
            return Err(anyhow!("compute defaults must request non-zero cores and memory"));
        }
        Ok(())
    }
}

/// Paths and version pin for one platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Where the station volume is bound inside the compute unit.
    pub mount_path: PathBuf,
    /// Where the platform is installed inside the compute unit.
    pub install_path: PathBuf,
    #[serde(default)]
    pub version: Option<String>,
}

/// Per-platform settings. Icecast has no entry; it is reserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default = "PlatformsConfig::default_azuracast")]
    pub azuracast: PlatformConfig,
    #[serde(default = "PlatformsConfig::default_libretime")]
    pub libretime: PlatformConfig,
}

impl PlatformsConfig {
    fn default_azuracast() -> PlatformConfig {
        PlatformConfig {
            mount_path: PathBuf::from("/var/azuracast/stations"),
            install_path: PathBuf::from("/var/azuracast"),
            version: Some("stable".to_owned()),
        }
    }

    fn default_libretime() -> PlatformConfig {
        PlatformConfig {
            mount_path: PathBuf::from("/srv/libretime"),
            install_path: PathBuf::from("/opt/libretime"),
            version: Some("main".to_owned()),
        }
    }

    pub fn get(&self, platform: Platform) -> Option<&PlatformConfig> {
        match platform {
            Platform::Azuracast => Some(&self.azuracast),
            Platform::Libretime => Some(&self.libretime),
            Platform::Icecast => None,
        }
    }
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            azuracast: Self::default_azuracast(),
            libretime: Self::default_libretime(),
        }
    }
}

/// Bulk executor worker bound. `1` keeps iteration strictly sequential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Prometheus text exposition written after each CLI run when a path is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}
