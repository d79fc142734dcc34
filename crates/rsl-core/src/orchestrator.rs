//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Primary orchestration and station lifecycle management."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! Provisioning never rolls back. Every host step checks before it acts, so
//! re-running a deployment with `resume` converges on the same end state and
//! leaves partial artifacts in place for inspection after a failure.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rsl_common::{AppConfig, Platform};
use rsl_inventory::{
    validate_station_id, validate_station_name, InventoryBackend, Journal, JournalEntry,
    JournalOutcome, StationFilter, StationRecord, StationStatus, ValidationReport,
};
use rsl_logging::{
    log_system_event, station_debug, station_error, station_info, station_warn, LogContext,
    SystemEventOutcome,
};
use tracing::warn;

use crate::allocator::{derive_address, ResourceAllocator};
use crate::collaborators::{
    ComputeManager, ComputeSpec, HealthState, IdMapping, PlatformInstaller, StorageManager,
    VolumeSpec,
};
use crate::confirm::Confirmer;
use crate::error::{LifecycleError, Result};
use crate::metrics::LifecycleMetrics;
use crate::plan::{swap_for, DeployRequest, StationSpec};
use crate::registry::PlatformRegistry;
use crate::report::{
    BackupMode, BackupReport, BackupStep, BackupStepOutcome, DeployReport, StationInfo,
    StatusReport, TeardownOptions, TeardownReport, VolumeDisposition,
};
use crate::stage::{ProvisionStage, StageAction, StageOutcome};

const SNAPSHOT_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Drives single stations through provisioning, teardown and maintenance.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    config: Arc<AppConfig>,
    inventory: Arc<dyn InventoryBackend>,
    compute: Arc<dyn ComputeManager>,
    storage: Arc<dyn StorageManager>,
    platforms: PlatformRegistry,
    journal: Option<Arc<Journal>>,
    metrics: Option<LifecycleMetrics>,
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("inventory", &self.inventory)
            .field("platforms", &self.platforms)
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

impl LifecycleOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        inventory: Arc<dyn InventoryBackend>,
        compute: Arc<dyn ComputeManager>,
        storage: Arc<dyn StorageManager>,
        platforms: PlatformRegistry,
    ) -> Self {
        Self {
            config,
            inventory,
            compute,
            storage,
            platforms,
            journal: None,
            metrics: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn inventory(&self) -> &Arc<dyn InventoryBackend> {
        &self.inventory
    }

    pub fn metrics(&self) -> Option<&LifecycleMetrics> {
        self.metrics.as_ref()
    }

    pub fn allocator(&self) -> ResourceAllocator {
        ResourceAllocator::new(self.inventory.clone(), self.compute.clone())
    }

    /// First free id in the configured allocation range.
    pub async fn next_id(&self) -> Result<u32> {
        let range = &self.config.allocation;
        self.allocator()
            .find_available_id(range.range_start, range.range_end)
            .await
    }

    pub fn list(&self, filter: StationFilter) -> Result<Vec<StationRecord>> {
        Ok(self.inventory.list(filter)?)
    }

    /// Resolve a request into a full spec. Only id allocation reaches a collaborator.
    pub async fn plan(&self, request: &DeployRequest) -> Result<StationSpec> {
        validate_station_name(&request.name)?;
        self.platforms.resolve(request.platform)?;
        let platform_config = self.config.platforms.get(request.platform).ok_or_else(|| {
            LifecycleError::validation(format!("platform {} is not configured", request.platform))
        })?;
        let cores = request.cores.unwrap_or(self.config.compute.default_cores);
        let memory_mb = request
            .memory_mb
            .unwrap_or(self.config.compute.default_memory_mb);
        if cores == 0 || memory_mb == 0 {
            return Err(LifecycleError::validation(
                "cores and memory must both be greater than zero",
            ));
        }

        let id = match request.id {
            Some(id) => {
                validate_station_id(id)?;
                id
            }
            None => self.next_id().await?,
        };
        let address_suffix = request.address_suffix.unwrap_or(id);
        let address = derive_address(&self.config.network.prefix, address_suffix)?;
        let hostname = request.platform.hostname_for(&request.name);

        Ok(StationSpec {
            id,
            station_name: request.name.clone(),
            platform: request.platform,
            cores,
            memory_mb,
            swap_mb: swap_for(memory_mb),
            quota: request.quota,
            address_suffix,
            dataset_path: self.config.storage.dataset_path(&hostname),
            host_path: self.config.storage.host_path(&hostname),
            mount_path: platform_config.mount_path.clone(),
            install_path: platform_config.install_path.clone(),
            hostname,
            address,
            description: request.description.clone(),
            version: request
                .version
                .clone()
                .or_else(|| platform_config.version.clone()),
            resume: request.resume,
        })
    }

    /// Run the full provisioning sequence for one station.
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployReport> {
        let platform = request.platform;
        let result = self.deploy_inner(request).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_deployment(platform.as_str(), result.is_ok());
        }
        result
    }

    async fn deploy_inner(&self, request: DeployRequest) -> Result<DeployReport> {
        let spec = match self.plan(&request).await {
            Ok(spec) => spec,
            Err(err) => {
                let stage = ProvisionStage::Validated;
                return Err(match request.id {
                    Some(id) => self.stage_failed(id, request.platform, stage, err),
                    None => {
                        // No id was claimed, so there is no station to journal against.
                        let ctx = LogContext::new()
                            .with_platform(request.platform.as_str())
                            .with_operation("deploy")
                            .with_stage(stage.as_str());
                        station_error!(context = ctx, "planning {} failed: {err}", request.name);
                        if let Some(metrics) = &self.metrics {
                            metrics.record_stage_failure(stage.as_str());
                        }
                        err
                    }
                });
            }
        };
        let installer = self.platforms.resolve(spec.platform)?;
        let ctx = LogContext::new()
            .with_station(spec.id)
            .with_platform(spec.platform.as_str())
            .with_operation("deploy");
        station_info!(
            context = ctx,
            "deploying {} at {} (resume: {})",
            spec.hostname,
            spec.address,
            spec.resume
        );
        self.journal_stage(&spec, ProvisionStage::Requested, JournalOutcome::Started, "");

        let mut stages = vec![StageOutcome {
            stage: ProvisionStage::Requested,
            action: StageAction::Performed,
        }];
        let mut warnings = Vec::new();

        if let Err(err) = self.check_claims(&spec).await {
            return Err(self.stage_failed(spec.id, spec.platform, ProvisionStage::Validated, err));
        }
        self.stage_completed(&spec, ProvisionStage::Validated, StageAction::Performed);
        stages.push(StageOutcome {
            stage: ProvisionStage::Validated,
            action: StageAction::Performed,
        });

        for stage in ProvisionStage::HOST_STEPS {
            match self.run_stage(stage, &spec, &installer, &mut warnings).await {
                Ok(action) => {
                    self.stage_completed(&spec, stage, action);
                    stages.push(StageOutcome { stage, action });
                }
                Err(err) => return Err(self.stage_failed(spec.id, spec.platform, stage, err)),
            }
        }

        let record = match self.register(&spec) {
            Ok(record) => record,
            Err(err) => {
                return Err(self.stage_failed(
                    spec.id,
                    spec.platform,
                    ProvisionStage::Registered,
                    err,
                ))
            }
        };
        self.stage_completed(&spec, ProvisionStage::Registered, StageAction::Performed);
        stages.push(StageOutcome {
            stage: ProvisionStage::Registered,
            action: StageAction::Performed,
        });

        let outcome = if warnings.is_empty() {
            SystemEventOutcome::Success
        } else {
            SystemEventOutcome::Degraded
        };
        log_system_event(
            Some(&ctx),
            "station.deployed",
            &format!("{} registered at {}", record.hostname, record.address),
            outcome,
        );
        Ok(DeployReport {
            record,
            stages,
            warnings,
        })
    }

    /// `Validated`: nothing external is changed here.
    async fn check_claims(&self, spec: &StationSpec) -> Result<()> {
        let records = self.inventory.list(StationFilter::All)?;
        if let Some(existing) = records.iter().find(|record| record.id == spec.id) {
            if !spec.resume {
                return Err(LifecycleError::conflict(format!(
                    "station {} is already registered as {}",
                    spec.id, existing.hostname
                )));
            }
            if existing.hostname != spec.hostname {
                return Err(LifecycleError::conflict(format!(
                    "station {} is registered as {}, not {}",
                    spec.id, existing.hostname, spec.hostname
                )));
            }
            if existing.address != spec.address {
                return Err(LifecycleError::conflict(format!(
                    "station {} is registered at {}, not {}; resume must keep the original address",
                    spec.id, existing.address, spec.address
                )));
            }
        }
        if let Some(other) = records
            .iter()
            .find(|record| record.id != spec.id && record.address == spec.address)
        {
            return Err(LifecycleError::conflict(format!(
                "address {} is already used by station {} ({})",
                spec.address, other.id, other.hostname
            )));
        }
        if let Some(other) = records
            .iter()
            .find(|record| record.id != spec.id && record.hostname == spec.hostname)
        {
            return Err(LifecycleError::conflict(format!(
                "hostname {} is already used by station {}",
                spec.hostname, other.id
            )));
        }

        let stage = ProvisionStage::Validated;
        let exists = self
            .compute
            .exists(spec.id)
            .await
            .map_err(|err| LifecycleError::external(stage, err))?;
        if exists && !spec.resume {
            return Err(LifecycleError::conflict(format!(
                "compute unit {} already exists; deploy with resume to continue a partial deployment",
                spec.id
            )));
        }
        if exists {
            let live = self
                .compute
                .address(spec.id)
                .await
                .map_err(|err| LifecycleError::external(stage, err))?;
            if let Some(live) = live.filter(|live| *live != spec.address) {
                return Err(LifecycleError::conflict(format!(
                    "compute unit {} is configured with {live}, not {}",
                    spec.id, spec.address
                )));
            }
        }

        let pool = &self.config.storage.pool;
        let healthy = self
            .storage
            .pool_healthy(pool)
            .await
            .map_err(|err| LifecycleError::external(stage, err))?;
        if !healthy {
            return Err(LifecycleError::Resource(format!(
                "storage pool {pool} is not healthy"
            )));
        }
        let volume_exists = self
            .storage
            .volume_exists(&spec.dataset_path)
            .await
            .map_err(|err| LifecycleError::external(stage, err))?;
        if !volume_exists {
            let free = self
                .storage
                .pool_free_capacity(pool)
                .await
                .map_err(|err| LifecycleError::external(stage, err))?;
            if free < spec.quota.bytes() {
                return Err(LifecycleError::Resource(format!(
                    "storage pool {pool} has {free} bytes free, quota {} needs {}",
                    spec.quota,
                    spec.quota.bytes()
                )));
            }
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: ProvisionStage,
        spec: &StationSpec,
        installer: &Arc<dyn PlatformInstaller>,
        warnings: &mut Vec<String>,
    ) -> Result<StageAction> {
        let external = |err: anyhow::Error| LifecycleError::external(stage, err);
        let ctx = LogContext::new()
            .with_station(spec.id)
            .with_platform(spec.platform.as_str())
            .with_operation("deploy")
            .with_stage(stage.as_str());
        match stage {
            ProvisionStage::StorageProvisioned => {
                let storage = &self.config.storage;
                let exists = self
                    .storage
                    .volume_exists(&spec.dataset_path)
                    .await
                    .map_err(external)?;
                let action = if exists {
                    station_warn!(
                        context = ctx,
                        "volume {} already exists; reusing it",
                        spec.dataset_path
                    );
                    warnings.push(format!(
                        "volume {} already existed and was reused",
                        spec.dataset_path
                    ));
                    self.storage
                        .set_quota(&spec.dataset_path, spec.quota)
                        .await
                        .map_err(external)?;
                    StageAction::Skipped
                } else {
                    let volume = VolumeSpec {
                        path: spec.dataset_path.clone(),
                        mountpoint: spec.host_path.clone(),
                        quota: spec.quota,
                        block_size: storage.block_size.clone(),
                        compression: storage.compression.clone(),
                        atime: storage.atime,
                    };
                    self.storage.create_volume(&volume).await.map_err(external)?;
                    StageAction::Performed
                };
                let mapping = IdMapping {
                    uid: storage.uid_offset,
                    gid: storage.gid_offset,
                };
                self.storage
                    .set_ownership(&spec.host_path, mapping)
                    .await
                    .map_err(external)?;
                Ok(action)
            }
            ProvisionStage::ComputeProvisioned => {
                if self.compute.exists(spec.id).await.map_err(external)? {
                    station_debug!(context = ctx, "compute unit already exists");
                    return Ok(StageAction::Skipped);
                }
                let compute = &self.config.compute;
                let network = &self.config.network;
                let unit = ComputeSpec {
                    id: spec.id,
                    hostname: spec.hostname.clone(),
                    cores: spec.cores,
                    memory_mb: spec.memory_mb,
                    swap_mb: spec.swap_mb,
                    address: spec.address.clone(),
                    prefix_len: network.prefix_len,
                    gateway: network.gateway.clone(),
                    bridge: network.bridge.clone(),
                    description: spec.description.clone(),
                    base_image: compute.base_image.clone(),
                    rootfs_storage: compute.rootfs_storage.clone(),
                    rootfs_size_gb: compute.rootfs_size_gb,
                };
                self.compute.create(&unit).await.map_err(external)?;
                Ok(StageAction::Performed)
            }
            ProvisionStage::StorageAttached => {
                self.compute
                    .attach_volume(spec.id, &spec.host_path, &spec.mount_path)
                    .await
                    .map_err(external)?;
                Ok(StageAction::Performed)
            }
            ProvisionStage::ComputeRunning => {
                let current = self.compute.health(spec.id).await.map_err(external)?;
                let action = if current.is_up() {
                    StageAction::Skipped
                } else {
                    self.compute.start(spec.id).await.map_err(external)?;
                    StageAction::Performed
                };
                if let Some(warning) = self.wait_until_up(spec.id, &ctx).await {
                    warnings.push(warning);
                }
                Ok(action)
            }
            ProvisionStage::SystemBootstrapped => {
                self.compute
                    .exec_bootstrap(spec.id, &self.config.compute.timezone)
                    .await
                    .map_err(external)?;
                Ok(StageAction::Performed)
            }
            ProvisionStage::PlatformInstalled => {
                if installer.installed(spec.id).await.map_err(external)? {
                    station_info!(context = ctx, "platform already installed");
                    return Ok(StageAction::Skipped);
                }
                installer
                    .install(
                        spec.id,
                        &spec.mount_path,
                        &spec.install_path,
                        spec.version.as_deref(),
                    )
                    .await
                    .map_err(external)?;
                Ok(StageAction::Performed)
            }
            ProvisionStage::Requested
            | ProvisionStage::Validated
            | ProvisionStage::Registered
            | ProvisionStage::Failed => Ok(StageAction::Skipped),
        }
    }

    /// Bounded health poll. Returns a warning instead of failing on timeout.
    async fn wait_until_up(&self, id: u32, ctx: &LogContext<'_>) -> Option<String> {
        let attempts = self.config.compute.health_poll_attempts.max(1);
        let interval = self.config.compute.health_poll_interval;
        for attempt in 1..=attempts {
            match self.compute.health(id).await {
                Ok(HealthState::Running) => return None,
                Ok(HealthState::Degraded) => {
                    station_warn!(context = *ctx, "compute unit is up but degraded");
                    return None;
                }
                Ok(state) => station_debug!(
                    context = *ctx,
                    "health check {attempt}/{attempts}: {state}"
                ),
                Err(err) => station_debug!(
                    context = *ctx,
                    "health check {attempt}/{attempts} failed: {err:#}"
                ),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        let warning = format!(
            "compute unit {id} did not report running after {attempts} checks; continuing"
        );
        station_warn!(context = *ctx, "{warning}");
        Some(warning)
    }

    /// `Registered`: upsert keyed by id. A re-registration keeps the original creation date.
    fn register(&self, spec: &StationSpec) -> Result<StationRecord> {
        let created_date = match self.inventory.find(spec.id)? {
            Some(existing) => existing.created_date,
            None => Utc::now().date_naive(),
        };
        let record = StationRecord::new(
            spec.id,
            spec.platform,
            &spec.station_name,
            spec.address.clone(),
            spec.description.clone(),
            created_date,
        )?;
        self.inventory.upsert(&record)?;
        Ok(record)
    }

    fn stage_completed(&self, spec: &StationSpec, stage: ProvisionStage, action: StageAction) {
        let message = match action {
            StageAction::Performed => "",
            StageAction::Skipped => "already satisfied",
        };
        let outcome = match action {
            StageAction::Performed => JournalOutcome::Completed,
            StageAction::Skipped => JournalOutcome::Skipped,
        };
        station_info!(
            context = LogContext::new()
                .with_station(spec.id)
                .with_platform(spec.platform.as_str())
                .with_operation("deploy")
                .with_stage(stage.as_str()),
            "stage {stage} {}",
            if action == StageAction::Skipped { "skipped" } else { "completed" }
        );
        self.journal_stage(spec, stage, outcome, message);
    }

    fn stage_failed(
        &self,
        id: u32,
        platform: Platform,
        stage: ProvisionStage,
        err: LifecycleError,
    ) -> LifecycleError {
        let ctx = LogContext::new()
            .with_station(id)
            .with_platform(platform.as_str())
            .with_operation("deploy")
            .with_stage(stage.as_str());
        station_error!(context = ctx, "provisioning failed: {err}");
        log_system_event(
            Some(&ctx),
            "station.deploy_failed",
            &err.to_string(),
            SystemEventOutcome::Fault,
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_stage_failure(stage.as_str());
        }
        self.journal(
            JournalEntry::new(id, "deploy", JournalOutcome::Failed)
                .with_stage(stage.as_str())
                .with_message(err.to_string()),
        );
        err
    }

    fn journal_stage(
        &self,
        spec: &StationSpec,
        stage: ProvisionStage,
        outcome: JournalOutcome,
        message: &str,
    ) {
        self.journal(
            JournalEntry::new(spec.id, "deploy", outcome)
                .with_stage(stage.as_str())
                .with_message(message),
        );
    }

    /// Journal writes are best effort; the inventory stays authoritative.
    fn journal(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.append(entry) {
                warn!(error = %err, "failed to append lifecycle journal entry");
            }
        }
    }

    /// Stop, destroy, deregister, then optionally destroy the volume.
    pub async fn teardown(
        &self,
        id: u32,
        options: TeardownOptions,
        confirmer: &dyn Confirmer,
    ) -> Result<TeardownReport> {
        let result = self.teardown_inner(id, options, confirmer).await;
        if let Some(metrics) = &self.metrics {
            if !matches!(result, Err(LifecycleError::ConfirmationDeclined)) {
                metrics.record_teardown(result.is_ok());
            }
        }
        if let Err(err) = &result {
            if !matches!(err, LifecycleError::ConfirmationDeclined) {
                self.journal(
                    JournalEntry::new(id, "teardown", JournalOutcome::Failed)
                        .with_message(err.to_string()),
                );
            }
        }
        result
    }

    async fn teardown_inner(
        &self,
        id: u32,
        options: TeardownOptions,
        confirmer: &dyn Confirmer,
    ) -> Result<TeardownReport> {
        let record = self.inventory.get(id)?;
        let dataset = self.config.storage.dataset_path(&record.hostname);
        let host_path = self.config.storage.host_path(&record.hostname);
        let ctx = LogContext::new()
            .with_station(id)
            .with_platform(record.platform.as_str())
            .with_operation("teardown");

        if !options.force {
            let volume_note = if options.purge_data {
                "destroyed after a second confirmation"
            } else {
                "kept"
            };
            let prompt = format!(
                "Remove station {} ({}, {})? Compute unit {} will be destroyed and volume {} {}.",
                id, record.hostname, record.address, id, dataset, volume_note
            );
            let confirmed = confirmer
                .confirm(&prompt)
                .map_err(|err| LifecycleError::external("confirm", err))?;
            if !confirmed {
                station_info!(context = ctx, "teardown declined by operator");
                return Err(LifecycleError::ConfirmationDeclined);
            }
        }
        self.journal(JournalEntry::new(id, "teardown", JournalOutcome::Started));

        let exists = self
            .compute
            .exists(id)
            .await
            .map_err(|err| LifecycleError::external("teardown", err))?;
        let compute_destroyed = if exists {
            let health = self
                .compute
                .health(id)
                .await
                .map_err(|err| LifecycleError::external("stop", err))?;
            if health.is_up() {
                self.compute
                    .stop(id, self.config.compute.stop_timeout)
                    .await
                    .map_err(|err| LifecycleError::external("stop", err))?;
            }
            self.compute
                .destroy(id)
                .await
                .map_err(|err| LifecycleError::external("destroy", err))?;
            true
        } else {
            station_warn!(context = ctx, "compute unit {id} was already gone");
            false
        };

        self.inventory.remove(id)?;
        station_info!(context = ctx, "{} removed from inventory", record.hostname);

        let volume = if options.purge_data {
            let confirmed = options.force
                || confirmer
                    .confirm(&format!(
                        "Permanently destroy volume {dataset} and all data for {}?",
                        record.hostname
                    ))
                    .map_err(|err| LifecycleError::external("confirm", err))?;
            if !confirmed {
                VolumeDisposition::Preserved {
                    dataset: dataset.clone(),
                    host_path: host_path.clone(),
                }
            } else if self
                .storage
                .volume_exists(&dataset)
                .await
                .map_err(|err| LifecycleError::external("destroy_volume", err))?
            {
                self.storage
                    .destroy_volume(&dataset)
                    .await
                    .map_err(|err| LifecycleError::external("destroy_volume", err))?;
                VolumeDisposition::Destroyed {
                    dataset: dataset.clone(),
                }
            } else {
                VolumeDisposition::Absent {
                    dataset: dataset.clone(),
                }
            }
        } else {
            VolumeDisposition::Preserved {
                dataset: dataset.clone(),
                host_path: host_path.clone(),
            }
        };

        let message = match &volume {
            VolumeDisposition::Preserved { host_path, .. } => {
                format!("volume preserved at {}", host_path.display())
            }
            VolumeDisposition::Destroyed { dataset } => format!("volume {dataset} destroyed"),
            VolumeDisposition::Absent { dataset } => format!("volume {dataset} did not exist"),
        };
        self.journal(
            JournalEntry::new(id, "teardown", JournalOutcome::Completed).with_message(&message),
        );
        log_system_event(
            Some(&ctx),
            "station.removed",
            &message,
            SystemEventOutcome::Success,
        );
        Ok(TeardownReport {
            id,
            hostname: record.hostname,
            compute_destroyed,
            volume,
        })
    }

    /// Delegate to the platform's update capability.
    pub async fn update(&self, id: u32) -> Result<()> {
        let record = self.inventory.get(id)?;
        let installer = self.platforms.resolve(record.platform)?;
        let ctx = LogContext::new()
            .with_station(id)
            .with_platform(record.platform.as_str())
            .with_operation("update");
        match installer.update(id).await {
            Ok(()) => {
                self.journal(JournalEntry::new(id, "update", JournalOutcome::Completed));
                log_system_event(
                    Some(&ctx),
                    "station.updated",
                    &record.hostname,
                    SystemEventOutcome::Success,
                );
                Ok(())
            }
            Err(err) => {
                let err = LifecycleError::external("update", err);
                self.journal(
                    JournalEntry::new(id, "update", JournalOutcome::Failed)
                        .with_message(err.to_string()),
                );
                log_system_event(
                    Some(&ctx),
                    "station.update_failed",
                    &err.to_string(),
                    SystemEventOutcome::Fault,
                );
                Err(err)
            }
        }
    }

    /// Run every sub-operation of `mode`; failures are reported per step.
    pub async fn backup(&self, id: u32, mode: BackupMode) -> Result<BackupReport> {
        let record = self.inventory.get(id)?;
        let installer = if mode.includes_application() {
            Some(self.platforms.resolve(record.platform)?)
        } else {
            None
        };
        let ctx = LogContext::new()
            .with_station(id)
            .with_platform(record.platform.as_str())
            .with_operation("backup");
        let mut steps = Vec::new();

        if mode.includes_compute() {
            steps.push(step_outcome(
                BackupStep::Compute,
                self.compute.snapshot_backup(id).await,
            ));
        }
        if let Some(installer) = installer {
            steps.push(step_outcome(
                BackupStep::Application,
                installer.backup(id).await,
            ));
        }
        if mode == BackupMode::Full {
            let dataset = self.config.storage.dataset_path(&record.hostname);
            let result: anyhow::Result<String> = async {
                let name = self.fresh_snapshot_name(&dataset).await?;
                self.storage.snapshot(&dataset, &name).await?;
                Ok(format!("{dataset}@{name}"))
            }
            .await;
            steps.push(step_outcome(BackupStep::VolumeSnapshot, result));
        }

        let report = BackupReport { id, mode, steps };
        for step in &report.steps {
            let outcome = if step.succeeded {
                JournalOutcome::Completed
            } else {
                JournalOutcome::Failed
            };
            self.journal(
                JournalEntry::new(id, "backup", outcome)
                    .with_stage(step.step.to_string())
                    .with_message(&step.detail),
            );
        }
        if report.is_complete() {
            log_system_event(
                Some(&ctx),
                "station.backed_up",
                &format!("{mode} backup completed"),
                SystemEventOutcome::Success,
            );
        } else {
            log_system_event(
                Some(&ctx),
                "station.backup_incomplete",
                &report.failure_summary(),
                SystemEventOutcome::Fault,
            );
        }
        Ok(report)
    }

    /// `backup-<UTC timestamp to the microsecond>Z`, bumped while the name is taken.
    async fn fresh_snapshot_name(&self, dataset: &str) -> anyhow::Result<String> {
        let mut stamp = Utc::now();
        loop {
            let name = format!("backup-{}", stamp.format(SNAPSHOT_FORMAT));
            if !self.storage.snapshot_exists(dataset, &name).await? {
                return Ok(name);
            }
            stamp += chrono::Duration::microseconds(1);
        }
    }

    async fn live_health(&self, id: u32) -> Result<HealthState> {
        let exists = self
            .compute
            .exists(id)
            .await
            .map_err(|err| LifecycleError::external("status", err))?;
        if !exists {
            return Ok(HealthState::Unknown);
        }
        self.compute
            .health(id)
            .await
            .map_err(|err| LifecycleError::external("status", err))
    }

    /// Sync the recorded status with live health. Maintenance is left alone.
    pub async fn status(&self, id: u32) -> Result<StatusReport> {
        let record = self.inventory.get(id)?;
        let health = self.live_health(id).await?;
        let current = match (record.status, health) {
            (StationStatus::Maintenance, _) => StationStatus::Maintenance,
            (_, HealthState::Running | HealthState::Degraded) => StationStatus::Active,
            (_, HealthState::Stopped) => StationStatus::Stopped,
            (_, HealthState::Unknown) => StationStatus::Error,
        };
        if current != record.status {
            self.inventory.set_status(id, current)?;
            station_info!(
                context = LogContext::new().with_station(id).with_operation("status"),
                "status changed from {} to {}",
                record.status,
                current
            );
        }
        Ok(StatusReport {
            id,
            health,
            previous: record.status,
            current,
        })
    }

    pub fn set_status(&self, id: u32, status: StationStatus) -> Result<StationRecord> {
        let record = self.inventory.set_status(id, status)?;
        self.journal(
            JournalEntry::new(id, "set_status", JournalOutcome::Completed)
                .with_message(status.to_string()),
        );
        Ok(record)
    }

    pub async fn info(&self, id: u32, journal_entries: usize) -> Result<StationInfo> {
        let record = self.inventory.get(id)?;
        let health = self.live_health(id).await?;
        let journal = match &self.journal {
            Some(journal) => journal.entries_for(id, journal_entries)?,
            None => Vec::new(),
        };
        Ok(StationInfo {
            dataset_path: self.config.storage.dataset_path(&record.hostname),
            host_path: self.config.storage.host_path(&record.hostname),
            mount_path: self
                .config
                .platforms
                .get(record.platform)
                .map(|platform| platform.mount_path.clone()),
            record,
            health,
            journal,
        })
    }

    pub async fn logs(&self, id: u32, lines: usize) -> Result<String> {
        let record = self.inventory.get(id)?;
        let installer = self.platforms.resolve(record.platform)?;
        installer
            .logs(id, lines)
            .await
            .map_err(|err| LifecycleError::external("logs", err))
    }

    /// Stop, roll the volume back to `snapshot`, start again.
    pub async fn restore(
        &self,
        id: u32,
        snapshot: &str,
        force: bool,
        confirmer: &dyn Confirmer,
    ) -> Result<()> {
        let record = self.inventory.get(id)?;
        let dataset = self.config.storage.dataset_path(&record.hostname);
        let found = self
            .storage
            .snapshot_exists(&dataset, snapshot)
            .await
            .map_err(|err| LifecycleError::external("restore", err))?;
        if !found {
            return Err(LifecycleError::NotFound(format!(
                "snapshot {dataset}@{snapshot}"
            )));
        }
        if !force {
            let prompt = format!(
                "Roll {} back to {dataset}@{snapshot}? Changes made after the snapshot are lost.",
                record.hostname
            );
            if !confirmer
                .confirm(&prompt)
                .map_err(|err| LifecycleError::external("confirm", err))?
            {
                return Err(LifecycleError::ConfirmationDeclined);
            }
        }

        let exists = self
            .compute
            .exists(id)
            .await
            .map_err(|err| LifecycleError::external("restore", err))?;
        if exists {
            let health = self
                .compute
                .health(id)
                .await
                .map_err(|err| LifecycleError::external("stop", err))?;
            if health.is_up() {
                self.compute
                    .stop(id, self.config.compute.stop_timeout)
                    .await
                    .map_err(|err| LifecycleError::external("stop", err))?;
            }
        }
        if let Err(err) = self.storage.rollback(&dataset, snapshot).await {
            let err = LifecycleError::external("rollback", err);
            self.journal(
                JournalEntry::new(id, "restore", JournalOutcome::Failed)
                    .with_message(err.to_string()),
            );
            return Err(err);
        }
        if exists {
            self.compute
                .start(id)
                .await
                .map_err(|err| LifecycleError::external("start", err))?;
        }
        self.journal(
            JournalEntry::new(id, "restore", JournalOutcome::Completed).with_message(snapshot),
        );
        log_system_event(
            Some(
                &LogContext::new()
                    .with_station(id)
                    .with_platform(record.platform.as_str())
                    .with_operation("restore"),
            ),
            "station.restored",
            &format!("rolled back to {snapshot}"),
            SystemEventOutcome::Success,
        );
        Ok(())
    }

    /// Ids in the store whose compute unit exists. A failed lookup aborts rather
    /// than counting the station as gone.
    async fn live_ids(&self) -> Result<HashSet<u32>> {
        let mut live = HashSet::new();
        for id in self.inventory.scan_ids()? {
            let exists = self
                .compute
                .exists(id)
                .await
                .map_err(|err| LifecycleError::external("inventory_check", err))?;
            if exists {
                live.insert(id);
            }
        }
        Ok(live)
    }

    pub async fn validate_inventory(&self) -> Result<ValidationReport> {
        let live = self.live_ids().await?;
        Ok(self.inventory.validate(&|id| live.contains(&id))?)
    }

    /// Drop orphaned records and return them.
    pub async fn reconcile_inventory(&self) -> Result<Vec<StationRecord>> {
        let live = self.live_ids().await?;
        let removed = self.inventory.reconcile(&|id| live.contains(&id))?;
        for record in &removed {
            self.journal(
                JournalEntry::new(record.id, "reconcile", JournalOutcome::Completed)
                    .with_message(format!("removed orphaned record {}", record.hostname)),
            );
        }
        Ok(removed)
    }
}

fn step_outcome(step: BackupStep, result: anyhow::Result<String>) -> BackupStepOutcome {
    match result {
        Ok(detail) => BackupStepOutcome {
            step,
            succeeded: true,
            detail,
        },
        Err(err) => BackupStepOutcome {
            step,
            succeeded: false,
            detail: format!("{err:#}"),
        },
    }
}
