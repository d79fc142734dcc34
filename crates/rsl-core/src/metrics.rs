//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Prometheus counters for lifecycle operations."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};

/// Shared registry type.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Counters published by the orchestrator and bulk executor.
#[derive(Clone)]
pub struct LifecycleMetrics {
    deployments: IntCounterVec,
    stage_failures: IntCounterVec,
    teardowns: IntCounterVec,
    bulk_outcomes: IntCounterVec,
    registry: SharedRegistry,
}

impl LifecycleMetrics {
    pub fn new(registry: SharedRegistry) -> prometheus::Result<Self> {
        let deployments = IntCounterVec::new(
            Opts::new(
                "rsl_deployments_total",
                "Station deployments by platform and outcome",
            ),
            &["platform", "outcome"],
        )?;
        registry.register(Box::new(deployments.clone()))?;

        let stage_failures = IntCounterVec::new(
            Opts::new(
                "rsl_provision_stage_failures_total",
                "Provisioning failures by the stage that failed",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(stage_failures.clone()))?;

        let teardowns = IntCounterVec::new(
            Opts::new("rsl_teardowns_total", "Station teardowns by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(teardowns.clone()))?;

        let bulk_outcomes = IntCounterVec::new(
            Opts::new(
                "rsl_bulk_station_outcomes_total",
                "Per-station results of bulk operations",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(bulk_outcomes.clone()))?;

        Ok(Self {
            deployments,
            stage_failures,
            teardowns,
            bulk_outcomes,
            registry,
        })
    }

    pub fn record_deployment(&self, platform: &str, succeeded: bool) {
        self.deployments
            .with_label_values(&[platform, outcome_label(succeeded)])
            .inc();
    }

    pub fn record_stage_failure(&self, stage: &str) {
        self.stage_failures.with_label_values(&[stage]).inc();
    }

    pub fn record_teardown(&self, succeeded: bool) {
        self.teardowns
            .with_label_values(&[outcome_label(succeeded)])
            .inc();
    }

    pub fn record_bulk_outcome(&self, operation: &str, succeeded: bool) {
        self.bulk_outcomes
            .with_label_values(&[operation, outcome_label(succeeded)])
            .inc();
    }

    /// Text exposition of everything in the registry.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    /// Write the exposition for a node-exporter textfile collector.
    ///
    /// Written to a sibling temp file and renamed so scrapes never see a partial file.
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        let body = self.render()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let staging = path.with_extension("prom.tmp");
        let mut file = fs::File::create(&staging)?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

fn outcome_label(succeeded: bool) -> &'static str {
    if succeeded {
        "success"
    } else {
        "failure"
    }
}

impl std::fmt::Debug for LifecycleMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleMetrics").finish_non_exhaustive()
    }
}
