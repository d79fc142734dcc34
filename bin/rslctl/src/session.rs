//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "binary"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Per-invocation wiring of config, inventory and host adapters."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rsl_common::{init_tracing, AppConfig};
use rsl_core::{new_registry, AssumeYes, Confirmer, LifecycleMetrics, LifecycleOrchestrator};
use rsl_host::{HostAdapters, SystemRunner};
use rsl_inventory::{CsvInventory, Journal};
use tracing::{debug, info, warn};

use crate::confirm::TerminalConfirmer;
use crate::output::Printer;

/// Searched in order when neither `--config` nor `RSL_CONFIG` is given.
pub const DEFAULT_CONFIG_CANDIDATES: [&str; 2] = ["/etc/rsl/rsl.toml", "rsl.toml"];

/// Everything one command needs, built once per invocation.
pub struct Session {
    pub orchestrator: LifecycleOrchestrator,
    pub printer: Printer,
    confirmer: Box<dyn Confirmer>,
    metrics: Option<(LifecycleMetrics, PathBuf)>,
}

impl Session {
    pub fn open(
        config_path: Option<&Path>,
        assume_yes: bool,
        confirm_word: Option<String>,
        json: bool,
    ) -> Result<Self> {
        let (config, source) = match config_path {
            Some(path) => (AppConfig::from_path(path)?, Some(path.to_path_buf())),
            None => {
                let loaded = AppConfig::load_or_default(&DEFAULT_CONFIG_CANDIDATES)?;
                (loaded.config, loaded.source)
            }
        };

        if let Err(err) = init_tracing("rslctl", &config.logging) {
            rsl_logging::init();
            warn!(error = %err, directory = %config.logging.directory.display(), "file logging unavailable; logging to stderr only");
        }
        match &source {
            Some(path) => info!(config = %path.display(), "configuration loaded"),
            None => debug!("no configuration file found; using built-in defaults"),
        }

        let inventory = CsvInventory::from_config(&config.inventory).with_context(|| {
            format!("opening inventory {}", config.inventory.path.display())
        })?;
        let journal_path = config.inventory.journal_path();
        let journal = Journal::open(&journal_path)
            .with_context(|| format!("opening journal {}", journal_path.display()))?;

        let adapters = HostAdapters::new(Arc::new(SystemRunner::new()), &config);
        let config = Arc::new(config);
        let mut orchestrator = LifecycleOrchestrator::new(
            config.clone(),
            Arc::new(inventory),
            adapters.compute,
            adapters.storage,
            adapters.platforms,
        )
        .with_journal(Arc::new(journal));

        let metrics = match &config.metrics.textfile {
            Some(path) => {
                let metrics = LifecycleMetrics::new(new_registry())
                    .context("registering lifecycle metrics")?;
                orchestrator = orchestrator.with_metrics(metrics.clone());
                Some((metrics, path.clone()))
            }
            None => None,
        };

        let confirmer: Box<dyn Confirmer> = if assume_yes {
            Box::new(AssumeYes::new(confirm_word))
        } else {
            if confirm_word.is_some() {
                warn!("--confirm only applies together with --yes; prompting instead");
            }
            Box::new(TerminalConfirmer)
        };

        Ok(Self {
            orchestrator,
            printer: Printer::new(json),
            confirmer,
            metrics,
        })
    }

    pub fn confirmer(&self) -> &dyn Confirmer {
        self.confirmer.as_ref()
    }

    /// Write the textfile exposition if one is configured. Failures only warn.
    pub fn flush_metrics(&self) {
        if let Some((metrics, path)) = &self.metrics {
            if let Err(err) = metrics.write_textfile(path) {
                warn!(error = %err, path = %path.display(), "failed to write metrics textfile");
            }
        }
    }
}
