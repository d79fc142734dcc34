//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Tracing bootstrap: stderr console plus a rolling JSON station log."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RSL_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Worker guards must outlive the process or buffered lines are lost on exit.
static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console log formats. The station log file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

/// Filter from `RSL_LOG`, then `RUST_LOG`, then `info`. The second value
/// carries a complaint about an unparseable `RSL_LOG`.
fn resolve_filter(custom: Option<String>) -> (EnvFilter, Option<String>) {
    match custom {
        Some(directive) => match EnvFilter::try_new(&directive) {
            Ok(filter) => (filter, None),
            Err(err) => (
                EnvFilter::new(DEFAULT_DIRECTIVE),
                Some(format!("ignoring invalid {LOG_ENV}={directive:?}: {err}")),
            ),
        },
        None => (
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
            None,
        ),
    }
}

fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let stem = config.file_prefix.as_deref().unwrap_or(service_name);
    format!("{stem}.log")
}

/// Install the global subscriber for `service_name`.
///
/// Console output goes to stderr so command output on stdout stays
/// scriptable. The daily rolling file under `config.directory` keeps a record
/// of partially provisioned stations. A second call is a no-op.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    ensure_directory(&config.directory)?;

    let appender = daily(&config.directory, log_file_name(service_name, config));
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = GUARDS.set((file_guard, console_guard));

    let (filter, complaint) = resolve_filter(std::env::var(LOG_ENV).ok());

    let console = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(console_writer);
    let console = match config.format {
        LogFormat::StructuredJson => console.json().boxed(),
        LogFormat::Pretty => console.boxed(),
    };
    let station_log = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(station_log)
        .try_init()
        .ok();

    if let Some(complaint) = complaint {
        warn!("{complaint}");
    }
    debug!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    Ok(())
}

fn ensure_directory(directory: &Path) -> Result<()> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("creating log directory {}", directory.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(directory: &Path, prefix: Option<&str>) -> LoggingConfig {
        LoggingConfig {
            directory: directory.to_path_buf(),
            format: LogFormat::StructuredJson,
            file_prefix: prefix.map(str::to_owned),
        }
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempdir().unwrap();
        let config = config(&dir.path().join("logs"), Some("test"));
        init_tracing("rslctl", &config).unwrap();
        assert!(config.directory.is_dir());
    }

    #[test]
    fn file_name_prefers_configured_prefix() {
        let dir = tempdir().unwrap();
        assert_eq!(log_file_name("rslctl", &config(dir.path(), None)), "rslctl.log");
        assert_eq!(
            log_file_name("rslctl", &config(dir.path(), Some("stations"))),
            "stations.log"
        );
    }

    #[test]
    fn bad_custom_directive_falls_back_with_a_complaint() {
        let (_, complaint) = resolve_filter(Some("debug,rsl_core=trace".to_owned()));
        assert!(complaint.is_none());
        let (_, complaint) = resolve_filter(Some("rsl_core=loud".to_owned()));
        assert!(complaint.unwrap().contains(LOG_ENV));
    }
}
