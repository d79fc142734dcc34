//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Structured logging adapters and sinks."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Station-aware logging helpers. Every lifecycle event carries the same
//! field set (`station`, `platform`, `operation`, `stage`) so log queries can
//! reconstruct what happened to one station across runs.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Station identifier associated with the log event.
    pub station: Option<u32>,
    /// Platform name of the station.
    pub platform: Option<&'a str>,
    /// Lifecycle operation (deploy, teardown, update, ...).
    pub operation: Option<&'a str>,
    /// Provisioning stage, when the event belongs to one.
    pub stage: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a station identifier.
    pub fn with_station(mut self, station: u32) -> Self {
        self.station = Some(station);
        self
    }

    /// Attach a platform name.
    pub fn with_platform(mut self, platform: &'a str) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Attach the lifecycle operation.
    pub fn with_operation(mut self, operation: &'a str) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attach a provisioning stage.
    pub fn with_stage(mut self, stage: &'a str) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation completed but something needs operator attention.
    Degraded,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Degraded => "degraded",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with an outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    let station = ctx.station.unwrap_or_default();
    let platform = ctx.platform.unwrap_or("");
    let operation = ctx.operation.unwrap_or("");
    let stage = ctx.stage.unwrap_or("");
    // `tracing::event!` needs a constant level, hence one arm per outcome.
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            station,
            platform,
            operation,
            stage,
            message = %message
        ),
        SystemEventOutcome::Degraded => tracing::event!(
            Level::WARN,
            event,
            outcome = outcome.as_str(),
            station,
            platform,
            operation,
            stage,
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            station,
            platform,
            operation,
            stage,
            message = %message
        ),
    }
}
