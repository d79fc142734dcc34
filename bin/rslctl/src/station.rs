//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "binary"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Station subcommands and their dispatch onto the orchestrator."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use rsl_common::Platform;
use rsl_core::{
    BackupMode, BulkExecutor, BulkOperation, DeployRequest, LifecycleError, Quota,
    TeardownOptions,
};
use rsl_inventory::{StationFilter, StationStatus};
use rsl_logging::{log_system_event, LogContext, SystemEventOutcome};
use serde::Serialize;
use serde_json::json;

use crate::output;
use crate::session::Session;

const DEFAULT_QUOTA: &str = "100G";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision a new station end to end.
    Deploy(DeployArgs),
    /// Stop and destroy stations; data is kept unless --purge is given.
    Remove(RemoveArgs),
    /// Run the platform's own update procedure.
    Update(TargetArgs),
    /// Back up stations.
    Backup(BackupArgs),
    /// Check live health and sync the recorded status.
    Status(TargetArgs),
    /// List registered stations.
    List(ListArgs),
    /// Show everything known about one station.
    Info(InfoArgs),
    /// Print recent platform logs from a station.
    Logs(LogsArgs),
    /// Check the inventory for duplicates, malformed rows and orphans.
    Validate,
    /// Drop inventory records whose container no longer exists.
    Reconcile,
    /// Remove every selected station and destroy its data.
    #[command(name = "purge-all")]
    PurgeAll(ListArgs),
    /// Print the next free station id.
    #[command(name = "next-id")]
    NextId,
    /// Set a station's recorded status explicitly.
    #[command(name = "set-status")]
    SetStatus(SetStatusArgs),
    /// Roll a station's data back to a named snapshot.
    Restore(RestoreArgs),
}

/// One station by id, every station of a platform, or every station.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Station id.
    id: Option<u32>,
    /// Every station running this platform.
    #[arg(long, value_name = "PLATFORM")]
    platform: Option<Platform>,
    /// Every registered station.
    #[arg(long)]
    all: bool,
}

impl TargetArgs {
    fn filter(&self) -> StationFilter {
        if self.all {
            StationFilter::All
        } else {
            StationFilter::from(self.platform)
        }
    }
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Station name; the hostname becomes <platform>-<name>.
    #[arg(long, value_name = "NAME")]
    pub name: String,
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Platform,
    /// Explicit station id; the next free id is used otherwise.
    #[arg(long, value_name = "ID")]
    pub id: Option<u32>,
    #[arg(long)]
    pub cores: Option<u32>,
    /// Memory in MiB.
    #[arg(long = "memory", value_name = "MIB")]
    pub memory_mb: Option<u32>,
    /// Storage quota, e.g. 500G.
    #[arg(long, default_value = DEFAULT_QUOTA)]
    pub quota: Quota,
    /// Last address octet; defaults to the station id.
    #[arg(long = "address-suffix", value_name = "N")]
    pub address_suffix: Option<u32>,
    #[arg(long, default_value = "")]
    pub description: String,
    /// Platform version or release channel.
    #[arg(long = "platform-version", value_name = "VERSION")]
    pub platform_version: Option<String>,
    /// Continue a deployment that failed part way.
    #[arg(long)]
    pub resume: bool,
}

impl DeployArgs {
    fn into_request(self) -> DeployRequest {
        let mut request = DeployRequest::new(self.name, self.platform, self.quota)
            .with_description(self.description);
        request.id = self.id;
        request.cores = self.cores;
        request.memory_mb = self.memory_mb;
        request.address_suffix = self.address_suffix;
        request.version = self.platform_version;
        request.resume = self.resume;
        request
    }
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Also destroy the station's data volume.
    #[arg(long)]
    purge: bool,
}

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// compute, application or full.
    #[arg(long, default_value = "full")]
    mode: BackupMode,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, value_name = "PLATFORM")]
    platform: Option<Platform>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    id: u32,
    /// Number of journal entries to show.
    #[arg(long, default_value_t = 10)]
    journal: usize,
}

#[derive(Debug, Args)]
pub struct LogsArgs {
    id: u32,
    #[arg(short = 'n', long, default_value_t = 100)]
    lines: usize,
}

#[derive(Debug, Args)]
pub struct SetStatusArgs {
    id: u32,
    /// active, stopped, error or maintenance.
    status: StationStatus,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    id: u32,
    /// Snapshot name without the dataset prefix.
    snapshot: String,
}

#[derive(Debug, Serialize)]
struct NextId {
    id: u32,
}

pub async fn run(session: &Session, command: Command) -> Result<ExitCode> {
    let orchestrator = &session.orchestrator;
    let printer = session.printer;
    match command {
        Command::Deploy(args) => {
            let request = args.into_request();
            let report = orchestrator.deploy(request).await?;
            printer.emit(&report, output::deploy)?;
        }
        Command::Remove(args) => {
            if let Some(id) = args.target.id {
                let options = TeardownOptions {
                    purge_data: args.purge,
                    force: false,
                };
                let report = orchestrator
                    .teardown(id, options, session.confirmer())
                    .await?;
                printer.emit(&report, output::teardown)?;
            } else {
                let operation = BulkOperation::Remove {
                    purge_data: args.purge,
                };
                return run_bulk(session, args.target.filter(), operation).await;
            }
        }
        Command::Update(target) => match target.id {
            Some(id) => {
                orchestrator.update(id).await?;
                printer.emit(&json!({ "id": id, "updated": true }), |_| {
                    format!("Station {id} updated.\n")
                })?;
            }
            None => return run_bulk(session, target.filter(), BulkOperation::Update).await,
        },
        Command::Backup(args) => match args.target.id {
            Some(id) => {
                let report = orchestrator.backup(id, args.mode).await?;
                printer.emit(&report, output::backup)?;
                if !report.is_complete() {
                    return Ok(ExitCode::FAILURE);
                }
            }
            None => {
                let operation = BulkOperation::Backup { mode: args.mode };
                return run_bulk(session, args.target.filter(), operation).await;
            }
        },
        Command::Status(target) => match target.id {
            Some(id) => {
                let report = orchestrator.status(id).await?;
                printer.emit(&report, output::status)?;
            }
            None => return run_bulk(session, target.filter(), BulkOperation::Status).await,
        },
        Command::List(args) => {
            let records = orchestrator.list(StationFilter::from(args.platform))?;
            printer.emit(&records, |records| output::records(records))?;
        }
        Command::Info(args) => {
            let info = orchestrator.info(args.id, args.journal).await?;
            printer.emit(&info, output::info)?;
        }
        Command::Logs(args) => {
            let logs = orchestrator.logs(args.id, args.lines).await?;
            printer.emit(&json!({ "id": args.id, "logs": logs }), |_| {
                format!("{}\n", logs.trim_end())
            })?;
        }
        Command::Validate => {
            let report = orchestrator.validate_inventory().await?;
            printer.emit(&report, output::validation)?;
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Reconcile => {
            let removed = orchestrator.reconcile_inventory().await?;
            printer.emit(&removed, |removed| output::reconciled(removed))?;
        }
        Command::PurgeAll(args) => {
            let operation = BulkOperation::Remove { purge_data: true };
            return run_bulk(session, StationFilter::from(args.platform), operation).await;
        }
        Command::NextId => {
            let id = orchestrator.next_id().await?;
            printer.emit(&NextId { id }, |next| format!("{}\n", next.id))?;
        }
        Command::SetStatus(args) => {
            let record = orchestrator.set_status(args.id, args.status)?;
            printer.emit(&record, |record| {
                format!("Station {} is now {}\n", record.id, record.status)
            })?;
        }
        Command::Restore(args) => {
            orchestrator
                .restore(args.id, &args.snapshot, false, session.confirmer())
                .await?;
            printer.emit(
                &json!({ "id": args.id, "snapshot": args.snapshot }),
                |_| format!("Station {} restored to {}.\n", args.id, args.snapshot),
            )?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_bulk(
    session: &Session,
    filter: StationFilter,
    operation: BulkOperation,
) -> Result<ExitCode> {
    let executor = BulkExecutor::from_config(session.orchestrator.clone());
    let report = match executor.run(filter, operation, session.confirmer()).await {
        Ok(report) => report,
        Err(LifecycleError::ConfirmationDeclined) => {
            let context = LogContext::new().with_operation(operation.name());
            log_system_event(
                Some(&context),
                "cli.bulk.declined",
                "operator declined bulk operation; nothing was changed",
                SystemEventOutcome::Fault,
            );
            return Err(LifecycleError::ConfirmationDeclined.into());
        }
        Err(err) => return Err(err.into()),
    };
    session.printer.emit(&report, output::bulk)?;
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
