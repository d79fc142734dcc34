//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "binary"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Operator CLI for the station lifecycle."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use rsl_core::{ErrorKind, LifecycleError};
use tracing::error;

mod confirm;
mod output;
mod session;
mod station;

use session::Session;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Radio station lifecycle control utility",
    long_about = None
)]
struct Cli {
    /// Configuration file (overrides RSL_CONFIG and the default search path).
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Answer yes to every confirmation prompt.
    #[arg(short = 'y', long, global = true, action = ArgAction::SetTrue)]
    yes: bool,
    /// Word to answer a typed confirmation with under --yes (purge-all needs PURGE).
    #[arg(long = "confirm", global = true, value_name = "WORD")]
    confirm_word: Option<String>,
    /// Print results as JSON.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,
    #[command(subcommand)]
    command: station::Command,
}

/// Exit codes beyond success. Clap uses 2 for usage errors.
const EXIT_FAILED: u8 = 1;
const EXIT_DECLINED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let session = Session::open(cli.config.as_deref(), cli.yes, cli.confirm_word, cli.json)?;
    let result = station::run(&session, cli.command).await;
    session.flush_metrics();
    result
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LifecycleError>().map(LifecycleError::kind) {
        Some(ErrorKind::ConfirmationDeclined) => EXIT_DECLINED,
        _ => EXIT_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn declined_maps_to_its_own_exit_code() {
        let declined = anyhow::Error::new(LifecycleError::ConfirmationDeclined);
        assert_eq!(exit_code_for(&declined), EXIT_DECLINED);
        let failed = anyhow::Error::new(LifecycleError::validation("bad name"));
        assert_eq!(exit_code_for(&failed), EXIT_FAILED);
    }

    #[test]
    fn bulk_targets_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["rslctl", "update", "340"]).is_ok());
        assert!(Cli::try_parse_from(["rslctl", "update", "--platform", "libretime"]).is_ok());
        assert!(Cli::try_parse_from(["rslctl", "update", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["rslctl", "update", "340", "--all"]).is_err());
        assert!(Cli::try_parse_from(["rslctl", "update"]).is_err());
        assert!(Cli::try_parse_from(["rslctl", "backup", "--all", "--mode", "nightly"]).is_err());
    }

    #[test]
    fn deploy_defaults_quota() {
        let cli = Cli::try_parse_from([
            "rslctl", "--yes", "deploy", "--name", "main", "--platform", "azuracast",
        ])
        .unwrap();
        assert!(cli.yes);
        match cli.command {
            station::Command::Deploy(args) => assert_eq!(args.quota.to_string(), "100G"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn confirm_word_is_taken_literally() {
        let cli = Cli::try_parse_from(["rslctl", "-y", "purge-all"]).unwrap();
        assert!(cli.yes);
        assert_eq!(cli.confirm_word, None);

        let cli = Cli::try_parse_from(["rslctl", "-y", "--confirm", "PURGE", "purge-all"]).unwrap();
        assert_eq!(cli.confirm_word.as_deref(), Some("PURGE"));
    }
}
