//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Process execution seam for host adapters."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs host programs. Adapters never spawn processes directly.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Run to completion. A non-zero exit is not an error at this level.
    async fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput>;

    /// Run and fail on a non-zero exit, returning trimmed stdout.
    async fn run_checked(&self, program: &str, args: &[String]) -> anyhow::Result<String> {
        let output = self.run(program, args).await?;
        if !output.success() {
            let detail = output.stderr.trim();
            let detail = if detail.is_empty() {
                output.stdout.trim()
            } else {
                detail
            };
            bail!(
                "`{}` exited with {}: {}",
                command_line(program, args),
                output
                    .code
                    .map_or_else(|| "signal".to_owned(), |code| code.to_string()),
                detail
            );
        }
        Ok(output.stdout.trim().to_owned())
    }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        debug!(command = %command_line(program, args), "running host command");
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| anyhow!("`{program}` timed out after {}s", limit.as_secs()))?,
            None => command.output().await,
        }
        .with_context(|| format!("failed to spawn {program}"))?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Records every command line and replays scripted outputs.
///
/// A response registered for a prefix answers every command line starting with
/// it, the longest matching prefix winning. Queued responses are consumed first.
/// Anything unmatched succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    responses: Mutex<Vec<(String, CommandOutput)>>,
    queued: Mutex<VecDeque<(String, CommandOutput)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.responses.lock().push((prefix.to_owned(), output));
    }

    /// Answer the next matching command only.
    pub fn respond_once(&self, prefix: &str, output: CommandOutput) {
        self.queued.lock().push_back((prefix.to_owned(), output));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        let line = command_line(program, args);
        self.calls.lock().push(line.clone());

        let mut queued = self.queued.lock();
        if let Some(index) = queued.iter().position(|(prefix, _)| line.starts_with(prefix)) {
            if let Some((_, output)) = queued.remove(index) {
                return Ok(output);
            }
        }
        drop(queued);

        Ok(self
            .responses
            .lock()
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

/// Space-joined command line, for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build an owned argument vector from anything displayable.
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($arg.to_string()),*]
    };
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "/._-=:@%+,".contains(ch))
    {
        return value.to_owned();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longest_prefix_wins_and_queue_is_consumed_first() {
        let runner = RecordingRunner::new();
        runner.respond("pct", CommandOutput::ok("generic"));
        runner.respond("pct status 101", CommandOutput::ok("status: running"));
        runner.respond_once("pct status", CommandOutput::failed(2, "gone"));

        let first = runner.run("pct", &args!["status", 101]).await.unwrap();
        assert_eq!(first.stderr, "gone");
        let second = runner.run("pct", &args!["status", 101]).await.unwrap();
        assert_eq!(second.stdout, "status: running");
        let other = runner.run("pct", &args!["list"]).await.unwrap();
        assert_eq!(other.stdout, "generic");
        let unmatched = runner.run("zfs", &args!["list"]).await.unwrap();
        assert!(unmatched.success());
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn checked_run_reports_stderr() {
        let runner = RecordingRunner::new();
        runner.respond("zfs destroy", CommandOutput::failed(1, "dataset is busy\n"));
        let err = runner
            .run_checked("zfs", &args!["destroy", "tank/radio/x"])
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("zfs destroy tank/radio/x"));
        assert!(message.contains("dataset is busy"));
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("/var/azuracast"), "/var/azuracast");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
    }
}
