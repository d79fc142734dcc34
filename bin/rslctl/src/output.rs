//! ---
//! rsl_section: "05-networking-external-interfaces"
//! rsl_subsection: "binary"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Human and JSON rendering of lifecycle reports."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt::Write as _;

use anyhow::{Context, Result};
use rsl_core::{
    BackupReport, BulkReport, DeployReport, StageAction, StationInfo, StatusReport,
    TeardownReport, VolumeDisposition,
};
use rsl_inventory::{StationRecord, ValidationReport};
use serde::Serialize;

/// Writes command results to stdout, as text or as one JSON document.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json {
            let rendered =
                serde_json::to_string_pretty(value).context("failed to serialise output")?;
            println!("{rendered}");
        } else {
            print!("{}", human(value));
        }
        Ok(())
    }
}

pub fn records(records: &[StationRecord]) -> String {
    if records.is_empty() {
        return "No stations registered.\n".to_owned();
    }
    let mut out = format!(
        "{:<8} {:<10} {:<28} {:<16} {:<12} {}\n",
        "ID", "PLATFORM", "HOSTNAME", "ADDRESS", "STATUS", "CREATED"
    );
    for record in records {
        let _ = writeln!(
            out,
            "{:<8} {:<10} {:<28} {:<16} {:<12} {}",
            record.id,
            record.platform.to_string(),
            record.hostname,
            record.address,
            record.status.to_string(),
            record.created_date
        );
    }
    out
}

pub fn deploy(report: &DeployReport) -> String {
    let record = &report.record;
    let mut out = format!(
        "Deployed {} (id {}) at {}\n",
        record.hostname, record.id, record.address
    );
    for stage in &report.stages {
        let action = match stage.action {
            StageAction::Performed => "done",
            StageAction::Skipped => "skipped",
        };
        let _ = writeln!(out, "  {:<22} {action}", stage.stage.to_string());
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    out
}

pub fn teardown(report: &TeardownReport) -> String {
    let compute = if report.compute_destroyed {
        "container destroyed"
    } else {
        "no container found"
    };
    let volume = match &report.volume {
        VolumeDisposition::Preserved { dataset, host_path } => {
            format!("data preserved in {dataset} ({})", host_path.display())
        }
        VolumeDisposition::Destroyed { dataset } => format!("dataset {dataset} destroyed"),
        VolumeDisposition::Absent { dataset } => format!("dataset {dataset} did not exist"),
    };
    format!(
        "Removed {} (id {}): {compute}; {volume}\n",
        report.hostname, report.id
    )
}

pub fn backup(report: &BackupReport) -> String {
    let mut out = format!("Backup of station {} ({}):\n", report.id, report.mode);
    for step in &report.steps {
        let state = if step.succeeded { "ok" } else { "FAILED" };
        let _ = writeln!(out, "  {:<16} {state:<7} {}", step.step.to_string(), step.detail);
    }
    out
}

pub fn status(report: &StatusReport) -> String {
    if report.changed() {
        format!(
            "Station {}: {} ({} -> {})\n",
            report.id, report.health, report.previous, report.current
        )
    } else {
        format!(
            "Station {}: {} ({})\n",
            report.id, report.health, report.current
        )
    }
}

pub fn info(info: &StationInfo) -> String {
    let record = &info.record;
    let mut out = String::new();
    let _ = writeln!(out, "Station {} ({})", record.id, record.hostname);
    let _ = writeln!(out, "  platform:    {}", record.platform);
    let _ = writeln!(out, "  address:     {}", record.address);
    let _ = writeln!(out, "  status:      {}", record.status);
    let _ = writeln!(out, "  health:      {}", info.health);
    let _ = writeln!(out, "  created:     {}", record.created_date);
    let _ = writeln!(out, "  description: {}", record.description);
    let _ = writeln!(out, "  dataset:     {}", info.dataset_path);
    let _ = writeln!(out, "  host path:   {}", info.host_path.display());
    if let Some(mount) = &info.mount_path {
        let _ = writeln!(out, "  mount path:  {}", mount.display());
    }
    if !info.journal.is_empty() {
        let _ = writeln!(out, "  recent activity:");
        for entry in &info.journal {
            let stage = entry.stage.as_deref().unwrap_or("-");
            let _ = writeln!(
                out,
                "    #{:<5} {} {:<10} {:<22} {:?} {}",
                entry.sequence,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.operation,
                stage,
                entry.outcome,
                entry.message
            );
        }
    }
    out
}

pub fn validation(report: &ValidationReport) -> String {
    if report.is_clean() {
        return format!("Inventory OK ({} records).\n", report.records_checked);
    }
    let mut out = format!(
        "Inventory has {} problem(s) across {} records:\n",
        report.violations.len(),
        report.records_checked
    );
    for violation in &report.violations {
        let _ = writeln!(out, "  - {violation}");
    }
    out
}

pub fn reconciled(removed: &[StationRecord]) -> String {
    if removed.is_empty() {
        return "Inventory already matches the host.\n".to_owned();
    }
    let mut out = format!("Removed {} orphaned record(s):\n", removed.len());
    for record in removed {
        let _ = writeln!(out, "  {} {}", record.id, record.hostname);
    }
    out
}

pub fn bulk(report: &BulkReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let state = if outcome.succeeded { "ok" } else { "FAILED" };
        let _ = writeln!(
            out,
            "  {:<8} {:<28} {state:<7} {}",
            outcome.id, outcome.hostname, outcome.message
        );
    }
    let _ = writeln!(
        out,
        "{}: {} succeeded, {} failed",
        report.operation, report.succeeded, report.failed
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsl_common::Platform;
    use rsl_inventory::StationStatus;

    fn sample() -> StationRecord {
        StationRecord::new(
            340,
            Platform::Azuracast,
            "main",
            "192.168.2.140",
            "Main studio",
            "2024-09-30".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn record_table_lists_every_station() {
        let mut second = sample();
        second.id = 341;
        second.platform = Platform::Libretime;
        second.hostname = "libretime-main".to_owned();
        second.status = StationStatus::Maintenance;
        let table = records(&[sample(), second]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("340"));
        assert!(lines[1].contains("azuracast-main"));
        assert!(lines[2].contains("maintenance"));
    }

    #[test]
    fn empty_inventory_says_so() {
        assert_eq!(records(&Vec::new()), "No stations registered.\n");
    }

    #[test]
    fn preserved_volume_names_the_path() {
        let report = TeardownReport {
            id: 340,
            hostname: "azuracast-main".to_owned(),
            compute_destroyed: true,
            volume: VolumeDisposition::Preserved {
                dataset: "tank/radio/azuracast-main".to_owned(),
                host_path: "/tank/radio/azuracast-main".into(),
            },
        };
        let text = teardown(&report);
        assert!(text.contains("container destroyed"));
        assert!(text.contains("/tank/radio/azuracast-main"));
    }
}
