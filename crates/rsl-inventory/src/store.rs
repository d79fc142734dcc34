//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Inventory backend interface and the CSV file implementation."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::Mutex;
use rsl_common::InventoryConfig;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::backup::BackupRotation;
use crate::codec::{self, Table};
use crate::record::{StationFilter, StationRecord, StationStatus};
use crate::{InventoryError, Result};

/// Result of an [`InventoryBackend::upsert`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// A single consistency problem found by [`InventoryBackend::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    HeaderMismatch { expected: String, found: String },
    DuplicateId { id: u32, lines: Vec<u64> },
    Orphan { id: u32, hostname: String },
    MalformedRow { line: u64, reason: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::HeaderMismatch { expected, found } => {
                write!(f, "header mismatch: expected '{expected}', found '{found}'")
            }
            Violation::DuplicateId { id, lines } => {
                let lines: Vec<String> = lines.iter().map(u64::to_string).collect();
                write!(f, "duplicate id {id} on lines {}", lines.join(", "))
            }
            Violation::Orphan { id, hostname } => {
                write!(f, "orphaned record {id} ({hostname}): no compute unit exists")
            }
            Violation::MalformedRow { line, reason } => {
                write!(f, "malformed row at line {line}: {reason}")
            }
        }
    }
}

/// Structured outcome of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub records_checked: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn orphans(&self) -> impl Iterator<Item = u32> + '_ {
        self.violations.iter().filter_map(|violation| match violation {
            Violation::Orphan { id, .. } => Some(*id),
            _ => None,
        })
    }
}

/// Durable CRUD over station records.
///
/// Implementations serialize their own mutations. Liveness of a compute
/// unit is supplied by the caller as a predicate so the store never talks
/// to the host directly.
pub trait InventoryBackend: Send + Sync + fmt::Debug {
    /// Insert, or replace in place when a record with the same id exists.
    fn upsert(&self, record: &StationRecord) -> Result<UpsertOutcome>;

    /// Remove by id. Returns whether a row was removed; an absent id is not an error.
    fn remove(&self, id: u32) -> Result<bool>;

    /// First record with `id`, or `None`.
    fn find(&self, id: u32) -> Result<Option<StationRecord>>;

    /// Records matching `filter`, in storage order.
    fn list(&self, filter: StationFilter) -> Result<Vec<StationRecord>>;

    /// Ids of every row that parses, even when the file as a whole is inconsistent.
    fn scan_ids(&self) -> Result<Vec<u32>>;

    /// Check header, duplicates, and orphans without mutating.
    fn validate(&self, is_live: &dyn Fn(u32) -> bool) -> Result<ValidationReport>;

    /// Drop rows whose id fails `is_live` and return them.
    fn reconcile(&self, is_live: &dyn Fn(u32) -> bool) -> Result<Vec<StationRecord>>;

    /// Take a backup now. `None` when there was nothing to copy.
    fn backup(&self) -> Result<Option<PathBuf>>;

    fn get(&self, id: u32) -> Result<StationRecord> {
        self.find(id)?.ok_or(InventoryError::NotFound(id))
    }

    fn contains(&self, id: u32) -> Result<bool> {
        Ok(self.find(id)?.is_some())
    }

    fn count(&self, filter: StationFilter) -> Result<usize> {
        Ok(self.list(filter)?.len())
    }

    fn set_status(&self, id: u32, status: StationStatus) -> Result<StationRecord> {
        let mut record = self.get(id)?;
        record.status = status;
        self.upsert(&record)?;
        Ok(record)
    }
}

/// Inventory persisted as a comma-delimited file with a fixed header.
#[derive(Debug)]
pub struct CsvInventory {
    path: PathBuf,
    backups: BackupRotation,
    write_lock: Mutex<()>,
}

impl CsvInventory {
    /// Open the inventory at `path`, creating a header-only file if none exists.
    pub fn open(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        retain_backups: usize,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let backups = BackupRotation::for_file(&path, backup_dir, retain_backups);
        let inventory = Self {
            path,
            backups,
            write_lock: Mutex::new(()),
        };
        if !inventory.path.exists() {
            inventory.write_records(&[])?;
            info!(path = %inventory.path.display(), "initialised empty station inventory");
        }
        Ok(inventory)
    }

    pub fn from_config(config: &InventoryConfig) -> Result<Self> {
        Self::open(
            config.path.clone(),
            config.backup_dir(),
            config.retain_backups,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups(&self) -> &BackupRotation {
        &self.backups
    }

    fn read_table(&self) -> Result<Table> {
        if !self.path.exists() {
            return Ok(Table {
                header: Some(codec::HEADER.iter().map(|name| name.to_string()).collect()),
                rows: Vec::new(),
            });
        }
        let file = fs::File::open(&self.path)?;
        codec::decode(file)
    }

    fn read_records(&self) -> Result<Vec<StationRecord>> {
        self.read_table()?.into_records()
    }

    fn write_records(&self, records: &[StationRecord]) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(codec::encode(records).as_bytes())?;
        staged.as_file().sync_all()?;
        if let Ok(metadata) = fs::metadata(&self.path) {
            staged.as_file().set_permissions(metadata.permissions())?;
        }
        staged.persist(&self.path)?;
        Ok(())
    }

    /// Backups are best effort: a failure is logged and the mutation proceeds.
    fn backup_before_mutation(&self, operation: &str) {
        match self.backups.create(&self.path) {
            Ok(Some(path)) => debug!(operation, backup = %path.display(), "pre-mutation backup"),
            Ok(None) => {}
            Err(err) => warn!(operation, error = %err, "inventory backup failed; continuing"),
        }
    }

    fn mutate<T>(
        &self,
        operation: &str,
        apply: impl FnOnce(&mut Vec<StationRecord>) -> Result<(T, bool)>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock();
        self.backup_before_mutation(operation);
        let mut records = self.read_records()?;
        let (outcome, changed) = apply(&mut records)?;
        if changed {
            self.write_records(&records)?;
        }
        Ok(outcome)
    }
}

impl InventoryBackend for CsvInventory {
    fn upsert(&self, record: &StationRecord) -> Result<UpsertOutcome> {
        record.validate()?;
        self.mutate("upsert", |records| {
            let outcome = replace_or_push(records, record);
            match outcome {
                UpsertOutcome::Inserted => {
                    info!(station = record.id, hostname = %record.hostname, "inventory record added")
                }
                UpsertOutcome::Replaced => {
                    info!(station = record.id, hostname = %record.hostname, "inventory record updated")
                }
            }
            Ok((outcome, true))
        })
    }

    fn remove(&self, id: u32) -> Result<bool> {
        self.mutate("remove", |records| {
            let before = records.len();
            records.retain(|record| record.id != id);
            let removed = records.len() != before;
            if removed {
                info!(station = id, "inventory record removed");
            } else {
                debug!(station = id, "remove requested for absent station");
            }
            Ok((removed, removed))
        })
    }

    fn find(&self, id: u32) -> Result<Option<StationRecord>> {
        Ok(self
            .read_records()?
            .into_iter()
            .find(|record| record.id == id))
    }

    fn list(&self, filter: StationFilter) -> Result<Vec<StationRecord>> {
        Ok(self
            .read_records()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    fn scan_ids(&self) -> Result<Vec<u32>> {
        let table = self.read_table()?;
        Ok(table
            .rows
            .iter()
            .filter_map(|row| row.parsed.as_ref().ok().map(|record| record.id))
            .collect())
    }

    fn validate(&self, is_live: &dyn Fn(u32) -> bool) -> Result<ValidationReport> {
        let table = self.read_table()?;
        let mut report = ValidationReport::default();
        if !table.header_matches() {
            report.violations.push(Violation::HeaderMismatch {
                expected: codec::header_line(),
                found: table.found_header(),
            });
        }
        let mut parsed = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            match &row.parsed {
                Ok(record) => parsed.push((row.line, record)),
                Err(reason) => report.violations.push(Violation::MalformedRow {
                    line: row.line,
                    reason: reason.clone(),
                }),
            }
        }
        check_records(&parsed, is_live, &mut report);
        Ok(report)
    }

    fn reconcile(&self, is_live: &dyn Fn(u32) -> bool) -> Result<Vec<StationRecord>> {
        self.mutate("reconcile", |records| {
            let removed = partition_orphans(records, is_live);
            Ok((removed.clone(), !removed.is_empty()))
        })
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        let _guard = self.write_lock.lock();
        self.backups.create(&self.path)
    }
}

pub(crate) fn replace_or_push(records: &mut Vec<StationRecord>, record: &StationRecord) -> UpsertOutcome {
    match records.iter_mut().find(|existing| existing.id == record.id) {
        Some(existing) => {
            *existing = record.clone();
            UpsertOutcome::Replaced
        }
        None => {
            records.push(record.clone());
            UpsertOutcome::Inserted
        }
    }
}

pub(crate) fn partition_orphans(
    records: &mut Vec<StationRecord>,
    is_live: &dyn Fn(u32) -> bool,
) -> Vec<StationRecord> {
    let mut removed = Vec::new();
    records.retain(|record| {
        if is_live(record.id) {
            true
        } else {
            info!(station = record.id, hostname = %record.hostname, "reconcile dropped orphaned record");
            removed.push(record.clone());
            false
        }
    });
    removed
}

/// Duplicate and orphan checks over `(line, record)` pairs.
pub(crate) fn check_records(
    records: &[(u64, &StationRecord)],
    is_live: &dyn Fn(u32) -> bool,
    report: &mut ValidationReport,
) {
    report.records_checked = records.len();
    let mut by_id: IndexMap<u32, Vec<u64>> = IndexMap::new();
    for (line, record) in records {
        by_id.entry(record.id).or_default().push(*line);
    }
    for (id, lines) in &by_id {
        if lines.len() > 1 {
            report.violations.push(Violation::DuplicateId {
                id: *id,
                lines: lines.clone(),
            });
        }
    }
    let mut seen = std::collections::HashSet::new();
    for (_, record) in records {
        if seen.insert(record.id) && !is_live(record.id) {
            report.violations.push(Violation::Orphan {
                id: record.id,
                hostname: record.hostname.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rsl_common::Platform;
    use tempfile::tempdir;

    fn record(id: u32, name: &str) -> StationRecord {
        StationRecord::new(
            id,
            Platform::Azuracast,
            name,
            format!("192.168.2.{}", id % 250),
            "test station",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
        .unwrap()
    }

    fn open(dir: &Path) -> CsvInventory {
        CsvInventory::open(dir.join("stations.csv"), dir.join("backups"), 10).unwrap()
    }

    #[test]
    fn open_writes_header_only_file() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        let contents = fs::read_to_string(inventory.path()).unwrap();
        assert_eq!(contents, format!("{}\n", codec::header_line()));
        assert_eq!(inventory.count(StationFilter::All).unwrap(), 0);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        inventory.upsert(&record(101, "one")).unwrap();
        inventory.upsert(&record(102, "two")).unwrap();
        let mut changed = record(101, "one");
        changed.description = "renamed".into();
        assert_eq!(inventory.upsert(&changed).unwrap(), UpsertOutcome::Replaced);
        let listed = inventory.list(StationFilter::All).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], changed);
        assert_eq!(listed[1].id, 102);
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        assert!(matches!(
            inventory.get(555),
            Err(InventoryError::NotFound(555))
        ));
    }

    #[test]
    fn filter_by_platform() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        inventory.upsert(&record(101, "one")).unwrap();
        let mut libretime = record(102, "two");
        libretime.platform = Platform::Libretime;
        libretime.hostname = Platform::Libretime.hostname_for("two");
        inventory.upsert(&libretime).unwrap();
        let only = inventory
            .list(StationFilter::Platform(Platform::Libretime))
            .unwrap();
        assert_eq!(only, vec![libretime]);
        assert_eq!(
            inventory
                .count(StationFilter::Platform(Platform::Icecast))
                .unwrap(),
            0
        );
    }

    #[test]
    fn set_status_persists() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        inventory.upsert(&record(101, "one")).unwrap();
        inventory
            .set_status(101, StationStatus::Maintenance)
            .unwrap();
        assert_eq!(
            inventory.get(101).unwrap().status,
            StationStatus::Maintenance
        );
    }

    #[test]
    fn strict_reads_reject_malformed_rows() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        let mut contents = fs::read_to_string(inventory.path()).unwrap();
        contents.push_str("abc,azuracast,azuracast-x,10.0.0.1,\"\",2024-01-01,active\n");
        fs::write(inventory.path(), contents).unwrap();
        assert!(matches!(
            inventory.list(StationFilter::All),
            Err(InventoryError::MalformedRow { line: 2, .. })
        ));
        let report = inventory.validate(&|_| true).unwrap();
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn upsert_rejects_invalid_record() {
        let dir = tempdir().unwrap();
        let inventory = open(dir.path());
        let mut bad = record(101, "one");
        bad.address = "10.0.0.300".into();
        assert!(matches!(
            inventory.upsert(&bad),
            Err(InventoryError::InvalidRecord(_))
        ));
        assert_eq!(inventory.count(StationFilter::All).unwrap(), 0);
    }
}
