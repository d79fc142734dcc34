//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "In-process inventory backend."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::record::{StationFilter, StationRecord};
use crate::store::{
    check_records, partition_orphans, replace_or_push, InventoryBackend, UpsertOutcome,
    ValidationReport,
};
use crate::Result;

/// Inventory held in memory. Backups are kept as in-memory snapshots.
#[derive(Debug)]
pub struct MemoryInventory {
    inner: Mutex<MemoryState>,
    retain_backups: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<StationRecord>,
    snapshots: VecDeque<Vec<StationRecord>>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new(10)
    }
}

impl MemoryInventory {
    pub fn new(retain_backups: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryState::default()),
            retain_backups: retain_backups.max(1),
        }
    }

    pub fn with_records(records: impl IntoIterator<Item = StationRecord>) -> Self {
        let inventory = Self::default();
        inventory.inner.lock().records = records.into_iter().collect();
        inventory
    }

    /// Number of retained snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.inner.lock().snapshots.len()
    }

    fn snapshot(&self, state: &mut MemoryState) {
        state.snapshots.push_back(state.records.clone());
        while state.snapshots.len() > self.retain_backups {
            state.snapshots.pop_front();
        }
    }
}

impl InventoryBackend for MemoryInventory {
    fn upsert(&self, record: &StationRecord) -> Result<UpsertOutcome> {
        record.validate()?;
        let mut state = self.inner.lock();
        self.snapshot(&mut state);
        Ok(replace_or_push(&mut state.records, record))
    }

    fn remove(&self, id: u32) -> Result<bool> {
        let mut state = self.inner.lock();
        self.snapshot(&mut state);
        let before = state.records.len();
        state.records.retain(|record| record.id != id);
        Ok(state.records.len() != before)
    }

    fn find(&self, id: u32) -> Result<Option<StationRecord>> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    fn list(&self, filter: StationFilter) -> Result<Vec<StationRecord>> {
        Ok(self
            .inner
            .lock()
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    fn scan_ids(&self) -> Result<Vec<u32>> {
        Ok(self.inner.lock().records.iter().map(|record| record.id).collect())
    }

    fn validate(&self, is_live: &dyn Fn(u32) -> bool) -> Result<ValidationReport> {
        let state = self.inner.lock();
        let rows: Vec<(u64, &StationRecord)> = state
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| (index as u64 + 2, record))
            .collect();
        let mut report = ValidationReport::default();
        check_records(&rows, is_live, &mut report);
        Ok(report)
    }

    fn reconcile(&self, is_live: &dyn Fn(u32) -> bool) -> Result<Vec<StationRecord>> {
        let mut state = self.inner.lock();
        self.snapshot(&mut state);
        Ok(partition_orphans(&mut state.records, is_live))
    }

    fn backup(&self) -> Result<Option<PathBuf>> {
        let mut state = self.inner.lock();
        self.snapshot(&mut state);
        Ok(None)
    }
}
