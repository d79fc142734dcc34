//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Append-only journal of lifecycle stage transitions."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Result;

const JOURNAL_VERSION: u16 = 1;

/// First line of every journal file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalHeader {
    version: u16,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalOutcome {
    Started,
    Completed,
    Skipped,
    Failed,
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Assigned on append, strictly increasing within a file.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub station_id: u32,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub outcome: JournalOutcome,
    #[serde(default)]
    pub message: String,
}

impl JournalEntry {
    pub fn new(station_id: u32, operation: impl Into<String>, outcome: JournalOutcome) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            station_id,
            operation: operation.into(),
            stage: None,
            outcome,
            message: String::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

struct JournalWriter {
    writer: BufWriter<File>,
    next_sequence: u64,
}

/// JSON-lines journal shared by every lifecycle operation in the process.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").field("path", &self.path).finish()
    }
}

impl Journal {
    /// Open for appending, writing a header if the file is new or empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let fresh = !path.exists() || fs::metadata(&path)?.len() == 0;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        let next_sequence = if fresh {
            let header = JournalHeader {
                version: JOURNAL_VERSION,
                created_at: Utc::now(),
            };
            writer.write_all(serde_json::to_string(&header)?.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            0
        } else {
            last_sequence(&path)?
        };
        Ok(Self {
            path,
            writer: Mutex::new(JournalWriter {
                writer,
                next_sequence,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and flush; returns the assigned sequence number.
    pub fn append(&self, mut entry: JournalEntry) -> Result<u64> {
        let mut state = self.writer.lock();
        state.next_sequence += 1;
        entry.sequence = state.next_sequence;
        let line = serde_json::to_string(&entry)?;
        state.writer.write_all(line.as_bytes())?;
        state.writer.write_all(b"\n")?;
        state.writer.flush()?;
        Ok(entry.sequence)
    }

    /// Every entry in file order. Unparseable lines are skipped.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        read_entries(&self.path)
    }

    /// The most recent `limit` entries for one station, oldest first.
    pub fn entries_for(&self, station_id: u32, limit: usize) -> Result<Vec<JournalEntry>> {
        let mut matching: Vec<JournalEntry> = self
            .entries()?
            .into_iter()
            .filter(|entry| entry.station_id == station_id)
            .collect();
        let excess = matching.len().saturating_sub(limit);
        matching.drain(..excess);
        Ok(matching)
    }
}

fn read_entries(path: &Path) -> Result<Vec<JournalEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<JournalEntry>(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn last_sequence(path: &Path) -> Result<u64> {
    Ok(read_entries(path)?
        .last()
        .map(|entry| entry.sequence)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sequences_continue_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        {
            let journal = Journal::open(&path).unwrap();
            assert_eq!(
                journal
                    .append(JournalEntry::new(340, "deploy", JournalOutcome::Started))
                    .unwrap(),
                1
            );
            journal
                .append(
                    JournalEntry::new(340, "deploy", JournalOutcome::Completed)
                        .with_stage("validated"),
                )
                .unwrap();
        }
        let journal = Journal::open(&path).unwrap();
        let seq = journal
            .append(JournalEntry::new(341, "deploy", JournalOutcome::Failed).with_message("boom"))
            .unwrap();
        assert_eq!(seq, 3);
        assert_eq!(journal.entries().unwrap().len(), 3);
    }

    #[test]
    fn entries_for_returns_tail_of_one_station() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("journal.log")).unwrap();
        for index in 0..5 {
            journal
                .append(
                    JournalEntry::new(200, "update", JournalOutcome::Completed)
                        .with_message(format!("run {index}")),
                )
                .unwrap();
            journal
                .append(JournalEntry::new(201, "update", JournalOutcome::Completed))
                .unwrap();
        }
        let tail = journal.entries_for(200, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "run 3");
        assert_eq!(tail[1].message, "run 4");
    }
}
