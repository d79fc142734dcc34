//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Timestamped inventory backups with bounded retention."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::Result;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";

/// Backup copies of the inventory file, named so that name order is creation order.
#[derive(Debug, Clone)]
pub struct BackupRotation {
    dir: PathBuf,
    stem: String,
    retain_last: usize,
}

impl BackupRotation {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, retain_last: usize) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            retain_last: retain_last.max(1),
        }
    }

    /// Rotation for `source`, using its file stem as the backup name prefix.
    pub fn for_file(source: &Path, dir: impl Into<PathBuf>, retain_last: usize) -> Self {
        let stem = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("inventory")
            .to_owned();
        Self::new(dir, stem, retain_last)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retain_last(&self) -> usize {
        self.retain_last
    }

    /// Copy `source` into the backup directory and prune the oldest copies.
    ///
    /// Returns `Ok(None)` when there is nothing to back up yet.
    pub fn create(&self, source: &Path) -> Result<Option<PathBuf>> {
        if !source.exists() {
            debug!(source = %source.display(), "no inventory file yet; skipping backup");
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;
        let target = self.next_path();
        fs::copy(source, &target)?;
        debug!(backup = %target.display(), "inventory backup written");
        self.prune()?;
        Ok(Some(target))
    }

    /// All backups for this stem, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}-", self.stem);
        let mut entries: Vec<PathBuf> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| name.starts_with(&prefix) && name.ends_with(".csv"))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// Most recent backup, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list()?.pop())
    }

    /// Remove backups beyond the retention bound. Returns how many were deleted.
    pub fn prune(&self) -> Result<usize> {
        let entries = self.list()?;
        if entries.len() <= self.retain_last {
            return Ok(0);
        }
        let excess = entries.len() - self.retain_last;
        let mut removed = 0;
        for path in entries.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed pruning inventory backup")
                }
            }
        }
        Ok(removed)
    }

    fn next_path(&self) -> PathBuf {
        let mut stamp = Utc::now();
        loop {
            let candidate = self.dir.join(format!(
                "{}-{}.csv",
                self.stem,
                stamp.format(TIMESTAMP_FORMAT)
            ));
            if !candidate.exists() {
                return candidate;
            }
            stamp += Duration::nanoseconds(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_source_is_not_backed_up() {
        let dir = tempdir().unwrap();
        let rotation = BackupRotation::new(dir.path().join("backups"), "stations", 3);
        assert!(rotation
            .create(&dir.path().join("stations.csv"))
            .unwrap()
            .is_none());
        assert!(rotation.list().unwrap().is_empty());
    }

    #[test]
    fn retains_only_newest_copies() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("stations.csv");
        let rotation = BackupRotation::for_file(&source, dir.path().join("backups"), 3);
        let mut created = Vec::new();
        for generation in 0..5 {
            fs::write(&source, format!("generation {generation}")).unwrap();
            created.push(rotation.create(&source).unwrap().unwrap());
        }
        let kept = rotation.list().unwrap();
        assert_eq!(kept, created[2..].to_vec());
        let newest = fs::read_to_string(rotation.latest().unwrap().unwrap()).unwrap();
        assert_eq!(newest, "generation 4");
    }

    #[test]
    fn unrelated_files_are_left_alone() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();
        fs::write(backups.join("notes.txt"), "keep me").unwrap();
        let source = dir.path().join("stations.csv");
        fs::write(&source, "x").unwrap();
        let rotation = BackupRotation::for_file(&source, &backups, 1);
        rotation.create(&source).unwrap();
        rotation.create(&source).unwrap();
        assert_eq!(rotation.list().unwrap().len(), 1);
        assert!(backups.join("notes.txt").exists());
    }
}
