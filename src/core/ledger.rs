//! Persisted record of handled jobs
//!
//! The ledger is a single JSON object mapping job keys to
//! [`LedgerEntry`] records. It is loaded once at startup and rewritten in
//! full (temp file, then rename) on every mutation, so a crash leaves
//! either the old or the new file on disk.
//!
//! Files written by older releases map keys to `true`; those still load.

use crate::domain::{JobOutcome, Result, RouteError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// One handled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// When the job was marked
    pub marked_at: DateTime<Utc>,

    /// How the upload ended
    pub outcome: JobOutcome,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Entry(LedgerEntry),
    Legacy(bool),
}

/// Idempotent record of processed job keys
pub struct ProcessedLedger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, LedgerEntry>>,
}

impl ProcessedLedger {
    /// Load the ledger from `path`
    ///
    /// A missing file yields an empty ledger. A file that cannot be parsed is
    /// logged and treated as empty; it is overwritten by the next mark.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => parse_entries(&path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(RouteError::Ledger(format!(
                    "Failed to read ledger {}: {e}",
                    path.display()
                )))
            }
        };

        tracing::info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded processed ledger"
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, LedgerEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once `key` has been marked
    pub fn is_processed(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Record `key` and flush the ledger to disk
    ///
    /// The in-memory record is kept even when the flush fails so the job is
    /// not uploaded twice by this process.
    pub fn mark_processed(&self, key: &str, outcome: JobOutcome) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            LedgerEntry {
                marked_at: Utc::now(),
                outcome,
            },
        );
        self.persist(&entries)
    }

    /// Snapshot of every entry, sorted by key
    pub fn entries(&self) -> Vec<(String, LedgerEntry)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing has been marked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop entries older than `retention` whose job folder is gone
    ///
    /// Entries for folders that still exist are kept regardless of age;
    /// forgetting them would upload the folder again.
    pub fn prune<F>(&self, retention: chrono::Duration, still_present: F) -> Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let cutoff = Utc::now() - retention;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, entry| entry.marked_at >= cutoff || still_present(key));
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(&entries)?;
            tracing::info!(removed, remaining = entries.len(), "Pruned processed ledger");
        }
        Ok(removed)
    }

    fn persist(&self, entries: &BTreeMap<String, LedgerEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RouteError::Ledger(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| RouteError::Ledger(format!("Failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            RouteError::Ledger(format!("Failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

fn parse_entries(path: &Path, content: &str) -> BTreeMap<String, LedgerEntry> {
    if content.trim().is_empty() {
        return BTreeMap::new();
    }

    let raw: BTreeMap<String, StoredEntry> = match serde_json::from_str(content) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Processed ledger is corrupt, starting empty"
            );
            return BTreeMap::new();
        }
    };

    // Legacy entries carry no timestamp; the file's mtime is the best bound
    let legacy_time = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    raw.into_iter()
        .filter_map(|(key, stored)| match stored {
            StoredEntry::Entry(entry) => Some((key, entry)),
            StoredEntry::Legacy(true) => Some((
                key,
                LedgerEntry {
                    marked_at: legacy_time,
                    outcome: JobOutcome::Complete,
                },
            )),
            StoredEntry::Legacy(false) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ProcessedLedger::load(dir.path().join("ledger.json")).unwrap();
        assert!(ledger.is_empty());
        assert!(!ledger.is_processed("2024-01-15/roll_001"));
    }

    #[test]
    fn test_mark_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = ProcessedLedger::load(&path).unwrap();
        ledger
            .mark_processed("2024-01-15/roll_001", JobOutcome::Partial)
            .unwrap();
        drop(ledger);

        let reloaded = ProcessedLedger::load(&path).unwrap();
        assert!(reloaded.is_processed("2024-01-15/roll_001"));
        let entries = reloaded.entries();
        assert_eq!(entries[0].1.outcome, JobOutcome::Partial);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_mark_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ledger = ProcessedLedger::load(dir.path().join("ledger.json")).unwrap();
        ledger.mark_processed("a/b", JobOutcome::Complete).unwrap();
        ledger.mark_processed("a/b", JobOutcome::Complete).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_legacy_format_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{"2024-01-15/roll_001": true, "2024-01-15/roll_002": false}"#)
            .unwrap();

        let ledger = ProcessedLedger::load(&path).unwrap();
        assert!(ledger.is_processed("2024-01-15/roll_001"));
        assert!(!ledger.is_processed("2024-01-15/roll_002"));
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        let ledger = ProcessedLedger::load(&path).unwrap();
        assert!(ledger.is_empty());

        ledger.mark_processed("x/y", JobOutcome::Empty).unwrap();
        let reloaded = ProcessedLedger::load(&path).unwrap();
        assert!(reloaded.is_processed("x/y"));
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("ledger.json");
        let ledger = ProcessedLedger::load(&path).unwrap();
        ledger.mark_processed("a/b", JobOutcome::Complete).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_prune_keeps_present_and_recent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let old = Utc::now() - chrono::Duration::days(200);
        let content = serde_json::json!({
            "old/gone": { "marked_at": old, "outcome": "complete" },
            "old/present": { "marked_at": old, "outcome": "complete" },
            "new/gone": { "marked_at": Utc::now(), "outcome": "partial" },
        });
        std::fs::write(&path, content.to_string()).unwrap();

        let ledger = ProcessedLedger::load(&path).unwrap();
        let removed = ledger
            .prune(chrono::Duration::days(90), |key| key == "old/present")
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!ledger.is_processed("old/gone"));
        assert!(ledger.is_processed("old/present"));
        assert!(ledger.is_processed("new/gone"));
        assert_eq!(ProcessedLedger::load(&path).unwrap().len(), 2);
    }
}
