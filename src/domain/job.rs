//! Scan jobs discovered in the watch root

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A settled scan folder ready for upload
///
/// `key` is the watch-root-relative path of the folder joined with `/`
/// (for example `2024-01-15/roll_001`). Jobs are rebuilt from the filesystem
/// on every poll tick and never persisted; only their keys reach the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Composite key, unique within the watch root
    pub key: String,

    /// Absolute path of the job folder
    pub local_path: PathBuf,
}

impl Job {
    /// Create a new job
    pub fn new(key: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            local_path: local_path.into(),
        }
    }

    /// Last segment of the key, used as the folder name under an order
    pub fn scan_id(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// How a job concluded when it was written to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    /// Every file uploaded
    Complete,
    /// Some files uploaded, the rest failed permanently or exhausted retries
    Partial,
    /// The folder held no uploadable files
    Empty,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Complete => "complete",
            JobOutcome::Partial => "partial",
            JobOutcome::Empty => "empty",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_id_is_last_segment() {
        let job = Job::new("2024-01-15/roll_001", "/watch/2024-01-15/roll_001");
        assert_eq!(job.scan_id(), "roll_001");
    }

    #[test]
    fn test_scan_id_single_segment() {
        let job = Job::new("roll_002", "/watch/roll_002");
        assert_eq!(job.scan_id(), "roll_002");
        assert_eq!(job.to_string(), "roll_002");
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_string(&JobOutcome::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let back: JobOutcome = serde_json::from_str("\"empty\"").unwrap();
        assert_eq!(back, JobOutcome::Empty);
    }
}
