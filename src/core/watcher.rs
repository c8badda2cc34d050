//! Watch-root polling with settle detection
//!
//! Scanners write job folders at a fixed depth below the watch root
//! (`<batch>/<scan>` by default). A folder is ready once it holds at least
//! one real file and nothing inside it has been modified for the settle
//! window. Traversal runs on the blocking pool because the root is usually
//! a network share.

use crate::core::ledger::ProcessedLedger;
use crate::domain::Job;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// OS metadata files that never count as scan output
const JUNK_FILES: &[&str] = &[".ds_store", "thumbs.db", "desktop.ini"];

/// Returns true for dotfiles and OS junk
pub fn is_junk_name(name: &str) -> bool {
    name.starts_with('.') || JUNK_FILES.contains(&name.to_lowercase().as_str())
}

/// Returns true when a file should be ignored for readiness and upload
pub fn is_junk_file(path: &Path, size: u64) -> bool {
    size == 0
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, is_junk_name)
}

/// Polls the watch root for ready job folders
pub struct PathWatcher {
    root: PathBuf,
    depth: usize,
    settle: Duration,
    ignored: Mutex<HashSet<String>>,
}

impl PathWatcher {
    /// Create a watcher for job folders `depth` levels below `root`
    pub fn new(root: impl Into<PathBuf>, depth: usize, settle: Duration) -> Self {
        Self {
            root: root.into(),
            depth: depth.max(1),
            settle,
            ignored: Mutex::new(HashSet::new()),
        }
    }

    /// Watch root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local folder for a job key
    pub fn job_path(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |p, seg| p.join(seg))
    }

    /// Returns true while the job folder still exists locally
    pub fn job_exists(&self, key: &str) -> bool {
        self.job_path(key).is_dir()
    }

    fn ignored(&self) -> HashSet<String> {
        match self.ignored.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remember every job folder present now so it is never dispatched
    ///
    /// Used with `skip_existing_on_start`. Nothing is written to the ledger.
    pub async fn ignore_existing(&self) -> usize {
        let keys: Vec<String> = self
            .list_candidates()
            .await
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let count = keys.len();

        match self.ignored.lock() {
            Ok(mut guard) => guard.extend(keys),
            Err(poisoned) => poisoned.into_inner().extend(keys),
        }

        tracing::info!(count, "Ignoring job folders present at startup");
        count
    }

    /// Ready jobs not yet in the ledger, in lexical key order
    ///
    /// An unreachable root yields no jobs; the next tick tries again.
    pub async fn poll(&self, ledger: &ProcessedLedger) -> Vec<Job> {
        let ignored = self.ignored();
        let pending: Vec<(String, PathBuf)> = self
            .list_candidates()
            .await
            .into_iter()
            .filter(|(key, _)| !ignored.contains(key) && !ledger.is_processed(key))
            .collect();

        if pending.is_empty() {
            return Vec::new();
        }

        let settle = self.settle;
        let checked = tokio::task::spawn_blocking(move || {
            let now = SystemTime::now();
            pending
                .into_iter()
                .filter(|(key, path)| is_ready(key, path, now, settle))
                .map(|(key, path)| Job::new(key, path))
                .collect::<Vec<_>>()
        })
        .await;

        match checked {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Readiness check task failed");
                Vec::new()
            }
        }
    }

    async fn list_candidates(&self) -> Vec<(String, PathBuf)> {
        let root = self.root.clone();
        let depth = self.depth;

        match tokio::task::spawn_blocking(move || list_job_dirs(&root, depth)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                tracing::warn!(
                    root = %self.root.display(),
                    error = %e,
                    "Watch root unreachable, skipping this tick"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::error!(error = %e, "Directory listing task failed");
                Vec::new()
            }
        }
    }
}

/// Job folders exactly `depth` levels below `root`, sorted by key
///
/// Dot-directories are skipped at every level.
pub fn list_job_dirs(root: &Path, depth: usize) -> std::io::Result<Vec<(String, PathBuf)>> {
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || (e.file_type().is_dir() && !e.file_name().to_string_lossy().starts_with('.'))
        });

    for entry in walker {
        match entry {
            Ok(entry) if entry.depth() == depth => {
                let Ok(relative) = entry.path().strip_prefix(root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                found.push((key, entry.path().to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.depth() == 0 => {
                return Err(e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk error at root")));
            }
            Err(e) => tracing::debug!(error = %e, "Skipping unreadable entry"),
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Newest modification time over the real files below `dir`
///
/// Returns `None` when the folder holds no real files.
pub fn newest_file_mtime(dir: &Path) -> Option<SystemTime> {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            if is_junk_file(e.path(), meta.len()) {
                return None;
            }
            meta.modified().ok()
        })
        .max()
}

fn is_ready(key: &str, dir: &Path, now: SystemTime, settle: Duration) -> bool {
    let Some(newest) = newest_file_mtime(dir) else {
        tracing::trace!(job = %key, "No real files yet");
        return false;
    };

    // A modification time in the future means the folder is still settling
    match now.duration_since(newest) {
        Ok(age) if age > settle => true,
        _ => {
            tracing::trace!(job = %key, "Folder still settling");
            false
        }
    }
}
