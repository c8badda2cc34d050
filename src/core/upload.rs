//! Concurrent job upload
//!
//! [`UploadEngine`] mirrors a local job folder under a remote root. Files up
//! to the chunk size go in one request; larger files use an upload session.
//! Each file is retried independently through the [`RetryPolicy`] and one
//! file's failure never cancels the others.

use crate::adapters::store::{join_path, parent_path, ObjectStore};
use crate::config::UploadConfig;
use crate::core::retry::RetryPolicy;
use crate::core::watcher::is_junk_file;
use crate::domain::{JobOutcome, Result, RouteError};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

/// Receives upload progress
pub trait ProgressSink: Send + Sync {
    /// Called after each file concludes
    fn report(&self, completed: usize, total: usize, message: &str);
}

/// Discards progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _completed: usize, _total: usize, _message: &str) {}
}

/// Logs progress at debug level with a summary every tenth of the job
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, completed: usize, total: usize, message: &str) {
        let step = (total / 10).max(1);
        if completed == total || completed % step == 0 {
            tracing::info!(completed, total, "Upload progress");
        }
        tracing::debug!(completed, total, file = %message, "File concluded");
    }
}

/// One file to transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// File on disk
    pub local_file: PathBuf,
    /// Full remote path
    pub remote_dest: String,
    /// Path relative to the job folder, `/`-separated
    pub relative_key: String,
    /// Size in bytes when collected
    pub size: u64,
}

/// A file that could not be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// Path relative to the job folder
    pub relative_key: String,
    /// Last error
    pub error: String,
    /// True when retries ran out on a transient error
    pub transient: bool,
}

/// Upload candidates found in a job folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedFiles {
    /// Files old enough to upload, sorted by relative path
    pub tasks: Vec<UploadTask>,
    /// Real files modified more recently than the minimum age
    pub too_new: usize,
}

/// Result of uploading one job folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Files selected for upload
    pub total: usize,
    /// Files now present remotely
    pub succeeded: usize,
    /// Files skipped because they already existed remotely
    pub skipped: usize,
    /// Files that failed
    pub failures: Vec<UploadFailure>,
    /// Files still younger than the minimum age; nothing is transferred while
    /// this is non-zero
    pub deferred: usize,
}

impl UploadReport {
    /// True when the folder still had files too new to upload
    pub fn is_deferred(&self) -> bool {
        self.deferred > 0
    }

    /// Ledger outcome for this report, `None` when nothing succeeded or the
    /// job was deferred
    pub fn outcome(&self) -> Option<JobOutcome> {
        if self.is_deferred() {
            None
        } else if self.total == 0 {
            Some(JobOutcome::Empty)
        } else if self.succeeded == 0 {
            None
        } else if self.failures.is_empty() {
            Some(JobOutcome::Complete)
        } else {
            Some(JobOutcome::Partial)
        }
    }
}

/// Uploads job folders to the object store
pub struct UploadEngine {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    concurrency: usize,
    chunk_size: usize,
    min_file_age: Duration,
    skip_existing: bool,
}

impl UploadEngine {
    /// Create an engine with default tuning
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self::from_config(store, retry, &UploadConfig::default())
    }

    /// Create an engine from the `[upload]` section
    pub fn from_config(store: Arc<dyn ObjectStore>, retry: RetryPolicy, config: &UploadConfig) -> Self {
        Self {
            store,
            retry,
            concurrency: config.concurrency.max(1),
            chunk_size: config.chunk_size_bytes().max(1),
            min_file_age: Duration::from_millis(config.min_file_age_ms),
            skip_existing: config.skip_existing,
        }
    }

    /// Number of files in flight at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Files larger than this use an upload session
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Files modified more recently than this are left for a later run
    pub fn with_min_file_age(mut self, min_file_age: Duration) -> Self {
        self.min_file_age = min_file_age;
        self
    }

    /// Count files that already exist remotely as uploaded
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Upload every real file below `local_dir` to `remote_root`
    ///
    /// Only listing the local folder can fail the call; per-file failures are
    /// collected in the report.
    pub async fn upload(
        &self,
        local_dir: &Path,
        remote_root: &str,
        progress: &dyn ProgressSink,
    ) -> Result<UploadReport> {
        let CollectedFiles { tasks, too_new } = self.collect_tasks(local_dir, remote_root).await?;
        let total = tasks.len();
        let mut report = UploadReport {
            total,
            deferred: too_new,
            ..UploadReport::default()
        };

        if total == 0 || too_new > 0 {
            return Ok(report);
        }

        self.ensure_parents(&tasks).await;

        let mut completed = 0;
        let pending: Vec<_> = tasks
            .iter()
            .map(|task| async move {
                let result = self.upload_one(task).await;
                (task, result)
            })
            .collect();
        let mut transfers = stream::iter(pending).buffer_unordered(self.concurrency);

        while let Some((task, result)) = transfers.next().await {
            completed += 1;
            match result {
                Ok(skipped) => {
                    report.succeeded += 1;
                    if skipped {
                        report.skipped += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        file = %task.relative_key,
                        remote = %task.remote_dest,
                        error = %e,
                        "File upload failed"
                    );
                    report.failures.push(UploadFailure {
                        relative_key: task.relative_key.clone(),
                        error: e.to_string(),
                        transient: e.is_transient(),
                    });
                }
            }
            progress.report(completed, total, &task.relative_key);
        }

        report
            .failures
            .sort_by(|a, b| a.relative_key.cmp(&b.relative_key));
        Ok(report)
    }

    /// Files to upload, sorted by relative path
    pub async fn collect_tasks(&self, local_dir: &Path, remote_root: &str) -> Result<CollectedFiles> {
        let dir = local_dir.to_path_buf();
        let root = remote_root.to_string();
        let min_age = self.min_file_age;

        tokio::task::spawn_blocking(move || collect_files(&dir, &root, min_age))
            .await
            .map_err(|e| RouteError::Job(format!("File listing task failed: {e}")))?
    }

    /// Create each distinct remote parent once before any transfer starts
    async fn ensure_parents(&self, tasks: &[UploadTask]) {
        let parents: BTreeSet<&str> = tasks
            .iter()
            .filter_map(|t| parent_path(&t.remote_dest))
            .collect();

        for parent in parents {
            let result = self
                .retry
                .run("create_folder", || self.store.create_folder(parent))
                .await;
            if let Err(e) = result {
                // Uploads create missing parents themselves; this only costs a round trip
                tracing::warn!(folder = %parent, error = %e, "Could not pre-create folder");
            }
        }
    }

    /// Returns `Ok(true)` when the file was skipped as already present
    async fn upload_one(&self, task: &UploadTask) -> Result<bool> {
        if self.skip_existing {
            match self.store.get_metadata(&task.remote_dest).await {
                Ok(status) if status.exists() => return Ok(true),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(file = %task.relative_key, error = %e, "Existence check failed")
                }
            }
        }

        self.retry
            .run(&task.relative_key, || self.transfer(task))
            .await?;
        Ok(false)
    }

    async fn transfer(&self, task: &UploadTask) -> Result<()> {
        if task.size as usize <= self.chunk_size {
            let data = tokio::fs::read(&task.local_file)
                .await
                .map_err(|e| local_io_error(&task.local_file, e))?;
            return self.store.upload(data, &task.remote_dest, true).await;
        }

        let mut file = tokio::fs::File::open(&task.local_file)
            .await
            .map_err(|e| local_io_error(&task.local_file, e))?;
        let size = task.size as usize;

        let first = read_chunk(&mut file, &task.local_file, self.chunk_size).await?;
        let session_id = self.store.start_upload_session(first).await?;
        let mut offset = self.chunk_size;

        while size - offset > self.chunk_size {
            let chunk = read_chunk(&mut file, &task.local_file, self.chunk_size).await?;
            self.store
                .append_to_session(&session_id, chunk, offset as u64)
                .await?;
            offset += self.chunk_size;
        }

        let last = read_chunk(&mut file, &task.local_file, size - offset).await?;
        self.store
            .finish_session(&session_id, last, offset as u64, &task.remote_dest, true)
            .await
    }
}

async fn read_chunk(file: &mut tokio::fs::File, path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)
        .await
        .map_err(|e| local_io_error(path, e))?;
    Ok(buf)
}

/// A vanished or truncated file will not come back on retry
fn local_io_error(path: &Path, e: std::io::Error) -> RouteError {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::UnexpectedEof => {
            RouteError::Job(format!("{}: {e}", path.display()))
        }
        _ => RouteError::Io(format!("{}: {e}", path.display())),
    }
}

fn collect_files(local_dir: &Path, remote_root: &str, min_age: Duration) -> Result<CollectedFiles> {
    if !local_dir.is_dir() {
        return Err(RouteError::Io(format!(
            "Job folder {} is not readable",
            local_dir.display()
        )));
    }

    let now = SystemTime::now();
    let mut tasks = Vec::new();
    let mut too_new = 0;

    for entry in WalkDir::new(local_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if is_junk_file(entry.path(), meta.len()) {
            continue;
        }

        let old_enough = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .is_some_and(|age| age >= min_age);
        if !old_enough {
            tracing::debug!(file = %entry.path().display(), "File too new, leaving for later");
            too_new += 1;
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(local_dir) else {
            continue;
        };
        let relative_key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        tasks.push(UploadTask {
            local_file: entry.path().to_path_buf(),
            remote_dest: join_path(remote_root, &relative_key),
            relative_key,
            size: meta.len(),
        });
    }

    tasks.sort_by(|a, b| a.relative_key.cmp(&b.relative_key));
    Ok(CollectedFiles { tasks, too_new })
}
