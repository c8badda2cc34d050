//! Pipeline orchestrator
//!
//! Ties the watcher, assignment, resolver, uploader and ledger together. One
//! task polls on an interval and dispatches ready jobs one at a time:
//!
//! 1. Read the current assignment snapshot (asking the operator if unset)
//! 2. Work out the remote destination
//! 3. Upload the job folder
//! 4. Tag and annotate the order (best effort, never fails the job)
//! 5. Mark the job in the ledger
//!
//! A job is marked only after its upload attempt concludes. Jobs that fail
//! stay unmarked and are retried on later ticks until they hit the attempt
//! cap, after which they are quarantined for the rest of the process.
//! Deferred jobs are not failures and never count towards the cap.

use crate::adapters::orders::OrderSystem;
use crate::adapters::store::{join_path, ObjectStore};
use crate::config::RouteConfig;
use crate::core::assignment::{AssignedOrder, Assignment, OrderAssignment, SetOrderOutcome};
use crate::core::ledger::ProcessedLedger;
use crate::core::metadata_sync::MetadataSyncQueue;
use crate::core::resolver::CustomerRootResolver;
use crate::core::retry::RetryPolicy;
use crate::core::upload::{ProgressSink, TracingProgress, UploadEngine, UploadReport};
use crate::core::watcher::PathWatcher;
use crate::domain::{Job, JobOutcome, Result, RouteError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// What the operator picked for an unassigned job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationChoice {
    Staging,
    Query(String),
}

/// Asks the operator for a destination when none is assigned
#[async_trait]
pub trait DestinationChooser: Send + Sync {
    /// `None` means no operator is available; the job is deferred
    async fn choose_destination(&self, job: &Job) -> Option<DestinationChoice>;
}

/// Chooser for unattended runs: always defers
pub struct NoOperator;

#[async_trait]
impl DestinationChooser for NoOperator {
    async fn choose_destination(&self, _job: &Job) -> Option<DestinationChoice> {
        None
    }
}

/// Where a job is uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// `<root>/_staging/<job key>`
    Staging { path: String },
    /// `<order folder>/<scan id>`
    Order {
        order_id: String,
        order_number: String,
        path: String,
    },
}

impl Destination {
    /// Remote folder the job is uploaded into
    pub fn path(&self) -> &str {
        match self {
            Destination::Staging { path } | Destination::Order { path, .. } => path,
        }
    }
}

/// Next step for a job given an assignment snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationPlan {
    /// No assignment: ask the operator
    Ask,
    /// Destination known
    Ready(Destination),
    /// Order assigned but its folder has not been resolved yet
    Resolve(AssignedOrder),
}

/// Work out a job's destination from a snapshot without touching the network
pub fn plan_destination(job: &Job, snapshot: &Assignment, staging_root: &str) -> DestinationPlan {
    match snapshot {
        Assignment::Unset => DestinationPlan::Ask,
        Assignment::Staging => DestinationPlan::Ready(Destination::Staging {
            path: join_path(staging_root, &job.key),
        }),
        Assignment::Assigned(order) => match &order.order_path {
            Some(order_path) => DestinationPlan::Ready(Destination::Order {
                order_id: order.order_id.clone(),
                order_number: order.order_number.clone(),
                path: join_path(order_path, job.scan_id()),
            }),
            None => DestinationPlan::Resolve(order.clone()),
        },
    }
}

/// Result of one dispatched job
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub job_key: String,
    pub destination: Destination,
    pub outcome: JobOutcome,
    pub upload: UploadReport,
}

/// Totals for a `watch` run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub jobs_complete: usize,
    pub jobs_partial: usize,
    pub jobs_empty: usize,
    pub jobs_failed: usize,
    pub jobs_quarantined: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub duration: Duration,
}

impl RunSummary {
    fn record(&mut self, report: &DispatchReport) {
        match report.outcome {
            JobOutcome::Complete => self.jobs_complete += 1,
            JobOutcome::Partial => self.jobs_partial += 1,
            JobOutcome::Empty => self.jobs_empty += 1,
        }
        self.files_uploaded += report.upload.succeeded;
        self.files_failed += report.upload.failures.len();
    }
}

/// Settings the orchestrator reads from configuration
#[derive(Debug, Clone)]
struct Settings {
    staging_root: String,
    lab_name: String,
    auto_tags: Vec<String>,
    note_enabled: bool,
    dry_run: bool,
    max_job_attempts: u32,
    poll_interval: Duration,
    retention: Option<chrono::Duration>,
    skip_existing_on_start: bool,
}

/// Drives the pipeline
pub struct Orchestrator {
    settings: Settings,
    watcher: PathWatcher,
    ledger: Arc<ProcessedLedger>,
    assignment: Arc<OrderAssignment>,
    resolver: Arc<CustomerRootResolver>,
    uploader: UploadEngine,
    orders: Arc<dyn OrderSystem>,
    chooser: Arc<dyn DestinationChooser>,
    progress: Arc<dyn ProgressSink>,
    metadata: Option<Arc<MetadataSyncQueue>>,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    attempts: Mutex<HashMap<String, u32>>,
    quarantined: Mutex<HashSet<String>>,
}

impl Orchestrator {
    /// Build the pipeline from configuration and adapters
    ///
    /// Must be called inside a Tokio runtime (the metadata worker is spawned
    /// here). Dry runs skip every order-system write.
    pub fn new(
        config: &RouteConfig,
        store: Arc<dyn ObjectStore>,
        orders: Arc<dyn OrderSystem>,
        chooser: Arc<dyn DestinationChooser>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let dry_run = config.application.dry_run;
        let retry = RetryPolicy::from_config(&config.retry);
        let ledger = Arc::new(ProcessedLedger::load(&config.ledger.path)?);

        let metadata = if dry_run {
            None
        } else {
            Some(Arc::new(MetadataSyncQueue::start(
                orders.clone(),
                retry,
                config.pipeline.metadata_queue_capacity,
            )))
        };

        let mut resolver = CustomerRootResolver::new(store.clone(), retry, &config.dropbox.root);
        if let Some(queue) = &metadata {
            resolver = resolver.with_metadata_sync(queue.clone());
        }
        let resolver = Arc::new(resolver);

        let assignment = Arc::new(
            OrderAssignment::new(orders.clone(), retry)
                .with_resolver(resolver.clone())
                .with_search_limit(config.shopify.search_limit)
                .with_tag_writes(!dry_run),
        );

        let settings = Settings {
            staging_root: config.dropbox.staging_root(),
            lab_name: config.application.lab_name.clone(),
            auto_tags: config.pipeline.auto_tags.clone(),
            note_enabled: config.pipeline.note_enabled,
            dry_run,
            max_job_attempts: config.pipeline.max_job_attempts.max(1),
            poll_interval: config.watch.poll_interval(),
            retention: config.ledger.retention(),
            skip_existing_on_start: config.watch.skip_existing_on_start,
        };

        Ok(Self {
            settings,
            watcher: PathWatcher::new(&config.watch.root, config.watch.depth, config.watch.settle()),
            ledger,
            assignment,
            resolver,
            uploader: UploadEngine::from_config(store, retry, &config.upload),
            orders,
            chooser,
            progress: Arc::new(TracingProgress),
            metadata,
            retry,
            shutdown,
            attempts: Mutex::new(HashMap::new()),
            quarantined: Mutex::new(HashSet::new()),
        })
    }

    /// Report upload progress somewhere other than the log
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Shared assignment, for the operator console
    pub fn assignment(&self) -> Arc<OrderAssignment> {
        self.assignment.clone()
    }

    /// Processed ledger
    pub fn ledger(&self) -> Arc<ProcessedLedger> {
        self.ledger.clone()
    }

    /// Metadata write-back queue, absent in dry runs
    pub fn metadata_queue(&self) -> Option<Arc<MetadataSyncQueue>> {
        self.metadata.clone()
    }

    /// Customer root resolver
    pub fn resolver(&self) -> Arc<CustomerRootResolver> {
        self.resolver.clone()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Startup housekeeping: prune the ledger and remember existing folders
    pub async fn prepare(&self) -> Result<()> {
        if let Some(retention) = self.settings.retention {
            let removed = self
                .ledger
                .prune(retention, |key| self.watcher.job_exists(key))?;
            tracing::debug!(removed, "Ledger retention applied");
        }

        if self.settings.skip_existing_on_start {
            self.watcher.ignore_existing().await;
        }
        Ok(())
    }

    /// Poll on the configured interval until shutdown
    ///
    /// The job in flight when shutdown is requested finishes first; the
    /// metadata queue is drained before returning.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut shutdown = self.shutdown.clone();

        self.prepare().await?;

        tracing::info!(
            root = %self.watcher.root().display(),
            interval_secs = self.settings.poll_interval.as_secs_f64(),
            dry_run = self.settings.dry_run,
            "Watching for scan folders"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
            // Not raced against shutdown so an in-flight job is never cut short
            self.tick(&mut summary).await;
        }

        tracing::info!("Shutdown requested, stopping watcher");
        if let Some(queue) = &self.metadata {
            queue.close().await;
        }

        summary.duration = started.elapsed();
        Ok(summary)
    }

    /// One poll: dispatch every ready job in key order
    ///
    /// Deferred jobs (no destination yet, or files still too new) are
    /// picked up again on a later tick without counting as failed attempts.
    pub async fn tick(&self, summary: &mut RunSummary) {
        self.forget_missing_jobs();
        let jobs = self.watcher.poll(&self.ledger).await;
        if !jobs.is_empty() {
            tracing::info!(count = jobs.len(), "Ready jobs found");
        }

        for job in jobs {
            if self.shutdown_requested() {
                break;
            }
            if self.is_quarantined(&job.key) {
                continue;
            }

            match self.dispatch(&job).await {
                Ok(report) => {
                    self.clear_attempts(&job.key);
                    summary.record(&report);
                }
                Err(RouteError::Deferred(reason)) => {
                    tracing::debug!(job = %job.key, reason = %reason, "Job deferred");
                }
                Err(e) => {
                    summary.jobs_failed += 1;
                    if self.record_failure(&job.key, &e) {
                        summary.jobs_quarantined += 1;
                    }
                }
            }
        }
    }

    /// Upload one job to the current destination and record it
    pub async fn dispatch(&self, job: &Job) -> Result<DispatchReport> {
        let destination = self.destination_for(job).await?;
        crate::log_job_start!(job.key, destination.path());
        let started = Instant::now();

        let upload = self
            .uploader
            .upload(&job.local_path, destination.path(), self.progress.as_ref())
            .await?;

        if upload.is_deferred() {
            return Err(RouteError::Deferred(format!(
                "{} files in {} are still too new",
                upload.deferred, job.key
            )));
        }

        crate::log_job_complete!(job.key, upload.succeeded, upload.total, started.elapsed());

        let outcome = upload.outcome().ok_or_else(|| {
            RouteError::Job(format!(
                "No files of {} uploaded for {}",
                upload.total, job.key
            ))
        })?;

        if outcome != JobOutcome::Empty {
            if let Destination::Order { order_id, .. } = &destination {
                self.run_side_effects(job, order_id, upload.succeeded).await;
            }
        } else {
            tracing::info!(job = %job.key, "Job folder has no uploadable files");
        }

        if let Err(e) = self.ledger.mark_processed(&job.key, outcome) {
            tracing::error!(job = %job.key, error = %e, "Failed to persist ledger");
        }

        if outcome == JobOutcome::Partial {
            tracing::warn!(
                job = %job.key,
                failed = upload.failures.len(),
                total = upload.total,
                "Job uploaded with failures"
            );
        }

        Ok(DispatchReport {
            job_key: job.key.clone(),
            destination,
            outcome,
            upload,
        })
    }

    async fn destination_for(&self, job: &Job) -> Result<Destination> {
        loop {
            let snapshot = self.assignment.snapshot();
            match plan_destination(job, &snapshot, &self.settings.staging_root) {
                DestinationPlan::Ready(destination) => return Ok(destination),
                DestinationPlan::Resolve(order) => {
                    let dest = self
                        .resolver
                        .resolve(&order.customer, &order.order_number)
                        .await?;
                    self.assignment.remember_destination(&order.order_id, &dest);
                    return Ok(Destination::Order {
                        order_id: order.order_id,
                        order_number: order.order_number,
                        path: join_path(&dest.order_path, job.scan_id()),
                    });
                }
                DestinationPlan::Ask => self.ask_operator(job).await?,
            }
        }
    }

    async fn ask_operator(&self, job: &Job) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        let choice = tokio::select! {
            choice = self.chooser.choose_destination(job) => choice,
            _ = wait_for_shutdown(&mut shutdown) => None,
        };

        match choice {
            Some(DestinationChoice::Staging) => {
                self.assignment.set_staging().await;
                Ok(())
            }
            Some(DestinationChoice::Query(query)) => {
                match self.assignment.set_order(&query).await {
                    Ok(SetOrderOutcome::Assigned(_)) => {}
                    Ok(SetOrderOutcome::NotFound) => {
                        tracing::warn!(query = %query, "No order found, asking again")
                    }
                    Err(e) => tracing::warn!(query = %query, error = %e, "Order lookup failed"),
                }
                Ok(())
            }
            None => Err(RouteError::Deferred(format!(
                "No destination assigned for {}",
                job.key
            ))),
        }
    }

    async fn run_side_effects(&self, job: &Job, order_id: &str, files: usize) {
        if self.settings.dry_run {
            tracing::info!(job = %job.key, "Dry run: skipping order tags and note");
            return;
        }

        if !self.settings.auto_tags.is_empty() {
            let tags = &self.settings.auto_tags;
            if let Err(e) = self
                .retry
                .run("add_tags", || self.orders.add_tags(order_id, tags))
                .await
            {
                tracing::warn!(job = %job.key, error = %e, "Could not tag order");
            }
        }

        if self.settings.note_enabled {
            let note = audit_note(&self.settings.lab_name, &job.key, files);
            if let Err(e) = self
                .retry
                .run("append_note", || self.orders.append_note(order_id, &note))
                .await
            {
                tracing::warn!(job = %job.key, error = %e, "Could not annotate order");
            }
        }
    }

    fn is_quarantined(&self, key: &str) -> bool {
        match self.quarantined.lock() {
            Ok(set) => set.contains(key),
            Err(poisoned) => poisoned.into_inner().contains(key),
        }
    }

    /// Drop attempt counts and quarantine entries for folders that are gone
    fn forget_missing_jobs(&self) {
        let mut attempts = match self.attempts.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        attempts.retain(|key, _| self.watcher.job_exists(key));
        drop(attempts);

        let mut quarantined = match self.quarantined.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        quarantined.retain(|key| self.watcher.job_exists(key));
    }

    /// Jobs with at least one failed attempt that have not succeeded since
    pub fn pending_attempts(&self) -> usize {
        match self.attempts.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn clear_attempts(&self, key: &str) {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.remove(key);
        }
    }

    /// Count a failed attempt; returns true when the job is now quarantined
    fn record_failure(&self, key: &str, error: &RouteError) -> bool {
        let attempts = {
            let mut map = match self.attempts.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            let count = map.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if attempts >= self.settings.max_job_attempts {
            tracing::error!(
                job = %key,
                attempts,
                error = %error,
                "Job failed repeatedly, quarantined until restart"
            );
            match self.quarantined.lock() {
                Ok(mut set) => set.insert(key.to_string()),
                Err(poisoned) => poisoned.into_inner().insert(key.to_string()),
            };
            true
        } else {
            tracing::warn!(
                job = %key,
                attempt = attempts,
                max_attempts = self.settings.max_job_attempts,
                error = %error,
                "Job failed, will retry on a later tick"
            );
            false
        }
    }
}

/// Order note recorded after each upload
pub fn audit_note(lab_name: &str, job_key: &str, files: usize) -> String {
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
    format!("Scans uploaded ({stamp}) via {lab_name}: {job_key}, {files} files")
}

/// Resolves once shutdown is signalled; never resolves if the sender is gone
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
