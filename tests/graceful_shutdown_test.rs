//! Integration tests for graceful shutdown
//!
//! These tests verify that:
//! - A shutdown signal stops the watch loop
//! - A job waiting on the operator is released by shutdown
//! - Jobs finished before shutdown are on disk in the ledger
//! - Queued link write-backs are drained before the run returns

use async_trait::async_trait;
use filetime::FileTime;
use scanroute::adapters::orders::{MemoryOrderSystem, OrderCall};
use scanroute::adapters::store::MemoryObjectStore;
use scanroute::config::{
    ApplicationConfig, DropboxConfig, LedgerConfig, LoggingConfig, PipelineConfig, RetryConfig,
    RouteConfig, ShopifyConfig, UploadConfig, WatchConfig,
};
use scanroute::core::ledger::ProcessedLedger;
use scanroute::core::orchestrator::{
    DestinationChoice, DestinationChooser, NoOperator, Orchestrator,
};
use scanroute::domain::{CustomerRecord, Job, OrderRecord};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

fn config(dir: &Path) -> RouteConfig {
    RouteConfig {
        application: ApplicationConfig::default(),
        watch: WatchConfig {
            root: dir.join("scans").to_string_lossy().into_owned(),
            depth: 1,
            poll_interval_secs: 1,
            settle_seconds: 1.0,
            skip_existing_on_start: false,
        },
        ledger: LedgerConfig {
            path: dir.join("processed.json").to_string_lossy().into_owned(),
            retention_days: 0,
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
            jitter_ms: 0,
        },
        upload: UploadConfig::default(),
        dropbox: DropboxConfig::default(),
        shopify: ShopifyConfig::default(),
        pipeline: PipelineConfig::default(),
        logging: LoggingConfig::console_only(),
    }
}

fn write_job(root: &Path, key: &str) {
    let dir = root.join(key);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("0001.jpg");
    fs::write(&path, b"frame").unwrap();
    let past = FileTime::from_unix_time(chrono::Utc::now().timestamp() - 60, 0);
    filetime::set_file_mtime(&path, past).unwrap();
}

/// Operator that never answers
struct AbsentOperator;

#[async_trait]
impl DestinationChooser for AbsentOperator {
    async fn choose_destination(&self, _job: &Job) -> Option<DestinationChoice> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[tokio::test]
async fn test_idle_run_stops_on_signal() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    fs::create_dir_all(&config.watch.root).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(
        &config,
        Arc::new(MemoryObjectStore::new()),
        Arc::new(MemoryOrderSystem::new()),
        Arc::new(NoOperator),
        shutdown_rx,
    )
    .unwrap();

    let run = tokio::spawn(async move { orchestrator.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(summary.jobs_complete, 0);
    assert_eq!(summary.jobs_failed, 0);
}

#[tokio::test]
async fn test_shutdown_releases_operator_prompt() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    write_job(Path::new(&config.watch.root), "roll_001");

    let store = Arc::new(MemoryObjectStore::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(
        &config,
        store.clone(),
        Arc::new(MemoryOrderSystem::new()),
        Arc::new(AbsentOperator),
        shutdown_rx,
    )
    .unwrap();

    let run = tokio::spawn(async move { orchestrator.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("prompt kept the run alive")
        .unwrap()
        .unwrap();

    assert_eq!(summary.jobs_complete, 0);
    assert!(store.file_paths().is_empty());
    let ledger = ProcessedLedger::load(&config.ledger.path).unwrap();
    assert!(!ledger.is_processed("roll_001"));
}

#[tokio::test]
async fn test_completed_jobs_and_write_backs_survive_shutdown() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    write_job(Path::new(&config.watch.root), "roll_001");

    let orders = Arc::new(MemoryOrderSystem::new().with_order(OrderRecord {
        id: "gid://shopify/Order/1".to_string(),
        name: "#100".to_string(),
        created_at: None,
        email: Some("a@b.com".to_string()),
        customer: Some(CustomerRecord::new(
            Some("gid://shopify/Customer/1".to_string()),
            "a@b.com",
        )),
    }));
    let store = Arc::new(MemoryObjectStore::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(
        &config,
        store.clone(),
        orders.clone(),
        Arc::new(NoOperator),
        shutdown_rx,
    )
    .unwrap();
    orchestrator.assignment().set_order("100").await.unwrap();

    let run = tokio::spawn(async move { orchestrator.run().await });
    while store.file_paths().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown_tx.send(true).unwrap();
    let summary = run.await.unwrap().unwrap();

    assert_eq!(summary.jobs_complete, 1);
    assert_eq!(summary.files_uploaded, 1);

    let ledger = ProcessedLedger::load(&config.ledger.path).unwrap();
    assert!(ledger.is_processed("roll_001"));

    // run() closes the metadata queue, so the write-back has landed
    assert_eq!(orders.call_count(OrderCall::SetCustomerLink), 1);
    assert!(orders.customer_link("gid://shopify/Customer/1").is_some());
}
