//! Watch command implementation
//!
//! This module implements the `watch` command: poll the scan folder, upload
//! settled jobs to the operator's current destination and take destination
//! commands on stdin.

use crate::adapters::factory::{create_object_store, create_order_system};
use crate::cli::console::{ConsolePrompt, OperatorConsole};
use crate::config::{read_config, RouteConfig};
use crate::core::assignment::{OrderAssignment, SetOrderOutcome};
use crate::core::orchestrator::{DestinationChooser, NoOperator, Orchestrator, RunSummary};
use clap::Args;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Dry run mode - upload to an in-memory store and skip order writes
    #[arg(long)]
    pub dry_run: bool,

    /// Start with this order assigned (order number, email or free text)
    #[arg(long, conflicts_with = "stage")]
    pub order: Option<String>,

    /// Start with the staging area as destination
    #[arg(long)]
    pub stage: bool,

    /// Run unattended: no stdin console, unassigned jobs wait
    #[arg(long)]
    pub no_console: bool,
}

impl WatchArgs {
    /// Apply CLI overrides to a freshly read configuration
    pub fn apply_overrides(&self, config: &mut RouteConfig) {
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
    }

    /// Execute the watch command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting watch command");

        let mut config = match read_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2); // Configuration error exit code
            }
        };
        self.apply_overrides(&mut config);

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        if config.application.dry_run {
            tracing::info!("Dry run mode enabled - nothing is written to Dropbox or Shopify");
            println!("🔍 DRY RUN MODE - uploads go to memory, orders are not modified");
            println!();
        }

        let (store, orders) = match (create_object_store(&config), create_order_system(&config)) {
            (Ok(store), Ok(orders)) => (store, orders),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to create remote clients");
                eprintln!("Failed to initialize clients: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        // Quitting the console stops the run just like a signal does
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(forward_shutdown(shutdown_signal, stop_tx.clone()));

        let prompt = Arc::new(ConsolePrompt::new());
        let chooser: Arc<dyn DestinationChooser> = if self.no_console {
            Arc::new(NoOperator)
        } else {
            prompt.clone()
        };

        let orchestrator = match Orchestrator::new(&config, store, orders, chooser, stop_rx) {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create orchestrator");
                eprintln!("Failed to initialize watcher: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        let assignment = orchestrator.assignment();
        self.apply_initial_destination(&assignment).await;

        if !self.no_console {
            let console = OperatorConsole::new(assignment.clone(), prompt);
            tokio::spawn(async move {
                console.run(BufReader::new(tokio::io::stdin())).await;
                tracing::info!("Console closed, stopping");
                let _ = stop_tx.send(true);
            });
        }

        println!("👀 Watching {} (Ctrl+C or 'q' to stop)", config.watch.root);
        println!("   Destination: {}", assignment.snapshot());
        println!();

        let summary = match orchestrator.run().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Watch failed");
                eprintln!("Watch failed: {e}");
                return Ok(5);
            }
        };

        // Pending suffix tags would otherwise be lost on exit
        if let Err(e) = assignment.apply_pending_tags().await {
            tracing::warn!(error = %e, "Could not apply pending tags on exit");
        }

        print_summary(&summary);
        Ok(0)
    }

    async fn apply_initial_destination(&self, assignment: &OrderAssignment) {
        if self.stage {
            assignment.set_staging().await;
            return;
        }
        let Some(query) = self.order.as_deref() else {
            return;
        };
        match assignment.set_order(query).await {
            Ok(SetOrderOutcome::Assigned(order)) => {
                tracing::info!(order = %order.order_number, "Initial order assigned");
            }
            Ok(SetOrderOutcome::NotFound) => {
                eprintln!("⚠️  No order matches '{query}', starting without a destination");
            }
            Err(e) => {
                eprintln!("⚠️  Order lookup for '{query}' failed: {e}");
            }
        }
    }
}

async fn forward_shutdown(mut signal: watch::Receiver<bool>, stop: watch::Sender<bool>) {
    loop {
        if *signal.borrow() {
            let _ = stop.send(true);
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Watch Summary:");
    println!("  Jobs complete: {}", summary.jobs_complete);
    println!("  Jobs partial: {}", summary.jobs_partial);
    println!("  Jobs empty: {}", summary.jobs_empty);
    println!("  Failed attempts: {}", summary.jobs_failed);
    println!("  Quarantined: {}", summary.jobs_quarantined);
    println!("  Files uploaded: {}", summary.files_uploaded);
    println!("  Files failed: {}", summary.files_failed);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ApplicationConfig, DropboxConfig, LedgerConfig, LoggingConfig, PipelineConfig,
        RetryConfig, ShopifyConfig, UploadConfig, WatchConfig,
    };

    fn config() -> RouteConfig {
        RouteConfig {
            application: ApplicationConfig::default(),
            watch: WatchConfig {
                root: "/mnt/scans".to_string(),
                ..WatchConfig::default()
            },
            ledger: LedgerConfig::default(),
            upload: UploadConfig::default(),
            retry: RetryConfig::default(),
            dropbox: DropboxConfig::default(),
            shopify: ShopifyConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    fn args(dry_run: bool) -> WatchArgs {
        WatchArgs {
            dry_run,
            order: None,
            stage: false,
            no_console: true,
        }
    }

    #[test]
    fn test_dry_run_override_relaxes_credentials() {
        let mut config = config();
        assert!(config.validate().is_err());

        args(true).apply_overrides(&mut config);
        assert!(config.application.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_override_without_flag() {
        let mut config = config();
        args(false).apply_overrides(&mut config);
        assert!(!config.application.dry_run);
    }

    #[tokio::test]
    async fn test_forward_shutdown() {
        let (signal_tx, signal_rx) = watch::channel(false);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(forward_shutdown(signal_rx, stop_tx));

        signal_tx.send(true).unwrap();
        stop_rx.changed().await.unwrap();
        assert!(*stop_rx.borrow());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_config_exits_with_config_code() {
        let (_tx, rx) = watch::channel(false);
        let code = args(true)
            .execute("/nonexistent/scanroute.toml", rx)
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
