//! Reassign-staged command implementation
//!
//! Without `--job`, lists the jobs waiting in the staging area. With
//! `--job` and `--order`, moves that job into the order's folder.

use crate::adapters::factory::{create_object_store, create_order_system};
use crate::adapters::orders::OrderSystem;
use crate::adapters::store::ObjectStore;
use crate::config::{load_config, RouteConfig};
use crate::core::assignment::lookup_order;
use crate::core::metadata_sync::MetadataSyncQueue;
use crate::core::reassign::{find_staged, list_staged, reassign_staged, StagedJob};
use crate::core::resolver::CustomerRootResolver;
use crate::core::retry::RetryPolicy;
use crate::domain::OrderQuery;
use clap::Args;
use std::sync::Arc;

/// Arguments for the reassign-staged command
#[derive(Args, Debug)]
pub struct ReassignStagedArgs {
    /// Staged job key, e.g. `2024-01-15/roll_001`
    #[arg(long, requires = "order")]
    pub job: Option<String>,

    /// Order to move the job into (order number, email or free text)
    #[arg(long, requires = "job")]
    pub order: Option<String>,

    /// Only print what would be moved
    #[arg(long)]
    pub dry_run: bool,
}

impl ReassignStagedArgs {
    /// Execute the reassign-staged command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting reassign-staged command");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let (store, orders) = match (create_object_store(&config), create_order_system(&config)) {
            (Ok(store), Ok(orders)) => (store, orders),
            (Err(e), _) | (_, Err(e)) => {
                eprintln!("Failed to initialize clients: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let retry = RetryPolicy::from_config(&config.retry);
        let staging_root = config.dropbox.staging_root();
        let listing = list_staged(store.as_ref(), &retry, &staging_root, config.watch.depth);
        let staged = match listing.await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to list {staging_root}: {e}");
                return Ok(4);
            }
        };

        let (Some(job), Some(order)) = (self.job.as_deref(), self.order.as_deref()) else {
            if staged.is_empty() {
                println!("No staged jobs in {staging_root}.");
            } else {
                println!("📦 {} staged job(s) in {staging_root}:", staged.len());
                for s in &staged {
                    println!("  {}", s.key);
                }
            }
            return Ok(0);
        };

        let Some(staged_job) = find_staged(&staged, job) else {
            eprintln!("❌ No staged job '{job}' in {staging_root}");
            return Ok(5); // Fatal error exit code
        };

        self.move_job(&config, store, orders, retry, staged_job, order)
            .await
    }

    async fn move_job(
        &self,
        config: &RouteConfig,
        store: Arc<dyn ObjectStore>,
        orders: Arc<dyn OrderSystem>,
        retry: RetryPolicy,
        staged_job: &StagedJob,
        order: &str,
    ) -> anyhow::Result<i32> {
        let Some(query) = OrderQuery::parse(order) else {
            eprintln!("❌ Order query is empty");
            return Ok(2);
        };

        let found = match lookup_order(
            orders.as_ref(),
            &retry,
            &query,
            config.shopify.search_limit,
        )
        .await
        {
            Ok(Some(found)) => found,
            Ok(None) => {
                eprintln!("❌ No order matches '{order}'");
                return Ok(5);
            }
            Err(e) => {
                eprintln!("❌ Order lookup failed: {e}");
                return Ok(4);
            }
        };
        let (order_record, customer) = found;

        if self.dry_run {
            println!(
                "🔍 Would move {} to order #{} of {}",
                staged_job.path,
                order_record.order_number(),
                customer.email
            );
            return Ok(0);
        }

        let queue = Arc::new(MetadataSyncQueue::start(
            orders.clone(),
            retry,
            config.pipeline.metadata_queue_capacity,
        ));
        let resolver = CustomerRootResolver::new(store.clone(), retry, &config.dropbox.root)
            .with_metadata_sync(queue.clone());

        let result = reassign_staged(
            store.as_ref(),
            &resolver,
            &retry,
            staged_job,
            &customer,
            order_record.order_number(),
        )
        .await;

        let code = match result {
            Ok(target) => {
                println!("✅ Moved {} to {}", staged_job.path, target);
                if !query.pending_tags.is_empty() {
                    let tags = &query.pending_tags;
                    match retry
                        .run("add_tags", || orders.add_tags(&order_record.id, tags))
                        .await
                    {
                        Ok(()) => println!("   Tagged order with {}", tags.join(", ")),
                        Err(e) => eprintln!("⚠️  Could not tag order: {e}"),
                    }
                }
                0
            }
            Err(e) => {
                tracing::error!(job = %staged_job.key, error = %e, "Reassignment failed");
                eprintln!("❌ Failed to move {}: {e}", staged_job.key);
                5
            }
        };

        queue.close().await;
        Ok(code)
    }
}
