//! Core routing logic for scanroute.
//!
//! # Modules
//!
//! - [`watcher`] - Discovers settled job folders in the watch root
//! - [`ledger`] - Persistent record of processed jobs
//! - [`upload`] - Concurrent, retried uploads of one job folder
//! - [`resolver`] - Customer root folders and shared links
//! - [`metadata_sync`] - Background write-back of links to customer records
//! - [`assignment`] - The operator's current destination and pending tags
//! - [`orchestrator`] - The poll loop tying everything together
//! - [`reassign`] - Moving staged jobs into order folders
//! - [`retry`] - Backoff policy shared by every remote call
//!
//! # Job Workflow
//!
//! 1. **Poll**: list job folders whose newest file has settled
//! 2. **Plan**: staging, a known order, or ask the operator
//! 3. **Resolve**: customer root, shared link and order folder
//! 4. **Upload**: every file, preserving relative paths
//! 5. **Annotate**: order tags and an audit note
//! 6. **Record**: mark the job in the ledger
//!
//! # Example
//!
//! ```rust,no_run
//! use scanroute::adapters::factory::{create_object_store, create_order_system};
//! use scanroute::config::load_config;
//! use scanroute::core::orchestrator::{NoOperator, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("scanroute.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let store = create_object_store(&config)?;
//! let orders = create_order_system(&config)?;
//! let orchestrator = Orchestrator::new(&config, store, orders, Arc::new(NoOperator), shutdown_rx)?;
//!
//! orchestrator.prepare().await?;
//! let summary = orchestrator.run().await?;
//! println!("Uploaded {} files", summary.files_uploaded);
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod ledger;
pub mod metadata_sync;
pub mod orchestrator;
pub mod reassign;
pub mod resolver;
pub mod retry;
pub mod upload;
pub mod watcher;
