// scanroute - Scan folder to Dropbox router
// Copyright (c) 2025 Scanroute Contributors
// Licensed under the MIT License

//! # scanroute - Scan folder to Dropbox router
//!
//! scanroute watches the folder a film scanner writes into and uploads each
//! finished job to the Dropbox folder of the Shopify order the operator is
//! currently working on.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Watching** a scan folder for job folders that have stopped changing
//! - **Routing** each job to a staging area or an order folder
//!   (`<root>/<customer email>/<order number>/<scan id>`)
//! - **Uploading** job files concurrently with chunked sessions and retries
//! - **Annotating** orders with tags and an audit note
//! - **Remembering** processed jobs in a JSON ledger that survives restarts
//!
//! ## Architecture
//!
//! scanroute follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and the operator console
//! - [`core`] - Business logic (watcher, ledger, uploads, assignment, orchestration)
//! - [`adapters`] - External integrations (Dropbox, Shopify, in-memory doubles)
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanroute::adapters::factory::{create_object_store, create_order_system};
//! use scanroute::config::load_config;
//! use scanroute::core::orchestrator::{NoOperator, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("scanroute.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let orchestrator = Orchestrator::new(
//!         &config,
//!         create_object_store(&config)?,
//!         create_order_system(&config)?,
//!         Arc::new(NoOperator),
//!         shutdown_rx,
//!     )?;
//!     orchestrator.assignment().set_order("136720").await?;
//!
//!     let summary = orchestrator.run().await?;
//!     println!("Uploaded {} files", summary.files_uploaded);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! scanroute uses the [`domain::RouteError`] type for all errors. Remote
//! failures carry a retry classification:
//!
//! ```rust
//! use scanroute::domain::{RouteError, StoreError};
//! use std::time::Duration;
//!
//! let err: RouteError = StoreError::RateLimited {
//!     retry_after: Some(Duration::from_secs(3)),
//!     message: "too_many_write_operations".to_string(),
//! }
//! .into();
//! assert!(err.is_transient());
//! ```
//!
//! ## Logging
//!
//! scanroute uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! tracing::info!(job = "2024-01-15/roll_001", files = 36, "Job uploaded");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
