//! External system integrations for scanroute.
//!
//! - [`store`] - Remote object store (Dropbox, in-memory)
//! - [`orders`] - Order management system (Shopify, in-memory)
//! - [`factory`] - Builds both from configuration
//!
//! # Design Pattern
//!
//! Adapters isolate third-party HTTP APIs behind traits so the pipeline can be
//! exercised end to end with the in-memory implementations.
//!
//! ```rust,no_run
//! use scanroute::adapters::factory::{create_object_store, create_order_system};
//! use scanroute::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("scanroute.toml")?;
//! let store = create_object_store(&config)?;
//! let orders = create_order_system(&config)?;
//!
//! let found = orders.search_orders("name:136720 OR order_number:136720", 10).await?;
//! let status = store.get_metadata(&config.dropbox.root).await?;
//! println!("{} orders, root exists: {}", found.len(), status.exists());
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod orders;
pub mod store;
