//! Adapter factory
//!
//! Builds the object store and order system described by the configuration.

use crate::adapters::orders::{MemoryOrderSystem, OrderSystem, ShopifyOrderSystem};
use crate::adapters::store::{DropboxStore, MemoryObjectStore, ObjectStore};
use crate::config::RouteConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Create the object store
///
/// Dry runs never touch Dropbox: uploads land in an in-memory store that is
/// discarded on exit.
pub fn create_object_store(config: &RouteConfig) -> Result<Arc<dyn ObjectStore>> {
    if config.application.dry_run {
        tracing::info!("Dry run: using in-memory object store");
        return Ok(Arc::new(MemoryObjectStore::new()));
    }

    tracing::info!(root = %config.dropbox.root, "Creating Dropbox client");
    Ok(Arc::new(DropboxStore::new(&config.dropbox)?))
}

/// Create the order system
///
/// Dry runs still search Shopify when a token is configured so operators can
/// rehearse order assignment; writes are suppressed by the pipeline.
pub fn create_order_system(config: &RouteConfig) -> Result<Arc<dyn OrderSystem>> {
    if config.application.dry_run && config.shopify.admin_token.is_none() {
        tracing::info!("Dry run: using in-memory order system");
        return Ok(Arc::new(MemoryOrderSystem::new()));
    }

    tracing::info!(endpoint = %config.shopify.graphql_endpoint(), "Creating Shopify client");
    Ok(Arc::new(ShopifyOrderSystem::new(&config.shopify)?))
}
