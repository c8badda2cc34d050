//! Customer root folder and shared link resolution
//!
//! Every customer gets one remote root folder, named after their email,
//! with a shared link the lab sends to the customer. Once created, the link
//! is written back to the customer record so later sessions can find the
//! folder again even if it was renamed or moved.

use crate::adapters::store::{join_path, FolderCreation, LinkCreation, ObjectStore};
use crate::core::metadata_sync::{LinkWriteBack, MetadataSyncQueue};
use crate::core::retry::RetryPolicy;
use crate::domain::{sanitize_order_number, CustomerRecord, Result, RouteError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A customer's remote root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRoot {
    /// Remote folder path
    pub path: String,
    /// Shared link for the folder, when one could be obtained
    pub shared_link_url: Option<String>,
}

/// Where an order's uploads go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDestination {
    /// Customer root folder
    pub root_path: String,
    /// Order folder below the customer root
    pub order_path: String,
}

/// Resolves and creates customer roots, caching them for the process lifetime
pub struct CustomerRootResolver {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    root: String,
    metadata: Option<Arc<MetadataSyncQueue>>,
    cache: Mutex<HashMap<String, CustomerRoot>>,
}

impl CustomerRootResolver {
    /// Create a resolver placing new customer folders under `root`
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy, root: impl Into<String>) -> Self {
        Self {
            store,
            retry,
            root: root.into(),
            metadata: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Write new links back to customer records through `queue`
    pub fn with_metadata_sync(mut self, queue: Arc<MetadataSyncQueue>) -> Self {
        self.metadata = Some(queue);
        self
    }

    fn cached(&self, key: &str) -> Option<CustomerRoot> {
        match self.cache.lock() {
            Ok(cache) => cache.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn remember(&self, key: String, root: CustomerRoot) {
        match self.cache.lock() {
            Ok(mut cache) => cache.insert(key, root),
            Err(poisoned) => poisoned.into_inner().insert(key, root),
        };
    }

    /// Resolve the customer root and ensure the order folder below it
    pub async fn resolve(
        &self,
        customer: &CustomerRecord,
        order_number: &str,
    ) -> Result<OrderDestination> {
        let root = self.resolve_root(customer).await?;
        let order_segment = sanitize_order_number(order_number);
        if order_segment.trim().is_empty() {
            return Err(RouteError::Validation(format!(
                "Order number '{order_number}' is not a usable folder name"
            )));
        }

        let order_path = join_path(&root.path, &order_segment);
        self.ensure_folder(&order_path).await?;

        Ok(OrderDestination {
            root_path: root.path,
            order_path,
        })
    }

    /// Resolve (or create) the customer's root folder and shared link
    pub async fn resolve_root(&self, customer: &CustomerRecord) -> Result<CustomerRoot> {
        let key = customer.folder_name();
        if key.is_empty() {
            return Err(RouteError::Validation(
                "Customer has no email to name a folder after".to_string(),
            ));
        }

        if let Some(root) = self.cached(&key) {
            return Ok(root);
        }

        // A stored link that only failed transiently may still be valid
        let mut stored_link_unverified = false;
        if let Some(url) = customer.stored_link.as_deref() {
            match self
                .retry
                .run("resolve_shared_link", || self.store.resolve_shared_link(url))
                .await
            {
                Ok(Some(path)) => {
                    tracing::debug!(customer = %key, path = %path, "Customer root found via stored link");
                    let root = CustomerRoot {
                        path,
                        shared_link_url: Some(url.to_string()),
                    };
                    self.remember(key, root.clone());
                    return Ok(root);
                }
                Ok(None) => {
                    tracing::warn!(customer = %key, "Stored shared link no longer resolves, recreating root")
                }
                Err(e) => {
                    stored_link_unverified = e.is_transient();
                    tracing::warn!(customer = %key, error = %e, "Could not resolve stored shared link")
                }
            }
        }

        let path = join_path(&self.root, &key);
        self.ensure_tree(&path).await?;

        let shared_link_url = match self.create_or_reuse_link(&path).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Could not obtain shared link");
                None
            }
        };

        if let (Some(url), Some(queue)) = (&shared_link_url, &self.metadata) {
            match customer.id.as_deref() {
                Some(_) if stored_link_unverified => {
                    tracing::info!(customer = %key, "Stored link kept until it can be checked")
                }
                Some(customer_id) if customer.stored_link.as_deref() != Some(url.as_str()) => {
                    queue.submit(LinkWriteBack {
                        customer_id: customer_id.to_string(),
                        url: url.clone(),
                    });
                }
                Some(_) => {}
                None => tracing::debug!(customer = %key, "Guest customer, link not written back"),
            }
        }

        let root = CustomerRoot {
            path,
            shared_link_url,
        };
        // Without a link, try again on the next job for this customer
        if root.shared_link_url.is_some() && !stored_link_unverified {
            self.remember(key, root.clone());
        }
        tracing::info!(path = %root.path, "Customer root ready");
        Ok(root)
    }

    /// Create every folder along `path`; existing folders are fine
    pub async fn ensure_tree(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.ensure_folder(&current).await?;
        }
        Ok(())
    }

    async fn ensure_folder(&self, path: &str) -> Result<()> {
        let outcome = self
            .retry
            .run("create_folder", || self.store.create_folder(path))
            .await?;
        if outcome == FolderCreation::Created {
            tracing::debug!(path = %path, "Created folder");
        }
        Ok(())
    }

    async fn create_or_reuse_link(&self, path: &str) -> Result<Option<String>> {
        let created = self
            .retry
            .run("create_shared_link", || self.store.create_shared_link(path))
            .await?;

        match created {
            LinkCreation::Created(url) => Ok(Some(url)),
            LinkCreation::AlreadyExists => {
                let links = self
                    .retry
                    .run("list_shared_links", || self.store.list_shared_links(path))
                    .await?;
                Ok(links.into_iter().next())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::orders::{MemoryOrderSystem, OrderCall};
    use crate::adapters::store::memory::InjectedFailure;
    use crate::adapters::store::{MemoryObjectStore, StoreCall};
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0)
    }

    fn customer() -> CustomerRecord {
        CustomerRecord::new(Some("gid://shopify/Customer/7".to_string()), " A@B.com ")
    }

    #[tokio::test]
    async fn test_creates_root_link_and_order_folder() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");

        let dest = resolver.resolve(&customer(), "#100/2").await.unwrap();

        assert_eq!(dest.root_path, "/Store/orders/a@b.com");
        assert_eq!(dest.order_path, "/Store/orders/a@b.com/100_2");
        assert!(store.has_folder("/Store/orders/a@b.com/100_2"));
        assert_eq!(store.call_count(StoreCall::CreateSharedLink), 1);
    }

    #[tokio::test]
    async fn test_second_resolve_uses_cache() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");

        let first = resolver.resolve(&customer(), "100").await.unwrap();
        let folders_after_first = store.call_count(StoreCall::CreateFolder);
        let second = resolver.resolve(&customer(), "100").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.call_count(StoreCall::CreateSharedLink), 1);
        // Only the order folder is ensured again
        assert_eq!(store.call_count(StoreCall::CreateFolder), folders_after_first + 1);
    }

    #[tokio::test]
    async fn test_existing_link_is_reused() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed_shared_link("/Store/orders/a@b.com", "https://db.tt/existing");
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");

        let root = resolver.resolve_root(&customer()).await.unwrap();
        assert_eq!(root.shared_link_url.as_deref(), Some("https://db.tt/existing"));
        assert_eq!(store.call_count(StoreCall::ListSharedLinks), 1);
    }

    #[tokio::test]
    async fn test_stored_link_wins() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed_shared_link("/Store/orders/renamed-folder", "https://db.tt/stored");
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");

        let root = resolver
            .resolve_root(&customer().with_stored_link("https://db.tt/stored"))
            .await
            .unwrap();

        assert_eq!(root.path, "/store/orders/renamed-folder");
        assert_eq!(store.call_count(StoreCall::CreateFolder), 0);
    }

    #[tokio::test]
    async fn test_dead_stored_link_falls_through() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");

        let root = resolver
            .resolve_root(&customer().with_stored_link("https://db.tt/gone"))
            .await
            .unwrap();

        assert_eq!(root.path, "/Store/orders/a@b.com");
        assert!(root.shared_link_url.is_some());
    }

    #[tokio::test]
    async fn test_new_link_is_written_back() {
        let store = Arc::new(MemoryObjectStore::new());
        let orders = Arc::new(MemoryOrderSystem::new());
        let queue = Arc::new(MetadataSyncQueue::start(orders.clone(), fast_retry(), 4));
        let resolver = CustomerRootResolver::new(store, fast_retry(), "/Store/orders")
            .with_metadata_sync(queue.clone());

        let root = resolver.resolve_root(&customer()).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(
            orders.customer_link("gid://shopify/Customer/7"),
            root.shared_link_url
        );
        queue.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_stored_link_is_not_overwritten() {
        let store = Arc::new(MemoryObjectStore::new());
        store.seed_shared_link("/Store/orders/renamed-folder", "https://db.tt/stored");
        store.inject_failures(
            StoreCall::ResolveSharedLink,
            "https://db.tt/stored",
            InjectedFailure::ServerError,
            3,
        );
        let orders = Arc::new(MemoryOrderSystem::new());
        let queue = Arc::new(MetadataSyncQueue::start(orders.clone(), fast_retry(), 4));
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders")
            .with_metadata_sync(queue.clone());
        let customer = customer().with_stored_link("https://db.tt/stored");

        let fallback = resolver.resolve_root(&customer).await.unwrap();
        queue.wait_idle().await;

        assert_eq!(fallback.path, "/Store/orders/a@b.com");
        assert_eq!(orders.call_count(OrderCall::SetCustomerLink), 0);

        // Not cached: the next job checks the stored link again
        let root = resolver.resolve_root(&customer).await.unwrap();
        assert_eq!(root.path, "/store/orders/renamed-folder");
        queue.close().await;
    }

    #[tokio::test]
    async fn test_blank_email_is_rejected() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = CustomerRootResolver::new(store, fast_retry(), "/Store/orders");
        let err = resolver
            .resolve_root(&CustomerRecord::new(None, "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Validation(_)));
    }
}
