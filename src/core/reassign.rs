//! Moving staged jobs into an order folder
//!
//! Jobs uploaded while the destination was "staging" land in
//! `<root>/_staging/<job key>`. Once the operator knows the order they
//! belong to, the folder is moved to `<order folder>/<scan id>`.

use crate::adapters::store::{join_path, list_all, ObjectStore};
use crate::core::resolver::CustomerRootResolver;
use crate::core::retry::RetryPolicy;
use crate::domain::{CustomerRecord, Result, RouteError, StoreError};

/// A job folder in the staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedJob {
    /// Key relative to the staging root, e.g. `2024-01-15/roll_001`
    pub key: String,
    /// Full remote path
    pub path: String,
}

impl StagedJob {
    /// Last key segment
    pub fn scan_id(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Staged job folders `depth` levels below `staging_root`, sorted by key
///
/// A missing staging root means nothing is staged. Each listing goes
/// through `retry`.
pub async fn list_staged(
    store: &dyn ObjectStore,
    retry: &RetryPolicy,
    staging_root: &str,
    depth: usize,
) -> Result<Vec<StagedJob>> {
    let mut level = vec![(String::new(), staging_root.to_string())];

    for _ in 0..depth.max(1) {
        let mut next = Vec::new();
        for (prefix, path) in level {
            let entries = match retry.run("list_folder", || list_all(store, &path)).await {
                Ok(entries) => entries,
                Err(RouteError::Store(StoreError::NotFound(_))) => continue,
                Err(e) => return Err(e),
            };
            for entry in entries.into_iter().filter(|e| e.is_folder) {
                let key = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{prefix}/{}", entry.name)
                };
                next.push((key, entry.path));
            }
        }
        level = next;
    }

    let mut staged: Vec<StagedJob> = level
        .into_iter()
        .map(|(key, path)| StagedJob { key, path })
        .collect();
    staged.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(staged)
}

/// Move one staged job into the order folder of `customer`/`order_number`
///
/// Returns the new remote path. An existing destination is never
/// overwritten.
pub async fn reassign_staged(
    store: &dyn ObjectStore,
    resolver: &CustomerRootResolver,
    retry: &RetryPolicy,
    staged: &StagedJob,
    customer: &CustomerRecord,
    order_number: &str,
) -> Result<String> {
    let dest = resolver.resolve(customer, order_number).await?;
    let target = join_path(&dest.order_path, staged.scan_id());

    let existing = retry
        .run("get_metadata", || store.get_metadata(&target))
        .await?;
    if existing.exists() {
        return Err(StoreError::Conflict(format!("{target} already exists")).into());
    }

    retry
        .run("move_path", || store.move_path(&staged.path, &target))
        .await?;

    tracing::info!(from = %staged.path, to = %target, "Moved staged job");
    Ok(target)
}

/// Find a staged job by key, ignoring case
pub fn find_staged<'a>(staged: &'a [StagedJob], key: &str) -> Option<&'a StagedJob> {
    let wanted = key.trim().trim_matches('/').to_lowercase();
    staged.iter().find(|s| s.key.to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::memory::InjectedFailure;
    use crate::adapters::store::{MemoryObjectStore, StoreCall};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0)
    }

    async fn staged_store() -> Arc<MemoryObjectStore> {
        let store = Arc::new(MemoryObjectStore::new().with_page_size(1));
        for file in [
            "/Store/orders/_staging/2024-01-16/roll_002/1.jpg",
            "/Store/orders/_staging/2024-01-15/roll_001/1.jpg",
            "/Store/orders/_staging/2024-01-15/roll_001/2.jpg",
        ] {
            store.upload(b"x".to_vec(), file, false).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_list_staged_follows_pages() {
        let store = staged_store().await;
        let staged = list_staged(store.as_ref(), &fast_retry(), "/Store/orders/_staging", 2)
            .await
            .unwrap();

        let keys: Vec<_> = staged.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01-15/roll_001", "2024-01-16/roll_002"]);
        assert_eq!(staged[0].scan_id(), "roll_001");
    }

    #[tokio::test]
    async fn test_list_staged_retries_transient_errors() {
        let store = staged_store().await;
        store.inject_failures(
            StoreCall::ListFolder,
            "/Store/orders/_staging",
            InjectedFailure::ServerError,
            2,
        );

        let staged = list_staged(store.as_ref(), &fast_retry(), "/Store/orders/_staging", 2)
            .await
            .unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(store.calls_for(StoreCall::ListFolder, "/Store/orders/_staging"), 3);
    }

    #[tokio::test]
    async fn test_missing_staging_root_is_empty() {
        let store = MemoryObjectStore::new();
        assert!(list_staged(&store, &fast_retry(), "/Store/orders/_staging", 2)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reassign_moves_folder() {
        let store = staged_store().await;
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");
        let staged = list_staged(store.as_ref(), &fast_retry(), "/Store/orders/_staging", 2)
            .await
            .unwrap();
        let job = find_staged(&staged, "2024-01-15/ROLL_001").unwrap();

        let target = reassign_staged(
            store.as_ref(),
            &resolver,
            &fast_retry(),
            job,
            &CustomerRecord::new(None, "a@b.com"),
            "100",
        )
        .await
        .unwrap();

        assert_eq!(target, "/Store/orders/a@b.com/100/roll_001");
        assert!(store.file_data("/Store/orders/a@b.com/100/roll_001/2.jpg").is_some());
        assert!(!store.has_folder("/Store/orders/_staging/2024-01-15/roll_001"));
    }

    #[tokio::test]
    async fn test_reassign_refuses_to_overwrite() {
        let store = staged_store().await;
        store.seed_folder("/Store/orders/a@b.com/100/roll_001");
        let resolver = CustomerRootResolver::new(store.clone(), fast_retry(), "/Store/orders");
        let staged = list_staged(store.as_ref(), &fast_retry(), "/Store/orders/_staging", 2)
            .await
            .unwrap();

        let err = reassign_staged(
            store.as_ref(),
            &resolver,
            &fast_retry(),
            &staged[0],
            &CustomerRecord::new(None, "a@b.com"),
            "100",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RouteError::Store(StoreError::Conflict(_))));
    }
}
