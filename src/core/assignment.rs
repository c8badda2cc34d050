//! The operator's current destination
//!
//! There is exactly one assignment per process. It is replaced wholesale
//! under a mutex and handed out as an immutable [`Arc`] snapshot, so a
//! reader never sees a half-written value. The mutex is never held across
//! an await.
//!
//! Tags typed after an order number (`136720s`) are held as pending tags and
//! applied to that order when the assignment next changes, or on demand.

use crate::adapters::orders::{most_recent, OrderSystem};
use crate::core::resolver::{CustomerRootResolver, OrderDestination};
use crate::core::retry::RetryPolicy;
use crate::domain::{CustomerRecord, OrderQuery, OrderRecord, Result, RouteError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// An order chosen by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedOrder {
    pub order_id: String,
    pub order_number: String,
    pub customer: CustomerRecord,
    /// Customer root, when already resolved
    pub root_path: Option<String>,
    /// Order folder, when already resolved
    pub order_path: Option<String>,
    pub pending_tags: Vec<String>,
}

/// Current destination for new jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Nothing chosen yet; the operator is asked when a job is ready
    Unset,
    /// Upload into the staging area
    Staging,
    /// Upload into an order's folder
    Assigned(AssignedOrder),
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Unset => write!(f, "unset"),
            Assignment::Staging => write!(f, "staging"),
            Assignment::Assigned(order) => {
                write!(f, "order #{} ({})", order.order_number, order.customer.email)?;
                if !order.pending_tags.is_empty() {
                    write!(f, " pending tags: {}", order.pending_tags.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Result of [`OrderAssignment::set_order`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOrderOutcome {
    Assigned(AssignedOrder),
    NotFound,
}

/// Shared, thread-safe assignment manager
pub struct OrderAssignment {
    current: Mutex<Arc<Assignment>>,
    changes: watch::Sender<Arc<Assignment>>,
    orders: Arc<dyn OrderSystem>,
    resolver: Option<Arc<CustomerRootResolver>>,
    retry: RetryPolicy,
    search_limit: usize,
    write_tags: bool,
}

impl OrderAssignment {
    /// Create an unset assignment
    pub fn new(orders: Arc<dyn OrderSystem>, retry: RetryPolicy) -> Self {
        let initial = Arc::new(Assignment::Unset);
        let (changes, _) = watch::channel(initial.clone());
        Self {
            current: Mutex::new(initial),
            changes,
            orders,
            resolver: None,
            retry,
            search_limit: 10,
            write_tags: true,
        }
    }

    /// Resolve the customer root as soon as an order is assigned
    pub fn with_resolver(mut self, resolver: Arc<CustomerRootResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Maximum orders fetched per search
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    /// Skip writing tags to the order system (dry runs)
    pub fn with_tag_writes(mut self, enabled: bool) -> Self {
        self.write_tags = enabled;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Assignment>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the assignment, returning the previous one
    fn replace(&self, next: Assignment) -> Arc<Assignment> {
        let next = Arc::new(next);
        let mut current = self.lock();
        let previous = std::mem::replace(&mut *current, next.clone());
        self.changes.send_replace(next);
        previous
    }

    /// Immutable copy of the current assignment
    pub fn snapshot(&self) -> Arc<Assignment> {
        self.lock().clone()
    }

    /// Receive every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<Assignment>> {
        self.changes.subscribe()
    }

    /// Route new jobs to the staging area
    pub async fn set_staging(&self) {
        let previous = self.replace(Assignment::Staging);
        tracing::info!("Destination set to staging");
        self.flush_previous_tags(&previous).await;
    }

    /// Look up an order and make it the destination
    ///
    /// The most recent matching order wins. On `NotFound` the assignment is
    /// left unchanged.
    pub async fn set_order(&self, input: &str) -> Result<SetOrderOutcome> {
        let query = OrderQuery::parse(input)
            .ok_or_else(|| RouteError::Validation("Order query is empty".to_string()))?;

        let found =
            lookup_order(self.orders.as_ref(), &self.retry, &query, self.search_limit).await?;

        let Some((order, customer)) = found else {
            tracing::info!(query = %query.raw, "No order matches");
            return Ok(SetOrderOutcome::NotFound);
        };

        let mut assigned = AssignedOrder {
            order_id: order.id.clone(),
            order_number: order.order_number().to_string(),
            customer,
            root_path: None,
            order_path: None,
            pending_tags: query.pending_tags.clone(),
        };

        if let Some(resolver) = &self.resolver {
            match resolver
                .resolve(&assigned.customer, &assigned.order_number)
                .await
            {
                Ok(dest) => {
                    assigned.root_path = Some(dest.root_path);
                    assigned.order_path = Some(dest.order_path);
                }
                // The orchestrator resolves again at dispatch
                Err(e) => tracing::warn!(
                    order = %assigned.order_number,
                    error = %e,
                    "Could not prepare order folder"
                ),
            }
        }

        let previous = self.replace(Assignment::Assigned(assigned.clone()));
        tracing::info!(
            order = %assigned.order_number,
            customer = %assigned.customer.email,
            pending_tags = ?assigned.pending_tags,
            "Destination set to order"
        );
        self.flush_previous_tags(&previous).await;

        Ok(SetOrderOutcome::Assigned(assigned))
    }

    /// Replace the pending tags of the current order
    ///
    /// Returns false when no order is assigned.
    pub fn set_pending_tags(&self, tags: Vec<String>) -> bool {
        let mut current = self.lock();
        let Assignment::Assigned(order) = current.as_ref() else {
            return false;
        };
        let mut order = order.clone();
        order.pending_tags = tags;
        let next = Arc::new(Assignment::Assigned(order));
        *current = next.clone();
        self.changes.send_replace(next);
        true
    }

    /// Apply and clear the pending tags of the current order now
    ///
    /// Returns the number of tags applied. On failure the tags stay pending.
    pub async fn apply_pending_tags(&self) -> Result<usize> {
        let taken = {
            let mut current = self.lock();
            match current.as_ref() {
                Assignment::Assigned(order) if !order.pending_tags.is_empty() => {
                    let mut cleared = order.clone();
                    let tags = std::mem::take(&mut cleared.pending_tags);
                    let order_id = cleared.order_id.clone();
                    let next = Arc::new(Assignment::Assigned(cleared));
                    *current = next.clone();
                    self.changes.send_replace(next);
                    Some((order_id, tags))
                }
                _ => None,
            }
        };

        let Some((order_id, tags)) = taken else {
            return Ok(0);
        };

        match self.write_tags_to(&order_id, &tags).await {
            Ok(()) => Ok(tags.len()),
            Err(e) => {
                self.restore_tags(&order_id, tags);
                Err(e)
            }
        }
    }

    /// Record a destination resolved at dispatch time
    pub fn remember_destination(&self, order_id: &str, dest: &OrderDestination) {
        let mut current = self.lock();
        let Assignment::Assigned(order) = current.as_ref() else {
            return;
        };
        if order.order_id != order_id || order.order_path.is_some() {
            return;
        }
        let mut order = order.clone();
        order.root_path = Some(dest.root_path.clone());
        order.order_path = Some(dest.order_path.clone());
        let next = Arc::new(Assignment::Assigned(order));
        *current = next.clone();
        self.changes.send_replace(next);
    }

    fn restore_tags(&self, order_id: &str, tags: Vec<String>) {
        let mut current = self.lock();
        let Assignment::Assigned(order) = current.as_ref() else {
            return;
        };
        if order.order_id != order_id {
            return;
        }
        let mut order = order.clone();
        let mut merged = tags;
        merged.extend(order.pending_tags.drain(..));
        order.pending_tags = merged;
        *current = Arc::new(Assignment::Assigned(order));
        self.changes.send_replace(current.clone());
    }

    async fn flush_previous_tags(&self, previous: &Assignment) {
        let Assignment::Assigned(order) = previous else {
            return;
        };
        if order.pending_tags.is_empty() {
            return;
        }
        if let Err(e) = self.write_tags_to(&order.order_id, &order.pending_tags).await {
            tracing::warn!(
                order = %order.order_number,
                tags = ?order.pending_tags,
                error = %e,
                "Could not apply pending tags to previous order"
            );
        }
    }

    async fn write_tags_to(&self, order_id: &str, tags: &[String]) -> Result<()> {
        if !self.write_tags {
            tracing::info!(order_id = %order_id, tags = ?tags, "Dry run: not tagging order");
            return Ok(());
        }
        self.retry
            .run("add_tags", || self.orders.add_tags(order_id, tags))
            .await?;
        tracing::info!(order_id = %order_id, tags = ?tags, "Applied pending tags");
        Ok(())
    }
}

/// Most recent order matching `query`, with the customer to route it to
///
/// An order without any customer email is an error: there is nowhere to
/// put its scans.
pub async fn lookup_order(
    orders: &dyn OrderSystem,
    retry: &RetryPolicy,
    query: &OrderQuery,
    limit: usize,
) -> Result<Option<(OrderRecord, CustomerRecord)>> {
    let found = retry
        .run("search_orders", || orders.search_orders(&query.search, limit))
        .await?;

    let Some(order) = most_recent(found) else {
        return Ok(None);
    };

    let customer = order.routing_customer().ok_or_else(|| {
        RouteError::Validation(format!("Order {} has no customer email", order.name))
    })?;
    Ok(Some((order, customer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::orders::{MemoryOrderSystem, OrderCall};
    use crate::adapters::store::MemoryObjectStore;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0)
    }

    fn order(number: &str, email: &str, day: u32) -> OrderRecord {
        OrderRecord {
            id: format!("gid://shopify/Order/{number}"),
            name: format!("#{number}"),
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, day, 8, 0, 0).unwrap()),
            email: Some(email.to_string()),
            customer: Some(CustomerRecord::new(
                Some(format!("gid://shopify/Customer/{number}")),
                email,
            )),
        }
    }

    fn orders() -> Arc<MemoryOrderSystem> {
        Arc::new(
            MemoryOrderSystem::new()
                .with_order(order("100", "a@b.com", 1))
                .with_order(order("200", "a@b.com", 4))
                .with_order(order("300", "c@d.com", 2)),
        )
    }

    #[tokio::test]
    async fn test_starts_unset() {
        let assignment = OrderAssignment::new(orders(), fast_retry());
        assert_eq!(*assignment.snapshot(), Assignment::Unset);
    }

    #[tokio::test]
    async fn test_set_order_picks_most_recent() {
        let assignment = OrderAssignment::new(orders(), fast_retry());
        let outcome = assignment.set_order("a@b.com").await.unwrap();

        let SetOrderOutcome::Assigned(order) = outcome else {
            panic!("expected an order");
        };
        assert_eq!(order.order_number, "200");
        assert!(matches!(*assignment.snapshot(), Assignment::Assigned(_)));
    }

    #[tokio::test]
    async fn test_not_found_keeps_state() {
        let assignment = OrderAssignment::new(orders(), fast_retry());
        assignment.set_staging().await;
        let outcome = assignment.set_order("999999").await.unwrap();

        assert_eq!(outcome, SetOrderOutcome::NotFound);
        assert_eq!(*assignment.snapshot(), Assignment::Staging);
    }

    #[tokio::test]
    async fn test_pending_tags_applied_on_change() {
        let orders = orders();
        let assignment = OrderAssignment::new(orders.clone(), fast_retry());

        assignment.set_order("100s, bs").await.unwrap();
        assert!(orders.tags_for("gid://shopify/Order/100").is_empty());

        assignment.set_order("300").await.unwrap();
        assert_eq!(
            orders.tags_for("gid://shopify/Order/100"),
            vec!["s".to_string(), "bs".to_string()]
        );
    }

    #[tokio::test]
    async fn test_tag_failure_does_not_block_change() {
        let orders = orders();
        orders.fail_always(OrderCall::AddTags);
        let assignment = OrderAssignment::new(orders.clone(), fast_retry());

        assignment.set_order("100s").await.unwrap();
        assignment.set_staging().await;
        assert_eq!(*assignment.snapshot(), Assignment::Staging);
    }

    #[tokio::test]
    async fn test_apply_pending_tags_now() {
        let orders = orders();
        let assignment = OrderAssignment::new(orders.clone(), fast_retry());
        assignment.set_order("300").await.unwrap();

        assert!(assignment.set_pending_tags(vec!["x".to_string()]));
        assert_eq!(assignment.apply_pending_tags().await.unwrap(), 1);
        assert_eq!(orders.tags_for("gid://shopify/Order/300"), vec!["x".to_string()]);
        assert_eq!(assignment.apply_pending_tags().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_tags_pending() {
        let orders = orders();
        orders.fail_always(OrderCall::AddTags);
        let assignment = OrderAssignment::new(orders, fast_retry());
        assignment.set_order("300x").await.unwrap();

        assert!(assignment.apply_pending_tags().await.is_err());
        let Assignment::Assigned(order) = assignment.snapshot().as_ref().clone() else {
            panic!("expected an order");
        };
        assert_eq!(order.pending_tags, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_set_pending_tags_requires_order() {
        let assignment = OrderAssignment::new(orders(), fast_retry());
        assert!(!assignment.set_pending_tags(vec!["x".to_string()]));
    }

    #[tokio::test]
    async fn test_resolver_prepares_order_folder() {
        let store = Arc::new(MemoryObjectStore::new());
        let resolver = Arc::new(CustomerRootResolver::new(
            store.clone(),
            fast_retry(),
            "/Store/orders",
        ));
        let assignment = OrderAssignment::new(orders(), fast_retry()).with_resolver(resolver);

        let SetOrderOutcome::Assigned(order) = assignment.set_order("#300").await.unwrap() else {
            panic!("expected an order");
        };
        assert_eq!(order.order_path.as_deref(), Some("/Store/orders/c@d.com/300"));
        assert!(store.has_folder("/Store/orders/c@d.com/300"));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let assignment = OrderAssignment::new(orders(), fast_retry());
        let mut rx = assignment.subscribe();

        assignment.set_staging().await;
        rx.changed().await.unwrap();
        assert_eq!(**rx.borrow(), Assignment::Staging);
    }

    #[test]
    fn test_display() {
        let order = AssignedOrder {
            order_id: "gid://shopify/Order/1".to_string(),
            order_number: "1".to_string(),
            customer: CustomerRecord::new(None, "a@b.com"),
            root_path: None,
            order_path: None,
            pending_tags: vec!["s".to_string()],
        };
        assert_eq!(
            Assignment::Assigned(order).to_string(),
            "order #1 (a@b.com) pending tags: s"
        );
        assert_eq!(Assignment::Staging.to_string(), "staging");
    }
}
