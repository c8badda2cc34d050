//! In-memory [`OrderSystem`] for dry runs and tests
//!
//! Searches understand the query forms produced by
//! [`OrderQuery`](crate::domain::OrderQuery): `name:N OR order_number:N`,
//! `email:<address>` and free text matched against names and emails.

use super::OrderSystem;
use crate::domain::{OrderApiError, OrderRecord, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Operations recorded by [`MemoryOrderSystem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderCall {
    Search,
    SetCustomerLink,
    AddTags,
    AppendNote,
}

#[derive(Default)]
struct State {
    orders: Vec<OrderRecord>,
    customer_links: HashMap<String, String>,
    tags: HashMap<String, Vec<String>>,
    notes: HashMap<String, Vec<String>>,
    calls: Vec<OrderCall>,
    failing: HashSet<OrderCall>,
    transient_failures: HashMap<OrderCall, usize>,
}

/// In-memory order system
#[derive(Default)]
pub struct MemoryOrderSystem {
    state: Mutex<State>,
}

impl MemoryOrderSystem {
    /// Create an empty order system
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add an order that searches can find
    pub fn with_order(self, order: OrderRecord) -> Self {
        self.lock().orders.push(order);
        self
    }

    /// Make every call of one kind fail permanently
    pub fn fail_always(&self, call: OrderCall) {
        self.lock().failing.insert(call);
    }

    /// Make the next `times` calls of one kind fail with a rate limit
    pub fn fail_transiently(&self, call: OrderCall, times: usize) {
        self.lock().transient_failures.insert(call, times);
    }

    /// Shared link stored for a customer
    pub fn customer_link(&self, customer_id: &str) -> Option<String> {
        self.lock().customer_links.get(customer_id).cloned()
    }

    /// Tags added to an order, in call order
    pub fn tags_for(&self, order_id: &str) -> Vec<String> {
        self.lock().tags.get(order_id).cloned().unwrap_or_default()
    }

    /// Notes appended to an order, in call order
    pub fn notes_for(&self, order_id: &str) -> Vec<String> {
        self.lock().notes.get(order_id).cloned().unwrap_or_default()
    }

    /// Number of recorded calls of one kind
    pub fn call_count(&self, call: OrderCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    fn begin(&self, call: OrderCall) -> Result<std::sync::MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(&call) {
            return Err(OrderApiError::Rejected(format!("injected failure for {call:?}")).into());
        }
        if let Some(remaining) = state.transient_failures.get_mut(&call) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(OrderApiError::RateLimited {
                    retry_after: None,
                    message: format!("injected throttle for {call:?}"),
                }
                .into());
            }
        }
        Ok(state)
    }
}

fn matches_query(order: &OrderRecord, query: &str) -> bool {
    let query = query.trim();
    if let Some(email) = query.strip_prefix("email:") {
        let email = email.trim().to_lowercase();
        let customer_email = order
            .customer
            .as_ref()
            .map(|c| c.email.to_lowercase())
            .unwrap_or_default();
        let order_email = order.email.as_deref().unwrap_or_default().to_lowercase();
        return customer_email == email || order_email == email;
    }

    if let Some(rest) = query.strip_prefix("name:") {
        let number = rest.split_whitespace().next().unwrap_or_default();
        return order.order_number() == number;
    }

    let needle = query.to_lowercase();
    order.name.to_lowercase().contains(&needle)
        || order
            .email
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains(&needle))
        || order
            .customer
            .as_ref()
            .is_some_and(|c| c.email.to_lowercase().contains(&needle))
}

#[async_trait]
impl OrderSystem for MemoryOrderSystem {
    async fn search_orders(&self, query: &str, limit: usize) -> Result<Vec<OrderRecord>> {
        let state = self.begin(OrderCall::Search)?;
        let mut found: Vec<OrderRecord> = state
            .orders
            .iter()
            .filter(|o| matches_query(o, query))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit);
        Ok(found)
    }

    async fn set_customer_link(&self, customer_id: &str, url: &str) -> Result<()> {
        let mut state = self.begin(OrderCall::SetCustomerLink)?;
        state
            .customer_links
            .insert(customer_id.to_string(), url.to_string());
        for order in state.orders.iter_mut() {
            if let Some(customer) = order.customer.as_mut() {
                if customer.id.as_deref() == Some(customer_id) {
                    customer.stored_link = Some(url.to_string());
                }
            }
        }
        Ok(())
    }

    async fn add_tags(&self, order_id: &str, tags: &[String]) -> Result<()> {
        let mut state = self.begin(OrderCall::AddTags)?;
        state
            .tags
            .entry(order_id.to_string())
            .or_default()
            .extend(tags.iter().cloned());
        Ok(())
    }

    async fn append_note(&self, order_id: &str, text: &str) -> Result<()> {
        let mut state = self.begin(OrderCall::AppendNote)?;
        state
            .notes
            .entry(order_id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustomerRecord, OrderQuery};
    use chrono::{TimeZone, Utc};

    fn order(number: &str, email: &str, day: u32) -> OrderRecord {
        OrderRecord {
            id: format!("gid://shopify/Order/{number}"),
            name: format!("#{number}"),
            created_at: Some(Utc.with_ymd_and_hms(2024, 2, day, 9, 0, 0).unwrap()),
            email: Some(email.to_string()),
            customer: Some(CustomerRecord::new(
                Some(format!("gid://shopify/Customer/{email}")),
                email,
            )),
        }
    }

    #[tokio::test]
    async fn test_search_by_number_and_email() {
        let orders = MemoryOrderSystem::new()
            .with_order(order("100", "a@b.com", 1))
            .with_order(order("200", "a@b.com", 5))
            .with_order(order("300", "c@d.com", 3));

        let by_number = OrderQuery::parse("#200").unwrap();
        let found = orders.search_orders(&by_number.search, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_number(), "200");

        let by_email = OrderQuery::parse("A@B.com").unwrap();
        let found = orders.search_orders(&by_email.search, 10).await.unwrap();
        let numbers: Vec<_> = found.iter().map(|o| o.order_number()).collect();
        assert_eq!(numbers, vec!["200", "100"]);
    }

    #[tokio::test]
    async fn test_customer_link_is_visible_in_search() {
        let orders = MemoryOrderSystem::new().with_order(order("100", "a@b.com", 1));
        orders
            .set_customer_link("gid://shopify/Customer/a@b.com", "https://db.tt/x")
            .await
            .unwrap();

        let found = orders.search_orders("email:a@b.com", 1).await.unwrap();
        assert_eq!(
            found[0].customer.as_ref().unwrap().stored_link.as_deref(),
            Some("https://db.tt/x")
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let orders = MemoryOrderSystem::new();
        orders.fail_transiently(OrderCall::AddTags, 1);
        let tags = vec!["s".to_string()];

        let first = orders.add_tags("o1", &tags).await.unwrap_err();
        assert!(first.is_transient());
        orders.add_tags("o1", &tags).await.unwrap();
        assert_eq!(orders.tags_for("o1"), tags);

        orders.fail_always(OrderCall::AppendNote);
        assert!(!orders.append_note("o1", "x").await.unwrap_err().is_transient());
        assert_eq!(orders.call_count(OrderCall::AppendNote), 1);
    }
}
