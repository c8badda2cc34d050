//! Order management system abstraction
//!
//! The pipeline looks up orders, writes shared links back to customers and
//! annotates orders only through [`OrderSystem`]. [`ShopifyOrderSystem`]
//! talks to the Shopify Admin GraphQL API; [`MemoryOrderSystem`] is used for
//! dry runs and tests.

pub mod memory;
pub mod shopify;

use crate::domain::{OrderRecord, Result};
use async_trait::async_trait;

pub use memory::{MemoryOrderSystem, OrderCall};
pub use shopify::ShopifyOrderSystem;

/// External order management system
#[async_trait]
pub trait OrderSystem: Send + Sync {
    /// Search orders, newest first, returning at most `limit` records
    async fn search_orders(&self, query: &str, limit: usize) -> Result<Vec<OrderRecord>>;

    /// Store the customer's shared folder link on the customer record
    async fn set_customer_link(&self, customer_id: &str, url: &str) -> Result<()>;

    /// Add tags to an order
    async fn add_tags(&self, order_id: &str, tags: &[String]) -> Result<()>;

    /// Append a line to the order's note
    async fn append_note(&self, order_id: &str, text: &str) -> Result<()>;
}

/// Most recent order from a search result
pub fn most_recent(mut orders: Vec<OrderRecord>) -> Option<OrderRecord> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn order(id: &str, day: u32) -> OrderRecord {
        OrderRecord {
            id: id.to_string(),
            name: format!("#{id}"),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()),
            email: None,
            customer: None,
        }
    }

    #[test]
    fn test_most_recent_picks_latest() {
        let picked = most_recent(vec![order("1", 3), order("2", 9), order("3", 5)]).unwrap();
        assert_eq!(picked.id, "2");
    }

    #[test]
    fn test_most_recent_of_nothing() {
        assert!(most_recent(Vec::new()).is_none());
    }
}
