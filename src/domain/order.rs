//! Orders, customers and operator order queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Customer attached to an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Order-system customer id (absent for guest checkouts)
    pub id: Option<String>,

    /// Customer email, used as the remote root folder name
    pub email: String,

    /// Shared link previously written back to the customer record
    pub stored_link: Option<String>,
}

impl CustomerRecord {
    /// Create a customer without a stored link
    pub fn new(id: Option<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            stored_link: None,
        }
    }

    /// Attach a stored shared link
    pub fn with_stored_link(mut self, link: impl Into<String>) -> Self {
        self.stored_link = Some(link.into());
        self
    }

    /// Normalized email used for folder names and cache keys
    pub fn folder_name(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

/// An order returned by a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Order-system id (a GraphQL gid)
    pub id: String,

    /// Display name, usually `#<number>`
    pub name: String,

    /// Creation time, used to pick the most recent match
    pub created_at: Option<DateTime<Utc>>,

    /// Order-level email, used when no customer is attached
    pub email: Option<String>,

    /// Attached customer
    pub customer: Option<CustomerRecord>,
}

impl OrderRecord {
    /// Order number without the leading `#`
    pub fn order_number(&self) -> &str {
        self.name.trim_start_matches('#')
    }

    /// Customer for routing, falling back to the order email
    pub fn routing_customer(&self) -> Option<CustomerRecord> {
        match &self.customer {
            Some(c) if !c.email.trim().is_empty() => Some(c.clone()),
            other => {
                let email = self.email.as_deref().filter(|e| !e.trim().is_empty())?;
                let id = other.as_ref().and_then(|c| c.id.clone());
                Some(CustomerRecord::new(id, email))
            }
        }
    }
}

/// A parsed operator order query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    /// What the operator typed
    pub raw: String,

    /// Search string sent to the order system
    pub search: String,

    /// Order number when the input started with digits
    pub order_number: Option<String>,

    /// Tags typed after the order number, applied when the assignment next changes
    pub pending_tags: Vec<String>,
}

impl OrderQuery {
    /// Parse operator input
    ///
    /// - `136720`, `#136720` → `name:136720 OR order_number:136720`
    /// - `136720s`, `136720 s, bs` → same search with pending tags
    /// - anything containing `@` → `email:<input>`
    /// - anything else is passed through as free text
    ///
    /// Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return None;
        }

        if raw.contains('@') {
            return Some(Self {
                raw: raw.to_string(),
                search: format!("email:{raw}"),
                order_number: None,
                pending_tags: Vec::new(),
            });
        }

        let body = raw.strip_prefix('#').unwrap_or(raw);
        let digits_end = body
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(body.len());

        if digits_end == 0 {
            return Some(Self {
                raw: raw.to_string(),
                search: raw.to_string(),
                order_number: None,
                pending_tags: Vec::new(),
            });
        }

        let (number, suffix) = body.split_at(digits_end);
        let pending_tags = parse_tags(suffix);

        Some(Self {
            raw: raw.to_string(),
            search: format!("name:{number} OR order_number:{number}"),
            order_number: Some(number.to_string()),
            pending_tags,
        })
    }
}

/// Split a comma or whitespace separated tag list
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Make an order number safe to use as a single path segment
pub fn sanitize_order_number(order_number: &str) -> String {
    order_number.replace('#', "").replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use test_case::test_case;

    #[test]
    fn test_parse_order_with_tag_suffix() {
        let q = OrderQuery::parse("136720s").unwrap();
        assert_eq!(q.order_number.as_deref(), Some("136720"));
        assert_eq!(q.pending_tags, vec!["s".to_string()]);
        assert_eq!(q.search, "name:136720 OR order_number:136720");
    }

    #[test_case("136720", "136720" ; "bare number")]
    #[test_case("#136720", "136720" ; "hash prefix")]
    #[test_case("  100  ", "100" ; "surrounding whitespace")]
    fn test_parse_order_number(input: &str, expected: &str) {
        let q = OrderQuery::parse(input).unwrap();
        assert_eq!(q.order_number.as_deref(), Some(expected));
        assert!(q.pending_tags.is_empty());
    }

    #[test]
    fn test_parse_multiple_tags() {
        let q = OrderQuery::parse("500 s, bs sp").unwrap();
        assert_eq!(q.pending_tags, vec!["s", "bs", "sp"]);
    }

    #[test]
    fn test_parse_email() {
        let email: String = SafeEmail().fake();
        let q = OrderQuery::parse(&email).unwrap();
        assert_eq!(q.search, format!("email:{email}"));
        assert!(q.order_number.is_none());
    }

    #[test]
    fn test_parse_free_text() {
        let q = OrderQuery::parse("Jane Smith").unwrap();
        assert_eq!(q.search, "Jane Smith");
        assert!(q.order_number.is_none());
    }

    #[test]
    fn test_parse_blank() {
        assert!(OrderQuery::parse("   ").is_none());
    }

    #[test]
    fn test_sanitize_order_number() {
        assert_eq!(sanitize_order_number("#100"), "100");
        assert_eq!(sanitize_order_number("A/B\\C"), "A_B_C");
    }

    #[test]
    fn test_routing_customer_falls_back_to_order_email() {
        let order = OrderRecord {
            id: "gid://shopify/Order/1".to_string(),
            name: "#100".to_string(),
            created_at: None,
            email: Some("guest@example.com".to_string()),
            customer: None,
        };
        let customer = order.routing_customer().unwrap();
        assert_eq!(customer.email, "guest@example.com");
        assert!(customer.id.is_none());
        assert_eq!(order.order_number(), "100");
    }

    #[test]
    fn test_folder_name_is_normalized() {
        let c = CustomerRecord::new(None, " A@B.com ");
        assert_eq!(c.folder_name(), "a@b.com");
    }
}
