//! Shopify Admin GraphQL implementation of [`OrderSystem`]
//!
//! Every call is a POST of `{query, variables}` to the shop's GraphQL
//! endpoint. Top-level `errors` and mutation `userErrors` are reported as
//! [`OrderApiError::Rejected`], except `THROTTLED` which is a rate limit.

use super::OrderSystem;
use crate::config::{SecretString, ShopifyConfig};
use crate::domain::{CustomerRecord, OrderApiError, OrderRecord, Result, RouteError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const SEARCH_ORDERS: &str = r#"
query SearchOrders($query: String!, $first: Int!, $namespace: String!, $key: String!) {
  orders(first: $first, query: $query, sortKey: CREATED_AT, reverse: true) {
    edges {
      node {
        id
        name
        createdAt
        email
        customer {
          id
          email
          metafield(namespace: $namespace, key: $key) { value }
        }
      }
    }
  }
}"#;

const ADD_TAGS: &str = r#"
mutation AddTags($id: ID!, $tags: [String!]!) {
  tagsAdd(id: $id, tags: $tags) {
    userErrors { field message }
  }
}"#;

const ORDER_NOTE: &str = r#"
query OrderNote($id: ID!) {
  order(id: $id) { note }
}"#;

const UPDATE_NOTE: &str = r#"
mutation UpdateNote($input: OrderInput!) {
  orderUpdate(input: $input) {
    userErrors { field message }
  }
}"#;

const SET_METAFIELD: &str = r#"
mutation SetCustomerLink($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    userErrors { field message }
  }
}"#;

#[derive(Deserialize)]
struct OrdersData {
    orders: Connection,
}

#[derive(Deserialize)]
struct Connection {
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct Edge {
    node: OrderNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderNode {
    id: String,
    name: String,
    created_at: Option<DateTime<Utc>>,
    email: Option<String>,
    customer: Option<CustomerNode>,
}

#[derive(Deserialize)]
struct CustomerNode {
    id: Option<String>,
    email: Option<String>,
    metafield: Option<MetafieldNode>,
}

#[derive(Deserialize)]
struct MetafieldNode {
    value: Option<String>,
}

impl From<OrderNode> for OrderRecord {
    fn from(node: OrderNode) -> Self {
        let customer = node.customer.map(|c| {
            let stored_link = c
                .metafield
                .and_then(|m| m.value)
                .filter(|v| !v.trim().is_empty());
            CustomerRecord {
                id: c.id,
                email: c.email.unwrap_or_default(),
                stored_link,
            }
        });
        OrderRecord {
            id: node.id,
            name: node.name,
            created_at: node.created_at,
            email: node.email,
            customer,
        }
    }
}

/// Shopify order system
pub struct ShopifyOrderSystem {
    client: Client,
    endpoint: String,
    token: SecretString,
    link_namespace: String,
    link_key: String,
}

impl ShopifyOrderSystem {
    /// Create a new client from configuration
    pub fn new(config: &ShopifyConfig) -> Result<Self> {
        let token = config.admin_token.clone().ok_or_else(|| {
            RouteError::Configuration("shopify.admin_token is not configured".to_string())
        })?;

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                OrderApiError::ConnectionFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint: config.graphql_endpoint(),
            token,
            link_namespace: config.link_namespace.clone(),
            link_key: config.link_key.clone(),
        })
    }

    /// Run a GraphQL document and return its `data` object
    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", self.token.expose_secret().as_str())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let retry_after = retry_after(resp.headers());
        let body = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status, retry_after, &body).into());
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| OrderApiError::InvalidResponse(format!("{e}: {body}")))?;

        if let Some(errors) = value
            .get("errors")
            .and_then(Value::as_array)
            .filter(|errors| !errors.is_empty())
        {
            return Err(graphql_errors(errors).into());
        }

        value
            .get("data")
            .cloned()
            .filter(|data| !data.is_null())
            .ok_or_else(|| OrderApiError::InvalidResponse("Missing data".to_string()).into())
    }

    /// Run a mutation and fail on any `userErrors`
    async fn mutate(&self, query: &str, field: &str, variables: Value) -> Result<Value> {
        let data = self.graphql(query, variables).await?;
        check_user_errors(&data, field)?;
        Ok(data)
    }
}

#[async_trait]
impl OrderSystem for ShopifyOrderSystem {
    async fn search_orders(&self, query: &str, limit: usize) -> Result<Vec<OrderRecord>> {
        tracing::debug!(query = %query, limit, "Searching orders");

        let data = self
            .graphql(
                SEARCH_ORDERS,
                json!({
                    "query": query,
                    "first": limit,
                    "namespace": self.link_namespace,
                    "key": self.link_key,
                }),
            )
            .await?;

        let parsed: OrdersData = serde_json::from_value(data)
            .map_err(|e| OrderApiError::InvalidResponse(format!("orders: {e}")))?;

        let mut orders: Vec<OrderRecord> = parsed
            .orders
            .edges
            .into_iter()
            .map(|edge| edge.node.into())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn set_customer_link(&self, customer_id: &str, url: &str) -> Result<()> {
        self.mutate(
            SET_METAFIELD,
            "metafieldsSet",
            json!({
                "metafields": [{
                    "ownerId": customer_id,
                    "namespace": self.link_namespace,
                    "key": self.link_key,
                    "type": "url",
                    "value": url,
                }]
            }),
        )
        .await?;
        tracing::debug!(customer_id = %customer_id, "Stored shared link on customer");
        Ok(())
    }

    async fn add_tags(&self, order_id: &str, tags: &[String]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        self.mutate(ADD_TAGS, "tagsAdd", json!({ "id": order_id, "tags": tags }))
            .await?;
        tracing::debug!(order_id = %order_id, tags = ?tags, "Tagged order");
        Ok(())
    }

    async fn append_note(&self, order_id: &str, text: &str) -> Result<()> {
        let data = self.graphql(ORDER_NOTE, json!({ "id": order_id })).await?;
        let existing = data
            .pointer("/order/note")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let note = if existing.trim().is_empty() {
            text.to_string()
        } else {
            format!("{}\n{text}", existing.trim_end())
        };

        self.mutate(
            UPDATE_NOTE,
            "orderUpdate",
            json!({ "input": { "id": order_id, "note": note } }),
        )
        .await?;
        Ok(())
    }
}

fn check_user_errors(data: &Value, field: &str) -> Result<()> {
    let messages: Vec<String> = data
        .get(field)
        .and_then(|f| f.get("userErrors"))
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if messages.is_empty() {
        Ok(())
    } else {
        Err(OrderApiError::Rejected(format!("{field}: {}", messages.join("; "))).into())
    }
}

fn graphql_errors(errors: &[Value]) -> OrderApiError {
    let throttled = errors.iter().any(|e| {
        e.pointer("/extensions/code").and_then(Value::as_str) == Some("THROTTLED")
    });
    let message = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("; ");

    if throttled {
        OrderApiError::RateLimited {
            retry_after: None,
            message,
        }
    } else {
        OrderApiError::Rejected(message)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> OrderApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => OrderApiError::RateLimited {
            retry_after,
            message: body.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            OrderApiError::AuthenticationFailed(format!("{status}: {body}"))
        }
        s if s.is_server_error() => OrderApiError::ServerError {
            status: s.as_u16(),
            message: body.to_string(),
        },
        s => OrderApiError::ClientError {
            status: s.as_u16(),
            message: body.to_string(),
        },
    }
}

fn transport_error(e: reqwest::Error) -> RouteError {
    if e.is_timeout() {
        OrderApiError::Timeout(e.to_string()).into()
    } else {
        OrderApiError::ConnectionFailed(e.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RetryClass;

    #[test]
    fn test_throttled_is_transient() {
        let errors = vec![json!({
            "message": "Throttled",
            "extensions": { "code": "THROTTLED" }
        })];
        assert!(graphql_errors(&errors).retry_class().is_transient());
    }

    #[test]
    fn test_other_graphql_errors_are_permanent() {
        let errors = vec![json!({ "message": "Field 'foo' doesn't exist" })];
        let err = graphql_errors(&errors);
        assert_eq!(err.retry_class(), RetryClass::Permanent);
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_user_errors_are_rejections() {
        let data = json!({
            "tagsAdd": { "userErrors": [{ "field": ["id"], "message": "Order does not exist" }] }
        });
        let err = check_user_errors(&data, "tagsAdd").unwrap_err();
        assert!(matches!(err, RouteError::OrderApi(OrderApiError::Rejected(_))));

        let ok = json!({ "tagsAdd": { "userErrors": [] } });
        assert!(check_user_errors(&ok, "tagsAdd").is_ok());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, ""),
            OrderApiError::AuthenticationFailed(_)
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, None, "")
            .retry_class()
            .is_transient());
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, None, "").retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn test_order_node_conversion() {
        let node: OrderNode = serde_json::from_value(json!({
            "id": "gid://shopify/Order/1",
            "name": "#1001",
            "createdAt": "2024-03-01T10:00:00Z",
            "email": "a@b.com",
            "customer": {
                "id": "gid://shopify/Customer/9",
                "email": "a@b.com",
                "metafield": { "value": "" }
            }
        }))
        .unwrap();

        let order: OrderRecord = node.into();
        assert_eq!(order.order_number(), "1001");
        let customer = order.customer.unwrap();
        assert_eq!(customer.id.as_deref(), Some("gid://shopify/Customer/9"));
        assert!(customer.stored_link.is_none());
    }

    #[test]
    fn test_requires_token() {
        let config = ShopifyConfig {
            shop: "lab.myshopify.com".to_string(),
            ..ShopifyConfig::default()
        };
        assert!(matches!(
            ShopifyOrderSystem::new(&config),
            Err(RouteError::Configuration(_))
        ));
    }
}
