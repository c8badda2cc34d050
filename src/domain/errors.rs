//! Domain error types
//!
//! This module defines the error hierarchy for scanroute. Remote adapters map
//! their HTTP failures into [`StoreError`] and [`OrderApiError`] so callers never
//! see third-party client types, and [`RouteError::retry_class`] tells the retry
//! policy whether a failure is worth another attempt.

use std::time::Duration;
use thiserror::Error;

/// Main scanroute error type
///
/// This is the primary error type used throughout the application.
/// It wraps the adapter-specific error types and adds pipeline context.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Object store (Dropbox) errors
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Order system (Shopify) errors
    #[error("Order system error: {0}")]
    OrderApi(#[from] OrderApiError),

    /// Processed ledger errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Job dispatch errors
    #[error("Job error: {0}")]
    Job(String),

    /// Job is not ready to dispatch yet; not counted as a failed attempt
    #[error("Job deferred: {0}")]
    Deferred(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Object store errors
///
/// Errors that occur when talking to the remote object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to reach the object store
    #[error("Failed to connect to object store: {0}")]
    ConnectionFailed(String),

    /// Access token rejected or refresh failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Short-lived access token expired; the next attempt refreshes it
    #[error("Access token expired")]
    TokenExpired,

    /// Too many requests (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than the ones mapped below)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Path or shared link does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write conflict that is not an "already exists" no-op
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Response body could not be understood
    #[error("Invalid response from object store: {0}")]
    InvalidResponse(String),
}

/// Order system errors
///
/// Errors that occur when querying or updating orders and customers.
#[derive(Debug, Error)]
pub enum OrderApiError {
    /// Failed to reach the order system
    #[error("Failed to connect to order system: {0}")]
    ConnectionFailed(String),

    /// Admin token rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Throttled (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// GraphQL `errors` or mutation `userErrors`
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Response body could not be understood
    #[error("Invalid response from order system: {0}")]
    InvalidResponse(String),
}

/// Whether a failed call should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Worth another attempt, optionally no sooner than `retry_after`
    Transient { retry_after: Option<Duration> },
    /// Retrying cannot help
    Permanent,
}

impl RetryClass {
    /// Returns true for transient failures
    pub fn is_transient(&self) -> bool {
        matches!(self, RetryClass::Transient { .. })
    }
}

impl StoreError {
    /// Classify this error for the retry policy
    pub fn retry_class(&self) -> RetryClass {
        match self {
            StoreError::RateLimited { retry_after, .. } => RetryClass::Transient {
                retry_after: *retry_after,
            },
            StoreError::ConnectionFailed(_)
            | StoreError::TokenExpired
            | StoreError::ServerError { .. }
            | StoreError::Timeout(_) => RetryClass::Transient { retry_after: None },
            StoreError::AuthenticationFailed(_)
            | StoreError::ClientError { .. }
            | StoreError::NotFound(_)
            | StoreError::Conflict(_)
            | StoreError::InvalidResponse(_) => RetryClass::Permanent,
        }
    }
}

impl OrderApiError {
    /// Classify this error for the retry policy
    pub fn retry_class(&self) -> RetryClass {
        match self {
            OrderApiError::RateLimited { retry_after, .. } => RetryClass::Transient {
                retry_after: *retry_after,
            },
            OrderApiError::ConnectionFailed(_)
            | OrderApiError::ServerError { .. }
            | OrderApiError::Timeout(_) => RetryClass::Transient { retry_after: None },
            OrderApiError::AuthenticationFailed(_)
            | OrderApiError::ClientError { .. }
            | OrderApiError::Rejected(_)
            | OrderApiError::InvalidResponse(_) => RetryClass::Permanent,
        }
    }
}

impl RouteError {
    /// Classify this error for the retry policy
    ///
    /// Local I/O failures are treated as transient because watch roots are
    /// frequently network shares that drop out briefly.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            RouteError::Store(e) => e.retry_class(),
            RouteError::OrderApi(e) => e.retry_class(),
            RouteError::Io(_) => RetryClass::Transient { retry_after: None },
            _ => RetryClass::Permanent,
        }
    }

    /// Returns true when the error is worth retrying
    pub fn is_transient(&self) -> bool {
        self.retry_class().is_transient()
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for RouteError {
    fn from(err: std::io::Error) -> Self {
        RouteError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for RouteError {
    fn from(err: serde_json::Error) -> Self {
        RouteError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for RouteError {
    fn from(err: toml::de::Error) -> Self {
        RouteError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_display() {
        let err = RouteError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_store_error_conversion() {
        let store_err = StoreError::ConnectionFailed("Network error".to_string());
        let err: RouteError = store_err.into();
        assert!(matches!(err, RouteError::Store(_)));
    }

    #[test]
    fn test_order_api_error_conversion() {
        let api_err = OrderApiError::Rejected("Tag too long".to_string());
        let err: RouteError = api_err.into();
        assert!(matches!(err, RouteError::OrderApi(_)));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err: RouteError = StoreError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
            message: "too_many_write_operations".to_string(),
        }
        .into();

        assert_eq!(
            err.retry_class(),
            RetryClass::Transient {
                retry_after: Some(Duration::from_secs(3))
            }
        );
    }

    #[test]
    fn test_transient_store_errors() {
        assert!(StoreError::Timeout("upload".to_string())
            .retry_class()
            .is_transient());
        assert!(StoreError::ServerError {
            status: 503,
            message: "unavailable".to_string()
        }
        .retry_class()
        .is_transient());
        assert!(StoreError::ConnectionFailed("reset".to_string())
            .retry_class()
            .is_transient());
    }

    #[test]
    fn test_permanent_store_errors() {
        assert_eq!(
            StoreError::AuthenticationFailed("expired".to_string()).retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            StoreError::ClientError {
                status: 400,
                message: "bad path".to_string()
            }
            .retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            StoreError::NotFound("/x".to_string()).retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn test_order_api_retry_classes() {
        assert!(OrderApiError::RateLimited {
            retry_after: None,
            message: "throttled".to_string()
        }
        .retry_class()
        .is_transient());
        assert_eq!(
            OrderApiError::Rejected("invalid id".to_string()).retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn test_local_errors_classification() {
        assert!(RouteError::Io("share went away".to_string()).is_transient());
        assert!(!RouteError::Validation("empty key".to_string()).is_transient());
        assert!(!RouteError::Deferred("no destination".to_string()).is_transient());
        assert!(!RouteError::Configuration("bad".to_string()).is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: RouteError = io_err.into();
        assert!(matches!(err, RouteError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: RouteError = json_err.into();
        assert!(matches!(err, RouteError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: RouteError = toml_err.into();
        assert!(matches!(err, RouteError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
