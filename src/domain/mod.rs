//! Domain models and types for scanroute.
//!
//! The domain layer provides:
//! - **Jobs** ([`Job`], [`JobOutcome`]) discovered in the watch root
//! - **Orders** ([`OrderRecord`], [`CustomerRecord`], [`OrderQuery`])
//! - **Error types** ([`RouteError`], [`StoreError`], [`OrderApiError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, RouteError>`]:
//!
//! ```rust
//! use scanroute::domain::{RouteError, Result};
//!
//! fn example() -> Result<()> {
//!     let config = scanroute::config::load_config("scanroute.toml")?;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod job;
pub mod order;
pub mod result;

pub use errors::{OrderApiError, RetryClass, RouteError, StoreError};
pub use job::{Job, JobOutcome};
pub use order::{parse_tags, sanitize_order_number, CustomerRecord, OrderQuery, OrderRecord};
pub use result::Result;
