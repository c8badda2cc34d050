//! Configuration management for scanroute.
//!
//! scanroute reads a single TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `SCANROUTE_<SECTION>_<KEY>` overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level, dry run, lab name
//! - [`WatchConfig`] - Watch root, job depth, poll interval, settle window
//! - [`LedgerConfig`] - Processed ledger file and retention
//! - [`UploadConfig`] - Concurrency, chunk size, minimum file age
//! - [`RetryConfig`] - Attempts and backoff for remote calls
//! - [`DropboxConfig`] - Object store root and credentials
//! - [`ShopifyConfig`] - Order system shop, token and link metafield
//! - [`PipelineConfig`] - Auto tags, audit notes, job attempt cap
//! - [`LoggingConfig`] - Local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//! lab_name = "Noritsu"
//!
//! [watch]
//! root = "/Volumes/Scans"
//! depth = 2
//! settle_seconds = 8
//!
//! [dropbox]
//! root = "/Store/orders"
//! refresh_token = "${DROPBOX_REFRESH_TOKEN}"
//! app_key = "${DROPBOX_APP_KEY}"
//! app_secret = "${DROPBOX_APP_SECRET}"
//!
//! [shopify]
//! shop = "my-lab.myshopify.com"
//! admin_token = "${SHOPIFY_ADMIN_TOKEN}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, read_config};
pub use schema::{
    ApplicationConfig, DropboxConfig, LedgerConfig, LoggingConfig, PipelineConfig, RetryConfig,
    RouteConfig, ShopifyConfig, UploadConfig, WatchConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
