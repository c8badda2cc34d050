//! Configuration schema types
//!
//! This module defines the configuration structure for scanroute.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main scanroute configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Watch directory and polling
    pub watch: WatchConfig,

    /// Processed ledger persistence
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Upload engine settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Retry policy shared by remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Dropbox object store
    #[serde(default)]
    pub dropbox: DropboxConfig,

    /// Shopify order system
    #[serde(default)]
    pub shopify: ShopifyConfig,

    /// Pipeline side effects and limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RouteConfig {
    /// Validates the configuration
    ///
    /// Remote credentials are only required when not running in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.watch.validate()?;
        self.ledger.validate()?;
        self.upload.validate()?;
        self.retry.validate()?;
        self.dropbox.validate(self.application.dry_run)?;
        self.shopify.validate(self.application.dry_run)?;
        self.pipeline.validate()?;
        self.logging.validate()?;

        // A settled job whose files are all still too new would upload nothing
        if self.upload.min_file_age() > self.watch.settle() {
            return Err(format!(
                "upload.min_file_age_ms ({}) must not exceed watch.settle_seconds ({})",
                self.upload.min_file_age_ms, self.watch.settle_seconds
            ));
        }
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dry run mode (in-memory object store and order system)
    #[serde(default)]
    pub dry_run: bool,

    /// Lab name written into order audit notes
    #[serde(default = "default_lab_name")]
    pub lab_name: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
            lab_name: default_lab_name(),
        }
    }
}

/// Watch directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Local directory the scanner writes into
    pub root: String,

    /// Depth of job folders below the root (1 = `<scan>`, 2 = `<batch>/<scan>`)
    #[serde(default = "default_watch_depth")]
    pub depth: usize,

    /// Seconds between poll ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// A folder is ready once its newest file is older than this
    #[serde(default = "default_settle_seconds")]
    pub settle_seconds: f64,

    /// Ignore job folders that already exist when the watcher starts
    #[serde(default)]
    pub skip_existing_on_start: bool,
}

impl WatchConfig {
    fn validate(&self) -> Result<(), String> {
        if self.root.trim().is_empty() {
            return Err("watch.root cannot be empty".to_string());
        }
        if self.depth == 0 || self.depth > 4 {
            return Err("watch.depth must be between 1 and 4".to_string());
        }
        if self.poll_interval_secs == 0 {
            return Err("watch.poll_interval_secs must be > 0".to_string());
        }
        if !self.settle_seconds.is_finite() || self.settle_seconds < 0.0 {
            return Err("watch.settle_seconds must be >= 0".to_string());
        }
        Ok(())
    }

    /// Settle window as a duration
    pub fn settle(&self) -> Duration {
        Duration::from_secs_f64(self.settle_seconds)
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            depth: default_watch_depth(),
            poll_interval_secs: default_poll_interval_secs(),
            settle_seconds: default_settle_seconds(),
            skip_existing_on_start: false,
        }
    }
}

/// Processed ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the JSON ledger file
    #[serde(default = "default_ledger_path")]
    pub path: String,

    /// Days to keep entries whose folder has left the watch root (0 = forever)
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl LedgerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("ledger.path cannot be empty".to_string());
        }
        Ok(())
    }

    /// Retention window, `None` when pruning is disabled
    pub fn retention(&self) -> Option<chrono::Duration> {
        if self.retention_days == 0 {
            None
        } else {
            Some(chrono::Duration::days(self.retention_days as i64))
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            retention_days: default_retention_days(),
        }
    }
}

/// Upload engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Files uploaded in parallel per job
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,

    /// Files larger than this go through an upload session (MiB, 1-150)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,

    /// Files modified more recently than this are left for the next pass
    #[serde(default = "default_min_file_age_ms")]
    pub min_file_age_ms: u64,

    /// Count files already present at the destination as uploaded
    #[serde(default)]
    pub skip_existing: bool,
}

impl UploadConfig {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 || self.concurrency > 128 {
            return Err("upload.concurrency must be between 1 and 128".to_string());
        }
        if self.chunk_size_mb == 0 || self.chunk_size_mb > 150 {
            return Err("upload.chunk_size_mb must be between 1 and 150".to_string());
        }
        Ok(())
    }

    /// Chunk size in bytes
    pub fn chunk_size_bytes(&self) -> usize {
        (self.chunk_size_mb as usize) * 1024 * 1024
    }

    pub fn min_file_age(&self) -> Duration {
        Duration::from_millis(self.min_file_age_ms)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_upload_concurrency(),
            chunk_size_mb: default_chunk_size_mb(),
            min_file_age_ms: default_min_file_age_ms(),
            skip_existing: false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, also the floor when no hint is given
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter added to each delay
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be >= 1".to_string());
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err("retry.initial_delay_ms must be <= retry.max_delay_ms".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("retry.backoff_multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// Dropbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropboxConfig {
    /// Remote root under which customer folders live
    #[serde(default = "default_dropbox_root")]
    pub root: String,

    /// Long-lived access token
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// Refresh token exchanged for short-lived access tokens
    #[serde(default)]
    pub refresh_token: Option<SecretString>,

    /// App key used with the refresh token
    #[serde(default)]
    pub app_key: Option<String>,

    /// App secret used with the refresh token
    #[serde(default)]
    pub app_secret: Option<SecretString>,

    /// RPC endpoint base URL
    #[serde(default = "default_dropbox_api_url")]
    pub api_url: String,

    /// Content (upload) endpoint base URL
    #[serde(default = "default_dropbox_content_url")]
    pub content_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_dropbox_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl DropboxConfig {
    fn validate(&self, dry_run: bool) -> Result<(), String> {
        if !self.root.starts_with('/') {
            return Err("dropbox.root must start with '/'".to_string());
        }
        if self.root.len() > 1 && self.root.ends_with('/') {
            return Err("dropbox.root must not end with '/'".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("dropbox.timeout_seconds must be > 0".to_string());
        }
        if dry_run {
            return Ok(());
        }

        let has_refresh =
            self.refresh_token.is_some() && self.app_key.is_some() && self.app_secret.is_some();
        if self.access_token.is_none() && !has_refresh {
            return Err(
                "dropbox requires access_token or refresh_token, app_key and app_secret"
                    .to_string(),
            );
        }
        Ok(())
    }

    /// Remote folder holding jobs that were uploaded without an order
    pub fn staging_root(&self) -> String {
        format!("{}/_staging", self.root)
    }
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            root: default_dropbox_root(),
            access_token: None,
            refresh_token: None,
            app_key: None,
            app_secret: None,
            api_url: default_dropbox_api_url(),
            content_url: default_dropbox_content_url(),
            timeout_seconds: default_dropbox_timeout_seconds(),
        }
    }
}

/// Shopify configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopifyConfig {
    /// Shop domain, e.g. `my-lab.myshopify.com`
    #[serde(default)]
    pub shop: String,

    /// Admin API access token
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub admin_token: Option<SecretString>,

    /// Admin API version
    #[serde(default = "default_shopify_api_version")]
    pub api_version: String,

    /// Full base URL override (defaults to `https://<shop>`)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Customer metafield namespace holding the shared link
    #[serde(default = "default_link_namespace")]
    pub link_namespace: String,

    /// Customer metafield key holding the shared link
    #[serde(default = "default_link_key")]
    pub link_key: String,

    /// Maximum orders returned by a search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Request timeout in seconds
    #[serde(default = "default_shopify_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ShopifyConfig {
    fn validate(&self, dry_run: bool) -> Result<(), String> {
        if self.search_limit == 0 || self.search_limit > 250 {
            return Err("shopify.search_limit must be between 1 and 250".to_string());
        }
        if self.link_namespace.is_empty() || self.link_key.is_empty() {
            return Err("shopify.link_namespace and shopify.link_key cannot be empty".to_string());
        }
        if let Some(ref base) = self.base_url {
            url::Url::parse(base).map_err(|e| format!("Invalid shopify.base_url: {e}"))?;
        }
        if dry_run {
            return Ok(());
        }
        if self.shop.trim().is_empty() && self.base_url.is_none() {
            return Err("shopify.shop cannot be empty".to_string());
        }
        if self.admin_token.is_none() {
            return Err("shopify.admin_token is required".to_string());
        }
        Ok(())
    }

    /// GraphQL endpoint for the configured shop
    pub fn graphql_endpoint(&self) -> String {
        let base = match self.base_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.shop.trim_end_matches('/')),
        };
        format!("{base}/admin/api/{}/graphql.json", self.api_version)
    }
}

impl Default for ShopifyConfig {
    fn default() -> Self {
        Self {
            shop: String::new(),
            admin_token: None,
            api_version: default_shopify_api_version(),
            base_url: None,
            link_namespace: default_link_namespace(),
            link_key: default_link_key(),
            search_limit: default_search_limit(),
            timeout_seconds: default_shopify_timeout_seconds(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Tags added to the order after every successful upload
    #[serde(default)]
    pub auto_tags: Vec<String>,

    /// Append an audit note to the order after every successful upload
    #[serde(default = "default_true")]
    pub note_enabled: bool,

    /// Dispatch attempts before a failing job is quarantined until restart
    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: u32,

    /// Pending shared-link write-backs before new ones are dropped
    #[serde(default = "default_metadata_queue_capacity")]
    pub metadata_queue_capacity: usize,
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_job_attempts == 0 {
            return Err("pipeline.max_job_attempts must be >= 1".to_string());
        }
        if self.metadata_queue_capacity == 0 {
            return Err("pipeline.metadata_queue_capacity must be > 0".to_string());
        }
        if self.auto_tags.iter().any(|t| t.trim().is_empty()) {
            return Err("pipeline.auto_tags cannot contain empty tags".to_string());
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_tags: Vec::new(),
            note_enabled: true,
            max_job_attempts: default_max_job_attempts(),
            metadata_queue_capacity: default_metadata_queue_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Maximum log file size in MB
    #[serde(default = "default_local_max_size_mb")]
    pub local_max_size_mb: usize,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "size"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_max_size_mb == 0 {
            return Err("logging.local_max_size_mb must be > 0".to_string());
        }
        Ok(())
    }

    /// Console-only logging
    pub fn console_only() -> Self {
        Self {
            local_enabled: false,
            ..Self::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            local_max_size_mb: default_local_max_size_mb(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_lab_name() -> String {
    "Noritsu".to_string()
}

fn default_true() -> bool {
    true
}

fn default_watch_depth() -> usize {
    2
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_settle_seconds() -> f64 {
    8.0
}

fn default_ledger_path() -> String {
    ".processed_jobs.json".to_string()
}

fn default_retention_days() -> u64 {
    90
}

fn default_upload_concurrency() -> usize {
    32
}

fn default_chunk_size_mb() -> u64 {
    32
}

fn default_min_file_age_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_dropbox_root() -> String {
    "/Store/orders".to_string()
}

fn default_dropbox_api_url() -> String {
    "https://api.dropboxapi.com".to_string()
}

fn default_dropbox_content_url() -> String {
    "https://content.dropboxapi.com".to_string()
}

fn default_dropbox_timeout_seconds() -> u64 {
    120
}

fn default_shopify_api_version() -> String {
    "2024-10".to_string()
}

fn default_link_namespace() -> String {
    "custom".to_string()
}

fn default_link_key() -> String {
    "dropbox_root_url".to_string()
}

fn default_search_limit() -> usize {
    10
}

fn default_shopify_timeout_seconds() -> u64 {
    60
}

fn default_max_job_attempts() -> u32 {
    5
}

fn default_metadata_queue_capacity() -> usize {
    64
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_local_max_size_mb() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn watch_config() -> WatchConfig {
        WatchConfig {
            root: "/mnt/scanner".to_string(),
            depth: 2,
            poll_interval_secs: 2,
            settle_seconds: 8.0,
            skip_existing_on_start: false,
        }
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_watch_config_validation() {
        let mut config = watch_config();
        assert!(config.validate().is_ok());

        config.depth = 0;
        assert!(config.validate().is_err());

        config.depth = 2;
        config.settle_seconds = -1.0;
        assert!(config.validate().is_err());

        config.settle_seconds = 0.0;
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.poll_interval_secs = 1;
        config.root = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upload_config_validation() {
        let mut config = UploadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size_bytes(), 32 * 1024 * 1024);

        config.chunk_size_mb = 151;
        assert!(config.validate().is_err());

        config.chunk_size_mb = 8;
        config.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut config = RetryConfig::default();
        assert!(config.validate().is_ok());

        config.max_attempts = 0;
        assert!(config.validate().is_err());

        config.max_attempts = 3;
        config.initial_delay_ms = 60_000;
        assert!(config.validate().is_err());

        config.initial_delay_ms = 100;
        config.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dropbox_requires_credentials_unless_dry_run() {
        let mut config = DropboxConfig::default();
        assert!(config.validate(true).is_ok());
        assert!(config.validate(false).is_err());

        config.access_token = Some(secret_string("sl.token".to_string()));
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_dropbox_refresh_credentials() {
        let config = DropboxConfig {
            refresh_token: Some(secret_string("refresh".to_string())),
            app_key: Some("key".to_string()),
            app_secret: Some(secret_string("secret".to_string())),
            ..DropboxConfig::default()
        };
        assert!(config.validate(false).is_ok());

        let partial = DropboxConfig {
            refresh_token: Some(secret_string("refresh".to_string())),
            ..DropboxConfig::default()
        };
        assert!(partial.validate(false).is_err());
    }

    #[test]
    fn test_dropbox_root_format() {
        let mut config = DropboxConfig::default();
        config.root = "Store/orders".to_string();
        assert!(config.validate(true).is_err());

        config.root = "/Store/orders/".to_string();
        assert!(config.validate(true).is_err());

        config.root = "/Store/orders".to_string();
        assert_eq!(config.staging_root(), "/Store/orders/_staging");
    }

    #[test]
    fn test_shopify_validation() {
        let mut config = ShopifyConfig::default();
        assert!(config.validate(true).is_ok());
        assert!(config.validate(false).is_err());

        config.shop = "my-lab.myshopify.com".to_string();
        config.admin_token = Some(secret_string("shpat_x".to_string()));
        assert!(config.validate(false).is_ok());

        config.search_limit = 0;
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_shopify_graphql_endpoint() {
        let mut config = ShopifyConfig {
            shop: "my-lab.myshopify.com".to_string(),
            ..ShopifyConfig::default()
        };
        assert_eq!(
            config.graphql_endpoint(),
            "https://my-lab.myshopify.com/admin/api/2024-10/graphql.json"
        );

        config.base_url = Some("http://127.0.0.1:1234/".to_string());
        assert_eq!(
            config.graphql_endpoint(),
            "http://127.0.0.1:1234/admin/api/2024-10/graphql.json"
        );
    }

    #[test]
    fn test_pipeline_config_validation() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        config.auto_tags = vec!["s".to_string(), " ".to_string()];
        assert!(config.validate().is_err());

        config.auto_tags = vec!["s".to_string()];
        config.max_job_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.local_rotation = "weekly".to_string();
        assert!(config.validate().is_err());

        assert!(!LoggingConfig::console_only().local_enabled);
    }

    #[test]
    fn test_min_file_age_must_fit_in_settle_window() {
        let mut config = RouteConfig {
            application: ApplicationConfig {
                dry_run: true,
                ..ApplicationConfig::default()
            },
            watch: watch_config(),
            ledger: LedgerConfig::default(),
            upload: UploadConfig::default(),
            retry: RetryConfig::default(),
            dropbox: DropboxConfig::default(),
            shopify: ShopifyConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::console_only(),
        };
        assert!(config.validate().is_ok());

        config.watch.settle_seconds = 0.5;
        config.upload.min_file_age_ms = 500;
        assert!(config.validate().is_ok());

        config.upload.min_file_age_ms = 501;
        let err = config.validate().unwrap_err();
        assert!(err.contains("min_file_age_ms"));

        config.watch.settle_seconds = 0.0;
        config.upload.min_file_age_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ledger_retention() {
        let mut config = LedgerConfig::default();
        assert_eq!(config.retention(), Some(chrono::Duration::days(90)));

        config.retention_days = 0;
        assert!(config.retention().is_none());
    }
}
