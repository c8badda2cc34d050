//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "scanroute.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing scanroute configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} and set watch.root to the scanner output", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - DROPBOX_REFRESH_TOKEN, DROPBOX_APP_KEY, DROPBOX_APP_SECRET");
                println!("     - SHOPIFY_ADMIN_TOKEN");
                println!("  3. Validate configuration: scanroute validate-config");
                println!("  4. Rehearse without writing anything: scanroute watch --dry-run");
                println!("  5. Start routing scans: scanroute watch");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# scanroute Configuration File

[application]
log_level = "info"
dry_run = false
lab_name = "Noritsu"

[watch]
root = "/Volumes/Scans"
depth = 2
poll_interval_secs = 2
settle_seconds = 8

[ledger]
path = ".processed_jobs.json"
retention_days = 90

[upload]
concurrency = 32
chunk_size_mb = 32

[dropbox]
root = "/Store/orders"
refresh_token = "${DROPBOX_REFRESH_TOKEN}"
app_key = "${DROPBOX_APP_KEY}"
app_secret = "${DROPBOX_APP_SECRET}"

[shopify]
shop = "my-lab.myshopify.com"
admin_token = "${SHOPIFY_ADMIN_TOKEN}"

[pipeline]
auto_tags = []
note_enabled = true

[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# scanroute Configuration File
# Routes scanner output folders to customer Dropbox folders by Shopify order
#
# Values of the form ${VAR} are read from the environment (or a .env file).
# Any value can also be overridden with SCANROUTE_<SECTION>_<KEY>,
# e.g. SCANROUTE_WATCH_ROOT=/mnt/scans.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Dry run mode: uploads go to an in-memory store, orders are never modified.
# Dropbox credentials are not required; Shopify is only searched when a
# token is configured.
dry_run = false

# Name written into the audit note on each order
lab_name = "Noritsu"

# ============================================================================
# Watch Folder
# ============================================================================
[watch]
# Directory the scanner writes into
root = "/Volumes/Scans"

# Depth of job folders below the root
# 1 = <scan>, 2 = <batch>/<scan>
depth = 2

# Seconds between polls
poll_interval_secs = 2

# A job is ready once its newest file is older than this many seconds
settle_seconds = 8

# Treat folders that exist at startup as already handled
skip_existing_on_start = false

# ============================================================================
# Processed Ledger
# ============================================================================
[ledger]
# JSON file recording handled jobs (survives restarts)
path = ".processed_jobs.json"

# Forget entries whose folder left the watch root this many days ago
# 0 = keep forever
retention_days = 90

# ============================================================================
# Uploads
# ============================================================================
[upload]
# Files uploaded in parallel per job
concurrency = 32

# Files larger than this use chunked upload sessions (1-150 MiB)
chunk_size_mb = 32

# Files modified within this window are left for the next poll
min_file_age_ms = 500

# Count files already present at the destination as uploaded
skip_existing = false

# ============================================================================
# Retry Policy (all remote calls)
# ============================================================================
[retry]
max_attempts = 5
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0
jitter_ms = 250

# ============================================================================
# Dropbox
# ============================================================================
[dropbox]
# Customer folders are created as <root>/<email>/<order number>
# Jobs without an order go to <root>/_staging/<job>
root = "/Store/orders"

# Either a long-lived access token...
# access_token = "${DROPBOX_ACCESS_TOKEN}"

# ...or a refresh token with the app credentials (recommended)
refresh_token = "${DROPBOX_REFRESH_TOKEN}"
app_key = "${DROPBOX_APP_KEY}"
app_secret = "${DROPBOX_APP_SECRET}"

timeout_seconds = 120

# ============================================================================
# Shopify
# ============================================================================
[shopify]
shop = "my-lab.myshopify.com"
admin_token = "${SHOPIFY_ADMIN_TOKEN}"
api_version = "2024-10"

# Customer metafield holding the Dropbox shared link
link_namespace = "custom"
link_key = "dropbox_root_url"

# Orders returned per search; the most recent match wins
search_limit = 10
timeout_seconds = 60

# ============================================================================
# Pipeline
# ============================================================================
[pipeline]
# Tags added to the order after every upload
auto_tags = ["s"]

# Append an audit note to the order after every upload
note_enabled = true

# Failed dispatches before a job is set aside until restart
max_job_attempts = 5

# Pending shared-link write-backs before new ones are dropped
metadata_queue_capacity = 64

# ============================================================================
# Logging
# ============================================================================
[logging]
# JSON log files in addition to the console
local_enabled = true
local_path = "./logs"

# daily | hourly | size
local_rotation = "daily"
local_max_size_mb = 100
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    #[test]
    fn test_init_args_defaults() {
        let args = InitArgs {
            output: "scanroute.toml".to_string(),
            with_examples: false,
            force: false,
        };

        assert_eq!(args.output, "scanroute.toml");
        assert!(!args.with_examples);
        assert!(!args.force);
    }

    #[test]
    fn test_generate_minimal_config() {
        let content = InitArgs::generate_minimal_config();
        let config: RouteConfig = toml::from_str(&content).unwrap();
        assert_eq!(config.watch.depth, 2);
        assert_eq!(config.dropbox.root, "/Store/orders");
    }

    #[test]
    fn test_generate_config_with_examples() {
        let content = InitArgs::generate_config_with_examples();
        let config: RouteConfig = toml::from_str(&content).unwrap();
        assert_eq!(config.pipeline.auto_tags, vec!["s".to_string()]);
        assert!(content.contains("# scanroute Configuration File"));
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("scanroute.toml");
        fs::write(&output, "existing").unwrap();

        let args = InitArgs {
            output: output.to_string_lossy().to_string(),
            with_examples: false,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), "existing");
    }
}
