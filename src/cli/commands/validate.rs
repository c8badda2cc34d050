//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the scanroute configuration file.

use crate::config::load_config;
use clap::Args;
use std::path::Path;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates every section before returning
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Lab Name: {}", config.application.lab_name);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  Watch Root: {}", config.watch.root);
        println!("  Job Depth: {}", config.watch.depth);
        println!(
            "  Poll / Settle: {}s / {}s",
            config.watch.poll_interval_secs, config.watch.settle_seconds
        );
        println!("  Ledger: {}", config.ledger.path);
        println!("  Upload Concurrency: {}", config.upload.concurrency);
        println!("  Chunk Size: {} MiB", config.upload.chunk_size_mb);
        println!("  Dropbox Root: {}", config.dropbox.root);
        println!(
            "  Dropbox Auth: {}",
            if config.dropbox.refresh_token.is_some() {
                "refresh token"
            } else if config.dropbox.access_token.is_some() {
                "access token"
            } else {
                "none"
            }
        );
        println!("  Shopify Endpoint: {}", config.shopify.graphql_endpoint());
        if !config.pipeline.auto_tags.is_empty() {
            println!("  Auto Tags: {}", config.pipeline.auto_tags.join(", "));
        }
        println!();

        if !Path::new(&config.watch.root).is_dir() {
            println!("⚠️  Watch root {} does not exist yet", config.watch.root);
            println!();
        }

        Ok(0)
    }
}
