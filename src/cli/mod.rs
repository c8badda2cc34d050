//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for scanroute using clap.

pub mod commands;
pub mod console;

use clap::{Parser, Subcommand};

/// scanroute - Route scanner output to customer Dropbox folders
#[derive(Parser, Debug)]
#[command(name = "scanroute")]
#[command(version, about, long_about = None)]
#[command(author = "Scanroute Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "scanroute.toml", env = "SCANROUTE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "SCANROUTE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the scan folder and upload finished jobs
    Watch(commands::watch::WatchArgs),

    /// Show processed jobs from the ledger
    Status(commands::status::StatusArgs),

    /// List staged jobs or move one into an order folder
    ReassignStaged(commands::reassign_staged::ReassignStagedArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
