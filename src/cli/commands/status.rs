//! Status command implementation
//!
//! This module implements the `status` command for displaying the jobs
//! recorded in the processed ledger.

use crate::config::load_config;
use crate::core::ledger::{LedgerEntry, ProcessedLedger};
use crate::domain::JobOutcome;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show jobs whose key contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Show at most this many jobs, newest first
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking ledger status");

        println!("📊 Processed Jobs");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {}", e);
                return Ok(2); // Configuration error exit code
            }
        };

        let ledger = match ProcessedLedger::load(&config.ledger.path) {
            Ok(l) => l,
            Err(e) => {
                println!("❌ Failed to read ledger {}", config.ledger.path);
                println!("   Error: {}", e);
                return Ok(5); // Fatal error exit code
            }
        };

        if ledger.is_empty() {
            println!("No processed jobs found.");
            println!("Run 'scanroute watch' to start uploading scans.");
            return Ok(0);
        }

        let rows = self.select(ledger.entries());
        if rows.is_empty() {
            println!("No jobs match the specified filter.");
            return Ok(0);
        }

        let (complete, partial, empty) = count_outcomes(&rows);
        println!(
            "Showing {} of {} job(s): {} complete, {} partial, {} empty",
            rows.len(),
            ledger.len(),
            complete,
            partial,
            empty
        );
        println!();
        println!("{:<45} {:<12} {:<25}", "Job", "Outcome", "Marked At");
        println!("{}", "-".repeat(82));

        for (key, entry) in &rows {
            let outcome = match entry.outcome {
                JobOutcome::Complete => "✅ complete",
                JobOutcome::Partial => "⚠️  partial",
                JobOutcome::Empty => "⏸️  empty",
            };
            println!(
                "{:<45} {:<12} {:<25}",
                key,
                outcome,
                entry.marked_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        println!();
        Ok(0)
    }

    /// Apply the filter, newest first, capped at the limit
    fn select(&self, entries: Vec<(String, LedgerEntry)>) -> Vec<(String, LedgerEntry)> {
        let needle = self.filter.as_deref().map(str::to_lowercase);
        let mut rows: Vec<_> = entries
            .into_iter()
            .filter(|(key, _)| match &needle {
                Some(n) => key.to_lowercase().contains(n),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| b.1.marked_at.cmp(&a.1.marked_at).then(a.0.cmp(&b.0)));
        rows.truncate(self.limit);
        rows
    }
}

fn count_outcomes(rows: &[(String, LedgerEntry)]) -> (usize, usize, usize) {
    rows.iter()
        .fold((0, 0, 0), |(c, p, e), (_, entry)| match entry.outcome {
            JobOutcome::Complete => (c + 1, p, e),
            JobOutcome::Partial => (c, p + 1, e),
            JobOutcome::Empty => (c, p, e + 1),
        })
}
