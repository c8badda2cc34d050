//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output with configurable levels
//! - JSON-formatted local log files with rotation
//! - Helper macros for recurring pipeline events
//!
//! # Example
//!
//! ```no_run
//! use scanroute::logging::init_logging;
//! use scanroute::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(job = "2024-01-15/roll_001", "Job ready");
//! ```

pub mod structured;

pub use structured::{init_logging, parse_log_level, LoggingGuard};

/// Log the start of a job dispatch
///
/// # Example
///
/// ```no_run
/// use scanroute::log_job_start;
///
/// log_job_start!("2024-01-15/roll_001", "/Store/orders/a@b.com/100/roll_001");
/// ```
#[macro_export]
macro_rules! log_job_start {
    ($job_key:expr, $destination:expr) => {
        tracing::info!(
            job = %$job_key,
            destination = %$destination,
            "Dispatching job"
        );
    };
}

/// Log the completion of a job upload
///
/// # Example
///
/// ```no_run
/// use scanroute::log_job_complete;
/// use std::time::Duration;
///
/// log_job_complete!("2024-01-15/roll_001", 12, 12, Duration::from_secs(4));
/// ```
#[macro_export]
macro_rules! log_job_complete {
    ($job_key:expr, $succeeded:expr, $total:expr, $duration:expr) => {
        tracing::info!(
            job = %$job_key,
            succeeded = $succeeded,
            total = $total,
            duration_ms = $duration.as_millis() as u64,
            "Job upload finished"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use scanroute::log_retry_attempt;
///
/// log_retry_attempt!("upload", 2, 5, 2000u64, "rate limited");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($operation:expr, $attempt:expr, $max_attempts:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            operation = %$operation,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay_ms,
            reason = %$reason,
            "Retrying operation"
        );
    };
}
