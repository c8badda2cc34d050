//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod init;
pub mod reassign_staged;
pub mod status;
pub mod validate;
pub mod watch;
