//! # poweron-gate
//!
//! A CI gate that validates changed PowerOn files against a Symitar host.
//!
//! A run resolves the target branch, checks the license key, computes the
//! set of changed `.PO` files and sends each one to an external validation
//! client, collecting per-file results.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ci;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod license;
pub mod orchestrator;
pub mod settings;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::cli::Cli;
pub use crate::config::ValidationConfig;
pub use crate::error::GateError;
pub use crate::orchestrator::ValidationOrchestrator;
pub use crate::validation::ValidationResult;

/// The current version of poweron-gate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
