//! Top-level gate sequence.

use tracing::info;

use crate::config::ValidationConfig;
use crate::error::GateError;
use crate::git::{ChangeSetScanner, VersionControl};
use crate::license::LicenseValidator;
use crate::validation::{ClientFactory, ValidationDispatcher, ValidationResult};

/// Runs license check, change-set resolution and dispatch for one run.
pub struct ValidationOrchestrator<'a> {
    license: &'a LicenseValidator,
    vcs: &'a dyn VersionControl,
    clients: &'a dyn ClientFactory,
}

impl<'a> ValidationOrchestrator<'a> {
    /// Wires the orchestrator to its collaborators.
    pub fn new(
        license: &'a LicenseValidator,
        vcs: &'a dyn VersionControl,
        clients: &'a dyn ClientFactory,
    ) -> Self {
        Self {
            license,
            vcs,
            clients,
        }
    }

    /// Executes one gate run.
    ///
    /// The target branch is resolved first so a bad ref fails before any
    /// license traffic. A license failure stops the run before the change
    /// set is computed, and an empty change set never builds a client.
    pub async fn run(&self, config: &ValidationConfig) -> Result<ValidationResult, GateError> {
        let scanner = ChangeSetScanner::new(self.vcs);
        let plan = scanner.plan(config).await?;

        self.license.validate(&config.api_key, &config.host).await?;
        info!(host = %config.host, "License accepted");

        let files = scanner.scan_with(config, &plan).await?;
        if files.is_empty() {
            info!("No PowerOn files to validate");
            return Ok(ValidationResult::default());
        }
        info!(count = files.len(), "PowerOn files to validate");

        let result = ValidationDispatcher::new(self.clients)
            .dispatch(config, &files)
            .await?;
        info!(
            validated = result.files_validated,
            failed = result.files_failed,
            "Gate run complete"
        );
        Ok(result)
    }
}
