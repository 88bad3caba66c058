//! Command-line entry point for the gate.
//!
//! Every flag can also be supplied the way a GitHub Action receives its
//! inputs: as `INPUT_<NAME>` with the input name upper-cased.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::debug;

use crate::ci;
use crate::config::{RawInputs, ValidationConfig};
use crate::error::ConfigError;
use crate::git::GitCli;
use crate::license::{LicenseValidator, RetryPolicy};
use crate::orchestrator::ValidationOrchestrator;
use crate::settings;
use crate::validation::{BridgeClientFactory, ValidationResult};

/// Environment or settings key consulted when `--license-url` is absent.
pub const LICENSE_URL_VAR: &str = "POWERON_GATE_LICENSE_URL";

/// How the final result is reported on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Summary line plus one error line per failing file.
    #[default]
    Text,
    /// The full result as JSON.
    Json,
}

/// poweron-gate: validates changed PowerOn files against a Symitar host.
#[derive(Parser, Debug)]
#[command(name = "poweron-gate")]
#[command(about = "Validates changed PowerOn files against a Symitar host", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Symitar host name or address.
    #[arg(long, env = "INPUT_SYMITAR-HOSTNAME")]
    pub symitar_hostname: Option<String>,

    /// Sym number to validate against.
    #[arg(long, env = "INPUT_SYM-NUMBER")]
    pub sym_number: Option<String>,

    /// Symitar user number used to sign on.
    #[arg(long, env = "INPUT_SYMITAR-USER-NUMBER", hide_env_values = true)]
    pub symitar_user_number: Option<String>,

    /// Symitar user password.
    #[arg(long, env = "INPUT_SYMITAR-USER-PASSWORD", hide_env_values = true)]
    pub symitar_user_password: Option<String>,

    /// Transport (SSH) username.
    #[arg(long, env = "INPUT_SSH-USERNAME")]
    pub ssh_username: Option<String>,

    /// Transport (SSH) password.
    #[arg(long, env = "INPUT_SSH-PASSWORD", hide_env_values = true)]
    pub ssh_password: Option<String>,

    /// Transport port. Defaults to 22.
    #[arg(long, env = "INPUT_SSH-PORT")]
    pub ssh_port: Option<String>,

    /// License key.
    #[arg(long, env = "INPUT_API-KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API port for the per-call connection type.
    #[arg(long, env = "INPUT_SYMITAR-APP-PORT")]
    pub symitar_app_port: Option<String>,

    /// Connection type: persistent-session or per-call.
    #[arg(long, env = "INPUT_CONNECTION-TYPE")]
    pub connection_type: Option<String>,

    /// Validation bridge endpoint used by the persistent-session connection type.
    #[arg(long, env = "INPUT_BRIDGE-URL")]
    pub bridge_url: Option<String>,

    /// Directory holding PowerOn files. Defaults to REPWRITERSPECS/.
    #[arg(long, env = "INPUT_POWERON-DIRECTORY")]
    pub poweron_directory: Option<String>,

    /// Branch to diff against; omit to validate every file.
    #[arg(long, env = "INPUT_TARGET-BRANCH")]
    pub target_branch: Option<String>,

    /// Comma-separated file names to skip.
    #[arg(long, env = "INPUT_VALIDATE-IGNORE")]
    pub validate_ignore: Option<String>,

    /// Prefix for progress lines. Defaults to [PowerOnGate].
    #[arg(long, env = "INPUT_LOG-PREFIX")]
    pub log_prefix: Option<String>,

    /// Enables debug logging.
    #[arg(long, env = "INPUT_DEBUG")]
    pub debug: bool,

    /// License service endpoint. Falls back to POWERON_GATE_LICENSE_URL.
    #[arg(long, env = "INPUT_LICENSE-URL")]
    pub license_url: Option<String>,

    /// License check retries after the first attempt.
    #[arg(long, env = "INPUT_LICENSE-RETRIES", default_value_t = 2)]
    pub license_retries: u32,

    /// Delay before the first license retry, in milliseconds. Doubles per retry.
    #[arg(long, env = "INPUT_LICENSE-RETRY-DELAY-MS", default_value_t = 1000)]
    pub license_retry_delay_ms: u64,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

impl Cli {
    /// Runs the gate. Returns whether every validated file passed.
    pub async fn execute(self) -> Result<bool> {
        let raw = self.raw_inputs();
        for secret in [&raw.api_key, &raw.user_password, &raw.transport_password] {
            ci::mask(secret);
        }

        let config = ValidationConfig::from_inputs(raw)?;
        debug!(?config, "Configuration loaded");

        let license = LicenseValidator::new(&self.resolve_license_url()?, self.retry_policy())?;
        let vcs = GitCli::new();
        let clients = BridgeClientFactory::new()?;

        let result = ValidationOrchestrator::new(&license, &vcs, &clients)
            .run(&config)
            .await?;

        self.report(&config.log_prefix, &result)?;
        Ok(result.is_success())
    }

    /// Collects the flag values into unvalidated inputs.
    pub fn raw_inputs(&self) -> RawInputs {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        RawInputs {
            host: text(&self.symitar_hostname),
            sym_number: text(&self.sym_number),
            user_number: text(&self.symitar_user_number),
            user_password: text(&self.symitar_user_password),
            transport_username: text(&self.ssh_username),
            transport_password: text(&self.ssh_password),
            transport_port: text(&self.ssh_port),
            api_key: text(&self.api_key),
            api_port: text(&self.symitar_app_port),
            connection_type: text(&self.connection_type),
            bridge_url: text(&self.bridge_url),
            directory: text(&self.poweron_directory),
            target_branch: text(&self.target_branch),
            ignore: text(&self.validate_ignore),
            log_prefix: text(&self.log_prefix),
            debug: self.debug,
        }
    }

    /// Retry policy built from the license flags.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.license_retries.saturating_add(1),
            initial_delay: Duration::from_millis(self.license_retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// License endpoint from the flag, the environment or the settings file.
    pub fn resolve_license_url(&self) -> Result<String> {
        if let Some(url) = self
            .license_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            return Ok(url.to_string());
        }
        settings::get_env_var(LICENSE_URL_VAR)
            .map_err(|_| anyhow::Error::from(ConfigError::MissingInput("license-url")))
    }

    fn report(&self, log_prefix: &str, result: &ValidationResult) -> Result<()> {
        match self.output {
            OutputFormat::Text => {
                println!("{}", ci::summary_line(log_prefix, result));
                for error in &result.errors {
                    ci::error(error);
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        }
        ci::publish(result)
    }
}
