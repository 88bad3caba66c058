//! Error taxonomy for a gate run.
//!
//! Only [`GateError`] escapes the orchestrator. Per-file validation
//! failures never surface here; they are captured in the
//! [`ValidationResult`](crate::validation::ValidationResult).

use std::fmt;

use thiserror::Error;

/// Boxed cause carried by [`ConnectionError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal errors that abort a gate run.
#[derive(Error, Debug)]
pub enum GateError {
    /// Invalid inputs or an unresolvable change set.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The license service authoritatively rejected the key.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// A remote endpoint could not be reached.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Configuration problems. Never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required input was empty or missing.
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    /// A port input was not an integer in 1..=65535.
    #[error("Invalid {name} '{value}': expected an integer between 1 and 65535")]
    InvalidPort {
        /// Input name.
        name: &'static str,
        /// Raw value supplied.
        value: String,
    },

    /// The sym number was not numeric.
    #[error("Invalid sym number '{0}': expected a number")]
    InvalidSymNumber(String),

    /// The connection type selector was not one of the two strategies.
    #[error("Invalid connection type '{0}': expected 'persistent-session' or 'per-call'")]
    InvalidConnectionType(String),

    /// The per-call strategy was selected without an API port.
    #[error("Connection type 'per-call' requires symitar-app-port to be set")]
    MissingApiPort,

    /// The persistent-session strategy was selected without a bridge endpoint.
    #[error("Connection type 'persistent-session' requires bridge-url to be set")]
    MissingBridgeUrl,

    /// An endpoint URL could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Raw URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// None of the branch naming variants exists in the local clone.
    #[error(
        "Target branch '{requested}' could not be found in the repository. \
         Shallow checkouts can hide branches; fetch with a larger depth \
         (e.g. fetch-depth: 0)"
    )]
    BranchNotFound {
        /// Branch name as originally requested.
        requested: String,
    },

    /// The HTTP client could not be initialized.
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClient(String),

    /// The version control backend failed while computing the change set.
    #[error("Failed to compute change set: {0:#}")]
    VersionControl(anyhow::Error),
}

/// Reasons the license service gives for refusing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// No key was supplied.
    EmptyKey,
    /// The service does not know the key.
    KeyNotFound,
    /// The key exists but has no active subscription.
    NoActiveSubscription,
    /// The key is registered on too many hosts already.
    MaxHostsExceeded,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "no license key was provided"),
            Self::KeyNotFound => write!(f, "license key not found"),
            Self::NoActiveSubscription => write!(f, "no active subscription"),
            Self::MaxHostsExceeded => write!(f, "maximum number of registered hosts exceeded"),
        }
    }
}

/// Authoritative license rejection. Retrying will not help.
#[derive(Error)]
#[error("License validation failed for key {} on host '{host}': {reason}", mask_key(.key))]
pub struct AuthenticationError {
    /// Key that was checked. Never displayed unmasked.
    pub key: String,
    /// Host identifier the key was checked against.
    pub host: String,
    /// Why the key was rejected.
    pub reason: RejectionReason,
}

impl AuthenticationError {
    /// Creates a rejection for `key` on `host`.
    pub fn new(key: impl Into<String>, host: impl Into<String>, reason: RejectionReason) -> Self {
        Self {
            key: key.into(),
            host: host.into(),
            reason,
        }
    }
}

impl fmt::Debug for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationError")
            .field("key", &mask_key(&self.key))
            .field("host", &self.host)
            .field("reason", &self.reason)
            .finish()
    }
}

/// Transient connectivity failure. Retrying may help.
#[derive(Error, Debug)]
#[error(
    "Unable to connect to {host}:{port} ({}){}",
    if *.secure { "encrypted" } else { "unencrypted" },
    .cause.as_ref().map(|c| format!(": {c}")).unwrap_or_default()
)]
pub struct ConnectionError {
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Whether the attempted transport was encrypted.
    pub secure: bool,
    /// Underlying failure, if any.
    #[source]
    pub cause: Option<BoxError>,
}

impl ConnectionError {
    /// Creates a connection error without an underlying cause.
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            cause: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Masks a secret for display, keeping at most the last four characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
