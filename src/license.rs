//! License key validation against the remote authorization service.

pub mod retry;

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{AuthenticationError, ConfigError, ConnectionError, GateError, RejectionReason};
pub use retry::{retry_with_backoff, RetryPolicy, Retryable};

/// Product identifier sent with every authorization request.
pub const PRODUCT_ID: &str = "poweron-pipelines";

/// Header carrying the license key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// HTTP timeout for a single authorization request.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorization service response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationResponse {
    is_found: bool,
    #[serde(default)]
    subscriptions: Vec<serde_json::Value>,
    #[serde(default)]
    is_max_hosts_exceeded: bool,
}

impl AuthorizationResponse {
    fn rejection(&self) -> Option<RejectionReason> {
        if !self.is_found {
            Some(RejectionReason::KeyNotFound)
        } else if self.is_max_hosts_exceeded {
            Some(RejectionReason::MaxHostsExceeded)
        } else if self.subscriptions.is_empty() {
            Some(RejectionReason::NoActiveSubscription)
        } else {
            None
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
enum LicenseFailure {
    Rejected(AuthenticationError),
    Unreachable(ConnectionError),
}

impl std::fmt::Display for LicenseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(e) => write!(f, "{e}"),
            Self::Unreachable(e) => write!(f, "{e}"),
        }
    }
}

impl Retryable for LicenseFailure {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<LicenseFailure> for GateError {
    fn from(failure: LicenseFailure) -> Self {
        match failure {
            LicenseFailure::Rejected(e) => Self::Authentication(e),
            LicenseFailure::Unreachable(e) => Self::Connection(e),
        }
    }
}

/// Verifies license keys with retries for transient failures.
#[derive(Debug, Clone)]
pub struct LicenseValidator {
    client: Client,
    endpoint: Url,
    policy: RetryPolicy,
}

impl LicenseValidator {
    /// Creates a validator for `endpoint` using `policy` for retries.
    pub fn new(endpoint: &str, policy: RetryPolicy) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            policy,
        })
    }

    /// Returns the retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Validates `key` for `host`.
    ///
    /// An empty key fails without contacting the service. Rejections are
    /// returned immediately; connectivity failures are retried per the
    /// policy and the last one is returned once attempts run out.
    pub async fn validate(&self, key: &str, host: &str) -> Result<(), GateError> {
        if key.trim().is_empty() {
            return Err(AuthenticationError::new(key, host, RejectionReason::EmptyKey).into());
        }

        retry_with_backoff(&self.policy, |attempt| self.attempt(key, host, attempt)).await?;
        info!(host, "License validated");
        Ok(())
    }

    async fn attempt(&self, key: &str, host: &str, attempt: u32) -> Result<(), LicenseFailure> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("key", key)
            .append_pair("product", PRODUCT_ID)
            .append_pair("unit", host);

        debug!(endpoint = %self.endpoint, attempt, "Sending license authorization request");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| LicenseFailure::Unreachable(self.connection_error().with_cause(e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LicenseFailure::Unreachable(self.connection_error().with_cause(e)))?;

        // An authoritative answer in the body wins over the status code.
        if let Ok(parsed) = serde_json::from_str::<AuthorizationResponse>(&body) {
            return match parsed.rejection() {
                Some(reason) => Err(LicenseFailure::Rejected(AuthenticationError::new(
                    key, host, reason,
                ))),
                None if status.is_success() => Ok(()),
                None => Err(LicenseFailure::Unreachable(
                    self.connection_error()
                        .with_cause(format!("authorization service returned HTTP {status}")),
                )),
            };
        }

        let cause = if status.is_success() {
            format!("unexpected authorization response: {}", truncate(&body, 200))
        } else {
            format!("authorization service returned HTTP {status}")
        };
        Err(LicenseFailure::Unreachable(
            self.connection_error().with_cause(cause),
        ))
    }

    fn connection_error(&self) -> ConnectionError {
        ConnectionError::new(
            self.endpoint.host_str().unwrap_or_default(),
            self.endpoint.port_or_known_default().unwrap_or_default(),
            self.endpoint.scheme() == "https",
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
