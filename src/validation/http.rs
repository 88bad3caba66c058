//! HTTP adapter for a PowerOn validation bridge.
//!
//! The bridge fronts the host and exposes both connection shapes over
//! JSON: sessions with workers for the persistent strategy, and a single
//! validate endpoint for the per-call strategy.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::client::{ClientFactory, PowerOnValidator, StatelessClient, ValidationSession};
use super::PowerOnOutcome;
use crate::config::{TargetSystem, TransportSession};
use crate::git::scanner::base_name;

/// HTTP timeout for a single bridge call.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Readiness polls before giving up on a session.
const READY_POLL_ATTEMPTS: u32 = 30;

/// Host and transport credentials for opening a session.
#[derive(Serialize)]
struct OpenSessionRequest<'a> {
    host: &'a str,
    username: &'a str,
    password: &'a str,
    port: u16,
}

/// Session handle returned by the bridge.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
    session_id: String,
}

/// Session state.
#[derive(Deserialize)]
struct SessionStatus {
    ready: bool,
}

/// Target-system sign-on.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignOn<'a> {
    sym_number: u32,
    user_number: &'a str,
    password: &'a str,
}

/// Worker handle returned by the bridge.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkerResponse {
    worker_id: String,
}

/// File submitted for validation.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    #[serde(flatten)]
    sign_on: Option<SignOn<'a>>,
    file_name: String,
    content: String,
}

/// [`ClientFactory`] that talks to a validation bridge over HTTP.
#[derive(Debug, Clone)]
pub struct BridgeClientFactory {
    client: Client,
    poll_interval: Duration,
}

impl BridgeClientFactory {
    /// Creates a factory with the default timeout.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Sets the delay between readiness polls.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl ClientFactory for BridgeClientFactory {
    fn open_session<'a>(
        &'a self,
        endpoint: &'a Url,
        host: &'a str,
        transport: &'a TransportSession,
    ) -> BoxFuture<'a, Result<Box<dyn ValidationSession>>> {
        Box::pin(async move {
            let url = endpoint.join("api/v1/sessions")?;
            debug!(%url, "Opening validation session");

            let response = self
                .client
                .post(url)
                .json(&OpenSessionRequest {
                    host,
                    username: &transport.username,
                    password: &transport.password,
                    port: transport.port,
                })
                .send()
                .await
                .context("Failed to open validation session")?;
            let opened: OpenSessionResponse = check_status(response)
                .await?
                .json()
                .await
                .context("Invalid session response")?;

            let session_url = endpoint.join(&format!("api/v1/sessions/{}/", opened.session_id))?;
            Ok(Box::new(BridgeSession {
                client: self.client.clone(),
                session_url,
                poll_interval: self.poll_interval,
            }) as Box<dyn ValidationSession>)
        })
    }

    fn stateless_client(
        &self,
        base_url: &Url,
        target: &TargetSystem,
    ) -> Result<Box<dyn StatelessClient>> {
        Ok(Box::new(BridgeStatelessClient {
            client: self.client.clone(),
            validate_url: base_url.join("api/v1/poweron/validate")?,
            target: target.clone(),
        }))
    }
}

/// An open bridge session.
struct BridgeSession {
    client: Client,
    session_url: Url,
    poll_interval: Duration,
}

impl ValidationSession for BridgeSession {
    fn ready(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            for attempt in 1..=READY_POLL_ATTEMPTS {
                let response = self
                    .client
                    .get(self.session_url.clone())
                    .send()
                    .await
                    .context("Failed to poll session status")?;
                let status: SessionStatus = check_status(response)
                    .await?
                    .json()
                    .await
                    .context("Invalid session status response")?;
                if status.ready {
                    debug!(attempt, "Validation session ready");
                    return Ok(());
                }
                tokio::time::sleep(self.poll_interval).await;
            }
            anyhow::bail!("Validation session not ready after {READY_POLL_ATTEMPTS} polls")
        })
    }

    fn create_worker<'a>(
        &'a self,
        target: &'a TargetSystem,
    ) -> BoxFuture<'a, Result<Box<dyn PowerOnValidator + 'a>>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.session_url.join("workers")?)
                .json(&SignOn {
                    sym_number: target.sym_number,
                    user_number: &target.user_number,
                    password: &target.password,
                })
                .send()
                .await
                .context("Failed to create validation worker")?;
            let created: CreateWorkerResponse = check_status(response)
                .await?
                .json()
                .await
                .context("Invalid worker response")?;
            debug!(worker = %created.worker_id, "Validation worker created");

            let validate_url = self
                .session_url
                .join(&format!("workers/{}/validate", created.worker_id))?;
            Ok(Box::new(BridgeWorker {
                client: &self.client,
                validate_url,
            }) as Box<dyn PowerOnValidator + 'a>)
        })
    }

    fn end(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let response = self
                .client
                .delete(self.session_url.clone())
                .send()
                .await
                .context("Failed to end validation session")?;
            check_status(response).await?;
            Ok(())
        })
    }
}

/// Worker bound to one session.
struct BridgeWorker<'a> {
    client: &'a Client,
    validate_url: Url,
}

impl PowerOnValidator for BridgeWorker<'_> {
    fn validate_power_on<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<PowerOnOutcome>> {
        Box::pin(async move {
            let request = validate_request(path, None).await?;
            post_validate(self.client, &self.validate_url, &request).await
        })
    }
}

/// Per-call bridge client.
struct BridgeStatelessClient {
    client: Client,
    validate_url: Url,
    target: TargetSystem,
}

impl PowerOnValidator for BridgeStatelessClient {
    fn validate_power_on<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<PowerOnOutcome>> {
        Box::pin(async move {
            let sign_on = SignOn {
                sym_number: self.target.sym_number,
                user_number: &self.target.user_number,
                password: &self.target.password,
            };
            let request = validate_request(path, Some(sign_on)).await?;
            post_validate(&self.client, &self.validate_url, &request).await
        })
    }
}

impl StatelessClient for BridgeStatelessClient {
    fn end(&self) {
        debug!(url = %self.validate_url, "Stateless client released");
    }
}

async fn validate_request<'a>(
    path: &Path,
    sign_on: Option<SignOn<'a>>,
) -> Result<ValidateRequest<'a>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(ValidateRequest {
        sign_on,
        file_name: base_name(path),
        content,
    })
}

async fn post_validate(
    client: &Client,
    url: &Url,
    request: &ValidateRequest<'_>,
) -> Result<PowerOnOutcome> {
    debug!(file = %request.file_name, "Submitting file for validation");
    let response = client
        .post(url.clone())
        .json(request)
        .send()
        .await
        .with_context(|| format!("Failed to submit {}", request.file_name))?;
    check_status(response)
        .await?
        .json()
        .await
        .context("Invalid validation response")
}

/// Turns a non-success status into an error carrying the body.
async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|e| {
        debug!("Failed to read error response body: {e}");
        String::new()
    });
    anyhow::bail!("Validation bridge returned HTTP {status}: {}", body.trim())
}
