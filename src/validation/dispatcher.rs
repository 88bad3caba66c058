//! Connection strategy selection and the per-file loop.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, info, warn};
use url::Url;

use super::client::{ClientFactory, PowerOnValidator};
use super::ValidationResult;
use crate::config::{ConnectionStrategy, ValidationConfig};
use crate::error::{ConfigError, ConnectionError, GateError};
use crate::git::ChangedFile;

/// Owns the external client for the duration of one dispatch.
pub struct ValidationDispatcher<'a> {
    clients: &'a dyn ClientFactory,
}

impl<'a> ValidationDispatcher<'a> {
    /// Creates a dispatcher that builds clients with `clients`.
    pub fn new(clients: &'a dyn ClientFactory) -> Self {
        Self { clients }
    }

    /// Validates `files` in order using the configured strategy.
    ///
    /// The session or client is released exactly once before this returns,
    /// including when setup fails after acquisition or a validator panics.
    pub async fn dispatch(
        &self,
        config: &ValidationConfig,
        files: &[ChangedFile],
    ) -> Result<ValidationResult, GateError> {
        info!(
            strategy = %config.connection_type(),
            files = files.len(),
            "Dispatching validation"
        );
        match config.strategy {
            ConnectionStrategy::PersistentSession { ref bridge_url } => {
                self.dispatch_session(config, bridge_url, files).await
            }
            ConnectionStrategy::PerCall { api_port } => {
                self.dispatch_per_call(config, api_port, files).await
            }
        }
    }

    async fn dispatch_session(
        &self,
        config: &ValidationConfig,
        bridge_url: &Url,
        files: &[ChangedFile],
    ) -> Result<ValidationResult, GateError> {
        let bridge_host = bridge_url.host_str().unwrap_or(&config.host);
        let bridge_port = bridge_url
            .port_or_known_default()
            .unwrap_or(config.transport.port);
        let secure = bridge_url.scheme() == "https";
        let unreachable = |cause: anyhow::Error| {
            ConnectionError::new(bridge_host, bridge_port, secure).with_cause(cause)
        };

        let session = self
            .clients
            .open_session(bridge_url, &config.host, &config.transport)
            .await
            .map_err(unreachable)?;
        debug!(%bridge_url, host = %config.host, "Session opened");

        let outcome = AssertUnwindSafe(async {
            session.ready().await.map_err(unreachable)?;
            let worker = session
                .create_worker(&config.target)
                .await
                .map_err(unreachable)?;
            Ok::<_, GateError>(validate_files(worker.as_ref(), files).await)
        })
        .catch_unwind()
        .await;

        if let Err(e) = session.end().await {
            warn!("Failed to end validation session: {e:#}");
        } else {
            debug!("Session ended");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn dispatch_per_call(
        &self,
        config: &ValidationConfig,
        api_port: u16,
        files: &[ChangedFile],
    ) -> Result<ValidationResult, GateError> {
        let base_url = base_url(&config.host, api_port)?;
        let client = self
            .clients
            .stateless_client(&base_url, &config.target)
            .map_err(|cause| {
                ConnectionError::new(&config.host, api_port, base_url.scheme() == "https")
                    .with_cause(cause)
            })?;
        debug!(%base_url, "Stateless client created");

        let outcome = AssertUnwindSafe(validate_files(client.as_ref(), files))
            .catch_unwind()
            .await;

        client.end();
        debug!("Stateless client ended");

        match outcome {
            Ok(result) => Ok(result),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Builds the per-call base URL from the host and API port.
///
/// A bare host gets the `https` scheme; a host that already carries a
/// scheme keeps it.
pub fn base_url(host: &str, port: u16) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: host.to_string(),
        reason,
    };
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    url.set_port(Some(port))
        .map_err(|()| invalid("host cannot carry a port".to_string()))?;
    Ok(url)
}

/// Validates `files` sequentially, capturing every per-file failure.
///
/// Neither an invalid file nor a validator error stops the loop.
pub async fn validate_files<V>(validator: &V, files: &[ChangedFile]) -> ValidationResult
where
    V: PowerOnValidator + ?Sized,
{
    let mut result = ValidationResult::default();

    for file in files {
        let name = file.base_name();
        debug!(file = %name, status = %file.status, "Validating");

        match validator.validate_power_on(&file.path).await {
            Ok(outcome) if outcome.is_valid => {
                info!(file = %name, "Passed");
                result.record_pass(name);
            }
            Ok(outcome) => {
                let text = outcome.error_text();
                info!(file = %name, "Failed");
                result.record_failure(name, &text);
            }
            Err(e) => {
                warn!(file = %file.path.display(), "Validation call failed: {e:#}");
                result.record_failure(name, &format!("{e:#}"));
            }
        }
    }

    info!(
        validated = result.files_validated,
        passed = result.files_passed,
        failed = result.files_failed,
        "Validation loop finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionStrategy;
    use crate::git::FileStatus;
    use crate::test_utils::{test_config, MockClientFactory, Reply};
    use crate::validation::PowerOnOutcome;

    fn files(names: &[&str]) -> Vec<ChangedFile> {
        names
            .iter()
            .map(|n| ChangedFile::new(format!("DIR/{n}"), FileStatus::Modified))
            .collect()
    }

    fn per_call_config() -> ValidationConfig {
        let mut config = test_config();
        config.strategy = ConnectionStrategy::PerCall { api_port: 42627 };
        config
    }

    #[tokio::test]
    async fn one_failure_one_pass() {
        let factory = MockClientFactory::new(vec![
            Reply::Outcome(PowerOnOutcome::invalid(["bad syntax"])),
            Reply::Outcome(PowerOnOutcome::valid()),
        ]);
        let result = ValidationDispatcher::new(&factory)
            .dispatch(&test_config(), &files(&["A.PO", "B.PO"]))
            .await
            .unwrap();

        assert_eq!(
            result,
            ValidationResult {
                files_validated: 2,
                files_passed: 1,
                files_failed: 1,
                errors: vec!["A.PO: bad syntax".to_string()],
                validated_files: vec!["A.PO".to_string(), "B.PO".to_string()],
            }
        );
        assert_eq!(factory.handle().session_ends(), 1);
        assert_eq!(factory.handle().validated_paths(), vec!["DIR/A.PO", "DIR/B.PO"]);
    }

    #[tokio::test]
    async fn validator_errors_do_not_stop_the_loop() {
        let factory = MockClientFactory::new(vec![
            Reply::Error("host dropped the request".to_string()),
            Reply::Outcome(PowerOnOutcome::invalid(["line 1", "line 2"])),
            Reply::Outcome(PowerOnOutcome::valid()),
        ]);
        let result = ValidationDispatcher::new(&factory)
            .dispatch(&per_call_config(), &files(&["A.PO", "B.PO", "C.PO"]))
            .await
            .unwrap();

        assert_eq!(result.files_validated, 3);
        assert_eq!(result.files_failed, 2);
        assert_eq!(result.files_passed, 1);
        assert_eq!(
            result.errors,
            vec!["A.PO: host dropped the request", "B.PO: line 1\nline 2"]
        );
        assert_eq!(factory.handle().client_ends(), 1);
        assert_eq!(factory.handle().session_ends(), 0);
    }

    #[tokio::test]
    async fn per_call_uses_api_port_in_base_url() {
        let factory = MockClientFactory::new(vec![Reply::Outcome(PowerOnOutcome::valid())]);
        ValidationDispatcher::new(&factory)
            .dispatch(&per_call_config(), &files(&["A.PO"]))
            .await
            .unwrap();
        assert_eq!(
            factory.handle().base_urls(),
            vec!["https://symitar01:42627/".to_string()]
        );
    }

    #[tokio::test]
    async fn session_is_ended_when_readiness_fails() {
        let factory = MockClientFactory::new(vec![]).failing_ready();
        let err = ValidationDispatcher::new(&factory)
            .dispatch(&test_config(), &files(&["A.PO"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GateError::Connection(ref e) if e.host == "bridge.example.com" && e.port == 8443
        ));
        assert_eq!(factory.handle().session_ends(), 1);
        assert!(factory.handle().validated_paths().is_empty());
    }

    #[tokio::test]
    async fn session_opens_through_bridge_not_transport_port() {
        let factory = MockClientFactory::new(vec![Reply::Outcome(PowerOnOutcome::valid())]);
        ValidationDispatcher::new(&factory)
            .dispatch(&test_config(), &files(&["A.PO"]))
            .await
            .unwrap();
        assert_eq!(
            factory.handle().base_urls(),
            vec!["https://bridge.example.com:8443/".to_string()]
        );
        assert_eq!(factory.handle().sessions_opened(), 1);
    }

    #[tokio::test]
    async fn failed_session_open_is_a_connection_error() {
        let factory = MockClientFactory::new(vec![]).failing_open();
        let err = ValidationDispatcher::new(&factory)
            .dispatch(&test_config(), &files(&["A.PO"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Connection(_)));
        assert_eq!(factory.handle().session_ends(), 0);
    }

    #[tokio::test]
    async fn session_is_ended_when_validator_panics() {
        let factory = MockClientFactory::new(vec![Reply::Panic]);
        let config = test_config();
        let targets = files(&["A.PO"]);
        let dispatcher = ValidationDispatcher::new(&factory);

        let outcome = AssertUnwindSafe(dispatcher.dispatch(&config, &targets))
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        assert_eq!(factory.handle().session_ends(), 1);
    }

    #[tokio::test]
    async fn client_is_ended_when_validator_panics() {
        let factory = MockClientFactory::new(vec![Reply::Panic]);
        let config = per_call_config();
        let targets = files(&["A.PO"]);
        let dispatcher = ValidationDispatcher::new(&factory);

        let outcome = AssertUnwindSafe(dispatcher.dispatch(&config, &targets))
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        assert_eq!(factory.handle().client_ends(), 1);
    }

    #[test]
    fn base_url_defaults_to_https() {
        assert_eq!(
            base_url("symitar01", 42627).unwrap().as_str(),
            "https://symitar01:42627/"
        );
        assert_eq!(
            base_url("http://127.0.0.1", 8080).unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );
    }
}
