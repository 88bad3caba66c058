//! Shared test doubles for version control and validation clients.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures::future::BoxFuture;
use url::Url;

use crate::config::{
    ConnectionStrategy, TargetSystem, TransportSession, ValidationConfig,
};
use crate::git::VersionControl;
use crate::validation::{
    ClientFactory, PowerOnOutcome, PowerOnValidator, StatelessClient, ValidationSession,
};

/// Baseline configuration: persistent session through a bridge on 8443,
/// transport port 22, full scan of `DIR`.
pub(crate) fn test_config() -> ValidationConfig {
    ValidationConfig {
        host: "symitar01".to_string(),
        target: TargetSystem {
            sym_number: 627,
            user_number: "1995".to_string(),
            password: "hunter2".to_string(),
        },
        transport: TransportSession {
            username: "ssh-user".to_string(),
            password: "ssh-pass".to_string(),
            port: 22,
        },
        api_key: "license-key-123".to_string(),
        strategy: ConnectionStrategy::PersistentSession {
            bridge_url: Url::parse("https://bridge.example.com:8443/").unwrap(),
        },
        directory: PathBuf::from("DIR"),
        target_branch: None,
        ignored: BTreeSet::new(),
        log_prefix: "[test]".to_string(),
        debug: false,
    }
}

/// In-memory [`VersionControl`] that records what it was asked.
#[derive(Default)]
pub(crate) struct FakeVcs {
    refs: Vec<String>,
    files: Vec<PathBuf>,
    diff: String,
    verified: Mutex<Vec<String>>,
    diffed: Mutex<Vec<String>>,
    listed: AtomicUsize,
}

impl FakeVcs {
    /// Refs that verify successfully.
    pub(crate) fn with_refs(mut self, refs: &[&str]) -> Self {
        self.refs = refs.iter().map(ToString::to_string).collect();
        self
    }

    /// Files returned by a full scan.
    pub(crate) fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(PathBuf::from).collect();
        self
    }

    /// Raw `--name-status -z` output returned by a diff.
    pub(crate) fn with_diff(mut self, diff: &str) -> Self {
        self.diff = diff.to_string();
        self
    }

    /// Refs checked so far, in order.
    pub(crate) fn verified(&self) -> Vec<String> {
        self.verified.lock().unwrap().clone()
    }

    /// Refs diffed against so far.
    pub(crate) fn diffed(&self) -> Vec<String> {
        self.diffed.lock().unwrap().clone()
    }

    /// Number of full scans performed.
    pub(crate) fn listed(&self) -> usize {
        self.listed.load(Ordering::SeqCst)
    }
}

impl VersionControl for FakeVcs {
    fn verify_ref<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.verified.lock().unwrap().push(reference.to_string());
            Ok(self.refs.iter().any(|r| r == reference))
        })
    }

    fn diff_name_status<'a>(
        &'a self,
        reference: &'a str,
        _scope: &'a Path,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.diffed.lock().unwrap().push(reference.to_string());
            Ok(self.diff.clone())
        })
    }

    fn list_files<'a>(
        &'a self,
        _dir: &'a Path,
        _pattern: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move {
            self.listed.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.clone())
        })
    }
}

/// Scripted reply for one validation call.
pub(crate) enum Reply {
    /// Return this outcome.
    Outcome(PowerOnOutcome),
    /// Fail the call with this message.
    Error(String),
    /// Panic inside the call.
    Panic,
}

#[derive(Default)]
struct Shared {
    replies: Mutex<VecDeque<Reply>>,
    validated: Mutex<Vec<String>>,
    base_urls: Mutex<Vec<String>>,
    sessions_opened: AtomicUsize,
    session_ends: AtomicUsize,
    clients_created: AtomicUsize,
    client_ends: AtomicUsize,
}

/// [`ClientFactory`] whose validators replay scripted replies in FIFO order.
pub(crate) struct MockClientFactory {
    shared: Arc<Shared>,
    fail_open: bool,
    fail_ready: bool,
}

impl MockClientFactory {
    /// Creates a factory that will hand out `replies` in order.
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        let shared = Shared {
            replies: Mutex::new(VecDeque::from(replies)),
            ..Shared::default()
        };
        Self {
            shared: Arc::new(shared),
            fail_open: false,
            fail_ready: false,
        }
    }

    /// Makes opening a session fail.
    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes the session's readiness wait fail.
    pub(crate) fn failing_ready(mut self) -> Self {
        self.fail_ready = true;
        self
    }

    /// Returns a handle for inspecting calls after the run.
    pub(crate) fn handle(&self) -> MockHandle {
        MockHandle {
            shared: self.shared.clone(),
        }
    }
}

/// Read-only view over a [`MockClientFactory`]'s recorded calls.
pub(crate) struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    pub(crate) fn validated_paths(&self) -> Vec<String> {
        self.shared.validated.lock().unwrap().clone()
    }

    pub(crate) fn base_urls(&self) -> Vec<String> {
        self.shared.base_urls.lock().unwrap().clone()
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }

    pub(crate) fn session_ends(&self) -> usize {
        self.shared.session_ends.load(Ordering::SeqCst)
    }

    pub(crate) fn clients_created(&self) -> usize {
        self.shared.clients_created.load(Ordering::SeqCst)
    }

    pub(crate) fn client_ends(&self) -> usize {
        self.shared.client_ends.load(Ordering::SeqCst)
    }
}

struct MockValidator {
    shared: Arc<Shared>,
}

impl PowerOnValidator for MockValidator {
    fn validate_power_on<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<PowerOnOutcome>> {
        Box::pin(async move {
            self.shared
                .validated
                .lock()
                .unwrap()
                .push(path.display().to_string());
            // Take the reply before matching so no lock is held if we panic.
            let reply = self.shared.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Outcome(outcome)) => Ok(outcome),
                Some(Reply::Error(message)) => Err(anyhow::anyhow!(message)),
                Some(Reply::Panic) => panic!("mock validator panicked"),
                None => Err(anyhow::anyhow!("no more mock replies")),
            }
        })
    }
}

impl StatelessClient for MockValidator {
    fn end(&self) {
        self.shared.client_ends.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockSession {
    shared: Arc<Shared>,
    fail_ready: bool,
}

impl ValidationSession for MockSession {
    fn ready(&self) -> BoxFuture<'_, Result<()>> {
        let fail = self.fail_ready;
        Box::pin(async move {
            if fail {
                anyhow::bail!("session never became ready");
            }
            Ok(())
        })
    }

    fn create_worker<'a>(
        &'a self,
        _target: &'a TargetSystem,
    ) -> BoxFuture<'a, Result<Box<dyn PowerOnValidator + 'a>>> {
        Box::pin(async move {
            Ok(Box::new(MockValidator {
                shared: self.shared.clone(),
            }) as Box<dyn PowerOnValidator + 'a>)
        })
    }

    fn end(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shared.session_ends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

impl ClientFactory for MockClientFactory {
    fn open_session<'a>(
        &'a self,
        endpoint: &'a Url,
        _host: &'a str,
        _transport: &'a TransportSession,
    ) -> BoxFuture<'a, Result<Box<dyn ValidationSession>>> {
        Box::pin(async move {
            if self.fail_open {
                anyhow::bail!("connection refused");
            }
            self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst);
            self.shared
                .base_urls
                .lock()
                .unwrap()
                .push(endpoint.to_string());
            Ok(Box::new(MockSession {
                shared: self.shared.clone(),
                fail_ready: self.fail_ready,
            }) as Box<dyn ValidationSession>)
        })
    }

    fn stateless_client(
        &self,
        base_url: &Url,
        _target: &TargetSystem,
    ) -> Result<Box<dyn StatelessClient>> {
        self.shared.clients_created.fetch_add(1, Ordering::SeqCst);
        self.shared
            .base_urls
            .lock()
            .unwrap()
            .push(base_url.to_string());
        Ok(Box::new(MockValidator {
            shared: self.shared.clone(),
        }))
    }
}
