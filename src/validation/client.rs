//! Capabilities of the external validation client.
//!
//! The gate never speaks the host protocol itself. It drives whatever
//! [`ClientFactory`] it is given, in one of two shapes: a stateful
//! [`ValidationSession`] that hands out a worker, or a
//! [`StatelessClient`] that validates directly.

use std::path::Path;

use anyhow::Result;
use futures::future::BoxFuture;
use url::Url;

use super::PowerOnOutcome;
use crate::config::{TargetSystem, TransportSession};

/// Validates PowerOn files one at a time.
pub trait PowerOnValidator: Send + Sync {
    /// Validates the file at `path` (relative to the repository root).
    fn validate_power_on<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<PowerOnOutcome>>;
}

/// A stateful connection to the host.
pub trait ValidationSession: Send + Sync {
    /// Resolves once the session can accept work.
    fn ready(&self) -> BoxFuture<'_, Result<()>>;

    /// Creates a worker signed on to the target system.
    fn create_worker<'a>(
        &'a self,
        target: &'a TargetSystem,
    ) -> BoxFuture<'a, Result<Box<dyn PowerOnValidator + 'a>>>;

    /// Ends the session.
    fn end(&self) -> BoxFuture<'_, Result<()>>;
}

/// A client that validates each file with an independent call.
pub trait StatelessClient: PowerOnValidator {
    /// Releases the client.
    fn end(&self);
}

/// Builds validation clients for the dispatcher.
pub trait ClientFactory: Send + Sync {
    /// Opens a session through `endpoint` to `host` over the transport.
    fn open_session<'a>(
        &'a self,
        endpoint: &'a Url,
        host: &'a str,
        transport: &'a TransportSession,
    ) -> BoxFuture<'a, Result<Box<dyn ValidationSession>>>;

    /// Builds a stateless client for `base_url`.
    fn stateless_client(
        &self,
        base_url: &Url,
        target: &TargetSystem,
    ) -> Result<Box<dyn StatelessClient>>;
}
