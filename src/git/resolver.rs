//! Target branch disambiguation.
//!
//! CI checkouts materialize refs differently depending on fetch depth and
//! checkout mode: a branch may exist only as `origin/<name>`, only as a
//! local head, or under its full ref path. The resolver tries a fixed list
//! of spellings and keeps the first one the repository knows.

use tracing::{debug, info};

use crate::error::ConfigError;
use crate::git::backend::VersionControl;

const REMOTE_PREFIX: &str = "origin/";

/// Finds which spelling of a branch exists in the local clone.
pub struct BranchResolver<'a> {
    vcs: &'a dyn VersionControl,
}

impl<'a> BranchResolver<'a> {
    /// Creates a resolver over `vcs`.
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self { vcs }
    }

    /// Returns the first candidate spelling of `requested` that verifies.
    pub async fn resolve(&self, requested: &str) -> Result<String, ConfigError> {
        for candidate in candidates(requested) {
            match self.vcs.verify_ref(&candidate).await {
                Ok(true) => {
                    info!(requested, resolved = %candidate, "Resolved target branch");
                    return Ok(candidate);
                }
                Ok(false) => debug!(candidate = %candidate, "Branch candidate not found"),
                Err(e) => return Err(ConfigError::VersionControl(e)),
            }
        }

        Err(ConfigError::BranchNotFound {
            requested: requested.to_string(),
        })
    }
}

/// Ordered, de-duplicated spellings to try for `requested`.
pub fn candidates(requested: &str) -> Vec<String> {
    let requested = requested.trim();
    let bare = requested.strip_prefix(REMOTE_PREFIX).unwrap_or(requested);

    let ordered = [
        requested.to_string(),
        format!("{REMOTE_PREFIX}{bare}"),
        bare.to_string(),
        format!("refs/heads/{bare}"),
        format!("refs/remotes/{REMOTE_PREFIX}{bare}"),
    ];

    let mut unique: Vec<String> = Vec::with_capacity(ordered.len());
    for candidate in ordered {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}
