//! Change-set resolution.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::ValidationConfig;
use crate::error::ConfigError;
use crate::git::backend::VersionControl;
use crate::git::resolver::BranchResolver;
use crate::git::POWERON_FILE_PATTERN;

/// How a file entered the change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Added relative to the target branch.
    Added,
    /// Modified relative to the target branch.
    Modified,
    /// Found by a full scan.
    Existing,
    /// Any other diff status code, passed through unchanged.
    Other(String),
}

impl FileStatus {
    /// Maps a `--name-status` code to a status.
    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => Self::Added,
            "M" => Self::Modified,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the label used in logs and reports.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Existing => "existing",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FileStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A file selected for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// How the file entered the change set.
    pub status: FileStatus,
}

impl ChangedFile {
    /// Creates a changed file entry.
    pub fn new(path: impl Into<PathBuf>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }

    /// Returns the file's base name.
    pub fn base_name(&self) -> String {
        base_name(&self.path)
    }
}

/// Returns the final component of `path`, or the whole path if it has none.
pub fn base_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Scan mode decided before any license or validation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPlan {
    /// Enumerate every PowerOn file in the directory.
    FullScan,
    /// Diff the directory against an already-resolved ref.
    Diff {
        /// Ref that verified in the local clone.
        resolved_ref: String,
    },
}

/// Produces the ordered list of files to validate.
pub struct ChangeSetScanner<'a> {
    vcs: &'a dyn VersionControl,
}

impl<'a> ChangeSetScanner<'a> {
    /// Creates a scanner over `vcs`.
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self { vcs }
    }

    /// Chooses the scan mode, resolving the target branch if one is set.
    pub async fn plan(&self, config: &ValidationConfig) -> Result<ScanPlan, ConfigError> {
        match config.target_branch.as_deref() {
            None => Ok(ScanPlan::FullScan),
            Some(branch) => {
                let resolved_ref = BranchResolver::new(self.vcs).resolve(branch).await?;
                Ok(ScanPlan::Diff { resolved_ref })
            }
        }
    }

    /// Plans and scans in one step.
    pub async fn scan(&self, config: &ValidationConfig) -> Result<Vec<ChangedFile>, ConfigError> {
        let plan = self.plan(config).await?;
        self.scan_with(config, &plan).await
    }

    /// Computes the change set for an existing plan.
    pub async fn scan_with(
        &self,
        config: &ValidationConfig,
        plan: &ScanPlan,
    ) -> Result<Vec<ChangedFile>, ConfigError> {
        let files = match plan {
            ScanPlan::FullScan => {
                let paths = self
                    .vcs
                    .list_files(&config.directory, POWERON_FILE_PATTERN)
                    .await
                    .map_err(ConfigError::VersionControl)?;
                paths
                    .into_iter()
                    .map(|path| ChangedFile::new(path, FileStatus::Existing))
                    .filter(|file| !config.is_ignored(&file.base_name()))
                    .collect::<Vec<_>>()
            }
            ScanPlan::Diff { resolved_ref } => {
                let output = self
                    .vcs
                    .diff_name_status(resolved_ref, &config.directory)
                    .await
                    .map_err(ConfigError::VersionControl)?;
                parse_name_status(&output, |name| config.is_ignored(name))
            }
        };

        info!(
            count = files.len(),
            mode = match plan {
                ScanPlan::FullScan => "full-scan",
                ScanPlan::Diff { .. } => "diff",
            },
            "Resolved change set"
        );
        Ok(files)
    }
}

/// Parses `git diff --name-status -z` output into changed files.
///
/// Records are NUL-separated `status\0path\0` pairs, so paths arrive
/// unquoted whatever characters they contain. Rename and copy records carry
/// a source and a destination; the destination is kept. A status with no
/// path ends parsing. Deletions and files whose base name `is_ignored`
/// accepts are skipped. Output order follows the input.
pub fn parse_name_status(output: &str, is_ignored: impl Fn(&str) -> bool) -> Vec<ChangedFile> {
    let mut files = Vec::new();
    let mut fields = output.split('\0');
    while let Some(code) = fields.next() {
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        let mut path = fields.next();
        if code.starts_with('R') || code.starts_with('C') {
            path = fields.next();
        }
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            debug!(code, "Diff record without a path");
            break;
        };
        if code == "D" {
            continue;
        }
        let file = ChangedFile::new(path, FileStatus::from_code(code));
        if is_ignored(&file.base_name()) {
            debug!(path, "Skipping ignored file");
            continue;
        }
        files.push(file);
    }
    files
}
