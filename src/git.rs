//! Change-set resolution against the local repository clone.

pub mod backend;
pub mod resolver;
pub mod scanner;

pub use backend::{GitCli, VersionControl};
pub use resolver::BranchResolver;
pub use scanner::{ChangeSetScanner, ChangedFile, FileStatus, ScanPlan};

/// Glob matched against file names during a full scan.
pub const POWERON_FILE_PATTERN: &str = "*.PO";
