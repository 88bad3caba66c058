//! Version control capability consumed by the scanner and resolver.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use git2::Repository;
use globset::GlobBuilder;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

/// Operations the change-set logic needs from version control.
pub trait VersionControl: Send + Sync {
    /// Returns whether `reference` names an existing ref or revision.
    fn verify_ref<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Returns NUL-separated `git diff --name-status -z` output between
    /// `reference` and the working tree, limited to `scope`.
    fn diff_name_status<'a>(
        &'a self,
        reference: &'a str,
        scope: &'a Path,
    ) -> BoxFuture<'a, Result<String>>;

    /// Lists files below `dir` whose file name matches `pattern`.
    fn list_files<'a>(&'a self, dir: &'a Path, pattern: &'a str)
        -> BoxFuture<'a, Result<Vec<PathBuf>>>;
}

/// [`VersionControl`] backed by libgit2 and the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    /// Operates on the repository at the current directory.
    pub fn new() -> Self {
        Self::at(".")
    }

    /// Operates on the repository at `workdir`.
    pub fn at<P: AsRef<Path>>(workdir: P) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
        }
    }

    /// Returns the working directory commands run in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionControl for GitCli {
    fn verify_ref<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let repo = Repository::discover(&self.workdir).with_context(|| {
                format!("Not in a git repository: {}", self.workdir.display())
            })?;
            let exists = repo.revparse_single(reference).is_ok();
            debug!(reference, exists, "Verified git reference");
            Ok(exists)
        })
    }

    fn diff_name_status<'a>(
        &'a self,
        reference: &'a str,
        scope: &'a Path,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let output = Command::new("git")
                .arg("diff")
                .arg("--name-status")
                .arg("--no-renames")
                .arg("-z")
                .arg(reference)
                .arg("--")
                .arg(scope)
                .current_dir(&self.workdir)
                .output()
                .await
                .context("Failed to execute git diff")?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("git diff against {} failed: {}", reference, stderr.trim());
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn list_files<'a>(
        &'a self,
        dir: &'a Path,
        pattern: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move {
            let matcher = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .with_context(|| format!("Invalid file pattern: {pattern}"))?
                .compile_matcher();

            let root = self.workdir.join(dir);
            let rel_root = dir.to_path_buf();
            let files = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
                if !root.is_dir() {
                    anyhow::bail!("Directory not found: {}", root.display());
                }
                let mut files = Vec::new();
                for entry in WalkDir::new(&root).sort_by_file_name() {
                    let entry = entry
                        .with_context(|| format!("Failed to read directory: {}", root.display()))?;
                    if entry.file_type().is_dir() || !matcher.is_match(entry.file_name()) {
                        continue;
                    }
                    let rel = entry
                        .path()
                        .strip_prefix(&root)
                        .with_context(|| format!("Unexpected path: {}", entry.path().display()))?;
                    files.push(rel_root.join(rel));
                }
                Ok(files)
            })
            .await
            .context("Directory walk was interrupted")??;

            debug!(count = files.len(), dir = %dir.display(), "Listed files");
            Ok(files)
        })
    }
}
