//! GitHub Actions workflow commands and step outputs.
//!
//! Outside Actions, masking is skipped and errors are plain stderr lines.

use std::env;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::validation::ValidationResult;

/// Heredoc delimiter for multi-line output values.
const OUTPUT_DELIMITER: &str = "POWERON_GATE_EOF";

/// Returns true when running inside a GitHub Actions job.
pub fn is_github_actions() -> bool {
    env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
}

/// Asks the runner to redact `secret` from all later log output.
pub fn mask(secret: &str) {
    if !is_github_actions() {
        return;
    }
    for line in secret.lines().filter(|l| !l.trim().is_empty()) {
        println!("::add-mask::{line}");
    }
}

/// Reports a failure as an annotation when in Actions, or on stderr otherwise.
pub fn error(message: &str) {
    if is_github_actions() {
        println!("::error::{}", escape_data(message));
    } else {
        eprintln!("Error: {message}");
    }
}

/// Escapes workflow command data so multi-line messages stay one annotation.
pub fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Named step outputs for a finished run, in a stable order.
pub fn outputs(result: &ValidationResult) -> Vec<(&'static str, String)> {
    vec![
        ("files-validated", result.files_validated.to_string()),
        ("files-passed", result.files_passed.to_string()),
        ("files-failed", result.files_failed.to_string()),
        ("errors", result.errors.join("\n")),
        ("validated-files", result.validated_files.join(",")),
    ]
}

/// Renders outputs in the `$GITHUB_OUTPUT` file format.
///
/// Single-line values use `name=value`; anything containing a newline uses
/// the heredoc form.
pub fn render_outputs(outputs: &[(&str, String)]) -> String {
    let mut rendered = String::new();
    for (name, value) in outputs {
        if value.contains('\n') {
            let _ = writeln!(rendered, "{name}<<{OUTPUT_DELIMITER}");
            let _ = writeln!(rendered, "{value}");
            let _ = writeln!(rendered, "{OUTPUT_DELIMITER}");
        } else {
            let _ = writeln!(rendered, "{name}={value}");
        }
    }
    rendered
}

/// Appends the run's outputs to the file at `path`.
pub fn write_outputs(path: &Path, result: &ValidationResult) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open output file: {}", path.display()))?;
    file.write_all(render_outputs(&outputs(result)).as_bytes())
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}

/// Appends outputs to `$GITHUB_OUTPUT` when the runner provides one.
pub fn publish(result: &ValidationResult) -> Result<()> {
    match env::var_os("GITHUB_OUTPUT") {
        Some(path) if !path.is_empty() => write_outputs(Path::new(&path), result),
        _ => Ok(()),
    }
}

/// One-line run summary.
pub fn summary_line(log_prefix: &str, result: &ValidationResult) -> String {
    if result.files_validated == 0 {
        return format!("{log_prefix} No PowerOn files to validate");
    }
    format!(
        "{log_prefix} Validated {} file(s): {} passed, {} failed",
        result.files_validated, result.files_passed, result.files_failed
    )
}
