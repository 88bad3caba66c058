//! Per-file validation against the target host.

pub mod client;
pub mod dispatcher;
pub mod http;

use serde::{Deserialize, Serialize};

pub use client::{ClientFactory, PowerOnValidator, StatelessClient, ValidationSession};
pub use dispatcher::{validate_files, ValidationDispatcher};
pub use http::BridgeClientFactory;

/// Error payload of a validation call: one message or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessages {
    /// A single message.
    One(String),
    /// An ordered list of messages.
    Many(Vec<String>),
}

impl ErrorMessages {
    /// Returns the non-empty messages in order.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Self::One(message) => vec![message.as_str()],
            Self::Many(messages) => messages.iter().map(String::as_str).collect(),
        }
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
    }
}

/// Result of validating one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerOnOutcome {
    /// Whether the file compiled cleanly.
    pub is_valid: bool,
    /// Messages explaining a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorMessages>,
}

impl PowerOnOutcome {
    /// A passing outcome.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: None,
        }
    }

    /// A failing outcome with the given messages.
    pub fn invalid<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_valid: false,
            errors: Some(ErrorMessages::Many(
                errors.into_iter().map(Into::into).collect(),
            )),
        }
    }

    /// Failure text with multiple messages joined by newlines.
    pub fn error_text(&self) -> String {
        let lines = self
            .errors
            .as_ref()
            .map(ErrorMessages::lines)
            .unwrap_or_default();
        if lines.is_empty() {
            "validation failed".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Aggregated outcome of a gate run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Files attempted.
    pub files_validated: usize,
    /// Files that passed.
    pub files_passed: usize,
    /// Files that failed or whose validation raised an error.
    pub files_failed: usize,
    /// One entry per failing file, prefixed with its base name.
    pub errors: Vec<String>,
    /// Base names of attempted files, in validation order.
    pub validated_files: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no file failed.
    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }

    pub(crate) fn record_pass(&mut self, name: String) {
        self.validated_files.push(name);
        self.files_validated += 1;
        self.files_passed += 1;
    }

    pub(crate) fn record_failure(&mut self, name: String, message: &str) {
        self.errors.push(format!("{name}: {message}"));
        self.validated_files.push(name);
        self.files_validated += 1;
        self.files_failed += 1;
    }
}
