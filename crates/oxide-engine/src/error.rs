//! Engine error types

use crate::diagnostics::Diagnostic;
use crate::timeouts::Phase;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

const SUPPORT_HINT: &str =
    "This is always a bug in the provider and should be reported to the provider developers.";

/// Errors surfaced by a lifecycle operation.
///
/// Every variant carries the two-part surface shown to users: a short
/// summary naming the resource and operation, and a detail string.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{summary}: {detail}")]
    Config { summary: String, detail: String },

    #[error("{summary}: {detail}")]
    Api { summary: String, detail: String },

    #[error("{summary}: {detail}")]
    Timeout { summary: String, detail: String },

    #[error("{summary}: {detail}")]
    Unsupported { summary: String, detail: String },

    #[error("{summary}: {detail}")]
    Internal { summary: String, detail: String },

    #[error("Invalid document: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Config {
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a remote error with a resource-specific prefix.
    pub fn api(summary: impl Into<String>, err: impl Display) -> Self {
        Self::Api {
            summary: summary.into(),
            detail: format!("API error: {}", err),
        }
    }

    pub fn timeout(phase: Phase, budget: Duration) -> Self {
        Self::Timeout {
            summary: format!("Timeout while waiting for {} to complete", phase),
            detail: format!(
                "the {} deadline of {:?} expired; re-run with a larger timeouts.{} budget",
                phase, budget, phase
            ),
        }
    }

    pub fn unsupported(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unsupported {
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// An invariant the provider relies on did not hold, e.g. an
    /// unexpected variant in a nested object.
    pub fn internal(summary: impl Into<String>, detail: impl Display) -> Self {
        Self::Internal {
            summary: summary.into(),
            detail: format!("{}\n{}", detail, SUPPORT_HINT),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Self::Config { summary, .. }
            | Self::Api { summary, .. }
            | Self::Timeout { summary, .. }
            | Self::Unsupported { summary, .. }
            | Self::Internal { summary, .. } => summary,
            Self::Json(_) => "Invalid document",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Config { detail, .. }
            | Self::Api { detail, .. }
            | Self::Timeout { detail, .. }
            | Self::Unsupported { detail, .. }
            | Self::Internal { detail, .. } => detail.clone(),
            Self::Json(e) => e.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<EngineError> for Diagnostic {
    fn from(err: EngineError) -> Self {
        Diagnostic::error(err.summary(), err.detail())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_prefix() {
        let err = EngineError::api("Error creating project", "Status: 500");
        assert_eq!(err.summary(), "Error creating project");
        assert_eq!(err.detail(), "API error: Status: 500");
        assert_eq!(
            err.to_string(),
            "Error creating project: API error: Status: 500"
        );
    }

    #[test]
    fn test_internal_error_asks_for_report() {
        let err = EngineError::internal("Unexpected digest type", "got md5");
        assert!(err.detail().starts_with("got md5"));
        assert!(err.detail().contains("reported to the provider developers"));
    }

    #[test]
    fn test_into_diagnostic() {
        let diag: Diagnostic = EngineError::config("Invalid Import ID", "bad").into();
        assert!(diag.is_error());
        assert_eq!(diag.summary, "Invalid Import ID");
        assert_eq!(diag.detail, "bad");
    }
}
