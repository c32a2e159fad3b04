//! API client error types

use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the control plane on any non-2xx response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Status: {status}, Error Code: {}, Message: {message}", error_code.as_deref().unwrap_or(""))]
    Http {
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unable to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Raised by the in-memory client for unknown objects
    #[error("Status: 404, Error Code: ObjectNotFound, Message: not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn http(status: u16, body: ErrorBody) -> Self {
        Self::Http {
            status,
            error_code: body.error_code,
            message: body.message,
        }
    }

    /// HTTP status of the failed request, if the request reached the server
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Whether the error means the remote object does not exist.
///
/// Subnet pool member removal answers 400 with a "does not exist" message
/// for a member that is already gone, so the message is checked as well.
pub fn is_not_found(err: &ApiError) -> bool {
    match err {
        ApiError::NotFound(_) => true,
        _ if err.status() == Some(404) => true,
        ApiError::Http {
            status: 400,
            message,
            ..
        } => message.contains("does not exist"),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, message: &str) -> ApiError {
        ApiError::Http {
            status,
            error_code: Some("InvalidRequest".to_string()),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found(&http(404, "not found: project with name \"x\"")));
        assert!(is_not_found(&ApiError::NotFound("disk".to_string())));
        assert!(is_not_found(&http(
            400,
            "subnet 10.0.0.0/24 does not exist in subnet pool"
        )));
        assert!(!is_not_found(&http(500, "internal error")));
        assert!(!is_not_found(&http(400, "already exists")));
        assert!(!is_not_found(&http(500, "subnet does not exist yet")));
        assert!(!is_not_found(&http(409, "silo link does not exist")));
    }

    #[test]
    fn test_display() {
        let err = http(500, "boom");
        assert_eq!(
            err.to_string(),
            "Status: 500, Error Code: InvalidRequest, Message: boom"
        );
    }
}
