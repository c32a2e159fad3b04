//! Provider error types

use oxide_engine::{Diagnostic, Diagnostics};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Resource type {0:?} is not supported by this provider")]
    UnknownResource(String),

    #[error("Data source type {0:?} is not supported by this provider")]
    UnknownDataSource(String),

    #[error("Function {0:?} is not provided by this provider")]
    UnknownFunction(String),

    #[error("The provider must be configured before {0} can run")]
    NotConfigured(String),

    #[error("Method {0:?} is not part of the provider protocol")]
    UnknownMethod(String),

    #[error("Missing {0} in request")]
    MissingField(&'static str),

    #[error("Invalid argument {index}: {message}")]
    InvalidArgument { index: usize, message: String },

    #[error(transparent)]
    Config(#[from] oxide_config::ConfigError),

    #[error("Unable to create Oxide client: {0}")]
    Client(#[from] oxide_api::ApiError),

    #[error("Invalid request: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn summary(&self) -> &'static str {
        match self {
            Self::UnknownResource(_) => "Unknown resource type",
            Self::UnknownDataSource(_) => "Unknown data source type",
            Self::UnknownFunction(_) => "Unknown function",
            Self::NotConfigured(_) => "Unconfigured provider",
            Self::UnknownMethod(_) | Self::MissingField(_) | Self::Json(_) => "Invalid request",
            Self::InvalidArgument { .. } => "Invalid function argument",
            Self::Config(e) => e.summary(),
            Self::Client(_) => "An error occurred while initializing the client for the Oxide API",
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::error(err.summary(), err.to_string())
    }
}

impl From<ProviderError> for Diagnostics {
    fn from(err: ProviderError) -> Self {
        Diagnostic::from(err).into()
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
