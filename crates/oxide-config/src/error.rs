use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "While configuring the provider, the API token was not found in \
        the OXIDE_TOKEN environment variable or \
        configuration block token attribute, or profile."
    )]
    MissingToken,

    #[error(
        "While configuring the provider, the host was not found in \
        the OXIDE_HOST environment variable or \
        configuration block host attribute, or profile."
    )]
    MissingHost,

    #[error("Profile {profile:?} was not found in {path}")]
    UnknownProfile { profile: String, path: String },

    #[error("Profile {profile:?} in {path} has no {field} value")]
    IncompleteProfile {
        profile: String,
        path: String,
        field: &'static str,
    },

    #[error("Unable to locate the user configuration directory")]
    ConfigDirNotFound,

    #[error("Unable to read credentials file: {0}")]
    Read(#[from] config::ConfigError),
}

impl ConfigError {
    /// Short summary shown alongside the detail
    pub fn summary(&self) -> &'static str {
        match self {
            Self::MissingToken => "Missing API Token Configuration",
            Self::MissingHost => "Missing Host Configuration",
            Self::UnknownProfile { .. } | Self::IncompleteProfile { .. } => "Unknown Profile",
            Self::ConfigDirNotFound | Self::Read(_) => {
                "An error occurred while initializing the client for the Oxide API"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
