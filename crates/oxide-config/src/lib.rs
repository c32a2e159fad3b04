//! Provider configuration
//!
//! Resolves the control-plane host and API token from, in increasing
//! precedence: the `OXIDE_HOST` / `OXIDE_TOKEN` environment variables,
//! the provider configuration block, and a named profile in
//! `credentials.toml`.

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const HOST_ENV: &str = "OXIDE_HOST";
pub const TOKEN_ENV: &str = "OXIDE_TOKEN";
pub const CONFIG_DIR_ENV: &str = "OXIDE_CONFIG_DIR";
pub const CREDENTIALS_FILE: &str = "credentials.toml";

/// Provider-level configuration as written by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

/// Resolved connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    profile: HashMap<String, ProfileEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileEntry {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ProviderConfig {
    /// Merge the environment with the configuration block. Non-empty
    /// configuration values win.
    pub fn with_env(&self) -> Self {
        let host = non_empty(self.host.clone()).or_else(|| non_empty(std::env::var(HOST_ENV).ok()));
        let token =
            non_empty(self.token.clone()).or_else(|| non_empty(std::env::var(TOKEN_ENV).ok()));
        Self {
            host,
            token,
            profile: non_empty(self.profile.clone()),
        }
    }

    /// Every missing setting, after merging the environment
    pub fn check(&self) -> Vec<ConfigError> {
        let merged = self.with_env();
        let mut errors = Vec::new();
        if merged.profile.is_none() {
            if merged.token.is_none() {
                errors.push(ConfigError::MissingToken);
            }
            if merged.host.is_none() {
                errors.push(ConfigError::MissingHost);
            }
        }
        errors
    }

    /// Resolve host and token. A profile takes precedence over host and token.
    pub fn resolve(&self) -> Result<Credentials> {
        let merged = self.with_env();

        tracing::debug!(
            "resolving provider configuration: host={}, token={}, profile={}",
            merged.host.as_deref().unwrap_or(""),
            if merged.token.is_some() { "***" } else { "" },
            merged.profile.as_deref().unwrap_or("")
        );

        if let Some(profile) = &merged.profile {
            return load_profile(&credentials_path()?, profile);
        }

        match (merged.host, merged.token) {
            (Some(host), Some(token)) => Ok(Credentials { host, token }),
            (_, None) => Err(ConfigError::MissingToken),
            (None, _) => Err(ConfigError::MissingHost),
        }
    }
}

/// Directory holding `credentials.toml`
///
/// `$OXIDE_CONFIG_DIR` if set, otherwise `<user config dir>/oxide`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = non_empty(std::env::var(CONFIG_DIR_ENV).ok()) {
        return Ok(PathBuf::from(dir));
    }
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("oxide"))
}

pub fn credentials_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CREDENTIALS_FILE))
}

/// Look up a `[profile.<name>]` table in a credentials file
pub fn load_profile(path: &Path, profile: &str) -> Result<Credentials> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .build()?;
    let file: CredentialsFile = settings.try_deserialize()?;

    // Keys are case-folded by the config crate
    let entry = file
        .profile
        .get(profile)
        .or_else(|| file.profile.get(&profile.to_lowercase()))
        .ok_or_else(|| ConfigError::UnknownProfile {
            profile: profile.to_string(),
            path: path.display().to_string(),
        })?;

    let missing = |field: &'static str| ConfigError::IncompleteProfile {
        profile: profile.to_string(),
        path: path.display().to_string(),
        field,
    };
    let host = non_empty(entry.host.clone()).ok_or_else(|| missing("host"))?;
    let token = non_empty(entry.token.clone()).ok_or_else(|| missing("token"))?;

    tracing::info!("using profile {} for host {}", profile, host);
    Ok(Credentials { host, token })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const CREDENTIALS: &str = r#"
[profile.staging]
host = "https://staging.oxide.example.com"
token = "oxide-token-staging"

[profile.broken]
host = "https://broken.oxide.example.com"
"#;

    fn write_credentials(dir: &Path) {
        fs::write(dir.join(CREDENTIALS_FILE), CREDENTIALS).unwrap();
    }

    #[test]
    #[serial]
    fn test_env_only() {
        temp_env::with_vars(
            [
                (HOST_ENV, Some("https://env.example.com")),
                (TOKEN_ENV, Some("env-token")),
            ],
            || {
                let creds = ProviderConfig::default().resolve().unwrap();
                assert_eq!(creds.host, "https://env.example.com");
                assert_eq!(creds.token, "env-token");
            },
        );
    }

    #[test]
    #[serial]
    fn test_config_overrides_env() {
        temp_env::with_vars(
            [
                (HOST_ENV, Some("https://env.example.com")),
                (TOKEN_ENV, Some("env-token")),
            ],
            || {
                let config = ProviderConfig {
                    host: Some("https://config.example.com".to_string()),
                    token: Some(String::new()),
                    profile: None,
                };
                let creds = config.resolve().unwrap();
                assert_eq!(creds.host, "https://config.example.com");
                // An empty value does not override the environment
                assert_eq!(creds.token, "env-token");
            },
        );
    }

    #[test]
    #[serial]
    fn test_missing_settings_accumulate() {
        temp_env::with_vars_unset([HOST_ENV, TOKEN_ENV], || {
            let errors = ProviderConfig::default().check();
            let summaries: Vec<_> = errors.iter().map(|e| e.summary()).collect();
            assert_eq!(
                summaries,
                vec!["Missing API Token Configuration", "Missing Host Configuration"]
            );

            let err = ProviderConfig::default().resolve().unwrap_err();
            assert!(matches!(err, ConfigError::MissingToken));
        });
    }

    #[test]
    #[serial]
    fn test_profile_skips_missing_checks() {
        temp_env::with_vars_unset([HOST_ENV, TOKEN_ENV], || {
            let config = ProviderConfig {
                profile: Some("staging".to_string()),
                ..Default::default()
            };
            assert!(config.check().is_empty());
        });
    }

    #[test]
    #[serial]
    fn test_profile_from_config_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_credentials(temp_dir.path());

        temp_env::with_vars(
            [
                (CONFIG_DIR_ENV, temp_dir.path().to_str()),
                (HOST_ENV, Some("https://env.example.com")),
            ],
            || {
                let config = ProviderConfig {
                    profile: Some("staging".to_string()),
                    ..Default::default()
                };
                let creds = config.resolve().unwrap();
                assert_eq!(creds.host, "https://staging.oxide.example.com");
                assert_eq!(creds.token, "oxide-token-staging");
            },
        );
    }

    #[test]
    fn test_unknown_profile() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_credentials(temp_dir.path());

        let err = load_profile(&temp_dir.path().join(CREDENTIALS_FILE), "prod").unwrap_err();
        assert_eq!(err.summary(), "Unknown Profile");
        assert!(err.to_string().contains("\"prod\""));
    }

    #[test]
    fn test_incomplete_profile() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_credentials(temp_dir.path());

        let err = load_profile(&temp_dir.path().join(CREDENTIALS_FILE), "broken").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IncompleteProfile { field: "token", .. }
        ));
    }

    #[test]
    #[serial]
    fn test_config_dir_env() {
        temp_env::with_var(CONFIG_DIR_ENV, Some("/tmp/oxide-test"), || {
            assert_eq!(
                credentials_path().unwrap(),
                PathBuf::from("/tmp/oxide-test/credentials.toml")
            );
        });
    }

    #[test]
    fn test_credentials_debug_masks_token() {
        let creds = Credentials {
            host: "https://h".to_string(),
            token: "secret".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }
}
