//! Per-phase timeout policy

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Budget applied to any phase whose `timeouts` entry is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Create,
    Read,
    Update,
    Delete,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Create, Phase::Read, Phase::Update, Phase::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Read => "read",
            Phase::Update => "update",
            Phase::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `timeouts` sub-record of a resource document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default)]
    pub create: Option<String>,
    #[serde(default)]
    pub read: Option<String>,
    #[serde(default)]
    pub update: Option<String>,
    #[serde(default)]
    pub delete: Option<String>,
}

impl Timeouts {
    /// Extract the record from a resource document. A missing or null
    /// record yields all-default budgets.
    pub fn from_document(document: &Value) -> Result<Self> {
        match document.get("timeouts") {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                EngineError::config("Invalid timeouts", format!("could not decode timeouts: {}", e))
            }),
        }
    }

    pub fn budget(&self, phase: Phase, default: Duration) -> Result<Duration> {
        let raw = match phase {
            Phase::Create => self.create.as_deref(),
            Phase::Read => self.read.as_deref(),
            Phase::Update => self.update.as_deref(),
            Phase::Delete => self.delete.as_deref(),
        };
        match raw {
            None | Some("") => Ok(default),
            Some(s) => parse_duration(s).map_err(|detail| {
                EngineError::config(format!("Invalid timeouts.{} value", phase), detail)
            }),
        }
    }

    pub fn create(&self, default: Duration) -> Result<Duration> {
        self.budget(Phase::Create, default)
    }

    pub fn read(&self, default: Duration) -> Result<Duration> {
        self.budget(Phase::Read, default)
    }

    pub fn update(&self, default: Duration) -> Result<Duration> {
        self.budget(Phase::Update, default)
    }

    pub fn delete(&self, default: Duration) -> Result<Duration> {
        self.budget(Phase::Delete, default)
    }
}

/// Parse a duration string such as "30s", "10m" or "2h45m". A bare "0"
/// is accepted as zero.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {:?}: {}", input, e))
}

/// Run `fut` inside a cancellable deadline scope. When the budget expires
/// the future is dropped, which cancels any in-flight remote call.
pub async fn with_deadline<T, F>(phase: Phase, budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} phase exceeded its {:?} budget", phase, budget);
            Err(EngineError::timeout(phase, budget))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(
            parse_duration("2h45m").unwrap(),
            Duration::from_secs(2 * 3600 + 45 * 60)
        );
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        assert!(parse_duration("99999999999999999999999h").is_err());

        let timeouts = Timeouts {
            create: Some("99999999999999999999999h".to_string()),
            ..Default::default()
        };
        let err = timeouts.create(default_timeout()).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.summary(), "Invalid timeouts.create value");
    }

    #[test]
    fn test_budget_defaults() {
        let timeouts = Timeouts::from_document(&json!({"name": "x"})).unwrap();
        assert_eq!(timeouts.create(default_timeout()).unwrap(), DEFAULT_TIMEOUT);

        let timeouts =
            Timeouts::from_document(&json!({"timeouts": {"read": "1m", "delete": null}})).unwrap();
        assert_eq!(
            timeouts.read(default_timeout()).unwrap(),
            Duration::from_secs(60)
        );
        assert_eq!(timeouts.delete(default_timeout()).unwrap(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_invalid_budget_is_config_error() {
        let timeouts = Timeouts {
            update: Some("soon".to_string()),
            ..Default::default()
        };
        let err = timeouts.update(default_timeout()).unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.summary(), "Invalid timeouts.update value");
    }

    #[tokio::test]
    async fn test_with_deadline_ok() {
        let out = with_deadline(Phase::Read, Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(out.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_expires() {
        let out: Result<()> = with_deadline(Phase::Create, Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        let err = out.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
        assert!(err.summary().contains("create"));
    }
}
