//! Resource lifecycle trait

use crate::error::{EngineError, Result};
use crate::schema::{ConfigValidator, Schema};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Outcome of a refresh
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The remote object exists; the projected State
    Found(Value),
    /// The remote object is gone; drop the instance from the state store
    Removed,
}

/// Outcome of a delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    /// Dropped from state without a remote call; surfaced as a warning
    Abandoned { summary: String, detail: String },
}

/// One managed entity.
///
/// Documents passed in have their null members stripped; documents
/// returned are shaped to the schema by the driver.
#[async_trait]
pub trait Resource: Send + Sync {
    /// User-visible type name, e.g. `oxide_project`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Declarative cross-attribute validators
    fn config_validators(&self) -> Vec<ConfigValidator> {
        Vec::new()
    }

    async fn create(&self, plan: Value) -> Result<Value>;

    async fn read(&self, state: Value) -> Result<ReadOutcome>;

    async fn update(&self, plan: Value, prior: Value) -> Result<Value>;

    async fn delete(&self, state: Value) -> Result<DeleteOutcome>;

    /// Minimal State for an import string; the host reads right after.
    async fn import(&self, id: &str) -> Result<Value> {
        Ok(json!({ "id": id }))
    }

    /// Rewrite a State recorded under an older schema version into the
    /// current shape. Resources that never changed shape have no upgraders.
    fn upgrade_state(&self, version: i64, _state: Value) -> Result<Value> {
        Err(EngineError::unsupported(
            "Unable to Upgrade Resource State",
            format!(
                "{} has no state upgrader for schema version {}",
                self.type_name(),
                version
            ),
        ))
    }
}

/// Decode a stripped document into a typed model.
pub fn decode<T: DeserializeOwned>(document: Value) -> Result<T> {
    serde_json::from_value(document).map_err(|e| {
        EngineError::internal("Unable to decode resource document", e)
    })
}

/// Encode a typed model into a document.
pub fn encode<T: Serialize>(model: &T) -> Result<Value> {
    Ok(serde_json::to_value(model)?)
}

/// Split a slash-joined composite import id into its two components.
pub fn split_import_id<'a>(id: &'a str, expected: &str) -> Result<(&'a str, &'a str)> {
    match id.split_once('/') {
        Some((a, b)) if !a.is_empty() && !b.is_empty() && !b.contains('/') => Ok((a, b)),
        _ => Err(EngineError::config(
            "Invalid Import ID",
            format!("Expected import identifier with format: {}. Got: {:?}", expected, id),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_import_id() {
        assert_eq!(
            split_import_id("P/S", "subnet_pool_id/silo_id").unwrap(),
            ("P", "S")
        );
        for bad in ["P", "P/", "/S", "a/b/c"] {
            let err = split_import_id(bad, "subnet_pool_id/silo_id").unwrap_err();
            assert!(err.is_config());
            assert_eq!(err.summary(), "Invalid Import ID");
        }
    }

    #[test]
    fn test_decode_error_is_internal() {
        #[derive(Debug, serde::Deserialize)]
        struct Model {
            #[allow(dead_code)]
            size: i64,
        }
        let err = decode::<Model>(json!({"size": "big"})).unwrap_err();
        assert!(matches!(err, EngineError::Internal { .. }));
    }
}
