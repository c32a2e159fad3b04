//! Read-only lookups
//!
//! A data source resolves a Config document into a document of computed
//! attributes with remote reads only. It never plans and never writes.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::driver::{Outcome, check_timeouts};
use crate::error::Result;
use crate::schema::{ConfigValidator, Schema};
use crate::timeouts::{Phase, Timeouts, default_timeout, with_deadline};
use crate::validation::{Mode, validate_document};
use crate::value::{keep_empty_collections, normalize, strip_nulls};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One read-only lookup
#[async_trait]
pub trait DataSource: Send + Sync {
    /// User-visible type name, e.g. `oxide_vpc`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn config_validators(&self) -> Vec<ConfigValidator> {
        Vec::new()
    }

    /// Resolve the stripped Config into the full document
    async fn read(&self, config: Value) -> Result<Value>;
}

/// Host protocol binding for one data source type
#[derive(Clone)]
pub struct DataSourceDriver {
    source: Arc<dyn DataSource>,
    schema: Schema,
}

impl std::fmt::Debug for DataSourceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceDriver")
            .field("type_name", &self.source.type_name())
            .finish()
    }
}

impl DataSourceDriver {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        let schema = source.schema();
        Self { source, schema }
    }

    pub fn type_name(&self) -> &'static str {
        self.source.type_name()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate a Config document. Makes no remote calls.
    pub fn validate(&self, config: &Value) -> Diagnostics {
        let mut diags = validate_document(
            &self.schema,
            &self.source.config_validators(),
            config,
            Mode::Config,
        );
        check_timeouts(config, &mut diags);
        diags
    }

    /// Validate, then resolve within the `read` deadline.
    pub async fn read(&self, config: &Value) -> Outcome {
        let diags = self.validate(config);
        if diags.has_error() {
            return Outcome::failed(diags);
        }

        let run = async {
            let budget = Timeouts::from_document(config)?.budget(Phase::Read, default_timeout())?;
            with_deadline(Phase::Read, budget, self.source.read(strip_nulls(config))).await
        };
        match run.await {
            Ok(mut output) => {
                if let (Some(obj), Some(_)) = (output.as_object_mut(), self.schema.get("timeouts"))
                {
                    obj.insert(
                        "timeouts".to_string(),
                        config.get("timeouts").cloned().unwrap_or(Value::Null),
                    );
                }
                let state = keep_empty_collections(
                    &self.schema.attributes,
                    config,
                    normalize(&self.schema.attributes, &output),
                );
                tracing::trace!("read data source {}", self.type_name());
                Outcome::ok(state)
            }
            Err(e) => Outcome::failed(Diagnostic::from(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::schema::{Attribute, AttributeType};
    use serde_json::json;
    use std::time::Duration;

    struct Lookup {
        slow: bool,
    }

    #[async_trait]
    impl DataSource for Lookup {
        fn type_name(&self) -> &'static str {
            "oxide_lookup"
        }

        fn schema(&self) -> Schema {
            Schema::new("lookup")
                .attribute(Attribute::required("name", AttributeType::String))
                .attribute(Attribute::computed("id", AttributeType::String))
                .attribute(Attribute::computed(
                    "tags",
                    AttributeType::list_of(AttributeType::String),
                ))
                .attribute(Attribute::timeouts(&[Phase::Read]))
        }

        async fn read(&self, config: Value) -> Result<Value> {
            if self.slow {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            match config["name"].as_str() {
                Some("missing") => Err(EngineError::api(
                    "Unable to read lookup:",
                    "Status: 404, Message: not found",
                )),
                Some(name) => Ok(json!({"name": name, "id": format!("id-{}", name), "other": 1})),
                None => Ok(json!({})),
            }
        }
    }

    fn driver(slow: bool) -> DataSourceDriver {
        DataSourceDriver::new(Arc::new(Lookup { slow }))
    }

    #[tokio::test]
    async fn test_read_shapes_output() {
        let out = driver(false)
            .read(&json!({"name": "web", "timeouts": {"read": "1m"}}))
            .await;
        assert!(out.diagnostics.is_empty());
        let state = out.state.unwrap();
        assert_eq!(state["id"], "id-web");
        assert!(state["tags"].is_null());
        assert!(state.get("other").is_none());
        assert_eq!(state["timeouts"]["read"], "1m");
    }

    #[tokio::test]
    async fn test_read_validates_first() {
        let out = driver(false).read(&json!({"id": "set-by-hand"})).await;
        assert!(out.state.is_none());
        assert!(out.diagnostics.has_error());
    }

    #[tokio::test]
    async fn test_read_error_becomes_diagnostic() {
        let out = driver(false).read(&json!({"name": "missing"})).await;
        let diag = out.diagnostics.iter().next().unwrap();
        assert_eq!(diag.summary, "Unable to read lookup:");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out() {
        let out = driver(true)
            .read(&json!({"name": "web", "timeouts": {"read": "5s"}}))
            .await;
        let diag = out.diagnostics.iter().next().unwrap();
        assert!(diag.summary.contains("Timeout"));
    }
}
