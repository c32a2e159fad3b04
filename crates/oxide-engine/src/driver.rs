//! Lifecycle driver
//!
//! Binds a [`Resource`] to the host protocol callbacks. The driver owns the
//! behaviour every resource shares:
//!
//! - config validation before any remote call
//! - the per-phase deadline read from `timeouts`
//! - null stripping on the way in, schema-shaped normalisation on the way out
//! - conversion of errors into diagnostics
//! - trace events for every successful phase

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{EngineError, Result};
use crate::plan::{PlannedChange, plan_resource_change};
use crate::resource::{DeleteOutcome, ReadOutcome, Resource};
use crate::schema::Schema;
use crate::timeouts::{Phase, Timeouts, default_timeout, with_deadline};
use crate::validation::{Mode, validate_document};
use crate::value::{keep_empty_collections, normalize, strip_nulls};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of a lifecycle callback.
///
/// `state` is None when the instance must be dropped from the state store
/// (refresh found it gone, delete succeeded) or when the callback failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    pub state: Option<Value>,
    pub diagnostics: Diagnostics,
}

impl Outcome {
    pub(crate) fn ok(state: Value) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }

    pub(crate) fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }
}

/// Result of planning
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanOutcome {
    pub change: Option<PlannedChange>,
    pub diagnostics: Diagnostics,
}

/// Report an unparseable `timeouts` sub-record
pub(crate) fn check_timeouts(config: &Value, diags: &mut Diagnostics) {
    if let Err(e) = Timeouts::from_document(config).and_then(|t| {
        Phase::ALL
            .iter()
            .try_for_each(|p| t.budget(*p, default_timeout()).map(|_| ()))
    }) {
        diags.push(e.into());
    }
}

/// Host protocol binding for one resource type
#[derive(Clone)]
pub struct ResourceDriver {
    resource: Arc<dyn Resource>,
    schema: Schema,
}

impl std::fmt::Debug for ResourceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDriver")
            .field("type_name", &self.resource.type_name())
            .finish()
    }
}

impl ResourceDriver {
    pub fn new(resource: Arc<dyn Resource>) -> Self {
        let schema = resource.schema();
        Self { resource, schema }
    }

    pub fn type_name(&self) -> &'static str {
        self.resource.type_name()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate a Config document. Makes no remote calls.
    pub fn validate(&self, config: &Value) -> Diagnostics {
        let mut diags = validate_document(
            &self.schema,
            &self.resource.config_validators(),
            config,
            Mode::Config,
        );
        check_timeouts(config, &mut diags);
        for attr in &self.schema.attributes {
            if let Some(message) = &attr.deprecation_message
                && config.get(&attr.name).is_some_and(|v| !v.is_null())
            {
                diags.push(
                    Diagnostic::warning("Deprecated attribute", message.clone()).at(&attr.name),
                );
            }
        }
        diags
    }

    /// Derive the Plan from Config and prior State.
    pub fn plan(&self, config: Option<&Value>, prior: Option<&Value>) -> PlanOutcome {
        if let Some(config) = config {
            let diags = self.validate(config);
            if diags.has_error() {
                return PlanOutcome {
                    change: None,
                    diagnostics: diags,
                };
            }
        }
        let change = plan_resource_change(&self.schema, config, prior);
        tracing::debug!("planned {} for {}", change.summary(), self.type_name());
        PlanOutcome {
            change: Some(change),
            diagnostics: Diagnostics::new(),
        }
    }

    fn budget(&self, phase: Phase, document: &Value) -> Result<std::time::Duration> {
        Timeouts::from_document(document)?.budget(phase, default_timeout())
    }

    /// Shape resource output to the schema, carrying `timeouts` and empty
    /// collections over from the input document.
    fn finish(&self, mut output: Value, input: &Value) -> Value {
        if let (Some(obj), Some(_)) = (output.as_object_mut(), self.schema.get("timeouts")) {
            obj.insert(
                "timeouts".to_string(),
                input.get("timeouts").cloned().unwrap_or(Value::Null),
            );
        }
        keep_empty_collections(
            &self.schema.attributes,
            input,
            normalize(&self.schema.attributes, &output),
        )
    }

    fn id_of(state: &Value) -> &str {
        state.get("id").and_then(Value::as_str).unwrap_or("")
    }

    pub async fn create(&self, plan: &Value) -> Outcome {
        let diags = validate_document(
            &self.schema,
            &self.resource.config_validators(),
            plan,
            Mode::Plan,
        );
        if diags.has_error() {
            return Outcome::failed(diags);
        }

        let run = async {
            let budget = self.budget(Phase::Create, plan)?;
            with_deadline(Phase::Create, budget, self.resource.create(strip_nulls(plan))).await
        };
        match run.await {
            Ok(output) => {
                let state = self.finish(output, plan);
                tracing::trace!("created {} with ID: {}", self.type_name(), Self::id_of(&state));
                Outcome::ok(state)
            }
            Err(e) => Outcome::failed(Diagnostic::from(e).into()),
        }
    }

    pub async fn read(&self, state: &Value) -> Outcome {
        let run = async {
            let budget = self.budget(Phase::Read, state)?;
            with_deadline(Phase::Read, budget, self.resource.read(strip_nulls(state))).await
        };
        match run.await {
            Ok(ReadOutcome::Found(output)) => {
                let next = self.finish(output, state);
                tracing::trace!("read {} with ID: {}", self.type_name(), Self::id_of(&next));
                Outcome::ok(next)
            }
            Ok(ReadOutcome::Removed) => {
                tracing::info!(
                    "{} with ID {} no longer exists; removing from state",
                    self.type_name(),
                    Self::id_of(state)
                );
                Outcome::default()
            }
            Err(e) => Outcome::failed(Diagnostic::from(e).into()),
        }
    }

    pub async fn update(&self, plan: &Value, prior: &Value) -> Outcome {
        let run = async {
            let budget = self.budget(Phase::Update, plan)?;
            with_deadline(
                Phase::Update,
                budget,
                self.resource.update(strip_nulls(plan), strip_nulls(prior)),
            )
            .await
        };
        match run.await {
            Ok(output) => {
                let state = self.finish(output, plan);
                tracing::trace!("updated {} with ID: {}", self.type_name(), Self::id_of(&state));
                Outcome::ok(state)
            }
            Err(e) => Outcome::failed(Diagnostic::from(e).into()),
        }
    }

    pub async fn delete(&self, state: &Value) -> Diagnostics {
        let run = async {
            let budget = self.budget(Phase::Delete, state)?;
            with_deadline(Phase::Delete, budget, self.resource.delete(strip_nulls(state))).await
        };
        match run.await {
            Ok(DeleteOutcome::Deleted) => {
                tracing::trace!("deleted {} with ID: {}", self.type_name(), Self::id_of(state));
                Diagnostics::new()
            }
            Ok(DeleteOutcome::Abandoned { summary, detail }) => {
                tracing::warn!("{}: {}", summary, detail);
                Diagnostic::warning(summary, detail).into()
            }
            Err(e) => Diagnostic::from(e).into(),
        }
    }

    /// Bring a State recorded under schema `version` up to the current
    /// schema. A current State passes through unchanged.
    pub fn upgrade(&self, version: i64, state: &Value) -> Outcome {
        let current = self.schema.version;
        let upgraded = if version == current {
            Ok(state.clone())
        } else if version > current {
            Err(EngineError::unsupported(
                "Unable to Upgrade Resource State",
                format!(
                    "state of {} was written by schema version {}, newer than {}",
                    self.type_name(),
                    version,
                    current
                ),
            ))
        } else {
            self.resource.upgrade_state(version, state.clone())
        };
        match upgraded {
            Ok(output) => {
                tracing::debug!(
                    "upgraded {} state from version {} to {}",
                    self.type_name(),
                    version,
                    current
                );
                Outcome::ok(normalize(&self.schema.attributes, &output))
            }
            Err(e) => Outcome::failed(Diagnostic::from(e).into()),
        }
    }

    pub async fn import(&self, id: &str) -> Outcome {
        match self.resource.import(id).await {
            Ok(output) => {
                tracing::trace!("imported {} with ID: {}", self.type_name(), id);
                Outcome::ok(normalize(&self.schema.attributes, &output))
            }
            Err(e) => Outcome::failed(Diagnostic::from(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeType, ConfigValidator};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Widget {
        remote: Mutex<Option<Value>>,
        slow: bool,
    }

    #[async_trait]
    impl Resource for Widget {
        fn type_name(&self) -> &'static str {
            "oxide_widget"
        }

        fn schema(&self) -> Schema {
            Schema::new("widget")
                .attribute(Attribute::id())
                .attribute(Attribute::required("name", AttributeType::String))
                .attribute(Attribute::optional("size", AttributeType::Int64))
                .attribute(Attribute::optional("colour", AttributeType::String))
                .attribute(Attribute::optional("secret", AttributeType::String).write_only())
                .attribute(Attribute::timeouts(&Phase::ALL))
        }

        fn config_validators(&self) -> Vec<ConfigValidator> {
            vec![ConfigValidator::Conflicting(vec![
                "size".to_string(),
                "colour".to_string(),
            ])]
        }

        async fn create(&self, plan: Value) -> crate::Result<Value> {
            if self.slow {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let mut obj = plan.clone();
            obj["id"] = json!("w-1");
            obj["server_only"] = json!(true);
            *self.remote.lock().unwrap() = Some(obj.clone());
            Ok(obj)
        }

        async fn read(&self, _state: Value) -> crate::Result<ReadOutcome> {
            Ok(match self.remote.lock().unwrap().clone() {
                Some(v) => ReadOutcome::Found(v),
                None => ReadOutcome::Removed,
            })
        }

        async fn update(&self, plan: Value, _prior: Value) -> crate::Result<Value> {
            Ok(plan)
        }

        async fn delete(&self, _state: Value) -> crate::Result<DeleteOutcome> {
            if self.remote.lock().unwrap().take().is_none() {
                return Err(EngineError::api("Error deleting widget", "Status: 500"));
            }
            Ok(DeleteOutcome::Deleted)
        }
    }

    fn driver(widget: Widget) -> ResourceDriver {
        ResourceDriver::new(Arc::new(widget))
    }

    #[tokio::test]
    async fn test_create_normalizes_output() {
        let d = driver(Widget::default());
        let plan = json!({"name": "w", "secret": "hunter2", "timeouts": {"create": "1m"}});
        let out = d.create(&plan).await;
        assert!(out.diagnostics.is_empty());
        let state = out.state.unwrap();
        assert_eq!(state["id"], "w-1");
        assert!(state["secret"].is_null());
        assert!(state.get("server_only").is_none());
        assert_eq!(state["timeouts"]["create"], "1m");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_plan() {
        let d = driver(Widget::default());
        let out = d.create(&json!({"name": "w", "size": 1, "colour": "red"})).await;
        assert!(out.diagnostics.has_error());
        assert!(out.state.is_none());
    }

    #[tokio::test]
    async fn test_read_removed() {
        let d = driver(Widget::default());
        let out = d.read(&json!({"id": "w-1"})).await;
        assert!(out.state.is_none());
        assert!(out.diagnostics.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_times_out() {
        let d = driver(Widget {
            slow: true,
            ..Default::default()
        });
        let out = d
            .create(&json!({"name": "w", "timeouts": {"create": "30s"}}))
            .await;
        let diag = out.diagnostics.iter().next().unwrap();
        assert!(diag.summary.contains("Timeout"));
    }

    #[tokio::test]
    async fn test_delete_error_becomes_diagnostic() {
        let d = driver(Widget::default());
        let diags = d.delete(&json!({"id": "w-1"})).await;
        assert!(diags.has_error());
        assert_eq!(
            diags.iter().next().unwrap().detail,
            "API error: Status: 500"
        );
    }

    #[test]
    fn test_validate_bad_timeout() {
        let d = driver(Widget::default());
        let diags = d.validate(&json!({"name": "w", "timeouts": {"read": "soon"}}));
        assert!(diags.has_error());

        let diags = d.validate(&json!({
            "name": "w",
            "timeouts": {"create": "99999999999999999999999h"}
        }));
        assert!(diags.has_error());
    }

    #[test]
    fn test_plan_validates_first() {
        let d = driver(Widget::default());
        let out = d.plan(Some(&json!({})), None);
        assert!(out.change.is_none());
        assert!(out.diagnostics.has_error());
    }

    #[test]
    fn test_upgrade_current_version_passes_through() {
        let d = driver(Widget::default());
        let out = d.upgrade(0, &json!({"id": "w-1", "name": "w", "extra": 1}));
        assert!(out.diagnostics.is_empty());
        let state = out.state.unwrap();
        assert_eq!(state["name"], "w");
        assert!(state.get("extra").is_none());
        assert!(state["size"].is_null());
    }

    #[test]
    fn test_upgrade_without_upgrader_fails() {
        let d = driver(Widget::default());
        let out = d.upgrade(3, &json!({"id": "w-1"}));
        assert!(out.state.is_none());
        assert_eq!(
            out.diagnostics.iter().next().unwrap().summary,
            "Unable to Upgrade Resource State"
        );
    }

    #[tokio::test]
    async fn test_import_default() {
        let d = driver(Widget::default());
        let out = d.import("w-9").await;
        let state = out.state.unwrap();
        assert_eq!(state["id"], "w-9");
        assert!(state["name"].is_null());
    }
}
