use oxide_api::FakeClient;
use oxide_engine::{Diagnostics, PlannedAction, PlannedChange, ResourceDriver};
use oxide_provider::OxideProvider;
use serde_json::{Value, json};
use std::sync::Arc;

/// A configured provider backed by the in-memory control plane
pub struct TestRack {
    pub api: Arc<FakeClient>,
    pub provider: OxideProvider,
}

impl TestRack {
    pub fn new() -> Self {
        let api = Arc::new(FakeClient::new());
        let provider = OxideProvider::with_client(api.clone());
        Self { api, provider }
    }

    pub async fn driver(&self, type_name: &str) -> ResourceDriver {
        self.provider
            .configured_driver(type_name, "test")
            .await
            .unwrap()
    }

    pub async fn plan(
        &self,
        type_name: &str,
        config: &Value,
        prior: Option<&Value>,
    ) -> PlannedChange {
        let outcome = self.driver(type_name).await.plan(Some(config), prior);
        assert!(
            !outcome.diagnostics.has_error(),
            "plan failed: {}",
            outcome.diagnostics
        );
        outcome.change.unwrap()
    }

    /// Plan and create, the way the host applies a new resource
    pub async fn create(&self, type_name: &str, config: Value) -> Value {
        let change = self.plan(type_name, &config, None).await;
        assert_eq!(change.action, PlannedAction::Create);
        let outcome = self.driver(type_name).await.create(&change.planned_state).await;
        assert!(
            outcome.diagnostics.is_empty(),
            "create failed: {}",
            outcome.diagnostics
        );
        outcome.state.unwrap()
    }

    /// Plan and update in place
    #[allow(dead_code)]
    pub async fn update(&self, type_name: &str, prior: &Value, config: Value) -> Value {
        let change = self.plan(type_name, &config, Some(prior)).await;
        assert_eq!(change.action, PlannedAction::Update);
        let outcome = self
            .driver(type_name)
            .await
            .update(&change.planned_state, prior)
            .await;
        assert!(
            outcome.diagnostics.is_empty(),
            "update failed: {}",
            outcome.diagnostics
        );
        outcome.state.unwrap()
    }

    /// Refreshed state, or None when the object is gone
    #[allow(dead_code)]
    pub async fn read(&self, type_name: &str, state: &Value) -> Option<Value> {
        let outcome = self.driver(type_name).await.read(state).await;
        assert!(
            outcome.diagnostics.is_empty(),
            "read failed: {}",
            outcome.diagnostics
        );
        outcome.state
    }

    #[allow(dead_code)]
    pub async fn delete(&self, type_name: &str, state: &Value) -> Diagnostics {
        self.driver(type_name).await.delete(state).await
    }

    #[allow(dead_code)]
    pub async fn project(&self, name: &str) -> Value {
        self.create(
            "oxide_project",
            json!({"name": name, "description": "a test project"}),
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn instance(&self, project_id: &Value, name: &str) -> Value {
        self.create(
            "oxide_instance",
            json!({
                "project_id": project_id,
                "name": name,
                "description": "a test instance",
                "memory": 1073741824,
                "ncpus": 1,
                "start_on_create": false
            }),
        )
        .await
    }
}
