//! `oxide_project` and `oxide_projects`

use super::{ByName, identity, listed, listing_id, read_timeouts, resolved, with_identity};
use crate::resources::Client;
use async_trait::async_trait;
use oxide_engine::resource::decode;
use oxide_engine::{Attribute, AttributeType, DataSource, EngineError, Result, Schema};
use serde_json::{Value, json};

pub struct ProjectDataSource {
    client: Client,
}

impl ProjectDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for ProjectDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_project"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified project.")
                .attribute(
                    Attribute::required("name", AttributeType::String)
                        .description("Name of the project."),
                )
                .attribute(read_timeouts()),
            "project",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ByName = decode(config.clone())?;
        let project = self
            .client
            .project_view(&lookup.name)
            .await
            .map_err(|e| EngineError::api("Unable to read project:", e))?;
        tracing::trace!("read project with ID: {}", project.identity.id);
        Ok(resolved(config, identity(&project.identity)))
    }
}

pub struct ProjectsDataSource {
    client: Client,
}

impl ProjectsDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for ProjectsDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_projects"
    }

    fn schema(&self) -> Schema {
        Schema::new("Retrieve a list of all projects.")
            .attribute(
                Attribute::computed("id", AttributeType::String)
                    .description("The ID of this resource."),
            )
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed("projects", AttributeType::list_of(listed("project", vec![])))
                    .description("A list of all projects"),
            )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let projects = self
            .client
            .project_list()
            .await
            .map_err(|e| EngineError::api("Unable to read projects:", e))?;
        tracing::trace!("read all projects");
        let projects: Vec<Value> = projects.iter().map(|p| identity(&p.identity)).collect();
        Ok(resolved(
            config,
            json!({ "id": listing_id(), "projects": projects }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::{FakeClient, OxideApi, ProjectCreate};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_project_by_name() {
        let fake = Arc::new(FakeClient::new());
        let created = fake
            .project_create(&ProjectCreate {
                name: "web".to_string(),
                description: "frontend".to_string(),
            })
            .await
            .unwrap();

        let source = ProjectDataSource::new(fake.clone());
        let out = source.read(json!({"name": "web"})).await.unwrap();
        assert_eq!(out["id"], created.identity.id.as_str());
        assert_eq!(out["description"], "frontend");

        let err = source.read(json!({"name": "db"})).await.unwrap_err();
        assert_eq!(err.summary(), "Unable to read project:");
    }

    #[tokio::test]
    async fn test_projects_lists_every_project() {
        let fake = Arc::new(FakeClient::new());
        for name in ["a", "b"] {
            fake.project_create(&ProjectCreate {
                name: name.to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        }
        let out = ProjectsDataSource::new(fake)
            .read(json!({}))
            .await
            .unwrap();
        assert_eq!(out["projects"].as_array().unwrap().len(), 2);
        assert!(out["id"].is_string());
    }
}
