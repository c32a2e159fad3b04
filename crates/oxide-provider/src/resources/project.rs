//! `oxide_project`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{Project, ProjectCreate, ProjectUpdate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the VPC and subnet the control plane creates with every project
const DEFAULT_NETWORK: &str = "default";

pub struct ProjectResource {
    client: Client,
}

impl ProjectResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ProjectModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
}

impl From<&Project> for ProjectModel {
    fn from(project: &Project) -> Self {
        Self {
            stamps: Stamps::of(&project.identity),
            name: project.identity.name.clone(),
            description: project.identity.description.clone(),
        }
    }
}

#[async_trait]
impl Resource for ProjectResource {
    fn type_name(&self) -> &'static str {
        "oxide_project"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource manages projects.\n\nDeleting a project also deletes the default VPC and subnet created with it.",
        )
        .attribute(Attribute::required("name", AttributeType::String).description("Name of the project."))
        .attribute(
            Attribute::required("description", AttributeType::String)
                .description("Description for the project."),
        )
        .attribute(Attribute::timeouts(&Phase::ALL))
        .attribute(
            Attribute::id().description("Unique, immutable, system-controlled identifier of the project."),
        )
        .attribute(Attribute::time_created())
        .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: ProjectModel = decode(plan)?;
        let project = self
            .client
            .project_create(&ProjectCreate {
                name: plan.name,
                description: plan.description,
            })
            .await
            .map_err(|e| EngineError::api("Error creating project", e))?;
        encode(&ProjectModel::from(&project))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: ProjectModel = decode(state)?;
        let Some(project) = found(
            self.client.project_view(state.stamps.id()?).await,
            "Unable to read project:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&ProjectModel::from(&project))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: ProjectModel = decode(plan)?;
        let prior: ProjectModel = decode(prior)?;
        let project = self
            .client
            .project_update(
                prior.stamps.id()?,
                &ProjectUpdate {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating project", e))?;
        encode(&ProjectModel::from(&project))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: ProjectModel = decode(state)?;
        let id = state.stamps.id()?;

        // The system-created network has to go before the project can
        deleted(
            self.client
                .vpc_subnet_delete(DEFAULT_NETWORK, Some(DEFAULT_NETWORK), Some(id))
                .await,
            "Error deleting default subnet:",
        )?;
        tracing::trace!("deleted default subnet from project with ID: {}", id);

        deleted(
            self.client.vpc_delete(DEFAULT_NETWORK, Some(id)).await,
            "Error deleting default VPC:",
        )?;
        tracing::trace!("deleted default VPC from project with ID: {}", id);

        deleted(
            self.client.project_delete(id).await,
            "Error deleting project:",
        )
    }
}
