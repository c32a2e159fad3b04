//! `oxide_anti_affinity_group`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{AntiAffinityGroup, AntiAffinityGroupCreate, NameDescription};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sleds are the only failure domain the control plane offers
const FAILURE_DOMAIN: &str = "sled";

pub struct AntiAffinityGroupResource {
    client: Client,
}

impl AntiAffinityGroupResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AntiAffinityGroupModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    policy: String,
    failure_domain: Option<String>,
}

impl From<&AntiAffinityGroup> for AntiAffinityGroupModel {
    fn from(group: &AntiAffinityGroup) -> Self {
        Self {
            stamps: Stamps::of(&group.identity),
            project_id: group.project_id.clone(),
            name: group.identity.name.clone(),
            description: group.identity.description.clone(),
            policy: group.policy.clone(),
            failure_domain: Some(group.failure_domain.clone()),
        }
    }
}

#[async_trait]
impl Resource for AntiAffinityGroupResource {
    fn type_name(&self) -> &'static str {
        "oxide_anti_affinity_group"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages anti-affinity groups.")
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .description("ID of the project that will contain the anti-affinity group.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the anti-affinity group."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the anti-affinity group."),
            )
            .attribute(
                Attribute::required("policy", AttributeType::String)
                    .description(
                        "Affinity policy used to describe what to do when a request cannot be satisfied.",
                    )
                    .validator(Validator::one_of(["allow", "fail"]))
                    .requires_replace(),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the anti-affinity group.",
            ))
            .attribute(
                Attribute::computed("failure_domain", AttributeType::String)
                    .description("Describes the scope of affinity for the purposes of co-location."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: AntiAffinityGroupModel = decode(plan)?;
        let group = self
            .client
            .anti_affinity_group_create(
                &plan.project_id,
                &AntiAffinityGroupCreate {
                    name: plan.name,
                    description: plan.description,
                    policy: plan.policy,
                    failure_domain: FAILURE_DOMAIN.to_string(),
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating AntiAffinityGroup", e))?;
        tracing::trace!("created anti-affinity group with ID: {}", group.identity.id);
        encode(&AntiAffinityGroupModel::from(&group))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: AntiAffinityGroupModel = decode(state)?;
        let Some(group) = found(
            self.client.anti_affinity_group_view(state.stamps.id()?).await,
            "Unable to read anti-affinity group:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&AntiAffinityGroupModel::from(
            &group,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: AntiAffinityGroupModel = decode(plan)?;
        let prior: AntiAffinityGroupModel = decode(prior)?;
        let group = self
            .client
            .anti_affinity_group_update(
                prior.stamps.id()?,
                &NameDescription {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating anti-affinity group", e))?;
        encode(&AntiAffinityGroupModel::from(&group))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: AntiAffinityGroupModel = decode(state)?;
        deleted(
            self.client
                .anti_affinity_group_delete(state.stamps.id()?)
                .await,
            "Error deleting AntiAffinityGroup:",
        )
    }
}
