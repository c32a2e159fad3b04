//! `oxide_ssh_key`
//!
//! Keys belong to the user the client authenticates as.

use super::{Client, Stamps, deleted, found, keep_prior};
use async_trait::async_trait;
use oxide_api::{SshKey, SshKeyCreate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct SshKeyResource {
    client: Client,
}

impl SshKeyResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SshKeyModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
    public_key: String,
    silo_user_id: Option<String>,
}

impl From<&SshKey> for SshKeyModel {
    fn from(key: &SshKey) -> Self {
        Self {
            stamps: Stamps::of(&key.identity),
            name: key.identity.name.clone(),
            description: key.identity.description.clone(),
            public_key: key.public_key.clone(),
            silo_user_id: Some(key.silo_user_id.clone()),
        }
    }
}

#[async_trait]
impl Resource for SshKeyResource {
    fn type_name(&self) -> &'static str {
        "oxide_ssh_key"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages SSH keys.")
            .attribute(
                Attribute::id()
                    .description("Unique, immutable, system-controlled identifier of the SSH key."),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the SSH key.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the SSH key.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("public_key", AttributeType::String)
                    .description("Public SSH key.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::computed("silo_user_id", AttributeType::String)
                    .description("User ID that owns this SSH key."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
            .attribute(Attribute::timeouts(&Phase::ALL))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SshKeyModel = decode(plan)?;
        let key = self
            .client
            .current_user_ssh_key_create(&SshKeyCreate {
                name: plan.name,
                description: plan.description,
                public_key: plan.public_key,
            })
            .await
            .map_err(|e| EngineError::api("Error creating SSH key", e))?;
        tracing::trace!("created SSH key with ID: {}", key.identity.id);
        encode(&SshKeyModel::from(&key))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SshKeyModel = decode(state)?;
        let Some(key) = found(
            self.client
                .current_user_ssh_key_view(state.stamps.id()?)
                .await,
            "Unable to read SSH key:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&SshKeyModel::from(&key))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        keep_prior("SSH key", &plan, prior)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SshKeyModel = decode(state)?;
        deleted(
            self.client
                .current_user_ssh_key_delete(state.stamps.id()?)
                .await,
            "Error deleting SSH key:",
        )
    }
}
