//! `oxide_subnet_pool`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{IpVersion, NameDescription, SubnetPool, SubnetPoolCreate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct SubnetPoolResource {
    client: Client,
}

impl SubnetPoolResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SubnetPoolModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
    ip_version: String,
}

impl From<&SubnetPool> for SubnetPoolModel {
    fn from(pool: &SubnetPool) -> Self {
        Self {
            stamps: Stamps::of(&pool.identity),
            name: pool.identity.name.clone(),
            description: pool.identity.description.clone(),
            ip_version: pool.ip_version.as_str().to_string(),
        }
    }
}

#[async_trait]
impl Resource for SubnetPoolResource {
    fn type_name(&self) -> &'static str {
        "oxide_subnet_pool"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource manages subnet pools. Use `oxide_subnet_pool_member` to add members to the pool.",
        )
        .attribute(
            Attribute::required("name", AttributeType::String)
                .description("Name of the subnet pool."),
        )
        .attribute(
            Attribute::required("description", AttributeType::String)
                .description("Description for the subnet pool."),
        )
        .attribute(
            Attribute::required("ip_version", AttributeType::String)
                .description(
                    "The IP version for this pool. All subnets in the pool must match this version.",
                )
                .validator(Validator::one_of(["v4", "v6"]))
                .requires_replace(),
        )
        .attribute(Attribute::timeouts(&Phase::ALL))
        .attribute(
            Attribute::id()
                .description("Unique, immutable, system-controlled identifier of the subnet pool."),
        )
        .attribute(Attribute::time_created())
        .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SubnetPoolModel = decode(plan)?;
        let ip_version = IpVersion::parse(&plan.ip_version).ok_or_else(|| {
            EngineError::config(
                "Error creating subnet pool",
                format!("unsupported IP version {:?}", plan.ip_version),
            )
        })?;
        let pool = self
            .client
            .subnet_pool_create(&SubnetPoolCreate {
                name: plan.name,
                description: plan.description,
                ip_version,
            })
            .await
            .map_err(|e| EngineError::api("Error creating subnet pool", e))?;
        encode(&SubnetPoolModel::from(&pool))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SubnetPoolModel = decode(state)?;
        let Some(pool) = found(
            self.client.subnet_pool_view(state.stamps.id()?).await,
            "Unable to read subnet pool:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&SubnetPoolModel::from(&pool))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: SubnetPoolModel = decode(plan)?;
        let prior: SubnetPoolModel = decode(prior)?;
        let pool = self
            .client
            .subnet_pool_update(
                prior.stamps.id()?,
                &NameDescription {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating subnet pool", e))?;
        encode(&SubnetPoolModel::from(&pool))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SubnetPoolModel = decode(state)?;
        deleted(
            self.client.subnet_pool_delete(state.stamps.id()?).await,
            "Error deleting subnet pool:",
        )
    }
}
