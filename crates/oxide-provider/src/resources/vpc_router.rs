//! `oxide_vpc_router`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{NameDescription, VpcRouter};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct VpcRouterResource {
    client: Client,
}

impl VpcRouterResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct VpcRouterModel {
    #[serde(flatten)]
    stamps: Stamps,
    vpc_id: String,
    name: String,
    description: String,
    kind: Option<String>,
}

impl From<&VpcRouter> for VpcRouterModel {
    fn from(router: &VpcRouter) -> Self {
        Self {
            stamps: Stamps::of(&router.identity),
            vpc_id: router.vpc_id.clone(),
            name: router.identity.name.clone(),
            description: router.identity.description.clone(),
            kind: Some(router.kind.clone()),
        }
    }
}

#[async_trait]
impl Resource for VpcRouterResource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_router"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages VPC routers.")
            .attribute(
                Attribute::required("vpc_id", AttributeType::String)
                    .description("ID of the VPC that will contain the VPC router.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the VPC router."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the VPC router."),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::id())
            .attribute(
                Attribute::computed("kind", AttributeType::String)
                    .description("Whether the VPC router is custom or system created.")
                    .use_state_for_unknown(),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: VpcRouterModel = decode(plan)?;
        let router = self
            .client
            .vpc_router_create(
                &plan.vpc_id,
                &NameDescription {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating VPC router", e))?;
        encode(&VpcRouterModel::from(&router))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: VpcRouterModel = decode(state)?;
        let Some(router) = found(
            self.client.vpc_router_view(state.stamps.id()?).await,
            "Unable to read VPC router:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&VpcRouterModel::from(&router))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: VpcRouterModel = decode(plan)?;
        let prior: VpcRouterModel = decode(prior)?;
        let router = self
            .client
            .vpc_router_update(
                prior.stamps.id()?,
                &NameDescription {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating VPC router", e))?;
        encode(&VpcRouterModel::from(&router))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: VpcRouterModel = decode(state)?;
        deleted(
            self.client.vpc_router_delete(state.stamps.id()?).await,
            "Unable to delete VPC router:",
        )
    }
}
