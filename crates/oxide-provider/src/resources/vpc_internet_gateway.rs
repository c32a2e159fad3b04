//! `oxide_vpc_internet_gateway`
//!
//! Internet gateways cannot be modified. `cascade_delete` is a query
//! parameter of the delete call, so it only lives in state.

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{InternetGateway, NameDescription};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub struct VpcInternetGatewayResource {
    client: Client,
}

impl VpcInternetGatewayResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct InternetGatewayModel {
    #[serde(flatten)]
    stamps: Stamps,
    vpc_id: String,
    name: String,
    description: String,
    cascade_delete: Option<bool>,
}

impl InternetGatewayModel {
    fn observe(gateway: &InternetGateway, cascade_delete: Option<bool>) -> Self {
        Self {
            stamps: Stamps::of(&gateway.identity),
            vpc_id: gateway.vpc_id.clone(),
            name: gateway.identity.name.clone(),
            description: gateway.identity.description.clone(),
            cascade_delete: Some(cascade_delete.unwrap_or(false)),
        }
    }
}

#[async_trait]
impl Resource for VpcInternetGatewayResource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_internet_gateway"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages VPC internet gateways.")
            .attribute(
                Attribute::required("vpc_id", AttributeType::String)
                    .description("ID of the VPC that will contain the internet gateway.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the VPC internet gateway.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the VPC internet gateway.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional_computed("cascade_delete", AttributeType::Bool)
                    .description(
                        "Whether to also delete routes targeting the VPC internet gateway when deleting it.",
                    )
                    .default_value(json!(false)),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::id())
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: InternetGatewayModel = decode(plan)?;
        let gateway = self
            .client
            .internet_gateway_create(
                &plan.vpc_id,
                &NameDescription {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating VPC internet gateway", e))?;
        encode(&InternetGatewayModel::observe(&gateway, plan.cascade_delete))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: InternetGatewayModel = decode(state)?;
        let Some(gateway) = found(
            self.client.internet_gateway_view(state.stamps.id()?).await,
            "Unable to read VPC internet gateway:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&InternetGatewayModel::observe(
            &gateway,
            state.cascade_delete,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: InternetGatewayModel = decode(plan)?;
        let prior: InternetGatewayModel = decode(prior)?;
        let gateway = self
            .client
            .internet_gateway_view(prior.stamps.id()?)
            .await
            .map_err(|e| EngineError::api("Unable to read VPC internet gateway:", e))?;
        encode(&InternetGatewayModel::observe(&gateway, plan.cascade_delete))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: InternetGatewayModel = decode(state)?;
        deleted(
            self.client
                .internet_gateway_delete(state.stamps.id()?, state.cascade_delete.unwrap_or(false))
                .await,
            "Unable to delete VPC internet gateway:",
        )
    }
}
