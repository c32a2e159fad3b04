//! `oxide_vpc`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{Vpc, VpcCreate, VpcUpdate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct VpcResource {
    client: Client,
}

impl VpcResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct VpcModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    dns_name: String,
    ipv6_prefix: Option<String>,
    system_router_id: Option<String>,
}

impl From<&Vpc> for VpcModel {
    fn from(vpc: &Vpc) -> Self {
        Self {
            stamps: Stamps::of(&vpc.identity),
            project_id: vpc.project_id.clone(),
            name: vpc.identity.name.clone(),
            description: vpc.identity.description.clone(),
            dns_name: vpc.dns_name.clone(),
            ipv6_prefix: Some(vpc.ipv6_prefix.clone()),
            system_router_id: Some(vpc.system_router_id.clone()),
        }
    }
}

#[async_trait]
impl Resource for VpcResource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages VPCs.")
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .description("ID of the project that will contain the VPC.")
                    .requires_replace(),
            )
            .attribute(Attribute::required("name", AttributeType::String).description("Name of the VPC."))
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the VPC."),
            )
            .attribute(
                Attribute::required("dns_name", AttributeType::String)
                    .description("DNS name of the VPC."),
            )
            .attribute(
                Attribute::optional_computed("ipv6_prefix", AttributeType::Cidr)
                    .description(
                        "All IPv6 subnets created from this VPC must be taken from this range. If unset, a unique random prefix is generated.",
                    )
                    .requires_replace_if_configured(),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::id().description("Unique, immutable, system-controlled identifier of the VPC."))
            .attribute(
                Attribute::computed("system_router_id", AttributeType::String)
                    .description("Unique, immutable, system-controlled identifier of the system router.")
                    .use_state_for_unknown(),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: VpcModel = decode(plan)?;
        let vpc = self
            .client
            .vpc_create(
                &plan.project_id,
                &VpcCreate {
                    name: plan.name,
                    description: plan.description,
                    dns_name: plan.dns_name,
                    ipv6_prefix: plan.ipv6_prefix,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating VPC", e))?;
        encode(&VpcModel::from(&vpc))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: VpcModel = decode(state)?;
        let Some(vpc) = found(
            self.client.vpc_view(state.stamps.id()?, None).await,
            "Unable to read VPC:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&VpcModel::from(&vpc))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: VpcModel = decode(plan)?;
        let prior: VpcModel = decode(prior)?;
        let vpc = self
            .client
            .vpc_update(
                prior.stamps.id()?,
                &VpcUpdate {
                    name: plan.name,
                    description: plan.description,
                    dns_name: plan.dns_name,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating VPC", e))?;
        encode(&VpcModel::from(&vpc))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: VpcModel = decode(state)?;
        deleted(
            self.client.vpc_delete(state.stamps.id()?, None).await,
            "Unable to delete VPC:",
        )
    }
}
