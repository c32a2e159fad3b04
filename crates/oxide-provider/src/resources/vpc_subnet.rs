//! `oxide_vpc_subnet`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{VpcSubnet, VpcSubnetCreate, VpcSubnetUpdate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct VpcSubnetResource {
    client: Client,
}

impl VpcSubnetResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct VpcSubnetModel {
    #[serde(flatten)]
    stamps: Stamps,
    vpc_id: String,
    name: String,
    description: String,
    ipv4_block: String,
    ipv6_block: Option<String>,
}

impl From<&VpcSubnet> for VpcSubnetModel {
    fn from(subnet: &VpcSubnet) -> Self {
        Self {
            stamps: Stamps::of(&subnet.identity),
            vpc_id: subnet.vpc_id.clone(),
            name: subnet.identity.name.clone(),
            description: subnet.identity.description.clone(),
            ipv4_block: subnet.ipv4_block.clone(),
            ipv6_block: Some(subnet.ipv6_block.clone()),
        }
    }
}

#[async_trait]
impl Resource for VpcSubnetResource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_subnet"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages VPC subnets.")
            .attribute(
                Attribute::required("vpc_id", AttributeType::String)
                    .description("ID of the VPC that will contain the subnet.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the VPC subnet."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the VPC subnet."),
            )
            .attribute(
                Attribute::required("ipv4_block", AttributeType::Cidr)
                    .description(
                        "IPv4 address range for this VPC subnet. It must be allocated from an RFC 1918 private address range, and must not overlap with any other existing subnet in the VPC.",
                    )
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional_computed("ipv6_block", AttributeType::Cidr)
                    .description(
                        "IPv6 address range for this VPC subnet. It must be allocated from the RFC 4193 Unique Local Address range, with the prefix equal to the parent VPC's prefix.",
                    )
                    .requires_replace_if_configured()
                    .use_state_for_unknown(),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::id())
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: VpcSubnetModel = decode(plan)?;
        let subnet = self
            .client
            .vpc_subnet_create(
                &plan.vpc_id,
                &VpcSubnetCreate {
                    name: plan.name,
                    description: plan.description,
                    ipv4_block: plan.ipv4_block,
                    ipv6_block: plan.ipv6_block,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating VPC subnet", e))?;
        encode(&VpcSubnetModel::from(&subnet))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: VpcSubnetModel = decode(state)?;
        Ok(
            match found(
                self.client.vpc_subnet_view(state.stamps.id()?).await,
                "Unable to read VPC subnet:",
            )? {
                Some(subnet) => ReadOutcome::Found(encode(&VpcSubnetModel::from(&subnet))?),
                None => ReadOutcome::Removed,
            },
        )
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: VpcSubnetModel = decode(plan)?;
        let prior: VpcSubnetModel = decode(prior)?;
        let subnet = self
            .client
            .vpc_subnet_update(
                prior.stamps.id()?,
                &VpcSubnetUpdate {
                    name: plan.name,
                    description: plan.description,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating VPC subnet", e))?;
        encode(&VpcSubnetModel::from(&subnet))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: VpcSubnetModel = decode(state)?;
        deleted(
            self.client
                .vpc_subnet_delete(state.stamps.id()?, None, None)
                .await,
            "Unable to delete VPC subnet:",
        )
    }
}
