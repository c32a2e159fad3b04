//! `oxide_subnet_pool_member`
//!
//! Members have no view endpoint; Read lists the pool's members and
//! matches on the member id.

use super::Client;
use async_trait::async_trait;
use oxide_api::{SubnetPoolMember, SubnetPoolMemberAdd, SubnetPoolMemberRemove, is_not_found};
use oxide_engine::resource::{decode, encode, split_import_id};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, rfc3339,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub struct SubnetPoolMemberResource {
    client: Client,
}

impl SubnetPoolMemberResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SubnetPoolMemberModel {
    id: Option<String>,
    subnet_pool_id: String,
    subnet: String,
    min_prefix_length: Option<i64>,
    max_prefix_length: Option<i64>,
    time_created: Option<String>,
}

impl From<&SubnetPoolMember> for SubnetPoolMemberModel {
    fn from(member: &SubnetPoolMember) -> Self {
        Self {
            id: Some(member.id.clone()),
            subnet_pool_id: member.subnet_pool_id.clone(),
            subnet: member.subnet.clone(),
            min_prefix_length: Some(member.min_prefix_length),
            max_prefix_length: Some(member.max_prefix_length),
            time_created: Some(rfc3339(&member.time_created)),
        }
    }
}

#[async_trait]
impl Resource for SubnetPoolMemberResource {
    fn type_name(&self) -> &'static str {
        "oxide_subnet_pool_member"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages a member (subnet) within a subnet pool.")
            .attribute(
                Attribute::required("subnet_pool_id", AttributeType::String)
                    .description("ID of the subnet pool this member belongs to.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("subnet", AttributeType::Cidr)
                    .description("The subnet CIDR to add to the pool (e.g., '10.0.0.0/16').")
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional_computed("min_prefix_length", AttributeType::Int64)
                    .description(
                        "Minimum prefix length for allocations from this subnet. Defaults to the subnet's prefix length.",
                    )
                    .requires_replace_if_configured()
                    .use_state_for_unknown(),
            )
            .attribute(
                Attribute::optional_computed("max_prefix_length", AttributeType::Int64)
                    .description(
                        "Maximum prefix length for allocations from this subnet. Defaults to 32 for IPv4 and 128 for IPv6.",
                    )
                    .requires_replace_if_configured()
                    .use_state_for_unknown(),
            )
            .attribute(Attribute::timeouts(&[Phase::Create, Phase::Read, Phase::Delete]))
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the subnet pool member.",
            ))
            .attribute(
                Attribute::computed("time_created", AttributeType::Timestamp)
                    .description("Timestamp of when this subnet pool member was created."),
            )
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SubnetPoolMemberModel = decode(plan)?;
        let member = self
            .client
            .subnet_pool_member_add(
                &plan.subnet_pool_id,
                &SubnetPoolMemberAdd {
                    subnet: plan.subnet,
                    min_prefix_length: plan.min_prefix_length,
                    max_prefix_length: plan.max_prefix_length,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating subnet pool member", e))?;
        encode(&SubnetPoolMemberModel::from(&member))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SubnetPoolMemberModel = decode(state)?;
        let members = match self.client.subnet_pool_member_list(&state.subnet_pool_id).await {
            Ok(members) => members,
            Err(e) if is_not_found(&e) => return Ok(ReadOutcome::Removed),
            Err(e) => return Err(EngineError::api("Unable to read subnet pool members:", e)),
        };
        match members.iter().find(|m| Some(&m.id) == state.id.as_ref()) {
            Some(member) => Ok(ReadOutcome::Found(encode(&SubnetPoolMemberModel::from(
                member,
            ))?)),
            None => Ok(ReadOutcome::Removed),
        }
    }

    async fn update(&self, _plan: Value, _prior: Value) -> Result<Value> {
        Err(EngineError::unsupported(
            "Unexpected Update",
            "This resource does not support in-place updates. All changes require replacement.",
        ))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SubnetPoolMemberModel = decode(state)?;
        // A member that is already gone is reported as a 400 "does not
        // exist", which the classifier treats as not-found.
        match self
            .client
            .subnet_pool_member_remove(
                &state.subnet_pool_id,
                &SubnetPoolMemberRemove {
                    subnet: state.subnet.clone(),
                },
            )
            .await
        {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_not_found(&e) => Ok(DeleteOutcome::Deleted),
            Err(e) => Err(EngineError::api("Error deleting subnet pool member:", e)),
        }
    }

    async fn import(&self, id: &str) -> Result<Value> {
        let (pool, member) = split_import_id(id, "subnet_pool_id/member_id")?;
        Ok(json!({ "subnet_pool_id": pool, "id": member }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::FakeClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_import_splits_pool_and_member() {
        let resource = SubnetPoolMemberResource::new(Arc::new(FakeClient::new()));
        let state = resource.import("pool-1/member-1").await.unwrap();
        assert_eq!(state, json!({"subnet_pool_id": "pool-1", "id": "member-1"}));
        assert!(resource.import("pool-1").await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_update_is_rejected() {
        let resource = SubnetPoolMemberResource::new(Arc::new(FakeClient::new()));
        let err = resource.update(json!({}), json!({})).await.unwrap_err();
        assert_eq!(err.summary(), "Unexpected Update");
    }
}
