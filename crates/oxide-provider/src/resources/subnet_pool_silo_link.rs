//! `oxide_subnet_pool_silo_link`
//!
//! The link has no remote identifier. Its id is `subnet_pool_id/silo_id`,
//! which is also the import format.

use super::Client;
use async_trait::async_trait;
use oxide_api::{IsDefault, SubnetPoolLinkSilo, SubnetPoolSiloLink, is_not_found};
use oxide_engine::resource::{decode, encode, split_import_id};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub struct SubnetPoolSiloLinkResource {
    client: Client,
}

impl SubnetPoolSiloLinkResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SubnetPoolSiloLinkModel {
    id: Option<String>,
    subnet_pool_id: String,
    silo_id: String,
    is_default: bool,
}

fn link_id(pool: &str, silo: &str) -> String {
    format!("{}/{}", pool, silo)
}

impl From<&SubnetPoolSiloLink> for SubnetPoolSiloLinkModel {
    fn from(link: &SubnetPoolSiloLink) -> Self {
        Self {
            id: Some(link_id(&link.subnet_pool_id, &link.silo_id)),
            subnet_pool_id: link.subnet_pool_id.clone(),
            silo_id: link.silo_id.clone(),
            is_default: link.is_default,
        }
    }
}

#[async_trait]
impl Resource for SubnetPoolSiloLinkResource {
    fn type_name(&self) -> &'static str {
        "oxide_subnet_pool_silo_link"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages subnet pool to silo links.")
            .attribute(
                Attribute::required("silo_id", AttributeType::String)
                    .description("ID of the silo to link the subnet pool to.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("subnet_pool_id", AttributeType::String)
                    .description("ID of the subnet pool that will be linked to the silo.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("is_default", AttributeType::Bool).description(
                    "Whether this is the default subnet pool for the silo. When true, external subnet allocations that don't specify a pool use this one.",
                ),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(
                Attribute::id()
                    .description("Identifier for this resource, formatted as `subnet_pool_id/silo_id`."),
            )
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SubnetPoolSiloLinkModel = decode(plan)?;
        let link = self
            .client
            .subnet_pool_silo_link(
                &plan.subnet_pool_id,
                &SubnetPoolLinkSilo {
                    silo: plan.silo_id,
                    is_default: plan.is_default,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating subnet pool silo link", e))?;
        encode(&SubnetPoolSiloLinkModel::from(&link))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SubnetPoolSiloLinkModel = decode(state)?;
        let pools = match self.client.silo_subnet_pool_list(&state.silo_id).await {
            Ok(pools) => pools,
            Err(e) if is_not_found(&e) => return Ok(ReadOutcome::Removed),
            Err(e) => {
                return Err(EngineError::api(
                    "Unable to read subnet pool silo links:",
                    e,
                ));
            }
        };
        tracing::trace!(
            "read subnet pool silo links for pool: {}",
            state.subnet_pool_id
        );
        let Some(pool) = pools
            .iter()
            .find(|p| p.identity.id == state.subnet_pool_id)
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&SubnetPoolSiloLinkModel {
            id: Some(link_id(&pool.identity.id, &state.silo_id)),
            subnet_pool_id: pool.identity.id.clone(),
            silo_id: state.silo_id,
            is_default: pool.is_default,
        })?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: SubnetPoolSiloLinkModel = decode(plan)?;
        let prior: SubnetPoolSiloLinkModel = decode(prior)?;
        let link = self
            .client
            .subnet_pool_silo_update(
                &prior.subnet_pool_id,
                &prior.silo_id,
                &IsDefault {
                    is_default: plan.is_default,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating subnet pool silo link", e))?;
        encode(&SubnetPoolSiloLinkModel::from(&link))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SubnetPoolSiloLinkModel = decode(state)?;
        match self
            .client
            .subnet_pool_silo_unlink(&state.subnet_pool_id, &state.silo_id)
            .await
        {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_not_found(&e) => Ok(DeleteOutcome::Deleted),
            Err(e) => Err(EngineError::api("Error deleting subnet pool silo link:", e)),
        }
    }

    async fn import(&self, id: &str) -> Result<Value> {
        let (pool, silo) = split_import_id(id, "subnet_pool_id/silo_id")?;
        Ok(json!({ "id": id, "subnet_pool_id": pool, "silo_id": silo }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::FakeClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_import_composite_key() {
        let resource = SubnetPoolSiloLinkResource::new(Arc::new(FakeClient::new()));
        let state = resource.import("P/S").await.unwrap();
        assert_eq!(
            state,
            json!({"id": "P/S", "subnet_pool_id": "P", "silo_id": "S"})
        );

        let err = resource.import("P").await.unwrap_err();
        assert_eq!(err.summary(), "Invalid Import ID");
    }
}
