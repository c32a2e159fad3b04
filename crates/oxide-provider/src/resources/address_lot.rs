//! `oxide_address_lot`

use super::{Client, Stamps, deleted, found, keep_prior};
use async_trait::async_trait;
use oxide_api::{AddressLotBlockCreate, AddressLotCreate, AddressLotWithBlocks};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct AddressLotResource {
    client: Client,
}

impl AddressLotResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AddressLotModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
    kind: String,
    blocks: Vec<BlockModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct BlockModel {
    id: Option<String>,
    first_address: String,
    last_address: String,
}

impl From<&AddressLotWithBlocks> for AddressLotModel {
    fn from(lot: &AddressLotWithBlocks) -> Self {
        Self {
            stamps: Stamps::of(&lot.lot.identity),
            name: lot.lot.identity.name.clone(),
            description: lot.lot.identity.description.clone(),
            kind: lot.lot.kind.clone(),
            blocks: lot
                .blocks
                .iter()
                .map(|block| BlockModel {
                    id: Some(block.id.clone()),
                    first_address: block.first_address.clone(),
                    last_address: block.last_address.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Resource for AddressLotResource {
    fn type_name(&self) -> &'static str {
        "oxide_address_lot"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages address lots.")
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the address lot.",
            ))
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the address lot.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the address lot.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("kind", AttributeType::String)
                    .description(r#"Kind for the address lot. Must be one of "infra" or "pool"."#)
                    .validator(Validator::one_of(["infra", "pool"]))
                    .requires_replace(),
            )
            .attribute(
                Attribute::required(
                    "blocks",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::computed("id", AttributeType::String)
                            .description("ID of the address lot block."),
                        Attribute::required("first_address", AttributeType::String)
                            .description("First address in the lot."),
                        Attribute::required("last_address", AttributeType::String)
                            .description("Last address in the lot."),
                    ])),
                )
                .description("Parameters for creating an address lot block.")
                .requires_replace(),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: AddressLotModel = decode(plan)?;
        let lot = self
            .client
            .networking_address_lot_create(&AddressLotCreate {
                name: plan.name,
                description: plan.description,
                kind: plan.kind,
                blocks: plan
                    .blocks
                    .into_iter()
                    .map(|block| AddressLotBlockCreate {
                        first_address: block.first_address,
                        last_address: block.last_address,
                    })
                    .collect(),
            })
            .await
            .map_err(|e| EngineError::api("Error creating address lot", e))?;
        tracing::trace!("created address lot with ID: {}", lot.lot.identity.id);
        encode(&AddressLotModel::from(&lot))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: AddressLotModel = decode(state)?;
        let Some(lot) = found(
            self.client
                .networking_address_lot_view(state.stamps.id()?)
                .await,
            "Unable to read address lot:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&AddressLotModel::from(&lot))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        keep_prior("address lot", &plan, prior)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: AddressLotModel = decode(state)?;
        deleted(
            self.client
                .networking_address_lot_delete(state.stamps.id()?)
                .await,
            "Error deleting Address Lot:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::FakeClient;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_blocks_round_trip_and_timeouts_only_update() {
        let resource = AddressLotResource::new(Arc::new(FakeClient::new()));
        let state = resource
            .create(json!({
                "name": "uplinks",
                "description": "rack uplinks",
                "kind": "infra",
                "blocks": [{"first_address": "198.51.100.1", "last_address": "198.51.100.10"}]
            }))
            .await
            .unwrap();
        assert_eq!(state["kind"], "infra");
        assert!(state["blocks"][0]["id"].is_string());

        let ReadOutcome::Found(read) = resource.read(state.clone()).await.unwrap() else {
            panic!("address lot should exist");
        };
        assert_eq!(read["blocks"], state["blocks"]);

        let mut longer = state.clone();
        longer["timeouts"] = json!({"update": "20m"});
        let kept = resource.update(longer, state.clone()).await.unwrap();
        assert_eq!(kept["id"], state["id"]);

        let mut renamed = state.clone();
        renamed["name"] = json!("downlinks");
        let err = resource.update(renamed, state.clone()).await.unwrap_err();
        assert_eq!(err.summary(), "Error updating address lot");

        resource.delete(state.clone()).await.unwrap();
        assert!(matches!(
            resource.read(state).await.unwrap(),
            ReadOutcome::Removed
        ));
    }
}
