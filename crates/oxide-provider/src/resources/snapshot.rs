//! `oxide_snapshot`

use super::{Client, Stamps, deleted, found, keep_prior};
use async_trait::async_trait;
use oxide_api::{Snapshot, SnapshotCreate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct SnapshotResource {
    client: Client,
}

impl SnapshotResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SnapshotModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    disk_id: String,
    size: Option<i64>,
}

impl From<&Snapshot> for SnapshotModel {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            stamps: Stamps::of(&snapshot.identity),
            project_id: snapshot.project_id.clone(),
            name: snapshot.identity.name.clone(),
            description: snapshot.identity.description.clone(),
            disk_id: snapshot.disk_id.clone(),
            size: Some(snapshot.size),
        }
    }
}

#[async_trait]
impl Resource for SnapshotResource {
    fn type_name(&self) -> &'static str {
        "oxide_snapshot"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages snapshots.")
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .description("ID of the project that will contain the snapshot.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the snapshot.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the snapshot.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("disk_id", AttributeType::String)
                    .description("ID of the disk to create the snapshot from.")
                    .requires_replace(),
            )
            .attribute(Attribute::timeouts(&[Phase::Create, Phase::Read, Phase::Delete]))
            .attribute(
                Attribute::id()
                    .description("Unique, immutable, system-controlled identifier of the snapshot."),
            )
            .attribute(
                Attribute::computed("size", AttributeType::Int64)
                    .description("Size of the snapshot in bytes."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SnapshotModel = decode(plan)?;
        // The create body names the disk rather than taking its id
        let disk = self
            .client
            .disk_view(&plan.disk_id, None)
            .await
            .map_err(|e| EngineError::api("Error retrieving information from disk", e))?;
        tracing::trace!("read information about disk with ID: {}", disk.identity.id);

        let snapshot = self
            .client
            .snapshot_create(
                &plan.project_id,
                &SnapshotCreate {
                    name: plan.name,
                    description: plan.description,
                    disk: disk.identity.name,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating snapshot", e))?;
        encode(&SnapshotModel::from(&snapshot))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SnapshotModel = decode(state)?;
        let Some(snapshot) = found(
            self.client.snapshot_view(state.stamps.id()?).await,
            "Unable to read snapshot:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&SnapshotModel::from(&snapshot))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        keep_prior("snapshot", &plan, prior)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SnapshotModel = decode(state)?;
        deleted(
            self.client.snapshot_delete(state.stamps.id()?).await,
            "Error deleting snapshot:",
        )
    }
}
