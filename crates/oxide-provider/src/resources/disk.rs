//! `oxide_disk`
//!
//! A disk is created blank, from an image or from a snapshot. Which one
//! follows from the single source attribute that is configured.

use super::{Client, Stamps, deleted, found, keep_prior};
use async_trait::async_trait;
use oxide_api::{Disk, DiskCreate, DiskSource};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, ConfigValidator, DeleteOutcome, EngineError, Phase, ReadOutcome,
    Resource, Result, Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct DiskResource {
    client: Client,
}

impl DiskResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DiskModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    size: i64,
    block_size: Option<i64>,
    source_image_id: Option<String>,
    source_snapshot_id: Option<String>,
    device_path: Option<String>,
}

impl DiskModel {
    /// Image wins over snapshot, snapshot over blank; validation already
    /// rejects configs that set more than one.
    fn source(&self) -> Result<DiskSource> {
        if let Some(image_id) = &self.source_image_id {
            Ok(DiskSource::Image {
                image_id: image_id.clone(),
            })
        } else if let Some(snapshot_id) = &self.source_snapshot_id {
            Ok(DiskSource::Snapshot {
                snapshot_id: snapshot_id.clone(),
            })
        } else if let Some(block_size) = self.block_size {
            Ok(DiskSource::Blank { block_size })
        } else {
            Err(EngineError::config(
                "Error creating disk",
                "one of block_size, source_image_id or source_snapshot_id must be set",
            ))
        }
    }
}

impl From<&Disk> for DiskModel {
    fn from(disk: &Disk) -> Self {
        Self {
            stamps: Stamps::of(&disk.identity),
            project_id: disk.project_id.clone(),
            name: disk.identity.name.clone(),
            description: disk.identity.description.clone(),
            size: disk.size,
            block_size: Some(disk.block_size),
            // Left null when unset so blank disks do not drift
            source_image_id: disk.image_id.clone().filter(|id| !id.is_empty()),
            source_snapshot_id: disk.snapshot_id.clone().filter(|id| !id.is_empty()),
            device_path: Some(disk.device_path.clone()),
        }
    }
}

#[async_trait]
impl Resource for DiskResource {
    fn type_name(&self) -> &'static str {
        "oxide_disk"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource manages disks. To create a blank disk it's necessary to set `block_size`. Otherwise, one of `source_image_id` or `source_snapshot_id` must be set; `block_size` will be automatically calculated.",
        )
        .attribute(
            Attribute::required("project_id", AttributeType::String)
                .description("ID of the project that will contain the disk.")
                .requires_replace(),
        )
        .attribute(
            Attribute::required("name", AttributeType::String)
                .description("Name of the disk.")
                .requires_replace(),
        )
        .attribute(
            Attribute::required("size", AttributeType::Int64)
                .description("Size of the disk in bytes.")
                .requires_replace(),
        )
        .attribute(
            Attribute::required("description", AttributeType::String)
                .description("Description for the disk.")
                .requires_replace(),
        )
        .attribute(
            Attribute::optional("source_image_id", AttributeType::String)
                .description("Image ID of the disk source if applicable.")
                .requires_replace(),
        )
        .attribute(
            Attribute::optional("source_snapshot_id", AttributeType::String)
                .description("Snapshot ID of the disk source if applicable.")
                .requires_replace(),
        )
        .attribute(
            Attribute::optional_computed("block_size", AttributeType::Int64)
                .description("Size of blocks in bytes.")
                .requires_replace_if_configured()
                .use_state_for_unknown(),
        )
        .attribute(Attribute::timeouts(&[Phase::Create, Phase::Read, Phase::Delete]))
        .attribute(
            Attribute::computed("device_path", AttributeType::String)
                .description("Path of the disk.")
                .use_state_for_unknown(),
        )
        .attribute(
            Attribute::id().description("Unique, immutable, system-controlled identifier of the disk."),
        )
        .attribute(Attribute::time_created())
        .attribute(Attribute::time_modified())
    }

    fn config_validators(&self) -> Vec<ConfigValidator> {
        vec![ConfigValidator::ExactlyOneOf(vec![
            "block_size".to_string(),
            "source_image_id".to_string(),
            "source_snapshot_id".to_string(),
        ])]
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: DiskModel = decode(plan)?;
        let disk = self
            .client
            .disk_create(
                &plan.project_id,
                &DiskCreate {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    size: plan.size,
                    disk_source: plan.source()?,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating disk", e))?;
        encode(&DiskModel::from(&disk))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: DiskModel = decode(state)?;
        let Some(disk) = found(
            self.client.disk_view(state.stamps.id()?, None).await,
            "Unable to read disk:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&DiskModel::from(&disk))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        keep_prior("disk", &plan, prior)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: DiskModel = decode(state)?;
        deleted(
            self.client.disk_delete(state.stamps.id()?).await,
            "Unable to delete disk:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_follows_configured_attribute() {
        let blank = DiskModel {
            block_size: Some(512),
            ..Default::default()
        };
        assert_eq!(blank.source().unwrap().kind(), "blank");

        let image = DiskModel {
            source_image_id: Some("img".to_string()),
            ..Default::default()
        };
        assert_eq!(image.source().unwrap().kind(), "image");

        let snapshot = DiskModel {
            source_snapshot_id: Some("snap".to_string()),
            ..Default::default()
        };
        assert_eq!(snapshot.source().unwrap().kind(), "snapshot");

        assert!(DiskModel::default().source().unwrap_err().is_config());
    }
}
