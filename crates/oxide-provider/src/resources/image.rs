//! `oxide_image`

use super::{Client, Stamps, deleted, found, keep_prior};
use async_trait::async_trait;
use oxide_api::{Digest, Image, ImageCreate, ImageSource};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct ImageResource {
    client: Client,
}

impl ImageResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ImageModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    os: String,
    version: String,
    source_snapshot_id: String,
    block_size: Option<i64>,
    size: Option<i64>,
    digest: Option<Digest>,
}

impl ImageModel {
    /// Project an image. `project_id` and `source_snapshot_id` are not part
    /// of the view, so they carry over from the caller's document.
    fn observe(image: &Image, project_id: String, source_snapshot_id: String) -> Result<Self> {
        let digest = match &image.digest {
            None => None,
            Some(digest) if digest.kind == "sha256" => Some(digest.clone()),
            Some(digest) => {
                return Err(EngineError::internal(
                    "Unexpected digest type",
                    format!("Expected sha256 digest, got: {}", digest.kind),
                ));
            }
        };
        Ok(Self {
            stamps: Stamps::of(&image.identity),
            project_id: image.project_id.clone().unwrap_or(project_id),
            name: image.identity.name.clone(),
            description: image.identity.description.clone(),
            os: image.os.clone(),
            version: image.version.clone(),
            source_snapshot_id,
            block_size: Some(image.block_size).filter(|size| *size > 0),
            size: Some(image.size),
            digest,
        })
    }
}

#[async_trait]
impl Resource for ImageResource {
    fn type_name(&self) -> &'static str {
        "oxide_image"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages images.")
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the image.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .description("ID of the project that will contain the image.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the image.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("os", AttributeType::String)
                    .description("OS image distribution. Example: \"alpine\".")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("version", AttributeType::String)
                    .description("OS image version. Example: \"3.16\".")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("source_snapshot_id", AttributeType::String)
                    .description("Snapshot ID of the image source if applicable.")
                    .requires_replace(),
            )
            .attribute(Attribute::timeouts(&[Phase::Create, Phase::Read, Phase::Delete]))
            .attribute(
                Attribute::computed("block_size", AttributeType::Int64)
                    .description("Size of blocks in bytes."),
            )
            .attribute(
                Attribute::computed(
                    "digest",
                    AttributeType::object(vec![
                        Attribute::computed("type", AttributeType::String)
                            .description("Digest type."),
                        Attribute::computed("value", AttributeType::String)
                            .description("Digest type value."),
                    ]),
                )
                .description("Hash of the image contents, if applicable."),
            )
            .attribute(
                Attribute::id()
                    .description("Unique, immutable, system-controlled identifier of the image."),
            )
            .attribute(Attribute::computed("size", AttributeType::Int64).description("Total size in bytes."))
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: ImageModel = decode(plan)?;
        let image = self
            .client
            .image_create(
                &plan.project_id,
                &ImageCreate {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    os: plan.os.clone(),
                    version: plan.version.clone(),
                    source: ImageSource::Snapshot {
                        id: plan.source_snapshot_id.clone(),
                    },
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating image", e))?;
        encode(&ImageModel::observe(
            &image,
            plan.project_id,
            plan.source_snapshot_id,
        )?)
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: ImageModel = decode(state)?;
        let Some(image) = found(
            self.client.image_view(state.stamps.id()?).await,
            "Unable to read image:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&ImageModel::observe(
            &image,
            state.project_id,
            state.source_snapshot_id,
        )?)?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        keep_prior("image", &plan, prior)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: ImageModel = decode(state)?;
        deleted(
            self.client.image_delete(state.stamps.id()?).await,
            "Unable to delete image:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oxide_api::IdentityMetadata;

    fn image(digest: Option<Digest>, block_size: i64) -> Image {
        Image {
            identity: IdentityMetadata {
                id: "img-1".to_string(),
                name: "alpine".to_string(),
                description: String::new(),
                time_created: Utc::now(),
                time_modified: Utc::now(),
            },
            project_id: Some("proj".to_string()),
            os: "alpine".to_string(),
            version: "3.16".to_string(),
            digest,
            block_size,
            size: 1024,
        }
    }

    #[test]
    fn test_observe_rejects_unknown_digest() {
        let odd = image(
            Some(Digest {
                kind: "md5".to_string(),
                value: "abc".to_string(),
            }),
            512,
        );
        let err = ImageModel::observe(&odd, String::new(), String::new()).unwrap_err();
        assert_eq!(err.summary(), "Unexpected digest type");
    }

    #[test]
    fn test_observe_nulls_zero_block_size() {
        let model = ImageModel::observe(&image(None, 0), String::new(), "snap".to_string()).unwrap();
        assert_eq!(model.block_size, None);
        assert_eq!(model.source_snapshot_id, "snap");
        assert_eq!(model.project_id, "proj");
    }
}
