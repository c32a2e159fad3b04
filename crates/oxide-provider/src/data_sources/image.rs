//! `oxide_image` and `oxide_images`

use super::{identity, listed, listing_id, read_timeouts, resolved, typed_value, with_identity};
use crate::resources::Client;
use async_trait::async_trait;
use oxide_api::Image;
use oxide_engine::resource::decode;
use oxide_engine::{Attribute, AttributeType, DataSource, EngineError, Result, Schema};
use serde::Deserialize;
use serde_json::{Value, json};

const SHA256: &str = "sha256";

/// Image attributes shared by the lookup and the listing
fn image_attributes() -> Vec<Attribute> {
    vec![
        Attribute::computed("block_size", AttributeType::Int64)
            .description("Block size in bytes."),
        Attribute::computed("digest", typed_value("Digest"))
            .description("Hash of the image contents, if applicable."),
        Attribute::computed("os", AttributeType::String).description("OS image distribution."),
        Attribute::computed("size", AttributeType::Int64)
            .description("Size of the image in bytes."),
        Attribute::computed("version", AttributeType::String).description("Version of the OS."),
    ]
}

/// Computed attributes of one image. Only sha256 digests are understood.
fn image_fields(image: &Image) -> Result<Value> {
    let digest = match &image.digest {
        Some(digest) if digest.kind != SHA256 => {
            return Err(EngineError::unsupported(
                "Unexpected digest type",
                format!("Expected sha256 digest, got: {}", digest.kind),
            ));
        }
        Some(digest) => json!({"type": digest.kind, "value": digest.value}),
        None => Value::Null,
    };
    let mut fields = identity(&image.identity);
    if let Some(obj) = fields.as_object_mut() {
        obj.insert("block_size".to_string(), json!(image.block_size));
        obj.insert("digest".to_string(), digest);
        obj.insert("os".to_string(), json!(image.os));
        obj.insert("size".to_string(), json!(image.size));
        obj.insert("version".to_string(), json!(image.version));
    }
    Ok(fields)
}

pub struct ImageDataSource {
    client: Client,
}

impl ImageDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ImageLookup {
    name: String,
    #[serde(default)]
    project_name: Option<String>,
}

#[async_trait]
impl DataSource for ImageDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_image"
    }

    fn schema(&self) -> Schema {
        let schema = Schema::new("Retrieve information about a specified image.")
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the image."),
            )
            .attribute(
                Attribute::optional("project_name", AttributeType::String)
                    .description("Name of the project which contains the image."),
            )
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed("project_id", AttributeType::String)
                    .description("ID of the project which contains the image."),
            );
        with_identity(
            image_attributes()
                .into_iter()
                .fold(schema, Schema::attribute),
            "image",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ImageLookup = decode(config.clone())?;
        let image = self
            .client
            .image_lookup(&lookup.name, lookup.project_name.as_deref())
            .await
            .map_err(|e| EngineError::api("Unable to read image:", e))?;
        tracing::trace!("read image with ID: {}", image.identity.id);

        let mut fields = image_fields(&image)?;
        fields["project_id"] = json!(image.project_id);
        Ok(resolved(config, fields))
    }
}

pub struct ImagesDataSource {
    client: Client,
}

impl ImagesDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesLookup {
    #[serde(default)]
    project_id: Option<String>,
}

#[async_trait]
impl DataSource for ImagesDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_images"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "Retrieve a list of images. Images of the given project are listed when `project_id` is set, silo images otherwise.",
        )
        .attribute(
            Attribute::computed("id", AttributeType::String)
                .description("The ID of this resource."),
        )
        .attribute(
            Attribute::optional("project_id", AttributeType::String)
                .description("ID of the project which contains the images."),
        )
        .attribute(read_timeouts())
        .attribute(
            Attribute::computed(
                "images",
                AttributeType::list_of(listed("image", image_attributes())),
            )
            .description("A list of all images."),
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ImagesLookup = decode(config.clone())?;
        let images = self
            .client
            .image_list(lookup.project_id.as_deref())
            .await
            .map_err(|e| EngineError::api("Unable to read images:", e))?;
        tracing::trace!("read all images");

        let images = images
            .iter()
            .map(image_fields)
            .collect::<Result<Vec<Value>>>()?;
        Ok(resolved(config, json!({ "id": listing_id(), "images": images })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::{Digest, IdentityMetadata};

    fn image(digest: Option<Digest>) -> Image {
        Image {
            identity: IdentityMetadata {
                id: "i-1".to_string(),
                name: "debian".to_string(),
                description: String::new(),
                time_created: chrono::Utc::now(),
                time_modified: chrono::Utc::now(),
            },
            project_id: Some("p-1".to_string()),
            os: "debian".to_string(),
            version: "12".to_string(),
            digest,
            block_size: 512,
            size: 1024,
        }
    }

    #[test]
    fn test_sha256_digest_projected() {
        let fields = image_fields(&image(Some(Digest {
            kind: "sha256".to_string(),
            value: "abc".to_string(),
        })))
        .unwrap();
        assert_eq!(fields["digest"], json!({"type": "sha256", "value": "abc"}));
        assert_eq!(fields["block_size"], 512);

        let fields = image_fields(&image(None)).unwrap();
        assert!(fields["digest"].is_null());
    }

    #[test]
    fn test_unexpected_digest_type() {
        let err = image_fields(&image(Some(Digest {
            kind: "md5".to_string(),
            value: "abc".to_string(),
        })))
        .unwrap_err();
        assert_eq!(err.summary(), "Unexpected digest type");
        assert!(err.detail().contains("got: md5"));
    }
}
