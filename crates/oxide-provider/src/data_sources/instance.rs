//! Compute data sources
//!
//! `oxide_disk`, `oxide_anti_affinity_group`, `oxide_instance_external_ips`
//! and `oxide_ssh_key`.

use super::{ByName, identity, listing_id, read_timeouts, resolved, with_identity};
use crate::resources::Client;
use async_trait::async_trait;
use oxide_api::DiskState;
use oxide_engine::resource::decode;
use oxide_engine::{Attribute, AttributeType, DataSource, EngineError, Result, Schema};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct InProject {
    project_name: String,
    name: String,
}

fn project_scope(kind: &str) -> [Attribute; 2] {
    [
        Attribute::required("project_name", AttributeType::String)
            .description(format!("Name of the project that contains the {}.", kind)),
        Attribute::required("name", AttributeType::String)
            .description(format!("Name of the {}.", kind)),
    ]
}

/// `{state, instance}` of a disk, the instance set only while one holds it
fn disk_state(state: &DiskState) -> Value {
    let (state, instance) = match state {
        DiskState::Creating => ("creating", None),
        DiskState::Detached => ("detached", None),
        DiskState::Attaching(id) => ("attaching", Some(id)),
        DiskState::Attached(id) => ("attached", Some(id)),
        DiskState::Detaching(id) => ("detaching", Some(id)),
        DiskState::Destroyed => ("destroyed", None),
        DiskState::Faulted => ("faulted", None),
    };
    json!({ "state": state, "instance": instance })
}

pub struct DiskDataSource {
    client: Client,
}

impl DiskDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for DiskDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_disk"
    }

    fn schema(&self) -> Schema {
        let schema = project_scope("disk")
            .into_iter()
            .fold(Schema::new("Retrieve information about a specified disk."), Schema::attribute)
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed("project_id", AttributeType::String)
                    .description("ID of the project that contains the disk."),
            )
            .attribute(
                Attribute::computed("block_size", AttributeType::Int64)
                    .description("Size of blocks in bytes."),
            )
            .attribute(
                Attribute::computed("device_path", AttributeType::String)
                    .description("Path of the disk."),
            )
            .attribute(
                Attribute::computed("size", AttributeType::Int64)
                    .description("Size of the disk in bytes."),
            )
            .attribute(
                Attribute::computed("image_id", AttributeType::String)
                    .description("ID of the image the disk was created from, if any."),
            )
            .attribute(
                Attribute::computed("snapshot_id", AttributeType::String)
                    .description("ID of the snapshot the disk was created from, if any."),
            )
            .attribute(
                Attribute::computed(
                    "state",
                    AttributeType::object(vec![
                        Attribute::computed("state", AttributeType::String)
                            .description("State of the disk."),
                        Attribute::computed("instance", AttributeType::String)
                            .description("ID of the instance the disk is attached to, if any."),
                    ]),
                )
                .description("State of the disk."),
            );
        with_identity(schema, "disk")
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InProject = decode(config.clone())?;
        let disk = self
            .client
            .disk_view(&lookup.name, Some(&lookup.project_name))
            .await
            .map_err(|e| EngineError::api("Unable to read disk:", e))?;
        tracing::trace!("read disk with ID: {}", disk.identity.id);

        let mut fields = identity(&disk.identity);
        fields["project_id"] = json!(disk.project_id);
        fields["block_size"] = json!(disk.block_size);
        fields["device_path"] = json!(disk.device_path);
        fields["size"] = json!(disk.size);
        fields["image_id"] = json!(disk.image_id);
        fields["snapshot_id"] = json!(disk.snapshot_id);
        fields["state"] = disk_state(&disk.state);
        Ok(resolved(config, fields))
    }
}

pub struct AntiAffinityGroupDataSource {
    client: Client,
}

impl AntiAffinityGroupDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for AntiAffinityGroupDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_anti_affinity_group"
    }

    fn schema(&self) -> Schema {
        let schema = project_scope("anti-affinity group")
            .into_iter()
            .fold(
                Schema::new("Retrieve information about a specified anti-affinity group."),
                Schema::attribute,
            )
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed("project_id", AttributeType::String)
                    .description("ID of the project that contains the anti-affinity group."),
            )
            .attribute(
                Attribute::computed("policy", AttributeType::String)
                    .description("Affinity policy used to describe what to do when a request cannot be satisfied."),
            )
            .attribute(
                Attribute::computed("failure_domain", AttributeType::String)
                    .description("Describes the scope of affinity for the purposes of co-location."),
            );
        with_identity(schema, "anti-affinity group")
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InProject = decode(config.clone())?;
        let group = self
            .client
            .anti_affinity_group_lookup(&lookup.name, &lookup.project_name)
            .await
            .map_err(|e| EngineError::api("Unable to read anti-affinity group:", e))?;
        tracing::trace!("read anti-affinity group with ID: {}", group.identity.id);

        let mut fields = identity(&group.identity);
        fields["project_id"] = json!(group.project_id);
        fields["policy"] = json!(group.policy);
        fields["failure_domain"] = json!(group.failure_domain);
        Ok(resolved(config, fields))
    }
}

pub struct InstanceExternalIpsDataSource {
    client: Client,
}

impl InstanceExternalIpsDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ForInstance {
    instance_id: String,
}

#[async_trait]
impl DataSource for InstanceExternalIpsDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_instance_external_ips"
    }

    fn schema(&self) -> Schema {
        Schema::new("Retrieve the external IP addresses of an instance.")
            .attribute(
                Attribute::computed("id", AttributeType::String)
                    .description("The ID of this resource."),
            )
            .attribute(
                Attribute::required("instance_id", AttributeType::String)
                    .description("ID of the instance to which the external IPs belong to."),
            )
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed(
                    "external_ips",
                    AttributeType::list_of(AttributeType::object(vec![
                        Attribute::computed("ip", AttributeType::String)
                            .description("External IP address."),
                        Attribute::computed("kind", AttributeType::String)
                            .description("Kind of external IP address: `snat`, `ephemeral` or `floating`."),
                    ])),
                )
                .description("External IPs of the instance."),
            )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ForInstance = decode(config.clone())?;
        let ips = self
            .client
            .instance_external_ip_list(&lookup.instance_id)
            .await
            .map_err(|e| EngineError::api("Unable to read external ips:", e))?;
        tracing::trace!("read external IPs of instance: {}", lookup.instance_id);

        let external_ips: Vec<Value> = ips
            .iter()
            .map(|ip| json!({ "ip": ip.ip, "kind": ip.kind }))
            .collect();
        Ok(resolved(
            config,
            json!({ "id": listing_id(), "external_ips": external_ips }),
        ))
    }
}

pub struct SshKeyDataSource {
    client: Client,
}

impl SshKeyDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for SshKeyDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_ssh_key"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified SSH key of the current user.")
                .attribute(
                    Attribute::required("name", AttributeType::String)
                        .description("Name of the SSH key."),
                )
                .attribute(read_timeouts())
                .attribute(
                    Attribute::computed("public_key", AttributeType::String)
                        .description("Public SSH key."),
                )
                .attribute(
                    Attribute::computed("silo_user_id", AttributeType::String)
                        .description("User ID that owns this SSH key."),
                ),
            "SSH key",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ByName = decode(config.clone())?;
        let key = self
            .client
            .current_user_ssh_key_view(&lookup.name)
            .await
            .map_err(|e| EngineError::api("Unable to read SSH key:", e))?;
        tracing::trace!("read SSH key with ID: {}", key.identity.id);

        let mut fields = identity(&key.identity);
        fields["public_key"] = json!(key.public_key);
        fields["silo_user_id"] = json!(key.silo_user_id);
        Ok(resolved(config, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::{DiskCreate, DiskSource, FakeClient, OxideApi, ProjectCreate, SshKeyCreate};
    use std::sync::Arc;

    #[test]
    fn test_disk_state_carries_instance() {
        assert_eq!(
            disk_state(&DiskState::Attached("i-1".to_string())),
            json!({"state": "attached", "instance": "i-1"})
        );
        assert_eq!(
            disk_state(&DiskState::Detached),
            json!({"state": "detached", "instance": null})
        );
    }

    #[tokio::test]
    async fn test_disk_in_project() {
        let fake = Arc::new(FakeClient::new());
        for name in ["web", "db"] {
            fake.project_create(&ProjectCreate {
                name: name.to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        }
        let disk = fake
            .disk_create(
                "web",
                &DiskCreate {
                    name: "boot".to_string(),
                    description: String::new(),
                    size: 1073741824,
                    disk_source: DiskSource::Blank { block_size: 4096 },
                },
            )
            .await
            .unwrap();

        let source = DiskDataSource::new(fake.clone());
        let out = source
            .read(json!({"project_name": "web", "name": "boot"}))
            .await
            .unwrap();
        assert_eq!(out["id"], disk.identity.id.as_str());
        assert_eq!(out["block_size"], 4096);
        assert_eq!(out["state"]["state"], "detached");

        let err = source
            .read(json!({"project_name": "db", "name": "boot"}))
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Unable to read disk:");
    }

    #[tokio::test]
    async fn test_ssh_key_by_name() {
        let fake = Arc::new(FakeClient::new());
        fake.current_user_ssh_key_create(&SshKeyCreate {
            name: "laptop".to_string(),
            description: "work".to_string(),
            public_key: "ssh-ed25519 AAAA".to_string(),
        })
        .await
        .unwrap();

        let out = SshKeyDataSource::new(fake)
            .read(json!({"name": "laptop"}))
            .await
            .unwrap();
        assert_eq!(out["public_key"], "ssh-ed25519 AAAA");
        assert_eq!(out["description"], "work");
        assert!(out["silo_user_id"].is_string());
    }
}
