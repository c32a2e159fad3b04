//! Read-only data sources
//!
//! Lookups by name within a project, VPC or router scope, and listings.
//! Every data source accepts a `timeouts` block with a `read` budget.
//! Listings carry a fresh random `id` on every read.

pub mod image;
pub mod instance;
pub mod networking;
pub mod project;
pub mod silo;
pub mod vpc;

use crate::resources::Client;
use oxide_api::IdentityMetadata;
use oxide_engine::{Attribute, AttributeType, DataSource, Phase, Schema, rfc3339};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Every data source, bound to one client
pub fn all(client: &Client) -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(instance::AntiAffinityGroupDataSource::new(client.clone())),
        Arc::new(instance::DiskDataSource::new(client.clone())),
        Arc::new(networking::FloatingIpDataSource::new(client.clone())),
        Arc::new(image::ImageDataSource::new(client.clone())),
        Arc::new(image::ImagesDataSource::new(client.clone())),
        Arc::new(instance::InstanceExternalIpsDataSource::new(
            client.clone(),
        )),
        Arc::new(networking::IpPoolDataSource::new(client.clone())),
        Arc::new(networking::AddressLotsDataSource::new(client.clone())),
        Arc::new(project::ProjectDataSource::new(client.clone())),
        Arc::new(project::ProjectsDataSource::new(client.clone())),
        Arc::new(silo::SiloDataSource::new(client.clone())),
        Arc::new(instance::SshKeyDataSource::new(client.clone())),
        Arc::new(networking::SubnetPoolDataSource::new(client.clone())),
        Arc::new(networking::SystemIpPoolsDataSource::new(client.clone())),
        Arc::new(vpc::VpcDataSource::new(client.clone())),
        Arc::new(vpc::VpcInternetGatewayDataSource::new(client.clone())),
        Arc::new(vpc::VpcRouterDataSource::new(client.clone())),
        Arc::new(vpc::VpcRouterRouteDataSource::new(client.clone())),
        Arc::new(vpc::VpcSubnetDataSource::new(client.clone())),
    ]
}

/// Config of a lookup by name alone
#[derive(Debug, Deserialize)]
pub(crate) struct ByName {
    pub name: String,
}

/// `id`, `name`, `description` and the timestamps of a view
pub(crate) fn identity(identity: &IdentityMetadata) -> Value {
    json!({
        "id": identity.id,
        "name": identity.name,
        "description": identity.description,
        "time_created": rfc3339(&identity.time_created),
        "time_modified": rfc3339(&identity.time_modified),
    })
}

/// The config echoed back with the resolved attributes on top
pub(crate) fn resolved(mut config: Value, fields: Value) -> Value {
    if let (Some(config), Value::Object(fields)) = (config.as_object_mut(), fields) {
        config.extend(fields);
    }
    config
}

/// Identifier of one listing result
pub(crate) fn listing_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Computed `id`, `description` and timestamps of a looked-up object
pub(crate) fn identity_attributes(kind: &str) -> Vec<Attribute> {
    vec![
        Attribute::computed("id", AttributeType::String)
            .description(format!("Unique, immutable, system-controlled identifier of the {}.", kind)),
        Attribute::computed("description", AttributeType::String)
            .description(format!("Description of the {}.", kind)),
        Attribute::computed("time_created", AttributeType::Timestamp)
            .description(format!("Timestamp of when this {} was created.", kind)),
        Attribute::computed("time_modified", AttributeType::Timestamp)
            .description(format!("Timestamp of when this {} was last modified.", kind)),
    ]
}

/// `schema` with the identity attributes of `kind` appended
pub(crate) fn with_identity(schema: Schema, kind: &str) -> Schema {
    identity_attributes(kind)
        .into_iter()
        .fold(schema, Schema::attribute)
}

/// Element type of a listing: identity attributes plus `extra`
pub(crate) fn listed(kind: &str, extra: Vec<Attribute>) -> AttributeType {
    let mut attributes = vec![
        Attribute::computed("name", AttributeType::String)
            .description(format!("Name of the {}.", kind)),
    ];
    attributes.extend(identity_attributes(kind));
    attributes.extend(extra);
    AttributeType::object(attributes)
}

pub(crate) fn read_timeouts() -> Attribute {
    Attribute::timeouts(&[Phase::Read])
}

/// `{type, value}` pair of computed strings
pub(crate) fn typed_value(description: &str) -> AttributeType {
    AttributeType::object(vec![
        Attribute::computed("type", AttributeType::String)
            .description(format!("{} type.", description)),
        Attribute::computed("value", AttributeType::String)
            .description(format!("{} value.", description)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolved_keeps_config_and_overrides() {
        let config = json!({"name": "web", "project_name": "p"});
        let out = resolved(config, json!({"id": "v-1", "name": "web"}));
        assert_eq!(out, json!({"name": "web", "project_name": "p", "id": "v-1"}));
    }

    #[test]
    fn test_identity_fields() {
        let view = IdentityMetadata {
            id: "p-1".to_string(),
            name: "web".to_string(),
            description: "frontend".to_string(),
            time_created: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            time_modified: chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        };
        let out = identity(&view);
        assert_eq!(out["time_modified"], "2024-01-02T00:00:00Z");
        assert_eq!(out["description"], "frontend");
        assert_ne!(listing_id(), listing_id());
    }
}
