//! Address data sources
//!
//! `oxide_floating_ip`, `oxide_ip_pool`, `oxide_system_ip_pools`,
//! `oxide_subnet_pool` and `oxide_networking_address_lots`.

use super::{ByName, identity, listed, listing_id, read_timeouts, resolved, with_identity};
use crate::resources::Client;
use async_trait::async_trait;
use oxide_engine::resource::decode;
use oxide_engine::{Attribute, AttributeType, DataSource, EngineError, Result, Schema};
use serde::Deserialize;
use serde_json::{Value, json};

fn listing_id_attribute() -> Attribute {
    Attribute::computed("id", AttributeType::String).description("The ID of this resource.")
}

pub struct FloatingIpDataSource {
    client: Client,
}

impl FloatingIpDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct InProject {
    project_name: String,
    name: String,
}

#[async_trait]
impl DataSource for FloatingIpDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_floating_ip"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified floating IP.")
                .attribute(
                    Attribute::required("project_name", AttributeType::String)
                        .description("Name of the project that contains the floating IP."),
                )
                .attribute(
                    Attribute::required("name", AttributeType::String)
                        .description("Name of the floating IP."),
                )
                .attribute(read_timeouts())
                .attribute(
                    Attribute::computed("project_id", AttributeType::String)
                        .description("ID of the project that contains the floating IP."),
                )
                .attribute(
                    Attribute::computed("ip", AttributeType::String)
                        .description("IP address of the floating IP."),
                )
                .attribute(
                    Attribute::computed("ip_pool_id", AttributeType::String)
                        .description("ID of the IP pool the floating IP was allocated from."),
                )
                .attribute(
                    Attribute::computed("instance_id", AttributeType::String)
                        .description("ID of the instance the floating IP is attached to, if any."),
                ),
            "floating IP",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InProject = decode(config.clone())?;
        let fip = self
            .client
            .floating_ip_lookup(&lookup.name, &lookup.project_name)
            .await
            .map_err(|e| EngineError::api("Unable to read floating IP:", e))?;
        tracing::trace!("read floating IP with ID: {}", fip.identity.id);

        let mut fields = identity(&fip.identity);
        fields["project_id"] = json!(fip.project_id);
        fields["ip"] = json!(fip.ip);
        fields["ip_pool_id"] = json!(fip.ip_pool_id);
        fields["instance_id"] = json!(fip.instance_id);
        Ok(resolved(config, fields))
    }
}

pub struct IpPoolDataSource {
    client: Client,
}

impl IpPoolDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for IpPoolDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_ip_pool"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified IP pool linked to the current silo.")
                .attribute(
                    Attribute::required("name", AttributeType::String)
                        .description("Name of the IP pool."),
                )
                .attribute(read_timeouts())
                .attribute(
                    Attribute::computed("is_default", AttributeType::Bool)
                        .description("If a pool is the default for a silo, floating IPs and instance ephemeral IPs will come from that pool when no other pool is specified."),
                ),
            "IP pool",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ByName = decode(config.clone())?;
        let pool = self
            .client
            .project_ip_pool_view(&lookup.name)
            .await
            .map_err(|e| EngineError::api("Unable to read IP pool:", e))?;
        tracing::trace!("read IP pool with ID: {}", pool.identity.id);

        let mut fields = identity(&pool.identity);
        fields["is_default"] = json!(pool.is_default);
        Ok(resolved(config, fields))
    }
}

pub struct SystemIpPoolsDataSource {
    client: Client,
}

impl SystemIpPoolsDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for SystemIpPoolsDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_system_ip_pools"
    }

    fn schema(&self) -> Schema {
        Schema::new("Retrieve a list of all IP pools of the system.")
            .attribute(listing_id_attribute())
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed(
                    "ip_pools",
                    AttributeType::list_of(listed("IP pool", vec![])),
                )
                .description("A list of all IP pools."),
            )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let pools = self
            .client
            .system_ip_pool_list()
            .await
            .map_err(|e| EngineError::api("Unable to read system IP pools list:", e))?;
        tracing::trace!("read all system IP pools");

        let ip_pools: Vec<Value> = pools.iter().map(|p| identity(&p.identity)).collect();
        Ok(resolved(
            config,
            json!({ "id": listing_id(), "ip_pools": ip_pools }),
        ))
    }
}

pub struct SubnetPoolDataSource {
    client: Client,
}

impl SubnetPoolDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for SubnetPoolDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_subnet_pool"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified subnet pool and its members.")
                .attribute(
                    Attribute::required("name", AttributeType::String)
                        .description("Name of the subnet pool."),
                )
                .attribute(read_timeouts())
                .attribute(
                    Attribute::computed("ip_version", AttributeType::String)
                        .description("IP version of the subnet pool."),
                )
                .attribute(
                    Attribute::computed(
                        "members",
                        AttributeType::list_of(AttributeType::object(vec![
                            Attribute::computed("subnet", AttributeType::String)
                                .description("Subnet of the member, in CIDR notation."),
                            Attribute::computed("min_prefix_length", AttributeType::Int64)
                                .description("Smallest prefix length that may be allocated from the member."),
                            Attribute::computed("max_prefix_length", AttributeType::Int64)
                                .description("Largest prefix length that may be allocated from the member."),
                        ])),
                    )
                    .description("Members of the subnet pool."),
                ),
            "subnet pool",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ByName = decode(config.clone())?;
        let pool = self
            .client
            .subnet_pool_view(&lookup.name)
            .await
            .map_err(|e| EngineError::api("Unable to read subnet pool:", e))?;
        tracing::trace!("read subnet pool with ID: {}", pool.identity.id);

        let members = self
            .client
            .subnet_pool_member_list(&pool.identity.id)
            .await
            .map_err(|e| EngineError::api("Unable to read subnet pool members:", e))?;

        let mut fields = identity(&pool.identity);
        fields["ip_version"] = json!(pool.ip_version.as_str());
        fields["members"] = members
            .iter()
            .map(|m| {
                json!({
                    "subnet": m.subnet,
                    "min_prefix_length": m.min_prefix_length,
                    "max_prefix_length": m.max_prefix_length,
                })
            })
            .collect();
        Ok(resolved(config, fields))
    }
}

pub struct AddressLotsDataSource {
    client: Client,
}

impl AddressLotsDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for AddressLotsDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_networking_address_lots"
    }

    fn schema(&self) -> Schema {
        Schema::new("Retrieve a list of all address lots.")
            .attribute(listing_id_attribute())
            .attribute(read_timeouts())
            .attribute(
                Attribute::computed(
                    "address_lots",
                    AttributeType::list_of(AttributeType::object(vec![
                        Attribute::computed("id", AttributeType::String)
                            .description("ID of the address lot."),
                        Attribute::computed("name", AttributeType::String)
                            .description("Name of the address lot."),
                        Attribute::computed("description", AttributeType::String)
                            .description("Description of the address lot."),
                        Attribute::computed("kind", AttributeType::String)
                            .description("Kind of the address lot: `infra` or `pool`."),
                    ])),
                )
                .description("A list of all address lots."),
            )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lots = self
            .client
            .networking_address_lot_list()
            .await
            .map_err(|e| EngineError::api("Unable to read address lots:", e))?;
        tracing::trace!("read all address lots");

        let address_lots: Vec<Value> = lots
            .iter()
            .map(|lot| {
                json!({
                    "id": lot.identity.id,
                    "name": lot.identity.name,
                    "description": lot.identity.description,
                    "kind": lot.kind,
                })
            })
            .collect();
        Ok(resolved(
            config,
            json!({ "id": listing_id(), "address_lots": address_lots }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::{
        AddressLotBlockCreate, AddressLotCreate, FakeClient, IpVersion, OxideApi,
        SubnetPoolCreate, SubnetPoolMemberAdd,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn test_subnet_pool_with_members() {
        let fake = Arc::new(FakeClient::new());
        fake.subnet_pool_create(&SubnetPoolCreate {
            name: "tenant".to_string(),
            description: String::new(),
            ip_version: IpVersion::V4,
        })
        .await
        .unwrap();
        fake.subnet_pool_member_add(
            "tenant",
            &SubnetPoolMemberAdd {
                subnet: "10.0.0.0/16".to_string(),
                min_prefix_length: Some(20),
                max_prefix_length: Some(28),
            },
        )
        .await
        .unwrap();

        let out = SubnetPoolDataSource::new(fake)
            .read(json!({"name": "tenant"}))
            .await
            .unwrap();
        assert_eq!(out["ip_version"], "v4");
        assert_eq!(
            out["members"],
            json!([{"subnet": "10.0.0.0/16", "min_prefix_length": 20, "max_prefix_length": 28}])
        );
    }

    #[tokio::test]
    async fn test_address_lots_listing() {
        let fake = Arc::new(FakeClient::new());
        fake.networking_address_lot_create(&AddressLotCreate {
            name: "uplink".to_string(),
            description: "rack uplinks".to_string(),
            kind: "infra".to_string(),
            blocks: vec![AddressLotBlockCreate {
                first_address: "198.51.100.1".to_string(),
                last_address: "198.51.100.10".to_string(),
            }],
        })
        .await
        .unwrap();

        let out = AddressLotsDataSource::new(fake)
            .read(json!({}))
            .await
            .unwrap();
        let lots = out["address_lots"].as_array().unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0]["kind"], "infra");
        assert_eq!(lots[0]["description"], "rack uplinks");
    }

    #[tokio::test]
    async fn test_floating_ip_missing_in_project() {
        let fake = Arc::new(FakeClient::new());
        let err = FloatingIpDataSource::new(fake)
            .read(json!({"project_name": "web", "name": "vip"}))
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Unable to read floating IP:");
    }
}
