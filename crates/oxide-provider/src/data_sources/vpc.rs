//! VPC data sources
//!
//! `oxide_vpc`, `oxide_vpc_subnet`, `oxide_vpc_router`,
//! `oxide_vpc_router_route` and `oxide_vpc_internet_gateway`. Each one
//! resolves a name inside the named project and VPC.

use super::{identity, read_timeouts, resolved, typed_value, with_identity};
use crate::resources::Client;
use async_trait::async_trait;
use oxide_engine::resource::decode;
use oxide_engine::{Attribute, AttributeType, DataSource, EngineError, Result, Schema};
use serde::Deserialize;
use serde_json::{Value, json};

fn name(kind: &str) -> Attribute {
    Attribute::required("name", AttributeType::String).description(format!("Name of the {}.", kind))
}

fn project_name(kind: &str) -> Attribute {
    Attribute::required("project_name", AttributeType::String)
        .description(format!("Name of the project that contains the {}.", kind))
}

fn vpc_name(kind: &str) -> Attribute {
    Attribute::required("vpc_name", AttributeType::String)
        .description(format!("Name of the VPC that contains the {}.", kind))
}

fn computed(name: &str, description: &str) -> Attribute {
    Attribute::computed(name, AttributeType::String).description(description)
}

#[derive(Debug, Deserialize)]
struct InProject {
    project_name: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct InVpc {
    project_name: String,
    vpc_name: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct InRouter {
    project_name: String,
    vpc_name: String,
    vpc_router_name: String,
    name: String,
}

pub struct VpcDataSource {
    client: Client,
}

impl VpcDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for VpcDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified VPC.")
                .attribute(project_name("VPC"))
                .attribute(name("VPC"))
                .attribute(read_timeouts())
                .attribute(computed("project_id", "ID of the project that contains the VPC."))
                .attribute(computed("dns_name", "DNS name of the VPC."))
                .attribute(computed(
                    "ipv6_prefix",
                    "All IPv6 subnets created from this VPC must be taken from this range, which should be a unique local address in the range `fd00::/48`.",
                ))
                .attribute(computed(
                    "system_router_id",
                    "ID of the system router of the VPC.",
                )),
            "VPC",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InProject = decode(config.clone())?;
        let vpc = self
            .client
            .vpc_view(&lookup.name, Some(&lookup.project_name))
            .await
            .map_err(|e| EngineError::api("Unable to read VPC:", e))?;
        tracing::trace!("read VPC with ID: {}", vpc.identity.id);

        let mut fields = identity(&vpc.identity);
        fields["project_id"] = json!(vpc.project_id);
        fields["dns_name"] = json!(vpc.dns_name);
        fields["ipv6_prefix"] = json!(vpc.ipv6_prefix);
        fields["system_router_id"] = json!(vpc.system_router_id);
        Ok(resolved(config, fields))
    }
}

pub struct VpcSubnetDataSource {
    client: Client,
}

impl VpcSubnetDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for VpcSubnetDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_subnet"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified VPC subnet.")
                .attribute(project_name("VPC subnet"))
                .attribute(vpc_name("VPC subnet"))
                .attribute(name("VPC subnet"))
                .attribute(read_timeouts())
                .attribute(computed("vpc_id", "ID of the VPC that contains the subnet."))
                .attribute(computed("ipv4_block", "IPv4 address range for this VPC subnet."))
                .attribute(computed("ipv6_block", "IPv6 address range for this VPC subnet.")),
            "VPC subnet",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InVpc = decode(config.clone())?;
        let subnet = self
            .client
            .vpc_subnet_lookup(&lookup.name, &lookup.vpc_name, &lookup.project_name)
            .await
            .map_err(|e| EngineError::api("Unable to read VPC subnet:", e))?;
        tracing::trace!("read VPC subnet with ID: {}", subnet.identity.id);

        let mut fields = identity(&subnet.identity);
        fields["vpc_id"] = json!(subnet.vpc_id);
        fields["ipv4_block"] = json!(subnet.ipv4_block);
        fields["ipv6_block"] = json!(subnet.ipv6_block);
        Ok(resolved(config, fields))
    }
}

pub struct VpcRouterDataSource {
    client: Client,
}

impl VpcRouterDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for VpcRouterDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_router"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified VPC router.")
                .attribute(project_name("VPC router"))
                .attribute(vpc_name("VPC router"))
                .attribute(name("VPC router"))
                .attribute(read_timeouts())
                .attribute(computed("vpc_id", "ID of the VPC that contains the router."))
                .attribute(computed(
                    "kind",
                    "Whether the VPC router is custom or system created.",
                )),
            "VPC router",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InVpc = decode(config.clone())?;
        let router = self
            .client
            .vpc_router_lookup(&lookup.name, &lookup.vpc_name, &lookup.project_name)
            .await
            .map_err(|e| EngineError::api("Unable to read VPC router:", e))?;
        tracing::trace!("read VPC router with ID: {}", router.identity.id);

        let mut fields = identity(&router.identity);
        fields["vpc_id"] = json!(router.vpc_id);
        fields["kind"] = json!(router.kind);
        Ok(resolved(config, fields))
    }
}

pub struct VpcRouterRouteDataSource {
    client: Client,
}

impl VpcRouterRouteDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for VpcRouterRouteDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_router_route"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified VPC router route.")
                .attribute(project_name("VPC router route"))
                .attribute(vpc_name("VPC router route"))
                .attribute(
                    Attribute::required("vpc_router_name", AttributeType::String)
                        .description("Name of the VPC router that contains the route."),
                )
                .attribute(name("VPC router route"))
                .attribute(read_timeouts())
                .attribute(computed(
                    "vpc_router_id",
                    "ID of the VPC router that contains the route.",
                ))
                .attribute(computed(
                    "kind",
                    "Whether the route is user-managed or provided by the system.",
                ))
                .attribute(
                    Attribute::computed("destination", typed_value("Route destination"))
                        .description("Selects which traffic this routing rule will apply to."),
                )
                .attribute(
                    Attribute::computed("target", typed_value("Route target")).description(
                        "Location that matched packets should be forwarded to. The value is null for `drop` targets.",
                    ),
                ),
            "VPC router route",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InRouter = decode(config.clone())?;
        let route = self
            .client
            .vpc_router_route_lookup(
                &lookup.name,
                &lookup.vpc_router_name,
                &lookup.vpc_name,
                &lookup.project_name,
            )
            .await
            .map_err(|e| EngineError::api("Unable to read VPC router route:", e))?;
        tracing::trace!("read VPC router route with ID: {}", route.identity.id);

        let mut fields = identity(&route.identity);
        fields["vpc_router_id"] = json!(route.vpc_router_id);
        fields["kind"] = json!(route.kind);
        fields["destination"] =
            json!({"type": route.destination.kind, "value": route.destination.value});
        fields["target"] = json!({"type": route.target.kind, "value": route.target.value});
        Ok(resolved(config, fields))
    }
}

pub struct VpcInternetGatewayDataSource {
    client: Client,
}

impl VpcInternetGatewayDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for VpcInternetGatewayDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_internet_gateway"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified VPC internet gateway.")
                .attribute(project_name("VPC internet gateway"))
                .attribute(vpc_name("VPC internet gateway"))
                .attribute(name("VPC internet gateway"))
                .attribute(read_timeouts())
                .attribute(computed(
                    "vpc_id",
                    "ID of the VPC that contains the internet gateway.",
                )),
            "VPC internet gateway",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: InVpc = decode(config.clone())?;
        let gateway = self
            .client
            .internet_gateway_lookup(&lookup.name, &lookup.vpc_name, &lookup.project_name)
            .await
            .map_err(|e| EngineError::api("Unable to read VPC internet gateway:", e))?;
        tracing::trace!("read VPC internet gateway with ID: {}", gateway.identity.id);

        let mut fields = identity(&gateway.identity);
        fields["vpc_id"] = json!(gateway.vpc_id);
        Ok(resolved(config, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::{
        FakeClient, NameDescription, OxideApi, ProjectCreate, RouteDestination, RouteTarget,
        RouterRouteCreate,
    };
    use std::sync::Arc;

    async fn project(fake: &FakeClient, name: &str) -> String {
        fake.project_create(&ProjectCreate {
            name: name.to_string(),
            description: String::new(),
        })
        .await
        .unwrap()
        .identity
        .id
    }

    #[tokio::test]
    async fn test_default_network_by_name() {
        let fake = Arc::new(FakeClient::new());
        let project_id = project(&fake, "web").await;

        let vpc = VpcDataSource::new(fake.clone())
            .read(json!({"project_name": "web", "name": "default"}))
            .await
            .unwrap();
        assert_eq!(vpc["project_id"], project_id.as_str());
        assert_eq!(vpc["project_name"], "web");

        let subnet = VpcSubnetDataSource::new(fake.clone())
            .read(json!({"project_name": "web", "vpc_name": "default", "name": "default"}))
            .await
            .unwrap();
        assert_eq!(subnet["vpc_id"], vpc["id"]);
        assert_eq!(subnet["ipv4_block"], "172.30.0.0/22");

        let router = VpcRouterDataSource::new(fake.clone())
            .read(json!({"project_name": "web", "vpc_name": "default", "name": "system"}))
            .await
            .unwrap();
        assert_eq!(router["id"], vpc["system_router_id"]);
        assert_eq!(router["kind"], "system");
    }

    #[tokio::test]
    async fn test_route_in_router_scope() {
        let fake = Arc::new(FakeClient::new());
        project(&fake, "web").await;
        let vpc = fake.vpc_view("default", Some("web")).await.unwrap();
        let router = fake
            .vpc_router_create(
                &vpc.identity.id,
                &NameDescription {
                    name: "edge".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        fake.vpc_router_route_create(
            &router.identity.id,
            &RouterRouteCreate {
                name: "blackhole".to_string(),
                description: String::new(),
                destination: RouteDestination {
                    kind: "ip_net".to_string(),
                    value: "10.0.0.0/8".to_string(),
                },
                target: RouteTarget {
                    kind: "drop".to_string(),
                    value: None,
                },
            },
        )
        .await
        .unwrap();

        let source = VpcRouterRouteDataSource::new(fake.clone());
        let route = source
            .read(json!({
                "project_name": "web",
                "vpc_name": "default",
                "vpc_router_name": "edge",
                "name": "blackhole"
            }))
            .await
            .unwrap();
        assert_eq!(route["vpc_router_id"], router.identity.id.as_str());
        assert_eq!(route["target"], json!({"type": "drop", "value": null}));

        let err = source
            .read(json!({
                "project_name": "web",
                "vpc_name": "default",
                "vpc_router_name": "system",
                "name": "blackhole"
            }))
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Unable to read VPC router route:");
    }
}
