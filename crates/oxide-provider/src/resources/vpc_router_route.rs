//! `oxide_vpc_router_route`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{RouteDestination, RouteTarget, RouterRoute, RouterRouteCreate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DESTINATION_TYPES: [&str; 4] = ["ip", "ip_net", "subnet", "vpc"];
const TARGET_TYPES: [&str; 6] = ["drop", "ip", "instance", "internet_gateway", "subnet", "vpc"];

pub struct VpcRouterRouteResource {
    client: Client,
}

impl VpcRouterRouteResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct VpcRouterRouteModel {
    #[serde(flatten)]
    stamps: Stamps,
    vpc_router_id: String,
    name: String,
    description: String,
    destination: Option<RouteDestination>,
    target: Option<RouteTarget>,
    kind: Option<String>,
}

impl VpcRouterRouteModel {
    fn body(self) -> Result<RouterRouteCreate> {
        let missing = |field: &str| {
            EngineError::config(
                "Invalid route",
                format!("{} must be set on a VPC router route", field),
            )
        };
        Ok(RouterRouteCreate {
            name: self.name,
            description: self.description,
            destination: self.destination.ok_or_else(|| missing("destination"))?,
            // A drop target carries no value
            target: self.target.ok_or_else(|| missing("target"))?,
        })
    }
}

impl From<&RouterRoute> for VpcRouterRouteModel {
    fn from(route: &RouterRoute) -> Self {
        Self {
            stamps: Stamps::of(&route.identity),
            vpc_router_id: route.vpc_router_id.clone(),
            name: route.identity.name.clone(),
            description: route.identity.description.clone(),
            destination: Some(route.destination.clone()),
            target: Some(route.target.clone()),
            kind: Some(route.kind.clone()),
        }
    }
}

#[async_trait]
impl Resource for VpcRouterRouteResource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_router_route"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages VPC router routes.")
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the VPC router route."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the VPC router route."),
            )
            .attribute(
                Attribute::required(
                    "destination",
                    AttributeType::object(vec![
                        Attribute::required("type", AttributeType::String)
                            .description("Route destination type. Possible values: `vpc`, `subnet`, `ip`, `ip_net`.")
                            .validator(Validator::one_of(DESTINATION_TYPES)),
                        Attribute::required("value", AttributeType::String).description(
                            "Name of the VPC or subnet, IP address or IP subnet, depending on the type.",
                        ),
                    ]),
                )
                .description("Selects which traffic this routing rule will apply to."),
            )
            .attribute(
                Attribute::required(
                    "target",
                    AttributeType::object(vec![
                        Attribute::required("type", AttributeType::String)
                            .description("Route target type. Possible values: `vpc`, `subnet`, `instance`, `ip`, `internet_gateway`, `drop`.")
                            .validator(Validator::one_of(TARGET_TYPES)),
                        Attribute::optional("value", AttributeType::String).description(
                            "Name of the VPC, subnet, instance or internet gateway, or an IP address, depending on the type.",
                        ),
                    ]),
                )
                .description("Location that matched packets should be forwarded to."),
            )
            .attribute(
                Attribute::required("vpc_router_id", AttributeType::String)
                    .description("ID of the VPC router that will contain the route.")
                    .requires_replace(),
            )
            .attribute(Attribute::id())
            .attribute(
                Attribute::computed("kind", AttributeType::String)
                    .description("Whether the VPC router route is custom or system created."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
            .attribute(Attribute::timeouts(&Phase::ALL))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: VpcRouterRouteModel = decode(plan)?;
        let router = plan.vpc_router_id.clone();
        let route = self
            .client
            .vpc_router_route_create(&router, &plan.body()?)
            .await
            .map_err(|e| EngineError::api("Error creating VPC router route", e))?;
        encode(&VpcRouterRouteModel::from(&route))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: VpcRouterRouteModel = decode(state)?;
        let Some(route) = found(
            self.client.vpc_router_route_view(state.stamps.id()?).await,
            "Unable to read VPC router route:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&VpcRouterRouteModel::from(
            &route,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: VpcRouterRouteModel = decode(plan)?;
        let prior: VpcRouterRouteModel = decode(prior)?;
        let route = self
            .client
            .vpc_router_route_update(prior.stamps.id()?, &plan.body()?)
            .await
            .map_err(|e| EngineError::api("Error updating VPC router route", e))?;
        encode(&VpcRouterRouteModel::from(&route))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: VpcRouterRouteModel = decode(state)?;
        deleted(
            self.client.vpc_router_route_delete(state.stamps.id()?).await,
            "Unable to delete VPC router route:",
        )
    }
}
