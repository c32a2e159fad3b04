//! `oxide_external_subnet`

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{
    ExternalSubnet, ExternalSubnetAllocator, ExternalSubnetCreate, IpVersion, NameDescription,
    PoolSelector,
};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    AttrPath, Attribute, AttributeType, ConfigValidator, DeleteOutcome, EngineError, Phase,
    ReadOutcome, Resource, Result, Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct ExternalSubnetResource {
    client: Client,
}

impl ExternalSubnetResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ExternalSubnetModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    subnet: Option<String>,
    prefix_len: Option<i64>,
    subnet_pool_id: Option<String>,
    ip_version: Option<String>,
    subnet_pool_member_id: Option<String>,
    instance_id: Option<String>,
}

impl ExternalSubnetModel {
    fn allocator(&self) -> Result<ExternalSubnetAllocator> {
        if let Some(subnet) = &self.subnet {
            // The pool is inferred from the CIDR
            return Ok(ExternalSubnetAllocator::Explicit {
                subnet: subnet.clone(),
            });
        }
        let prefix_len = self.prefix_len.ok_or_else(|| {
            EngineError::config(
                "Error creating external subnet",
                "one of `subnet` or `prefix_len` must be set",
            )
        })?;
        let pool_selector = match &self.subnet_pool_id {
            Some(pool) => PoolSelector::Explicit { pool: pool.clone() },
            None => PoolSelector::Auto {
                ip_version: self.ip_version.as_deref().and_then(IpVersion::parse),
            },
        };
        Ok(ExternalSubnetAllocator::Auto {
            prefix_len,
            pool_selector,
        })
    }

    /// `prefix_len` and `ip_version` only steer allocation and carry over.
    fn observe(subnet: &ExternalSubnet, configured: &ExternalSubnetModel) -> Self {
        Self {
            stamps: Stamps::of(&subnet.identity),
            project_id: subnet.project_id.clone(),
            name: subnet.identity.name.clone(),
            description: subnet.identity.description.clone(),
            subnet: Some(subnet.subnet.clone()),
            prefix_len: configured.prefix_len,
            subnet_pool_id: Some(subnet.subnet_pool_id.clone()),
            ip_version: configured.ip_version.clone(),
            subnet_pool_member_id: Some(subnet.subnet_pool_member_id.clone()),
            instance_id: subnet.instance_id.clone(),
        }
    }
}

#[async_trait]
impl Resource for ExternalSubnetResource {
    fn type_name(&self) -> &'static str {
        "oxide_external_subnet"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages external subnets allocated from subnet pools.")
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the external subnet.",
            ))
            .attribute(
                Attribute::required("name", AttributeType::String).description(
                    "Unique, mutable, user-controlled identifier for the external subnet.",
                ),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Human-readable free-form text about the external subnet."),
            )
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .description("Project ID where this external subnet is located.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional_computed("subnet", AttributeType::Cidr)
                    .description(
                        "The subnet CIDR to reserve. Must be available in the pool. Conflicts with `prefix_len`. If unset, a subnet will be automatically allocated with the specified `prefix_len`.",
                    )
                    .requires_replace_if_configured()
                    .use_state_for_unknown()
                    .validator(Validator::conflicts_with(vec![
                        AttrPath::root("prefix_len"),
                        AttrPath::root("subnet_pool_id"),
                        AttrPath::root("ip_version"),
                    ])),
            )
            .attribute(
                Attribute::optional("prefix_len", AttributeType::Int64)
                    .description(
                        "The prefix length for automatic subnet allocation (e.g., 24 for a /24). Conflicts with `subnet`. Required when using automatic allocation.",
                    )
                    .requires_replace()
                    .validator(Validator::conflicts_with(vec![AttrPath::root("subnet")]))
                    .validator(Validator::int_between(1, 128)),
            )
            .attribute(
                Attribute::optional_computed("subnet_pool_id", AttributeType::String)
                    .description(
                        "Subnet pool ID to allocate from. If unset when using automatic allocation (`prefix_len`), the silo's default subnet pool is used. Conflicts with `subnet`.",
                    )
                    .requires_replace_if_configured()
                    .use_state_for_unknown()
                    .validator(Validator::conflicts_with(vec![AttrPath::root("subnet")])),
            )
            .attribute(
                Attribute::optional("ip_version", AttributeType::String)
                    .description(
                        "IP version to use when multiple default pools exist. Required if both IPv4 and IPv6 default subnet pools are configured for the silo. Possible values: `v4`, `v6`. Conflicts with `subnet`.",
                    )
                    .requires_replace()
                    .validator(Validator::conflicts_with(vec![AttrPath::root("subnet")]))
                    .validator(Validator::one_of(["v4", "v6"])),
            )
            .attribute(
                Attribute::computed("subnet_pool_member_id", AttributeType::String)
                    .description("The subnet pool member this subnet was allocated from."),
            )
            .attribute(
                Attribute::computed("instance_id", AttributeType::String)
                    .description("Instance ID this external subnet is attached to, if any."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
            .attribute(Attribute::timeouts(&Phase::ALL))
    }

    fn config_validators(&self) -> Vec<ConfigValidator> {
        vec![ConfigValidator::ExactlyOneOf(vec![
            "subnet".to_string(),
            "prefix_len".to_string(),
        ])]
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: ExternalSubnetModel = decode(plan)?;
        let subnet = self
            .client
            .external_subnet_create(
                &plan.project_id,
                &ExternalSubnetCreate {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    allocator: plan.allocator()?,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating external subnet", e))?;
        tracing::trace!("created external subnet with ID: {}", subnet.identity.id);
        encode(&ExternalSubnetModel::observe(&subnet, &plan))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: ExternalSubnetModel = decode(state)?;
        let Some(subnet) = found(
            self.client.external_subnet_view(state.stamps.id()?).await,
            "Unable to read external subnet:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&ExternalSubnetModel::observe(
            &subnet, &state,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: ExternalSubnetModel = decode(plan)?;
        let prior: ExternalSubnetModel = decode(prior)?;
        let subnet = self
            .client
            .external_subnet_update(
                prior.stamps.id()?,
                &NameDescription {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                },
            )
            .await
            .map_err(|e| EngineError::api("Unable to update external subnet:", e))?;
        encode(&ExternalSubnetModel::observe(&subnet, &plan))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: ExternalSubnetModel = decode(state)?;
        deleted(
            self.client.external_subnet_delete(state.stamps.id()?).await,
            "Error deleting external subnet:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_subnet_wins() {
        let model = ExternalSubnetModel {
            subnet: Some("192.0.2.0/28".to_string()),
            prefix_len: Some(24),
            ..Default::default()
        };
        assert_eq!(
            model.allocator().unwrap(),
            ExternalSubnetAllocator::Explicit {
                subnet: "192.0.2.0/28".to_string()
            }
        );
    }

    #[test]
    fn test_auto_allocation_selects_pool() {
        let from_pool = ExternalSubnetModel {
            prefix_len: Some(26),
            subnet_pool_id: Some("pool".to_string()),
            ..Default::default()
        };
        assert_eq!(
            from_pool.allocator().unwrap(),
            ExternalSubnetAllocator::Auto {
                prefix_len: 26,
                pool_selector: PoolSelector::Explicit {
                    pool: "pool".to_string()
                }
            }
        );

        let by_version = ExternalSubnetModel {
            prefix_len: Some(64),
            ip_version: Some("v6".to_string()),
            ..Default::default()
        };
        assert_eq!(
            by_version.allocator().unwrap(),
            ExternalSubnetAllocator::Auto {
                prefix_len: 64,
                pool_selector: PoolSelector::Auto {
                    ip_version: Some(IpVersion::V6)
                }
            }
        );

        assert!(ExternalSubnetModel::default().allocator().unwrap_err().is_config());
    }
}
