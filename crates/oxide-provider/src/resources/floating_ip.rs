//! `oxide_floating_ip`
//!
//! The address allocator is derived from which of `ip`, `ip_pool_id` and
//! `ip_version` is configured; the three are mutually exclusive.

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{
    AddressAllocator, FloatingIp, FloatingIpCreate, IpVersion, NameDescription, PoolSelector,
};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    AttrPath, Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource,
    Result, Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct FloatingIpResource {
    client: Client,
}

impl FloatingIpResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FloatingIpModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    ip: Option<String>,
    ip_pool_id: Option<String>,
    ip_version: Option<String>,
    instance_id: Option<String>,
}

impl FloatingIpModel {
    fn allocator(&self) -> Result<AddressAllocator> {
        if let Some(ip) = &self.ip {
            // The pool is inferred from the address
            return Ok(AddressAllocator::Explicit {
                ip: ip.clone(),
                pool: None,
            });
        }
        if let Some(pool) = &self.ip_pool_id {
            return Ok(AddressAllocator::Auto {
                pool_selector: PoolSelector::Explicit { pool: pool.clone() },
            });
        }
        let ip_version = match self.ip_version.as_deref() {
            None | Some("") => None,
            Some(version) => Some(IpVersion::parse(version).ok_or_else(|| {
                EngineError::config(
                    "Error creating floating IP:",
                    format!("unsupported IP version {:?}", version),
                )
            })?),
        };
        Ok(AddressAllocator::Auto {
            pool_selector: PoolSelector::Auto { ip_version },
        })
    }

    /// `ip_version` is not reported by the remote and carries over.
    fn observe(floating_ip: &FloatingIp, ip_version: Option<String>) -> Self {
        Self {
            stamps: Stamps::of(&floating_ip.identity),
            project_id: floating_ip.project_id.clone(),
            name: floating_ip.identity.name.clone(),
            description: floating_ip.identity.description.clone(),
            ip: Some(floating_ip.ip.clone()),
            ip_pool_id: Some(floating_ip.ip_pool_id.clone()),
            ip_version,
            instance_id: floating_ip.instance_id.clone(),
        }
    }
}

#[async_trait]
impl Resource for FloatingIpResource {
    fn type_name(&self) -> &'static str {
        "oxide_floating_ip"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages Oxide floating IPs.")
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier for the floating IP.",
            ))
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Unique, mutable, user-controlled identifier for the floating IP."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Human-readable free-form text about the floating IP."),
            )
            .attribute(
                Attribute::computed("instance_id", AttributeType::String).description(
                    "Instance ID that this floating IP is attached to, if presently attached.",
                ),
            )
            .attribute(
                Attribute::optional_computed("ip", AttributeType::String)
                    .description(
                        "IP address for this floating IP. If unset an IP address will be chosen from the given `ip_pool_id`.",
                    )
                    .requires_replace_if_configured()
                    .validator(Validator::conflicts_with(vec![
                        AttrPath::root("ip_pool_id"),
                        AttrPath::root("ip_version"),
                    ])),
            )
            .attribute(
                Attribute::optional_computed("ip_pool_id", AttributeType::String)
                    .description(
                        "IP pool ID to allocate this floating IP from. If unset the silo's default IP pool is used.",
                    )
                    .requires_replace_if_configured()
                    .validator(Validator::conflicts_with(vec![
                        AttrPath::root("ip"),
                        AttrPath::root("ip_version"),
                    ])),
            )
            .attribute(
                Attribute::optional_computed("ip_version", AttributeType::String)
                    .description(
                        "IP version to use when multiple default pools exist. Required if both IPv4 and IPv6 default pools are configured. Possible values: `v4`, `v6`.",
                    )
                    .requires_replace_if_configured()
                    .validator(Validator::conflicts_with(vec![
                        AttrPath::root("ip_pool_id"),
                        AttrPath::root("ip"),
                    ]))
                    .validator(Validator::one_of(["v4", "v6"])),
            )
            .attribute(
                Attribute::required("project_id", AttributeType::String)
                    .description("Project ID where this floating IP is located.")
                    .requires_replace(),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
            .attribute(Attribute::timeouts(&Phase::ALL))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: FloatingIpModel = decode(plan)?;
        let floating_ip = self
            .client
            .floating_ip_create(
                &plan.project_id,
                &FloatingIpCreate {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                    address_allocator: plan.allocator()?,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating floating IP:", e))?;
        encode(&FloatingIpModel::observe(&floating_ip, plan.ip_version))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: FloatingIpModel = decode(state)?;
        let Some(floating_ip) = found(
            self.client.floating_ip_view(state.stamps.id()?).await,
            "Unable to read floating IP:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&FloatingIpModel::observe(
            &floating_ip,
            state.ip_version,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: FloatingIpModel = decode(plan)?;
        let prior: FloatingIpModel = decode(prior)?;
        let floating_ip = self
            .client
            .floating_ip_update(
                prior.stamps.id()?,
                &NameDescription {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                },
            )
            .await
            .map_err(|e| EngineError::api("Unable to update floating IP:", e))?;
        encode(&FloatingIpModel::observe(&floating_ip, plan.ip_version))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: FloatingIpModel = decode(state)?;
        deleted(
            self.client.floating_ip_delete(state.stamps.id()?).await,
            "Unable to delete floating IP:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_from_configured_attribute() {
        let explicit = FloatingIpModel {
            ip: Some("10.0.0.5".to_string()),
            ..Default::default()
        };
        assert_eq!(
            explicit.allocator().unwrap(),
            AddressAllocator::Explicit {
                ip: "10.0.0.5".to_string(),
                pool: None
            }
        );

        let pooled = FloatingIpModel {
            ip_pool_id: Some("pool".to_string()),
            ..Default::default()
        };
        assert_eq!(
            pooled.allocator().unwrap(),
            AddressAllocator::Auto {
                pool_selector: PoolSelector::Explicit {
                    pool: "pool".to_string()
                }
            }
        );

        let v6 = FloatingIpModel {
            ip_version: Some("v6".to_string()),
            ..Default::default()
        };
        assert_eq!(
            v6.allocator().unwrap(),
            AddressAllocator::Auto {
                pool_selector: PoolSelector::Auto {
                    ip_version: Some(IpVersion::V6)
                }
            }
        );

        assert_eq!(
            FloatingIpModel::default().allocator().unwrap(),
            AddressAllocator::Auto {
                pool_selector: PoolSelector::Auto { ip_version: None }
            }
        );
    }
}
