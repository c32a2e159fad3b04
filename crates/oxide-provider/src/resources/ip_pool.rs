//! `oxide_ip_pool`
//!
//! Ranges are a sub-collection of the pool. They are converged with one
//! add or remove call per range before the pool itself is updated.

use super::{Client, Stamps, deleted, found, non_empty};
use async_trait::async_trait;
use oxide_api::{ApiError, IpPool, IpPoolCreate, IpRange, NameDescription, is_not_found};
use oxide_engine::resource::{decode, encode};
use oxide_engine::sequencer::{self, CollectionChanges, CompositeOps, StepFailure, StepKind};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, Ipv6Addr};

pub struct IpPoolResource {
    client: Client,
}

impl IpPoolResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct IpPoolModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
    ranges: Option<Vec<RangeModel>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct RangeModel {
    first_address: String,
    last_address: String,
}

impl RangeModel {
    /// The address family follows from the first address.
    fn to_api(&self) -> Result<IpRange> {
        let first = self.first_address.as_str();
        if first.parse::<Ipv4Addr>().is_err() && first.parse::<Ipv6Addr>().is_err() {
            return Err(EngineError::config(
                "Error creating range within IP Pool",
                format!("{} is neither a valid IPv4 or IPv6", first),
            ));
        }
        Ok(IpRange::new(first, self.last_address.as_str()))
    }
}

impl From<&IpRange> for RangeModel {
    fn from(range: &IpRange) -> Self {
        Self {
            first_address: range.first.clone(),
            last_address: range.last.clone(),
        }
    }
}

impl IpPoolModel {
    fn observe(pool: &IpPool, ranges: Option<Vec<RangeModel>>) -> Self {
        Self {
            stamps: Stamps::of(&pool.identity),
            name: pool.identity.name.clone(),
            description: pool.identity.description.clone(),
            ranges,
        }
    }

    fn ranges(&self) -> &[RangeModel] {
        self.ranges.as_deref().unwrap_or_default()
    }
}

/// Range calls against one pool
struct RangeOps<'a> {
    client: &'a Client,
    pool: &'a str,
}

#[async_trait]
impl CompositeOps<IpRange> for RangeOps<'_> {
    type Error = ApiError;

    async fn add(&self, range: &IpRange) -> std::result::Result<(), ApiError> {
        let added = self.client.ip_pool_range_add(self.pool, range).await?;
        tracing::trace!("added IP Pool range with ID: {}", added.id);
        Ok(())
    }

    async fn remove(&self, range: &IpRange) -> std::result::Result<(), ApiError> {
        self.client.ip_pool_range_remove(self.pool, range).await?;
        tracing::trace!(
            "removed IP pool range {} - {} from IP pool with ID: {}",
            range.first,
            range.last,
            self.pool
        );
        Ok(())
    }

    fn already_gone(&self, err: &ApiError) -> bool {
        is_not_found(err)
    }
}

fn step_error(failure: StepFailure<ApiError>) -> EngineError {
    match failure.kind {
        StepKind::Add => EngineError::api("Error creating range within IP Pool", failure.error),
        StepKind::Remove => EngineError::api("Error deleting IP Pool range:", failure.error),
    }
}

fn to_api(ranges: &[RangeModel]) -> Result<Vec<IpRange>> {
    ranges.iter().map(RangeModel::to_api).collect()
}

impl IpPoolResource {
    async fn observed_ranges(&self, pool: &str) -> Result<Option<Vec<RangeModel>>> {
        let ranges = self
            .client
            .ip_pool_range_list(pool)
            .await
            .map_err(|e| EngineError::api("Unable to read IP Pool ranges:", e))?;
        tracing::trace!("read all IP pool ranges from IP pool with ID: {}", pool);
        Ok(non_empty(
            ranges.iter().map(|r| RangeModel::from(&r.range)).collect(),
        ))
    }
}

#[async_trait]
impl Resource for IpPoolResource {
    fn type_name(&self) -> &'static str {
        "oxide_ip_pool"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages IP pools.")
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the IP Pool."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Description for the IP Pool."),
            )
            .attribute(
                Attribute::optional(
                    "ranges",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::required("first_address", AttributeType::String)
                            .description("First address in the range"),
                        Attribute::required("last_address", AttributeType::String)
                            .description("Last address in the range"),
                    ])),
                )
                .description("Adds IP ranges to the created IP pool."),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(
                Attribute::id()
                    .description("Unique, immutable, system-controlled identifier of the IP Pool."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: IpPoolModel = decode(plan)?;
        let ranges = to_api(plan.ranges())?;
        let pool = self
            .client
            .ip_pool_create(&IpPoolCreate {
                name: plan.name.clone(),
                description: plan.description.clone(),
            })
            .await
            .map_err(|e| EngineError::api("Error creating IP Pool", e))?;

        // Ranges are added in declared order; a failure leaves the pool in
        // place for the next run to converge.
        let ops = RangeOps {
            client: &self.client,
            pool: &pool.identity.id,
        };
        sequencer::apply(
            &ops,
            CollectionChanges {
                additions: ranges,
                removals: Vec::new(),
            },
        )
        .await
        .map_err(step_error)?;

        encode(&IpPoolModel::observe(&pool, plan.ranges))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: IpPoolModel = decode(state)?;
        let Some(pool) = found(
            self.client.ip_pool_view(state.stamps.id()?).await,
            "Unable to read IP Pool:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        let ranges = self.observed_ranges(&pool.identity.id).await?;
        Ok(ReadOutcome::Found(encode(&IpPoolModel::observe(
            &pool, ranges,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: IpPoolModel = decode(plan)?;
        let prior: IpPoolModel = decode(prior)?;
        let id = prior.stamps.id()?;

        let changes = CollectionChanges::between(&to_api(prior.ranges())?, &to_api(plan.ranges())?);
        let ops = RangeOps {
            client: &self.client,
            pool: id,
        };
        sequencer::apply(&ops, changes).await.map_err(step_error)?;

        let pool = self
            .client
            .ip_pool_update(
                id,
                &NameDescription {
                    name: plan.name.clone(),
                    description: plan.description.clone(),
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating IP Pool", e))?;
        encode(&IpPoolModel::observe(&pool, plan.ranges))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: IpPoolModel = decode(state)?;
        let id = state.stamps.id()?;

        // The remote refuses to delete a pool that still holds ranges
        let remaining = match self.client.ip_pool_range_list(id).await {
            Ok(ranges) => ranges,
            Err(e) if is_not_found(&e) => Vec::new(),
            Err(e) => return Err(EngineError::api("Error retrieving IP Pool ranges:", e)),
        };
        let ops = RangeOps {
            client: &self.client,
            pool: id,
        };
        sequencer::apply(
            &ops,
            CollectionChanges {
                additions: Vec::new(),
                removals: remaining.into_iter().map(|r| r.range).collect(),
            },
        )
        .await
        .map_err(step_error)?;

        deleted(self.client.ip_pool_delete(id).await, "Error deleting IP Pool:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_family_from_first_address() {
        let v4 = RangeModel {
            first_address: "172.20.15.227".to_string(),
            last_address: "172.20.15.230".to_string(),
        };
        assert_eq!(v4.to_api().unwrap(), IpRange::new("172.20.15.227", "172.20.15.230"));

        let v6 = RangeModel {
            first_address: "fd00::1".to_string(),
            last_address: "fd00::ff".to_string(),
        };
        assert!(v6.to_api().is_ok());

        let bad = RangeModel {
            first_address: "not-an-ip".to_string(),
            last_address: "10.0.0.1".to_string(),
        };
        let err = bad.to_api().unwrap_err();
        assert_eq!(err.detail(), "not-an-ip is neither a valid IPv4 or IPv6");
    }
}
