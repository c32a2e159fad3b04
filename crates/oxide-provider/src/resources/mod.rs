//! Managed resources
//!
//! One reconciliation engine per Oxide entity. Every engine holds the shared
//! API client handle and implements [`oxide_engine::Resource`].

pub mod address_lot;
pub mod anti_affinity_group;
pub mod disk;
pub mod external_subnet;
pub mod external_subnet_attachment;
pub mod floating_ip;
pub mod image;
pub mod instance;
pub mod ip_pool;
pub mod ip_pool_silo_link;
pub mod project;
pub mod silo;
pub mod silo_saml_identity_provider;
pub mod snapshot;
pub mod ssh_key;
pub mod subnet_pool;
pub mod subnet_pool_member;
pub mod subnet_pool_silo_link;
pub mod switch_port_settings;
pub mod vpc;
pub mod vpc_firewall_rules;
pub mod vpc_internet_gateway;
pub mod vpc_router;
pub mod vpc_router_route;
pub mod vpc_subnet;

use oxide_api::{ApiError, IdentityMetadata, OxideApi, is_not_found};
use oxide_engine::{DeleteOutcome, EngineError, Resource, Result, rfc3339};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Shared API client handle
pub type Client = Arc<dyn OxideApi>;

/// Every resource engine, bound to one client
pub fn all(client: &Client) -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(address_lot::AddressLotResource::new(client.clone())),
        Arc::new(anti_affinity_group::AntiAffinityGroupResource::new(
            client.clone(),
        )),
        Arc::new(disk::DiskResource::new(client.clone())),
        Arc::new(external_subnet::ExternalSubnetResource::new(client.clone())),
        Arc::new(
            external_subnet_attachment::ExternalSubnetAttachmentResource::new(client.clone()),
        ),
        Arc::new(floating_ip::FloatingIpResource::new(client.clone())),
        Arc::new(image::ImageResource::new(client.clone())),
        Arc::new(instance::InstanceResource::new(client.clone())),
        Arc::new(ip_pool::IpPoolResource::new(client.clone())),
        Arc::new(ip_pool_silo_link::IpPoolSiloLinkResource::new(client.clone())),
        Arc::new(project::ProjectResource::new(client.clone())),
        Arc::new(silo::SiloResource::new(client.clone())),
        Arc::new(
            silo_saml_identity_provider::SiloSamlIdentityProviderResource::new(client.clone()),
        ),
        Arc::new(snapshot::SnapshotResource::new(client.clone())),
        Arc::new(ssh_key::SshKeyResource::new(client.clone())),
        Arc::new(subnet_pool::SubnetPoolResource::new(client.clone())),
        Arc::new(subnet_pool_member::SubnetPoolMemberResource::new(
            client.clone(),
        )),
        Arc::new(subnet_pool_silo_link::SubnetPoolSiloLinkResource::new(
            client.clone(),
        )),
        Arc::new(switch_port_settings::SwitchPortSettingsResource::new(
            client.clone(),
        )),
        Arc::new(vpc::VpcResource::new(client.clone())),
        Arc::new(vpc_firewall_rules::VpcFirewallRulesResource::new(
            client.clone(),
        )),
        Arc::new(vpc_internet_gateway::VpcInternetGatewayResource::new(
            client.clone(),
        )),
        Arc::new(vpc_router::VpcRouterResource::new(client.clone())),
        Arc::new(vpc_router_route::VpcRouterRouteResource::new(client.clone())),
        Arc::new(vpc_subnet::VpcSubnetResource::new(client.clone())),
    ]
}

/// Computed identity attributes shared by most resources
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Stamps {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time_created: Option<String>,
    #[serde(default)]
    pub time_modified: Option<String>,
}

impl Stamps {
    pub fn of(identity: &IdentityMetadata) -> Self {
        Self {
            id: Some(identity.id.clone()),
            time_created: Some(rfc3339(&identity.time_created)),
            time_modified: Some(rfc3339(&identity.time_modified)),
        }
    }

    /// The recorded id; an instance without one cannot be addressed
    pub fn id(&self) -> Result<&str> {
        self.id.as_deref().ok_or_else(|| {
            EngineError::internal("Missing resource ID", "state does not carry an id")
        })
    }
}

/// A view result where not-found means the object is gone
pub(crate) fn found<T>(
    result: std::result::Result<T, ApiError>,
    summary: &str,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(EngineError::api(summary, e)),
    }
}

/// A delete result where not-found counts as success
pub(crate) fn deleted(
    result: std::result::Result<(), ApiError>,
    summary: &str,
) -> Result<DeleteOutcome> {
    match result {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) if is_not_found(&e) => {
            tracing::debug!("{}: already gone", summary);
            Ok(DeleteOutcome::Deleted)
        }
        Err(e) => Err(EngineError::api(summary, e)),
    }
}

/// Update for resources the remote cannot change in place. Every
/// configurable attribute forces replacement, so only a `timeouts` change
/// can arrive here: the prior State is kept and the driver records the new
/// budgets. Any other difference is refused.
pub(crate) fn keep_prior(kind: &str, plan: &Value, prior: Value) -> Result<Value> {
    let moved = plan
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(name, _)| name.as_str() != "timeouts")
        .find(|(name, value)| prior.get(name.as_str()) != Some(*value));
    match moved {
        None => Ok(prior),
        Some((name, _)) => Err(EngineError::unsupported(
            format!("Error updating {}", kind),
            format!(
                "the oxide API does not support updating {}; changing {} requires replacement",
                kind, name
            ),
        )),
    }
}

/// Empty collections are recorded as null so configs that omit them do
/// not drift.
pub(crate) fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stamps_use_response_time_modified() {
        let identity = IdentityMetadata {
            id: "p-1".to_string(),
            name: "p".to_string(),
            description: String::new(),
            time_created: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            time_modified: chrono::Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap(),
        };
        let stamps = Stamps::of(&identity);
        assert_eq!(stamps.time_created.as_deref(), Some("2024-05-01T12:00:00Z"));
        assert_eq!(stamps.time_modified.as_deref(), Some("2024-05-02T08:30:00Z"));
    }

    #[test]
    fn test_found_maps_not_found() {
        let gone: std::result::Result<(), ApiError> = Err(ApiError::NotFound("x".to_string()));
        assert!(found(gone, "Unable to read x").unwrap().is_none());

        let failed: std::result::Result<(), ApiError> = Err(ApiError::Http {
            status: 500,
            error_code: None,
            message: "boom".to_string(),
        });
        let err = found(failed, "Unable to read x").unwrap_err();
        assert_eq!(err.summary(), "Unable to read x");
    }

    #[test]
    fn test_deleted_tolerates_not_found() {
        let outcome = deleted(Err(ApiError::NotFound("x".to_string())), "Error deleting x");
        assert_eq!(outcome.unwrap(), DeleteOutcome::Deleted);
    }
}
