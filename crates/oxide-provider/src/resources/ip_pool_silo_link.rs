//! `oxide_ip_pool_silo_link`

use super::Client;
use async_trait::async_trait;
use oxide_api::{IpPoolLinkSilo, IpPoolSiloLink, IsDefault, is_not_found};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub struct IpPoolSiloLinkResource {
    client: Client,
}

impl IpPoolSiloLinkResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct IpPoolSiloLinkModel {
    id: Option<String>,
    ip_pool_id: String,
    silo_id: Option<String>,
    is_default: bool,
}

impl IpPoolSiloLinkModel {
    fn observe(id: Option<String>, link: &IpPoolSiloLink) -> Self {
        Self {
            id: id.or_else(|| Some(uuid::Uuid::new_v4().to_string())),
            ip_pool_id: link.ip_pool_id.clone(),
            silo_id: Some(link.silo_id.clone()),
            is_default: link.is_default,
        }
    }

    fn silo(&self) -> Result<&str> {
        self.silo_id
            .as_deref()
            .ok_or_else(|| EngineError::internal("Missing silo ID", "state does not carry a silo_id"))
    }
}

/// The link to the recorded silo. An imported instance only knows its
/// pool, so a pool linked to exactly one silo resolves to that link.
fn find_link<'a>(silo: Option<&str>, links: &'a [IpPoolSiloLink]) -> Option<&'a IpPoolSiloLink> {
    match silo {
        Some(silo) => links.iter().find(|link| link.silo_id == silo),
        None if links.len() == 1 => links.first(),
        None => None,
    }
}

#[async_trait]
impl Resource for IpPoolSiloLinkResource {
    fn type_name(&self) -> &'static str {
        "oxide_ip_pool_silo_link"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages IP pool to silo links.")
            .attribute(
                Attribute::required("silo_id", AttributeType::String)
                    .description("ID of the silo to link the IP pool to.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("ip_pool_id", AttributeType::String)
                    .description("ID of the IP pool that will be linked to the silo.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("is_default", AttributeType::Bool).description(
                    "Whether this is the default IP pool for a silo. Only a single IP pool silo link can be marked as default",
                ),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the IP pool silo link.",
            ))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: IpPoolSiloLinkModel = decode(plan)?;
        let link = self
            .client
            .ip_pool_silo_link(
                &plan.ip_pool_id,
                &IpPoolLinkSilo {
                    silo: plan.silo()?.to_string(),
                    is_default: plan.is_default,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error creating IP pool silo link", e))?;
        // The remote link has no identifier of its own
        encode(&IpPoolSiloLinkModel::observe(None, &link))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: IpPoolSiloLinkModel = decode(state)?;
        let links = match self.client.ip_pool_silo_list(&state.ip_pool_id).await {
            Ok(links) => links,
            Err(e) if is_not_found(&e) => return Ok(ReadOutcome::Removed),
            Err(e) => return Err(EngineError::api("Unable to read links:", e)),
        };
        tracing::trace!("read IP pool links with ID: {}", state.ip_pool_id);
        let Some(link) = find_link(state.silo_id.as_deref(), &links) else {
            // An unlinked silo is gone; an imported pool we cannot resolve is an error
            if state.silo_id.is_some() {
                return Ok(ReadOutcome::Removed);
            }
            return Err(EngineError::Api {
                summary: "Missing resource".to_string(),
                detail: format!(
                    "Unable to find requested link between IP pool {} and silo {}",
                    state.ip_pool_id,
                    state.silo_id.as_deref().unwrap_or("<unknown>")
                ),
            });
        };
        Ok(ReadOutcome::Found(encode(&IpPoolSiloLinkModel::observe(
            state.id, link,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: IpPoolSiloLinkModel = decode(plan)?;
        let prior: IpPoolSiloLinkModel = decode(prior)?;
        let link = self
            .client
            .ip_pool_silo_update(
                &prior.ip_pool_id,
                prior.silo()?,
                &IsDefault {
                    is_default: plan.is_default,
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating link", e))?;
        encode(&IpPoolSiloLinkModel::observe(prior.id, &link))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: IpPoolSiloLinkModel = decode(state)?;
        match self
            .client
            .ip_pool_silo_unlink(&state.ip_pool_id, state.silo()?)
            .await
        {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if is_not_found(&e) => Ok(DeleteOutcome::Deleted),
            Err(e) => Err(EngineError::api("Error deleting link:", e)),
        }
    }

    async fn import(&self, id: &str) -> Result<Value> {
        Ok(json!({ "ip_pool_id": id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(silo: &str) -> IpPoolSiloLink {
        IpPoolSiloLink {
            ip_pool_id: "pool".to_string(),
            silo_id: silo.to_string(),
            is_default: false,
        }
    }

    #[test]
    fn test_find_link() {
        let links = vec![link("a"), link("b")];
        assert_eq!(find_link(Some("b"), &links).unwrap().silo_id, "b");
        assert!(find_link(Some("c"), &links).is_none());
        assert!(find_link(None, &links).is_none());
        assert_eq!(find_link(None, &links[..1]).unwrap().silo_id, "a");
    }
}
