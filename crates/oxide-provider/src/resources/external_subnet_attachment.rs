//! `oxide_external_subnet_attachment`
//!
//! The attachment shares the external subnet's id. Deleting it only
//! detaches when the subnet is still attached to the recorded instance,
//! so a subnet moved elsewhere is left alone.

use super::Client;
use async_trait::async_trait;
use oxide_api::{ExternalSubnet, ExternalSubnetAttach, is_not_found};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct ExternalSubnetAttachmentResource {
    client: Client,
}

impl ExternalSubnetAttachmentResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AttachmentModel {
    id: Option<String>,
    external_subnet_id: String,
    instance_id: String,
}

impl AttachmentModel {
    /// `None` when the subnet is not attached to anything
    fn observe(subnet: &ExternalSubnet) -> Option<Self> {
        let instance_id = subnet.instance_id.clone().filter(|id| !id.is_empty())?;
        Some(Self {
            id: Some(subnet.identity.id.clone()),
            external_subnet_id: subnet.identity.id.clone(),
            instance_id,
        })
    }

    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.external_subnet_id)
    }
}

#[async_trait]
impl Resource for ExternalSubnetAttachmentResource {
    fn type_name(&self) -> &'static str {
        "oxide_external_subnet_attachment"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages the attachment of an external subnet to an instance.")
            .attribute(
                Attribute::id()
                    .description("Unique identifier for the attachment. Set to the external subnet ID."),
            )
            .attribute(
                Attribute::required("external_subnet_id", AttributeType::String)
                    .description("ID of the external subnet to attach.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required("instance_id", AttributeType::String)
                    .description("ID of the instance to attach the external subnet to.")
                    .requires_replace(),
            )
            .attribute(Attribute::timeouts(&[Phase::Create, Phase::Read, Phase::Delete]))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: AttachmentModel = decode(plan)?;
        let subnet = self
            .client
            .external_subnet_attach(
                &plan.external_subnet_id,
                &ExternalSubnetAttach {
                    instance: plan.instance_id.clone(),
                },
            )
            .await
            .map_err(|e| EngineError::api("Error attaching external subnet", e))?;
        tracing::trace!(
            "attached external subnet {} to instance {:?}",
            subnet.identity.id,
            subnet.instance_id
        );
        let attachment = AttachmentModel::observe(&subnet).ok_or_else(|| {
            EngineError::internal(
                "Error attaching external subnet",
                format!("external subnet {} reports no instance after attach", subnet.identity.id),
            )
        })?;
        encode(&attachment)
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: AttachmentModel = decode(state)?;
        let subnet = match self.client.external_subnet_view(state.id()).await {
            Ok(subnet) => subnet,
            Err(e) if is_not_found(&e) => return Ok(ReadOutcome::Removed),
            Err(e) => {
                return Err(EngineError::api(
                    "Unable to read external subnet attachment:",
                    e,
                ));
            }
        };
        match AttachmentModel::observe(&subnet) {
            Some(attachment) => Ok(ReadOutcome::Found(encode(&attachment)?)),
            None => Ok(ReadOutcome::Removed),
        }
    }

    async fn update(&self, plan: Value, _prior: Value) -> Result<Value> {
        // Every attribute forces replacement
        Ok(plan)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: AttachmentModel = decode(state)?;
        let subnet = match self.client.external_subnet_view(state.id()).await {
            Ok(subnet) => subnet,
            Err(e) if is_not_found(&e) => return Ok(DeleteOutcome::Deleted),
            Err(e) => {
                return Err(EngineError::api(
                    "Error reading external subnet during delete:",
                    e,
                ));
            }
        };
        if subnet.instance_id.as_deref() != Some(state.instance_id.as_str()) {
            tracing::debug!(
                "external subnet {} is no longer attached to {}, skipping detach",
                state.id(),
                state.instance_id
            );
            return Ok(DeleteOutcome::Deleted);
        }
        match self.client.external_subnet_detach(state.id()).await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(EngineError::api("Error detaching external subnet:", e)),
        }
        tracing::trace!("detached external subnet with ID: {}", state.id());
        Ok(DeleteOutcome::Deleted)
    }
}
