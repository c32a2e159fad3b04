//! `oxide_silo`
//!
//! Only `quotas` can change in place; it goes through the quotas
//! endpoints. TLS certificates are sent on create and never stored.

use super::{Client, Stamps, deleted, found};
use async_trait::async_trait;
use oxide_api::{CertificateCreate, Silo, SiloCreate, SiloQuotas, SiloQuotasCreate, SiloQuotasUpdate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

const NAME_PATTERN: &str = r"^[a-zA-Z0-9-]+$";
const NAME_MESSAGE: &str = "Names must begin with a lower case ASCII letter, be composed exclusively of lowercase ASCII, uppercase ASCII, numbers, and '-'.";
const FLEET_ROLES: [&str; 3] = ["admin", "collaborator", "viewer"];

pub struct SiloResource {
    client: Client,
}

impl SiloResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SiloModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
    admin_group_name: Option<String>,
    discoverable: bool,
    identity_mode: Option<String>,
    mapped_fleet_roles: Option<BTreeMap<String, Vec<String>>>,
    quotas: QuotasModel,
    tls_certificates: Option<Vec<CertificateModel>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct QuotasModel {
    cpus: i64,
    memory: i64,
    storage: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CertificateModel {
    name: String,
    description: String,
    cert: String,
    key: String,
    service: String,
}

impl From<&SiloQuotas> for QuotasModel {
    fn from(quotas: &SiloQuotas) -> Self {
        Self {
            cpus: quotas.cpus,
            memory: quotas.memory,
            storage: quotas.storage,
        }
    }
}

impl SiloModel {
    /// `admin_group_name` is not reported back and carries over.
    fn observe(silo: &Silo, quotas: &SiloQuotas, admin_group_name: Option<String>) -> Self {
        Self {
            stamps: Stamps::of(&silo.identity),
            name: silo.identity.name.clone(),
            description: silo.identity.description.clone(),
            admin_group_name,
            discoverable: silo.discoverable,
            identity_mode: Some(silo.identity_mode.clone()),
            mapped_fleet_roles: Some(silo.mapped_fleet_roles.clone()),
            quotas: QuotasModel::from(quotas),
            tls_certificates: None,
        }
    }

    fn body(self) -> SiloCreate {
        SiloCreate {
            name: self.name,
            description: self.description,
            admin_group_name: self.admin_group_name,
            discoverable: self.discoverable,
            identity_mode: self
                .identity_mode
                .unwrap_or_else(|| "local_only".to_string()),
            mapped_fleet_roles: self.mapped_fleet_roles.unwrap_or_default(),
            quotas: SiloQuotasCreate {
                cpus: self.quotas.cpus,
                memory: self.quotas.memory,
                storage: self.quotas.storage,
            },
            tls_certificates: self
                .tls_certificates
                .unwrap_or_default()
                .into_iter()
                .map(|c| CertificateCreate {
                    name: c.name,
                    description: c.description,
                    cert: c.cert,
                    key: c.key,
                    service: c.service,
                })
                .collect(),
        }
    }
}

impl SiloResource {
    async fn quotas(&self, silo: &str) -> Result<SiloQuotas> {
        self.client
            .silo_quotas_view(silo)
            .await
            .map_err(|e| EngineError::api("Unable to read silo quotas:", e))
    }
}

#[async_trait]
impl Resource for SiloResource {
    fn type_name(&self) -> &'static str {
        "oxide_silo"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages Oxide silos.")
            .attribute(
                Attribute::id()
                    .description("Unique, immutable, system-controlled identifier of the silo."),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Unique, immutable, user-controlled identifier of the silo.")
                    .requires_replace()
                    .validator(Validator::regex(NAME_PATTERN, NAME_MESSAGE))
                    .validator(Validator::length_at_most(63)),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Human-readable free-form text about the silo.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::required(
                    "quotas",
                    AttributeType::object(vec![
                        Attribute::required("cpus", AttributeType::Int64)
                            .description(
                                "Amount of virtual CPUs available for running instances in the silo.",
                            )
                            .validator(Validator::int_at_least(0)),
                        Attribute::required("memory", AttributeType::Int64).description(
                            "Amount of memory, in bytes, available for running instances in the silo.",
                        ),
                        Attribute::required("storage", AttributeType::Int64).description(
                            "Amount of storage, in bytes, available for disks or snapshots.",
                        ),
                    ]),
                )
                .description("Limits the amount of provisionable CPU, memory, and storage in the silo."),
            )
            .attribute(
                Attribute::required(
                    "tls_certificates",
                    AttributeType::list_of(AttributeType::object(vec![
                        Attribute::required("name", AttributeType::String)
                            .description(
                                "Unique, immutable, user-controlled identifier of the certificate.",
                            )
                            .write_only()
                            .validator(Validator::regex(NAME_PATTERN, NAME_MESSAGE))
                            .validator(Validator::length_at_most(63)),
                        Attribute::required("description", AttributeType::String)
                            .description("Human-readable free-form text about the certificate.")
                            .write_only(),
                        Attribute::required("cert", AttributeType::String)
                            .description("PEM-formatted string containing public certificate chain.")
                            .write_only(),
                        Attribute::required("key", AttributeType::String)
                            .description("PEM-formatted string containing private key.")
                            .write_only()
                            .sensitive(),
                        Attribute::required("service", AttributeType::String)
                            .description("Service using this certificate.")
                            .write_only()
                            .validator(Validator::one_of(["external_api"])),
                    ])),
                )
                .description(
                    "Initial TLS certificates to be used for the new silo's console and API endpoints.",
                )
                .write_only(),
            )
            .attribute(
                Attribute::required("discoverable", AttributeType::Bool)
                    .description("Whether this silo is present in the silo_list output.")
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional_computed("identity_mode", AttributeType::String)
                    .description("How users and groups are managed in the silo.")
                    .default_value(json!("local_only"))
                    .validator(Validator::one_of(["local_only", "saml_jit"]))
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional("admin_group_name", AttributeType::String)
                    .description(
                        "If set, this group will be created during Silo creation and granted the 'Silo Admin' role.",
                    )
                    .requires_replace(),
            )
            .attribute(
                Attribute::optional_computed(
                    "mapped_fleet_roles",
                    AttributeType::map_of(AttributeType::list_of(AttributeType::String)),
                )
                .description("Mapped Fleet Roles for the Silo.")
                .default_value(json!({}))
                .requires_replace()
                .validator(Validator::keys_one_of(FLEET_ROLES))
                .validator(Validator::values_one_of(FLEET_ROLES)),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
            .attribute(Attribute::timeouts(&Phase::ALL))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SiloModel = decode(plan)?;
        let admin_group_name = plan.admin_group_name.clone();
        let silo = self
            .client
            .silo_create(&plan.body())
            .await
            .map_err(|e| EngineError::api("Error creating silo", e))?;
        tracing::trace!("created silo with ID: {}", silo.identity.id);
        let quotas = self.quotas(&silo.identity.id).await?;
        encode(&SiloModel::observe(&silo, &quotas, admin_group_name))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SiloModel = decode(state)?;
        let Some(silo) = found(
            self.client.silo_view(state.stamps.id()?).await,
            "Unable to read Silo:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        let quotas = self.quotas(&silo.identity.id).await?;
        Ok(ReadOutcome::Found(encode(&SiloModel::observe(
            &silo,
            &quotas,
            state.admin_group_name,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: SiloModel = decode(plan)?;
        let prior: SiloModel = decode(prior)?;
        let id = prior.stamps.id()?;
        let quotas = self
            .client
            .silo_quotas_update(
                id,
                &SiloQuotasUpdate {
                    cpus: Some(plan.quotas.cpus),
                    memory: Some(plan.quotas.memory),
                    storage: Some(plan.quotas.storage),
                },
            )
            .await
            .map_err(|e| EngineError::api("Error updating silo quotas", e))?;
        tracing::trace!("updated silo with ID: {}", quotas.silo_id);
        let silo = self
            .client
            .silo_view(id)
            .await
            .map_err(|e| EngineError::api("Error updating silo quotas", e))?;
        encode(&SiloModel::observe(&silo, &quotas, plan.admin_group_name))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SiloModel = decode(state)?;
        deleted(
            self.client.silo_delete(state.stamps.id()?).await,
            "Error deleting silo:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults() {
        let model: SiloModel = serde_json::from_value(json!({
            "name": "tenant-a",
            "description": "a silo",
            "discoverable": true,
            "quotas": {"cpus": 8, "memory": 1024, "storage": 2048}
        }))
        .unwrap();
        let body = model.body();
        assert_eq!(body.identity_mode, "local_only");
        assert!(body.mapped_fleet_roles.is_empty());
        assert!(body.tls_certificates.is_empty());
        assert_eq!(body.quotas.cpus, 8);
    }
}
