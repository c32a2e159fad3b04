//! `oxide_silo_saml_identity_provider`
//!
//! Identity provider configuration is immutable and the remote offers no
//! delete, so deleting only drops the object from state.

use super::{Client, Stamps, found};
use async_trait::async_trait;
use oxide_api::{DerEncodedKeyPair, IdpMetadataSource, SamlIdentityProvider, SamlIdentityProviderCreate};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    AttrPath, Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource,
    Result, Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct SiloSamlIdentityProviderResource {
    client: Client,
}

impl SiloSamlIdentityProviderResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SamlIdpModel {
    #[serde(flatten)]
    stamps: Stamps,
    silo: String,
    name: String,
    description: String,
    acs_url: String,
    slo_url: String,
    idp_entity_id: String,
    sp_client_id: String,
    technical_contact_email: String,
    group_attribute_name: Option<String>,
    idp_metadata_source: MetadataSourceModel,
    signing_keypair: Option<KeypairModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct MetadataSourceModel {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct KeypairModel {
    private_key: String,
    public_cert: String,
}

impl MetadataSourceModel {
    fn to_api(&self) -> Result<IdpMetadataSource> {
        let missing = |field: &str| {
            EngineError::config(
                "Error creating SAML identity provider",
                format!("idp_metadata_source.{} is required when type is {:?}", field, self.kind),
            )
        };
        match self.kind.as_str() {
            "url" => Ok(IdpMetadataSource::Url {
                url: self.url.clone().ok_or_else(|| missing("url"))?,
            }),
            "base64_encoded_xml" => Ok(IdpMetadataSource::Base64EncodedXml {
                data: self.data.clone().ok_or_else(|| missing("data"))?,
            }),
            other => Err(EngineError::config(
                "Error creating SAML identity provider",
                format!("unsupported metadata source type {:?}", other),
            )),
        }
    }
}

impl SamlIdpModel {
    /// Configured-only attributes (`silo`, the metadata source and the
    /// keypair) are not reported back and carry over from `known`.
    fn observe(idp: &SamlIdentityProvider, known: SamlIdpModel) -> Self {
        Self {
            stamps: Stamps::of(&idp.identity),
            name: idp.identity.name.clone(),
            description: idp.identity.description.clone(),
            acs_url: idp.acs_url.clone(),
            slo_url: idp.slo_url.clone(),
            idp_entity_id: idp.idp_entity_id.clone(),
            sp_client_id: idp.sp_client_id.clone(),
            technical_contact_email: idp.technical_contact_email.clone(),
            group_attribute_name: idp
                .group_attribute_name
                .clone()
                .filter(|name| !name.is_empty()),
            ..known
        }
    }
}

#[async_trait]
impl Resource for SiloSamlIdentityProviderResource {
    fn type_name(&self) -> &'static str {
        "oxide_silo_saml_identity_provider"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages silo SAML identity providers.")
            .attribute(
                Attribute::required("silo", AttributeType::String)
                    .description("Name or ID of the silo."),
            )
            .attribute(
                Attribute::required("acs_url", AttributeType::String)
                    .description("URL where the identity provider should send the SAML response."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Free-form text describing the SAML identity provider."),
            )
            .attribute(
                Attribute::optional("group_attribute_name", AttributeType::String)
                    .description("SAML attribute that holds a user's group membership."),
            )
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the SAML identity provider.",
            ))
            .attribute(
                Attribute::required("idp_entity_id", AttributeType::String)
                    .description("Identity provider's entity ID."),
            )
            .attribute(
                Attribute::required(
                    "idp_metadata_source",
                    AttributeType::object(vec![
                        Attribute::required("type", AttributeType::String)
                            .description(
                                "The type of metadata source. Must be one of: `url`, `base64_encoded_xml`.",
                            )
                            .validator(Validator::one_of(["url", "base64_encoded_xml"])),
                        Attribute::optional("url", AttributeType::String)
                            .description(
                                "URL to fetch metadata from (required when type is `url`). Conflicts with `data`.",
                            )
                            .validator(Validator::conflicts_with(vec![AttrPath::sibling("data")])),
                        Attribute::optional("data", AttributeType::String)
                            .description(
                                "Base64-encoded XML metadata (required when type is `base64_encoded_xml`). Conflicts with `url`.",
                            )
                            .validator(Validator::conflicts_with(vec![AttrPath::sibling("url")])),
                    ]),
                )
                .description("Source of identity provider metadata (URL or base64-encoded XML)."),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description(
                        "Unique, immutable, user-controlled identifier of the SAML identity provider.",
                    )
                    .validator(Validator::length_at_most(63)),
            )
            .attribute(
                Attribute::optional(
                    "signing_keypair",
                    AttributeType::object(vec![
                        Attribute::required("private_key", AttributeType::String)
                            .description("RSA private key (base64 encoded).")
                            .sensitive(),
                        Attribute::required("public_cert", AttributeType::String)
                            .description("Public certificate (base64 encoded)."),
                    ]),
                )
                .description("RSA private key and public certificate for signing SAML requests."),
            )
            .attribute(
                Attribute::required("slo_url", AttributeType::String)
                    .description("URL where the identity provider should send logout requests."),
            )
            .attribute(
                Attribute::required("sp_client_id", AttributeType::String)
                    .description("Service provider's client ID."),
            )
            .attribute(
                Attribute::required("technical_contact_email", AttributeType::String)
                    .description("Technical contact email for SAML configuration."),
            )
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
            .attribute(Attribute::timeouts(&[Phase::Create, Phase::Read]))
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SamlIdpModel = decode(plan)?;
        let body = SamlIdentityProviderCreate {
            name: plan.name.clone(),
            description: plan.description.clone(),
            acs_url: plan.acs_url.clone(),
            idp_entity_id: plan.idp_entity_id.clone(),
            idp_metadata_source: plan.idp_metadata_source.to_api()?,
            slo_url: plan.slo_url.clone(),
            sp_client_id: plan.sp_client_id.clone(),
            technical_contact_email: plan.technical_contact_email.clone(),
            group_attribute_name: plan.group_attribute_name.clone(),
            signing_keypair: plan.signing_keypair.as_ref().map(|k| DerEncodedKeyPair {
                private_key: k.private_key.clone(),
                public_cert: k.public_cert.clone(),
            }),
        };
        let idp = self
            .client
            .saml_identity_provider_create(&plan.silo, &body)
            .await
            .map_err(|e| EngineError::api("Error creating SAML identity provider", e))?;
        tracing::trace!("created SAML identity provider with ID: {}", idp.identity.id);
        encode(&SamlIdpModel::observe(&idp, plan))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SamlIdpModel = decode(state)?;
        let Some(idp) = found(
            self.client
                .saml_identity_provider_view(state.stamps.id()?, None)
                .await,
            "Unable to read SAML identity provider:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(&SamlIdpModel::observe(
            &idp, state,
        ))?))
    }

    async fn update(&self, _plan: Value, _prior: Value) -> Result<Value> {
        Err(EngineError::unsupported(
            "The oxide_silo_saml_identity_provider resource does not support updates.",
            "This resource represents immutable silo SAML identity provider configuration. Please update your configuration to match the state.",
        ))
    }

    async fn delete(&self, _state: Value) -> Result<DeleteOutcome> {
        Ok(DeleteOutcome::Abandoned {
            summary: "The oxide_silo_saml_identity_provider resource does not support deletion."
                .to_string(),
            detail: "This resource represents immutable silo SAML identity provider configuration. The resource will be removed from state but not from Oxide.".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::FakeClient;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_metadata_source_variants() {
        let url = MetadataSourceModel {
            kind: "url".to_string(),
            url: Some("https://idp.example.com/metadata".to_string()),
            data: None,
        };
        assert_eq!(
            url.to_api().unwrap(),
            IdpMetadataSource::Url {
                url: "https://idp.example.com/metadata".to_string()
            }
        );

        let missing = MetadataSourceModel {
            kind: "base64_encoded_xml".to_string(),
            ..Default::default()
        };
        assert!(missing.to_api().unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_delete_abandons() {
        let resource = SiloSamlIdentityProviderResource::new(Arc::new(FakeClient::new()));
        let outcome = resource.delete(json!({"id": "idp-1"})).await.unwrap();
        assert!(matches!(outcome, DeleteOutcome::Abandoned { .. }));
    }
}
