//! `oxide_silo`

use super::{ByName, identity, read_timeouts, resolved, with_identity};
use crate::resources::Client;
use async_trait::async_trait;
use oxide_engine::resource::decode;
use oxide_engine::{Attribute, AttributeType, DataSource, EngineError, Result, Schema};
use serde_json::{Value, json};

pub struct SiloDataSource {
    client: Client,
}

impl SiloDataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for SiloDataSource {
    fn type_name(&self) -> &'static str {
        "oxide_silo"
    }

    fn schema(&self) -> Schema {
        with_identity(
            Schema::new("Retrieve information about a specified silo.")
                .attribute(
                    Attribute::required("name", AttributeType::String)
                        .description("Name of the silo."),
                )
                .attribute(read_timeouts())
                .attribute(
                    Attribute::computed("identity_mode", AttributeType::String)
                        .description("How users and groups are managed in this silo."),
                )
                .attribute(
                    Attribute::computed("discoverable", AttributeType::Bool).description(
                        "Whether this silo is present in the silo_list output.",
                    ),
                ),
            "silo",
        )
    }

    async fn read(&self, config: Value) -> Result<Value> {
        let lookup: ByName = decode(config.clone())?;
        let silo = self
            .client
            .silo_view(&lookup.name)
            .await
            .map_err(|e| EngineError::api("Unable to read Silo:", e))?;
        tracing::trace!("read silo with ID: {}", silo.identity.id);

        let mut fields = identity(&silo.identity);
        fields["identity_mode"] = json!(silo.identity_mode);
        fields["discoverable"] = json!(silo.discoverable);
        Ok(resolved(config, fields))
    }
}
