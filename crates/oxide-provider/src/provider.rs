//! Provider registry
//!
//! Holds one [`ResourceDriver`] per managed type and one
//! [`DataSourceDriver`] per lookup. Schemas are served before
//! the provider is configured; lifecycle calls wait for `configure` to
//! bind the drivers to a real API client.

use crate::error::{ProviderError, Result};
use crate::data_sources;
use crate::resources::{self, Client};
use oxide_api::HttpClient;
use oxide_config::ProviderConfig;
use oxide_engine::validation::{Mode, validate_document};
use oxide_engine::{
    AttrPath, Attribute, AttributeType, DataSourceDriver, Diagnostic, Diagnostics, ResourceDriver,
    Schema, Validator,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// User-visible provider type name
pub const TYPE_NAME: &str = "oxide";

struct Registry {
    drivers: BTreeMap<&'static str, ResourceDriver>,
    data_sources: BTreeMap<&'static str, DataSourceDriver>,
    configured: bool,
}

impl Registry {
    fn bind(client: &Client, configured: bool) -> Self {
        let drivers = resources::all(client)
            .into_iter()
            .map(|resource| {
                let driver = ResourceDriver::new(resource);
                (driver.type_name(), driver)
            })
            .collect();
        let data_sources = data_sources::all(client)
            .into_iter()
            .map(|source| {
                let driver = DataSourceDriver::new(source);
                (driver.type_name(), driver)
            })
            .collect();
        Self {
            drivers,
            data_sources,
            configured,
        }
    }
}

pub struct OxideProvider {
    registry: RwLock<Registry>,
}

impl OxideProvider {
    /// An unconfigured provider. The drivers are bound to a client with no
    /// host, which is replaced before any lifecycle call can reach it.
    pub fn new() -> Result<Self> {
        let placeholder: Client = Arc::new(HttpClient::new("", "")?);
        Ok(Self {
            registry: RwLock::new(Registry::bind(&placeholder, false)),
        })
    }

    /// A provider already bound to `client`
    pub fn with_client(client: Client) -> Self {
        Self {
            registry: RwLock::new(Registry::bind(&client, true)),
        }
    }

    /// Schema of the provider configuration block
    pub fn schema() -> Schema {
        Schema::new("The Oxide provider manages resources on an Oxide rack.")
            .attribute(
                Attribute::optional("host", AttributeType::String)
                    .description("URL of the root of the target server")
                    .validator(Validator::conflicts_with(vec![AttrPath::root("profile")])),
            )
            .attribute(
                Attribute::optional("token", AttributeType::String)
                    .description("Token used to authenticate")
                    .sensitive()
                    .validator(Validator::conflicts_with(vec![AttrPath::root("profile")])),
            )
            .attribute(
                Attribute::optional("profile", AttributeType::String)
                    .description("Profile in credentials.toml to use for authentication")
                    .validator(Validator::conflicts_with(vec![
                        AttrPath::root("host"),
                        AttrPath::root("token"),
                    ])),
            )
    }

    /// Build an API client from the provider configuration block.
    ///
    /// Every missing setting is reported before giving up.
    pub fn connect(config: &Value) -> std::result::Result<Client, Diagnostics> {
        let mut diags = validate_document(&Self::schema(), &[], config, Mode::Config);
        if diags.has_error() {
            return Err(diags);
        }

        let block = if config.is_null() { json!({}) } else { config.clone() };
        let settings: ProviderConfig =
            serde_json::from_value(block).map_err(|e| Diagnostics::from(ProviderError::from(e)))?;

        for err in settings.check() {
            diags.push(Diagnostic::error(err.summary(), err.to_string()));
        }
        if diags.has_error() {
            return Err(diags);
        }

        let credentials = settings
            .resolve()
            .map_err(|e| Diagnostics::from(ProviderError::from(e)))?;
        tracing::info!("configuring provider for host {}", credentials.host);
        let client = HttpClient::new(credentials.host, credentials.token)
            .map_err(|e| Diagnostics::from(ProviderError::from(e)))?;
        Ok(Arc::new(client))
    }

    /// Configure the provider and rebind every driver to the new client.
    pub async fn configure(&self, config: &Value) -> Diagnostics {
        match Self::connect(config) {
            Ok(client) => {
                *self.registry.write().await = Registry::bind(&client, true);
                Diagnostics::new()
            }
            Err(diags) => diags,
        }
    }

    pub async fn is_configured(&self) -> bool {
        self.registry.read().await.configured
    }

    pub async fn resource_types(&self) -> Vec<&'static str> {
        self.registry.read().await.drivers.keys().copied().collect()
    }

    pub async fn resource_schemas(&self) -> BTreeMap<&'static str, Schema> {
        self.registry
            .read()
            .await
            .drivers
            .iter()
            .map(|(name, driver)| (*name, driver.schema().clone()))
            .collect()
    }

    /// Driver for validation and planning. Available before configure.
    pub async fn driver(&self, type_name: &str) -> Result<ResourceDriver> {
        self.registry
            .read()
            .await
            .drivers
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// Driver for a lifecycle call that reaches the remote API
    pub async fn configured_driver(
        &self,
        type_name: &str,
        operation: &str,
    ) -> Result<ResourceDriver> {
        let registry = self.registry.read().await;
        let driver = registry
            .drivers
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))?;
        if !registry.configured {
            return Err(ProviderError::NotConfigured(operation.to_string()));
        }
        Ok(driver)
    }

    pub async fn data_source_types(&self) -> Vec<&'static str> {
        self.registry.read().await.data_sources.keys().copied().collect()
    }

    pub async fn data_source_schemas(&self) -> BTreeMap<&'static str, Schema> {
        self.registry
            .read()
            .await
            .data_sources
            .iter()
            .map(|(name, driver)| (*name, driver.schema().clone()))
            .collect()
    }

    /// Data source driver for validation. Available before configure.
    pub async fn data_source_driver(&self, type_name: &str) -> Result<DataSourceDriver> {
        self.registry
            .read()
            .await
            .data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownDataSource(type_name.to_string()))
    }

    /// Data source driver for a read that reaches the remote API
    pub async fn configured_data_source_driver(
        &self,
        type_name: &str,
    ) -> Result<DataSourceDriver> {
        let registry = self.registry.read().await;
        let driver = registry
            .data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownDataSource(type_name.to_string()))?;
        if !registry.configured {
            return Err(ProviderError::NotConfigured("read_data_source".to_string()));
        }
        Ok(driver)
    }
}
