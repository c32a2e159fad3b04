//! Host protocol over stdio
//!
//! One JSON request per line in, one JSON response per line out:
//!
//! ```text
//! → {"method": "read", "type_name": "oxide_project", "state": {...}}
//! ← {"result": {"new_state": {...}}, "diagnostics": []}
//! ```
//!
//! Errors never end the stream. They are returned as diagnostics on the
//! response to the request that caused them.

use crate::error::{ProviderError, Result};
use crate::functions;
use crate::provider::{OxideProvider, TYPE_NAME};
use oxide_engine::{Diagnostics, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Request {
    pub method: String,
    pub type_name: Option<String>,
    pub config: Option<Value>,
    pub prior_state: Option<Value>,
    pub planned_state: Option<Value>,
    pub state: Option<Value>,
    /// Schema version `state` was written with
    pub version: Option<i64>,
    /// Import identifier
    pub id: Option<String>,
    /// Function name
    pub name: Option<String>,
    pub arguments: Vec<Value>,
}

impl Request {
    fn type_name(&self) -> Result<&str> {
        self.type_name
            .as_deref()
            .ok_or(ProviderError::MissingField("type_name"))
    }
}

fn required<'a>(value: &'a Option<Value>, field: &'static str) -> Result<&'a Value> {
    value.as_ref().ok_or(ProviderError::MissingField(field))
}

#[derive(Debug, Default, Serialize)]
pub struct Response {
    pub result: Value,
    pub diagnostics: Diagnostics,
}

impl Response {
    fn ok(result: Value) -> Self {
        Self {
            result,
            diagnostics: Diagnostics::new(),
        }
    }

    fn state(key: &str, outcome: Outcome) -> Self {
        Self {
            result: json!({ key: outcome.state }),
            diagnostics: outcome.diagnostics,
        }
    }

    fn diagnostics(diagnostics: Diagnostics) -> Self {
        Self {
            result: Value::Null,
            diagnostics,
        }
    }
}

/// Handle one request. Failures are carried as diagnostics.
pub async fn handle(provider: &OxideProvider, request: Request) -> Response {
    match dispatch(provider, &request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("{} failed: {}", request.method, e);
            Response::diagnostics(e.into())
        }
    }
}

async fn dispatch(provider: &OxideProvider, request: &Request) -> Result<Response> {
    match request.method.as_str() {
        "get_metadata" => {
            let resources: Vec<Value> = provider
                .resource_types()
                .await
                .into_iter()
                .map(|type_name| json!({ "type_name": type_name }))
                .collect();
            let data_sources: Vec<Value> = provider
                .data_source_types()
                .await
                .into_iter()
                .map(|type_name| json!({ "type_name": type_name }))
                .collect();
            let functions: Vec<&str> = functions::definitions().iter().map(|f| f.name).collect();
            Ok(Response::ok(json!({
                "type_name": TYPE_NAME,
                "resources": resources,
                "data_sources": data_sources,
                "functions": functions,
            })))
        }
        "get_schema" => match request.type_name.as_deref() {
            Some(TYPE_NAME) => Ok(Response::ok(serde_json::to_value(OxideProvider::schema())?)),
            Some(type_name) => {
                let driver = provider.driver(type_name).await?;
                Ok(Response::ok(serde_json::to_value(driver.schema())?))
            }
            None => Ok(Response::ok(json!({
                "provider": OxideProvider::schema(),
                "resources": provider.resource_schemas().await,
                "data_sources": provider.data_source_schemas().await,
                "functions": functions::definitions(),
            }))),
        },
        "configure" => {
            let config = request.config.clone().unwrap_or(Value::Null);
            Ok(Response::diagnostics(provider.configure(&config).await))
        }
        "validate_resource_config" => {
            let driver = provider.driver(request.type_name()?).await?;
            Ok(Response::diagnostics(
                driver.validate(required(&request.config, "config")?),
            ))
        }
        "validate_data_source_config" => {
            let driver = provider.data_source_driver(request.type_name()?).await?;
            Ok(Response::diagnostics(
                driver.validate(required(&request.config, "config")?),
            ))
        }
        "read_data_source" => {
            let driver = provider
                .configured_data_source_driver(request.type_name()?)
                .await?;
            let config = required(&request.config, "config")?;
            Ok(Response::state("state", driver.read(config).await))
        }
        "upgrade_resource_state" => {
            let driver = provider.driver(request.type_name()?).await?;
            let version = request.version.ok_or(ProviderError::MissingField("version"))?;
            let state = required(&request.state, "state")?;
            Ok(Response::state("upgraded_state", driver.upgrade(version, state)))
        }
        "plan_resource_change" => {
            let driver = provider.driver(request.type_name()?).await?;
            let outcome = driver.plan(request.config.as_ref(), request.prior_state.as_ref());
            Ok(Response {
                result: serde_json::to_value(outcome.change)?,
                diagnostics: outcome.diagnostics,
            })
        }
        "create" => {
            let driver = provider
                .configured_driver(request.type_name()?, "create")
                .await?;
            let plan = required(&request.planned_state, "planned_state")?;
            Ok(Response::state("new_state", driver.create(plan).await))
        }
        "read" => {
            let driver = provider
                .configured_driver(request.type_name()?, "read")
                .await?;
            let state = required(&request.state, "state")?;
            Ok(Response::state("new_state", driver.read(state).await))
        }
        "update" => {
            let driver = provider
                .configured_driver(request.type_name()?, "update")
                .await?;
            let plan = required(&request.planned_state, "planned_state")?;
            let prior = required(&request.prior_state, "prior_state")?;
            Ok(Response::state("new_state", driver.update(plan, prior).await))
        }
        "delete" => {
            let driver = provider
                .configured_driver(request.type_name()?, "delete")
                .await?;
            let state = required(&request.state, "state")?;
            Ok(Response::diagnostics(driver.delete(state).await))
        }
        "import_resource_state" => {
            let driver = provider
                .configured_driver(request.type_name()?, "import")
                .await?;
            let id = request
                .id
                .as_deref()
                .ok_or(ProviderError::MissingField("id"))?;
            Ok(Response::state("imported_state", driver.import(id).await))
        }
        "call_function" => {
            let name = request
                .name
                .as_deref()
                .ok_or(ProviderError::MissingField("name"))?;
            Ok(Response::ok(functions::call(name, &request.arguments)?))
        }
        other => Err(ProviderError::UnknownMethod(other.to_string())),
    }
}

/// Serve requests until the reader is exhausted.
pub async fn serve<R, W>(provider: &OxideProvider, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                tracing::debug!("handling {}", request.method);
                handle(provider, request).await
            }
            Err(e) => Response::diagnostics(ProviderError::from(e).into()),
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }
    tracing::debug!("request stream closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::FakeClient;
    use std::sync::Arc;

    async fn exchange(provider: &OxideProvider, requests: &[Value]) -> Vec<Value> {
        let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
        let mut output = Vec::new();
        serve(provider, input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn fake_provider() -> OxideProvider {
        OxideProvider::with_client(Arc::new(FakeClient::new()))
    }

    #[tokio::test]
    async fn test_metadata_lists_resources_and_functions() {
        let provider = fake_provider();
        let responses = exchange(&provider, &[json!({"method": "get_metadata"})]).await;
        let result = &responses[0]["result"];
        assert_eq!(result["type_name"], "oxide");
        assert_eq!(result["resources"].as_array().unwrap().len(), 25);
        assert_eq!(result["data_sources"].as_array().unwrap().len(), 19);
        assert_eq!(result["functions"], json!(["to_vpc_firewall_rules_map"]));
    }

    #[tokio::test]
    async fn test_schema_of_one_type() {
        let provider = fake_provider();
        let responses = exchange(
            &provider,
            &[
                json!({"method": "get_schema", "type_name": "oxide_vpc"}),
                json!({"method": "get_schema", "type_name": "oxide"}),
            ],
        )
        .await;
        let names: Vec<&str> = responses[0]["result"]["attributes"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a["name"].as_str())
            .collect();
        assert!(names.contains(&"dns_name"));
        assert_eq!(responses[1]["result"]["attributes"][1]["sensitive"], true);
    }

    #[tokio::test]
    async fn test_project_lifecycle() {
        let provider = fake_provider();
        let responses = exchange(
            &provider,
            &[json!({
                "method": "create",
                "type_name": "oxide_project",
                "planned_state": {"name": "web", "description": "frontend"}
            })],
        )
        .await;
        assert_eq!(responses[0]["diagnostics"], json!([]));
        let state = responses[0]["result"]["new_state"].clone();
        assert_eq!(state["name"], "web");
        assert!(state["id"].is_string());

        let responses = exchange(
            &provider,
            &[
                json!({"method": "read", "type_name": "oxide_project", "state": state}),
                json!({"method": "delete", "type_name": "oxide_project", "state": state}),
                json!({"method": "read", "type_name": "oxide_project", "state": state}),
            ],
        )
        .await;
        assert_eq!(responses[0]["result"]["new_state"]["id"], state["id"]);
        assert_eq!(responses[1]["diagnostics"], json!([]));
        assert!(responses[2]["result"]["new_state"].is_null());
        assert_eq!(responses[2]["diagnostics"], json!([]));
    }

    #[tokio::test]
    async fn test_plan_actions() {
        let provider = OxideProvider::new().unwrap();
        let prior = json!({
            "id": "p-1",
            "name": "web",
            "description": "frontend",
            "time_created": "2024-01-01T00:00:00Z",
            "time_modified": "2024-01-01T00:00:00Z",
            "timeouts": null
        });
        let responses = exchange(
            &provider,
            &[
                json!({
                    "method": "plan_resource_change",
                    "type_name": "oxide_project",
                    "config": {"name": "web", "description": "storefront"},
                    "prior_state": prior
                }),
                json!({
                    "method": "plan_resource_change",
                    "type_name": "oxide_project",
                    "config": null,
                    "prior_state": prior
                }),
            ],
        )
        .await;
        assert_eq!(responses[0]["result"]["action"], "update");
        assert_eq!(
            responses[0]["result"]["planned_state"]["description"],
            "storefront"
        );
        assert_eq!(responses[1]["result"]["action"], "delete");
    }

    #[tokio::test]
    async fn test_errors_do_not_end_stream() {
        let provider = OxideProvider::new().unwrap();
        let input = "not json\n\n{\"method\": \"reboot\"}\n{\"method\": \"create\", \"type_name\": \"oxide_project\", \"planned_state\": {}}\n";
        let mut output = Vec::new();
        serve(&provider, input.as_bytes(), &mut output).await.unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["diagnostics"][0]["summary"], "Invalid request");
        assert_eq!(responses[1]["diagnostics"][0]["summary"], "Invalid request");
        assert_eq!(
            responses[2]["diagnostics"][0]["summary"],
            "Unconfigured provider"
        );
    }

    #[tokio::test]
    async fn test_data_source_read() {
        let provider = fake_provider();
        let responses = exchange(
            &provider,
            &[
                json!({
                    "method": "create",
                    "type_name": "oxide_project",
                    "planned_state": {"name": "web", "description": "frontend"}
                }),
                json!({
                    "method": "validate_data_source_config",
                    "type_name": "oxide_vpc",
                    "config": {"name": "default"}
                }),
                json!({
                    "method": "read_data_source",
                    "type_name": "oxide_vpc",
                    "config": {"project_name": "web", "name": "default"}
                }),
            ],
        )
        .await;
        let project = &responses[0]["result"]["new_state"];
        assert_eq!(responses[1]["diagnostics"][0]["severity"], "error");

        let vpc = &responses[2]["result"]["state"];
        assert_eq!(responses[2]["diagnostics"], json!([]));
        assert_eq!(vpc["project_id"], project["id"]);
        assert_eq!(vpc["dns_name"], "default");
        assert!(vpc["timeouts"].is_null());
    }

    #[tokio::test]
    async fn test_upgrade_firewall_rules_state() {
        let provider = OxideProvider::new().unwrap();
        let responses = exchange(
            &provider,
            &[
                json!({
                    "method": "upgrade_resource_state",
                    "type_name": "oxide_vpc_firewall_rules",
                    "version": 1,
                    "state": {
                        "id": "v-1",
                        "vpc_id": "v-1",
                        "rules": [{
                            "name": "allow-ssh",
                            "description": "ssh",
                            "action": "allow",
                            "direction": "inbound",
                            "priority": 50,
                            "status": "enabled",
                            "targets": [{"type": "vpc", "value": "default"}],
                            "filters": {"ports": ["22"], "protocols": [{"type": "tcp"}]}
                        }]
                    }
                }),
                json!({
                    "method": "upgrade_resource_state",
                    "type_name": "oxide_vpc_firewall_rules",
                    "state": {}
                }),
            ],
        )
        .await;
        let upgraded = &responses[0]["result"]["upgraded_state"];
        assert_eq!(responses[0]["diagnostics"], json!([]));
        assert_eq!(upgraded["rules"]["allow-ssh"]["priority"], 50);
        assert!(upgraded["rules"]["allow-ssh"]["name"].is_null());
        assert_eq!(
            responses[1]["diagnostics"][0]["detail"],
            "Missing version in request"
        );
    }

    #[tokio::test]
    async fn test_call_function() {
        let provider = fake_provider();
        let rules = json!([{"name": "allow-ssh", "action": "allow", "targets": []}]);
        let responses = exchange(
            &provider,
            &[json!({
                "method": "call_function",
                "name": "to_vpc_firewall_rules_map",
                "arguments": [rules.to_string()]
            })],
        )
        .await;
        assert_eq!(responses[0]["result"]["allow-ssh"]["action"], "allow");
    }
}
