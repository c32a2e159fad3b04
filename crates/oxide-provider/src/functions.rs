//! Provider functions
//!
//! Pure helpers the host can call from configuration. They make no remote
//! calls and need no configured client.

use crate::error::{ProviderError, Result};
use oxide_engine::{Attribute, AttributeType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const TO_VPC_FIREWALL_RULES_MAP: &str = "to_vpc_firewall_rules_map";

/// Signature of a provider function
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub summary: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<&'static str>,
    pub parameters: Vec<Attribute>,
    #[serde(rename = "return")]
    pub return_type: AttributeType,
}

pub fn definitions() -> Vec<FunctionDefinition> {
    vec![to_vpc_firewall_rules_map_definition()]
}

pub fn definition(name: &str) -> Result<FunctionDefinition> {
    definitions()
        .into_iter()
        .find(|f| f.name == name)
        .ok_or_else(|| ProviderError::UnknownFunction(name.to_string()))
}

/// Run a provider function with positional arguments
pub fn call(name: &str, arguments: &[Value]) -> Result<Value> {
    match name {
        TO_VPC_FIREWALL_RULES_MAP => {
            let rules_json = arguments.first().and_then(Value::as_str).ok_or_else(|| {
                ProviderError::InvalidArgument {
                    index: 0,
                    message: "expected a JSON encoded string".to_string(),
                }
            })?;
            to_vpc_firewall_rules_map(rules_json)
        }
        other => Err(ProviderError::UnknownFunction(other.to_string())),
    }
}

fn typed_value() -> AttributeType {
    AttributeType::object(vec![
        Attribute::required("type", AttributeType::String),
        Attribute::required("value", AttributeType::String),
    ])
}

fn to_vpc_firewall_rules_map_definition() -> FunctionDefinition {
    let rule = AttributeType::object(vec![
        Attribute::required("action", AttributeType::String),
        Attribute::required("description", AttributeType::String),
        Attribute::required("direction", AttributeType::String),
        Attribute::optional(
            "filters",
            AttributeType::object(vec![
                Attribute::optional("hosts", AttributeType::set_of(typed_value())),
                Attribute::optional(
                    "protocols",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::required("type", AttributeType::String),
                        Attribute::optional("icmp_type", AttributeType::Int32),
                        Attribute::optional("icmp_code", AttributeType::String),
                    ])),
                ),
                Attribute::optional("ports", AttributeType::set_of(AttributeType::String)),
            ]),
        ),
        Attribute::required("priority", AttributeType::Int64),
        Attribute::required("status", AttributeType::String),
        Attribute::required("targets", AttributeType::set_of(typed_value())),
    ]);

    FunctionDefinition {
        name: TO_VPC_FIREWALL_RULES_MAP,
        summary: "Converts a VPC firewall rule set to the updated map schema.",
        description: "Converts the `rules` attribute of an `oxide_vpc_firewall_rules` \
            resource from the old set schema to the new map value. It eases upgrading \
            the provider and should not be used long term.",
        deprecation_message: Some(
            "This function is only intended to be used to help upgrade the provider version \
             and will be removed in a future release. Migrate to the map rules schema.",
        ),
        parameters: vec![
            Attribute::required("rules_json", AttributeType::String)
                .description("JSON encoded string of the `rules` set."),
        ],
        return_type: AttributeType::map_of(rule),
    }
}

/// A rule in the list shape, where the name lives inside the rule
#[derive(Debug, Deserialize)]
struct LegacyRule {
    #[serde(default)]
    action: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    filters: Option<LegacyFilters>,
    name: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    targets: Option<Vec<TypeValue>>,
}

#[derive(Debug, Deserialize)]
struct LegacyFilters {
    #[serde(default)]
    hosts: Option<Vec<TypeValue>>,
    #[serde(default)]
    protocols: Option<Vec<Protocol>>,
    /// Numbers or strings
    #[serde(default)]
    ports: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TypeValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ProtocolRepr")]
struct Protocol {
    #[serde(rename = "type")]
    kind: String,
    icmp_type: Option<i32>,
    icmp_code: Option<String>,
}

/// Protocols were once bare names such as `TCP`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProtocolRepr {
    Name(String),
    Filter {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        icmp_type: Option<i32>,
        #[serde(default)]
        icmp_code: Option<String>,
    },
}

impl From<ProtocolRepr> for Protocol {
    fn from(repr: ProtocolRepr) -> Self {
        match repr {
            ProtocolRepr::Name(name) => Self {
                kind: name.to_lowercase(),
                icmp_type: None,
                icmp_code: None,
            },
            ProtocolRepr::Filter {
                kind,
                icmp_type,
                icmp_code,
            } => Self {
                kind,
                icmp_type,
                icmp_code,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct MapRule {
    action: String,
    description: String,
    direction: String,
    filters: Option<MapFilters>,
    priority: i64,
    status: String,
    targets: Option<Vec<TypeValue>>,
}

#[derive(Debug, Serialize)]
struct MapFilters {
    hosts: Option<Vec<TypeValue>>,
    ports: Option<Vec<String>>,
    protocols: Option<Vec<Protocol>>,
}

fn port_string(port: &Value) -> String {
    match port {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<LegacyRule> for MapRule {
    fn from(rule: LegacyRule) -> Self {
        Self {
            action: rule.action,
            description: rule.description,
            direction: rule.direction,
            filters: rule.filters.map(|f| MapFilters {
                hosts: f.hosts,
                ports: f.ports.map(|ports| ports.iter().map(port_string).collect()),
                protocols: f.protocols,
            }),
            priority: rule.priority,
            status: rule.status,
            targets: rule.targets,
        }
    }
}

/// Re-key a rule list by rule name, dropping the name from each rule.
pub(crate) fn rules_by_name(rules: Value) -> serde_json::Result<Value> {
    let rules: Vec<LegacyRule> = serde_json::from_value(rules)?;
    let map: BTreeMap<String, MapRule> = rules
        .into_iter()
        .map(|rule| (rule.name.clone(), MapRule::from(rule)))
        .collect();
    serde_json::to_value(map)
}

/// Re-key a JSON encoded rule list by rule name.
pub fn to_vpc_firewall_rules_map(rules_json: &str) -> Result<Value> {
    let invalid = |e: serde_json::Error| ProviderError::InvalidArgument {
        index: 0,
        message: e.to_string(),
    };
    let rules: Value = serde_json::from_str(rules_json).map_err(invalid)?;
    rules_by_name(rules).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rules_keyed_by_name() {
        let rules = json!([
            {
                "name": "allow-https",
                "action": "allow",
                "description": "https from anywhere",
                "direction": "inbound",
                "priority": 50,
                "status": "enabled",
                "targets": [{"type": "subnet", "value": "default"}],
                "filters": {
                    "ports": [443, "8000-8080"],
                    "protocols": [{"type": "tcp"}]
                }
            },
            {
                "name": "deny-icmp",
                "action": "deny",
                "description": "",
                "direction": "inbound",
                "priority": 60,
                "status": "disabled",
                "targets": [{"type": "vpc", "value": "default"}]
            }
        ]);

        let map = to_vpc_firewall_rules_map(&rules.to_string()).unwrap();
        let https = &map["allow-https"];
        assert_eq!(https["action"], "allow");
        assert_eq!(https["filters"]["ports"], json!(["443", "8000-8080"]));
        assert_eq!(https["filters"]["protocols"][0]["type"], "tcp");
        assert!(https["filters"]["hosts"].is_null());
        assert!(https.get("name").is_none());

        let icmp = &map["deny-icmp"];
        assert!(icmp["filters"].is_null());
        assert_eq!(icmp["targets"][0]["value"], "default");
    }

    #[test]
    fn test_protocol_names_lowercased() {
        let rules = json!([{
            "name": "allow-dns",
            "action": "allow",
            "targets": [],
            "filters": {"protocols": ["UDP", {"type": "icmp", "icmp_type": 8}]}
        }]);
        let map = rules_by_name(rules).unwrap();
        let protocols = &map["allow-dns"]["filters"]["protocols"];
        assert_eq!(protocols[0], json!({"type": "udp", "icmp_type": null, "icmp_code": null}));
        assert_eq!(protocols[1]["icmp_type"], 8);
    }

    #[test]
    fn test_malformed_argument() {
        let err = call(TO_VPC_FIREWALL_RULES_MAP, &[json!("not json")]).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument { index: 0, .. }));

        let err = call(TO_VPC_FIREWALL_RULES_MAP, &[json!(42)]).unwrap_err();
        assert_eq!(err.summary(), "Invalid function argument");
    }

    #[test]
    fn test_definition_is_deprecated() {
        let def = definition(TO_VPC_FIREWALL_RULES_MAP).unwrap();
        assert!(def.deprecation_message.is_some());
        assert_eq!(def.parameters[0].name, "rules_json");
        assert!(definition("to_vpc_map").is_err());
    }
}
