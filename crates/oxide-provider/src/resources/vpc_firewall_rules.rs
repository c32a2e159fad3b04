//! `oxide_vpc_firewall_rules`
//!
//! The remote stores one rule list per VPC and only exposes a whole-list
//! update endpoint. Create and Update send the full planned list; Delete
//! sends an empty one. Rules come back in no particular order, so they are
//! re-keyed by name before being recorded.

use super::{Client, Stamps};
use crate::functions::rules_by_name;
use async_trait::async_trait;
use oxide_api::{
    TypedValue, VpcFirewallIcmpFilter, VpcFirewallRule, VpcFirewallRuleFilter,
    VpcFirewallRuleProtocol, VpcFirewallRuleUpdate, VpcFirewallRuleUpdateParams,
};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    AttrPath, Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource,
    Result, Schema, Validator, rfc3339,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const RULE_NAME_PATTERN: &str = r"^[a-z][a-zA-Z0-9-]{0,61}[a-zA-Z0-9]$";

const FILTER_TYPES: [&str; 5] = ["instance", "ip", "ip_net", "subnet", "vpc"];

pub struct VpcFirewallRulesResource {
    client: Client,
}

impl VpcFirewallRulesResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FirewallRulesModel {
    #[serde(flatten)]
    stamps: Stamps,
    vpc_id: String,
    rules: BTreeMap<String, RuleModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct RuleModel {
    action: String,
    description: String,
    direction: String,
    filters: FiltersModel,
    name: Option<String>,
    priority: i64,
    status: String,
    targets: Vec<TypedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct FiltersModel {
    hosts: Option<Vec<TypedValue>>,
    ports: Option<Vec<String>>,
    protocols: Option<Vec<ProtocolModel>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
struct ProtocolModel {
    #[serde(rename = "type")]
    kind: String,
    icmp_type: Option<i64>,
    icmp_code: Option<String>,
}

impl ProtocolModel {
    fn to_api(&self) -> Result<VpcFirewallRuleProtocol> {
        match self.kind.as_str() {
            "tcp" => Ok(VpcFirewallRuleProtocol::Tcp),
            "udp" => Ok(VpcFirewallRuleProtocol::Udp),
            "icmp" => Ok(VpcFirewallRuleProtocol::Icmp(self.icmp_type.map(|icmp_type| {
                VpcFirewallIcmpFilter {
                    icmp_type,
                    code: self.icmp_code.clone(),
                }
            }))),
            other => Err(EngineError::config(
                "Invalid firewall rule protocol",
                format!("unknown protocol type {:?}", other),
            )),
        }
    }

    fn from_api(protocol: &VpcFirewallRuleProtocol) -> Self {
        match protocol {
            VpcFirewallRuleProtocol::Tcp => Self {
                kind: "tcp".to_string(),
                ..Default::default()
            },
            VpcFirewallRuleProtocol::Udp => Self {
                kind: "udp".to_string(),
                ..Default::default()
            },
            VpcFirewallRuleProtocol::Icmp(filter) => Self {
                kind: "icmp".to_string(),
                icmp_type: filter.as_ref().map(|f| f.icmp_type),
                icmp_code: filter.as_ref().and_then(|f| f.code.clone()),
            },
        }
    }
}

fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items
}

fn non_empty_sorted<T: Ord>(items: Option<Vec<T>>) -> Option<Vec<T>> {
    items.filter(|items| !items.is_empty()).map(sorted)
}

/// Request body for the whole-list update.
fn update_params(rules: &BTreeMap<String, RuleModel>) -> Result<VpcFirewallRuleUpdateParams> {
    let rules = rules
        .iter()
        .map(|(name, rule)| {
            let protocols = rule
                .filters
                .protocols
                .as_ref()
                .map(|protocols| protocols.iter().map(ProtocolModel::to_api).collect())
                .transpose()?;
            Ok(VpcFirewallRuleUpdate {
                name: name.clone(),
                description: rule.description.clone(),
                action: rule.action.clone(),
                direction: rule.direction.clone(),
                filters: VpcFirewallRuleFilter {
                    hosts: rule.filters.hosts.clone(),
                    ports: rule.filters.ports.clone(),
                    protocols,
                },
                priority: rule.priority,
                status: rule.status.clone(),
                targets: rule.targets.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(VpcFirewallRuleUpdateParams { rules })
}

impl FirewallRulesModel {
    /// Re-key observed rules by name. Timestamps mirror the first rule by
    /// name, or stay null when the list is empty.
    fn observe(id: Option<String>, vpc_id: String, observed: &[VpcFirewallRule]) -> Self {
        let first = observed.iter().min_by(|a, b| a.identity.name.cmp(&b.identity.name));
        let rules = observed
            .iter()
            .map(|rule| (rule.identity.name.clone(), RuleModel::from(rule)))
            .collect();
        Self {
            stamps: Stamps {
                id,
                time_created: first.map(|rule| rfc3339(&rule.identity.time_created)),
                time_modified: first.map(|rule| rfc3339(&rule.identity.time_modified)),
            },
            vpc_id,
            rules,
        }
    }
}

impl From<&VpcFirewallRule> for RuleModel {
    fn from(rule: &VpcFirewallRule) -> Self {
        Self {
            action: rule.action.clone(),
            description: rule.identity.description.clone(),
            direction: rule.direction.clone(),
            filters: FiltersModel {
                hosts: non_empty_sorted(rule.filters.hosts.clone()),
                ports: non_empty_sorted(rule.filters.ports.clone()),
                protocols: non_empty_sorted(
                    rule.filters
                        .protocols
                        .as_ref()
                        .map(|protocols| protocols.iter().map(ProtocolModel::from_api).collect()),
                ),
            },
            name: Some(rule.identity.name.clone()),
            priority: rule.priority,
            status: rule.status.clone(),
            targets: sorted(rule.targets.clone()),
        }
    }
}

fn typed_value_object(description: &str) -> AttributeType {
    AttributeType::object(vec![
        Attribute::required("type", AttributeType::String)
            .description(
                "The rule applies to a single or all instances of this type, or specific IPs. Possible values: `vpc`, `subnet`, `instance`, `ip`, `ip_net`.",
            )
            .validator(Validator::one_of(FILTER_TYPES)),
        Attribute::required("value", AttributeType::String).description(description),
    ])
}

const TYPED_VALUE_DESCRIPTION: &str = "Name of the VPC, subnet or instance, an IP address, or an IPv4 or IPv6 subnet, depending on the type.";

#[async_trait]
impl Resource for VpcFirewallRulesResource {
    fn type_name(&self) -> &'static str {
        "oxide_vpc_firewall_rules"
    }

    fn schema(&self) -> Schema {
        let protocol = AttributeType::object(vec![
            Attribute::required("type", AttributeType::String)
                .description("The protocol type. Must be one of `tcp`, `udp`, or `icmp`.")
                .validator(Validator::one_of(["tcp", "udp", "icmp"])),
            Attribute::optional("icmp_type", AttributeType::Int32)
                .description("ICMP type. Only valid when type is `icmp`.")
                .validator(Validator::int_between(0, 255)),
            Attribute::optional("icmp_code", AttributeType::String)
                .description(
                    "ICMP code (e.g., 0) or range (e.g., 1-3). Omit to filter all traffic of the specified `icmp_type`.",
                )
                .validator(Validator::also_requires(vec![AttrPath::sibling("icmp_type")])),
        ]);

        let filters = AttributeType::object(vec![
            Attribute::optional("hosts", AttributeType::set_of(typed_value_object(TYPED_VALUE_DESCRIPTION)))
                .description("If present, the sources (if incoming) or destinations (if outgoing) this rule applies to.")
                .validator(Validator::size_at_least(1)),
            Attribute::optional("protocols", AttributeType::set_of(protocol))
                .description("The protocols in a firewall rule's filter.")
                .validator(Validator::size_at_least(1)),
            Attribute::optional("ports", AttributeType::set_of(AttributeType::String))
                .description("If present, the destination ports this rule applies to.")
                .validator(Validator::size_at_least(1)),
        ]);

        let rule = AttributeType::object(vec![
            Attribute::required("action", AttributeType::String)
                .description("Whether traffic matching the rule should be allowed or dropped. Possible values are: `allow` or `deny`.")
                .validator(Validator::one_of(["allow", "deny"])),
            Attribute::required("description", AttributeType::String)
                .description("Description for the VPC firewall rule."),
            Attribute::required("direction", AttributeType::String)
                .description("Whether this rule is for incoming or outgoing traffic. Possible values are: `inbound` or `outbound`.")
                .validator(Validator::one_of(["inbound", "outbound"])),
            Attribute::required("filters", filters).description("Reductions on the scope of the rule."),
            Attribute::computed("name", AttributeType::String)
                .description("Name of the VPC firewall rule."),
            Attribute::required("priority", AttributeType::Int64)
                .description("The relative priority of this rule.")
                .validator(Validator::int_between(0, 65535)),
            Attribute::required("status", AttributeType::String)
                .description("Whether this rule is in effect. Possible values are: `enabled` or `disabled`.")
                .validator(Validator::one_of(["enabled", "disabled"])),
            Attribute::required("targets", AttributeType::set_of(typed_value_object(TYPED_VALUE_DESCRIPTION)))
                .description("Sets of instances that the rule applies to."),
        ]);

        Schema::new(
            "This resource manages VPC firewall rules. The rules are exhaustive and overwrite any other firewall rules for the VPC once applied.",
        )
        .version(2)
        .attribute(
            Attribute::required("vpc_id", AttributeType::String)
                .description("ID of the VPC that will have the firewall rules applied to.")
                .requires_replace(),
        )
        .attribute(
            Attribute::required("rules", AttributeType::map_of(rule))
                .description(
                    "Associated firewall rules. The map key defines the rule name and must follow the API requirements for VPC firewall rule name.",
                )
                .validator(Validator::keys_match(
                    RULE_NAME_PATTERN,
                    "Names must begin with a lower case ASCII letter, be composed exclusively of lowercase ASCII, uppercase ASCII, numbers, and '-', and may not end with a '-'. They can be at most 63 characters long.",
                )),
        )
        .attribute(Attribute::timeouts(&Phase::ALL))
        .attribute(Attribute::id().description(
            "Unique, immutable, system-controlled identifier of the firewall rules. Only meaningful to the state store.",
        ))
        .attribute(
            Attribute::computed("time_created", AttributeType::Timestamp)
                .description("Timestamp of when the VPC firewall rules were last created."),
        )
        .attribute(
            Attribute::computed("time_modified", AttributeType::Timestamp)
                .description("Timestamp of when the VPC firewall rules were last modified."),
        )
    }

    /// Versions 0 and 1 kept the rules in a list with the name inside
    /// each rule. Version 0 also spelled protocols as bare names.
    fn upgrade_state(&self, version: i64, mut state: Value) -> Result<Value> {
        if !(0..2).contains(&version) {
            return Err(EngineError::unsupported(
                "Unable to Upgrade Resource State",
                format!("no upgrader for oxide_vpc_firewall_rules schema version {}", version),
            ));
        }
        let rules = state.get_mut("rules").map(Value::take).unwrap_or(Value::Null);
        let rules = match rules {
            Value::Null => json!({}),
            list => rules_by_name(list).map_err(|e| {
                EngineError::config(
                    format!("Unable to Upgrade State From Version {}", version),
                    format!("failed to convert firewall rules to a map: {}", e),
                )
            })?,
        };
        if let Some(obj) = state.as_object_mut() {
            obj.insert("rules".to_string(), rules);
        }
        Ok(state)
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: FirewallRulesModel = decode(plan)?;
        let updated = self
            .client
            .vpc_firewall_rules_update(&plan.vpc_id, &update_params(&plan.rules)?)
            .await
            .map_err(|e| EngineError::api("Error creating firewall rules", e))?;
        // The remote has no identifier for the rule list as a whole
        let id = uuid::Uuid::new_v4().to_string();
        encode(&FirewallRulesModel::observe(Some(id), plan.vpc_id, &updated.rules))
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: FirewallRulesModel = decode(state)?;
        let observed = match self.client.vpc_firewall_rules_view(&state.vpc_id).await {
            Ok(observed) => observed,
            Err(e) if oxide_api::is_not_found(&e) => return Ok(ReadOutcome::Removed),
            Err(e) => return Err(EngineError::api("Unable to read firewall rules:", e)),
        };
        let vpc_id = observed
            .rules
            .first()
            .map(|rule| rule.vpc_id.clone())
            .unwrap_or(state.vpc_id);
        // Imported instances carry only the VPC
        let id = state
            .stamps
            .id
            .or_else(|| Some(uuid::Uuid::new_v4().to_string()));
        Ok(ReadOutcome::Found(encode(&FirewallRulesModel::observe(
            id,
            vpc_id,
            &observed.rules,
        ))?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: FirewallRulesModel = decode(plan)?;
        let prior: FirewallRulesModel = decode(prior)?;
        let updated = self
            .client
            .vpc_firewall_rules_update(&plan.vpc_id, &update_params(&plan.rules)?)
            .await
            .map_err(|e| EngineError::api("Error updating VPC firewall rules", e))?;
        encode(&FirewallRulesModel::observe(
            prior.stamps.id,
            plan.vpc_id,
            &updated.rules,
        ))
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: FirewallRulesModel = decode(state)?;
        let empty = VpcFirewallRuleUpdateParams { rules: Vec::new() };
        match self.client.vpc_firewall_rules_update(&state.vpc_id, &empty).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if oxide_api::is_not_found(&e) => Ok(DeleteOutcome::Deleted),
            Err(e) => Err(EngineError::api("Error deleting VPC firewall rules", e)),
        }
    }

    async fn import(&self, id: &str) -> Result<Value> {
        Ok(json!({ "vpc_id": id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icmp_without_type_matches_all() {
        let protocol = ProtocolModel {
            kind: "icmp".to_string(),
            icmp_type: None,
            icmp_code: None,
        };
        assert_eq!(protocol.to_api().unwrap(), VpcFirewallRuleProtocol::Icmp(None));
    }

    #[test]
    fn test_update_params_use_map_keys_as_names() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "allow-https".to_string(),
            RuleModel {
                action: "allow".to_string(),
                direction: "inbound".to_string(),
                priority: 50,
                status: "enabled".to_string(),
                filters: FiltersModel {
                    ports: Some(vec!["443".to_string()]),
                    protocols: Some(vec![ProtocolModel {
                        kind: "tcp".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let params = update_params(&rules).unwrap();
        assert_eq!(params.rules.len(), 1);
        assert_eq!(params.rules[0].name, "allow-https");
        assert_eq!(
            params.rules[0].filters.protocols,
            Some(vec![VpcFirewallRuleProtocol::Tcp])
        );
    }

    #[test]
    fn test_upgrade_rule_list_to_map() {
        let resource =
            VpcFirewallRulesResource::new(std::sync::Arc::new(oxide_api::FakeClient::new()));
        let state = json!({
            "id": "v-1",
            "vpc_id": "v-1",
            "time_created": "2024-01-01T00:00:00Z",
            "rules": [
                {
                    "name": "allow-https",
                    "action": "allow",
                    "description": "",
                    "direction": "inbound",
                    "priority": 50,
                    "status": "enabled",
                    "targets": [{"type": "vpc", "value": "default"}],
                    "filters": {"ports": ["443"], "protocols": ["TCP"]}
                },
                {
                    "name": "deny-all",
                    "action": "deny",
                    "description": "",
                    "direction": "inbound",
                    "priority": 65535,
                    "status": "enabled",
                    "targets": [{"type": "vpc", "value": "default"}],
                    "filters": {}
                }
            ]
        });

        let upgraded = resource.upgrade_state(0, state).unwrap();
        let rules: BTreeMap<String, RuleModel> =
            serde_json::from_value(upgraded["rules"].clone()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules["allow-https"].filters.protocols.as_ref().unwrap()[0].kind, "tcp");
        assert_eq!(rules["deny-all"].priority, 65535);
        assert_eq!(upgraded["time_created"], "2024-01-01T00:00:00Z");

        let err = resource
            .upgrade_state(1, json!({"rules": [{"action": "allow"}]}))
            .unwrap_err();
        assert_eq!(err.summary(), "Unable to Upgrade State From Version 1");
    }

    #[test]
    fn test_rule_name_pattern() {
        let re = regex::Regex::new(RULE_NAME_PATTERN).unwrap();
        assert!(re.is_match("allow-https"));
        assert!(re.is_match("allowICMP2"));
        assert!(!re.is_match("Allow"));
        assert!(!re.is_match("trailing-"));
        assert!(!re.is_match("a"));
    }
}
