//! Plan derivation
//!
//! Folds Config and prior State into a Plan by applying each attribute's
//! plan modifiers, then decides which lifecycle path the host should take.

use crate::schema::{Attribute, AttributeType, PlanModifier, Role, Schema};
use crate::value::values_equal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle path chosen for one resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    /// Create a new remote object
    Create,
    /// Update the remote object in place
    Update,
    /// Destroy the remote object, then create a new one
    Replace,
    /// Delete the remote object
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlannedAction::Create => write!(f, "create"),
            PlannedAction::Update => write!(f, "update"),
            PlannedAction::Replace => write!(f, "replace"),
            PlannedAction::Delete => write!(f, "delete"),
            PlannedAction::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of planning one resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub action: PlannedAction,

    /// The Plan document. Unknown values are null and listed in `unknown`.
    pub planned_state: Value,

    /// Attributes whose change forces a replacement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_replace: Vec<String>,

    /// Attributes the provider will only know after apply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<String>,
}

impl PlannedChange {
    pub fn is_noop(&self) -> bool {
        self.action == PlannedAction::NoOp
    }

    /// Short human readable summary, e.g. "replace (forced by: project_id)"
    pub fn summary(&self) -> String {
        if self.requires_replace.is_empty() {
            self.action.to_string()
        } else {
            format!(
                "{} (forced by: {})",
                self.action,
                self.requires_replace.join(", ")
            )
        }
    }
}

fn member<'a>(doc: &'a Value, name: &str) -> &'a Value {
    doc.get(name).unwrap_or(&Value::Null)
}

/// Compare a configured value with a stored one, ignoring nested members
/// the user cannot or did not set.
pub fn config_matches(ty: &AttributeType, config: &Value, stored: &Value) -> bool {
    match (ty, config, stored) {
        (AttributeType::Object(attrs), Value::Object(_), Value::Object(_)) => {
            attrs.iter().all(|attr| {
                let c = member(config, &attr.name);
                let s = member(stored, &attr.name);
                match attr.role {
                    Role::Computed => true,
                    _ if attr.write_only => true,
                    Role::OptionalComputed if c.is_null() => true,
                    _ => config_matches(&attr.ty, c, s),
                }
            })
        }
        (AttributeType::Set(elem), Value::Array(xs), Value::Array(ys)) => {
            if xs.len() != ys.len() {
                return false;
            }
            let mut used = vec![false; ys.len()];
            xs.iter().all(|x| {
                let hit = ys
                    .iter()
                    .enumerate()
                    .find(|(i, y)| !used[*i] && config_matches(elem, x, y))
                    .map(|(i, _)| i);
                match hit {
                    Some(i) => {
                        used[i] = true;
                        true
                    }
                    None => false,
                }
            })
        }
        (AttributeType::List(elem), Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| config_matches(elem, x, y))
        }
        (AttributeType::Map(elem), Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| config_matches(elem, x, y)))
        }
        _ => values_equal(ty, config, stored),
    }
}

/// Plan value for one attribute on a fresh object.
fn plan_create_value(attr: &Attribute, config: &Value, unknown: &mut Vec<String>) -> Value {
    let c = member(config, &attr.name);
    if !c.is_null() {
        return c.clone();
    }
    if let Some(default) = attr.static_default() {
        return default.clone();
    }
    if attr.role.is_computed() {
        unknown.push(attr.name.clone());
    }
    Value::Null
}

fn plan_create(schema: &Schema, config: &Value) -> (Value, Vec<String>) {
    let mut unknown = Vec::new();
    let map: Map<String, Value> = schema
        .attributes
        .iter()
        .map(|attr| {
            (
                attr.name.clone(),
                plan_create_value(attr, config, &mut unknown),
            )
        })
        .collect();
    (Value::Object(map), unknown)
}

/// Derive the Plan for one resource instance.
///
/// `config` is None when the resource was removed from the user's document,
/// `prior` is None when no State exists yet.
pub fn plan_resource_change(
    schema: &Schema,
    config: Option<&Value>,
    prior: Option<&Value>,
) -> PlannedChange {
    let (config, prior) = match (config, prior) {
        (None, None) => {
            return PlannedChange {
                action: PlannedAction::NoOp,
                planned_state: Value::Null,
                requires_replace: Vec::new(),
                unknown: Vec::new(),
            };
        }
        (None, Some(_)) => {
            return PlannedChange {
                action: PlannedAction::Delete,
                planned_state: Value::Null,
                requires_replace: Vec::new(),
                unknown: Vec::new(),
            };
        }
        (Some(config), None) => {
            let (planned_state, unknown) = plan_create(schema, config);
            return PlannedChange {
                action: PlannedAction::Create,
                planned_state,
                requires_replace: Vec::new(),
                unknown,
            };
        }
        (Some(config), Some(prior)) => (config, prior),
    };

    // First pass: configurable attributes. Track whether anything moved.
    let mut planned = Map::new();
    let mut changed = false;
    let mut requires_replace = Vec::new();

    for attr in schema.attributes.iter().filter(|a| a.role.is_configurable()) {
        let c = member(config, &attr.name);
        let p = member(prior, &attr.name);

        let (value, differs) = if c.is_null() {
            match (attr.static_default(), attr.role) {
                (Some(default), _) => (default.clone(), !values_equal(&attr.ty, default, p)),
                // Server-chosen value survives the user dropping the attribute.
                (None, Role::OptionalComputed) => (p.clone(), false),
                (None, _) => (Value::Null, !p.is_null()),
            }
        } else if config_matches(&attr.ty, c, p) {
            (p.clone(), false)
        } else {
            (c.clone(), true)
        };

        if differs && !attr.write_only {
            changed = true;
            let replace = attr.has_modifier(&PlanModifier::RequiresReplace)
                || (attr.has_modifier(&PlanModifier::RequiresReplaceIfConfigured) && !c.is_null());
            if replace {
                requires_replace.push(attr.name.clone());
            }
        }
        planned.insert(attr.name.clone(), value);
    }

    if !requires_replace.is_empty() {
        let (planned_state, unknown) = plan_create(schema, config);
        return PlannedChange {
            action: PlannedAction::Replace,
            planned_state,
            requires_replace,
            unknown,
        };
    }

    // Second pass: computed-only attributes.
    let mut unknown = Vec::new();
    for attr in schema.attributes.iter().filter(|a| !a.role.is_configurable()) {
        let p = member(prior, &attr.name);
        let keep = !changed || (attr.has_modifier(&PlanModifier::UseStateForUnknown) && !p.is_null());
        if keep {
            planned.insert(attr.name.clone(), p.clone());
        } else {
            unknown.push(attr.name.clone());
            planned.insert(attr.name.clone(), Value::Null);
        }
    }

    // Keep declared attribute order.
    let planned_state = Value::Object(
        schema
            .attributes
            .iter()
            .map(|a| {
                (
                    a.name.clone(),
                    planned.get(&a.name).cloned().unwrap_or(Value::Null),
                )
            })
            .collect(),
    );

    PlannedChange {
        action: if changed {
            PlannedAction::Update
        } else {
            PlannedAction::NoOp
        },
        planned_state,
        requires_replace,
        unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use crate::timeouts::Phase;
    use serde_json::json;

    fn subnet_schema() -> Schema {
        Schema::new("vpc subnet")
            .attribute(Attribute::id())
            .attribute(Attribute::required("vpc_id", AttributeType::String).requires_replace())
            .attribute(Attribute::required("name", AttributeType::String))
            .attribute(Attribute::required("description", AttributeType::String))
            .attribute(Attribute::required("ipv4_block", AttributeType::Cidr).requires_replace())
            .attribute(
                Attribute::optional_computed("ipv6_block", AttributeType::Cidr)
                    .requires_replace_if_configured()
                    .use_state_for_unknown(),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::time_created().use_state_for_unknown())
            .attribute(Attribute::time_modified())
    }

    fn prior() -> Value {
        json!({
            "id": "sub-1",
            "vpc_id": "vpc-1",
            "name": "web",
            "description": "web tier",
            "ipv4_block": "192.168.0.0/24",
            "ipv6_block": "fd1e:4947:d4a1::/64",
            "timeouts": null,
            "time_created": "2024-05-01T12:00:00Z",
            "time_modified": "2024-05-01T12:00:00Z"
        })
    }

    #[test]
    fn test_create_marks_computed_unknown() {
        let config = json!({"vpc_id": "vpc-1", "name": "web", "description": "d", "ipv4_block": "192.168.0.0/24"});
        let change = plan_resource_change(&subnet_schema(), Some(&config), None);
        assert_eq!(change.action, PlannedAction::Create);
        assert_eq!(
            change.unknown,
            vec!["id", "ipv6_block", "time_created", "time_modified"]
        );
        assert_eq!(change.planned_state["name"], "web");
    }

    #[test]
    fn test_no_diff_when_optional_computed_omitted() {
        let config = json!({"vpc_id": "vpc-1", "name": "web", "description": "web tier", "ipv4_block": "192.168.0.0/24"});
        let change = plan_resource_change(&subnet_schema(), Some(&config), Some(&prior()));
        assert!(change.is_noop(), "{:?}", change);
        assert_eq!(change.planned_state, prior());
    }

    #[test]
    fn test_in_place_update_keeps_identity() {
        let config = json!({"vpc_id": "vpc-1", "name": "web", "description": "updated", "ipv4_block": "192.168.0.0/24"});
        let change = plan_resource_change(&subnet_schema(), Some(&config), Some(&prior()));
        assert_eq!(change.action, PlannedAction::Update);
        assert_eq!(change.planned_state["id"], "sub-1");
        assert_eq!(change.planned_state["time_created"], "2024-05-01T12:00:00Z");
        assert_eq!(change.planned_state["ipv6_block"], "fd1e:4947:d4a1::/64");
        assert_eq!(change.unknown, vec!["time_modified"]);
    }

    #[test]
    fn test_requires_replace() {
        let config = json!({"vpc_id": "vpc-1", "name": "web", "description": "web tier", "ipv4_block": "10.0.0.0/24"});
        let change = plan_resource_change(&subnet_schema(), Some(&config), Some(&prior()));
        assert_eq!(change.action, PlannedAction::Replace);
        assert_eq!(change.requires_replace, vec!["ipv4_block"]);
        assert!(change.planned_state["id"].is_null());
        assert_eq!(change.summary(), "replace (forced by: ipv4_block)");
    }

    #[test]
    fn test_requires_replace_if_configured() {
        let mut config = json!({"vpc_id": "vpc-1", "name": "web", "description": "web tier", "ipv4_block": "192.168.0.0/24"});
        config["ipv6_block"] = json!("fd00::/64");
        let change = plan_resource_change(&subnet_schema(), Some(&config), Some(&prior()));
        assert_eq!(change.action, PlannedAction::Replace);
        assert_eq!(change.requires_replace, vec!["ipv6_block"]);
    }

    #[test]
    fn test_timeouts_change_is_in_place() {
        let config = json!({
            "vpc_id": "vpc-1", "name": "web", "description": "web tier",
            "ipv4_block": "192.168.0.0/24", "timeouts": {"create": "5m"}
        });
        let change = plan_resource_change(&subnet_schema(), Some(&config), Some(&prior()));
        assert_eq!(change.action, PlannedAction::Update);
        assert!(change.requires_replace.is_empty());
    }

    #[test]
    fn test_default_value() {
        let schema = Schema::new("gateway")
            .attribute(Attribute::id())
            .attribute(
                Attribute::optional_computed("cascade_delete", AttributeType::Bool)
                    .default_value(json!(false)),
            );
        let change = plan_resource_change(&schema, Some(&json!({})), None);
        assert_eq!(change.planned_state["cascade_delete"], false);

        let prior = json!({"id": "igw-1", "cascade_delete": true});
        let change = plan_resource_change(&schema, Some(&json!({})), Some(&prior));
        assert_eq!(change.action, PlannedAction::Update);
        assert_eq!(change.planned_state["cascade_delete"], false);
    }

    #[test]
    fn test_nested_computed_members_ignored() {
        let nic = AttributeType::object(vec![
            Attribute::computed("id", AttributeType::String),
            Attribute::required("name", AttributeType::String),
            Attribute::optional_computed("ip_address", AttributeType::String),
        ]);
        let schema = Schema::new("instance")
            .attribute(Attribute::id())
            .attribute(Attribute::optional("network_interfaces", AttributeType::set_of(nic)));

        let prior = json!({"id": "i-1", "network_interfaces": [
            {"id": "nic-2", "name": "b", "ip_address": "172.30.0.6"},
            {"id": "nic-1", "name": "a", "ip_address": "172.30.0.5"}
        ]});
        let config = json!({"network_interfaces": [{"name": "a"}, {"name": "b"}]});
        let change = plan_resource_change(&schema, Some(&config), Some(&prior));
        assert!(change.is_noop(), "{:?}", change);

        let config = json!({"network_interfaces": [{"name": "a"}, {"name": "c"}]});
        let change = plan_resource_change(&schema, Some(&config), Some(&prior));
        assert_eq!(change.action, PlannedAction::Update);
    }

    #[test]
    fn test_delete_and_noop() {
        let schema = subnet_schema();
        assert_eq!(
            plan_resource_change(&schema, None, Some(&prior())).action,
            PlannedAction::Delete
        );
        assert_eq!(
            plan_resource_change(&schema, None, None).action,
            PlannedAction::NoOp
        );
    }
}
