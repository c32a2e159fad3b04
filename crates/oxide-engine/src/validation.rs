//! Config-time validation
//!
//! Runs before any remote call. Findings are accumulated, never
//! short-circuited, so the user sees every problem in one pass.

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::schema::{
    AttrPath, Attribute, AttributeType, ConfigValidator, Pattern, Role, Schema, Validator,
};
use regex::Regex;
use serde_json::Value;

/// What kind of document is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// User Config: computed-only attributes must be absent.
    Config,
    /// Planned document: computed-only attributes may carry prior values.
    Plan,
}

/// Validate a document against the schema and the resource's config
/// validators.
pub fn validate_document(
    schema: &Schema,
    config_validators: &[ConfigValidator],
    document: &Value,
    mode: Mode,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    validate_object(&schema.attributes, document, document, "", mode, &mut diags);
    for validator in config_validators {
        run_config_validator(validator, document, &mut diags);
    }
    diags
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn is_set(v: Option<&Value>) -> bool {
    v.is_some_and(|v| !v.is_null())
}

fn validate_object(
    attributes: &[Attribute],
    object: &Value,
    root: &Value,
    prefix: &str,
    mode: Mode,
    diags: &mut Diagnostics,
) {
    for attr in attributes {
        let path = join(prefix, &attr.name);
        let value = object.get(&attr.name).unwrap_or(&Value::Null);

        match attr.role {
            Role::Required if value.is_null() => {
                diags.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!(
                            "The argument \"{}\" is required, but no definition was found.",
                            path
                        ),
                    )
                    .at(&path),
                );
                continue;
            }
            Role::Computed if mode == Mode::Config && !value.is_null() => {
                diags.push(
                    Diagnostic::error(
                        "Invalid Configuration for Read-Only Attribute",
                        format!(
                            "Cannot set value for attribute \"{}\" because it is computed by the provider.",
                            path
                        ),
                    )
                    .at(&path),
                );
                continue;
            }
            _ => {}
        }

        for validator in &attr.validators {
            run_validator(validator, &path, value, object, root, diags);
        }

        if !value.is_null() {
            validate_nested(&attr.ty, value, root, &path, mode, diags);
        }
    }
}

fn validate_nested(
    ty: &AttributeType,
    value: &Value,
    root: &Value,
    path: &str,
    mode: Mode,
    diags: &mut Diagnostics,
) {
    match (ty, value) {
        (AttributeType::Object(attrs), Value::Object(_)) => {
            validate_object(attrs, value, root, path, mode, diags);
        }
        (AttributeType::Set(elem) | AttributeType::List(elem), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                validate_nested(elem, item, root, &format!("{}[{}]", path, i), mode, diags);
            }
        }
        (AttributeType::Map(elem), Value::Object(map)) => {
            for (key, item) in map {
                validate_nested(elem, item, root, &format!("{}[\"{}\"]", path, key), mode, diags);
            }
        }
        _ => {}
    }
}

fn resolve<'a>(path: &AttrPath, parent: &'a Value, root: &'a Value) -> Option<&'a Value> {
    match path {
        AttrPath::Root(name) => root.get(name),
        AttrPath::Sibling(name) => parent.get(name),
    }
}

fn compile<'a>(pattern: &'a Pattern, path: &str, diags: &mut Diagnostics) -> Option<&'a Regex> {
    match pattern.regex() {
        Ok(re) => Some(re),
        Err(e) => {
            diags.push(
                Diagnostic::error(
                    "Invalid validator",
                    format!("pattern {:?} does not compile: {}", pattern.as_str(), e),
                )
                .at(path),
            );
            None
        }
    }
}

fn string_elements(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn quoted(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn run_validator(
    validator: &Validator,
    path: &str,
    value: &Value,
    parent: &Value,
    root: &Value,
    diags: &mut Diagnostics,
) {
    match validator {
        Validator::ExactlyOneOf { paths } => {
            let mut count = usize::from(!value.is_null());
            for other in paths {
                if is_set(resolve(other, parent, root)) {
                    count += 1;
                }
            }
            if count != 1 {
                let names: Vec<String> = std::iter::once(path.to_string())
                    .chain(paths.iter().map(|p| p.name().to_string()))
                    .collect();
                diags.push(
                    Diagnostic::error(
                        "Invalid Attribute Combination",
                        format!(
                            "Exactly one of these attributes must be configured: [{}]",
                            names.join(",")
                        ),
                    )
                    .at(path),
                );
            }
            return;
        }
        _ if value.is_null() => return,
        _ => {}
    }

    match validator {
        Validator::OneOf { values } => {
            for s in string_elements(value) {
                if !values.iter().any(|v| v == s) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value Match",
                            format!(
                                "Attribute {} value must be one of: [{}], got: {:?}",
                                path,
                                quoted(values),
                                s
                            ),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::NoneOf { values } => {
            for s in string_elements(value) {
                if values.iter().any(|v| v == s) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value Match",
                            format!(
                                "Attribute {} value must be none of: [{}], got: {:?}",
                                path,
                                quoted(values),
                                s
                            ),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::Regex { pattern, message } => {
            if let (Some(re), Some(s)) = (compile(pattern, path, diags), value.as_str())
                && !re.is_match(s)
            {
                diags.push(
                    Diagnostic::error(
                        "Invalid Attribute Value Match",
                        format!("Attribute {} {}, got: {:?}", path, message, s),
                    )
                    .at(path),
                );
            }
        }
        Validator::LengthBetween { min, max } => {
            if let Some(s) = value.as_str() {
                let len = s.chars().count();
                if len < *min || len > *max {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value Length",
                            format!(
                                "Attribute {} string length must be between {} and {}, got: {}",
                                path, min, max, len
                            ),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::SizeBetween { min, max } => {
            let len = match value {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => return,
            };
            if len < *min || max.is_some_and(|max| len > max) {
                let bound = match max {
                    Some(max) => format!("between {} and {}", min, max),
                    None => format!("at least {}", min),
                };
                diags.push(
                    Diagnostic::error(
                        "Invalid Attribute Value",
                        format!("Attribute {} must contain {} elements, got: {}", path, bound, len),
                    )
                    .at(path),
                );
            }
        }
        Validator::IntBetween { min, max } => {
            if let Some(n) = value.as_i64()
                && (n < *min || n > *max)
            {
                let detail = if *max == i64::MAX {
                    format!("Attribute {} value must be at least {}, got: {}", path, min, n)
                } else {
                    format!(
                        "Attribute {} value must be between {} and {}, got: {}",
                        path, min, max, n
                    )
                };
                diags.push(Diagnostic::error("Invalid Attribute Value", detail).at(path));
            }
        }
        Validator::ConflictsWith { paths } => {
            for other in paths {
                if is_set(resolve(other, parent, root)) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Combination",
                            format!(
                                "Attribute \"{}\" cannot be specified when \"{}\" is specified",
                                other.name(),
                                path
                            ),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::AlsoRequires { paths } => {
            for other in paths {
                if !is_set(resolve(other, parent, root)) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Combination",
                            format!(
                                "Attribute \"{}\" must be specified when \"{}\" is specified",
                                other.name(),
                                path
                            ),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::KeysMatch { pattern, message } => {
            if let (Some(re), Value::Object(map)) = (compile(pattern, path, diags), value) {
                for key in map.keys().filter(|k| !re.is_match(k)) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value Match",
                            format!("Attribute {} key {} {}", path, key, message),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::KeysOneOf { values } => {
            if let Value::Object(map) = value {
                for key in map.keys().filter(|k| !values.contains(k)) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value Match",
                            format!(
                                "Attribute {} key must be one of: [{}], got: {:?}",
                                path,
                                quoted(values),
                                key
                            ),
                        )
                        .at(path),
                    );
                }
            }
        }
        Validator::ValuesOneOf { values } => {
            if let Value::Object(map) = value {
                for s in map.values().flat_map(string_elements) {
                    if !values.iter().any(|v| v == s) {
                        diags.push(
                            Diagnostic::error(
                                "Invalid Attribute Value Match",
                                format!(
                                    "Attribute {} value must be one of: [{}], got: {:?}",
                                    path,
                                    quoted(values),
                                    s
                                ),
                            )
                            .at(path),
                        );
                    }
                }
            }
        }
        Validator::ExactlyOneOf { .. } => {}
    }
}

fn run_config_validator(validator: &ConfigValidator, document: &Value, diags: &mut Diagnostics) {
    let count_set =
        |names: &[String]| names.iter().filter(|n| is_set(document.get(n.as_str()))).count();
    let (names, verb) = match validator {
        ConfigValidator::ExactlyOneOf(names) if count_set(names) != 1 => {
            (names, "Exactly one of these attributes must be configured")
        }
        ConfigValidator::Conflicting(names) if count_set(names) > 1 => {
            (names, "These attributes cannot be configured together")
        }
        ConfigValidator::AtLeastOneOf(names) if count_set(names) == 0 => {
            (names, "At least one of these attributes must be configured")
        }
        _ => return,
    };
    diags.add_error(
        "Invalid Attribute Combination",
        format!("{}: [{}]", verb, names.join(",")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn disk_like() -> Schema {
        Schema::new("disk")
            .attribute(Attribute::id())
            .attribute(Attribute::required("name", AttributeType::String))
            .attribute(
                Attribute::optional("source_image_id", AttributeType::String).validator(
                    Validator::conflicts_with(vec![
                        AttrPath::root("source_snapshot_id"),
                        AttrPath::root("block_size"),
                    ]),
                ),
            )
            .attribute(Attribute::optional("source_snapshot_id", AttributeType::String))
            .attribute(Attribute::optional_computed("block_size", AttributeType::Int64))
    }

    #[test]
    fn test_missing_required() {
        let diags = validate_document(&disk_like(), &[], &json!({}), Mode::Config);
        assert!(diags.has_error());
        let first = diags.iter().next().unwrap();
        assert_eq!(first.summary, "Missing required argument");
        assert_eq!(first.attribute.as_deref(), Some("name"));
    }

    #[test]
    fn test_conflicts() {
        let doc = json!({"name": "d", "source_image_id": "img", "block_size": 512});
        let diags = validate_document(&disk_like(), &[], &doc, Mode::Config);
        assert_eq!(diags.errors().count(), 1);
        assert!(
            diags
                .iter()
                .next()
                .unwrap()
                .detail
                .contains("\"block_size\" cannot be specified")
        );
    }

    #[test]
    fn test_read_only_attribute_in_config() {
        let doc = json!({"name": "d", "id": "abc"});
        assert!(validate_document(&disk_like(), &[], &doc, Mode::Config).has_error());
        assert!(!validate_document(&disk_like(), &[], &doc, Mode::Plan).has_error());
    }

    #[test]
    fn test_one_of_and_regex() {
        let schema = Schema::new("silo")
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .validator(Validator::regex("^[a-zA-Z0-9-]+$", "must contain only alphanumerics and dashes"))
                    .validator(Validator::length_at_most(63)),
            )
            .attribute(
                Attribute::optional("identity_mode", AttributeType::String)
                    .validator(Validator::one_of(["local_only", "saml_jit"])),
            );

        let ok = json!({"name": "my-silo", "identity_mode": "saml_jit"});
        assert!(validate_document(&schema, &[], &ok, Mode::Config).is_empty());

        let bad = json!({"name": "my silo", "identity_mode": "ldap"});
        let diags = validate_document(&schema, &[], &bad, Mode::Config);
        assert_eq!(diags.errors().count(), 2);
    }

    #[test]
    fn test_nested_set_validation() {
        let schema = Schema::new("rules").attribute(Attribute::required(
            "rules",
            AttributeType::map_of(AttributeType::object(vec![
                Attribute::required("action", AttributeType::String)
                    .validator(Validator::one_of(["allow", "deny"])),
                Attribute::optional(
                    "ports",
                    AttributeType::set_of(AttributeType::String),
                )
                .validator(Validator::size_at_least(1)),
            ])),
        )
        .validator(Validator::keys_match(
            "^[a-z][a-zA-Z0-9-]{0,61}[a-zA-Z0-9]$",
            "must be a valid rule name",
        )));

        let doc = json!({"rules": {
            "allow-ssh": {"action": "allow", "ports": ["22"]},
            "Bad_Name": {"action": "reject", "ports": []}
        }});
        let diags = validate_document(&schema, &[], &doc, Mode::Config);
        let details: Vec<_> = diags.iter().map(|d| d.detail.clone()).collect();
        assert_eq!(diags.errors().count(), 3, "{:?}", details);
        assert!(diags.iter().any(|d| d.attribute.as_deref() == Some("rules[\"Bad_Name\"].action")));
    }

    #[test]
    fn test_sibling_conflicts() {
        let schema = Schema::new("ips").attribute(Attribute::optional(
            "ephemeral",
            AttributeType::set_of(AttributeType::object(vec![
                Attribute::optional_computed("pool_id", AttributeType::String)
                    .validator(Validator::conflicts_with(vec![AttrPath::sibling("ip_version")])),
                Attribute::optional_computed("ip_version", AttributeType::String),
            ])),
        ));
        let doc = json!({"ephemeral": [{"pool_id": "p", "ip_version": "v4"}]});
        assert!(validate_document(&schema, &[], &doc, Mode::Config).has_error());
        let doc = json!({"ephemeral": [{"pool_id": "p"}, {"ip_version": "v6"}]});
        assert!(!validate_document(&schema, &[], &doc, Mode::Config).has_error());
    }

    #[test]
    fn test_config_validators() {
        let schema = Schema::new("external subnet")
            .attribute(Attribute::optional_computed("subnet", AttributeType::Cidr))
            .attribute(Attribute::optional("prefix_len", AttributeType::Int64));
        let validators = [ConfigValidator::ExactlyOneOf(vec![
            "subnet".to_string(),
            "prefix_len".to_string(),
        ])];

        assert!(validate_document(&schema, &validators, &json!({}), Mode::Config).has_error());
        assert!(
            validate_document(&schema, &validators, &json!({"prefix_len": 24}), Mode::Config)
                .is_empty()
        );
        let both = json!({"subnet": "10.0.0.0/24", "prefix_len": 24});
        let diags = validate_document(&schema, &validators, &both, Mode::Config);
        assert_eq!(
            diags.iter().next().unwrap().detail,
            "Exactly one of these attributes must be configured: [subnet,prefix_len]"
        );
    }

    #[test]
    fn test_map_keys_and_values_one_of() {
        let roles = ["admin", "collaborator", "viewer"];
        let schema = Schema::new("silo").attribute(
            Attribute::optional(
                "mapped_fleet_roles",
                AttributeType::map_of(AttributeType::list_of(AttributeType::String)),
            )
            .validator(Validator::keys_one_of(roles))
            .validator(Validator::values_one_of(roles)),
        );
        let doc = json!({"mapped_fleet_roles": {"admin": ["viewer"], "owner": ["root"]}});
        let diags = validate_document(&schema, &[], &doc, Mode::Config);
        assert_eq!(diags.errors().count(), 2);
    }

    #[test]
    fn test_int_between() {
        let schema = Schema::new("x").attribute(
            Attribute::optional("prefix_len", AttributeType::Int64)
                .validator(Validator::int_between(1, 128)),
        );
        assert!(validate_document(&schema, &[], &json!({"prefix_len": 0}), Mode::Config).has_error());
        assert!(validate_document(&schema, &[], &json!({"prefix_len": 64}), Mode::Config).is_empty());
    }
}
