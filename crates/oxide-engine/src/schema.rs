//! Attribute model
//!
//! A resource declares its [`Schema`]: an ordered list of [`Attribute`]
//! descriptors. Each descriptor carries a semantic type, a [`Role`], the
//! validators that run before any remote call and the plan modifiers that
//! derive the Plan from Config and prior State.

use crate::timeouts::Phase;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};

/// Semantic attribute types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Int64,
    Int32,
    Bool,
    /// RFC-3339 timestamp
    Timestamp,
    /// IP prefix in canonical string form
    Cidr,
    /// Nested record
    Object(Vec<Attribute>),
    /// Order-insensitive collection
    Set(Box<AttributeType>),
    List(Box<AttributeType>),
    /// String-keyed map
    Map(Box<AttributeType>),
}

impl AttributeType {
    pub fn object(attributes: Vec<Attribute>) -> Self {
        Self::Object(attributes)
    }

    pub fn set_of(element: AttributeType) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn list_of(element: AttributeType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn map_of(element: AttributeType) -> Self {
        Self::Map(Box::new(element))
    }

    /// Attributes of the nested record, if this type is one
    pub fn nested_attributes(&self) -> Option<&[Attribute]> {
        match self {
            Self::Object(attrs) => Some(attrs),
            _ => None,
        }
    }
}

/// How an attribute is populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Required,
    Optional,
    Computed,
    OptionalComputed,
}

impl Role {
    pub fn is_computed(self) -> bool {
        matches!(self, Role::Computed | Role::OptionalComputed)
    }

    /// Whether the user may set the attribute in Config
    pub fn is_configurable(self) -> bool {
        !matches!(self, Role::Computed)
    }
}

/// Plan modifiers, applied in declared order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PlanModifier {
    UseStateForUnknown,
    RequiresReplace,
    RequiresReplaceIfConfigured,
    Default(Value),
}

/// Attribute path used by cross-attribute validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "name", rename_all = "snake_case")]
pub enum AttrPath {
    /// Top-level attribute of the resource
    Root(String),
    /// Attribute of the same nested record
    Sibling(String),
}

impl AttrPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self::Root(name.into())
    }

    pub fn sibling(name: impl Into<String>) -> Self {
        Self::Sibling(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Root(n) | Self::Sibling(n) => n,
        }
    }
}

/// A regular expression, compiled on first use. Clones share the compiled
/// form, so a schema built once compiles each pattern once.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: Arc<OnceLock<std::result::Result<Regex, regex::Error>>>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: Arc::new(OnceLock::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> std::result::Result<&Regex, &regex::Error> {
        self.compiled
            .get_or_init(|| Regex::new(&self.source))
            .as_ref()
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

/// Attribute validators
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validator {
    /// String (or each string element of a collection) must be one of the values
    OneOf { values: Vec<String> },
    /// String (or each string element of a collection) must not be one of the values
    NoneOf { values: Vec<String> },
    Regex { pattern: Pattern, message: String },
    LengthBetween { min: usize, max: usize },
    /// Number of elements in a collection
    SizeBetween { min: usize, max: Option<usize> },
    IntBetween { min: i64, max: i64 },
    ConflictsWith { paths: Vec<AttrPath> },
    AlsoRequires { paths: Vec<AttrPath> },
    ExactlyOneOf { paths: Vec<AttrPath> },
    KeysMatch { pattern: Pattern, message: String },
    KeysOneOf { values: Vec<String> },
    /// Map values (or the elements of list-valued map entries) must be one of the values
    ValuesOneOf { values: Vec<String> },
}

fn strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

impl Validator {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf {
            values: strings(values),
        }
    }

    pub fn none_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::NoneOf {
            values: strings(values),
        }
    }

    pub fn regex(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Regex {
            pattern: Pattern::new(pattern),
            message: message.into(),
        }
    }

    pub fn length_at_most(max: usize) -> Self {
        Self::LengthBetween { min: 0, max }
    }

    pub fn size_between(min: usize, max: usize) -> Self {
        Self::SizeBetween {
            min,
            max: Some(max),
        }
    }

    pub fn size_at_least(min: usize) -> Self {
        Self::SizeBetween { min, max: None }
    }

    pub fn int_between(min: i64, max: i64) -> Self {
        Self::IntBetween { min, max }
    }

    pub fn int_at_least(min: i64) -> Self {
        Self::IntBetween { min, max: i64::MAX }
    }

    pub fn conflicts_with(paths: Vec<AttrPath>) -> Self {
        Self::ConflictsWith { paths }
    }

    pub fn also_requires(paths: Vec<AttrPath>) -> Self {
        Self::AlsoRequires { paths }
    }

    pub fn exactly_one_of(paths: Vec<AttrPath>) -> Self {
        Self::ExactlyOneOf { paths }
    }

    pub fn keys_match(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KeysMatch {
            pattern: Pattern::new(pattern),
            message: message.into(),
        }
    }

    pub fn keys_one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::KeysOneOf {
            values: strings(values),
        }
    }

    pub fn values_one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ValuesOneOf {
            values: strings(values),
        }
    }
}

/// Declarative cross-attribute validators over the whole Config document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "attributes", rename_all = "snake_case")]
pub enum ConfigValidator {
    ExactlyOneOf(Vec<String>),
    Conflicting(Vec<String>),
    AtLeastOneOf(Vec<String>),
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Attribute descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: AttributeType,

    pub role: Role,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,

    /// Sent to the remote but never persisted to State
    #[serde(skip_serializing_if = "is_false")]
    pub write_only: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_modifiers: Vec<PlanModifier>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttributeType, role: Role) -> Self {
        Self {
            name: name.into(),
            ty,
            role,
            description: String::new(),
            sensitive: false,
            write_only: false,
            deprecation_message: None,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
        }
    }

    pub fn required(name: impl Into<String>, ty: AttributeType) -> Self {
        Self::new(name, ty, Role::Required)
    }

    pub fn optional(name: impl Into<String>, ty: AttributeType) -> Self {
        Self::new(name, ty, Role::Optional)
    }

    pub fn computed(name: impl Into<String>, ty: AttributeType) -> Self {
        Self::new(name, ty, Role::Computed)
    }

    pub fn optional_computed(name: impl Into<String>, ty: AttributeType) -> Self {
        Self::new(name, ty, Role::OptionalComputed)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = Some(message.into());
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn plan_modifier(mut self, modifier: PlanModifier) -> Self {
        self.plan_modifiers.push(modifier);
        self
    }

    pub fn requires_replace(self) -> Self {
        self.plan_modifier(PlanModifier::RequiresReplace)
    }

    pub fn requires_replace_if_configured(self) -> Self {
        self.plan_modifier(PlanModifier::RequiresReplaceIfConfigured)
    }

    pub fn use_state_for_unknown(self) -> Self {
        self.plan_modifier(PlanModifier::UseStateForUnknown)
    }

    pub fn default_value(self, value: Value) -> Self {
        self.plan_modifier(PlanModifier::Default(value))
    }

    pub fn has_modifier(&self, modifier: &PlanModifier) -> bool {
        self.plan_modifiers.iter().any(|m| m == modifier)
    }

    pub fn static_default(&self) -> Option<&Value> {
        self.plan_modifiers.iter().find_map(|m| match m {
            PlanModifier::Default(v) => Some(v),
            _ => None,
        })
    }

    /// System-assigned identifier
    pub fn id() -> Self {
        Self::computed("id", AttributeType::String)
            .description("Unique, immutable, system-controlled identifier.")
            .use_state_for_unknown()
    }

    pub fn time_created() -> Self {
        Self::computed("time_created", AttributeType::Timestamp)
            .description("Timestamp of when this resource was created.")
    }

    pub fn time_modified() -> Self {
        Self::computed("time_modified", AttributeType::Timestamp)
            .description("Timestamp of when this resource was last modified.")
    }

    /// The `timeouts` sub-record carrying one duration string per phase
    pub fn timeouts(phases: &[Phase]) -> Self {
        let nested = phases
            .iter()
            .map(|phase| {
                Attribute::optional(phase.as_str(), AttributeType::String).description(format!(
                    "Duration string such as \"30s\" or \"2h45m\" bounding the {} phase.",
                    phase
                ))
            })
            .collect();
        Self::optional("timeouts", AttributeType::Object(nested))
    }
}

/// Resource schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub version: i64,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: 0,
            description: description.into(),
            attributes: Vec::new(),
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// A document holding every declared attribute, all null
    pub fn null_document(&self) -> Value {
        let map: Map<String, Value> = self
            .attributes
            .iter()
            .map(|a| (a.name.clone(), Value::Null))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pattern_compiled_once_across_clones() {
        let validator = Validator::regex("^[a-z]+$", "must be lowercase");
        let copy = validator.clone();
        let (Validator::Regex { pattern: a, .. }, Validator::Regex { pattern: b, .. }) =
            (&validator, &copy)
        else {
            panic!("expected regex validators");
        };
        let first = a.regex().unwrap();
        assert!(first.is_match("web"));
        assert!(std::ptr::eq(first, b.regex().unwrap()));
        assert_eq!(serde_json::to_value(a).unwrap(), json!("^[a-z]+$"));

        assert!(Pattern::new("[").regex().is_err());
    }

    #[test]
    fn test_builder() {
        let attr = Attribute::optional_computed("block_size", AttributeType::Int64)
            .requires_replace()
            .use_state_for_unknown();

        assert_eq!(attr.role, Role::OptionalComputed);
        assert!(attr.has_modifier(&PlanModifier::RequiresReplace));
        assert!(attr.has_modifier(&PlanModifier::UseStateForUnknown));
        assert!(attr.static_default().is_none());
    }

    #[test]
    fn test_default_lookup() {
        let attr = Attribute::optional_computed("identity_mode", AttributeType::String)
            .default_value(json!("local_only"));
        assert_eq!(attr.static_default(), Some(&json!("local_only")));
    }

    #[test]
    fn test_timeouts_attribute() {
        let attr = Attribute::timeouts(&[Phase::Create, Phase::Read, Phase::Delete]);
        let nested = attr.ty.nested_attributes().unwrap();
        let names: Vec<_> = nested.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["create", "read", "delete"]);
    }

    #[test]
    fn test_null_document() {
        let schema = Schema::new("test")
            .attribute(Attribute::id())
            .attribute(Attribute::required("name", AttributeType::String));
        assert_eq!(schema.null_document(), json!({"id": null, "name": null}));
    }

    #[test]
    fn test_schema_serializes() {
        let schema = Schema::new("test").attribute(
            Attribute::required("policy", AttributeType::String)
                .validator(Validator::one_of(["allow", "fail"])),
        );
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["attributes"][0]["type"]["kind"], "string");
        assert_eq!(json["attributes"][0]["validators"][0]["kind"], "one_of");
    }
}
