//! Document helpers: null handling, schema-shaped normalisation and
//! type-aware equality.

use crate::schema::{Attribute, AttributeType};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Format a timestamp the way State stores it (RFC-3339, UTC, `Z` suffix).
pub fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Remove null members from every object in the document. Elements of
/// arrays are kept, but objects inside them are cleaned too.
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// Shape `document` so it holds exactly the declared attributes: missing
/// ones become null, undeclared ones are dropped and write-only ones are
/// cleared.
pub fn normalize(attributes: &[Attribute], document: &Value) -> Value {
    let mut out = Map::new();
    for attr in attributes {
        let v = document.get(&attr.name).unwrap_or(&Value::Null);
        let v = if attr.write_only {
            Value::Null
        } else {
            normalize_typed(&attr.ty, v)
        };
        out.insert(attr.name.clone(), v);
    }
    Value::Object(out)
}

fn normalize_typed(ty: &AttributeType, value: &Value) -> Value {
    match (ty, value) {
        (AttributeType::Object(attrs), Value::Object(_)) => normalize(attrs, value),
        (AttributeType::Set(elem) | AttributeType::List(elem), Value::Array(items)) => {
            Value::Array(items.iter().map(|i| normalize_typed(elem, i)).collect())
        }
        (AttributeType::Map(elem), Value::Object(map)) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_typed(elem, v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn is_empty_collection(ty: &AttributeType, value: &Value) -> bool {
    match (ty, value) {
        (AttributeType::Set(_) | AttributeType::List(_), Value::Array(items)) => items.is_empty(),
        (AttributeType::Map(_), Value::Object(map)) => map.is_empty(),
        _ => false,
    }
}

/// Carry the empty-collection shape of `reference` into `document`. A
/// collection the remote reports as empty is projected as null; when the
/// input document held `[]` (or `{}`) for it, the empty value is kept so
/// the next plan sees no change.
pub fn keep_empty_collections(attributes: &[Attribute], reference: &Value, document: Value) -> Value {
    let Value::Object(mut out) = document else {
        return document;
    };
    for attr in attributes {
        let r = reference.get(&attr.name).unwrap_or(&Value::Null);
        let Some(v) = out.get_mut(&attr.name) else {
            continue;
        };
        if v.is_null() && is_empty_collection(&attr.ty, r) {
            *v = r.clone();
        } else if let AttributeType::Object(nested) = &attr.ty
            && v.is_object()
            && r.is_object()
        {
            *v = keep_empty_collections(nested, r, v.take());
        }
    }
    Value::Object(out)
}

/// Semantic equality under the attribute type. Sets compare by content,
/// independent of element order; objects compare attribute by attribute
/// with missing members treated as null.
pub fn values_equal(ty: &AttributeType, a: &Value, b: &Value) -> bool {
    match ty {
        AttributeType::Set(elem) => match (a, b) {
            (Value::Array(xs), Value::Array(ys)) => set_equal(elem, xs, ys),
            _ => a == b,
        },
        AttributeType::List(elem) => match (a, b) {
            (Value::Array(xs), Value::Array(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(elem, x, y))
            }
            _ => a == b,
        },
        AttributeType::Map(elem) => match (a, b) {
            (Value::Object(xs), Value::Object(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(elem, x, y)))
            }
            _ => a == b,
        },
        AttributeType::Object(attrs) => match (a, b) {
            (Value::Object(_), Value::Object(_)) => attrs.iter().all(|attr| {
                values_equal(
                    &attr.ty,
                    a.get(&attr.name).unwrap_or(&Value::Null),
                    b.get(&attr.name).unwrap_or(&Value::Null),
                )
            }),
            _ => a == b,
        },
        _ => a == b,
    }
}

fn set_equal(elem: &AttributeType, xs: &[Value], ys: &[Value]) -> bool {
    if xs.len() != ys.len() {
        return false;
    }
    let mut used = vec![false; ys.len()];
    'outer: for x in xs {
        for (i, y) in ys.iter().enumerate() {
            if !used[i] && values_equal(elem, x, y) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use chrono::TimeZone;
    use serde_json::json;

    fn range_type() -> AttributeType {
        AttributeType::set_of(AttributeType::object(vec![
            Attribute::required("first_address", AttributeType::String),
            Attribute::required("last_address", AttributeType::String),
        ]))
    }

    #[test]
    fn test_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(rfc3339(&ts), "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_strip_nulls() {
        let doc = json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, {"f": null}]});
        assert_eq!(strip_nulls(&doc), json!({"b": {"d": 1}, "e": [null, {}]}));
    }

    #[test]
    fn test_normalize_fills_and_drops() {
        let attrs = vec![
            Attribute::id(),
            Attribute::required("name", AttributeType::String),
            Attribute::optional("secret", AttributeType::String).write_only(),
        ];
        let doc = json!({"name": "web", "extra": true, "secret": "s3cr3t"});
        assert_eq!(
            normalize(&attrs, &doc),
            json!({"id": null, "name": "web", "secret": null})
        );
    }

    #[test]
    fn test_keep_empty_collections() {
        let attrs = vec![
            Attribute::optional("ranges", range_type()),
            Attribute::optional("tags", AttributeType::map_of(AttributeType::String)),
            Attribute::optional("labels", AttributeType::set_of(AttributeType::String)),
            Attribute::optional(
                "external_ips",
                AttributeType::object(vec![Attribute::optional(
                    "floating",
                    AttributeType::set_of(AttributeType::String),
                )]),
            ),
        ];
        let reference = json!({
            "ranges": [],
            "tags": {},
            "labels": null,
            "external_ips": {"floating": []}
        });
        let projected = json!({
            "ranges": null,
            "tags": null,
            "labels": null,
            "external_ips": {"floating": null}
        });
        let out = keep_empty_collections(&attrs, &reference, projected);
        assert_eq!(out["ranges"], json!([]));
        assert_eq!(out["tags"], json!({}));
        assert!(out["labels"].is_null());
        assert_eq!(out["external_ips"]["floating"], json!([]));

        // A non-empty remote collection always wins.
        let out = keep_empty_collections(
            &attrs,
            &reference,
            json!({"ranges": [{"first_address": "a", "last_address": "b"}]}),
        );
        assert_eq!(out["ranges"][0]["first_address"], "a");
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = json!([
            {"first_address": "10.0.0.1", "last_address": "10.0.0.5"},
            {"first_address": "10.0.1.1", "last_address": "10.0.1.5"}
        ]);
        let b = json!([
            {"first_address": "10.0.1.1", "last_address": "10.0.1.5"},
            {"first_address": "10.0.0.1", "last_address": "10.0.0.5"}
        ]);
        assert!(values_equal(&range_type(), &a, &b));

        let c = json!([{"first_address": "10.0.0.1", "last_address": "10.0.0.5"}]);
        assert!(!values_equal(&range_type(), &a, &c));
    }

    #[test]
    fn test_set_equality_counts_duplicates() {
        let ty = AttributeType::set_of(AttributeType::String);
        assert!(!values_equal(&ty, &json!(["a", "a"]), &json!(["a", "b"])));
    }

    #[test]
    fn test_list_equality_is_positional() {
        let ty = AttributeType::list_of(AttributeType::String);
        assert!(!values_equal(&ty, &json!(["a", "b"]), &json!(["b", "a"])));
    }

    #[test]
    fn test_object_missing_member_is_null() {
        let ty = AttributeType::object(vec![
            Attribute::required("type", AttributeType::String),
            Attribute::optional("value", AttributeType::String),
        ]);
        assert!(values_equal(
            &ty,
            &json!({"type": "drop"}),
            &json!({"type": "drop", "value": null})
        ));
    }
}
