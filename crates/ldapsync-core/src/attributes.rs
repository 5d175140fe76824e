//! Canonical attribute values and the dotted-path attribute space.
//!
//! Canonical users carry a flat map of dotted keys (`name.givenName`,
//! `emails.work.value`). Platform payloads are nested JSON, so this module
//! converts between the two shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Flat map of canonical attribute key to value.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single canonical attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// A string value.
    String(String),
}

impl AttributeValue {
    /// Get as a string slice if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a boolean flag.
    ///
    /// Strings accept `true`/`false`, `yes`/`no` and `1`/`0` in any case.
    /// Integers are true when non-zero. Anything else is `None`.
    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            AttributeValue::Integer(i) => Some(*i != 0),
            AttributeValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
        }
    }

    /// Compare two values, treating differently-typed values with the same
    /// textual form as equal (`"42"` and `42`, `"true"` and `true`).
    #[must_use]
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::String(a), AttributeValue::String(b)) => a == b,
            (AttributeValue::Integer(a), AttributeValue::Integer(b)) => a == b,
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => a == b,
            (a, b) => a.to_string().eq_ignore_ascii_case(&b.to_string()),
        }
    }

    /// Convert to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Boolean(b) => Value::Bool(*b),
            AttributeValue::Integer(i) => Value::from(*i),
            AttributeValue::String(s) => Value::String(s.clone()),
        }
    }

    /// Convert a scalar JSON value. Arrays, objects, nulls and non-integer
    /// numbers have no canonical representation.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            Value::Number(n) => n.as_i64().map(AttributeValue::Integer),
            Value::String(s) => Some(AttributeValue::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

/// Expand dotted keys into a nested JSON object.
///
/// `name.givenName` becomes `{"name": {"givenName": ..}}`. Multi-valued
/// complex attributes keyed by type (`emails.work.value`) become arrays of
/// objects carrying a `type` field; the `work` entry is marked primary.
#[must_use]
pub fn expand_dotted(attributes: &Attributes) -> Map<String, Value> {
    let mut root = Map::new();
    for (key, value) in attributes {
        insert_path(&mut root, key, value.to_json());
    }

    for (name, node) in root.iter_mut() {
        if is_typed_multi_valued(name) {
            if let Value::Object(by_type) = node {
                let entries = std::mem::take(by_type)
                    .into_iter()
                    .map(|(kind, entry)| {
                        let mut entry = match entry {
                            Value::Object(map) => map,
                            other => {
                                let mut map = Map::new();
                                map.insert("value".to_string(), other);
                                map
                            }
                        };
                        entry.insert("primary".to_string(), Value::Bool(kind == "work"));
                        entry.insert("type".to_string(), Value::String(kind));
                        Value::Object(entry)
                    })
                    .collect();
                *node = Value::Array(entries);
            }
        }
    }

    root
}

/// Flatten a platform resource back into dotted keys.
///
/// Inverse of [`expand_dotted`]: nested objects contribute `parent.child`
/// keys and typed arrays (`[{"type": "work", "value": ..}]`) contribute
/// `parent.work.value`. Untyped arrays, nulls and floats are dropped since
/// canonical users never carry them.
#[must_use]
pub fn flatten_resource(resource: &Map<String, Value>) -> Attributes {
    let mut out = Attributes::new();
    flatten_into(&mut out, None, resource);
    out
}

fn flatten_into(out: &mut Attributes, prefix: Option<&str>, object: &Map<String, Value>) {
    for (key, value) in object {
        let path = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&path), inner),
            Value::Array(items) => {
                for item in items {
                    let Value::Object(entry) = item else { continue };
                    let Some(kind) = entry.get("type").and_then(Value::as_str) else {
                        continue;
                    };
                    let mut entry = entry.clone();
                    entry.remove("type");
                    entry.remove("primary");
                    flatten_into(out, Some(&format!("{path}.{kind}")), &entry);
                }
            }
            scalar => {
                if let Some(v) = AttributeValue::from_json(scalar) {
                    out.insert(path, v);
                }
            }
        }
    }
}

fn insert_path(root: &mut Map<String, Value>, key: &str, value: Value) {
    let mut parts = key.split('.').peekable();
    let mut node = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            node.insert(part.to_string(), value);
            return;
        }
        let child = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        match child {
            Value::Object(map) => node = map,
            _ => return,
        }
    }
}

fn is_typed_multi_valued(name: &str) -> bool {
    matches!(
        name,
        "emails" | "phoneNumbers" | "addresses" | "ims" | "photos"
    )
}
