//! Flattening STIX attributes into scalar graph properties

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar value a graph property can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Integer(n) => write!(f, "{}", n),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

/// Property map stored on a node or edge. Ordered for deterministic comparison.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Encode a composite value (object or array) as compact JSON
pub fn encode_composite(value: &Value) -> String {
    // Value's Display is infallible compact JSON
    value.to_string()
}

/// Exact inverse of [`encode_composite`]
pub fn decode_composite(encoded: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(encoded)
}

/// Project a single JSON value to a storable scalar
pub fn project_value(value: &Value) -> PropertyValue {
    match value {
        Value::Null => PropertyValue::Null,
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => PropertyValue::Integer(i),
            None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => PropertyValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => PropertyValue::Text(encode_composite(value)),
    }
}

/// Project every attribute of a STIX object record
pub fn project(fields: &Map<String, Value>) -> PropertyMap {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), project_value(value)))
        .collect()
}
