// Bolt Query Parameters
// JSON parameters to Bolt values; integers stay integers so Cypher sees INTEGER

use std::collections::HashMap;

use boltr::types::{BoltDict, BoltValue};
use indexmap::IndexMap;

/// Named parameters for RUN.
pub fn bolt_parameters(params: Option<&IndexMap<String, serde_json::Value>>) -> HashMap<String, BoltValue> {
    params
        .into_iter()
        .flatten()
        .map(|(key, value)| (key.clone(), json_to_bolt(value)))
        .collect()
}

/// Integers beyond `i64` are sent as their exact decimal text rather than a lossy float.
pub fn json_to_bolt(value: &serde_json::Value) -> BoltValue {
    match value {
        serde_json::Value::Null => BoltValue::Null,
        serde_json::Value::Bool(b) => BoltValue::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => BoltValue::Integer(i),
            None if n.is_u64() => BoltValue::String(n.to_string()),
            None => BoltValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => BoltValue::String(s.clone()),
        serde_json::Value::Array(items) => BoltValue::List(items.iter().map(json_to_bolt).collect()),
        serde_json::Value::Object(entries) => BoltValue::Dict(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_bolt(v)))
                .collect::<BoltDict>(),
        ),
    }
}
