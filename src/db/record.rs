// Canonical Record
// Backend-independent values and the record type every result row is delivered as

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat};
use indexmap::{IndexMap, IndexSet};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Largest integer a double can represent exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// A normalized value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Integer within +/-[`MAX_SAFE_INTEGER`]
    Int(i64),
    /// Integer outside the safe range, kept exact
    BigInt(i128),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    LocalDateTime(NaiveDateTime),
    Duration(Duration),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Node(Node),
    Relationship(Relationship),
    Path(Path),
    Point(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Duration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanoseconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub identity: i64,
    pub element_id: String,
    pub labels: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub identity: i64,
    pub element_id: String,
    pub start: i64,
    pub start_node_element_id: String,
    pub end: i64,
    pub end_node_element_id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSegment {
    pub start: Node,
    pub relationship: Relationship,
    pub end: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub start: Node,
    pub end: Node,
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Value {
    /// Classify an integer: `Int` when it is safe to hand to a double-based consumer, `BigInt` otherwise.
    pub fn from_i128(value: i128) -> Value {
        if (-(MAX_SAFE_INTEGER as i128)..=MAX_SAFE_INTEGER as i128).contains(&value) {
            Value::Int(value as i64)
        } else {
            Value::BigInt(value)
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::from_i128(i as i128)
                } else if let Some(u) = n.as_u64() {
                    Value::from_i128(u as i128)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::from_i128(value as i128)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::BigInt(i) => serializer.serialize_str(&i.to_string()),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for byte in bytes {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            Value::Date(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::LocalDateTime(dt) => serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Duration(d) => d.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Node(node) => node.serialize(serializer),
            Value::Relationship(rel) => rel.serialize(serializer),
            Value::Path(path) => path.serialize(serializer),
            Value::Point(point) => point.serialize(serializer),
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// Field names of a record, either flat or grouped by the graph entity that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Fields {
    Keys(Vec<String>),
    /// `[label, property, property, ...]` per label or relationship type
    Groups(Vec<Vec<String>>),
}

impl Fields {
    pub fn is_empty(&self) -> bool {
        match self {
            Fields::Keys(keys) => keys.is_empty(),
            Fields::Groups(groups) => groups.is_empty(),
        }
    }
}

/// One result row. The set of keys is fixed at construction; values can be reassigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: IndexMap<String, Value>,
}

impl Record {
    pub fn new(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Replace the value of an existing field. Returns false if there is no such field.
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        match self.values.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Field names in column order.
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Shallow copy of the backing map.
    pub fn to_object(&self) -> IndexMap<String, Value> {
        self.values.clone()
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.values
    }

    /// Top-level keys, or with `group_by_owner` the property names of every
    /// node, relationship and path found in the values, grouped per label.
    pub fn get_fields(&self, group_by_owner: bool) -> Fields {
        if !group_by_owner {
            return Fields::Keys(self.values.keys().cloned().collect());
        }
        let mut groups = IndexMap::new();
        for value in self.values.values() {
            collect_owned_properties(value, &mut groups);
        }
        Fields::Groups(
            groups
                .into_iter()
                .map(|(owner, props)| std::iter::once(owner).chain(props).collect())
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

static NULL: Value = Value::Null;

impl std::ops::Index<&str> for Record {
    type Output = Value;

    /// Missing fields read as `Null`.
    fn index(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&NULL)
    }
}

fn merge(groups: &mut IndexMap<String, IndexSet<String>>, owner: &str, properties: &IndexMap<String, Value>) {
    groups
        .entry(owner.to_string())
        .or_default()
        .extend(properties.keys().cloned());
}

fn collect_node(node: &Node, groups: &mut IndexMap<String, IndexSet<String>>) {
    for label in &node.labels {
        merge(groups, label, &node.properties);
    }
}

fn collect_owned_properties(value: &Value, groups: &mut IndexMap<String, IndexSet<String>>) {
    match value {
        Value::Node(node) => collect_node(node, groups),
        Value::Relationship(rel) => merge(groups, &rel.rel_type, &rel.properties),
        Value::Path(path) => {
            collect_node(&path.start, groups);
            for segment in &path.segments {
                collect_node(&segment.start, groups);
                merge(groups, &segment.relationship.rel_type, &segment.relationship.properties);
                collect_node(&segment.end, groups);
            }
            collect_node(&path.end, groups);
        }
        Value::List(items) => {
            for item in items {
                collect_owned_properties(item, groups);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn person(id: i64, name: &str) -> Node {
        Node {
            identity: id,
            element_id: format!("4:x:{}", id),
            labels: vec!["Person".to_string()],
            properties: props(&[("name", Value::from(name)), ("age", Value::Int(40))]),
        }
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        Record::new(props(pairs))
    }

    #[test]
    fn test_safe_integer_boundary() {
        assert_eq!(Value::from_i128(MAX_SAFE_INTEGER as i128), Value::Int(MAX_SAFE_INTEGER));
        assert_eq!(Value::from_i128(-(MAX_SAFE_INTEGER as i128)), Value::Int(-MAX_SAFE_INTEGER));

        let big = MAX_SAFE_INTEGER as i128 + 1;
        assert_eq!(Value::from_i128(big), Value::BigInt(big));
        assert_eq!(
            serde_json::to_string(&Value::from_i128(big)).unwrap(),
            r#""9007199254740992""#
        );
    }

    #[test]
    fn test_serialization_matches_backing_map() {
        let map = props(&[("b", Value::Int(1)), ("a", Value::from("x")), ("c", Value::Null)]);
        let record = Record::new(map.clone());
        assert_eq!(record.to_object(), map);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            serde_json::to_string(&Value::Map(map)).unwrap()
        );
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"b":1,"a":"x","c":null}"#);
    }

    #[test]
    fn test_flat_fields_keep_insertion_order() {
        let record = record(&[("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]);
        assert_eq!(
            record.get_fields(false),
            Fields::Keys(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(record.keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_grouped_fields_for_node() {
        let record = record(&[("n", Value::Node(person(1, "Ada")))]);
        assert_eq!(
            record.get_fields(true),
            Fields::Groups(vec![vec!["Person".into(), "name".into(), "age".into()]])
        );
    }

    #[test]
    fn test_grouped_fields_merge_across_values() {
        let mut other = person(2, "Alan");
        other.properties.insert("email".to_string(), Value::from("a@b.c"));
        let rel = Relationship {
            identity: 5,
            element_id: "5".into(),
            start: 1,
            start_node_element_id: "1".into(),
            end: 2,
            end_node_element_id: "2".into(),
            rel_type: "KNOWS".into(),
            properties: props(&[("since", Value::Int(1950))]),
        };
        let record = record(&[
            ("people", Value::List(vec![Value::Node(person(1, "Ada")), Value::Node(other)])),
            ("r", Value::Relationship(rel)),
        ]);

        match record.get_fields(true) {
            Fields::Groups(groups) => {
                assert_eq!(groups.len(), 2);
                let person: std::collections::HashSet<_> = groups[0].iter().cloned().collect();
                assert_eq!(groups[0][0], "Person");
                assert!(person.contains("email") && person.contains("name") && person.contains("age"));
                assert_eq!(groups[1], vec!["KNOWS".to_string(), "since".to_string()]);
            }
            other => panic!("expected groups, got {:?}", other),
        }
    }

    #[test]
    fn test_grouped_fields_without_graph_data() {
        let record = record(&[("x", Value::Int(1)), ("m", Value::Map(props(&[("k", Value::Int(2))])))]);
        assert!(record.get_fields(true).is_empty());
    }

    #[test]
    fn test_set_only_replaces_existing_fields() {
        let mut record = record(&[("a", Value::Int(1))]);
        assert!(record.set("a", Value::from("changed")));
        assert_eq!(record["a"], Value::from("changed"));
        assert!(!record.set("b", Value::Int(2)));
        assert_eq!(record.len(), 1);
        assert_eq!(record["missing"], Value::Null);
    }

    #[test]
    fn test_graph_entities_serialize_like_driver_objects() {
        let node = Value::Node(person(1, "Ada"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["identity"], 1);
        assert_eq!(json["elementId"], "4:x:1");
        assert_eq!(json["labels"], serde_json::json!(["Person"]));
        assert_eq!(json["properties"]["name"], "Ada");

        let point = Value::Point(Point { srid: 7203, x: 1.0, y: 2.0, z: None });
        assert_eq!(
            serde_json::to_value(&point).unwrap(),
            serde_json::json!({"srid": 7203, "x": 1.0, "y": 2.0})
        );
    }
}
