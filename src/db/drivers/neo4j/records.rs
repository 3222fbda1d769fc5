// Neo4j Record Normalization
// Converts Bolt values (graph, temporal and spatial structures) into canonical values

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::{IndexMap, IndexSet};

use crate::bolt::path::element_id_or;
use crate::bolt::{BoltDict, BoltNode, BoltPath, BoltRelationship, BoltValue, ResolvedPath};
use crate::db::query::{RawResult, ResultSchema};
use crate::db::record::{Duration, Node, Path, PathSegment, Point, Relationship, Value};
use crate::db::traits::RecordNormalizer;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i64 = 719_163;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct Neo4jRecordNormalizer;

impl Neo4jRecordNormalizer {
    /// Bolt dictionaries are unordered; keys come out sorted.
    fn properties(&self, properties: &BoltDict) -> IndexMap<String, Value> {
        sorted_entries(properties)
            .into_iter()
            .map(|(key, value)| (key.to_string(), self.normalize_value(value)))
            .collect()
    }

    fn node(&self, node: &BoltNode) -> Node {
        Node {
            identity: node.id,
            element_id: element_id_or(&node.element_id, node.id),
            labels: node.labels.clone(),
            properties: self.properties(&node.properties),
        }
    }

    fn relationship(&self, rel: &BoltRelationship) -> Relationship {
        Relationship {
            identity: rel.id,
            element_id: element_id_or(&rel.element_id, rel.id),
            start: rel.start_node_id,
            start_node_element_id: element_id_or(&rel.start_element_id, rel.start_node_id),
            end: rel.end_node_id,
            end_node_element_id: element_id_or(&rel.end_element_id, rel.end_node_id),
            rel_type: rel.rel_type.clone(),
            properties: self.properties(&rel.properties),
        }
    }

    fn path(&self, path: &ResolvedPath) -> Path {
        Path {
            start: self.node(&path.start),
            end: self.node(&path.end),
            segments: path
                .segments
                .iter()
                .map(|segment| PathSegment {
                    start: self.node(&segment.start),
                    relationship: self.relationship(&segment.relationship),
                    end: self.node(&segment.end),
                })
                .collect(),
        }
    }
}

fn sorted_entries(dict: &BoltDict) -> Vec<(&str, &BoltValue)> {
    let mut entries: Vec<_> = dict.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries
}

fn date_from_epoch_days(days: i64) -> Option<NaiveDate> {
    i32::try_from(days.checked_add(UNIX_EPOCH_CE_DAYS)?)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}

/// `HH:mm:ss.nnnnnnnnn`
fn format_local_time(nanos_of_day: i64) -> Option<String> {
    if !(0..24 * 3600 * NANOS_PER_SECOND).contains(&nanos_of_day) {
        return None;
    }
    let seconds = nanos_of_day / NANOS_PER_SECOND;
    let nanos = nanos_of_day % NANOS_PER_SECOND;
    Some(format!(
        "{:02}:{:02}:{:02}.{:09}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        nanos
    ))
}

/// `±HH:mm`
fn format_offset(offset_seconds: i64) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let minutes = offset_seconds.abs() / 60;
    format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}

fn instant(seconds: i64, nanoseconds: i64, offset_seconds: i64) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(i32::try_from(offset_seconds).ok()?)?;
    let utc = DateTime::from_timestamp(seconds, u32::try_from(nanoseconds).ok()?)?;
    Some(utc.with_timezone(&offset))
}

impl RecordNormalizer for Neo4jRecordNormalizer {
    type Native = BoltValue;

    fn is_null(&self, value: &BoltValue) -> bool {
        matches!(value, BoltValue::Null)
    }

    fn convert_primitive(&self, value: &BoltValue) -> Option<Value> {
        match value {
            BoltValue::Boolean(b) => Some(Value::Bool(*b)),
            BoltValue::Integer(i) => Some(Value::from_i128(*i as i128)),
            BoltValue::Float(f) => Some(Value::Float(*f)),
            BoltValue::String(s) => Some(Value::String(s.clone())),
            BoltValue::Bytes(b) => Some(Value::Bytes(b.clone())),
            _ => None,
        }
    }

    fn convert_temporal(&self, value: &BoltValue) -> Option<Value> {
        match value {
            BoltValue::Date(date) => date_from_epoch_days(date.days).map(Value::Date),
            BoltValue::Time(time) => format_local_time(time.nanoseconds)
                .map(|text| Value::String(format!("{}{}", text, format_offset(time.tz_offset_seconds)))),
            BoltValue::LocalTime(time) => format_local_time(time.nanoseconds).map(Value::String),
            BoltValue::DateTime(dt) => instant(dt.seconds, dt.nanoseconds, dt.tz_offset_seconds).map(Value::DateTime),
            // No zone database here: keep the instant, expressed in UTC
            BoltValue::DateTimeZoneId(dt) => instant(dt.seconds, dt.nanoseconds, 0).map(Value::DateTime),
            BoltValue::LocalDateTime(dt) => {
                instant(dt.seconds, dt.nanoseconds, 0).map(|utc| Value::LocalDateTime(utc.naive_utc()))
            }
            BoltValue::Duration(d) => Some(Value::Duration(Duration {
                months: d.months,
                days: d.days,
                seconds: d.seconds,
                nanoseconds: d.nanoseconds,
            })),
            _ => None,
        }
    }

    fn convert_graph_object(&self, value: &BoltValue) -> Option<Value> {
        match value {
            BoltValue::Node(node) => Some(Value::Node(self.node(node))),
            BoltValue::Relationship(rel) => Some(Value::Relationship(self.relationship(rel))),
            BoltValue::Path(path) => match ResolvedPath::resolve(path) {
                Ok(resolved) => Some(Value::Path(self.path(&resolved))),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed path in Bolt record");
                    None
                }
            },
            BoltValue::Point2D(p) => Some(Value::Point(Point {
                srid: p.srid,
                x: p.x,
                y: p.y,
                z: None,
            })),
            BoltValue::Point3D(p) => Some(Value::Point(Point {
                srid: p.srid,
                x: p.x,
                y: p.y,
                z: Some(p.z),
            })),
            _ => None,
        }
    }

    fn list_items<'a>(&self, value: &'a BoltValue) -> Option<&'a [BoltValue]> {
        match value {
            BoltValue::List(items) => Some(items),
            _ => None,
        }
    }

    fn map_entries<'a>(&self, value: &'a BoltValue) -> Option<Vec<(&'a str, &'a BoltValue)>> {
        match value {
            BoltValue::Dict(dict) => Some(sorted_entries(dict)),
            _ => None,
        }
    }

    /// Values chrono cannot represent keep their raw components.
    fn passthrough(&self, value: &BoltValue) -> Value {
        let components = |pairs: &[(&str, i64)]| {
            Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::from(*v)))
                    .collect(),
            )
        };
        match value {
            BoltValue::Date(date) => components(&[("days", date.days)]),
            BoltValue::Time(time) => components(&[
                ("nanoseconds", time.nanoseconds),
                ("tzOffsetSeconds", time.tz_offset_seconds),
            ]),
            BoltValue::LocalTime(time) => components(&[("nanoseconds", time.nanoseconds)]),
            BoltValue::DateTime(dt) => components(&[
                ("seconds", dt.seconds),
                ("nanoseconds", dt.nanoseconds),
                ("tzOffsetSeconds", dt.tz_offset_seconds),
            ]),
            BoltValue::DateTimeZoneId(dt) => {
                let mut map = IndexMap::new();
                map.insert("seconds".to_string(), Value::from(dt.seconds));
                map.insert("nanoseconds".to_string(), Value::from(dt.nanoseconds));
                map.insert("timeZoneId".to_string(), Value::String(dt.tz_id.clone()));
                Value::Map(map)
            }
            BoltValue::LocalDateTime(dt) => components(&[("seconds", dt.seconds), ("nanoseconds", dt.nanoseconds)]),
            BoltValue::UnboundRelationship(rel) => {
                let mut map = IndexMap::new();
                map.insert("identity".to_string(), Value::from(rel.id));
                map.insert("type".to_string(), Value::String(rel.rel_type.clone()));
                map.insert("properties".to_string(), Value::Map(self.properties(&rel.properties)));
                Value::Map(map)
            }
            // A path whose indices do not line up: keep what was sent
            BoltValue::Path(path) => {
                let mut map = IndexMap::new();
                map.insert(
                    "nodes".to_string(),
                    Value::List(path.nodes.iter().map(|n| Value::Node(self.node(n))).collect()),
                );
                map.insert(
                    "indices".to_string(),
                    Value::List(path.indices.iter().map(|i| Value::from(*i)).collect()),
                );
                Value::Map(map)
            }
            _ => Value::Null,
        }
    }

    fn result_schema(&self, result: &RawResult<BoltValue>) -> ResultSchema {
        let mut groups: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for row in &result.rows {
            for value in row {
                collect_schema(value, &mut groups);
            }
        }
        ResultSchema::Graph(
            groups
                .into_iter()
                .map(|(owner, props)| std::iter::once(owner).chain(props).collect())
                .collect(),
        )
    }
}

fn add_owner(groups: &mut IndexMap<String, IndexSet<String>>, owner: &str, properties: &BoltDict) {
    groups
        .entry(owner.to_string())
        .or_default()
        .extend(sorted_entries(properties).into_iter().map(|(key, _)| key.to_string()));
}

fn add_node(groups: &mut IndexMap<String, IndexSet<String>>, node: &BoltNode) {
    for label in &node.labels {
        add_owner(groups, label, &node.properties);
    }
}

fn collect_schema(value: &BoltValue, groups: &mut IndexMap<String, IndexSet<String>>) {
    match value {
        BoltValue::Node(node) => add_node(groups, node),
        BoltValue::Relationship(rel) => add_owner(groups, &rel.rel_type, &rel.properties),
        BoltValue::Path(path) => collect_path_schema(path, groups),
        BoltValue::List(items) => {
            for item in items {
                collect_schema(item, groups);
            }
        }
        _ => {}
    }
}

fn collect_path_schema(path: &BoltPath, groups: &mut IndexMap<String, IndexSet<String>>) {
    match ResolvedPath::resolve(path) {
        Ok(resolved) => {
            for segment in &resolved.segments {
                add_node(groups, &segment.start);
                add_owner(groups, &segment.relationship.rel_type, &segment.relationship.properties);
                add_node(groups, &segment.end);
            }
            add_node(groups, &resolved.start);
        }
        Err(_) => path.nodes.iter().for_each(|node| add_node(groups, node)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::BoltUnboundRelationship;
    use crate::db::record::MAX_SAFE_INTEGER;
    use boltr::types::{BoltDate, BoltDateTime, BoltDuration, BoltLocalTime, BoltPoint3D, BoltTime};

    fn normalize(value: BoltValue) -> Value {
        Neo4jRecordNormalizer.normalize_value(&value)
    }

    fn person(id: i64) -> BoltNode {
        let mut properties = BoltDict::new();
        properties.insert("name".to_string(), BoltValue::from("Ada"));
        properties.insert("born".to_string(), BoltValue::Integer(1815));
        BoltNode {
            id,
            labels: vec!["Person".to_string()],
            properties,
            element_id: format!("4:abc:{}", id),
        }
    }

    #[test]
    fn test_integers_keep_precision() {
        assert_eq!(normalize(BoltValue::Integer(42)), Value::Int(42));
        let big = MAX_SAFE_INTEGER + 10;
        assert_eq!(normalize(BoltValue::Integer(big)), Value::BigInt(big as i128));
        assert_eq!(normalize(BoltValue::Integer(i64::MIN)), Value::BigInt(i64::MIN as i128));
    }

    #[test]
    fn test_temporal_values() {
        assert_eq!(
            normalize(BoltValue::Date(BoltDate { days: 19_000 })),
            Value::Date(NaiveDate::from_ymd_opt(2022, 1, 8).unwrap())
        );
        assert_eq!(
            normalize(BoltValue::LocalTime(BoltLocalTime {
                nanoseconds: 3_723_000_000_005
            })),
            Value::from("01:02:03.000000005")
        );
        assert_eq!(
            normalize(BoltValue::Time(BoltTime {
                nanoseconds: 0,
                tz_offset_seconds: -5_400
            })),
            Value::from("00:00:00.000000000-01:30")
        );

        let dt = normalize(BoltValue::DateTime(BoltDateTime {
            seconds: 0,
            nanoseconds: 0,
            tz_offset_seconds: 3600,
        }));
        match dt {
            Value::DateTime(dt) => {
                assert_eq!(dt.timestamp(), 0);
                assert_eq!(dt.offset().local_minus_utc(), 3600);
                assert_eq!(dt.to_rfc3339(), "1970-01-01T01:00:00+01:00");
            }
            other => panic!("expected datetime, got {:?}", other),
        }

        assert_eq!(
            normalize(BoltValue::Duration(BoltDuration {
                months: 1,
                days: 2,
                seconds: 3,
                nanoseconds: 4
            })),
            Value::Duration(Duration {
                months: 1,
                days: 2,
                seconds: 3,
                nanoseconds: 4
            })
        );
    }

    #[test]
    fn test_out_of_range_date_keeps_components() {
        let value = normalize(BoltValue::Date(BoltDate { days: i64::MAX }));
        assert_eq!(value.as_map().unwrap()["days"], Value::BigInt(i64::MAX as i128));
    }

    #[test]
    fn test_node_and_relationship_shapes() {
        let node = normalize(BoltValue::Node(person(7)));
        let node = node.as_node().unwrap();
        assert_eq!(node.identity, 7);
        assert_eq!(node.element_id, "4:abc:7");
        assert_eq!(node.properties["born"], Value::Int(1815));
        let keys: Vec<_> = node.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["born", "name"]);

        let rel = BoltRelationship {
            id: 3,
            start_node_id: 7,
            end_node_id: 8,
            rel_type: "KNOWS".to_string(),
            properties: BoltDict::new(),
            element_id: String::new(),
            start_element_id: String::new(),
            end_element_id: String::new(),
        };
        match normalize(BoltValue::Relationship(rel)) {
            Value::Relationship(rel) => {
                assert_eq!(rel.element_id, "3");
                assert_eq!((rel.start, rel.end), (7, 8));
                assert_eq!(rel.start_node_element_id, "7");
            }
            other => panic!("expected relationship, got {:?}", other),
        }
    }

    #[test]
    fn test_points() {
        assert_eq!(
            normalize(BoltValue::Point3D(BoltPoint3D {
                srid: 9157,
                x: 1.0,
                y: 2.0,
                z: 3.0
            })),
            Value::Point(Point {
                srid: 9157,
                x: 1.0,
                y: 2.0,
                z: Some(3.0)
            })
        );
    }

    #[test]
    fn test_nested_collections() {
        let mut map = BoltDict::new();
        map.insert("people".to_string(), BoltValue::List(vec![BoltValue::Node(person(1))]));
        map.insert("count".to_string(), BoltValue::Integer(1));
        let value = normalize(BoltValue::Dict(map));
        let entries = value.as_map().unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["count", "people"]);
        let people = entries["people"].as_list().unwrap();
        assert_eq!(people[0].as_node().unwrap().labels, vec!["Person"]);
    }

    fn knows() -> BoltUnboundRelationship {
        BoltUnboundRelationship {
            id: 10,
            rel_type: "KNOWS".to_string(),
            properties: BoltDict::from([("since".to_string(), BoltValue::Integer(2000))]),
            element_id: String::new(),
        }
    }

    #[test]
    fn test_paths_resolve_relationship_direction() {
        // (1)<-[:KNOWS]-(2)
        let path = BoltPath {
            nodes: vec![person(1), person(2)],
            rels: vec![knows()],
            indices: vec![-1, 1],
        };
        match normalize(BoltValue::Path(path)) {
            Value::Path(path) => {
                assert_eq!(path.start.identity, 1);
                assert_eq!(path.end.identity, 2);
                let rel = &path.segments[0].relationship;
                assert_eq!((rel.start, rel.end), (2, 1));
                assert_eq!(rel.end_node_element_id, "4:abc:1");
            }
            other => panic!("expected path, got {:?}", other),
        }

        let broken = BoltPath {
            nodes: vec![person(1)],
            rels: vec![],
            indices: vec![1, 4],
        };
        let value = normalize(BoltValue::Path(broken));
        assert_eq!(value.as_map().unwrap()["nodes"].as_list().unwrap().len(), 1);
    }

    #[test]
    fn test_result_schema_from_paths() {
        let path = BoltPath {
            nodes: vec![person(1), person(2)],
            rels: vec![knows()],
            indices: vec![1, 1],
        };
        let result = RawResult {
            fields: vec!["p".to_string()].into(),
            rows: vec![vec![BoltValue::Path(path)]],
            columns: Vec::new(),
        };
        match Neo4jRecordNormalizer.result_schema(&result) {
            ResultSchema::Graph(groups) => {
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[0], vec!["Person", "born", "name"]);
                assert_eq!(groups[1], vec!["KNOWS", "since"]);
            }
            other => panic!("expected graph schema, got {:?}", other),
        }
    }
}
