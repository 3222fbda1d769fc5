// PostgreSQL Record Normalization
// Decodes column values straight from the binary protocol and maps them onto canonical values

use std::error::Error;
use std::fmt::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use fallible_iterator::FallibleIterator;
use indexmap::IndexMap;
use postgres_protocol::types::array_from_sql;
use tokio_postgres::types::{FromSql, Kind, Type};

use crate::db::query::{RawResult, ResultSchema};
use crate::db::record::{Duration, Value};
use crate::db::traits::RecordNormalizer;

type DecodeError = Box<dyn Error + Sync + Send>;

/// A column value as PostgreSQL sent it.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal text, including `NaN` and `Infinity`
    Numeric(String),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<PgValue>),
    /// json/jsonb object
    Object(IndexMap<String, PgValue>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(uuid::Uuid),
    Interval { months: i32, days: i32, microseconds: i64 },
    /// A type this crate does not decode; the binary payload is kept
    Unsupported { type_name: String, raw: Vec<u8> },
}

impl PgValue {
    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PgValue::Null,
            serde_json::Value::Bool(b) => PgValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => PgValue::Int(i),
                None if n.is_u64() => PgValue::Numeric(n.to_string()),
                None => PgValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => PgValue::Text(s),
            serde_json::Value::Array(items) => PgValue::Array(items.into_iter().map(PgValue::from_json).collect()),
            serde_json::Value::Object(entries) => PgValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, PgValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// `date`/`timestamp` infinities are sent as the extreme values of their integer encoding.
fn infinity(raw: &[u8]) -> Option<PgValue> {
    let text = match raw.len() {
        4 => match i32::from_be_bytes(raw.try_into().ok()?) {
            i32::MAX => "infinity",
            i32::MIN => "-infinity",
            _ => return None,
        },
        8 => match i64::from_be_bytes(raw.try_into().ok()?) {
            i64::MAX => "infinity",
            i64::MIN => "-infinity",
            _ => return None,
        },
        _ => return None,
    };
    Some(PgValue::Text(text.to_string()))
}

fn read_i16(raw: &[u8], at: usize) -> Result<i16, DecodeError> {
    raw.get(at..at + 2)
        .map(|b| i16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "numeric value truncated".into())
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, DecodeError> {
    read_i16(raw, at).map(|v| v as u16)
}

pub(crate) const NUMERIC_POS: u16 = 0x0000;
pub(crate) const NUMERIC_NEG: u16 = 0x4000;
pub(crate) const NUMERIC_NAN: u16 = 0xC000;
pub(crate) const NUMERIC_PINF: u16 = 0xD000;
pub(crate) const NUMERIC_NINF: u16 = 0xF000;

/// Binary `numeric` (base-10000 digit groups) to decimal text.
pub fn decode_numeric(raw: &[u8]) -> Result<String, DecodeError> {
    let ndigits = read_i16(raw, 0)?;
    let weight = read_i16(raw, 2)? as i32;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{:04x}", other).into()),
    }

    let digits = (0..usize::try_from(ndigits)?)
        .map(|i| read_u16(raw, 8 + i * 2))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |index: i32| -> u16 {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit(i))?;
            } else {
                write!(out, "{:04}", digit(i))?;
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit(index))?;
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn decode_interval(raw: &[u8]) -> Result<PgValue, DecodeError> {
    if raw.len() != 16 {
        return Err("invalid interval length".into());
    }
    let microseconds = i64::from_be_bytes(raw[0..8].try_into()?);
    let days = i32::from_be_bytes(raw[8..12].try_into()?);
    let months = i32::from_be_bytes(raw[12..16].try_into()?);
    Ok(PgValue::Interval {
        months,
        days,
        microseconds,
    })
}

/// `timetz` as `HH:MM:SS[.ffffff]±hh:mm`.
///
/// The wire form is microseconds since midnight followed by the zone offset
/// in seconds *west* of UTC.
fn decode_timetz(raw: &[u8]) -> Result<PgValue, DecodeError> {
    if raw.len() != 12 {
        return Err("invalid timetz length".into());
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into()?);
    let west = i32::from_be_bytes(raw[8..12].try_into()?);
    if !(0..=24 * 3600 * 1_000_000).contains(&micros) {
        return Err(format!("timetz out of range: {}", micros).into());
    }

    let seconds = micros / 1_000_000;
    let mut out = format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60);
    let fraction = micros % 1_000_000;
    if fraction != 0 {
        let digits = format!("{:06}", fraction);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    let east = -i64::from(west);
    let minutes = east.abs() / 60;
    write!(out, "{}{:02}:{:02}", if east < 0 { '-' } else { '+' }, minutes / 60, minutes % 60)?;
    Ok(PgValue::Text(out))
}

/// Arrays of any rank, nested one list per dimension.
fn decode_array(member: &Type, raw: &[u8]) -> Result<PgValue, DecodeError> {
    let array = array_from_sql(raw)?;
    let dimensions: Vec<usize> = array
        .dimensions()
        .map(|dimension| Ok(usize::try_from(dimension.len)?))
        .collect()?;
    let values: Vec<PgValue> = array
        .values()
        .map(|value| PgValue::from_sql_nullable(member, value))
        .collect()?;

    if dimensions.is_empty() {
        return Ok(PgValue::Array(Vec::new()));
    }
    if dimensions.iter().product::<usize>() != values.len() {
        return Err("array dimensions do not match its element count".into());
    }
    Ok(nest(&mut values.into_iter(), &dimensions))
}

fn nest(values: &mut std::vec::IntoIter<PgValue>, dimensions: &[usize]) -> PgValue {
    match dimensions.split_first() {
        Some((len, inner)) => PgValue::Array((0..*len).map(|_| nest(values, inner)).collect()),
        None => values.next().unwrap_or(PgValue::Null),
    }
}

impl<'a> FromSql<'a> for PgValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        if matches!(*ty, Type::DATE | Type::TIMESTAMP | Type::TIMESTAMPTZ) {
            if let Some(value) = infinity(raw) {
                return Ok(value);
            }
        }
        let value = match *ty {
            Type::BOOL => PgValue::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => PgValue::Int(i16::from_sql(ty, raw)? as i64),
            Type::INT4 => PgValue::Int(i32::from_sql(ty, raw)? as i64),
            Type::INT8 => PgValue::Int(i64::from_sql(ty, raw)?),
            Type::OID => PgValue::Int(u32::from_sql(ty, raw)? as i64),
            Type::FLOAT4 => PgValue::Float(f32::from_sql(ty, raw)? as f64),
            Type::FLOAT8 => PgValue::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => PgValue::Numeric(decode_numeric(raw)?),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN | Type::XML => {
                PgValue::Text(String::from_utf8(raw.to_vec())?)
            }
            Type::CHAR => PgValue::Text(char::from(i8::from_sql(ty, raw)? as u8).to_string()),
            Type::BYTEA => PgValue::Bytes(raw.to_vec()),
            Type::JSON | Type::JSONB => PgValue::from_json(serde_json::Value::from_sql(ty, raw)?),
            Type::DATE => PgValue::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIME => PgValue::Time(NaiveTime::from_sql(ty, raw)?),
            Type::TIMETZ => decode_timetz(raw)?,
            Type::TIMESTAMP => PgValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => PgValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::UUID => PgValue::Uuid(uuid::Uuid::from_sql(ty, raw)?),
            Type::INTERVAL => decode_interval(raw)?,
            _ => match ty.kind() {
                Kind::Array(member) => decode_array(member, raw)?,
                Kind::Enum(_) => PgValue::Text(String::from_utf8(raw.to_vec())?),
                Kind::Domain(inner) => PgValue::from_sql(inner, raw)?,
                _ => PgValue::Unsupported {
                    type_name: ty.name().to_string(),
                    raw: raw.to_vec(),
                },
            },
        };
        Ok(value)
    }

    fn from_sql_null(_: &Type) -> Result<Self, DecodeError> {
        Ok(PgValue::Null)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Server type OID → generic type name
static TYPE_NAMES: &[(u32, &str)] = &[
    (16, "boolean"),
    (17, "bytes"),
    (18, "string"),
    (19, "string"),
    (20, "number"),
    (21, "number"),
    (23, "number"),
    (25, "string"),
    (26, "number"),
    (114, "json"),
    (142, "string"),
    (199, "array"),
    (700, "number"),
    (701, "number"),
    (790, "number"),
    (1000, "array"),
    (1001, "array"),
    (1005, "array"),
    (1007, "array"),
    (1009, "array"),
    (1014, "array"),
    (1015, "array"),
    (1016, "array"),
    (1021, "array"),
    (1022, "array"),
    (1042, "string"),
    (1043, "string"),
    (1082, "date"),
    (1083, "time"),
    (1114, "datetime"),
    (1115, "array"),
    (1182, "array"),
    (1184, "datetime"),
    (1185, "array"),
    (1186, "duration"),
    (1231, "array"),
    (1266, "time"),
    (1700, "number"),
    (2950, "uuid"),
    (2951, "array"),
    (3802, "json"),
    (3807, "array"),
];

/// Generic type name for a server type OID, `"unknown"` when not listed.
pub fn type_name(oid: u32) -> &'static str {
    TYPE_NAMES
        .iter()
        .find(|(id, _)| *id == oid)
        .map(|(_, generic)| *generic)
        .unwrap_or("unknown")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresRecordNormalizer;

/// Integers go through the same safe-range check as graph integers.
fn numeric_value(text: &str) -> Value {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = text.parse::<i128>() {
            return Value::from_i128(i);
        }
    }
    Value::String(text.to_string())
}

impl RecordNormalizer for PostgresRecordNormalizer {
    type Native = PgValue;

    fn is_null(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Null)
    }

    fn convert_primitive(&self, value: &PgValue) -> Option<Value> {
        match value {
            PgValue::Bool(b) => Some(Value::Bool(*b)),
            PgValue::Int(i) => Some(Value::from_i128(*i as i128)),
            PgValue::Float(f) => Some(Value::Float(*f)),
            PgValue::Numeric(text) => Some(numeric_value(text)),
            PgValue::Text(s) => Some(Value::String(s.clone())),
            PgValue::Uuid(u) => Some(Value::String(u.to_string())),
            PgValue::Bytes(b) => Some(Value::Bytes(b.clone())),
            _ => None,
        }
    }

    fn convert_temporal(&self, value: &PgValue) -> Option<Value> {
        match value {
            PgValue::Date(d) => Some(Value::Date(*d)),
            PgValue::Time(t) => Some(Value::String(t.to_string())),
            PgValue::Timestamp(ts) => Some(Value::LocalDateTime(*ts)),
            PgValue::TimestampTz(ts) => Some(Value::DateTime(ts.fixed_offset())),
            PgValue::Interval {
                months,
                days,
                microseconds,
            } => Some(Value::Duration(Duration {
                months: *months as i64,
                days: *days as i64,
                seconds: microseconds.div_euclid(1_000_000),
                nanoseconds: microseconds.rem_euclid(1_000_000) * 1_000,
            })),
            _ => None,
        }
    }

    fn list_items<'a>(&self, value: &'a PgValue) -> Option<&'a [PgValue]> {
        match value {
            PgValue::Array(items) => Some(items),
            _ => None,
        }
    }

    fn map_entries<'a>(&self, value: &'a PgValue) -> Option<Vec<(&'a str, &'a PgValue)>> {
        match value {
            PgValue::Object(entries) => Some(entries.iter().map(|(k, v)| (k.as_str(), v)).collect()),
            _ => None,
        }
    }

    fn passthrough(&self, value: &PgValue) -> Value {
        match value {
            PgValue::Unsupported { raw, .. } => Value::Bytes(raw.clone()),
            _ => Value::Null,
        }
    }

    fn result_schema(&self, result: &RawResult<PgValue>) -> ResultSchema {
        ResultSchema::Relational(result.columns.clone())
    }
}
