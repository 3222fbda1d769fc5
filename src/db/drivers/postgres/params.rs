// PostgreSQL Parameter Binding
// Orders "0","1",... keyed params positionally and binds JSON values to the types the server infers

use std::error::Error;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};

use super::records::{NUMERIC_NAN, NUMERIC_NEG, NUMERIC_NINF, NUMERIC_PINF, NUMERIC_POS};

type EncodeError = Box<dyn Error + Sync + Send>;

/// Canonical array index: decimal without leading zeros, below `u32::MAX`.
fn array_index(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

/// Parameter values in placeholder order.
///
/// Index-like keys come first in ascending numeric order, then every other
/// key in insertion order, so `{"1": b, "0": a}` binds `$1 = a, $2 = b`.
pub fn positional_values(params: Option<&IndexMap<String, serde_json::Value>>) -> Vec<SqlParam<'_>> {
    let Some(params) = params else {
        return Vec::new();
    };
    let mut indexed: Vec<(u32, &serde_json::Value)> = Vec::new();
    let mut named: Vec<&serde_json::Value> = Vec::new();
    for (key, value) in params {
        match array_index(key) {
            Some(index) => indexed.push((index, value)),
            None => named.push(value),
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed
        .into_iter()
        .map(|(_, value)| value)
        .chain(named)
        .map(SqlParam)
        .collect()
}

/// A JSON value bound as whatever type the server expects for its placeholder.
#[derive(Debug, Clone, Copy)]
pub struct SqlParam<'a>(pub &'a serde_json::Value);

fn mismatch(value: &serde_json::Value, ty: &Type) -> EncodeError {
    format!("cannot bind {} as {}", value, ty).into()
}

impl SqlParam<'_> {
    fn as_i64(&self, ty: &Type) -> Result<i64, EncodeError> {
        match self.0 {
            serde_json::Value::Number(n) => n.as_i64().ok_or_else(|| mismatch(self.0, ty)),
            serde_json::Value::String(s) => Ok(s.trim().parse()?),
            _ => Err(mismatch(self.0, ty)),
        }
    }

    fn as_f64(&self, ty: &Type) -> Result<f64, EncodeError> {
        match self.0 {
            serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(self.0, ty)),
            serde_json::Value::String(s) => Ok(s.trim().parse()?),
            _ => Err(mismatch(self.0, ty)),
        }
    }

    fn as_bool(&self, ty: &Type) -> Result<bool, EncodeError> {
        match self.0 {
            serde_json::Value::Bool(b) => Ok(*b),
            serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "yes" | "on" | "1" => Ok(true),
                "f" | "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(mismatch(self.0, ty)),
            },
            _ => Err(mismatch(self.0, ty)),
        }
    }

    /// Strings as-is; anything else in its JSON form.
    fn text(&self) -> String {
        match self.0 {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn as_str(&self, ty: &Type) -> Result<&str, EncodeError> {
        self.0.as_str().map(str::trim).ok_or_else(|| mismatch(self.0, ty))
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, EncodeError> {
    Ok(text.replacen(' ', "T", 1).parse()?)
}

fn parse_timestamptz(text: &str) -> Result<DateTime<Utc>, EncodeError> {
    let normalized = text.replacen(' ', "T", 1);
    Ok(DateTime::parse_from_rfc3339(&normalized)?.with_timezone(&Utc))
}

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, EncodeError> {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => self.as_bool(ty)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(self.as_i64(ty)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(self.as_i64(ty)?)?.to_sql(ty, out),
            Type::INT8 => self.as_i64(ty)?.to_sql(ty, out),
            Type::OID => u32::try_from(self.as_i64(ty)?)?.to_sql(ty, out),
            Type::FLOAT4 => (self.as_f64(ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.as_f64(ty)?.to_sql(ty, out),
            Type::NUMERIC => {
                encode_numeric(&self.text(), out)?;
                Ok(IsNull::No)
            }
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                self.text().to_sql(ty, out)
            }
            Type::JSON | Type::JSONB => self.0.to_sql(ty, out),
            Type::DATE => self.as_str(ty)?.parse::<NaiveDate>()?.to_sql(ty, out),
            Type::TIMESTAMP => parse_timestamp(self.as_str(ty)?)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => parse_timestamptz(self.as_str(ty)?)?.to_sql(ty, out),
            Type::UUID => uuid::Uuid::parse_str(self.as_str(ty)?)?.to_sql(ty, out),
            _ => match ty.kind() {
                Kind::Array(_) => {
                    let items = self.0.as_array().ok_or_else(|| mismatch(self.0, ty))?;
                    items.iter().map(SqlParam).collect::<Vec<_>>().to_sql(ty, out)
                }
                Kind::Enum(_) => self.text().to_sql(ty, out),
                Kind::Domain(inner) => self.to_sql(inner, out),
                _ => Err(mismatch(self.0, ty)),
            },
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Decimal text (optionally with an exponent) to binary `numeric`.
pub fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), EncodeError> {
    let text = text.trim();
    let special = match text.to_ascii_lowercase().as_str() {
        "nan" => Some(NUMERIC_NAN),
        "infinity" | "+infinity" | "inf" => Some(NUMERIC_PINF),
        "-infinity" | "-inf" => Some(NUMERIC_NINF),
        _ => None,
    };
    if let Some(sign) = special {
        write_header(out, 0, 0, sign, 0);
        return Ok(());
    }

    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
        Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i64>()?),
        None => (unsigned, 0),
    };
    let (integer, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (integer.is_empty() && fraction.is_empty()) || !all_digits(integer) || !all_digits(fraction) {
        return Err(format!("invalid numeric value: {}", text).into());
    }

    let out_of_range = || -> EncodeError { format!("numeric value out of range: {}", text).into() };
    let scale = i64::try_from(fraction.len())?
        .checked_sub(exponent)
        .ok_or_else(out_of_range)?;
    let dscale = u16::try_from(scale.max(0)).map_err(|_| out_of_range())?;
    let digits = format!("{}{}", integer, fraction);
    // Position of the decimal point within `digits`
    let mut point = i64::try_from(integer.len())?
        .checked_add(exponent)
        .ok_or_else(out_of_range)?;

    let significant = digits.trim_start_matches('0');
    point -= i64::try_from(digits.len() - significant.len())?;
    let significant = significant.trim_end_matches('0');
    if significant.is_empty() {
        write_header(out, 0, 0, NUMERIC_POS, dscale);
        return Ok(());
    }

    let weight = i16::try_from((point - 1).div_euclid(4)).map_err(|_| out_of_range())?;
    let pad = usize::try_from(4 * i64::from(weight) + 3 - (point - 1))?;
    let mut aligned = "0".repeat(pad);
    aligned.push_str(significant);
    while aligned.len() % 4 != 0 {
        aligned.push('0');
    }
    let groups: Vec<u16> = aligned
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
        .collect();

    let sign = if negative { NUMERIC_NEG } else { NUMERIC_POS };
    write_header(out, i16::try_from(groups.len())?, weight, sign, dscale);
    for group in groups {
        out.put_u16(group);
    }
    Ok(())
}

fn write_header(out: &mut BytesMut, ndigits: i16, weight: i16, sign: u16, dscale: u16) {
    out.put_i16(ndigits);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::drivers::postgres::records::decode_numeric;
    use serde_json::json;

    fn params(pairs: &[(&str, serde_json::Value)]) -> IndexMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn numeric(text: &str) -> String {
        let mut out = BytesMut::new();
        encode_numeric(text, &mut out).unwrap();
        decode_numeric(&out).unwrap()
    }

    #[test]
    fn test_positional_order() {
        let map = params(&[
            ("name", json!("n")),
            ("10", json!(10)),
            ("1", json!(1)),
            ("01", json!("leading zero")),
            ("0", json!(0)),
            ("2", json!(2)),
        ]);
        let ordered: Vec<_> = positional_values(Some(&map)).into_iter().map(|p| p.0.clone()).collect();
        assert_eq!(
            ordered,
            vec![json!(0), json!(1), json!(2), json!(10), json!("n"), json!("leading zero")]
        );
        assert!(positional_values(None).is_empty());
    }

    #[test]
    fn test_array_index() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("007"), None);
        assert_eq!(array_index("+1"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("4294967295"), None);
        assert_eq!(array_index("x"), None);
    }

    #[test]
    fn test_numeric_encoding() {
        assert_eq!(numeric("12345.6"), "12345.6");
        assert_eq!(numeric("-0.05"), "-0.05");
        assert_eq!(numeric("0"), "0");
        assert_eq!(numeric("0.000"), "0.000");
        assert_eq!(numeric("100"), "100");
        assert_eq!(numeric("1e3"), "1000");
        assert_eq!(numeric("2.5E-3"), "0.0025");
        assert_eq!(numeric("NaN"), "NaN");
        assert_eq!(numeric("123456789012345678901234567890"), "123456789012345678901234567890");

        let mut out = BytesMut::new();
        assert!(encode_numeric("12a", &mut out).is_err());
        assert!(encode_numeric(".", &mut out).is_err());
    }

    #[test]
    fn test_numeric_extreme_exponents_are_errors() {
        for text in ["1e-9223372036854775808", "5e9223372036854775807", "1e200000", "1e-70000"] {
            let mut out = BytesMut::new();
            let err = encode_numeric(text, &mut out).unwrap_err();
            assert!(err.to_string().contains("out of range"), "{}: {}", text, err);
        }

        let value = json!("5e9223372036854775807");
        let mut out = BytesMut::new();
        assert!(SqlParam(&value).to_sql(&Type::NUMERIC, &mut out).is_err());

        let value = json!("-1e-9223372036854775808");
        let mut out = BytesMut::new();
        assert!(SqlParam(&value).to_sql(&Type::NUMERIC, &mut out).is_err());
    }

    #[test]
    fn test_scalar_binding() {
        let mut out = BytesMut::new();
        let value = json!(7);
        assert!(matches!(SqlParam(&value).to_sql(&Type::INT4, &mut out).unwrap(), IsNull::No));
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let mut out = BytesMut::new();
        let value = json!("42");
        SqlParam(&value).to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(&out[..], &42i64.to_be_bytes());

        let mut out = BytesMut::new();
        let value = json!(70000);
        assert!(SqlParam(&value).to_sql(&Type::INT2, &mut out).is_err());

        let mut out = BytesMut::new();
        let null = serde_json::Value::Null;
        assert!(matches!(SqlParam(&null).to_sql(&Type::TEXT, &mut out).unwrap(), IsNull::Yes));

        let mut out = BytesMut::new();
        let value = json!(3);
        SqlParam(&value).to_sql(&Type::TEXT, &mut out).unwrap();
        assert_eq!(&out[..], b"3");
    }

    #[test]
    fn test_temporal_binding() {
        let mut out = BytesMut::new();
        let value = json!("2000-01-02");
        SqlParam(&value).to_sql(&Type::DATE, &mut out).unwrap();
        assert_eq!(&out[..], &1i32.to_be_bytes());

        let mut out = BytesMut::new();
        let value = json!("2000-01-01 00:00:01");
        SqlParam(&value).to_sql(&Type::TIMESTAMP, &mut out).unwrap();
        assert_eq!(&out[..], &1_000_000i64.to_be_bytes());

        let mut out = BytesMut::new();
        let value = json!("2000-01-01T01:00:00+01:00");
        SqlParam(&value).to_sql(&Type::TIMESTAMPTZ, &mut out).unwrap();
        assert_eq!(&out[..], &0i64.to_be_bytes());
    }
}
