//! Typed scalar values and conversion from raw JSON.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::ValidationConfig;
use crate::schema::enums::enum_message;
use crate::schema::field::FieldKind;

/// A validated scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Enum(String),
}

/// Scalar fields of one record keyed by wire name.
pub type Row = BTreeMap<String, FieldValue>;

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::String(s) | FieldValue::Enum(s) => JsonValue::String(s.clone()),
            FieldValue::Int(i) => JsonValue::from(*i),
            FieldValue::Float(f) => JsonValue::from(*f),
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::DateTime(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Int(_) | FieldValue::Float(_) => 1,
            FieldValue::DateTime(_) => 2,
            FieldValue::String(_) | FieldValue::Enum(_) => 3,
        }
    }

    /// Total order used for sorting and range comparisons.
    ///
    /// Numbers compare numerically across Int/Float, strings lexicographically,
    /// values of unrelated kinds by kind.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => {
                let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                x.total_cmp(&y)
            }
            (a, b) if a.rank() == 3 && b.rank() == 3 => {
                a.as_str().unwrap_or_default().cmp(b.as_str().unwrap_or_default())
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    /// Equality with Int/Float treated as one numeric domain.
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        self.compare(other) == Ordering::Equal && self.rank() == other.rank()
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) | FieldValue::Enum(s) => f.write_str(s),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

/// Name of the JSON type of `value`, as used in error messages.
pub(crate) fn received(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn mismatch(kind: &FieldKind, value: &JsonValue) -> String {
    format!("expected {}, received {}", kind.type_name(), received(value))
}

/// Convert a raw JSON scalar into the typed value for `kind`.
///
/// Errors are messages without a path; callers attach the field path.
pub fn convert(
    kind: &FieldKind,
    value: &JsonValue,
    config: &ValidationConfig,
) -> Result<FieldValue, String> {
    match kind {
        FieldKind::Id | FieldKind::String | FieldKind::ForeignKey(_) => value
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(|| mismatch(kind, value)),
        FieldKind::Int => match value {
            JsonValue::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                })
                .map(FieldValue::Int)
                .ok_or_else(|| format!("expected integer, received {n}")),
            _ => Err(mismatch(kind, value)),
        },
        FieldKind::Float => value
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| mismatch(kind, value)),
        FieldKind::Bool => value
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| mismatch(kind, value)),
        FieldKind::DateTime => match value {
            JsonValue::String(s) => parse_datetime(s, config)
                .ok_or_else(|| format!("invalid date '{s}'"))
                .and_then(supported_year)
                .map(FieldValue::DateTime),
            JsonValue::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| format!("invalid timestamp {n}"))
                .and_then(supported_year)
                .map(FieldValue::DateTime),
            _ => Err(mismatch(kind, value)),
        },
        FieldKind::Enum(def) => match value {
            JsonValue::String(s) => def
                .canonical(s)
                .map(|v| FieldValue::Enum(v.to_string()))
                .ok_or_else(|| enum_message(def.name, def.values, s)),
            _ => Err(mismatch(kind, value)),
        },
    }
}

/// Check an already typed value against `kind` (builder input).
pub fn coerce(kind: &FieldKind, value: FieldValue) -> Result<FieldValue, String> {
    match (kind, value) {
        (FieldKind::Id | FieldKind::String | FieldKind::ForeignKey(_), FieldValue::String(s)) => {
            Ok(FieldValue::String(s))
        }
        (FieldKind::Int, FieldValue::Int(i)) => Ok(FieldValue::Int(i)),
        (FieldKind::Float, FieldValue::Float(f)) => Ok(FieldValue::Float(f)),
        (FieldKind::Float, FieldValue::Int(i)) => Ok(FieldValue::Float(i as f64)),
        (FieldKind::Bool, FieldValue::Bool(b)) => Ok(FieldValue::Bool(b)),
        (FieldKind::DateTime, FieldValue::DateTime(dt)) => supported_year(dt).map(FieldValue::DateTime),
        (FieldKind::Enum(def), FieldValue::Enum(s) | FieldValue::String(s)) => def
            .canonical(&s)
            .map(|v| FieldValue::Enum(v.to_string()))
            .ok_or_else(|| enum_message(def.name, def.values, &s)),
        (kind, other) => Err(format!(
            "expected {}, received {}",
            kind.type_name(),
            received(&other.to_json())
        )),
    }
}

/// Years that survive an RFC 3339 round trip (four-digit, non-negative).
pub const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// `dt` if its UTC year is within [`SUPPORTED_YEARS`].
pub fn supported_year(dt: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    if SUPPORTED_YEARS.contains(&dt.year()) {
        Ok(dt)
    } else {
        Err(format!(
            "date {} is outside the supported years 0000-9999",
            dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ))
    }
}

/// Parse RFC 3339, naive date-time or `YYYY-MM-DD` strings.
///
/// Inputs without an offset are interpreted at the configured offset.
/// Results outside [`SUPPORTED_YEARS`] are rejected.
pub fn parse_datetime(raw: &str, config: &ValidationConfig) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return supported_year(dt.with_timezone(&Utc)).ok();
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    config
        .date_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|dt| SUPPORTED_YEARS.contains(&dt.year()))
}
