//! Value types for ingested records
//!
//! This module defines:
//! - FieldValue: tagged union for every value a record field can hold
//! - DetectedType: the discriminant used by statistics and classification
//! - Record: a flat-keyed mapping from canonical field names to values
//! - String coercion: the ladder that upgrades raw leaf strings to semantic
//!   scalar types (datetime, uuid, ip, bool, int, float)
//!
//! Detection invariants:
//! - `Int` and `Float` are disjoint; integral values prefer `Int`
//! - `Ip` covers both v4 and v6 addresses
//! - `Uuid` matches only the canonical 8-4-4-4-12 hyphenated form
//! - `DateTime` matches ISO 8601 with optional timezone
//! - `Null` covers actual null plus the literals `""`, `"null"`, `"none"`
//!   (case-insensitive)

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::net::IpAddr;
use uuid::Uuid;

/// A flat record: canonical field names mapped to values.
///
/// `BTreeMap` keeps iteration deterministic, which the classifier and the
/// relational DDL generator rely on for stable output.
pub type Record = BTreeMap<String, FieldValue>;

/// Naive datetime layouts accepted in addition to RFC 3339.
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Unified value type for record fields
///
/// One discriminated union instead of a generic "any" box: detection returns
/// the tag, storage carries the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Null value (actual null or a recognized null literal)
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string that matched no semantic type
    Str(String),
    /// ISO 8601 timestamp, normalized to UTC
    DateTime(DateTime<Utc>),
    /// Canonical-form UUID
    Uuid(Uuid),
    /// IPv4 or IPv6 address
    Ip(IpAddr),
    /// Array of values (kept whole, never flattened into the record)
    Array(Vec<FieldValue>),
    /// Nested object (kept whole in the stored record; flattened by the
    /// statistics probe only)
    Object(BTreeMap<String, FieldValue>),
}

/// Detected semantic type of a field value
///
/// `Ord` on this enum is the deterministic tie-break order used when two
/// types have equal observation counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedType {
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Bool,
    /// Plain string
    Str,
    /// IP address (v4 or v6)
    Ip,
    /// Canonical UUID
    Uuid,
    /// ISO 8601 timestamp
    DateTime,
    /// Array (nested)
    Array,
    /// Object (nested)
    Object,
    /// Null or null literal
    Null,
}

impl DetectedType {
    /// Whether this type is nested (array or object).
    pub fn is_nested(&self) -> bool {
        matches!(self, DetectedType::Array | DetectedType::Object)
    }

    /// Whether this type is a scalar eligible for primary-key selection.
    pub fn is_scalar(&self) -> bool {
        !self.is_nested() && !matches!(self, DetectedType::Null)
    }
}

impl FieldValue {
    /// Classify this value's detected type.
    pub fn detected_type(&self) -> DetectedType {
        match self {
            FieldValue::Null => DetectedType::Null,
            FieldValue::Bool(_) => DetectedType::Bool,
            FieldValue::Int(_) => DetectedType::Int,
            FieldValue::Float(_) => DetectedType::Float,
            FieldValue::Str(_) => DetectedType::Str,
            FieldValue::DateTime(_) => DetectedType::DateTime,
            FieldValue::Uuid(_) => DetectedType::Uuid,
            FieldValue::Ip(_) => DetectedType::Ip,
            FieldValue::Array(_) => DetectedType::Array,
            FieldValue::Object(_) => DetectedType::Object,
        }
    }

    /// Whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Structural conversion from a JSON value.
    ///
    /// Strings stay `Str`; no coercion happens here. Unsigned integers that
    /// do not fit `i64` fall back to `Float`.
    pub fn from_json(value: serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Null
                }
            }
            serde_json::Value::String(s) => FieldValue::Str(s),
            serde_json::Value::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => FieldValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render this value as a JSON value.
    ///
    /// Semantic scalars serialize as strings: datetime as RFC 3339 with
    /// millisecond precision, uuid and ip in their canonical text forms.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Str(s) => serde_json::Value::String(s.clone()),
            FieldValue::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Uuid(u) => serde_json::Value::String(u.to_string()),
            FieldValue::Ip(ip) => serde_json::Value::String(ip.to_string()),
            FieldValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Re-detect semantic tags on string leaves, recursively.
    ///
    /// JSON cannot carry the DateTime/Uuid/Ip tags, so values read back from
    /// the WAL or the document store arrive as plain strings. Restoring tags
    /// is sound because coercion is idempotent: a string that survived
    /// normalization as `Str` stays `Str` here.
    pub fn restore_tags(self) -> FieldValue {
        match self {
            FieldValue::Str(s) => coerce_scalar(&s).unwrap_or(FieldValue::Str(s)),
            FieldValue::Array(items) => {
                FieldValue::Array(items.into_iter().map(FieldValue::restore_tags).collect())
            }
            FieldValue::Object(entries) => FieldValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.restore_tags()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Canonical string rendering, used as the identity for `unique_values`.
    pub fn canonical_string(&self) -> String {
        self.to_json().to_string()
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(FieldValue::from_json)
    }
}

/// Attempt to upgrade a raw leaf string to a semantic scalar.
///
/// Tried in order: null literal, datetime, uuid, ip, bool
/// (`true|false|yes|no|1|0`, case-insensitive), int, float. Returns `None`
/// when the string matches nothing and should remain `Str`.
pub fn coerce_scalar(raw: &str) -> Option<FieldValue> {
    if is_null_literal(raw) {
        return Some(FieldValue::Null);
    }
    if let Some(dt) = parse_datetime(raw) {
        return Some(FieldValue::DateTime(dt));
    }
    if let Some(u) = parse_canonical_uuid(raw) {
        return Some(FieldValue::Uuid(u));
    }
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Some(FieldValue::Ip(ip));
    }
    if let Some(b) = parse_bool_literal(raw) {
        return Some(FieldValue::Bool(b));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(FieldValue::Int(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Some(FieldValue::Float(f));
        }
    }
    None
}

/// Whether a string is one of the recognized null literals.
pub fn is_null_literal(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("none")
}

fn parse_bool_literal(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("yes") || raw == "1" {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("no") || raw == "0" {
        Some(false)
    } else {
        None
    }
}

/// Parse an ISO 8601 timestamp with optional timezone, normalized to UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    // Date-only ISO 8601, interpreted as midnight UTC
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Parse a UUID in the canonical hyphenated 8-4-4-4-12 form only.
pub fn parse_canonical_uuid(raw: &str) -> Option<Uuid> {
    let bytes = raw.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    if bytes[8] != b'-' || bytes[13] != b'-' || bytes[18] != b'-' || bytes[23] != b'-' {
        return None;
    }
    Uuid::parse_str(raw).ok()
}

/// Structural conversion of a top-level JSON value into a record.
///
/// Returns `None` when the value is not an object; such inputs are rejected
/// at ingest before they reach the WAL.
pub fn record_from_json(value: serde_json::Value) -> Option<Record> {
    match FieldValue::from_json(value) {
        FieldValue::Object(entries) => Some(entries),
        _ => None,
    }
}

/// Render a record as a JSON object value.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Apply [`FieldValue::restore_tags`] to every field of a record.
pub fn restore_record_tags(record: Record) -> Record {
    record.into_iter().map(|(k, v)| (k, v.restore_tags())).collect()
}
