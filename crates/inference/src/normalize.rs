//! Record normalization
//!
//! Turns a raw record into a canonical, type-coerced record ready for
//! analysis and storage:
//!
//! - keys are rewritten dot-free (`meta.x` collapses onto `meta_x`; a
//!   collision logs a warning and the later value wins)
//! - every leaf string is run through the coercion ladder, including leaves
//!   inside nested objects and arrays
//! - nested objects are expanded into sibling keys joined by `_`, while the
//!   parent keeps its nested value under its own key (classification sends
//!   it to the document store); arrays are never expanded in the record
//! - `sys_ingested_at` is injected (UTC, millisecond precision) when absent
//!
//! Normalization never fails a record; an unparseable leaf is left as a
//! string. The array-of-objects expansion in [`probe`] is a statistics-only
//! view for the analyzer and does not mutate the stored record.

use chrono::{TimeZone, Utc};
use morph_core::value::coerce_scalar;
use morph_core::{FieldValue, Record, INGESTED_AT_KEY};
use std::collections::BTreeMap;
use tracing::warn;

/// Normalize a raw record: sanitize keys, coerce leaves, expand nested
/// objects, inject the ingestion timestamp.
///
/// Deterministic given the same wall-clock (modulo the injected timestamp),
/// and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(record: Record) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        let key = sanitize_key(&key);
        let value = normalize_value(value);
        if let FieldValue::Object(entries) = &value {
            for (child_key, child_value) in entries.clone() {
                expand_into(&mut out, &format!("{key}_{child_key}"), child_value);
            }
        }
        insert_checked(&mut out, key, value);
    }

    if !out.contains_key(INGESTED_AT_KEY) {
        out.insert(INGESTED_AT_KEY.to_string(), FieldValue::DateTime(now_millis()));
    }

    out
}

/// Recursively expand one nested value into leaf keys under `prefix`.
///
/// Objects recurse; arrays and scalars land whole under their path key.
fn expand_into(out: &mut Record, prefix: &str, value: FieldValue) {
    match value {
        FieldValue::Object(entries) => {
            for (child_key, child_value) in entries {
                expand_into(out, &format!("{prefix}_{child_key}"), child_value);
            }
        }
        other => insert_checked(out, prefix.to_string(), other),
    }
}

/// Insert, warning when an existing key holds a different value (dotted
/// keys and expanded paths can collapse onto the same canonical name).
fn insert_checked(out: &mut Record, key: String, value: FieldValue) {
    match out.insert(key.clone(), value) {
        Some(previous) if previous != out[&key] => {
            warn!(key = %key, "key collision after normalization; later value wins");
        }
        _ => {}
    }
}

/// Coerce one value recursively: string leaves run the ladder, nested
/// containers recurse with their keys sanitized.
pub fn normalize_value(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Str(s) => coerce_scalar(&s).unwrap_or(FieldValue::Str(s)),
        FieldValue::Array(items) => {
            FieldValue::Array(items.into_iter().map(normalize_value).collect())
        }
        FieldValue::Object(entries) => {
            let mut out = BTreeMap::new();
            for (key, value) in entries {
                let key = sanitize_key(&key);
                if out.insert(key.clone(), normalize_value(value)).is_some() {
                    warn!(key = %key, "nested key collision after dot normalization");
                }
            }
            FieldValue::Object(out)
        }
        other => other,
    }
}

/// Rewrite a key dot-free: nested-path dots become underscores.
pub fn sanitize_key(key: &str) -> String {
    key.replace('.', "_")
}

/// Current UTC time truncated to millisecond precision, so the injected
/// timestamp survives a JSON round trip bit-for-bit.
fn now_millis() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}

/// The statistics view of a normalized record.
///
/// Identical to the record itself, except that an array-of-objects is
/// additionally represented by the expanded leaves of its first element
/// under the parent prefix. This is a probe for the analyzer only; the
/// stored record keeps the array whole.
pub fn probe(record: &Record) -> Record {
    let mut view = record.clone();
    for (key, value) in record {
        if let FieldValue::Array(items) = value {
            if let Some(FieldValue::Object(first)) = items.first() {
                for (child_key, child_value) in first.clone() {
                    expand_into(&mut view, &format!("{key}_{child_key}"), child_value);
                }
            }
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::record_from_json;
    use serde_json::json;

    fn record(json: serde_json::Value) -> Record {
        record_from_json(json).unwrap()
    }

    #[test]
    fn test_injects_ingestion_timestamp() {
        let normalized = normalize(record(json!({"a": 1})));
        assert!(matches!(
            normalized.get(INGESTED_AT_KEY),
            Some(FieldValue::DateTime(_))
        ));
    }

    #[test]
    fn test_keeps_existing_timestamp() {
        let normalized = normalize(record(json!({
            "sys_ingested_at": "2024-03-01T00:00:00.000Z"
        })));
        let expected = morph_core::value::parse_datetime("2024-03-01T00:00:00.000Z").unwrap();
        assert_eq!(
            normalized.get(INGESTED_AT_KEY),
            Some(&FieldValue::DateTime(expected))
        );
    }

    #[test]
    fn test_coerces_leaves_at_every_depth() {
        let normalized = normalize(record(json!({
            "outer": {"when": "2024-03-01T00:00:00Z", "count": "42"},
            "list": ["10.0.0.1", "plain"]
        })));

        // The expanded leaves are coerced
        assert!(matches!(
            normalized.get("outer_when"),
            Some(FieldValue::DateTime(_))
        ));
        assert_eq!(normalized.get("outer_count"), Some(&FieldValue::Int(42)));
        // So is the retained nested parent
        match normalized.get("outer") {
            Some(FieldValue::Object(entries)) => {
                assert_eq!(entries.get("count"), Some(&FieldValue::Int(42)));
            }
            other => panic!("expected object, got {other:?}"),
        }
        match normalized.get("list") {
            Some(FieldValue::Array(items)) => {
                assert!(matches!(items[0], FieldValue::Ip(_)));
                assert_eq!(items[1], FieldValue::Str("plain".into()));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_objects_expand_and_parent_is_kept() {
        let normalized = normalize(record(json!({
            "metadata": {"level": 5, "inner": {"deep": true}}
        })));

        assert!(matches!(
            normalized.get("metadata"),
            Some(FieldValue::Object(_))
        ));
        assert_eq!(normalized.get("metadata_level"), Some(&FieldValue::Int(5)));
        assert_eq!(
            normalized.get("metadata_inner_deep"),
            Some(&FieldValue::Bool(true))
        );
        // Intermediate objects do not get their own keys
        assert!(!normalized.contains_key("metadata_inner"));
    }

    #[test]
    fn test_arrays_stay_whole() {
        let normalized = normalize(record(json!({"tags": ["a", "b"]})));
        match normalized.get("tags") {
            Some(FieldValue::Array(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
        assert!(!normalized.contains_key("tags_0"));
    }

    #[test]
    fn test_dotted_keys_collapse() {
        let normalized = normalize(record(json!({"meta.x": 1})));
        assert_eq!(normalized.get("meta_x"), Some(&FieldValue::Int(1)));
        assert!(!normalized.contains_key("meta.x"));
    }

    #[test]
    fn test_dotted_collision_later_value_wins() {
        // "meta.x" sorts before "meta_x", so the literal key is the later one
        let normalized = normalize(record(json!({"meta.x": 1, "meta_x": 2})));
        assert_eq!(normalized.get("meta_x"), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(record(json!({
            "username": "alice",
            "age": "30",
            "seen": "2024-03-01T10:00:00Z",
            "flags": {"active": "yes"},
            "tags": ["a", "b"],
            "metadata": {"level": 5}
        })));
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_probe_expands_first_array_element_only() {
        let normalized = normalize(record(json!({
            "events": [{"kind": "login"}, {"kind": "logout", "extra": 1}]
        })));
        let view = probe(&normalized);

        assert!(matches!(view.get("events"), Some(FieldValue::Array(_))));
        assert_eq!(
            view.get("events_kind"),
            Some(&FieldValue::Str("login".into()))
        );
        // Only the first element is probed
        assert!(!view.contains_key("events_extra"));
        // And the stored record is untouched
        assert!(!normalized.contains_key("events_kind"));
    }
}
