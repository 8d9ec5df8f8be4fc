//! Property tests for scalar coercion
//!
//! For any scalar whose detected type is one of int/float/bool/datetime/
//! uuid/ip, coercing its canonical string rendering yields the value back.

use chrono::{TimeZone, Utc};
use morph_core::{coerce_scalar, FieldValue};
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use uuid::Uuid;

proptest! {
    #[test]
    fn int_round_trip(i in any::<i64>()) {
        // "1" and "0" are bool literals by contract
        prop_assume!(i != 0 && i != 1);
        prop_assert_eq!(coerce_scalar(&i.to_string()), Some(FieldValue::Int(i)));
    }

    #[test]
    fn float_round_trip(f in any::<f64>()) {
        prop_assume!(f.is_finite() && f.fract() != 0.0);
        prop_assert_eq!(coerce_scalar(&f.to_string()), Some(FieldValue::Float(f)));
    }

    #[test]
    fn datetime_round_trip(millis in -62_000_000_000_000i64..253_000_000_000_000i64) {
        let dt = Utc.timestamp_millis_opt(millis).single().unwrap();
        let rendered = FieldValue::DateTime(dt).canonical_string();
        // canonical_string wraps in JSON quotes; strip them for the raw form
        let raw = rendered.trim_matches('"');
        prop_assert_eq!(coerce_scalar(raw), Some(FieldValue::DateTime(dt)));
    }

    #[test]
    fn uuid_round_trip(bytes in any::<[u8; 16]>()) {
        let u = Uuid::from_bytes(bytes);
        prop_assert_eq!(coerce_scalar(&u.to_string()), Some(FieldValue::Uuid(u)));
    }

    #[test]
    fn ipv4_round_trip(raw in any::<u32>()) {
        let ip = IpAddr::V4(Ipv4Addr::from(raw));
        prop_assert_eq!(coerce_scalar(&ip.to_string()), Some(FieldValue::Ip(ip)));
    }

    #[test]
    fn ipv6_round_trip(raw in any::<u128>()) {
        let ip = IpAddr::V6(Ipv6Addr::from(raw));
        prop_assert_eq!(coerce_scalar(&ip.to_string()), Some(FieldValue::Ip(ip)));
    }
}

#[test]
fn bool_round_trip() {
    assert_eq!(coerce_scalar("true"), Some(FieldValue::Bool(true)));
    assert_eq!(coerce_scalar("false"), Some(FieldValue::Bool(false)));
}
