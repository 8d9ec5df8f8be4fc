//! Cumulative per-field statistics
//!
//! One `FieldStats` per canonical field name, created on first sight and
//! never deleted. Counters accumulate across every batch ever observed;
//! the derived ratios feed the placement classifier.

use crate::limits::{SAMPLE_VALUE_CAP, UNIQUE_VALUE_CAP};
use crate::value::{DetectedType, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Cumulative statistics for one field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Records in which the field appeared with a non-null value
    pub presence_count: u64,
    /// Records in which the field was present but null
    pub null_count: u64,
    /// Observation count per detected type (non-null observations only)
    pub type_counts: BTreeMap<DetectedType, u64>,
    /// Distinct canonical renderings, capped at [`UNIQUE_VALUE_CAP`];
    /// inserts beyond the cap are silently dropped (the cap is part of the
    /// contract; `unique_ratio` saturates accordingly)
    pub unique_values: BTreeSet<String>,
    /// True once the field has ever held an array or object
    pub is_nested: bool,
    /// First-seen example values, capped at [`SAMPLE_VALUE_CAP`]
    pub sample_values: Vec<FieldValue>,
}

impl FieldStats {
    /// Fold one observed value into the counters.
    ///
    /// Null increments `null_count` only; everything else updates presence,
    /// type counts, the capped unique set, and the capped samples.
    pub fn observe(&mut self, value: &FieldValue) {
        if value.is_null() {
            self.null_count += 1;
            return;
        }

        self.presence_count += 1;
        let detected = value.detected_type();
        *self.type_counts.entry(detected).or_insert(0) += 1;
        if detected.is_nested() {
            self.is_nested = true;
        }

        if self.unique_values.len() < UNIQUE_VALUE_CAP {
            self.unique_values.insert(value.canonical_string());
        }
        if self.sample_values.len() < SAMPLE_VALUE_CAP {
            self.sample_values.push(value.clone());
        }
    }

    /// The most frequently observed type; count ties break on the
    /// [`DetectedType`] order so the choice is deterministic.
    pub fn dominant_type(&self) -> Option<DetectedType> {
        self.type_counts
            .iter()
            .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then(tb.cmp(ta)))
            .map(|(t, _)| *t)
    }

    /// Fraction of non-null observations matching the dominant type.
    pub fn type_stability(&self) -> f64 {
        let total: u64 = self.type_counts.values().sum();
        if total == 0 {
            return 0.0;
        }
        let dominant = self
            .dominant_type()
            .and_then(|t| self.type_counts.get(&t))
            .copied()
            .unwrap_or(0);
        dominant as f64 / total as f64
    }

    /// Distinct values over non-null presences; saturates at
    /// `UNIQUE_VALUE_CAP / presence_count` once the set is capped.
    pub fn unique_ratio(&self) -> f64 {
        if self.presence_count == 0 {
            return 0.0;
        }
        self.unique_values.len() as f64 / self.presence_count as f64
    }

    /// Fraction of all processed records in which the field was non-null.
    pub fn presence_ratio(&self, total_records: u64) -> f64 {
        if total_records == 0 {
            return 0.0;
        }
        self.presence_count as f64 / total_records as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_counts_presence_and_null() {
        let mut stats = FieldStats::default();
        stats.observe(&FieldValue::Int(1));
        stats.observe(&FieldValue::Int(2));
        stats.observe(&FieldValue::Null);

        assert_eq!(stats.presence_count, 2);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.type_counts.get(&DetectedType::Int), Some(&2));
    }

    #[test]
    fn test_dominant_type_and_stability() {
        let mut stats = FieldStats::default();
        for i in 0..9 {
            stats.observe(&FieldValue::Int(i));
        }
        stats.observe(&FieldValue::Str("ten".into()));

        assert_eq!(stats.dominant_type(), Some(DetectedType::Int));
        assert!((stats.type_stability() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_stability_bounds() {
        let mut stats = FieldStats::default();
        assert_eq!(stats.type_stability(), 0.0);
        stats.observe(&FieldValue::Bool(true));
        assert_eq!(stats.type_stability(), 1.0);
    }

    #[test]
    fn test_unique_values_capped() {
        let mut stats = FieldStats::default();
        for i in 0..2_000 {
            stats.observe(&FieldValue::Int(i));
        }
        assert_eq!(stats.unique_values.len(), crate::limits::UNIQUE_VALUE_CAP);
        assert_eq!(stats.presence_count, 2_000);
        // Saturated ratio: 1000 / 2000
        assert!((stats.unique_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sample_values_first_seen() {
        let mut stats = FieldStats::default();
        for i in 0..20 {
            stats.observe(&FieldValue::Int(i));
        }
        assert_eq!(stats.sample_values.len(), crate::limits::SAMPLE_VALUE_CAP);
        assert_eq!(stats.sample_values[0], FieldValue::Int(0));
    }

    #[test]
    fn test_nested_latches() {
        let mut stats = FieldStats::default();
        stats.observe(&FieldValue::Array(vec![FieldValue::Int(1)]));
        stats.observe(&FieldValue::Int(1));
        assert!(stats.is_nested);
    }

    #[test]
    fn test_presence_ratio() {
        let mut stats = FieldStats::default();
        for _ in 0..60 {
            stats.observe(&FieldValue::Int(1));
        }
        assert!((stats.presence_ratio(100) - 0.6).abs() < 1e-9);
        assert_eq!(stats.presence_ratio(0), 0.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut stats = FieldStats::default();
        stats.observe(&FieldValue::Int(5));
        stats.observe(&FieldValue::Str("x".into()));
        stats.observe(&FieldValue::Null);

        let json = serde_json::to_string(&stats).unwrap();
        let back: FieldStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
