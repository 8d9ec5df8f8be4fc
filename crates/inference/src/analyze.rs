//! Online field statistics
//!
//! The analyzer folds batches of normalized records into cumulative
//! [`FieldStats`], one entry per canonical field name. Each record is
//! observed through the statistics probe, which adds the expanded leaves of
//! an array-of-objects' first element to the record's own keys. A key can
//! only be counted once per record (the probe yields a map).

use crate::normalize::probe;
use morph_core::{FieldStats, Record};
use std::collections::BTreeMap;
use tracing::debug;

/// Accumulates per-field statistics across all observed records.
#[derive(Debug, Clone, Default)]
pub struct FieldAnalyzer {
    stats: BTreeMap<String, FieldStats>,
    total_records_seen: u64,
}

impl FieldAnalyzer {
    /// Empty analyzer (cold start).
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an analyzer from persisted statistics.
    pub fn from_parts(stats: BTreeMap<String, FieldStats>, total_records_seen: u64) -> Self {
        FieldAnalyzer {
            stats,
            total_records_seen,
        }
    }

    /// Fold a batch of normalized records into the statistics.
    ///
    /// `total_records_seen` advances by the batch length exactly once,
    /// regardless of how many fields each record carries.
    pub fn observe_batch(&mut self, records: &[Record]) {
        for record in records {
            for (key, value) in probe(record) {
                self.stats.entry(key).or_default().observe(&value);
            }
        }
        self.total_records_seen += records.len() as u64;
        debug!(
            batch = records.len(),
            fields = self.stats.len(),
            total = self.total_records_seen,
            "analyzed batch"
        );
    }

    /// All per-field statistics, keyed by canonical field name.
    pub fn stats(&self) -> &BTreeMap<String, FieldStats> {
        &self.stats
    }

    /// Total records ever observed.
    pub fn total_records_seen(&self) -> u64 {
        self.total_records_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_core::{record_from_json, DetectedType};
    use serde_json::json;

    fn record(json: serde_json::Value) -> Record {
        record_from_json(json).unwrap()
    }

    #[test]
    fn test_total_advances_once_per_batch() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.observe_batch(&[
            record(json!({"a": 1, "b": 2, "c": 3})),
            record(json!({"a": 4})),
        ]);
        assert_eq!(analyzer.total_records_seen(), 2);
    }

    #[test]
    fn test_presence_and_null_split() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.observe_batch(&[
            record(json!({"x": 1})),
            record(json!({"x": null})),
            record(json!({"y": "s"})),
        ]);

        let x = &analyzer.stats()["x"];
        assert_eq!(x.presence_count, 1);
        assert_eq!(x.null_count, 1);
        let y = &analyzer.stats()["y"];
        assert_eq!(y.presence_count, 1);
        assert_eq!(y.null_count, 0);
    }

    #[test]
    fn test_split_type_counts_lower_stability() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.observe_batch(&[record(json!({"v": 1})), record(json!({"v": "one"}))]);

        let v = &analyzer.stats()["v"];
        assert_eq!(v.type_counts.get(&DetectedType::Int), Some(&1));
        assert_eq!(v.type_counts.get(&DetectedType::Str), Some(&1));
        assert!(v.type_stability() < 1.0);
    }

    #[test]
    fn test_nested_fields_observed_after_normalization() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.observe_batch(&[crate::normalize(record(json!({"metadata": {"level": 5}})))]);

        assert!(analyzer.stats()["metadata"].is_nested);
        assert_eq!(analyzer.stats()["metadata_level"].presence_count, 1);
    }

    #[test]
    fn test_array_of_objects_probed_without_mutation() {
        let mut analyzer = FieldAnalyzer::new();
        let normalized = crate::normalize(record(json!({"events": [{"kind": "login"}]})));
        analyzer.observe_batch(std::slice::from_ref(&normalized));

        assert!(analyzer.stats()["events"].is_nested);
        assert_eq!(analyzer.stats()["events_kind"].presence_count, 1);
        assert!(!normalized.contains_key("events_kind"));
    }

    #[test]
    fn test_rebuild_from_parts() {
        let mut analyzer = FieldAnalyzer::new();
        analyzer.observe_batch(&[record(json!({"a": 1}))]);

        let rebuilt =
            FieldAnalyzer::from_parts(analyzer.stats().clone(), analyzer.total_records_seen());
        assert_eq!(rebuilt.total_records_seen(), 1);
        assert_eq!(rebuilt.stats()["a"].presence_count, 1);
    }
}
