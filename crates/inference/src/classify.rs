//! Placement classification and primary-key election
//!
//! Produces one [`PlacementDecision`] per known field from its cumulative
//! statistics. Rules are applied in order, first match wins:
//!
//! 1. linking/system fields (`username`, `sys_ingested_at`, `t_stamp`) go to
//!    both backends
//! 2. nested fields go to the document store
//! 3. presence and type stability above their thresholds goes relational
//! 4. everything else goes to the document store
//!
//! The thresholds live in [`PlacementConfig`]/[`PkConfig`] and are part of
//! the documented contract.

use morph_core::{
    BackendKind, ColumnType, DetectedType, FieldStats, PkConfig, PlacementConfig,
    PlacementDecision, CLIENT_TIMESTAMP_KEY, INGESTED_AT_KEY, USERNAME_KEY,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Unique-ratio threshold for flagging a column `UNIQUE`.
const UNIQUE_FLAG_THRESHOLD: f64 = 0.90;

/// Small-sample grace for the presence rule: with fewer records observed
/// than this, a field's absence is not yet evidence of sparseness, and
/// only type stability gates relational placement. Once the pipeline has
/// seen this many records the presence threshold applies in full.
const PRESENCE_WARMUP_RECORDS: u64 = 10;

/// Scoring bonus for key-like field names.
const KEY_NAME_BONUS: f64 = 0.2;

/// Weight of the unique ratio in the primary-key score.
const UNIQUE_RATIO_WEIGHT: f64 = 0.8;

/// Derives placement decisions and elects the relational primary key.
#[derive(Debug, Clone)]
pub struct Classifier {
    placement: PlacementConfig,
    pk: PkConfig,
}

impl Classifier {
    /// Build a classifier from the configured thresholds.
    pub fn new(placement: PlacementConfig, pk: PkConfig) -> Self {
        Classifier { placement, pk }
    }

    /// Produce a decision for every known field and mark the elected
    /// primary key, if any candidate qualifies.
    pub fn classify(
        &self,
        stats: &BTreeMap<String, FieldStats>,
        total_records: u64,
    ) -> BTreeMap<String, PlacementDecision> {
        let mut decisions: BTreeMap<String, PlacementDecision> = stats
            .iter()
            .map(|(name, field)| (name.clone(), self.classify_field(name, field, total_records)))
            .collect();

        if let Some(pk) = self.elect_primary_key(stats, &decisions, total_records) {
            debug!(field = %pk, "elected primary key");
            if let Some(decision) = decisions.get_mut(&pk) {
                decision.is_primary_key = true;
            }
        }

        decisions
    }

    fn classify_field(
        &self,
        name: &str,
        stats: &FieldStats,
        total_records: u64,
    ) -> PlacementDecision {
        let presence = stats.presence_ratio(total_records);
        let stability = stats.type_stability();
        let canonical_type = stats.dominant_type().unwrap_or(DetectedType::Null);

        let presence_ok = presence >= self.placement.min_presence
            || total_records < PRESENCE_WARMUP_RECORDS;

        let (backend, reason) = if is_linking_field(name) {
            (BackendKind::Both, "linking field, duplicated to both backends".to_string())
        } else if stats.is_nested {
            (BackendKind::Doc, "nested value".to_string())
        } else if presence_ok && stability >= self.placement.min_type_stability {
            let reason = if presence >= self.placement.min_presence {
                format!("presence {presence:.2} and type stability {stability:.2} above thresholds")
            } else {
                format!("type stability {stability:.2} in early sample")
            };
            (BackendKind::Sql, reason)
        } else if !presence_ok {
            (
                BackendKind::Doc,
                format!(
                    "presence {presence:.2} below threshold {:.2}",
                    self.placement.min_presence
                ),
            )
        } else {
            (
                BackendKind::Doc,
                format!(
                    "type stability {stability:.2} below threshold {:.2}",
                    self.placement.min_type_stability
                ),
            )
        };

        let is_nullable = stats.null_count > 0 || presence < 1.0;
        let is_unique = stats.unique_ratio() >= UNIQUE_FLAG_THRESHOLD && !is_nullable;
        let sql_type = backend
            .includes_sql()
            .then(|| ColumnType::for_detected(canonical_type));

        PlacementDecision {
            backend,
            canonical_type,
            sql_type,
            is_nullable,
            is_unique,
            is_primary_key: false,
            reason,
        }
    }

    /// Score relational candidates and pick the primary key.
    ///
    /// Candidates must be present in every record, sufficiently unique,
    /// scalar-typed, and not timestamp-like. Score is a key-name bonus plus
    /// the weighted unique ratio; ties break on lexicographic field order
    /// (strict `>` while iterating the sorted map keeps the first name).
    fn elect_primary_key(
        &self,
        stats: &BTreeMap<String, FieldStats>,
        decisions: &BTreeMap<String, PlacementDecision>,
        total_records: u64,
    ) -> Option<String> {
        let mut best: Option<(String, f64)> = None;

        for (name, decision) in decisions {
            if !decision.backend.includes_sql() {
                continue;
            }
            let field = &stats[name];
            if total_records == 0 || field.presence_count != total_records {
                continue;
            }
            if field.unique_ratio() < self.pk.min_unique {
                continue;
            }
            if !decision.canonical_type.is_scalar() {
                continue;
            }
            if is_timestamp_like(name) {
                continue;
            }

            let bonus = if has_key_like_name(name) { KEY_NAME_BONUS } else { 0.0 };
            let score = bonus + UNIQUE_RATIO_WEIGHT * field.unique_ratio();
            match &best {
                Some((_, best_score)) if score <= *best_score => {}
                _ => best = Some((name.clone(), score)),
            }
        }

        best.map(|(name, _)| name)
    }
}

/// Upsert key for the document side: the elected primary key when present,
/// else the lexicographically first unique non-timestamp field, else none
/// (documents are then plain-inserted and may duplicate, a documented
/// trade-off).
pub fn document_key(decisions: &BTreeMap<String, PlacementDecision>) -> Option<String> {
    if let Some((name, _)) = decisions.iter().find(|(_, d)| d.is_primary_key) {
        return Some(name.clone());
    }
    decisions
        .iter()
        .find(|(name, d)| d.is_unique && !is_timestamp_like(name))
        .map(|(name, _)| name.clone())
}

fn is_linking_field(name: &str) -> bool {
    name == USERNAME_KEY || name == INGESTED_AT_KEY || name == CLIENT_TIMESTAMP_KEY
}

fn is_timestamp_like(name: &str) -> bool {
    name.contains("_at") || name.contains("time") || name.contains("date")
}

fn has_key_like_name(name: &str) -> bool {
    name.contains("id") || name.contains("username") || name.contains("key")
}
