//! Placement decisions and persisted pipeline state
//!
//! A `PlacementDecision` is the per-field answer to "where does this field
//! go and what is it": target backend(s), canonical type, relational column
//! type, nullability/uniqueness/primary-key flags, and a human-readable
//! reason. Decisions are created at first classification and may mutate on
//! later flushes (widening, backend migration).

use crate::column::ColumnType;
use crate::value::DetectedType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which backend(s) a field is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackendKind {
    /// Relational store only
    Sql,
    /// Document store only
    Doc,
    /// Duplicated to both backends (linking fields)
    Both,
}

impl BackendKind {
    /// Whether the field is written to the relational store.
    pub fn includes_sql(&self) -> bool {
        matches!(self, BackendKind::Sql | BackendKind::Both)
    }

    /// Whether the field is written to the document store.
    pub fn includes_doc(&self) -> bool {
        matches!(self, BackendKind::Doc | BackendKind::Both)
    }
}

/// Per-field placement decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    /// Target backend(s)
    pub backend: BackendKind,
    /// Dominant detected type at classification time
    pub canonical_type: DetectedType,
    /// Relational column type; `None` when the field is document-only
    pub sql_type: Option<ColumnType>,
    /// Whether the relational column admits NULL
    pub is_nullable: bool,
    /// Whether the field's values are (near-)unique
    pub is_unique: bool,
    /// Whether this field is the elected relational primary key
    pub is_primary_key: bool,
    /// Short human-readable explanation of the decision
    pub reason: String,
}

/// Persisted pipeline counters, stored in `state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Total records promoted to the backends over the pipeline's lifetime
    pub total_records_processed: u64,
    /// Completion time of the most recent successful flush
    pub last_flush_time: Option<DateTime<Utc>>,
    /// Metadata version, bumped on every successful persist
    pub version: u64,
}
