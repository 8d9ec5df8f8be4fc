//! Decision-driven record routing
//!
//! Splits each normalized record by the current decision table:
//!
//! - `sql` part: fields decided SQL or BOTH; a record missing the effective
//!   primary-key value is omitted from the relational batch entirely (it
//!   cannot upsert safely) but still reaches the document store
//! - `doc` part: fields decided DOC or BOTH, plus every key with no
//!   decision yet
//!
//! Each backend then receives one batch call per flush; both stores write
//! to a single configured destination (default `records`) to keep the
//! linking invariant simple.

use morph_backends::SqlRow;
use morph_core::{PlacementDecision, Record};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A batch split by placement decision.
#[derive(Debug, Default, Clone)]
pub struct RoutedBatch {
    /// Uniform column list for the relational statement
    pub sql_columns: Vec<String>,
    /// Relational rows (records with a usable primary-key value)
    pub sql_rows: Vec<SqlRow>,
    /// Document-side payloads, one per input record
    pub docs: Vec<Record>,
}

/// Split a batch of records by the decision table.
pub fn split_batch(
    records: &[Record],
    decisions: &BTreeMap<String, PlacementDecision>,
    primary_key: Option<&str>,
) -> RoutedBatch {
    let mut sql_columns: BTreeSet<String> = BTreeSet::new();
    let mut sql_rows: Vec<SqlRow> = Vec::new();
    let mut docs: Vec<Record> = Vec::new();

    for record in records {
        let mut sql_part = SqlRow::new();
        let mut doc_part = Record::new();

        for (key, value) in record {
            match decisions.get(key) {
                Some(decision) => {
                    if decision.backend.includes_sql() {
                        sql_part.insert(key.clone(), value.clone());
                    }
                    if decision.backend.includes_doc() {
                        doc_part.insert(key.clone(), value.clone());
                    }
                }
                // Unknown keys never go relational
                None => {
                    doc_part.insert(key.clone(), value.clone());
                }
            }
        }

        let pk_usable = match primary_key {
            Some(pk) => sql_part.get(pk).map(|v| !v.is_null()).unwrap_or(false),
            None => true,
        };
        if pk_usable && !sql_part.is_empty() {
            sql_columns.extend(sql_part.keys().cloned());
            sql_rows.push(sql_part);
        }

        docs.push(doc_part);
    }

    debug!(
        records = records.len(),
        sql_rows = sql_rows.len(),
        docs = docs.len(),
        "routed batch"
    );

    RoutedBatch {
        sql_columns: sql_columns.into_iter().collect(),
        sql_rows,
        docs,
    }
}
