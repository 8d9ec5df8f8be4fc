//! Relational schema reconciliation
//!
//! `ensure_table` runs before every batch that would touch the relational
//! side and makes the live table match the current decisions:
//!
//! - missing table: `CREATE TABLE` with exactly the SQL-placed columns
//! - columns in decisions but not live: `ADD COLUMN` (with a document-side
//!   backfill when the field previously lived there)
//! - live columns whose decision widened: `MODIFY COLUMN` along the
//!   widening order; anything outside the order is a conflict, logged and
//!   skipped with the decision's reason annotated
//! - live columns whose field moved to the document store: migrate the
//!   data out, then `DROP COLUMN`
//! - live columns with no decision at all: left in place, never dropped
//!
//! A primary key is only ever established at table creation. Once set it is
//! never silently altered: a differing election is logged and skipped until
//! an operator intervenes, and the live key remains the effective upsert
//! key.

use crate::migrate::{migrate_doc_to_sql, migrate_sql_to_doc};
use morph_backends::{ColumnInfo, ColumnKey, ColumnSpec, DocumentBackend, RelationalBackend};
use morph_core::{ColumnType, PlacementDecision, Result, LINKING_FIELDS};
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::{info, warn};

fn spec_for(name: &str, decision: &PlacementDecision) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        column_type: decision
            .sql_type
            .unwrap_or_else(|| ColumnType::for_detected(decision.canonical_type)),
        nullable: decision.is_nullable,
        unique: decision.is_unique && !decision.is_primary_key,
    }
}

fn annotate(decisions: &mut BTreeMap<String, PlacementDecision>, field: &str, note: &str) {
    if let Some(decision) = decisions.get_mut(field) {
        if !decision.reason.contains(note) {
            decision.reason.push_str("; ");
            decision.reason.push_str(note);
        }
    }
}

fn previously_doc_only(previous: &BTreeMap<String, PlacementDecision>, field: &str) -> bool {
    previous
        .get(field)
        .map(|d| !d.backend.includes_sql())
        .unwrap_or(false)
}

/// Reconcile the live table with the current decisions and return the
/// effective primary key (the live key when one exists, the elected key on
/// a fresh create, `None` otherwise).
pub fn ensure_table(
    relational: &mut dyn RelationalBackend,
    document: &mut dyn DocumentBackend,
    table: &str,
    decisions: &mut BTreeMap<String, PlacementDecision>,
    previous: &BTreeMap<String, PlacementDecision>,
) -> Result<Option<String>> {
    let sql_specs: Vec<ColumnSpec> = decisions
        .iter()
        .filter(|(_, d)| d.backend.includes_sql())
        .map(|(name, d)| spec_for(name, d))
        .collect();
    let desired_pk = decisions
        .iter()
        .find(|(_, d)| d.is_primary_key)
        .map(|(name, _)| name.clone());

    let live = relational.list_columns(table)?;

    if live.is_empty() {
        if sql_specs.is_empty() {
            return Ok(None);
        }
        info!(table, columns = sql_specs.len(), pk = ?desired_pk, "creating table");
        relational.create_table(table, &sql_specs, desired_pk.as_deref())?;
        for spec in &sql_specs {
            if previously_doc_only(previous, &spec.name) {
                migrate_doc_to_sql(relational, document, table, &spec.name)?;
            }
        }
        return Ok(desired_pk);
    }

    let live_by_name: HashMap<&str, &ColumnInfo> =
        live.iter().map(|c| (c.name.as_str(), c)).collect();
    let effective_pk = live
        .iter()
        .find(|c| c.key == ColumnKey::Primary)
        .map(|c| c.name.clone());

    // A primary key is schema-breaking to change; never do it silently.
    match (&desired_pk, &effective_pk) {
        (Some(desired), Some(live_pk)) if desired != live_pk => {
            warn!(
                table,
                desired = %desired,
                live = %live_pk,
                "primary key change blocked; operator intervention required"
            );
            annotate(decisions, desired, "primary key change blocked");
        }
        (Some(desired), None) => {
            warn!(
                table,
                desired = %desired,
                "table exists without a primary key; election deferred"
            );
            annotate(decisions, desired, "primary key election deferred");
        }
        _ => {}
    }

    let link_columns: Vec<String> = LINKING_FIELDS
        .iter()
        .filter(|f| live_by_name.contains_key(**f))
        .map(|f| f.to_string())
        .collect();

    // Additions and widenings
    for spec in &sql_specs {
        match live_by_name.get(spec.name.as_str()) {
            None => {
                info!(table, column = %spec.name, column_type = %spec.column_type, "adding column");
                relational.add_column(table, spec)?;
                if previously_doc_only(previous, &spec.name) {
                    migrate_doc_to_sql(relational, document, table, &spec.name)?;
                }
            }
            Some(column) => {
                if spec.column_type.satisfied_by(column.column_type) {
                    // Equal or already wider; never narrow
                } else if column.column_type.widens_to(spec.column_type) {
                    info!(
                        table,
                        column = %spec.name,
                        from = %column.column_type,
                        to = %spec.column_type,
                        "widening column"
                    );
                    relational.modify_column(
                        table,
                        &spec.name,
                        spec.column_type,
                        column.nullable || spec.nullable,
                    )?;
                } else {
                    warn!(
                        table,
                        column = %spec.name,
                        live = %column.column_type,
                        decided = %spec.column_type,
                        "type change outside widening order; skipped"
                    );
                    annotate(decisions, &spec.name, "type change blocked (not a widening)");
                }
            }
        }
    }

    // Fields that moved to the document store: migrate, then drop.
    // Live columns with no decision at all are left in place.
    for column in &live {
        let Some(decision) = decisions.get(&column.name) else {
            continue;
        };
        if decision.backend.includes_sql() {
            continue;
        }
        if effective_pk.as_deref() == Some(column.name.as_str()) {
            warn!(table, column = %column.name, "refusing to drop primary key column");
            annotate(decisions, &column.name, "primary key column retained");
            continue;
        }
        if link_columns.len() < LINKING_FIELDS.len() {
            warn!(
                table,
                column = %column.name,
                "link columns missing; cannot migrate column to document store"
            );
            annotate(decisions, &column.name, "migration blocked (no link columns)");
            continue;
        }
        migrate_sql_to_doc(relational, document, table, &column.name, &link_columns)?;
        info!(table, column = %column.name, "dropping migrated column");
        relational.drop_column(table, &column.name)?;
    }

    Ok(effective_pk)
}
