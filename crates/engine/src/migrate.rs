//! Cross-backend data migration
//!
//! When a field's placement changes backend, existing data follows it,
//! keyed by the linking fields (`username`, `sys_ingested_at`):
//!
//! - DOC → SQL: every document carrying the field contributes its value to
//!   the new relational column
//! - SQL → DOC: existing column values are `$set` into the matching
//!   documents (the caller drops the column afterwards)
//!
//! A record whose link fields are absent cannot be correlated; it is
//! skipped and logged. Migrations run inside schema reconciliation, before
//! the batch is routed, so the first batch after a decision change sees a
//! consistent schema.

use morph_backends::{DocumentBackend, RelationalBackend};
use morph_core::{FieldValue, Record, Result, LINKING_FIELDS};
use tracing::{info, warn};

/// Extract the linking pairs present (and non-null) in a record.
fn link_pairs(record: &Record) -> Vec<(String, FieldValue)> {
    LINKING_FIELDS
        .iter()
        .filter_map(|field| {
            record
                .get(*field)
                .filter(|v| !v.is_null())
                .map(|v| (field.to_string(), v.clone()))
        })
        .collect()
}

/// Copy `field` values from existing documents into the relational column
/// of the same name. Returns the number of migrated values.
pub fn migrate_doc_to_sql(
    relational: &mut dyn RelationalBackend,
    document: &mut dyn DocumentBackend,
    table: &str,
    field: &str,
) -> Result<usize> {
    let docs = document.find_docs_with_field(table, field)?;
    let mut migrated = 0usize;

    for doc in docs {
        let link = link_pairs(&doc);
        if link.len() < LINKING_FIELDS.len() {
            warn!(field, "document missing link fields; skipping migration row");
            continue;
        }
        let Some(value) = doc.get(field) else {
            continue;
        };
        relational.update_by_link(table, field, value, &link)?;
        migrated += 1;
    }

    info!(field, migrated, "migrated field from document to relational store");
    Ok(migrated)
}

/// Copy existing relational column values into the matching documents.
/// Returns the number of migrated values; the caller is responsible for
/// dropping the column once this succeeds.
pub fn migrate_sql_to_doc(
    relational: &mut dyn RelationalBackend,
    document: &mut dyn DocumentBackend,
    table: &str,
    field: &str,
    link_columns: &[String],
) -> Result<usize> {
    let mut columns: Vec<String> = link_columns.to_vec();
    columns.push(field.to_string());
    let rows = relational.fetch_rows(table, &columns)?;
    let mut migrated = 0usize;

    for row in rows {
        let link = link_pairs(&row);
        if link.len() < LINKING_FIELDS.len() {
            warn!(field, "row missing link fields; skipping migration row");
            continue;
        }
        let Some(value) = row.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        document.set_field_by_link(table, &link, field, value)?;
        migrated += 1;
    }

    info!(field, migrated, "migrated column from relational to document store");
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use morph_backends::{ColumnSpec, MemoryDocument, MemoryRelational};
    use morph_core::value::parse_datetime;
    use morph_core::ColumnType;

    fn linked_record(user: &str, extra: &[(&str, FieldValue)]) -> Record {
        let mut record = Record::new();
        record.insert("username".to_string(), FieldValue::Str(user.into()));
        record.insert(
            "sys_ingested_at".to_string(),
            FieldValue::DateTime(parse_datetime("2024-03-01T10:00:00Z").unwrap()),
        );
        for (k, v) in extra {
            record.insert(k.to_string(), v.clone());
        }
        record
    }

    fn link_columns() -> Vec<String> {
        LINKING_FIELDS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_doc_to_sql_backfill() {
        let mut relational = MemoryRelational::new();
        let mut document = MemoryDocument::new();

        relational
            .create_table(
                "records",
                &[
                    ColumnSpec {
                        name: "username".into(),
                        column_type: ColumnType::VarChar(255),
                        nullable: false,
                        unique: false,
                    },
                    ColumnSpec {
                        name: "sys_ingested_at".into(),
                        column_type: ColumnType::DateTime,
                        nullable: false,
                        unique: false,
                    },
                    ColumnSpec {
                        name: "score".into(),
                        column_type: ColumnType::BigInt,
                        nullable: true,
                        unique: false,
                    },
                ],
                Some("username"),
            )
            .unwrap();

        // An existing relational row for alice, score not yet populated
        let row = linked_record("alice", &[]);
        let columns: Vec<String> = row.keys().cloned().collect();
        relational
            .batch_upsert("records", &columns, &[row], Some("username"))
            .unwrap();

        // The document store already holds alice's score
        let doc = linked_record("alice", &[("score", FieldValue::Int(95))]);
        document.batch_upsert("records", &[doc], None).unwrap();

        let migrated =
            migrate_doc_to_sql(&mut relational, &mut document, "records", "score").unwrap();
        assert_eq!(migrated, 1);
        assert_eq!(
            relational.rows("records")[0].get("score"),
            Some(&FieldValue::Int(95))
        );
    }

    #[test]
    fn test_doc_to_sql_skips_unlinked_documents() {
        let mut relational = MemoryRelational::new();
        let mut document = MemoryDocument::new();
        relational.create_table("records", &[], None).unwrap();

        let mut doc = Record::new();
        doc.insert("score".to_string(), FieldValue::Int(1));
        document.batch_upsert("records", &[doc], None).unwrap();

        let migrated =
            migrate_doc_to_sql(&mut relational, &mut document, "records", "score").unwrap();
        assert_eq!(migrated, 0);
    }

    #[test]
    fn test_sql_to_doc_copies_values() {
        let mut relational = MemoryRelational::new();
        let mut document = MemoryDocument::new();

        relational
            .create_table(
                "records",
                &[
                    ColumnSpec {
                        name: "username".into(),
                        column_type: ColumnType::VarChar(255),
                        nullable: false,
                        unique: false,
                    },
                    ColumnSpec {
                        name: "sys_ingested_at".into(),
                        column_type: ColumnType::DateTime,
                        nullable: false,
                        unique: false,
                    },
                    ColumnSpec {
                        name: "age".into(),
                        column_type: ColumnType::BigInt,
                        nullable: true,
                        unique: false,
                    },
                ],
                Some("username"),
            )
            .unwrap();

        let row = linked_record("alice", &[("age", FieldValue::Int(30))]);
        let columns: Vec<String> = row.keys().cloned().collect();
        relational
            .batch_upsert("records", &columns, &[row], Some("username"))
            .unwrap();

        // Matching document on the same link keys
        let doc = linked_record("alice", &[]);
        document.batch_upsert("records", &[doc], None).unwrap();

        let migrated = migrate_sql_to_doc(
            &mut relational,
            &mut document,
            "records",
            "age",
            &link_columns(),
        )
        .unwrap();
        assert_eq!(migrated, 1);
        assert_eq!(
            document.docs("records")[0].get("age"),
            Some(&FieldValue::Int(30))
        );
    }
}
