//! In-memory reference backends
//!
//! Faithful reference models of the two backend contracts, used by the
//! engine's test suites (and handy for embedding the pipeline without live
//! databases). Both are cloneable handles over shared state, so a test can
//! keep one handle for inspection while the pipeline owns the other.
//!
//! Fault injection: `set_fail(true)` makes every subsequent mutating
//! operation fail with a transient backend error, which is how the flush
//! retention paths are exercised.

use crate::document::DocumentBackend;
use crate::relational::{ColumnInfo, ColumnKey, ColumnSpec, RelationalBackend, SqlRow};
use morph_core::{ColumnType, Error, FieldValue, Record, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

// ============================================================================
// Relational reference model
// ============================================================================

#[derive(Debug, Clone)]
struct MemColumn {
    column_type: ColumnType,
    nullable: bool,
    unique: bool,
}

#[derive(Debug, Default)]
struct MemTable {
    // Insertion-ordered like a real column catalog
    column_order: Vec<String>,
    columns: HashMap<String, MemColumn>,
    primary_key: Option<String>,
    rows: Vec<SqlRow>,
}

#[derive(Debug, Default)]
struct RelState {
    tables: HashMap<String, MemTable>,
    fail: bool,
}

/// In-memory implementation of [`RelationalBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRelational {
    state: Arc<Mutex<RelState>>,
}

impl MemoryRelational {
    /// Fresh, empty relational store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle fault injection for all mutating operations.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// All rows of a table, for assertions.
    pub fn rows(&self, table: &str) -> Vec<SqlRow> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// The live primary key of a table, for assertions.
    pub fn primary_key(&self, table: &str) -> Option<String> {
        self.state
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.primary_key.clone())
    }

    /// The live type of one column, for assertions.
    pub fn column_type(&self, table: &str, column: &str) -> Option<ColumnType> {
        self.state
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.columns.get(column))
            .map(|c| c.column_type)
    }

    /// Whether the table exists at all.
    pub fn table_exists(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(table)
    }

    fn check_fail(state: &RelState) -> Result<()> {
        if state.fail {
            Err(Error::Relational("injected relational failure".into()))
        } else {
            Ok(())
        }
    }
}

fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    a.canonical_string() == b.canonical_string()
}

impl RelationalBackend for MemoryRelational {
    fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let state = self.state.lock();
        let Some(mem_table) = state.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(mem_table
            .column_order
            .iter()
            .map(|name| {
                let column = &mem_table.columns[name];
                ColumnInfo {
                    name: name.clone(),
                    column_type: column.column_type,
                    nullable: column.nullable,
                    key: if mem_table.primary_key.as_deref() == Some(name.as_str()) {
                        ColumnKey::Primary
                    } else if column.unique {
                        ColumnKey::Unique
                    } else {
                        ColumnKey::None
                    },
                }
            })
            .collect())
    }

    fn create_table(
        &mut self,
        table: &str,
        columns: &[ColumnSpec],
        primary_key: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        if state.tables.contains_key(table) {
            return Ok(());
        }
        let mut mem_table = MemTable {
            primary_key: primary_key.map(str::to_string),
            ..MemTable::default()
        };
        for spec in columns {
            mem_table.column_order.push(spec.name.clone());
            mem_table.columns.insert(
                spec.name.clone(),
                MemColumn {
                    column_type: spec.column_type,
                    nullable: spec.nullable,
                    unique: spec.unique,
                },
            );
        }
        state.tables.insert(table.to_string(), mem_table);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnSpec) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        let mem_table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::Relational(format!("no such table: {table}")))?;
        if mem_table.columns.contains_key(&column.name) {
            return Ok(());
        }
        mem_table.column_order.push(column.name.clone());
        mem_table.columns.insert(
            column.name.clone(),
            MemColumn {
                column_type: column.column_type,
                nullable: column.nullable,
                unique: column.unique,
            },
        );
        Ok(())
    }

    fn modify_column(
        &mut self,
        table: &str,
        name: &str,
        new_type: ColumnType,
        nullable: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        let column = state
            .tables
            .get_mut(table)
            .and_then(|t| t.columns.get_mut(name))
            .ok_or_else(|| Error::Relational(format!("no such column: {table}.{name}")))?;
        column.column_type = new_type;
        column.nullable = nullable;
        Ok(())
    }

    fn drop_column(&mut self, table: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        let mem_table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::Relational(format!("no such table: {table}")))?;
        mem_table.column_order.retain(|c| c != name);
        mem_table.columns.remove(name);
        for row in &mut mem_table.rows {
            row.remove(name);
        }
        Ok(())
    }

    fn batch_upsert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[SqlRow],
        primary_key: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        if rows.is_empty() || columns.is_empty() {
            return Ok(());
        }
        let mem_table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::Relational(format!("no such table: {table}")))?;

        for row in rows {
            // Uniform column list: a missing value writes NULL
            let incoming: SqlRow = columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(FieldValue::Null)))
                .collect();

            let position = primary_key.and_then(|pk| {
                let key_value = incoming.get(pk)?;
                if key_value.is_null() {
                    return None;
                }
                mem_table
                    .rows
                    .iter()
                    .position(|r| r.get(pk).map(|v| same_value(v, key_value)).unwrap_or(false))
            });

            match position {
                Some(index) => {
                    for (column, value) in incoming {
                        mem_table.rows[index].insert(column, value);
                    }
                }
                None => mem_table.rows.push(incoming),
            }
        }
        Ok(())
    }

    fn fetch_rows(&mut self, table: &str, columns: &[String]) -> Result<Vec<SqlRow>> {
        let state = self.state.lock();
        let Some(mem_table) = state.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(mem_table
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(FieldValue::Null)))
                    .collect()
            })
            .collect())
    }

    fn update_by_link(
        &mut self,
        table: &str,
        column: &str,
        value: &FieldValue,
        link: &[(String, FieldValue)],
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        let Some(mem_table) = state.tables.get_mut(table) else {
            return Ok(());
        };
        for row in &mut mem_table.rows {
            let matches = link.iter().all(|(name, expected)| {
                row.get(name)
                    .map(|actual| same_value(actual, expected))
                    .unwrap_or(false)
            });
            if matches {
                row.insert(column.to_string(), value.clone());
            }
        }
        Ok(())
    }
}

// ============================================================================
// Document reference model
// ============================================================================

#[derive(Debug, Default)]
struct DocState {
    collections: HashMap<String, Vec<Record>>,
    unique_indexes: HashMap<String, BTreeSet<String>>,
    fail: bool,
}

/// In-memory implementation of [`DocumentBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    state: Arc<Mutex<DocState>>,
}

impl MemoryDocument {
    /// Fresh, empty document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle fault injection for all mutating operations.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// All documents of a collection, for assertions.
    pub fn docs(&self, collection: &str) -> Vec<Record> {
        self.state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Unique-indexed fields of a collection, for assertions.
    pub fn indexed_fields(&self, collection: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .unique_indexes
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check_fail(state: &DocState) -> Result<()> {
        if state.fail {
            Err(Error::Document("injected document failure".into()))
        } else {
            Ok(())
        }
    }
}

impl DocumentBackend for MemoryDocument {
    fn ensure_unique_index(&mut self, collection: &str, field: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        state
            .unique_indexes
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
        Ok(())
    }

    fn batch_upsert(
        &mut self,
        collection: &str,
        docs: &[Record],
        key_field: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        let stored = state.collections.entry(collection.to_string()).or_default();

        for doc in docs {
            let key = key_field.and_then(|k| doc.get(k).filter(|v| !v.is_null()));
            let position = key.and_then(|key_value| {
                let field = key_field.unwrap_or_default();
                stored.iter().position(|existing| {
                    existing
                        .get(field)
                        .map(|v| same_value(v, key_value))
                        .unwrap_or(false)
                })
            });
            match position {
                // Replace the whole document on a key match
                Some(index) => stored[index] = doc.clone(),
                None => stored.push(doc.clone()),
            }
        }
        Ok(())
    }

    fn find_docs_with_field(&mut self, collection: &str, field: &str) -> Result<Vec<Record>> {
        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| doc.contains_key(field))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn set_field_by_link(
        &mut self,
        collection: &str,
        link: &[(String, FieldValue)],
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_fail(&state)?;
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(());
        };
        for doc in docs {
            let matches = link.iter().all(|(name, expected)| {
                doc.get(name)
                    .map(|actual| same_value(actual, expected))
                    .unwrap_or(false)
            });
            if matches {
                doc.insert(field.to_string(), value.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, FieldValue)]) -> SqlRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_relational_upsert_replaces_by_pk() {
        let mut backend = MemoryRelational::new();
        backend
            .create_table(
                "records",
                &[
                    ColumnSpec {
                        name: "id".into(),
                        column_type: ColumnType::VarChar(255),
                        nullable: false,
                        unique: true,
                    },
                    ColumnSpec {
                        name: "age".into(),
                        column_type: ColumnType::BigInt,
                        nullable: true,
                        unique: false,
                    },
                ],
                Some("id"),
            )
            .unwrap();

        let columns = vec!["id".to_string(), "age".to_string()];
        backend
            .batch_upsert(
                "records",
                &columns,
                &[row(&[
                    ("id", FieldValue::Str("a".into())),
                    ("age", FieldValue::Int(30)),
                ])],
                Some("id"),
            )
            .unwrap();
        backend
            .batch_upsert(
                "records",
                &columns,
                &[row(&[
                    ("id", FieldValue::Str("a".into())),
                    ("age", FieldValue::Int(31)),
                ])],
                Some("id"),
            )
            .unwrap();

        let rows = backend.rows("records");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("age"), Some(&FieldValue::Int(31)));
    }

    #[test]
    fn test_relational_plain_insert_without_pk() {
        let mut backend = MemoryRelational::new();
        backend
            .create_table(
                "records",
                &[ColumnSpec {
                    name: "v".into(),
                    column_type: ColumnType::BigInt,
                    nullable: true,
                    unique: false,
                }],
                None,
            )
            .unwrap();

        let columns = vec!["v".to_string()];
        let batch = [row(&[("v", FieldValue::Int(1))])];
        backend.batch_upsert("records", &columns, &batch, None).unwrap();
        backend.batch_upsert("records", &columns, &batch, None).unwrap();
        assert_eq!(backend.rows("records").len(), 2);
    }

    #[test]
    fn test_drop_column_removes_values() {
        let mut backend = MemoryRelational::new();
        backend
            .create_table(
                "records",
                &[
                    ColumnSpec {
                        name: "a".into(),
                        column_type: ColumnType::BigInt,
                        nullable: true,
                        unique: false,
                    },
                    ColumnSpec {
                        name: "b".into(),
                        column_type: ColumnType::BigInt,
                        nullable: true,
                        unique: false,
                    },
                ],
                None,
            )
            .unwrap();
        backend
            .batch_upsert(
                "records",
                &["a".to_string(), "b".to_string()],
                &[row(&[("a", FieldValue::Int(1)), ("b", FieldValue::Int(2))])],
                None,
            )
            .unwrap();

        backend.drop_column("records", "b").unwrap();
        assert_eq!(backend.list_columns("records").unwrap().len(), 1);
        assert!(!backend.rows("records")[0].contains_key("b"));
    }

    #[test]
    fn test_fault_injection() {
        let mut backend = MemoryRelational::new();
        backend.set_fail(true);
        let err = backend.create_table("records", &[], None).unwrap_err();
        assert!(err.is_transient());
        backend.set_fail(false);
        backend.create_table("records", &[], None).unwrap();
    }

    #[test]
    fn test_document_upsert_by_key() {
        let mut backend = MemoryDocument::new();
        let mut doc = Record::new();
        doc.insert("username".to_string(), FieldValue::Str("alice".into()));
        doc.insert("score".to_string(), FieldValue::Int(1));
        backend
            .batch_upsert("records", &[doc.clone()], Some("username"))
            .unwrap();

        doc.insert("score".to_string(), FieldValue::Int(2));
        backend
            .batch_upsert("records", &[doc], Some("username"))
            .unwrap();

        let docs = backend.docs("records");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("score"), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn test_document_plain_insert_duplicates() {
        let mut backend = MemoryDocument::new();
        let mut doc = Record::new();
        doc.insert("v".to_string(), FieldValue::Int(1));
        backend.batch_upsert("records", &[doc.clone()], None).unwrap();
        backend.batch_upsert("records", &[doc], None).unwrap();
        assert_eq!(backend.docs("records").len(), 2);
    }

    #[test]
    fn test_document_set_field_by_link() {
        let mut backend = MemoryDocument::new();
        let mut doc = Record::new();
        doc.insert("username".to_string(), FieldValue::Str("alice".into()));
        backend.batch_upsert("records", &[doc], None).unwrap();

        backend
            .set_field_by_link(
                "records",
                &[("username".to_string(), FieldValue::Str("alice".into()))],
                "age",
                &FieldValue::Int(30),
            )
            .unwrap();
        assert_eq!(
            backend.docs("records")[0].get("age"),
            Some(&FieldValue::Int(30))
        );
    }
}
