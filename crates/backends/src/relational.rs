//! Relational backend contract
//!
//! The trait mirrors the operations the engine consumes: schema listing and
//! DDL on one side, idempotent batch upserts and the two migration
//! primitives on the other. Implementations must be idempotent on retry
//! when called with the same inputs.

use morph_core::{ColumnType, FieldValue, Result};
use std::collections::BTreeMap;

/// A relational row: column name to value.
pub type SqlRow = BTreeMap<String, FieldValue>;

/// Key participation of a live column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKey {
    /// Not part of any key
    None,
    /// Primary key column
    Primary,
    /// Unique-indexed column
    Unique,
}

/// A live column as reported by the backend's schema catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Parsed column type
    pub column_type: ColumnType,
    /// Whether the column admits NULL
    pub nullable: bool,
    /// Key participation
    pub key: ColumnKey,
}

/// A column to create or add, derived from a placement decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
    /// Whether the column admits NULL
    pub nullable: bool,
    /// Whether to declare the column UNIQUE
    pub unique: bool,
}

/// Operations the engine consumes from the relational store.
pub trait RelationalBackend: Send {
    /// List the live columns of `table`; empty when the table does not
    /// exist.
    fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Create `table` with exactly the given columns and optional primary
    /// key.
    fn create_table(
        &mut self,
        table: &str,
        columns: &[ColumnSpec],
        primary_key: Option<&str>,
    ) -> Result<()>;

    /// Add one column to an existing table.
    fn add_column(&mut self, table: &str, column: &ColumnSpec) -> Result<()>;

    /// Alter a column to a (wider) type, preserving nullability.
    fn modify_column(
        &mut self,
        table: &str,
        name: &str,
        new_type: ColumnType,
        nullable: bool,
    ) -> Result<()>;

    /// Drop a column (only ever after its data was migrated out).
    fn drop_column(&mut self, table: &str, name: &str) -> Result<()>;

    /// Upsert a batch of rows in one statement.
    ///
    /// `columns` is the uniform column list; a row missing a column writes
    /// NULL. With a primary key this is insert-or-update keyed on it;
    /// without one it is a plain insert. A failure fails the whole batch.
    fn batch_upsert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[SqlRow],
        primary_key: Option<&str>,
    ) -> Result<()>;

    /// Fetch the given columns for every row (migration read path).
    fn fetch_rows(&mut self, table: &str, columns: &[String]) -> Result<Vec<SqlRow>>;

    /// Set `column = value` on the rows matching all `link` equalities
    /// (migration write path).
    fn update_by_link(
        &mut self,
        table: &str,
        column: &str,
        value: &FieldValue,
        link: &[(String, FieldValue)],
    ) -> Result<()>;
}
