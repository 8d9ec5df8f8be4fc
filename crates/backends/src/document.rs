//! Document backend contract
//!
//! Schemaless storage keyed (when possible) on a unique field. Upserts
//! replace the whole document on a key match and insert on a miss; with no
//! viable key the fallback is a plain insert, which can duplicate, a
//! documented trade-off.

use morph_core::{FieldValue, Record, Result};

/// Operations the engine consumes from the document store.
pub trait DocumentBackend: Send {
    /// Create a unique index on `field` if it does not already exist.
    fn ensure_unique_index(&mut self, collection: &str, field: &str) -> Result<()>;

    /// Upsert a batch of documents.
    ///
    /// Each document with a non-null `key_field` value replaces the
    /// matching document (insert on miss). Documents without the key, or
    /// when `key_field` is `None`, are plain-inserted.
    fn batch_upsert(
        &mut self,
        collection: &str,
        docs: &[Record],
        key_field: Option<&str>,
    ) -> Result<()>;

    /// Every document in which `field` is present (migration read path).
    fn find_docs_with_field(&mut self, collection: &str, field: &str) -> Result<Vec<Record>>;

    /// `$set` one field on the documents matching all `link` equalities
    /// (migration write path).
    fn set_field_by_link(
        &mut self,
        collection: &str,
        link: &[(String, FieldValue)],
        field: &str,
        value: &FieldValue,
    ) -> Result<()>;
}
