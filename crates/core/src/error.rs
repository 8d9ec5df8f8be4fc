//! Error types for the ingestion engine
//!
//! One unified error enum for all crates, built with `thiserror`. Transient
//! backend failures are distinguishable from permanent schema conflicts so
//! the orchestrator can retain the WAL and retry the former while logging
//! and skipping the latter.

use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the ingestion engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (WAL, metadata files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serde(String),

    /// Record rejected at ingest (top-level value is not an object)
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Relational backend failure (connection, DDL, or upsert)
    #[error("relational backend error: {0}")]
    Relational(String),

    /// Document backend failure (connection, index, or upsert)
    #[error("document backend error: {0}")]
    Document(String),

    /// Permanent DDL conflict (attempted narrowing, primary-key change)
    #[error("schema conflict on column `{column}`: {reason}")]
    SchemaConflict {
        /// Column the conflicting alteration targeted
        column: String,
        /// Why the alteration was refused
        reason: String,
    },

    /// Metadata store failure that is not a plain I/O error
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Operation attempted after `close()`
    #[error("pipeline is closed")]
    Closed,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serde(e.to_string())
    }
}

impl Error {
    /// Whether this failure is transient and the batch should be retried
    /// on the next flush trigger (buffer and WAL retained).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Relational(_) | Error::Document(_))
    }

    /// Whether this is a permanent schema conflict that must be skipped
    /// rather than retried.
    pub fn is_schema_conflict(&self) -> bool {
        matches!(self, Error::SchemaConflict { .. })
    }
}
