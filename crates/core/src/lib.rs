//! Core types for the morph ingestion engine
//!
//! This crate defines the foundational types used throughout the system:
//! - FieldValue / DetectedType: the tagged value union and its discriminant
//! - Record: flat-keyed mapping from canonical field names to values
//! - ColumnType: relational column types and the widening order
//! - FieldStats: cumulative per-field statistics with capped sets
//! - PlacementDecision / BackendKind: where each field is stored and how
//! - PipelineState: persisted counters
//! - Config: the typed configuration surface
//! - Error: unified error hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod column;
pub mod config;
pub mod decision;
pub mod error;
pub mod limits;
pub mod stats;
pub mod value;

pub use column::{ColumnType, ParseColumnTypeError};
pub use config::{
    BufferConfig, Config, DeadlineConfig, DocumentConfig, PkConfig, PlacementConfig,
    RelationalConfig, SourceConfig,
};
pub use decision::{BackendKind, PipelineState, PlacementDecision};
pub use error::{Error, Result};
pub use limits::{SAMPLE_VALUE_CAP, UNIQUE_VALUE_CAP};
pub use stats::FieldStats;
pub use value::{
    coerce_scalar, record_from_json, record_to_json, restore_record_tags, DetectedType, FieldValue,
    Record,
};

/// Server-assigned ingestion timestamp key, always present post-normalization.
pub const INGESTED_AT_KEY: &str = "sys_ingested_at";

/// Client-supplied timestamp key, present when upstream provides it.
pub const CLIENT_TIMESTAMP_KEY: &str = "t_stamp";

/// Username linking field, duplicated across both backends.
pub const USERNAME_KEY: &str = "username";

/// Fields duplicated across both backends so consumers can join them.
pub const LINKING_FIELDS: &[&str] = &[USERNAME_KEY, INGESTED_AT_KEY];
