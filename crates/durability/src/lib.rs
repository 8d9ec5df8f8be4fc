//! Durability layer for the morph ingestion engine
//!
//! - `wal`: append-only JSONL write-ahead log with fsync-before-ack appends,
//!   tolerant replay, and truncate-to-zero completion
//! - `metadata`: decisions/stats/state JSON files written atomically via
//!   temp + rename

pub mod metadata;
pub mod wal;

pub use metadata::{MetadataStore, WAL_FILE};
pub use wal::RecordWal;
