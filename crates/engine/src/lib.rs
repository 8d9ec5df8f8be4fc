//! Pipeline engine for the morph ingestion system
//!
//! - `pipeline`: the ingest orchestrator (buffering, WAL, flush loop,
//!   startup recovery)
//! - `schema`: relational schema reconciliation against the decision table
//! - `router`: decision-driven record splitting
//! - `migrate`: cross-backend data migration keyed on the linking fields

pub mod migrate;
pub mod pipeline;
pub mod router;
pub mod schema;

pub use pipeline::{FlushReport, IngestPipeline, PipelineStatus};
pub use router::{split_batch, RoutedBatch};
pub use schema::ensure_table;
