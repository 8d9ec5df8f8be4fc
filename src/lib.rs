//! # MorphDB
//!
//! An adaptive dual-backend ingestion engine. Records with unknown,
//! evolving shape are normalized, analyzed, and routed field-by-field to a
//! relational store (MySQL dialect) and a document store (MongoDB
//! semantics), with a write-ahead log and on-disk metadata for crash
//! recovery.
//!
//! There is no predefined schema: field types, placement, and keys are
//! inferred from observed data and continuously refined. The relational
//! schema is reconciled at runtime: columns are created, widened along a
//! fixed order, and migrated between backends as the data drifts. Linking
//! fields (`username`, `sys_ingested_at`) are duplicated to both backends
//! so downstream consumers can join them.
//!
//! # Quick Start
//!
//! ```no_run
//! use morphdb::{Config, Morph};
//!
//! fn main() -> morphdb::Result<()> {
//!     let pipeline = Morph::open(Config::default())?;
//!
//!     pipeline.ingest(serde_json::json!({
//!         "username": "alice",
//!         "age": 30,
//!         "city": "NYC",
//!         "metadata": {"level": 5}
//!     }))?;
//!
//!     let report = pipeline.flush()?;
//!     println!("processed {} records", report.records_processed);
//!
//!     for (field, decision) in pipeline.get_decisions() {
//!         println!("{field}: {:?} ({})", decision.backend, decision.reason);
//!     }
//!
//!     pipeline.close()
//! }
//! ```
//!
//! # Architecture
//!
//! [`IngestPipeline`] is the main entry point; [`Morph::open`] wires it to
//! the real MySQL/MongoDB clients from a [`Config`]. The flow per flush:
//!
//! `ingest → normalize → WAL append → buffer → analyze → classify →
//! reconcile schema → route → upsert both backends → persist metadata →
//! truncate WAL`
//!
//! For tests or embedding without live databases, construct
//! [`IngestPipeline`] directly over the in-memory reference backends in
//! [`backends::testing`].

pub use morph_backends as backends;
pub use morph_core as core;
pub use morph_durability as durability;
pub use morph_engine as engine;
pub use morph_inference as inference;

pub use morph_backends::{
    DocumentBackend, MemoryDocument, MemoryRelational, MongoBackend, MySqlBackend,
    RelationalBackend,
};
pub use morph_core::{
    BackendKind, ColumnType, Config, DetectedType, Error, FieldStats, FieldValue,
    PlacementDecision, Record, Result,
};
pub use morph_engine::{FlushReport, IngestPipeline, PipelineStatus};

/// Entry point that wires the pipeline to the real backend drivers.
pub struct Morph;

impl Morph {
    /// Open a pipeline connected to the configured MySQL and MongoDB
    /// servers, recovering any pending write-ahead log.
    pub fn open(config: Config) -> Result<IngestPipeline> {
        let relational = MySqlBackend::connect(&config.relational, &config.deadlines)?;
        let document = MongoBackend::connect(&config.document, &config.deadlines)?;
        IngestPipeline::open(config, Box::new(relational), Box::new(document))
    }
}
