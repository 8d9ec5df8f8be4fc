//! Backend clients for the morph ingestion engine
//!
//! Two storage contracts and their implementations:
//! - `relational`: schema listing, DDL, and idempotent batch upserts
//!   (`mysql` driver implementation in `mysql_backend`)
//! - `document`: unique-index management and replace-by-key upserts
//!   (`mongodb` driver implementation in `mongo`)
//! - `testing`: in-memory reference models with fault injection
//!
//! Both drivers are used only from the flush path; neither is shared
//! across producer threads.

pub mod document;
pub mod mongo;
pub mod mysql_backend;
pub mod relational;
pub mod testing;

pub use document::DocumentBackend;
pub use mongo::MongoBackend;
pub use mysql_backend::MySqlBackend;
pub use relational::{ColumnInfo, ColumnKey, ColumnSpec, RelationalBackend, SqlRow};
pub use testing::{MemoryDocument, MemoryRelational};
