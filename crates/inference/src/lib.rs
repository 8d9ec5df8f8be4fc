//! Semantic inference for the morph ingestion engine
//!
//! Three cooperating pieces:
//! - `normalize`: raw record → canonical record (dot-free keys, coerced
//!   leaves, expanded nested objects, injected ingestion timestamp) plus
//!   the array statistics probe
//! - `analyze`: cumulative per-field statistics over the probe
//! - `classify`: statistics → placement decisions + primary-key election

pub mod analyze;
pub mod classify;
pub mod normalize;

pub use analyze::FieldAnalyzer;
pub use classify::{document_key, Classifier};
pub use normalize::{normalize, normalize_value, probe, sanitize_key};
