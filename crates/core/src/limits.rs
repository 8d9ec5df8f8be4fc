//! Bounded-memory caps for per-field statistics
//!
//! ## Contract
//!
//! These caps are part of the observable contract, not tuning knobs.
//! `unique_ratio` saturates at `UNIQUE_VALUE_CAP / presence_count`; raising
//! the cap silently would change every uniqueness-driven decision downstream
//! (unique columns, primary-key candidates, document upsert keys).

/// Maximum distinct entries tracked per field; further inserts are dropped.
pub const UNIQUE_VALUE_CAP: usize = 1_000;

/// Maximum first-seen example values retained per field.
pub const SAMPLE_VALUE_CAP: usize = 10;
