//! On-disk metadata persistence
//!
//! Decisions, field statistics, and pipeline state live as three JSON files
//! next to the WAL under `metadata_dir`:
//!
//! | File | Content |
//! |---|---|
//! | `decisions.json` | field → PlacementDecision |
//! | `field_stats.json` | field → FieldStats (sets serialized as arrays) |
//! | `state.json` | total_records_processed, last_flush_time, version |
//!
//! Every file is written via write-to-temp + rename so a crash mid-write
//! leaves the previous version intact. A missing or unreadable file is a
//! cold start, never a fatal error; any existing WAL is still replayed.

use morph_core::{FieldStats, PipelineState, PlacementDecision, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// WAL file name under the metadata directory.
pub const WAL_FILE: &str = "pending.jsonl";

const DECISIONS_FILE: &str = "decisions.json";
const STATS_FILE: &str = "field_stats.json";
const STATE_FILE: &str = "state.json";

/// Owns the metadata directory and the three JSON state files.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    /// Open the store, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(MetadataStore { dir })
    }

    /// Path of the WAL file inside this metadata directory.
    pub fn wal_path(&self) -> PathBuf {
        self.dir.join(WAL_FILE)
    }

    /// Persist the decision table.
    pub fn save_decisions(&self, decisions: &BTreeMap<String, PlacementDecision>) -> Result<()> {
        self.write_atomic(DECISIONS_FILE, decisions)
    }

    /// Load the decision table; cold start on missing or unreadable file.
    pub fn load_decisions(&self) -> BTreeMap<String, PlacementDecision> {
        self.load_or_default(DECISIONS_FILE)
    }

    /// Persist the per-field statistics.
    pub fn save_stats(&self, stats: &BTreeMap<String, FieldStats>) -> Result<()> {
        self.write_atomic(STATS_FILE, stats)
    }

    /// Load the per-field statistics; cold start on missing or unreadable
    /// file.
    pub fn load_stats(&self) -> BTreeMap<String, FieldStats> {
        self.load_or_default(STATS_FILE)
    }

    /// Persist the pipeline state.
    pub fn save_state(&self, state: &PipelineState) -> Result<()> {
        self.write_atomic(STATE_FILE, state)
    }

    /// Load the pipeline state; cold start on missing or unreadable file.
    pub fn load_state(&self) -> PipelineState {
        self.load_or_default(STATE_FILE)
    }

    fn write_atomic<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let tmp = self.dir.join(format!("{name}.tmp"));
        let target = self.dir.join(name);

        let bytes = serde_json::to_vec_pretty(value)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!(file = name, error = %e, "metadata unreadable; cold start");
                return T::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(file = name, error = %e, "metadata corrupt; cold start");
                T::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use morph_core::{BackendKind, ColumnType, DetectedType, FieldValue};
    use tempfile::TempDir;

    fn decision() -> PlacementDecision {
        PlacementDecision {
            backend: BackendKind::Sql,
            canonical_type: DetectedType::Int,
            sql_type: Some(ColumnType::BigInt),
            is_nullable: false,
            is_unique: false,
            is_primary_key: false,
            reason: "stable".into(),
        }
    }

    #[test]
    fn test_round_trip_all_files() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();

        let mut decisions = BTreeMap::new();
        decisions.insert("age".to_string(), decision());
        store.save_decisions(&decisions).unwrap();

        let mut stats = BTreeMap::new();
        let mut field = FieldStats::default();
        field.observe(&FieldValue::Int(30));
        stats.insert("age".to_string(), field);
        store.save_stats(&stats).unwrap();

        let state = PipelineState {
            total_records_processed: 42,
            last_flush_time: Some(Utc::now()),
            version: 7,
        };
        store.save_state(&state).unwrap();

        assert_eq!(store.load_decisions(), decisions);
        assert_eq!(store.load_stats(), stats);
        let loaded = store.load_state();
        assert_eq!(loaded.total_records_processed, 42);
        assert_eq!(loaded.version, 7);
    }

    #[test]
    fn test_missing_files_cold_start() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        assert!(store.load_decisions().is_empty());
        assert!(store.load_stats().is_empty());
        assert_eq!(store.load_state(), PipelineState::default());
    }

    #[test]
    fn test_corrupt_file_cold_start() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("decisions.json"), b"{not json").unwrap();
        assert!(store.load_decisions().is_empty());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::open(dir.path()).unwrap();
        store.save_state(&PipelineState::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
