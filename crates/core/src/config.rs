//! Typed pipeline configuration
//!
//! Parsed once at startup and passed by value; no config dictionaries float
//! through the system. Every field has a serde default so a partial config
//! file (or `Config::default()`) yields a working pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Relational backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Server hostname. Default: `localhost`.
    pub host: String,
    /// Server port. Default: 3306.
    pub port: u16,
    /// Username. Default: `root`.
    pub user: String,
    /// Password. Default: empty.
    pub password: String,
    /// Database name. Default: `morph`.
    pub database: String,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        RelationalConfig {
            host: "localhost".into(),
            port: 3306,
            user: "root".into(),
            password: String::new(),
            database: "morph".into(),
        }
    }
}

/// Document backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Server hostname. Default: `localhost`.
    pub host: String,
    /// Server port. Default: 27017.
    pub port: u16,
    /// Optional username.
    pub user: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Database name. Default: `morph`.
    pub database: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        DocumentConfig {
            host: "localhost".into(),
            port: 27017,
            user: None,
            password: None,
            database: "morph".into(),
        }
    }
}

/// Buffering thresholds that trigger a flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Flush once this many records are buffered. Default: 50.
    pub size: usize,
    /// Flush once this many seconds passed since the last flush. Default: 30.
    pub timeout_seconds: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            size: 50,
            timeout_seconds: 30,
        }
    }
}

impl BufferConfig {
    /// The timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Placement thresholds; tunable constants documented as part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Minimum presence ratio for relational placement. Default: 0.70.
    pub min_presence: f64,
    /// Minimum type stability for relational placement. Default: 0.90.
    pub min_type_stability: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            min_presence: 0.70,
            min_type_stability: 0.90,
        }
    }
}

/// Primary-key selection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PkConfig {
    /// Minimum unique ratio for a primary-key candidate. Default: 0.70.
    pub min_unique: f64,
}

impl Default for PkConfig {
    fn default() -> Self {
        PkConfig { min_unique: 0.70 }
    }
}

/// Upstream source settings (consumed by the external ingest driver).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL the external driver polls for records.
    pub url: Option<String>,
}

/// Per-operation backend deadlines (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Relational DDL deadline. Default: 30.
    pub relational_ddl_seconds: u64,
    /// Relational batch-upsert deadline. Default: 30.
    pub relational_upsert_seconds: u64,
    /// Document batch-upsert deadline. Default: 30.
    pub document_upsert_seconds: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        DeadlineConfig {
            relational_ddl_seconds: 30,
            relational_upsert_seconds: 30,
            document_upsert_seconds: 30,
        }
    }
}

impl DeadlineConfig {
    /// Longest of the relational deadlines, applied as the driver socket
    /// timeout.
    pub fn relational_timeout(&self) -> Duration {
        Duration::from_secs(self.relational_ddl_seconds.max(self.relational_upsert_seconds))
    }

    /// Document operation deadline as a `Duration`.
    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_upsert_seconds)
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relational backend connection settings.
    pub relational: RelationalConfig,
    /// Document backend connection settings.
    pub document: DocumentConfig,
    /// Buffering thresholds.
    pub buffer: BufferConfig,
    /// Placement thresholds.
    pub placement: PlacementConfig,
    /// Primary-key thresholds.
    pub pk: PkConfig,
    /// Upstream source settings.
    pub source: SourceConfig,
    /// Backend operation deadlines.
    pub deadlines: DeadlineConfig,
    /// Directory holding the WAL and metadata files. Default: `./metadata`.
    pub metadata_dir: PathBuf,
    /// Single destination table/collection name. Default: `records`.
    pub table_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relational: RelationalConfig::default(),
            document: DocumentConfig::default(),
            buffer: BufferConfig::default(),
            placement: PlacementConfig::default(),
            pk: PkConfig::default(),
            source: SourceConfig::default(),
            deadlines: DeadlineConfig::default(),
            metadata_dir: PathBuf::from("./metadata"),
            table_name: "records".into(),
        }
    }
}
