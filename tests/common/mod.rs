//! Shared test utilities for the integration suites.
//!
//! Pipelines are wired to the in-memory reference backends; each test gets
//! its own metadata directory. Backend handles are cloneable, so a test
//! keeps one handle for assertions while the pipeline owns the other.
//! Import via `mod common;` from any top-level test file.

#![allow(dead_code)]

use morphdb::backends::{MemoryDocument, MemoryRelational};
use morphdb::core::BufferConfig;
use morphdb::{Config, IngestPipeline};
use std::path::PathBuf;
use std::sync::Once;
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Route pipeline logs through the test harness capture.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub struct TestPipeline {
    pub pipeline: IngestPipeline,
    pub relational: MemoryRelational,
    pub document: MemoryDocument,
}

/// Open a pipeline over fresh memory backends with a large buffer, so
/// flushes only happen when a test asks for one.
pub fn open_pipeline(dir: &TempDir) -> TestPipeline {
    open_with(dir, MemoryRelational::new(), MemoryDocument::new())
}

/// Open a pipeline over existing backend handles (restart scenarios).
pub fn open_with(
    dir: &TempDir,
    relational: MemoryRelational,
    document: MemoryDocument,
) -> TestPipeline {
    init_tracing();
    let config = Config {
        metadata_dir: dir.path().to_path_buf(),
        buffer: BufferConfig {
            size: 10_000,
            timeout_seconds: 3_600,
        },
        ..Config::default()
    };
    let pipeline = IngestPipeline::open(
        config,
        Box::new(relational.clone()),
        Box::new(document.clone()),
    )
    .expect("pipeline open");
    TestPipeline {
        pipeline,
        relational,
        document,
    }
}

/// Path of the WAL file inside a test's metadata directory.
pub fn wal_path(dir: &TempDir) -> PathBuf {
    dir.path().join("pending.jsonl")
}
