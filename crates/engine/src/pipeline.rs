//! Ingest orchestrator
//!
//! One owned object with an explicit lifecycle (`open → ingest* → flush* →
//! close`), no module-level singletons. The pipeline uniquely owns the
//! buffer, the WAL handle, the metadata store, and both backend clients;
//! a single mutex serializes producers and the flush path, so at most one
//! flush runs at a time and no ingest observes a partially flushed buffer.
//!
//! ## Flush pipeline
//!
//! 1. snapshot the buffer and clear it
//! 2. analyzer folds the snapshot into the statistics
//! 3. classifier recomputes every decision
//! 4. schema reconciliation (may trigger migrations)
//! 5. router splits and upserts both backends
//! 6. metadata persisted (decisions, stats, state)
//! 7. WAL truncated to length zero
//!
//! If a backend fails in step 5, steps 6 and 7 are skipped, the snapshot is
//! re-enqueued at the head of the buffer, the in-memory statistics and
//! decisions roll back to their pre-batch values (so the retry is not
//! double counted), and the caller sees the failure. The WAL is retained,
//! so a crash before the retry still replays the batch.
//!
//! ## Startup recovery
//!
//! `open` loads decisions/stats/state from disk (missing or corrupt files
//! are a cold start), replays any non-empty WAL onto the buffer, and
//! immediately flushes. A transient backend failure during that flush is
//! logged and left for the next trigger; the data stays in the WAL.

use crate::router::split_batch;
use crate::schema::ensure_table;
use chrono::{DateTime, Utc};
use morph_backends::{DocumentBackend, RelationalBackend};
use morph_core::{
    record_from_json, restore_record_tags, Config, Error, FieldStats, PipelineState,
    PlacementDecision, Record, Result,
};
use morph_durability::{MetadataStore, RecordWal};
use morph_inference::{document_key, normalize, Classifier, FieldAnalyzer};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

/// Result of one flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Records promoted to the backends by this flush
    pub records_processed: usize,
    /// Decisions currently targeting the relational store (SQL or BOTH)
    pub decisions_sql: usize,
    /// Decisions currently targeting the document store (DOC or BOTH)
    pub decisions_doc: usize,
}

/// Snapshot of the pipeline's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    /// Records currently buffered (WAL-backed, not yet flushed)
    pub buffer_size: usize,
    /// Records promoted over the pipeline's lifetime
    pub total_records_processed: u64,
    /// Completion time of the most recent successful flush
    pub last_flush_time: Option<DateTime<Utc>>,
}

struct Inner {
    config: Config,
    buffer: Vec<Record>,
    wal: RecordWal,
    meta: MetadataStore,
    analyzer: FieldAnalyzer,
    classifier: Classifier,
    decisions: BTreeMap<String, PlacementDecision>,
    state: PipelineState,
    relational: Box<dyn RelationalBackend>,
    document: Box<dyn DocumentBackend>,
    last_flush: Instant,
    closed: bool,
}

/// The ingestion pipeline front door.
pub struct IngestPipeline {
    inner: Mutex<Inner>,
}

impl IngestPipeline {
    /// Open the pipeline: load persisted metadata, replay the WAL, and
    /// flush any recovered records.
    pub fn open(
        config: Config,
        relational: Box<dyn RelationalBackend>,
        document: Box<dyn DocumentBackend>,
    ) -> Result<Self> {
        let meta = MetadataStore::open(&config.metadata_dir)?;
        let decisions = meta.load_decisions();
        let stats = meta.load_stats();
        let state = meta.load_state();
        let analyzer = FieldAnalyzer::from_parts(stats, state.total_records_processed);
        let classifier = Classifier::new(config.placement.clone(), config.pk.clone());

        let mut wal = RecordWal::open(meta.wal_path())?;
        let pending = wal.replay()?;

        let mut inner = Inner {
            config,
            buffer: Vec::new(),
            wal,
            meta,
            analyzer,
            classifier,
            decisions,
            state,
            relational,
            document,
            last_flush: Instant::now(),
            closed: false,
        };

        if !pending.is_empty() {
            info!(records = pending.len(), "replaying write-ahead log");
            // WAL lines are already normalized; only the semantic tags need
            // restoring from their JSON renderings
            inner.buffer = pending.into_iter().map(restore_record_tags).collect();
            match inner.flush_locked() {
                Ok(report) => {
                    info!(records = report.records_processed, "recovery flush complete");
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "recovery flush failed; batch retained for retry");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(IngestPipeline {
            inner: Mutex::new(inner),
        })
    }

    /// Ingest one record.
    ///
    /// The record is normalized, appended to the WAL (fsynced before this
    /// returns), and buffered. Crossing the buffer size or timeout
    /// threshold triggers a flush; a transient flush failure is logged and
    /// retried on the next trigger; `ingest` itself only fails on invalid
    /// input or WAL write errors.
    pub fn ingest(&self, record: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.ingest_one(record)?;
        inner.maybe_flush();
        Ok(())
    }

    /// Ingest a batch of records; the WAL is fsynced once per batch.
    pub fn ingest_batch(&self, records: Vec<serde_json::Value>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let mut normalized = Vec::with_capacity(records.len());
        for record in records {
            normalized.push(Inner::validate_and_normalize(record)?);
        }
        inner.wal.append_all(&normalized)?;
        inner.buffer.extend(normalized);
        inner.maybe_flush();
        Ok(())
    }

    /// Flush buffered records through analysis, classification, schema
    /// reconciliation, routing, and persistence.
    pub fn flush(&self) -> Result<FlushReport> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.flush_locked()
    }

    /// Current decision table.
    pub fn get_decisions(&self) -> BTreeMap<String, PlacementDecision> {
        self.inner.lock().decisions.clone()
    }

    /// Current per-field statistics.
    pub fn get_field_stats(&self) -> BTreeMap<String, FieldStats> {
        self.inner.lock().analyzer.stats().clone()
    }

    /// Buffer size and lifetime counters.
    pub fn get_status(&self) -> PipelineStatus {
        let inner = self.inner.lock();
        PipelineStatus {
            buffer_size: inner.buffer.len(),
            total_records_processed: inner.state.total_records_processed,
            last_flush_time: inner.state.last_flush_time,
        }
    }

    /// Drain the buffer with a final flush and release the backends.
    /// Subsequent calls on the pipeline fail with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        let result = if inner.buffer.is_empty() {
            Ok(())
        } else {
            inner.flush_locked().map(|_| ())
        };
        inner.closed = true;
        result
    }
}

impl Inner {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn validate_and_normalize(record: serde_json::Value) -> Result<Record> {
        let record = record_from_json(record)
            .ok_or_else(|| Error::InvalidRecord("top-level value is not an object".into()))?;
        Ok(normalize(record))
    }

    fn ingest_one(&mut self, record: serde_json::Value) -> Result<()> {
        let record = Self::validate_and_normalize(record)?;
        self.wal.append(&record)?;
        self.buffer.push(record);
        Ok(())
    }

    fn maybe_flush(&mut self) {
        let over_size = self.buffer.len() >= self.config.buffer.size;
        let over_time = !self.buffer.is_empty()
            && self.last_flush.elapsed() >= self.config.buffer.timeout();
        if !(over_size || over_time) {
            return;
        }
        if let Err(e) = self.flush_locked() {
            // The batch stays buffered and WAL-backed; the next trigger
            // retries it
            error!(error = %e, "triggered flush failed; batch retained");
        }
    }

    fn flush_locked(&mut self) -> Result<FlushReport> {
        if self.buffer.is_empty() {
            return Ok(self.report(0));
        }

        let snapshot = std::mem::take(&mut self.buffer);
        let analyzer_checkpoint = self.analyzer.clone();
        let decisions_checkpoint = self.decisions.clone();
        let state_checkpoint = self.state.clone();

        match self.run_flush(&snapshot) {
            Ok(report) => {
                self.last_flush = Instant::now();
                Ok(report)
            }
            Err(e) => {
                // Roll back in-memory inference state and re-enqueue the
                // snapshot at the head of the buffer, preserving order
                self.analyzer = analyzer_checkpoint;
                self.decisions = decisions_checkpoint;
                self.state = state_checkpoint;
                let mut restored = snapshot;
                restored.append(&mut self.buffer);
                self.buffer = restored;
                Err(e)
            }
        }
    }

    fn run_flush(&mut self, snapshot: &[Record]) -> Result<FlushReport> {
        let table = self.config.table_name.clone();

        // 2. statistics
        self.analyzer.observe_batch(snapshot);

        // 3. decisions
        let previous = std::mem::take(&mut self.decisions);
        self.decisions = self
            .classifier
            .classify(self.analyzer.stats(), self.analyzer.total_records_seen());

        // 4. schema reconciliation (may migrate data between backends)
        let effective_pk = ensure_table(
            self.relational.as_mut(),
            self.document.as_mut(),
            &table,
            &mut self.decisions,
            &previous,
        )?;

        // 5. route and upsert
        let routed = split_batch(snapshot, &self.decisions, effective_pk.as_deref());
        if !routed.sql_rows.is_empty() {
            self.relational.batch_upsert(
                &table,
                &routed.sql_columns,
                &routed.sql_rows,
                effective_pk.as_deref(),
            )?;
        }
        let doc_key = document_key(&self.decisions);
        if let Some(key) = &doc_key {
            self.document.ensure_unique_index(&table, key)?;
        }
        if !routed.docs.is_empty() {
            self.document
                .batch_upsert(&table, &routed.docs, doc_key.as_deref())?;
        }

        // 6. persist metadata
        self.state.total_records_processed += snapshot.len() as u64;
        self.state.last_flush_time = Some(Utc::now());
        self.state.version += 1;
        self.meta.save_decisions(&self.decisions)?;
        self.meta.save_stats(self.analyzer.stats())?;
        self.meta.save_state(&self.state)?;

        // 7. release the WAL
        self.wal.truncate()?;

        let report = self.report(snapshot.len());
        info!(
            records = report.records_processed,
            decisions_sql = report.decisions_sql,
            decisions_doc = report.decisions_doc,
            pk = ?effective_pk,
            "flush complete"
        );
        Ok(report)
    }

    fn report(&self, records_processed: usize) -> FlushReport {
        FlushReport {
            records_processed,
            decisions_sql: self
                .decisions
                .values()
                .filter(|d| d.backend.includes_sql())
                .count(),
            decisions_doc: self
                .decisions
                .values()
                .filter(|d| d.backend.includes_doc())
                .count(),
        }
    }
}
