//! Write-ahead log for normalized records
//!
//! An append-only file of normalized records, one JSON object per line,
//! ordered by append time. Appends are fsynced before the ingest call is
//! acknowledged; the log is truncated to length zero (never deleted and
//! recreated) once the matching batch has been persisted to both backends,
//! so readers holding the path always see a consistent file.
//!
//! ## Recovery
//!
//! `replay()` scans from the beginning with a separate read handle. A
//! corrupt line (torn tail write or bit rot) is skipped with a log entry;
//! recovery never aborts on it.

use morph_core::{record_from_json, Record, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only on-disk queue of normalized records awaiting flush.
pub struct RecordWal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RecordWal {
    /// Open an existing WAL or create a new one, creating parent
    /// directories as needed. The file is opened in append mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(RecordWal {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Append one record as a JSON line and fsync before returning.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        self.write_line(record)?;
        self.fsync()
    }

    /// Append a batch of records, fsyncing once after the last line.
    pub fn append_all(&mut self, records: &[Record]) -> Result<()> {
        for record in records {
            self.write_line(record)?;
        }
        self.fsync()
    }

    fn write_line(&mut self, record: &Record) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered writes and force them to disk.
    pub fn fsync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_mut().sync_all()?;
        Ok(())
    }

    /// Read every surviving record from the start of the log.
    ///
    /// Uses a separate read handle so the buffered writer is undisturbed.
    /// Corrupt or non-object lines are skipped with a warning.
    pub fn replay(&mut self) -> Result<Vec<Record>> {
        self.writer.flush()?;

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&line) {
                Ok(value) => match record_from_json(value) {
                    Some(record) => records.push(record),
                    None => {
                        warn!(line = index + 1, "skipping non-object WAL line");
                    }
                },
                Err(e) => {
                    warn!(line = index + 1, error = %e, "skipping corrupt WAL line");
                }
            }
        }
        Ok(records)
    }

    /// Truncate the log to length zero after a successful flush.
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.sync_all()?;
        Ok(())
    }

    /// Current log size in bytes.
    pub fn size(&mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.writer.get_ref().metadata()?.len())
    }

    /// Whether the log currently holds no data.
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RecordWal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWal").field("path", &self.path).finish()
    }
}
