//! Durable per-item history.
//!
//! The only write a store exposes is [`SeriesStore::append`]; past samples are
//! never edited or removed. [`JsonFileStore`] rewrites the whole history file
//! through a temp file in the same directory and renames it into place, so a
//! reader sees either the old file or the new one and a crash mid-write never
//! leaves a truncated file behind.
//!
//! # Storage Format
//!
//! One JSON array per item, oldest record first:
//!
//! ```json
//! [
//!   { "timestamp": "2024-01-01 10:00:00 IST", "value": "500" },
//!   { "timestamp": "2024-01-01 11:10:00 IST", "value": "620" }
//! ]
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::StoreError;
use crate::sample::{Sample, SampleRecord, TimeSeries};

/// Load/append access to item histories, addressed by persistence handle.
pub trait SeriesStore: Send + Sync {
    /// Load the full series. Missing history is an empty series, not an error.
    fn load(&self, handle: &Path) -> Result<TimeSeries, StoreError>;

    /// Durably add one sample. On error nothing has been written.
    fn append(&self, handle: &Path, sample: Sample) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// History files on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    tz: Tz,
}

impl JsonFileStore {
    /// Relative handles resolve against `root`; timestamps are read in `tz`.
    pub fn new(root: impl Into<PathBuf>, tz: Tz) -> Self {
        Self {
            root: root.into(),
            tz,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path behind a handle.
    pub fn resolve(&self, handle: &Path) -> PathBuf {
        self.root.join(handle)
    }
}

impl SeriesStore for JsonFileStore {
    fn load(&self, handle: &Path) -> Result<TimeSeries, StoreError> {
        let path = self.resolve(handle);
        match read_records(&path)? {
            Some(records) => records_to_series(&path, &records, self.tz),
            None => Ok(TimeSeries::new()),
        }
    }

    fn append(&self, handle: &Path, sample: Sample) -> Result<(), StoreError> {
        let path = self.resolve(handle);
        // A failed read propagates here: never rewrite history we could not read.
        let mut series = self.load(handle)?;
        series.push(sample);
        write_json_atomic(&path, &series.to_records()).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        log::debug!("wrote {} records to {}", series.len(), path.display());
        Ok(())
    }
}

/// Read-path load: on failure log a warning and fall back to an empty series.
///
/// The error is handed back so the caller can show it next to the (empty)
/// statistics. The write path must use [`SeriesStore::load`] directly.
pub fn load_or_empty(store: &dyn SeriesStore, handle: &Path) -> (TimeSeries, Option<StoreError>) {
    match store.load(handle) {
        Ok(series) => (series, None),
        Err(e) => {
            log::warn!("showing {} as empty: {e}", handle.display());
            (TimeSeries::new(), Some(e))
        }
    }
}

/// Read the raw records of a history file. `Ok(None)` when the file does not exist.
pub fn read_records(path: &Path) -> Result<Option<Vec<SampleRecord>>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if text.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse records into an ascending series, failing on the first bad record.
pub fn records_to_series(
    path: &Path,
    records: &[SampleRecord],
    tz: Tz,
) -> Result<TimeSeries, StoreError> {
    let samples = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            Sample::from_record(record, tz).map_err(|source| StoreError::Record {
                path: path.to_path_buf(),
                index,
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TimeSeries::from_samples(samples))
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut body = serde_json::to_vec_pretty(value).map_err(std::io::Error::other)?;
    body.push(b'\n');

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Legacy CSV histories
// ---------------------------------------------------------------------------

/// Read a `timestamp,play_count` CSV history written by earlier versions.
///
/// The value column may be named `play_count` or `value`. Rows missing either
/// field are skipped. A missing or empty file yields no records.
pub fn read_csv_records(path: &Path) -> Result<Vec<SampleRecord>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let csv_error = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);
    let headers = reader.headers().map_err(csv_error)?;
    if headers.iter().all(str::is_empty) {
        return Ok(Vec::new());
    }
    let has = |name: &str| headers.iter().any(|h| h == name);
    if !(has("timestamp") && (has("play_count") || has("value"))) {
        return Err(StoreError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "CSV header '{}' lacks timestamp/play_count columns",
                    headers.iter().collect::<Vec<_>>().join(",")
                ),
            ),
        });
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row.map_err(csv_error)?;
        if row.timestamp.is_empty() || row.play_count.is_empty() {
            continue;
        }
        records.push(SampleRecord {
            timestamp: row.timestamp,
            value: row.play_count,
        });
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    timestamp: String,
    #[serde(default, alias = "value")]
    play_count: String,
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: Mutex<HashMap<PathBuf, TimeSeries>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a handle with an existing series.
    pub fn insert(&self, handle: impl Into<PathBuf>, series: TimeSeries) {
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.into(), series);
    }

    /// Make every subsequent append fail with [`StoreError::Write`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl SeriesStore for MemoryStore {
    fn load(&self, handle: &Path) -> Result<TimeSeries, StoreError> {
        Ok(self
            .series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
            .unwrap_or_default())
    }

    fn append(&self, handle: &Path, sample: Sample) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: handle.to_path_buf(),
                source: std::io::Error::other("writes disabled"),
            });
        }
        self.series
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(handle.to_path_buf())
            .or_default()
            .push(sample);
        Ok(())
    }
}
