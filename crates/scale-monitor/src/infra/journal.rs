//! Weight journal.
//!
//! Settled readings are appended to a JSONL file, one entry per recording,
//! so they survive restarts and can be imported into any spreadsheet.

use scale_core::{RecordError, Recorder};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// A single journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub weight_kg: f64,
}

/// Thread-safe journal writer; the recording thread appends, tests and
/// `--test` runs read back.
pub struct JournalRecorder {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JournalRecorder {
    /// Opens `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::with_capacity(4096, file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &WeightEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl Recorder for JournalRecorder {
    fn record(&self, weight_kg: f64) -> Result<(), RecordError> {
        if !weight_kg.is_finite() || weight_kg < 0.0 {
            return Err(RecordError::Rejected(format!(
                "{weight_kg} is not a valid weight"
            )));
        }
        let entry = WeightEntry {
            unix_us: unix_us(),
            weight_kg,
        };
        self.append(&entry)?;
        info!(weight_kg, path = %self.path.display(), "Weight recorded");
        Ok(())
    }
}

fn unix_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
