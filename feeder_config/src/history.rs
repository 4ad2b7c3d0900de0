//! Bounded CSV log of feed cycles.
//!
//! Header: `timestamp,cycle,target_weight,actual_weight,duration_secs,alarm,alarm_reason`.
//! A manual cycle leaves `cycle` empty.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const HEADERS: [&str; 7] = [
    "timestamp",
    "cycle",
    "target_weight",
    "actual_weight",
    "duration_secs",
    "alarm",
    "alarm_reason",
];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoryRow {
    /// Unix seconds at the end of the cycle.
    pub timestamp: i64,
    pub cycle: Option<u8>,
    pub target_weight: f32,
    pub actual_weight: f32,
    pub duration_secs: u32,
    pub alarm: bool,
    pub alarm_reason: String,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(cfg: &crate::History) -> Self {
        Self::new(&cfg.path, cfg.max_entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, dropping the oldest rows beyond `max_entries`.
    pub fn append(&self, row: &HistoryRow) -> eyre::Result<()> {
        let mut rows = self.load_all()?;
        rows.push(row.clone());
        if rows.len() > self.max_entries {
            let excess = rows.len() - self.max_entries;
            rows.drain(..excess);
        }
        self.write_all(&rows)
    }

    /// Newest `limit` rows, oldest first.
    pub fn load_recent(&self, limit: usize) -> eyre::Result<Vec<HistoryRow>> {
        let mut rows = self.load_all()?;
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        Ok(rows)
    }

    pub fn load_all(&self) -> eyre::Result<Vec<HistoryRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| eyre::eyre!("open history CSV {:?}: {}", self.path, e))?;

        // Enforce exact headers
        let headers = rdr
            .headers()
            .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", self.path, e))?
            .clone();
        let actual: Vec<&str> = headers.iter().collect();
        if actual != HEADERS {
            eyre::bail!(
                "history CSV must have headers '{}', got: {}",
                HEADERS.join(","),
                actual.join(",")
            );
        }

        let mut rows = Vec::new();
        for (idx, rec) in rdr.deserialize::<HistoryRow>().enumerate() {
            match rec {
                Ok(row) => rows.push(row),
                Err(e) => {
                    eyre::bail!("invalid history row {}: {}", idx + 2, e);
                }
            }
        }
        Ok(rows)
    }

    fn write_all(&self, rows: &[HistoryRow]) -> eyre::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| eyre::eyre!("create history dir {:?}: {}", dir, e))?;
        }
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)
                .map_err(|e| eyre::eyre!("open history CSV {:?}: {}", tmp, e))?;
            // Written explicitly so an empty log still carries the header.
            wtr.write_record(HEADERS)?;
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .map_err(|e| eyre::eyre!("replace history CSV {:?}: {}", self.path, e))?;
        Ok(())
    }
}
