//! Dive logbook.
//!
//! Planned dives are appended to a JSONL (JSON Lines) file with file locking
//! so that a later plan can start from the tissue state of the last dive.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{DiveResult, InitialState};
use crate::types::{DecoModel, DiveSummary};
use crate::Result;

/// One planned dive as stored in the logbook
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiveRecord {
    pub id: Uuid,
    pub logged_at: DateTime<Utc>,
    /// Plan file or other label the dive was planned from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub model: DecoModel,
    /// Minutes at the surface before this dive, if it was repetitive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_interval: Option<u32>,
    pub summary: DiveSummary,
    /// State on surfacing, the starting point for a following dive
    pub final_state: InitialState,
}

impl DiveRecord {
    pub fn from_result(result: &DiveResult, label: Option<String>, surface_interval: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            logged_at: Utc::now(),
            label,
            model: result.model,
            surface_interval,
            summary: result.summary.clone(),
            final_state: result.final_state(),
        }
    }
}

/// Dive sink trait for persisting planned dives
pub trait DiveSink {
    fn append(&mut self, record: &DiveRecord) -> Result<()>;
}

/// JSONL-based dive sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl DiveSink for JsonlSink {
    fn append(&mut self, record: &DiveRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        tracing::debug!("Appended dive {} to logbook", record.id);
        Ok(())
    }
}

/// Read all dives from a logbook file, oldest first
pub fn read_records(path: &Path) -> Result<Vec<DiveRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();
    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DiveRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                // skip the damaged line, keep the rest of the log
                tracing::warn!("Failed to parse dive at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} dives from logbook", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oxygen::OxygenExposure;
    use crate::tissue::{Environment, Tissues};

    fn create_test_record() -> DiveRecord {
        let env = Environment::new(10.0, 0.627);
        DiveRecord {
            id: Uuid::new_v4(),
            logged_at: Utc::now(),
            label: Some("wreck.toml".into()),
            model: DecoModel::Buhlmann,
            surface_interval: None,
            summary: DiveSummary {
                total_runtime: 42.0,
                total_deco_time: 12.0,
                ..DiveSummary::default()
            },
            final_state: InitialState {
                tissues: Tissues::saturated(&env),
                oxygen: OxygenExposure { cns: 0.12, otu: 30.0 },
                bubbles: None,
            },
        }
    }

    #[test]
    fn test_append_and_read_single_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("logbook.jsonl");

        let record = create_test_record();
        let mut sink = JsonlSink::new(&path);
        sink.append(&record).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], record);
    }

    #[test]
    fn test_append_creates_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("logbook.jsonl");

        let mut sink = JsonlSink::new(&path);
        for _ in 0..3 {
            sink.append(&create_test_record()).unwrap();
        }
        assert_eq!(read_records(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("logbook.jsonl");

        let mut sink = JsonlSink::new(&path);
        sink.append(&create_test_record()).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{\"id\": \"truncated").unwrap();
            writeln!(file).unwrap();
        }
        sink.append(&create_test_record()).unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_logbook() {
        let temp_dir = tempfile::tempdir().unwrap();
        let records = read_records(&temp_dir.path().join("none.jsonl")).unwrap();
        assert!(records.is_empty());
    }
}
