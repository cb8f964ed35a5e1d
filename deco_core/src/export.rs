//! CSV export of decompression tables and logbook summaries.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::logbook::{read_records, DiveRecord};
use crate::types::{DecoTableRow, RowKind};
use crate::Result;

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// A deco table line as written to CSV
#[derive(Debug, serde::Serialize)]
struct TableCsvRow {
    kind: &'static str,
    depth: f64,
    duration: f64,
    runtime: f64,
    gas: String,
    po2: f64,
    end: f64,
    gas_volume: f64,
    cns_percent: f64,
    otu: f64,
    gf: Option<f64>,
    m_value_percent: Option<f64>,
}

impl From<&DecoTableRow> for TableCsvRow {
    fn from(row: &DecoTableRow) -> Self {
        TableCsvRow {
            kind: match row.kind {
                RowKind::Level => "level",
                RowKind::Stop => "stop",
                RowKind::Surface => "surface",
            },
            depth: row.depth,
            duration: round1(row.duration),
            runtime: round1(row.end_runtime),
            gas: row.gas.clone(),
            po2: (row.po2 * 100.0).round() / 100.0,
            end: round1(row.end),
            gas_volume: row.gas_volume.round(),
            cns_percent: round1(row.cns_percent),
            otu: row.otu.round(),
            gf: row.gf.map(f64::round),
            m_value_percent: row.m_value_percent.map(f64::round),
        }
    }
}

/// Write a deco table to `csv_path`, replacing any previous file
pub fn write_table_csv(rows: &[DecoTableRow], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(csv_path)?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(TableCsvRow::from(row))?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} table rows to {:?}", rows.len(), csv_path);
    Ok(rows.len())
}

/// A logged dive as written to CSV
#[derive(Debug, serde::Serialize)]
struct DiveCsvRow {
    id: String,
    logged_at: String,
    label: Option<String>,
    model: &'static str,
    surface_interval: Option<u32>,
    runtime: f64,
    deco_time: f64,
    cns_percent: f64,
    otu: f64,
}

impl From<&DiveRecord> for DiveCsvRow {
    fn from(record: &DiveRecord) -> Self {
        DiveCsvRow {
            id: record.id.to_string(),
            logged_at: record.logged_at.to_rfc3339(),
            label: record.label.clone(),
            model: record.model.as_str(),
            surface_interval: record.surface_interval,
            runtime: round1(record.summary.total_runtime),
            deco_time: round1(record.summary.total_deco_time),
            cns_percent: round1(record.summary.cns_percent),
            otu: record.summary.otu.round(),
        }
    }
}

/// Append every logbook dive to `csv_path`, writing headers for a new file
pub fn logbook_to_csv(logbook_path: &Path, csv_path: &Path) -> Result<usize> {
    let records = read_records(logbook_path)?;
    if records.is_empty() {
        tracing::info!("No dives in logbook to export");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let needs_headers = file.metadata()?.len() == 0;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for record in &records {
        writer.serialize(DiveCsvRow::from(record))?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Exported {} dives to {:?}", records.len(), csv_path);
    Ok(records.len())
}
