#![forbid(unsafe_code)]

//! Decompression planning for open-circuit dives.
//!
//! This crate provides:
//! - Domain types (gases, segments, table rows, summaries)
//! - Tissue loading (Haldane and Schreiner) over 16 compartments
//! - Bühlmann ZH-L16 with gradient factors
//! - VPM-B with the critical-volume algorithm
//! - Surface intervals and repetitive dives
//! - Plan files, logbook persistence (JSONL) and CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod report;
pub mod solver;
pub mod tissue;
pub mod oxygen;
pub mod schedule;
pub mod buhlmann;
pub mod vpm;
pub mod context;
pub mod buhlmann_planner;
pub mod vpm_planner;
pub mod engine;
pub mod surface;
pub mod plan;
pub mod logbook;
pub mod history;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, Settings};
pub use report::{CollectingSink, ReportSink, TracingSink, Warning, WarningKind};
pub use engine::{plan_dive, plan_dive_with_sink, DiveInput, DiveResult, InitialState};
pub use plan::DivePlan;
pub use logbook::{DiveRecord, DiveSink, JsonlSink};
pub use history::{latest_dive, load_recent_dives, repetitive_start};
pub use export::write_table_csv;
