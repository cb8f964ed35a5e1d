//! Recent dive history from the logbook.
//!
//! Repetitive dives start from the tissue, oxygen and bubble state of the
//! last logged dive after it has been carried through a surface interval.

use std::collections::HashSet;
use std::path::Path;

use chrono::{Duration, Utc};

use crate::config::Settings;
use crate::engine::InitialState;
use crate::logbook::{read_records, DiveRecord};
use crate::surface::after_surface_interval;
use crate::types::DecoModel;
use crate::{Error, Result};

/// Load dives logged in the last `hours`, newest first.
///
/// A dive appearing more than once in the log is returned once.
pub fn load_recent_dives(logbook_path: &Path, hours: i64) -> Result<Vec<DiveRecord>> {
    let cutoff = Utc::now() - Duration::hours(hours);
    let mut seen_ids = HashSet::new();
    let mut dives: Vec<DiveRecord> = read_records(logbook_path)?
        .into_iter()
        .filter(|d| d.logged_at >= cutoff)
        .filter(|d| seen_ids.insert(d.id))
        .collect();

    dives.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
    tracing::info!("Loaded {} dives from the last {} hours", dives.len(), hours);
    Ok(dives)
}

/// The most recently logged dive, if any
pub fn latest_dive(logbook_path: &Path) -> Result<Option<DiveRecord>> {
    let records = read_records(logbook_path)?;
    Ok(records.into_iter().max_by_key(|d| d.logged_at))
}

/// Starting state for a dive made `surface_interval` minutes after `previous`
pub fn repetitive_start(
    previous: &DiveRecord,
    model: DecoModel,
    settings: &Settings,
    surface_interval: u32,
) -> Result<InitialState> {
    if previous.model != model {
        return Err(Error::Other(format!(
            "previous dive was planned with {}, cannot continue it with {}",
            previous.model.as_str(),
            model.as_str()
        )));
    }
    tracing::debug!(
        "Continuing from dive {} after {} min at the surface",
        previous.id,
        surface_interval
    );
    Ok(after_surface_interval(
        &previous.final_state,
        model,
        settings,
        surface_interval,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logbook::{DiveSink, JsonlSink};
    use crate::oxygen::OxygenExposure;
    use crate::tissue::{Environment, Tissues};
    use crate::types::DiveSummary;
    use uuid::Uuid;

    fn create_test_dive(label: &str, hours_ago: i64) -> DiveRecord {
        let env = Environment::new(10.0, 0.627);
        DiveRecord {
            id: Uuid::new_v4(),
            logged_at: Utc::now() - Duration::hours(hours_ago),
            label: Some(label.into()),
            model: DecoModel::Buhlmann,
            surface_interval: None,
            summary: DiveSummary::default(),
            final_state: InitialState {
                tissues: Tissues::saturated(&env),
                oxygen: OxygenExposure { cns: 0.3, otu: 50.0 },
                bubbles: None,
            },
        }
    }

    #[test]
    fn test_load_recent_dives_window() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("logbook.jsonl");

        let mut sink = JsonlSink::new(&path);
        sink.append(&create_test_dive("morning", 5)).unwrap();
        sink.append(&create_test_dive("yesterday", 20)).unwrap();
        sink.append(&create_test_dive("last week", 24 * 7)).unwrap();

        let dives = load_recent_dives(&path, 48).unwrap();
        assert_eq!(dives.len(), 2);
        assert_eq!(dives[0].label.as_deref(), Some("morning"));
        assert_eq!(dives[1].label.as_deref(), Some("yesterday"));
    }

    #[test]
    fn test_duplicate_entries_are_returned_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("logbook.jsonl");

        let dive = create_test_dive("twice", 1);
        let mut sink = JsonlSink::new(&path);
        sink.append(&dive).unwrap();
        sink.append(&dive).unwrap();

        let dives = load_recent_dives(&path, 24).unwrap();
        assert_eq!(dives.len(), 1);
        assert_eq!(dives[0].id, dive.id);
    }

    #[test]
    fn test_latest_dive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("logbook.jsonl");
        assert!(latest_dive(&path).unwrap().is_none());

        let mut sink = JsonlSink::new(&path);
        sink.append(&create_test_dive("new", 1)).unwrap();
        sink.append(&create_test_dive("old", 10)).unwrap();

        let latest = latest_dive(&path).unwrap().unwrap();
        assert_eq!(latest.label.as_deref(), Some("new"));
    }

    #[test]
    fn test_repetitive_start_decays_cns() {
        let dive = create_test_dive("first", 1);
        let start = repetitive_start(&dive, DecoModel::Buhlmann, &Settings::default(), 90).unwrap();
        assert!((start.oxygen.cns - 0.15).abs() < 1e-12);

        let mismatch = repetitive_start(&dive, DecoModel::Vpm, &Settings::default(), 90);
        assert!(mismatch.is_err());
    }
}
