//! Core domain types for decoplan.
//!
//! This module defines the values that flow in and out of the planner:
//! - Breathing gases and their roles
//! - Dive segments (user supplied or generated by the scheduler)
//! - Decompression table rows and the dive summary

use serde::{Deserialize, Serialize};

use crate::tissue::Tissues;

// ============================================================================
// Gas Types
// ============================================================================

/// What a gas is carried for
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GasRole {
    Bottom,
    Decompression,
}

/// A breathing gas. Fractions are in [0, 1]; nitrogen makes up the rest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Gas {
    pub o2: f64,
    pub he: f64,
    pub role: GasRole,
    /// Depth (m) from which a decompression gas may be breathed
    pub switch_depth: f64,
    /// Overrides the configured minimum stop time while this gas is breathed
    pub min_stop_time: Option<f64>,
}

impl Gas {
    pub fn bottom(o2: f64, he: f64) -> Self {
        Self {
            o2,
            he,
            role: GasRole::Bottom,
            switch_depth: 0.0,
            min_stop_time: None,
        }
    }

    pub fn decompression(o2: f64, he: f64, switch_depth: f64) -> Self {
        Self {
            o2,
            he,
            role: GasRole::Decompression,
            switch_depth,
            min_stop_time: None,
        }
    }

    pub fn n2(&self) -> f64 {
        (1.0 - self.o2 - self.he).max(0.0)
    }

    pub fn is_bottom(&self) -> bool {
        self.role == GasRole::Bottom
    }

    /// Short display name ("Air", "EAN50", "O2", "21/35")
    pub fn label(&self) -> String {
        let o2 = (self.o2 * 100.0).round() as i64;
        let he = (self.he * 100.0).round() as i64;
        if he > 0 {
            format!("{}/{}", o2, he)
        } else if o2 == 21 {
            "Air".to_string()
        } else if o2 == 100 {
            "O2".to_string()
        } else {
            format!("EAN{}", o2)
        }
    }
}

// ============================================================================
// Segment Types
// ============================================================================

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Descent,
    ConstantDepth,
    Ascent,
}

/// One leg of the profile.
///
/// Input segments leave `tissues` empty; every processed segment carries the
/// compartment pressures at its end.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiveSegment {
    pub kind: SegmentKind,
    pub start_depth: f64,
    pub end_depth: f64,
    pub start_runtime: f64,
    pub end_runtime: f64,
    pub duration: f64,
    /// Index into the dive's gas list
    pub gas: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tissues: Option<Tissues>,
}

impl DiveSegment {
    pub fn level(depth: f64, duration: f64, gas: usize) -> Self {
        Self {
            kind: SegmentKind::ConstantDepth,
            start_depth: depth,
            end_depth: depth,
            start_runtime: 0.0,
            end_runtime: duration,
            duration,
            gas,
            tissues: None,
        }
    }

    pub fn transit(start_depth: f64, end_depth: f64, gas: usize) -> Self {
        let kind = if end_depth > start_depth {
            SegmentKind::Descent
        } else {
            SegmentKind::Ascent
        };
        Self {
            kind,
            start_depth,
            end_depth,
            start_runtime: 0.0,
            end_runtime: 0.0,
            duration: 0.0,
            gas,
            tissues: None,
        }
    }

    pub(crate) fn shift(&mut self, minutes: f64) {
        self.start_runtime += minutes;
        self.end_runtime += minutes;
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// Which decompression model produced a result
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecoModel {
    Buhlmann,
    Vpm,
}

impl DecoModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoModel::Buhlmann => "buhlmann",
            DecoModel::Vpm => "vpm",
        }
    }
}

impl std::str::FromStr for DecoModel {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buhlmann" | "zhl" | "zhl16" => Ok(DecoModel::Buhlmann),
            "vpm" | "vpm-b" | "vpmb" => Ok(DecoModel::Vpm),
            other => Err(crate::Error::Other(format!("unknown model: {}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// A planned level from the input profile
    Level,
    /// A decompression stop inserted by the scheduler
    Stop,
    /// Arrival at the surface
    Surface,
}

/// One line of the decompression table
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DecoTableRow {
    pub kind: RowKind,
    pub depth: f64,
    pub duration: f64,
    pub start_runtime: f64,
    pub end_runtime: f64,
    pub gas: String,
    pub o2_percent: f64,
    pub he_percent: f64,
    pub po2: f64,
    /// Equivalent narcotic depth (m)
    pub end: f64,
    /// Litres at surface pressure, including the transit into this row
    pub gas_volume: f64,
    pub cns_percent: f64,
    pub otu: f64,
    /// Gradient factor in percent (dissolved-gas model only)
    pub gf: Option<f64>,
    /// Leading compartment load as percent of its M-value
    pub m_value_percent: Option<f64>,
}

/// Total gas consumed per gas
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GasVolume {
    pub gas: String,
    pub litres: f64,
}

/// Totals for one planned dive
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct DiveSummary {
    pub total_runtime: f64,
    pub total_deco_time: f64,
    pub total_ascent_time: f64,
    pub cns_percent: f64,
    pub otu: f64,
    /// Depth at which the leading compartment started to off-gas
    pub offgassing_starts_at: Option<f64>,
    pub gas_volumes: Vec<GasVolume>,
    /// Highest gradient factor reached, percent (dissolved-gas model only)
    pub highest_gf: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_labels() {
        assert_eq!(Gas::bottom(0.21, 0.0).label(), "Air");
        assert_eq!(Gas::bottom(0.21, 0.35).label(), "21/35");
        assert_eq!(Gas::decompression(0.5, 0.0, 21.0).label(), "EAN50");
        assert_eq!(Gas::decompression(1.0, 0.0, 6.0).label(), "O2");
    }

    #[test]
    fn test_nitrogen_fraction() {
        let gas = Gas::bottom(0.21, 0.35);
        assert!((gas.n2() - 0.44).abs() < 1e-12);
        assert_eq!(Gas::decompression(1.0, 0.0, 6.0).n2(), 0.0);
    }

    #[test]
    fn test_transit_kind_follows_direction() {
        assert_eq!(DiveSegment::transit(0.0, 30.0, 0).kind, SegmentKind::Descent);
        assert_eq!(DiveSegment::transit(30.0, 10.0, 0).kind, SegmentKind::Ascent);
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("VPM".parse::<DecoModel>().unwrap(), DecoModel::Vpm);
        assert_eq!("buhlmann".parse::<DecoModel>().unwrap(), DecoModel::Buhlmann);
        assert!("rgbm".parse::<DecoModel>().is_err());
    }

    #[test]
    fn test_segment_serialization_skips_missing_tissues() {
        let seg = DiveSegment::level(30.0, 20.0, 0);
        let json = serde_json::to_string(&seg).unwrap();
        assert!(!json.contains("tissues"));
        assert!(json.contains("\"constant_depth\""));
    }
}
