//! Oxygen toxicity tracking.
//!
//! CNS loading uses the NOAA single-exposure limits as a piecewise-linear
//! table of time limit against PO2; pulmonary loading is counted in OTU.

use serde::{Deserialize, Serialize};

use crate::tissue::DEPTH_PER_ATM;

const PO2_LO: [f64; 10] = [0.5, 0.6, 0.7, 0.8, 0.9, 1.1, 1.5, 1.6061, 1.62, 1.74];
const PO2_HI: [f64; 10] = [0.6, 0.7, 0.8, 0.9, 1.1, 1.5, 1.6061, 1.62, 1.74, 1.82];
const LIMIT_SLOPE: [f64; 10] = [
    -1800.0, -1500.0, -1200.0, -900.0, -600.0, -300.0, -750.0, -1250.0, -125.0, -50.0,
];
const LIMIT_INTERCEPT: [f64; 10] = [
    1800.0, 1620.0, 1410.0, 1170.0, 900.0, 570.0, 1245.0, 2045.0, 222.5, 92.0,
];

/// Below this PO2 there is no toxicity
const THRESHOLD: f64 = 0.5;
/// Above the table: a full limit per minute at constant depth
const MAX_TABLE_PO2: f64 = 1.82;
/// Above the table while in transit: a fifth of a limit per minute
const TRANSIT_PENALTY: f64 = 0.2;
const CNS_HALF_TIME: f64 = 90.0;

/// Oxygen partial pressure in atmospheres
pub fn po2(depth: f64, surface_pressure: f64, o2: f64) -> f64 {
    (depth + surface_pressure) / DEPTH_PER_ATM * o2
}

/// Equivalent narcotic depth, oxygen not counted as narcotic
pub fn equivalent_narcotic_depth(depth: f64, surface_pressure: f64, n2: f64) -> f64 {
    n2 * (depth + surface_pressure) / 0.79 - surface_pressure
}

/// Running oxygen exposure. `cns` is a fraction of the limit (1.0 = 100 %).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OxygenExposure {
    pub cns: f64,
    pub otu: f64,
}

impl OxygenExposure {
    pub fn cns_percent(&self) -> f64 {
        self.cns * 100.0
    }

    /// Exposure at a fixed PO2 for `minutes`
    pub fn constant_depth(&mut self, po2: f64, minutes: f64) {
        if po2 <= THRESHOLD || minutes <= 0.0 {
            return;
        }
        if po2 > MAX_TABLE_PO2 {
            self.cns += minutes;
        } else if let Some(row) = (0..PO2_LO.len()).find(|&i| po2 > PO2_LO[i] && po2 <= PO2_HI[i]) {
            self.cns += minutes / (LIMIT_SLOPE[row] * po2 + LIMIT_INTERCEPT[row]);
        }
        self.otu += minutes * (THRESHOLD / (po2 - THRESHOLD)).powf(-5.0 / 6.0);
    }

    /// Exposure while PO2 changes linearly from `start_po2` to `end_po2`
    pub fn transit(&mut self, start_po2: f64, end_po2: f64, minutes: f64) {
        if minutes <= 0.0 {
            return;
        }
        if start_po2 == end_po2 {
            self.constant_depth(start_po2, minutes);
            return;
        }
        let ascending = start_po2 > end_po2;
        let max = start_po2.max(end_po2);
        let min = start_po2.min(end_po2);
        if max <= THRESHOLD {
            return;
        }
        let low = min.max(THRESHOLD);
        let span = max - low;
        if span <= 0.0 {
            return;
        }
        let o2_time = minutes * span / (max - min);

        if max > MAX_TABLE_PO2 {
            self.cns += TRANSIT_PENALTY * o2_time;
            self.otu += otu_between(low, max, o2_time);
            return;
        }

        for i in 0..PO2_LO.len() {
            let (lo, hi) = (PO2_LO[i], PO2_HI[i]);
            if !(max > lo && low <= hi) {
                continue;
            }
            let (from, to) = if max >= hi && low < lo {
                (hi, lo)
            } else if max < hi && low <= lo {
                (max, lo)
            } else if low > lo && max >= hi {
                (hi, low)
            } else {
                (max, low)
            };
            // pieces are listed deep-to-shallow; flip them for a descent
            let (from, to) = if ascending { (from, to) } else { (to, from) };
            let segment = to - from;
            let time = o2_time * segment.abs() / span;
            if time == 0.0 {
                continue;
            }
            let limit_at_start = LIMIT_SLOPE[i] * from + LIMIT_INTERCEPT[i];
            let slope = LIMIT_SLOPE[i] * (segment / time);
            self.cns += ((limit_at_start + slope * time).abs().ln() - limit_at_start.abs().ln()) / slope;
        }

        let (initial, last) = if ascending { (max, low) } else { (low, max) };
        self.otu += otu_between(initial, last, o2_time);
    }

    /// CNS clearance at the surface; OTU carries over unchanged
    pub fn after_surface_interval(&self, minutes: f64) -> Self {
        Self {
            cns: self.cns * 0.5_f64.powf(minutes.max(0.0) / CNS_HALF_TIME),
            otu: self.otu,
        }
    }
}

fn otu_between(initial: f64, last: f64, minutes: f64) -> f64 {
    3.0 / 11.0 * minutes / (last - initial)
        * (((last - THRESHOLD) / THRESHOLD).powf(11.0 / 6.0)
            - ((initial - THRESHOLD) / THRESHOLD).powf(11.0 / 6.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_po2_and_end() {
        assert!((po2(30.0, 10.0, 0.21) - 0.84).abs() < 1e-12);
        assert!((equivalent_narcotic_depth(30.0, 10.0, 0.79) - 30.0).abs() < 1e-12);
        assert!((equivalent_narcotic_depth(51.0, 10.0, 0.44) - 23.97).abs() < 0.01);
    }

    #[test]
    fn test_no_exposure_below_threshold() {
        let mut ox = OxygenExposure::default();
        ox.constant_depth(0.42, 60.0);
        ox.transit(0.21, 0.49, 5.0);
        assert_eq!(ox, OxygenExposure::default());
    }

    #[test]
    fn test_constant_depth_uses_noaa_limit() {
        // 1.4 bar: limit 570 - 300 * 1.4 = 150 minutes
        let mut ox = OxygenExposure::default();
        ox.constant_depth(1.4, 15.0);
        assert!((ox.cns - 0.1).abs() < 1e-9);
        let expected_otu = 15.0 * (0.5_f64 / 0.9).powf(-5.0 / 6.0);
        assert!((ox.otu - expected_otu).abs() < 1e-9);
    }

    #[test]
    fn test_constant_depth_above_table_is_penalised() {
        let mut ox = OxygenExposure::default();
        ox.constant_depth(1.9, 2.0);
        assert_eq!(ox.cns, 2.0);
    }

    #[test]
    fn test_transit_close_to_constant_for_small_change() {
        let mut transit = OxygenExposure::default();
        transit.transit(1.2001, 1.1999, 10.0);
        let mut constant = OxygenExposure::default();
        constant.constant_depth(1.2, 10.0);
        assert!((transit.cns - constant.cns).abs() < 1e-5);
        assert!((transit.otu - constant.otu).abs() < 1e-3);
    }

    #[test]
    fn test_transit_direction_does_not_change_total() {
        let mut down = OxygenExposure::default();
        down.transit(0.3, 1.6, 4.0);
        let mut up = OxygenExposure::default();
        up.transit(1.6, 0.3, 4.0);
        assert!(down.cns > 0.0);
        assert!((down.cns - up.cns).abs() < 1e-9);
        assert!((down.otu - up.otu).abs() < 1e-9);
    }

    #[test]
    fn test_cns_decays_with_ninety_minute_half_time() {
        let ox = OxygenExposure { cns: 0.4, otu: 120.0 };
        let later = ox.after_surface_interval(90.0);
        assert!((later.cns - 0.2).abs() < 1e-12);
        assert_eq!(later.otu, 120.0);
    }
}
