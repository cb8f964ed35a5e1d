//! Mutable state of one dive computation.
//!
//! A [`DiveContext`] is created per computation and owned by it: tissues,
//! active gas, depth, runtime, oxygen loading and the rows emitted so far.
//! Trial computations never touch it; they work on copies of [`Tissues`] and hand back
//! candidates that the planner commits here.

use crate::config::Settings;
use crate::oxygen::{self, OxygenExposure};
use crate::report::{ReportSink, Warning};
use crate::schedule::{select_switch, stop_row_timing, StopLadder, StopTime};
use crate::tissue::{Environment, Tissues, DEPTH_PER_ATM};
use crate::types::{DecoTableRow, DiveSegment, Gas, GasVolume, RowKind, SegmentKind};

/// Time and gas spent on one depth change
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransitRecord {
    pub start_runtime: f64,
    pub duration: f64,
    pub volume: f64,
}

/// A user level after it has been breathed, ready to become a row
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelRecord {
    pub depth: f64,
    /// Minutes actually spent at depth
    pub bottom_minutes: f64,
    /// Runtime when the diver reached the depth
    pub arrived: f64,
    pub row_start: f64,
    pub row_duration: f64,
    /// Gas for the level plus the transit that led to it
    pub volume: f64,
}

/// Extra columns a model contributes to a row
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RowExtras {
    pub gf: Option<f64>,
    pub m_value_percent: Option<f64>,
}

pub struct DiveContext<'a> {
    pub settings: &'a Settings,
    pub env: Environment,
    pub gases: &'a [Gas],
    pub active_gas: usize,
    pub tissues: Tissues,
    pub depth: f64,
    pub runtime: f64,
    pub oxygen: OxygenExposure,
    /// Minimum stop time for the gas being breathed
    pub min_stop_time: f64,
    pub rows: Vec<DecoTableRow>,
    pub segments: Vec<DiveSegment>,
    pub total_deco_time: f64,
    pub total_ascent_time: f64,
    pub offgassing_starts_at: Option<f64>,
    /// Litres per gas, indexed like `gases`
    pub gas_volumes: Vec<f64>,
    /// Last depth change not yet folded into a level row
    pub pending_transit: Option<TransitRecord>,
    sink: &'a mut dyn ReportSink,
}

impl<'a> DiveContext<'a> {
    pub fn new(
        settings: &'a Settings,
        gases: &'a [Gas],
        env: Environment,
        tissues: Tissues,
        oxygen: OxygenExposure,
        sink: &'a mut dyn ReportSink,
    ) -> Self {
        let active_gas = gases.iter().position(Gas::is_bottom).unwrap_or(0);
        let mut ctx = Self {
            settings,
            env,
            gases,
            active_gas,
            tissues,
            depth: 0.0,
            runtime: 0.0,
            oxygen,
            min_stop_time: settings.ascent.min_stop_time,
            rows: Vec::new(),
            segments: Vec::new(),
            total_deco_time: 0.0,
            total_ascent_time: 0.0,
            offgassing_starts_at: None,
            gas_volumes: vec![0.0; gases.len()],
            pending_transit: None,
            sink,
        };
        ctx.set_gas(active_gas);
        ctx
    }

    pub fn gas(&self) -> &'a Gas {
        &self.gases[self.active_gas]
    }

    pub fn sink(&mut self) -> &mut dyn ReportSink {
        &mut *self.sink
    }

    pub fn set_gas(&mut self, index: usize) {
        if index >= self.gases.len() {
            return;
        }
        self.active_gas = index;
        self.min_stop_time = self.gases[index]
            .min_stop_time
            .unwrap_or(self.settings.ascent.min_stop_time);
    }

    /// Switch to a decompression gas on arrival at `stop`; at most one switch
    pub fn switch_gas_for_stop(&mut self, stop: f64) -> bool {
        match select_switch(self.gases, self.active_gas, stop) {
            Some(index) => {
                tracing::info!(
                    "Gas switch at {} m: {} -> {}",
                    stop,
                    self.gas().label(),
                    self.gases[index].label()
                );
                self.set_gas(index);
                true
            }
            None => false,
        }
    }

    fn ata(&self, depth: f64) -> f64 {
        (depth + self.env.surface_pressure) / DEPTH_PER_ATM
    }

    /// Move to `end_depth` at `rate` m/min breathing `rmv` l/min
    pub fn transit(&mut self, end_depth: f64, rate: f64, rmv: f64) -> TransitRecord {
        let start_depth = self.depth;
        let start_runtime = self.runtime;
        let gas = self.gas();
        let duration = self
            .tissues
            .ascent_descent(gas, start_depth, end_depth, rate, &self.env);
        let start_po2 = oxygen::po2(start_depth, self.env.surface_pressure, gas.o2);
        let end_po2 = oxygen::po2(end_depth, self.env.surface_pressure, gas.o2);
        self.oxygen.transit(start_po2, end_po2, duration);

        let volume = rmv * 0.5 * (self.ata(start_depth) + self.ata(end_depth)) * duration;
        self.gas_volumes[self.active_gas] += volume;
        self.depth = end_depth;
        self.runtime += duration;
        TransitRecord {
            start_runtime,
            duration,
            volume,
        }
    }

    /// Stay at the current depth for `minutes`; returns the gas used
    pub fn breathe(&mut self, minutes: f64, rmv: f64) -> f64 {
        let gas = self.gas();
        self.tissues
            .constant_depth(gas, self.depth, &self.env, minutes);
        self.account_constant(minutes, rmv)
    }

    /// Commit a stop computed on a copy of the tissues
    pub fn commit_stop(&mut self, stop: &StopTime, rmv: f64) -> f64 {
        self.tissues = stop.tissues;
        self.account_constant(stop.minutes, rmv)
    }

    fn account_constant(&mut self, minutes: f64, rmv: f64) -> f64 {
        let po2 = oxygen::po2(self.depth, self.env.surface_pressure, self.gas().o2);
        self.oxygen.constant_depth(po2, minutes);
        let volume = rmv * self.ata(self.depth) * minutes;
        self.gas_volumes[self.active_gas] += volume;
        self.runtime += minutes;
        volume
    }

    pub fn push_segment(
        &mut self,
        kind: SegmentKind,
        start_depth: f64,
        start_runtime: f64,
        duration: f64,
    ) {
        self.segments.push(DiveSegment {
            kind,
            start_depth,
            end_depth: self.depth,
            start_runtime,
            end_runtime: start_runtime + duration,
            duration,
            gas: self.active_gas,
            tissues: Some(self.tissues),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push_row(
        &mut self,
        kind: RowKind,
        depth: f64,
        duration: f64,
        start_runtime: f64,
        end_runtime: f64,
        gas_volume: f64,
        extras: RowExtras,
    ) {
        let gas = self.gas();
        let surface = self.env.surface_pressure;
        self.rows.push(DecoTableRow {
            kind,
            depth,
            duration,
            start_runtime,
            end_runtime,
            gas: gas.label(),
            o2_percent: gas.o2 * 100.0,
            he_percent: gas.he * 100.0,
            po2: oxygen::po2(depth, surface, gas.o2),
            end: oxygen::equivalent_narcotic_depth(depth, surface, gas.n2()),
            gas_volume,
            cns_percent: self.oxygen.cns_percent(),
            otu: self.oxygen.otu,
            gf: extras.gf,
            m_value_percent: extras.m_value_percent,
        });
    }

    /// Breathe through a user level, folding in the pending transit.
    ///
    /// With travel time counted in the level duration the transit is taken
    /// out of the time spent at depth and the row keeps the entered duration.
    pub fn hold_level(&mut self, segment: &DiveSegment, rmv: f64) -> LevelRecord {
        let transit = self.pending_transit.take().unwrap_or_default();
        let travel_included = self.settings.ascent.travel_time_in_duration && transit.duration > 0.0;
        let bottom_minutes = if travel_included {
            (segment.duration - transit.duration).max(0.0)
        } else {
            segment.duration
        };

        let arrived = self.runtime;
        let volume = self.breathe(bottom_minutes, rmv);
        let row_start = if travel_included { transit.start_runtime } else { arrived };
        LevelRecord {
            depth: segment.end_depth,
            bottom_minutes,
            arrived,
            row_start,
            row_duration: segment.duration,
            volume: volume + transit.volume,
        }
    }

    pub fn push_level(&mut self, level: &LevelRecord, extras: RowExtras) {
        let end = self.runtime;
        self.push_row(
            RowKind::Level,
            level.depth,
            level.row_duration,
            level.row_start,
            end,
            level.volume,
            extras,
        );
        self.push_segment(SegmentKind::ConstantDepth, level.depth, level.arrived, level.bottom_minutes);
    }

    /// Ascend to `stop` while decompressing, recording the segment and totals.
    ///
    /// Only ascents after the first stop count as decompression time.
    pub fn decompression_ascent(&mut self, stop: f64, rate: f64, rmv: f64, first: bool) -> TransitRecord {
        let from = self.depth;
        let record = self.transit(stop, rate, rmv);
        if record.duration > 0.0 {
            self.push_segment(SegmentKind::Ascent, from, record.start_runtime, record.duration);
            self.total_ascent_time += record.duration;
            if !first {
                self.total_deco_time += record.duration;
            }
        }
        record
    }

    /// Emit the row and segment for a stop that was just committed
    pub fn push_stop(
        &mut self,
        stop: f64,
        ladder: &mut StopLadder,
        ascent: &TransitRecord,
        minutes: f64,
        volume: f64,
        extras: RowExtras,
    ) {
        let arrived = self.runtime - minutes;
        let (start, duration, end) = stop_row_timing(
            ladder.is_first(),
            ascent.start_runtime,
            ascent.duration,
            arrived,
            minutes,
            self.min_stop_time,
        );
        ladder.record(ascent.duration, minutes, self.min_stop_time);
        self.push_row(RowKind::Stop, stop, duration, start, end, volume + ascent.volume, extras);
        self.push_segment(SegmentKind::ConstantDepth, stop, arrived, minutes);
        self.total_deco_time += minutes;
    }

    /// Round the runtime up to a whole minimum stop and emit the surfacing row
    pub fn push_surface_row(&mut self, extras: RowExtras) {
        let step = self.min_stop_time;
        self.runtime = ((self.runtime - 1.0e-9) / step).ceil() * step;
        let runtime = self.runtime;
        self.push_row(RowKind::Surface, 0.0, 0.0, runtime, runtime, 0.0, extras);
    }

    pub fn report(&mut self, warning: Warning) {
        self.sink.report(warning);
    }

    pub fn gas_volume_summary(&self) -> Vec<GasVolume> {
        self.gases
            .iter()
            .zip(&self.gas_volumes)
            .map(|(gas, litres)| GasVolume {
                gas: gas.label(),
                litres: *litres,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingSink;

    fn gases() -> Vec<Gas> {
        vec![
            Gas::bottom(0.21, 0.0),
            Gas {
                min_stop_time: Some(2.0),
                ..Gas::decompression(0.5, 0.0, 21.0)
            },
        ]
    }

    #[test]
    fn test_transit_and_breathe_account_runtime_and_gas() {
        let settings = Settings::default();
        let gases = gases();
        let env = Environment::new(10.0, 0.627);
        let mut sink = CollectingSink::new();
        let mut ctx = DiveContext::new(
            &settings,
            &gases,
            env,
            Tissues::saturated(&env),
            OxygenExposure::default(),
            &mut sink,
        );

        let record = ctx.transit(30.0, 18.0, 20.0);
        assert!((record.duration - 30.0 / 18.0).abs() < 1e-12);
        // average of 1 and 4 ATA
        assert!((record.volume - 20.0 * 2.5 * record.duration).abs() < 1e-9);

        let volume = ctx.breathe(10.0, 20.0);
        assert!((volume - 800.0).abs() < 1e-9);
        assert!((ctx.runtime - (10.0 + 30.0 / 18.0)).abs() < 1e-12);
        assert!(ctx.oxygen.cns > 0.0);
        assert!((ctx.gas_volumes[0] - (800.0 + record.volume)).abs() < 1e-9);
    }

    #[test]
    fn test_gas_switch_sets_min_stop_time() {
        let settings = Settings::default();
        let gases = gases();
        let env = Environment::new(10.0, 0.627);
        let mut sink = CollectingSink::new();
        let mut ctx = DiveContext::new(
            &settings,
            &gases,
            env,
            Tissues::saturated(&env),
            OxygenExposure::default(),
            &mut sink,
        );
        assert_eq!(ctx.min_stop_time, 1.0);
        assert!(!ctx.switch_gas_for_stop(24.0));
        assert!(ctx.switch_gas_for_stop(21.0));
        assert_eq!(ctx.active_gas, 1);
        assert_eq!(ctx.min_stop_time, 2.0);
        assert!(!ctx.switch_gas_for_stop(18.0));
    }

    #[test]
    fn test_rows_carry_gas_columns() {
        let settings = Settings::default();
        let gases = gases();
        let env = Environment::new(10.0, 0.627);
        let mut sink = CollectingSink::new();
        let mut ctx = DiveContext::new(
            &settings,
            &gases,
            env,
            Tissues::saturated(&env),
            OxygenExposure::default(),
            &mut sink,
        );
        ctx.transit(30.0, 18.0, 20.0);
        ctx.push_row(RowKind::Level, 30.0, 20.0, 0.0, 20.0, 0.0, RowExtras::default());
        let row = &ctx.rows[0];
        assert_eq!(row.gas, "Air");
        assert!((row.po2 - 0.84).abs() < 1e-12);
        assert!((row.end - 30.0).abs() < 1e-9);
        assert!(row.gf.is_none());
    }

    #[test]
    fn test_travel_time_comes_out_of_level() {
        let mut settings = Settings::default();
        settings.ascent.travel_time_in_duration = true;
        let gases = gases();
        let env = Environment::new(10.0, 0.627);
        let mut sink = CollectingSink::new();
        let mut ctx = DiveContext::new(
            &settings,
            &gases,
            env,
            Tissues::saturated(&env),
            OxygenExposure::default(),
            &mut sink,
        );
        ctx.pending_transit = Some(ctx.transit(36.0, 18.0, 20.0));
        let level = ctx.hold_level(&DiveSegment::level(36.0, 20.0, 0), 20.0);
        assert!((level.bottom_minutes - 18.0).abs() < 1e-12);
        assert_eq!(level.row_start, 0.0);
        assert_eq!(level.row_duration, 20.0);
        ctx.push_level(&level, RowExtras::default());
        assert!((ctx.runtime - 20.0).abs() < 1e-12);
        assert!((ctx.rows[0].end_runtime - 20.0).abs() < 1e-12);
        assert!(ctx.pending_transit.is_none());
    }

    #[test]
    fn test_stop_bookkeeping() {
        let settings = Settings::default();
        let gases = gases();
        let env = Environment::new(10.0, 0.627);
        let mut sink = CollectingSink::new();
        let mut ctx = DiveContext::new(
            &settings,
            &gases,
            env,
            Tissues::saturated(&env),
            OxygenExposure::default(),
            &mut sink,
        );
        ctx.transit(30.0, 18.0, 20.0);
        ctx.breathe(20.0, 20.0);

        let ascent = ctx.decompression_ascent(6.0, 9.0, 15.0, true);
        assert_eq!(ctx.total_deco_time, 0.0);
        assert!((ctx.total_ascent_time - 24.0 / 9.0).abs() < 1e-12);

        let volume = ctx.breathe(3.0, 15.0);
        let mut ladder = StopLadder::new();
        ctx.push_stop(6.0, &mut ladder, &ascent, 3.0, volume, RowExtras::default());
        assert!(!ladder.is_first());
        assert!((ladder.hold(1.0) - 2.0).abs() < 1e-12);
        assert_eq!(ctx.total_deco_time, 3.0);
        let row = ctx.rows.last().unwrap();
        assert_eq!(row.kind, RowKind::Stop);
        assert_eq!(row.duration, 3.0);
        assert!((row.end_runtime - ctx.runtime).abs() < 1e-12);
        assert!((row.gas_volume - (volume + ascent.volume)).abs() < 1e-9);
        assert_eq!(ctx.segments.last().unwrap().kind, SegmentKind::ConstantDepth);

        ctx.decompression_ascent(3.0, 9.0, 15.0, false);
        assert!((ctx.total_deco_time - (3.0 + 3.0 / 9.0)).abs() < 1e-12);
    }
}
