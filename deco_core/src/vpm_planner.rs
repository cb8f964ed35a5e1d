//! VPM-B planner.
//!
//! Each decompression starts from the allowable supersaturation gradients
//! implied by the regenerated bubble radii. With the critical-volume
//! algorithm enabled a trial schedule is computed, the total phase volume
//! time derived from it relaxes the gradients, and the trial is repeated
//! until the phase volume time settles within a minute. The accepted
//! gradients then drive the schedule that is committed to the dive.

use crate::config::Settings;
use crate::context::{DiveContext, RowExtras};
use crate::engine::{AscentOutcome, DecompressionModel};
use crate::error::Error;
use crate::report::{Warning, WarningKind};
use crate::schedule::{select_switch, StopLadder, StopLayout};
use crate::tissue::{Environment, Tissues, COMPARTMENTS};
use crate::types::{DecoModel, DiveSegment, SegmentKind};
use crate::vpm::{self, BubbleState, Gradients, VpmParameters};
use crate::Result;

/// Phase volume time change below which the critical-volume loop stops, minutes
const PVT_TOLERANCE: f64 = 1.0;

pub struct VpmPlanner {
    params: VpmParameters,
    state: BubbleState,
    layout: StopLayout,
    ascent_rate: f64,
    descent_rate: f64,
    rmv_dive: f64,
    rmv_deco: f64,
    default_min_stop: f64,
    first_stop_of_total_ascent: f64,
    first_zone_runtime: Option<f64>,
    last_was_ascent: bool,
}

impl VpmPlanner {
    /// Start from `bubbles` when continuing a previous dive
    pub fn new(settings: &Settings, bubbles: Option<BubbleState>) -> Self {
        let params = VpmParameters::from_settings(settings);
        let state = bubbles.unwrap_or_else(|| BubbleState::new(&params));
        Self {
            params,
            state,
            layout: StopLayout::new(settings, true),
            ascent_rate: settings.ascent.ascent_rate,
            descent_rate: settings.ascent.descent_rate,
            rmv_dive: settings.gas_use.rmv_dive,
            rmv_deco: settings.gas_use.rmv_deco,
            default_min_stop: settings.ascent.min_stop_time,
            first_stop_of_total_ascent: 0.0,
            first_zone_runtime: None,
            last_was_ascent: false,
        }
    }

    fn initial_gradients(&self, runtime: f64) -> (vpm::Regeneration, Gradients) {
        let regen = vpm::regenerate(&self.state, &self.params, runtime);
        let initial = vpm::initial_allowable_gradients(&regen, &self.params);
        (regen, initial)
    }

    /// True when the ceiling at the start of the off-gassing zone is above `end`
    fn direct_ascent_is_safe(&self, ctx: &mut DiveContext<'_>, start: f64, end: f64) -> bool {
        let (_, initial) = self.initial_gradients(ctx.runtime);
        let gas = ctx.gas();
        let zone = vpm::deco_zone_start(&ctx.tissues, gas, start, self.ascent_rate, &self.params);
        if zone.depth < end {
            return true;
        }
        if ctx.offgassing_starts_at.is_none() {
            ctx.offgassing_starts_at = Some(zone.depth);
        }
        let mut scratch = ctx.tissues;
        scratch.ascent_descent(gas, start, zone.depth, self.ascent_rate, &self.params.env);
        vpm::ceiling(&scratch, &initial, &self.params) < end
    }

    fn plain_ascent(&mut self, ctx: &mut DiveContext<'_>, end: f64) {
        let from = ctx.depth;
        let record = ctx.transit(end, self.ascent_rate, self.rmv_dive);
        if record.duration > 0.0 {
            ctx.push_segment(SegmentKind::Ascent, from, record.start_runtime, record.duration);
        }
        ctx.pending_transit = Some(record);
    }

    /// Run a schedule on copied tissues and return the runtime when it reaches `ending`
    #[allow(clippy::too_many_arguments)]
    fn trial_schedule(
        &self,
        ctx: &mut DiveContext<'_>,
        tissues: &Tissues,
        runtime: f64,
        from: f64,
        first_stop: f64,
        ending: f64,
        allowable: &Gradients,
    ) -> Result<(Tissues, f64)> {
        let gases = ctx.gases;
        let env = &self.params.env;
        let mut gas_index = ctx.active_gas;
        let mut tissues = *tissues;
        let mut ascent = tissues.ascent_descent(&gases[gas_index], from, first_stop, self.ascent_rate, env);
        let mut runtime = runtime + ascent;
        let mut stop = first_stop;
        let mut ladder = StopLadder::new();

        while stop > ending {
            if let Some(index) = select_switch(gases, gas_index, stop) {
                gas_index = index;
            }
            let gas = &gases[gas_index];
            let next = self.layout.next_stop(stop, ending);
            let gradients = vpm::boyles_law_compensation(
                self.first_stop_of_total_ascent,
                next,
                allowable,
                &self.params,
                ctx.sink(),
            );
            let min_stop = gas.min_stop_time.unwrap_or(self.default_min_stop);
            let timed = vpm::stop_time(
                &tissues,
                gas,
                &gradients,
                stop,
                next,
                runtime,
                min_stop,
                ladder.hold(ascent),
                &self.params,
            )?;
            ladder.record(ascent, timed.minutes, min_stop);
            tissues = timed.tissues;
            runtime += timed.minutes;
            ascent = tissues.ascent_descent(gas, stop, next, self.ascent_rate, env);
            runtime += ascent;
            stop = next;
        }
        Ok((tissues, runtime))
    }

    fn decompressed_ascent(
        &mut self,
        ctx: &mut DiveContext<'_>,
        start: f64,
        end: f64,
    ) -> Result<AscentOutcome> {
        let before = ctx.runtime;
        self.decompress(ctx, start, end)?;
        let added_time = ctx.runtime - before - (start - end) / self.ascent_rate;
        Ok(AscentOutcome::Decompressed { added_time })
    }
}

impl DecompressionModel for VpmPlanner {
    fn kind(&self) -> DecoModel {
        DecoModel::Vpm
    }

    fn environment(&self) -> Environment {
        self.params.env
    }

    fn descend(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<()> {
        if self.last_was_ascent {
            self.first_stop_of_total_ascent = 0.0;
        }
        self.last_was_ascent = false;

        ctx.set_gas(segment.gas);
        let gas = ctx.gas();
        let from = ctx.depth;
        let before = ctx.tissues;
        let record = ctx.transit(segment.end_depth, self.descent_rate, self.rmv_dive);
        let after = ctx.tissues;
        vpm::crushing_pressure(
            &mut self.state,
            &before,
            &after,
            gas,
            from,
            segment.end_depth,
            self.descent_rate,
            &self.params,
            ctx.sink(),
        );
        ctx.push_segment(SegmentKind::Descent, from, record.start_runtime, record.duration);
        ctx.pending_transit = Some(record);
        Ok(())
    }

    fn level(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<()> {
        self.last_was_ascent = false;
        ctx.set_gas(segment.gas);
        let level = ctx.hold_level(segment, self.rmv_dive);
        ctx.push_level(&level, RowExtras::default());
        Ok(())
    }

    fn ascend(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<AscentOutcome> {
        self.last_was_ascent = true;
        let start = ctx.depth;
        let end = segment.end_depth;
        if self.direct_ascent_is_safe(ctx, start, end) {
            self.plain_ascent(ctx, end);
            Ok(AscentOutcome::Direct)
        } else {
            self.decompressed_ascent(ctx, start, end)
        }
    }

    fn decompress(&mut self, ctx: &mut DiveContext<'_>, start: f64, ending: f64) -> Result<()> {
        let (regen, initial) = self.initial_gradients(ctx.runtime);
        let mut allowable = initial;

        let gas = ctx.gas();
        let zone = vpm::deco_zone_start(&ctx.tissues, gas, start, self.ascent_rate, &self.params);
        if !zone.converged {
            ctx.report(Warning::new(
                WarningKind::IterationLimit,
                format!("off-gassing depth search from {} m did not converge", start),
            ));
        }
        if ctx.offgassing_starts_at.is_none() {
            ctx.offgassing_starts_at = Some(zone.depth);
        }
        let zone_depth = zone.depth.max(ending);
        let mut zone_tissues = ctx.tissues;
        let zone_runtime = ctx.runtime
            + zone_tissues.ascent_descent(gas, start, zone_depth, self.ascent_rate, &self.params.env);
        let first_zone_runtime = *self.first_zone_runtime.get_or_insert(zone_runtime);
        self.state.max_actual_gradient = [0.0; COMPARTMENTS];

        let mut last_pvt: Option<[f64; COMPARTMENTS]> = None;
        let mut pass = 0;
        let first_stop = loop {
            let ceiling = vpm::ceiling(&zone_tissues, &allowable, &self.params);
            let rounded = self.layout.round_up(ceiling);
            if rounded > zone_depth {
                return Err(Error::infeasible(
                    rounded,
                    "first stop is deeper than the off-gassing depth",
                ));
            }
            let stop = vpm::projected_ascent(
                &zone_tissues,
                gas,
                &allowable,
                zone_depth,
                rounded,
                self.ascent_rate,
                self.layout.interval,
                &self.params,
            );
            if stop <= ending {
                break ending;
            }
            self.first_stop_of_total_ascent = self.first_stop_of_total_ascent.max(stop);

            let (trial_tissues, trial_runtime) = self.trial_schedule(
                ctx,
                &zone_tissues,
                zone_runtime,
                zone_depth,
                stop,
                ending,
                &allowable,
            )?;
            let deco_phase = trial_runtime - first_zone_runtime;
            let pvt = vpm::surface_phase_volume_time(&trial_tissues, &self.params).map(|surface| deco_phase + surface);

            pass += 1;
            let converged = last_pvt.is_some_and(|last| {
                last.iter()
                    .zip(&pvt)
                    .all(|(a, b)| (a - b).abs() <= PVT_TOLERANCE)
            });
            if converged || !self.params.critical_volume {
                break stop;
            }
            if pass >= self.params.max_iterations {
                ctx.report(Warning::new(
                    WarningKind::CriticalVolumeNotConverged,
                    format!(
                        "critical-volume loop stopped after {} passes, keeping the last schedule",
                        pass
                    ),
                ));
                break stop;
            }
            allowable = vpm::critical_volume(&initial, &regen, &pvt, &self.params);
            last_pvt = Some(pvt);
            tracing::debug!(
                "Critical-volume pass {}: first stop {} m, deco phase {:.1} min",
                pass,
                stop,
                deco_phase
            );
        };

        let mut stop = first_stop;
        let mut ladder = StopLadder::new();
        let last_ascent = loop {
            let ascent = ctx.decompression_ascent(stop, self.ascent_rate, self.rmv_deco, ladder.is_first());
            vpm::update_max_actual_gradient(
                &mut self.state.max_actual_gradient,
                &ctx.tissues,
                stop,
                &self.params,
            );
            if stop <= ending {
                break ascent;
            }

            ctx.switch_gas_for_stop(stop);
            let next = self.layout.next_stop(stop, ending);
            let gradients = vpm::boyles_law_compensation(
                self.first_stop_of_total_ascent,
                next,
                &allowable,
                &self.params,
                ctx.sink(),
            );
            let timed = vpm::stop_time(
                &ctx.tissues,
                ctx.gas(),
                &gradients,
                stop,
                next,
                ctx.runtime,
                ctx.min_stop_time,
                ladder.hold(ascent.duration),
                &self.params,
            )?;
            let volume = ctx.commit_stop(&timed, self.rmv_deco);
            ctx.push_stop(stop, &mut ladder, &ascent, timed.minutes, volume, RowExtras::default());
            tracing::debug!(
                "Stop at {} m for {:.1} min on {}",
                stop,
                timed.minutes,
                ctx.gas().label()
            );

            stop = next;
        };

        if ending > 0.0 {
            ctx.pending_transit = Some(last_ascent);
        } else {
            ctx.pending_transit = None;
            ctx.push_surface_row(RowExtras::default());
        }
        self.state.last_regeneration_runtime = ctx.runtime;
        Ok(())
    }

    fn bubble_state(&self) -> Option<BubbleState> {
        Some(self.state.clone())
    }
}
