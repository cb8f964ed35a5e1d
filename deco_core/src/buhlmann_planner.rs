//! Bühlmann ZH-L16 planner with gradient factors.
//!
//! The gradient factor starts at GF low and, once the first stop is known,
//! moves linearly to GF high at the surface. Ascents that end just under the
//! ceiling are treated as manual stops and also fix the slope.

use crate::buhlmann::{self, Coefficients, GradientFactors, MValueStatus};
use crate::config::Settings;
use crate::context::{DiveContext, RowExtras};
use crate::engine::{AscentOutcome, DecompressionModel};
use crate::error::Error;
use crate::report::{Warning, WarningKind};
use crate::schedule::{StopLadder, StopLayout};
use crate::tissue::{Environment, Tissues};
use crate::types::{DecoModel, DiveSegment, SegmentKind};
use crate::Result;

pub struct BuhlmannPlanner {
    coefficients: Coefficients,
    gf: GradientFactors,
    layout: StopLayout,
    env: Environment,
    ascent_rate: f64,
    descent_rate: f64,
    rmv_dive: f64,
    rmv_deco: f64,
    m_value: MValueStatus,
    highest_gf: f64,
    ascent_done: bool,
    at_manual_stop: bool,
    done_deco_stop: bool,
}

impl BuhlmannPlanner {
    pub fn new(settings: &Settings) -> Self {
        Self {
            coefficients: Coefficients::for_variant(settings.buhlmann.variant),
            gf: GradientFactors::new(settings.buhlmann.gf_low, settings.buhlmann.gf_high),
            layout: StopLayout::new(settings, false),
            env: Environment::new(
                settings.environment.surface_pressure,
                settings.environment.water_vapor_pressure,
            ),
            ascent_rate: settings.ascent.ascent_rate,
            descent_rate: settings.ascent.descent_rate,
            rmv_dive: settings.gas_use.rmv_dive,
            rmv_deco: settings.gas_use.rmv_deco,
            m_value: MValueStatus {
                gradient_factor: 0.0,
                m_value_fraction: 0.0,
            },
            highest_gf: 0.0,
            ascent_done: false,
            at_manual_stop: false,
            done_deco_stop: false,
        }
    }

    fn update_m(&mut self, tissues: &Tissues, depth: f64) {
        self.m_value = buhlmann::m_value_status(tissues, &self.coefficients, self.env.ambient(depth));
        self.highest_gf = self.highest_gf.max(self.m_value.gradient_factor * 100.0);
    }

    fn extras(&self) -> RowExtras {
        RowExtras {
            gf: Some(self.m_value.gradient_factor * 100.0),
            m_value_percent: Some(self.m_value.m_value_fraction * 100.0),
        }
    }

    fn projected(&self, ctx: &DiveContext<'_>, start: f64, stop: f64) -> f64 {
        buhlmann::projected_ascent(
            &ctx.tissues,
            ctx.gas(),
            &self.coefficients,
            self.gf.current,
            start,
            stop,
            self.ascent_rate,
            self.layout.interval,
            &self.env,
        )
    }

    fn mark_offgassing(&self, ctx: &mut DiveContext<'_>, start: f64) {
        if ctx.offgassing_starts_at.is_some() {
            return;
        }
        let zone = buhlmann::deco_zone_start(&ctx.tissues, ctx.gas(), start, self.ascent_rate, &self.env);
        if !zone.converged {
            ctx.report(Warning::new(
                WarningKind::IterationLimit,
                format!("off-gassing depth search from {} m did not converge", start),
            ));
        }
        ctx.offgassing_starts_at = Some(zone.depth);
    }

    /// Ascend without stops, leaving the transit for the next level row
    fn plain_ascent(&mut self, ctx: &mut DiveContext<'_>, end: f64) {
        if !self.ascent_done {
            let start = ctx.depth;
            self.mark_offgassing(ctx, start);
        }
        let from = ctx.depth;
        let record = ctx.transit(end, self.ascent_rate, self.rmv_dive);
        self.update_m(&ctx.tissues, end);
        if record.duration > 0.0 {
            ctx.push_segment(SegmentKind::Ascent, from, record.start_runtime, record.duration);
        }
        ctx.pending_transit = Some(record);
    }

    fn decompressed_ascent(
        &mut self,
        ctx: &mut DiveContext<'_>,
        start: f64,
        end: f64,
    ) -> Result<AscentOutcome> {
        let before = ctx.runtime;
        self.decompress(ctx, start, end)?;
        self.done_deco_stop = true;
        let added_time = ctx.runtime - before - (start - end) / self.ascent_rate;
        Ok(AscentOutcome::Decompressed { added_time })
    }

    /// First stop for an ascent from `start`, and whether it is a manual stop
    fn first_stop(&self, ctx: &DiveContext<'_>) -> (f64, bool) {
        let interval = self.layout.interval;
        let ceiling = buhlmann::ceiling(&ctx.tissues, &self.coefficients, self.gf.current, &self.env);
        if ceiling <= 0.0 {
            (0.0, false)
        } else if ceiling % interval <= 0.1 * interval {
            (ceiling.floor(), true)
        } else {
            (((ceiling / interval).floor() + 1.0) * interval, false)
        }
    }
}

impl DecompressionModel for BuhlmannPlanner {
    fn kind(&self) -> DecoModel {
        DecoModel::Buhlmann
    }

    fn environment(&self) -> Environment {
        self.env
    }

    fn descend(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<()> {
        ctx.set_gas(segment.gas);
        let from = ctx.depth;
        let record = ctx.transit(segment.end_depth, self.descent_rate, self.rmv_dive);
        self.update_m(&ctx.tissues, segment.end_depth);
        ctx.push_segment(SegmentKind::Descent, from, record.start_runtime, record.duration);
        ctx.pending_transit = Some(record);

        self.ascent_done = false;
        self.at_manual_stop = false;
        self.done_deco_stop = false;
        self.gf.reset();
        Ok(())
    }

    fn level(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<()> {
        let depth = segment.end_depth;
        if self.ascent_done && self.at_manual_stop && !self.done_deco_stop {
            self.gf.fix_slope(depth);
            self.gf.current = self.gf.at(depth - self.layout.interval);
            self.done_deco_stop = true;
        }

        ctx.set_gas(segment.gas);
        let level = ctx.hold_level(segment, self.rmv_dive);
        self.update_m(&ctx.tissues, depth);
        let extras = self.extras();
        ctx.push_level(&level, extras);

        self.ascent_done = false;
        self.at_manual_stop = false;
        Ok(())
    }

    fn ascend(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<AscentOutcome> {
        let start = ctx.depth;
        let end = segment.end_depth;
        let interval = self.layout.interval;
        let ceiling = buhlmann::ceiling(&ctx.tissues, &self.coefficients, self.gf.current, &self.env);

        let outcome = if ceiling > end {
            if ceiling < end + interval && end >= self.projected(ctx, start, end) {
                self.plain_ascent(ctx, end);
                self.at_manual_stop = true;
                AscentOutcome::Direct
            } else {
                self.decompressed_ascent(ctx, start, end)?
            }
        } else if end < self.projected(ctx, start, end) {
            self.decompressed_ascent(ctx, start, end)?
        } else {
            self.plain_ascent(ctx, end);
            if end - interval < ceiling {
                self.at_manual_stop = true;
            }
            AscentOutcome::Direct
        };
        self.ascent_done = true;
        Ok(outcome)
    }

    fn decompress(&mut self, ctx: &mut DiveContext<'_>, start: f64, ending: f64) -> Result<()> {
        let interval = self.layout.interval;
        let zone = buhlmann::deco_zone_start(&ctx.tissues, ctx.gas(), start, self.ascent_rate, &self.env);
        if !zone.converged {
            ctx.report(Warning::new(
                WarningKind::IterationLimit,
                format!("off-gassing depth search from {} m did not converge", start),
            ));
        }
        if ctx.offgassing_starts_at.is_none() {
            ctx.offgassing_starts_at = Some(zone.depth);
        }

        let (mut stop, manual) = self.first_stop(ctx);
        if stop > zone.depth {
            return Err(Error::infeasible(
                stop,
                "first stop is deeper than the off-gassing depth, raise GF low",
            ));
        }
        if !manual {
            stop = self.projected(ctx, start, stop);
            if stop > zone.depth {
                return Err(Error::infeasible(
                    stop,
                    "first stop is deeper than the off-gassing depth, raise GF low",
                ));
            }
        }

        let mut first_is_last = false;
        if self.layout.last_stop_double && stop > 0.0 && stop <= 2.0 * interval {
            stop = 2.0 * interval;
            first_is_last = true;
        }
        if self.gf.slope.is_some() {
            self.gf.current = self.gf.at(stop - interval);
        }
        if !first_is_last && stop > 0.0 && (self.gf.slope.is_none() || stop == start) {
            let shallower = self.projected(ctx, start, stop - interval);
            if shallower < stop {
                stop = shallower;
                if self.gf.slope.is_some() {
                    self.gf.current = self.gf.at(stop - interval);
                }
            }
        }
        self.gf.fix_slope(stop);
        let mut stop = stop.max(ending);

        tracing::debug!(
            "Decompressing from {} m to {} m, first stop {} m at GF {:.2}",
            start,
            ending,
            stop,
            self.gf.current
        );

        let mut ladder = StopLadder::new();
        let last_ascent = loop {
            let ascent = ctx.decompression_ascent(stop, self.ascent_rate, self.rmv_deco, ladder.is_first());
            self.update_m(&ctx.tissues, stop);
            if stop <= ending {
                break ascent;
            }

            ctx.switch_gas_for_stop(stop);
            let next = self.layout.next_stop(stop, ending);
            self.gf.current = self.gf.at(next);
            let timed = buhlmann::stop_time(
                &ctx.tissues,
                ctx.gas(),
                &self.coefficients,
                self.gf.current,
                stop,
                next,
                ctx.runtime,
                ctx.min_stop_time,
                ladder.hold(ascent.duration),
                &self.env,
            )?;
            let volume = ctx.commit_stop(&timed, self.rmv_deco);
            self.update_m(&ctx.tissues, stop);
            let extras = self.extras();
            ctx.push_stop(stop, &mut ladder, &ascent, timed.minutes, volume, extras);
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
            ctx.push_surface_row(RowExtras {
                gf: Some((self.gf.current * 100.0).ceil()),
                m_value_percent: None,
            });
        }
        Ok(())
    }

    fn highest_gf(&self) -> Option<f64> {
        Some(self.highest_gf)
    }
}
