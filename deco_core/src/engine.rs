//! Dive segment processor.
//!
//! Feeds the input segments through a [`DecompressionModel`] one at a time
//! from a work queue. When the model inserts decompression stops into a
//! user ascent, the queued segments are shifted by the added time. After the
//! last input segment the diver is always brought to the surface.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::buhlmann_planner::BuhlmannPlanner;
use crate::config::Settings;
use crate::context::DiveContext;
use crate::oxygen::OxygenExposure;
use crate::report::{CollectingSink, ReportSink, Warning};
use crate::tissue::{Environment, Tissues};
use crate::types::{DecoModel, DecoTableRow, DiveSegment, DiveSummary, Gas, RowKind, SegmentKind};
use crate::vpm::BubbleState;
use crate::vpm_planner::VpmPlanner;
use crate::{Error, Result};

/// How a user ascent was carried out
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AscentOutcome {
    /// Straight to the target depth
    Direct,
    /// Stops were inserted; later segments start this much later
    Decompressed { added_time: f64 },
}

/// One decompression model driving a [`DiveContext`]
pub trait DecompressionModel {
    fn kind(&self) -> DecoModel;

    /// Pressures the model computes tissue loading against
    fn environment(&self) -> Environment;

    fn descend(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<()>;

    fn level(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<()>;

    fn ascend(&mut self, ctx: &mut DiveContext<'_>, segment: &DiveSegment) -> Result<AscentOutcome>;

    /// Bring the diver from `start` to `ending`, stopping as required
    fn decompress(&mut self, ctx: &mut DiveContext<'_>, start: f64, ending: f64) -> Result<()>;

    /// Highest gradient factor reached, percent
    fn highest_gf(&self) -> Option<f64> {
        None
    }

    fn bubble_state(&self) -> Option<BubbleState> {
        None
    }
}

/// State a dive starts from: surface saturation or the end of a previous dive
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InitialState {
    pub tissues: Tissues,
    pub oxygen: OxygenExposure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bubbles: Option<BubbleState>,
}

/// Everything the planner needs besides settings
#[derive(Clone, Debug, PartialEq)]
pub struct DiveInput {
    pub gases: Vec<Gas>,
    pub segments: Vec<DiveSegment>,
    pub initial: Option<InitialState>,
}

impl DiveInput {
    /// Reject profiles the planner must not start on
    pub fn validate(&self) -> Result<()> {
        let bottom = self.gases.iter().filter(|g| g.is_bottom()).count();
        if bottom != 1 {
            return Err(Error::InvalidPlan(format!(
                "exactly one bottom gas required, found {}",
                bottom
            )));
        }
        for gas in &self.gases {
            if !(gas.o2 > 0.0 && gas.o2 <= 1.0) || !(0.0..=1.0).contains(&gas.he) {
                return Err(Error::InvalidPlan(format!(
                    "gas {}: fractions out of range",
                    gas.label()
                )));
            }
            if gas.o2 + gas.he > 1.0 + 1e-9 {
                return Err(Error::InvalidPlan(format!(
                    "gas {}: O2 and He exceed 100%",
                    gas.label()
                )));
            }
            if let Some(minutes) = gas.min_stop_time {
                if !(minutes > 0.0) || !minutes.is_finite() {
                    return Err(Error::InvalidPlan(format!(
                        "gas {}: minimum stop time must be positive, got {}",
                        gas.label(),
                        minutes
                    )));
                }
            }
            if !gas.is_bottom() && !(gas.switch_depth > 0.0) {
                return Err(Error::InvalidPlan(format!(
                    "deco gas {} needs a positive switch depth",
                    gas.label()
                )));
            }
        }
        let deco_depths: Vec<f64> = self
            .gases
            .iter()
            .filter(|g| !g.is_bottom())
            .map(|g| g.switch_depth)
            .collect();
        if deco_depths.windows(2).any(|w| w[1] >= w[0]) {
            return Err(Error::InvalidPlan(
                "decompression gases must be listed by decreasing switch depth".into(),
            ));
        }

        if self.segments.is_empty() {
            return Err(Error::InvalidPlan("no dive segments".into()));
        }
        let mut depth = 0.0;
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.gas >= self.gases.len() {
                return Err(Error::InvalidPlan(format!(
                    "segment {} uses unknown gas {}",
                    i + 1,
                    seg.gas
                )));
            }
            if !(seg.start_depth >= 0.0) || !(seg.end_depth >= 0.0) || !(seg.duration >= 0.0) {
                return Err(Error::InvalidPlan(format!(
                    "segment {} has a negative depth or duration",
                    i + 1
                )));
            }
            if (seg.start_depth - depth).abs() > 1e-6 {
                return Err(Error::InvalidPlan(format!(
                    "segment {} starts at {} m but the previous one ended at {} m",
                    i + 1,
                    seg.start_depth,
                    depth
                )));
            }
            let consistent = match seg.kind {
                SegmentKind::Descent => seg.end_depth > seg.start_depth,
                SegmentKind::Ascent => seg.end_depth < seg.start_depth,
                SegmentKind::ConstantDepth => seg.end_depth == seg.start_depth,
            };
            if !consistent {
                return Err(Error::InvalidPlan(format!(
                    "segment {} depth change does not match its kind",
                    i + 1
                )));
            }
            depth = seg.end_depth;
        }
        Ok(())
    }
}

/// Complete output of one planned dive
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiveResult {
    pub model: DecoModel,
    pub rows: Vec<DecoTableRow>,
    pub segments: Vec<DiveSegment>,
    pub summary: DiveSummary,
    /// Compartment pressures on surfacing
    pub tissues: Tissues,
    pub oxygen: OxygenExposure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bubbles: Option<BubbleState>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl DiveResult {
    /// Starting state for a dive following this one without a surface interval
    pub fn final_state(&self) -> InitialState {
        InitialState {
            tissues: self.tissues,
            oxygen: self.oxygen,
            bubbles: self.bubbles.clone(),
        }
    }
}

/// Plan a dive, collecting warnings into the result
pub fn plan_dive(input: &DiveInput, settings: &Settings, model: DecoModel) -> Result<DiveResult> {
    let mut sink = CollectingSink::new();
    let mut result = plan_dive_with_sink(input, settings, model, &mut sink)?;
    result.warnings = sink.into_warnings();
    Ok(result)
}

/// Plan a dive, sending warnings to `sink`
pub fn plan_dive_with_sink(
    input: &DiveInput,
    settings: &Settings,
    model: DecoModel,
    sink: &mut dyn ReportSink,
) -> Result<DiveResult> {
    settings.validate()?;
    input.validate()?;
    let initial = input.initial.as_ref();
    match model {
        DecoModel::Buhlmann => {
            let mut planner = BuhlmannPlanner::new(settings);
            run(&mut planner, input, settings, initial, sink)
        }
        DecoModel::Vpm => {
            let bubbles = initial.and_then(|i| i.bubbles.clone());
            let mut planner = VpmPlanner::new(settings, bubbles);
            run(&mut planner, input, settings, initial, sink)
        }
    }
}

fn run(
    model: &mut dyn DecompressionModel,
    input: &DiveInput,
    settings: &Settings,
    initial: Option<&InitialState>,
    sink: &mut dyn ReportSink,
) -> Result<DiveResult> {
    let env = model.environment();
    let tissues = initial.map_or_else(|| Tissues::saturated(&env), |i| i.tissues);
    let oxygen = initial.map(|i| i.oxygen).unwrap_or_default();
    let mut ctx = DiveContext::new(settings, &input.gases, env, tissues, oxygen, sink);

    let mut queue: VecDeque<DiveSegment> = scheduled(&input.segments, settings).into();
    tracing::debug!(
        "Planning {} segments with the {} model",
        queue.len(),
        model.kind().as_str()
    );

    while let Some(segment) = queue.pop_front() {
        match segment.kind {
            SegmentKind::Descent => model.descend(&mut ctx, &segment)?,
            SegmentKind::ConstantDepth => model.level(&mut ctx, &segment)?,
            SegmentKind::Ascent => {
                if let AscentOutcome::Decompressed { added_time } = model.ascend(&mut ctx, &segment)? {
                    tracing::debug!("Ascent to {} m added {:.1} min", segment.end_depth, added_time);
                    for queued in queue.iter_mut() {
                        queued.shift(added_time);
                    }
                }
            }
        }
    }

    let surfaced = ctx.depth <= 0.0 && ctx.rows.last().is_some_and(|r| r.kind == RowKind::Surface);
    if !surfaced {
        let depth = ctx.depth;
        model.decompress(&mut ctx, depth, 0.0)?;
    }

    let summary = DiveSummary {
        total_runtime: ctx.runtime,
        total_deco_time: ctx.total_deco_time,
        total_ascent_time: ctx.total_ascent_time,
        cns_percent: ctx.oxygen.cns_percent(),
        otu: ctx.oxygen.otu,
        offgassing_starts_at: ctx.offgassing_starts_at,
        gas_volumes: ctx.gas_volume_summary(),
        highest_gf: model.highest_gf(),
    };
    tracing::info!(
        "Planned dive: runtime {:.0} min, deco {:.0} min, CNS {:.0}%",
        summary.total_runtime,
        summary.total_deco_time,
        summary.cns_percent
    );

    Ok(DiveResult {
        model: model.kind(),
        rows: ctx.rows,
        segments: ctx.segments,
        summary,
        tissues: ctx.tissues,
        oxygen: ctx.oxygen,
        bubbles: model.bubble_state(),
        warnings: Vec::new(),
    })
}

/// Nominal runtimes for the input segments at the configured rates
fn scheduled(segments: &[DiveSegment], settings: &Settings) -> Vec<DiveSegment> {
    let mut runtime = 0.0;
    segments
        .iter()
        .map(|seg| {
            let mut seg = seg.clone();
            let duration = match seg.kind {
                SegmentKind::Descent => (seg.end_depth - seg.start_depth) / settings.ascent.descent_rate,
                SegmentKind::Ascent => (seg.start_depth - seg.end_depth) / settings.ascent.ascent_rate,
                SegmentKind::ConstantDepth => seg.duration,
            };
            seg.duration = duration;
            seg.start_runtime = runtime;
            seg.end_runtime = runtime + duration;
            runtime += duration;
            seg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(depth: f64, minutes: f64, gases: Vec<Gas>) -> DiveInput {
        DiveInput {
            gases,
            segments: vec![
                DiveSegment::transit(0.0, depth, 0),
                DiveSegment::level(depth, minutes, 0),
            ],
            initial: None,
        }
    }

    fn buhlmann_settings(gf_low: f64, gf_high: f64) -> Settings {
        let mut settings = Settings::default();
        settings.buhlmann.gf_low = gf_low;
        settings.buhlmann.gf_high = gf_high;
        settings
    }

    fn stops(result: &DiveResult) -> Vec<&DecoTableRow> {
        result.rows.iter().filter(|r| r.kind == RowKind::Stop).collect()
    }

    fn scenario_b_input() -> DiveInput {
        square(
            51.0,
            25.0,
            vec![Gas::bottom(0.21, 0.35), Gas::decompression(0.5, 0.0, 21.0)],
        )
    }

    #[test]
    fn test_validate_rejects_missing_bottom_gas() {
        let mut input = square(30.0, 20.0, vec![Gas::decompression(0.5, 0.0, 21.0)]);
        input.segments[0].gas = 0;
        assert!(matches!(input.validate(), Err(Error::InvalidPlan(_))));
    }

    #[test]
    fn test_validate_rejects_bad_gas_and_gaps() {
        let input = square(30.0, 20.0, vec![Gas::bottom(0.5, 0.6)]);
        assert!(input.validate().is_err());

        let mut input = square(30.0, 20.0, vec![Gas::bottom(0.21, 0.0)]);
        input.segments[1].start_depth = 25.0;
        input.segments[1].end_depth = 25.0;
        assert!(input.validate().is_err());

        let mut input = square(30.0, 20.0, vec![Gas::bottom(0.21, 0.0)]);
        input.segments[1].gas = 3;
        assert!(input.validate().is_err());

        let input = square(
            30.0,
            20.0,
            vec![
                Gas::bottom(0.21, 0.0),
                Gas::decompression(1.0, 0.0, 6.0),
                Gas::decompression(0.5, 0.0, 21.0),
            ],
        );
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_short_shallow_dive_has_no_stops() {
        let input = square(12.0, 20.0, vec![Gas::bottom(0.21, 0.0)]);
        let result = plan_dive(&input, &buhlmann_settings(0.7, 0.85), DecoModel::Buhlmann).unwrap();

        assert!(stops(&result).is_empty());
        let last = result.rows.last().unwrap();
        assert_eq!(last.kind, RowKind::Surface);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.summary.total_deco_time, 0.0);
        assert!(result.summary.highest_gf.is_some());
    }

    fn ladder(result: &DiveResult) -> Vec<(f64, f64)> {
        stops(result).iter().map(|r| (r.depth, r.duration)).collect()
    }

    fn assert_non_decreasing(result: &DiveResult) {
        let durations: Vec<f64> = stops(result).iter().map(|r| r.duration).collect();
        for pair in durations.windows(2) {
            assert!(pair[1] >= pair[0], "{:?}", durations);
        }
    }

    #[test]
    fn test_thirty_metre_air_dive_clears_short_shallow_stops() {
        // GF low governs the first ceiling check, so this dive is not quite no-stop
        let input = square(30.0, 20.0, vec![Gas::bottom(0.21, 0.0)]);
        let result = plan_dive(&input, &buhlmann_settings(0.7, 0.85), DecoModel::Buhlmann).unwrap();

        assert_eq!(ladder(&result), vec![(6.0, 1.0), (3.0, 4.0)]);
        assert_eq!(result.rows.last().unwrap().kind, RowKind::Surface);
        assert_eq!(result.rows.last().unwrap().depth, 0.0);
    }

    #[test]
    fn test_trimix_dive_switches_to_ean50() {
        let result = plan_dive(
            &scenario_b_input(),
            &buhlmann_settings(0.2, 0.85),
            DecoModel::Buhlmann,
        )
        .unwrap();
        let stops = stops(&result);
        let depths: Vec<f64> = stops.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![27.0, 24.0, 21.0, 18.0, 15.0, 12.0, 9.0, 6.0, 3.0]);

        // the switch happens on arrival at 21 m
        let gases: Vec<&str> = stops.iter().map(|r| r.gas.as_str()).collect();
        assert_eq!(&gases[..2], &["21/35", "21/35"]);
        assert!(gases[2..].iter().all(|g| *g == "EAN50"));

        assert_non_decreasing(&result);
        assert!(stops.iter().all(|r| r.duration >= 1.0 && r.duration.fract() == 0.0));
        assert!(result.summary.total_deco_time > 0.0);
        assert!(result.summary.offgassing_starts_at.unwrap() > stops[0].depth);
    }

    #[test]
    fn test_vpm_trimix_dive_converges() {
        let mut settings = Settings::default();
        settings.vpm.conservatism = 2;
        let result = plan_dive(&scenario_b_input(), &settings, DecoModel::Vpm).unwrap();

        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        let stops = stops(&result);
        assert!(!stops.is_empty());
        assert_eq!(stops.last().unwrap().depth, 3.0);
        assert_non_decreasing(&result);
        assert!(result.bubbles.is_some());
        assert!(result.rows.iter().all(|r| r.gf.is_none()));
    }

    #[test]
    fn test_vpm_deco_grows_with_conservatism() {
        let deco = |level: u8| {
            let mut settings = Settings::default();
            settings.vpm.conservatism = level;
            let result = plan_dive(&scenario_b_input(), &settings, DecoModel::Vpm).unwrap();
            assert_non_decreasing(&result);
            result.summary.total_deco_time
        };
        let buhlmann = plan_dive(
            &scenario_b_input(),
            &buhlmann_settings(0.2, 0.85),
            DecoModel::Buhlmann,
        )
        .unwrap()
        .summary
        .total_deco_time;

        let (low, mid, high) = (deco(0), deco(2), deco(4));
        assert!(low < mid && mid < high, "{} {} {}", low, mid, high);
        // GF 20/85 is deep-stop heavy; the bubble model overtakes it at the top levels
        assert!(high > buhlmann, "{} vs {}", high, buhlmann);
    }

    #[test]
    fn test_bad_min_stop_time_is_rejected() {
        for minutes in [-1.0, 0.0, f64::NAN] {
            let input = square(
                51.0,
                25.0,
                vec![
                    Gas::bottom(0.21, 0.35),
                    Gas {
                        min_stop_time: Some(minutes),
                        ..Gas::decompression(0.5, 0.0, 21.0)
                    },
                ],
            );
            let result = plan_dive(&input, &buhlmann_settings(0.2, 0.85), DecoModel::Buhlmann);
            assert!(matches!(result, Err(Error::InvalidPlan(_))), "{}", minutes);
        }
    }

    #[test]
    fn test_bad_settings_are_rejected_before_planning() {
        let mut settings = Settings::default();
        settings.ascent.min_stop_time = 0.0;
        let result = plan_dive(&scenario_b_input(), &settings, DecoModel::Buhlmann);
        assert!(matches!(result, Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.ascent.stop_interval = -3.0;
        let result = plan_dive(&scenario_b_input(), &settings, DecoModel::Vpm);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_identical_inputs_give_identical_schedules() {
        let settings = buhlmann_settings(0.3, 0.8);
        let a = plan_dive(&scenario_b_input(), &settings, DecoModel::Buhlmann).unwrap();
        let b = plan_dive(&scenario_b_input(), &settings, DecoModel::Buhlmann).unwrap();
        assert_eq!(a, b);

        let a = plan_dive(&scenario_b_input(), &settings, DecoModel::Vpm).unwrap();
        let b = plan_dive(&scenario_b_input(), &settings, DecoModel::Vpm).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_runtime_is_monotonic_and_segments_chain() {
        let result = plan_dive(
            &scenario_b_input(),
            &buhlmann_settings(0.3, 0.8),
            DecoModel::Buhlmann,
        )
        .unwrap();
        for pair in result.segments.windows(2) {
            assert!(pair[1].start_runtime >= pair[0].start_runtime - 1e-9);
            assert!((pair[1].start_depth - pair[0].end_depth).abs() < 1e-9);
        }
        assert!(result.segments.iter().all(|s| s.tissues.is_some()));
        assert_eq!(result.segments.last().unwrap().end_depth, 0.0);
    }

    #[test]
    fn test_hopeless_gradient_factor_is_infeasible() {
        let input = square(
            60.0,
            40.0,
            vec![Gas::bottom(0.21, 0.0)],
        );
        let result = plan_dive(&input, &buhlmann_settings(0.02, 0.05), DecoModel::Buhlmann);
        assert!(matches!(result, Err(Error::Infeasible { .. })));
    }

    #[test]
    fn test_multilevel_ascent_shifts_following_segments() {
        let gases = vec![Gas::bottom(0.21, 0.0)];
        let segments = vec![
            DiveSegment::transit(0.0, 45.0, 0),
            DiveSegment::level(45.0, 30.0, 0),
            DiveSegment::transit(45.0, 6.0, 0),
            DiveSegment::level(6.0, 5.0, 0),
        ];
        let input = DiveInput {
            gases,
            segments,
            initial: None,
        };
        let result = plan_dive(&input, &buhlmann_settings(0.3, 0.85), DecoModel::Buhlmann).unwrap();
        let level = result
            .rows
            .iter()
            .filter(|r| r.kind == RowKind::Level)
            .last()
            .unwrap();
        assert_eq!(level.depth, 6.0);
        let deeper_stops = stops(&result).iter().filter(|r| r.depth > 6.0).count();
        assert!(deeper_stops > 0);
        // the 6 m level starts after the inserted stops
        let last_deep = stops(&result)
            .into_iter()
            .filter(|r| r.depth > 6.0)
            .last()
            .unwrap()
            .end_runtime;
        assert!(level.start_runtime >= last_deep - 1e-9);
    }

    #[test]
    fn test_repetitive_dive_is_longer() {
        let settings = buhlmann_settings(0.3, 0.85);
        let input = square(40.0, 25.0, vec![Gas::bottom(0.21, 0.0)]);
        let first = plan_dive(&input, &settings, DecoModel::Buhlmann).unwrap();

        let mut second_input = input.clone();
        second_input.initial = Some(first.final_state());
        let second = plan_dive(&second_input, &settings, DecoModel::Buhlmann).unwrap();
        assert!(second.summary.total_deco_time > first.summary.total_deco_time);
    }
}
