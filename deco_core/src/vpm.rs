//! VPM-B bubble model calculations.
//!
//! Bubble radii and gradients are worked in SI units (metres, pascals) and
//! converted back to msw at the edges. Tissue pressures follow the same
//! Haldane/Schreiner model as the dissolved-gas planner but with the
//! bubble model's own water vapour pressure.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::report::{ReportSink, Warning, WarningKind};
use crate::schedule::{time_to_next_step, StopTime, ZoneStart};
use crate::solver::{bisect, radius_root, Bisection, RootStatus};
use crate::tissue::{Environment, Tissues, Transit, COMPARTMENTS, DEPTH_PER_ATM, HE_K, N2_K};
use crate::types::Gas;
use crate::{Error, Result};

pub const WATER_VAPOR: f64 = 0.493;

const PASCALS_PER_ATM: f64 = 101_325.0;
const FSW_PER_ATM: f64 = 33.0;
const MMHG_PER_ATM: f64 = 760.0;

/// Critical radii in metres before the conservatism multiplier
const CRITICAL_RADIUS_N2: f64 = 0.55e-6;
const CRITICAL_RADIUS_HE: f64 = 0.45e-6;
const CONSERVATISM_MULTIPLIER: [f64; 5] = [1.0, 1.05, 1.12, 1.22, 1.35];

/// Longest single stop before the schedule is declared unworkable
pub const MAX_STOP_MINUTES: f64 = 1440.0;

fn to_pascals(msw: f64) -> f64 {
    msw / DEPTH_PER_ATM * PASCALS_PER_ATM
}

fn from_pascals(pascals: f64) -> f64 {
    pascals / PASCALS_PER_ATM * DEPTH_PER_ATM
}

/// Model constants derived from the settings snapshot
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VpmParameters {
    pub env: Environment,
    /// N/m
    pub surface_tension: f64,
    /// N/m
    pub skin_compression: f64,
    /// Pa·min
    pub lambda_pascals: f64,
    pub regeneration_time_constant: f64,
    /// msw
    pub onset_gradient: f64,
    /// Constant CO2 and O2 tension in the tissues, msw
    pub other_gases: f64,
    pub critical_radius_n2: f64,
    pub critical_radius_he: f64,
    pub critical_volume: bool,
    pub max_iterations: u32,
}

impl VpmParameters {
    pub fn from_settings(settings: &Settings) -> Self {
        let vpm = &settings.vpm;
        let level = usize::from(vpm.conservatism).min(CONSERVATISM_MULTIPLIER.len() - 1);
        let multiplier = CONSERVATISM_MULTIPLIER[level];
        Self {
            env: Environment::new(settings.environment.surface_pressure, WATER_VAPOR),
            surface_tension: vpm.surface_tension,
            skin_compression: vpm.skin_compression,
            lambda_pascals: vpm.lambda / FSW_PER_ATM * PASCALS_PER_ATM,
            regeneration_time_constant: vpm.regeneration_time_constant,
            onset_gradient: vpm.gradient_onset_of_impermeability * DEPTH_PER_ATM,
            other_gases: vpm.other_gases_mmhg / MMHG_PER_ATM * DEPTH_PER_ATM,
            critical_radius_n2: CRITICAL_RADIUS_N2 * multiplier,
            critical_radius_he: CRITICAL_RADIUS_HE * multiplier,
            critical_volume: vpm.critical_volume,
            max_iterations: vpm.max_iterations,
        }
    }

    /// 2(γc − γ), the skin's net compressive coefficient
    fn crush_coefficient(&self) -> f64 {
        2.0 * (self.skin_compression - self.surface_tension)
    }

    /// Gradient in msw a nucleus of `radius` tolerates
    fn gradient_for_radius(&self, radius: f64) -> f64 {
        let gamma = self.surface_tension;
        let gamma_c = self.skin_compression;
        from_pascals(2.0 * gamma * (gamma_c - gamma) / (radius * gamma_c))
    }
}

/// Nuclei state carried across dives of a series
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BubbleState {
    pub initial_radius_n2: [f64; COMPARTMENTS],
    pub initial_radius_he: [f64; COMPARTMENTS],
    pub adjusted_radius_n2: [f64; COMPARTMENTS],
    pub adjusted_radius_he: [f64; COMPARTMENTS],
    /// msw, largest per descent segment (not summed)
    pub max_crushing_n2: [f64; COMPARTMENTS],
    pub max_crushing_he: [f64; COMPARTMENTS],
    /// msw, largest supersaturation seen at any stop
    pub max_actual_gradient: [f64; COMPARTMENTS],
    /// Runtime at which the radii were last regenerated
    pub last_regeneration_runtime: f64,
}

impl BubbleState {
    pub fn new(params: &VpmParameters) -> Self {
        Self {
            initial_radius_n2: [params.critical_radius_n2; COMPARTMENTS],
            initial_radius_he: [params.critical_radius_he; COMPARTMENTS],
            adjusted_radius_n2: [params.critical_radius_n2; COMPARTMENTS],
            adjusted_radius_he: [params.critical_radius_he; COMPARTMENTS],
            max_crushing_n2: [0.0; COMPARTMENTS],
            max_crushing_he: [0.0; COMPARTMENTS],
            max_actual_gradient: [0.0; COMPARTMENTS],
            last_regeneration_runtime: 0.0,
        }
    }
}

/// Allowable supersaturation per compartment and gas, msw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gradients {
    pub n2: [f64; COMPARTMENTS],
    pub he: [f64; COMPARTMENTS],
}

impl Gradients {
    /// Gradient weighted by the two gas pressures
    fn weighted(&self, i: usize, n2: f64, he: f64) -> f64 {
        let total = n2 + he;
        if total > 0.0 {
            (self.he[i] * he + self.n2[i] * n2) / total
        } else {
            self.he[i].min(self.n2[i])
        }
    }
}

/// Radii after crushing and partial regrowth
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Regeneration {
    pub radius_n2: [f64; COMPARTMENTS],
    pub radius_he: [f64; COMPARTMENTS],
    /// Crushing pressure that would have produced these radii without regrowth, msw
    pub adjusted_crushing_n2: [f64; COMPARTMENTS],
    pub adjusted_crushing_he: [f64; COMPARTMENTS],
}

/// Crushed radii regrown for `dive_time` minutes
pub fn regenerate(state: &BubbleState, params: &VpmParameters, dive_time: f64) -> Regeneration {
    let gc = params.crush_coefficient();
    let decay = (-dive_time / params.regeneration_time_constant).exp();
    let regrow = |crushing: f64, adjusted: f64| -> (f64, f64) {
        let crushing_pa = to_pascals(crushing);
        let ending = 1.0 / (crushing_pa / gc + 1.0 / adjusted);
        let regenerated = adjusted + (ending - adjusted) * decay;
        let denominator = regenerated * (adjusted - ending);
        let adjusted_crushing = if crushing_pa == 0.0 || denominator == 0.0 {
            0.0
        } else {
            let ratio = ending * (adjusted - regenerated) / denominator;
            from_pascals(crushing_pa * ratio)
        };
        (regenerated, adjusted_crushing)
    };

    let mut regen = Regeneration {
        radius_n2: [0.0; COMPARTMENTS],
        radius_he: [0.0; COMPARTMENTS],
        adjusted_crushing_n2: [0.0; COMPARTMENTS],
        adjusted_crushing_he: [0.0; COMPARTMENTS],
    };
    for i in 0..COMPARTMENTS {
        let (r, c) = regrow(state.max_crushing_n2[i], state.adjusted_radius_n2[i]);
        regen.radius_n2[i] = r;
        regen.adjusted_crushing_n2[i] = c;
        let (r, c) = regrow(state.max_crushing_he[i], state.adjusted_radius_he[i]);
        regen.radius_he[i] = r;
        regen.adjusted_crushing_he[i] = c;
    }
    regen
}

pub fn initial_allowable_gradients(regen: &Regeneration, params: &VpmParameters) -> Gradients {
    Gradients {
        n2: regen.radius_n2.map(|r| params.gradient_for_radius(r)),
        he: regen.radius_he.map(|r| params.gradient_for_radius(r)),
    }
}

/// Shallowest depth the tissues tolerate with `gradients`; may be negative
pub fn ceiling(tissues: &Tissues, gradients: &Gradients, params: &VpmParameters) -> f64 {
    let compartment = |i: usize| {
        let load = tissues.load(i);
        let weighted = gradients.weighted(i, tissues.n2[i], tissues.he[i]);
        let tolerated = if load > 0.0 {
            load + params.other_gases - weighted
        } else {
            params.other_gases - weighted
        };
        tolerated.max(0.0) - params.env.surface_pressure
    };
    (1..COMPARTMENTS).fold(compartment(0), |deepest, i| deepest.max(compartment(i)))
}

/// Depth on the way up at which the first compartment starts to off-gas
pub fn deco_zone_start(
    tissues: &Tissues,
    gas: &Gas,
    start_depth: f64,
    ascent_rate: f64,
    params: &VpmParameters,
) -> ZoneStart {
    let env = &params.env;
    let start_ambient = env.ambient(start_depth);
    let transit = Transit::with_signed_rate(gas, start_depth, -ascent_rate, env);
    let high = start_ambient / ascent_rate;

    let mut depth: f64 = 0.0;
    let mut converged = true;
    for i in 0..COMPARTMENTS {
        let result = bisect(
            |t| {
                let (n2, he) = transit.loads(tissues, i, t);
                n2 + he + params.other_gases - (start_ambient - ascent_rate * t)
            },
            0.0,
            high,
        );
        let t = match result {
            Bisection::Converged(t) => t,
            Bisection::IterationLimit(t) => {
                converged = false;
                t
            }
            Bisection::NoBracket => {
                return ZoneStart {
                    depth: start_depth,
                    converged,
                }
            }
        };
        depth = depth.max(start_ambient - ascent_rate * t - env.surface_pressure);
    }
    ZoneStart { depth, converged }
}

/// Push `stop` deeper by `interval` until ascending to it from `start_depth`
/// keeps every compartment within `gradients`.
#[allow(clippy::too_many_arguments)]
pub fn projected_ascent(
    tissues: &Tissues,
    gas: &Gas,
    gradients: &Gradients,
    start_depth: f64,
    stop: f64,
    ascent_rate: f64,
    interval: f64,
    params: &VpmParameters,
) -> f64 {
    let env = &params.env;
    let transit = Transit::with_signed_rate(gas, start_depth, -ascent_rate, env);
    let mut stop = stop;
    while stop < start_depth {
        let t = transit.duration(start_depth, stop);
        let ambient = env.ambient(stop);
        let violated = (0..COMPARTMENTS).any(|i| {
            let (n2, he) = transit.loads(tissues, i, t);
            let allowable = ambient + gradients.weighted(i, n2, he) - params.other_gases;
            n2 + he > allowable
        });
        if !violated {
            return stop;
        }
        stop += interval;
    }
    start_depth
}

/// Shrink the allowable gradients for a shallower stop as the bubbles
/// expand on the way up from the first stop.
pub fn boyles_law_compensation(
    first_stop: f64,
    next_stop: f64,
    allowable: &Gradients,
    params: &VpmParameters,
    sink: &mut dyn ReportSink,
) -> Gradients {
    if next_stop >= first_stop {
        return *allowable;
    }
    let gamma = params.surface_tension;
    let first_pa = to_pascals(params.env.ambient(first_stop));
    let next_pa = to_pascals(params.env.ambient(next_stop));
    let expansion = (first_pa / next_pa).cbrt();

    let mut compensate = |gradient: f64, gas: &str, i: usize| -> f64 {
        let r1 = 2.0 * gamma / to_pascals(gradient);
        let c = (first_pa + 2.0 * gamma / r1) * r1 * r1 * r1;
        let root = radius_root(next_pa, -2.0 * gamma, c, r1, r1 * expansion);
        report_root(sink, root.status, || {
            format!(
                "{} compartment {} bubble radius between {} m and {} m",
                gas,
                i + 1,
                first_stop,
                next_stop
            )
        });
        from_pascals(2.0 * gamma / root.value)
    };

    let mut deco = *allowable;
    for i in 0..COMPARTMENTS {
        deco.he[i] = compensate(allowable.he[i], "He", i);
        deco.n2[i] = compensate(allowable.n2[i], "N2", i);
    }
    deco
}

/// Time at `stop` until the ceiling under `gradients` clears `next_stop`,
/// and at least `hold` minutes
#[allow(clippy::too_many_arguments)]
pub fn stop_time(
    tissues: &Tissues,
    gas: &Gas,
    gradients: &Gradients,
    stop: f64,
    next_stop: f64,
    runtime: f64,
    min_stop: f64,
    hold: f64,
    params: &VpmParameters,
) -> Result<StopTime> {
    let env = &params.env;
    let n2_inspired = env.inspired(stop, gas.n2());
    let he_inspired = env.inspired(stop, gas.he);
    let next_ambient = env.ambient(next_stop);
    for i in 0..COMPARTMENTS {
        let weighted = gradients.weighted(i, n2_inspired, he_inspired);
        if n2_inspired + he_inspired + params.other_gases - weighted > next_ambient {
            return Err(Error::infeasible(
                stop,
                format!(
                    "off-gassing gradient too small to reach {} m; use a richer deco gas or lower conservatism",
                    next_stop
                ),
            ));
        }
    }

    let mut minutes = time_to_next_step(runtime, min_stop);
    let mut candidate = *tissues;
    candidate.constant_depth(gas, stop, env, minutes);
    while ceiling(&candidate, gradients, params) > next_stop || minutes + 1.0e-9 < hold {
        candidate.constant_depth(gas, stop, env, min_stop);
        minutes += min_stop;
        if minutes > MAX_STOP_MINUTES {
            return Err(Error::infeasible(
                stop,
                format!("stop exceeds {} minutes", MAX_STOP_MINUTES),
            ));
        }
    }
    Ok(StopTime {
        minutes,
        tissues: candidate,
    })
}

/// Time-weighted supersaturation after surfacing, per compartment.
///
/// Counts only while the compartment stays above the nitrogen pressure
/// breathed at the surface.
pub fn surface_phase_volume_time(tissues: &Tissues, params: &VpmParameters) -> [f64; COMPARTMENTS] {
    let surface_n2 = params.env.surface_inspired_n2();
    let mut pvt = [0.0; COMPARTMENTS];
    for i in 0..COMPARTMENTS {
        let n2 = tissues.n2[i];
        let he = tissues.he[i];
        let excess = he + n2 - surface_n2;
        pvt[i] = if n2 > surface_n2 {
            (he / HE_K[i] + (n2 - surface_n2) / N2_K[i]) / excess
        } else if he > 0.0 && excess > 0.0 {
            let decay = 1.0 / (N2_K[i] - HE_K[i]) * ((surface_n2 - n2) / he).ln();
            let integral = he / HE_K[i] * (1.0 - (-HE_K[i] * decay).exp())
                + (n2 - surface_n2) / N2_K[i] * (1.0 - (-N2_K[i] * decay).exp());
            integral / excess
        } else {
            0.0
        };
    }
    pvt
}

/// Relax the initial gradients for a schedule with phase volume times `pvt`
pub fn critical_volume(
    initial: &Gradients,
    regen: &Regeneration,
    pvt: &[f64; COMPARTMENTS],
    params: &VpmParameters,
) -> Gradients {
    let gamma = params.surface_tension;
    let gamma_c = params.skin_compression;
    let lambda = params.lambda_pascals;
    let relax = |initial: f64, adjusted_crushing: f64, pvt: f64| -> f64 {
        if pvt <= 0.0 {
            return initial;
        }
        let b = to_pascals(initial) + lambda * gamma / (gamma_c * pvt);
        let c = gamma * (gamma * (lambda * to_pascals(adjusted_crushing))) / (gamma_c * (gamma_c * pvt));
        let discriminant = (b * b - 4.0 * c).max(0.0);
        from_pascals((b + discriminant.sqrt()) / 2.0)
    };

    let mut relaxed = *initial;
    for i in 0..COMPARTMENTS {
        relaxed.he[i] = relax(initial.he[i], regen.adjusted_crushing_he[i], pvt[i]);
        relaxed.n2[i] = relax(initial.n2[i], regen.adjusted_crushing_n2[i], pvt[i]);
    }
    relaxed
}

/// Fold the supersaturation on arrival at `stop` into the running maximum
pub fn update_max_actual_gradient(
    max: &mut [f64; COMPARTMENTS],
    tissues: &Tissues,
    stop: f64,
    params: &VpmParameters,
) {
    let ambient = params.env.ambient(stop);
    for (i, max) in max.iter_mut().enumerate() {
        let gradient = (tissues.load(i) + params.other_gases - ambient).max(0.0);
        *max = max.max(gradient);
    }
}

/// Record the crushing pressure of a descent from `start_depth` to `end_depth`.
///
/// `before` and `after` are the tissues at the two ends of the descent.
#[allow(clippy::too_many_arguments)]
pub fn crushing_pressure(
    state: &mut BubbleState,
    before: &Tissues,
    after: &Tissues,
    gas: &Gas,
    start_depth: f64,
    end_depth: f64,
    rate: f64,
    params: &VpmParameters,
    sink: &mut dyn ReportSink,
) {
    let env = &params.env;
    let gc = params.crush_coefficient();
    let onset = params.onset_gradient;
    let onset_pa = to_pascals(onset);
    let start_ambient = env.ambient(start_depth);
    let end_ambient = env.ambient(end_depth);
    let transit = Transit::new(gas, start_depth, end_depth, rate, env);
    let duration = transit.duration(start_depth, end_depth);

    for i in 0..COMPARTMENTS {
        let start_tension = before.load(i) + params.other_gases;
        let end_tension = after.load(i) + params.other_gases;
        let start_gradient = start_ambient - start_tension;
        let end_gradient = end_ambient - end_tension;

        let (crushing_n2, crushing_he) = if end_gradient <= onset {
            (end_gradient, end_gradient)
        } else {
            let (onset_ambient, onset_tension) = if start_gradient >= onset {
                (start_ambient, start_tension)
            } else {
                let tension_at = |t: f64| {
                    let (n2, he) = transit.loads(before, i, t);
                    n2 + he + params.other_gases
                };
                let result = bisect(
                    |t| start_ambient + transit.depth_rate * t - tension_at(t) - onset,
                    0.0,
                    duration,
                );
                match result.value() {
                    Some(t) => {
                        if let Bisection::IterationLimit(_) = result {
                            sink.report(Warning::new(
                                WarningKind::IterationLimit,
                                format!("onset of impermeability search for compartment {}", i + 1),
                            ));
                        }
                        (start_ambient + transit.depth_rate * t, tension_at(t))
                    }
                    None => {
                        sink.report(Warning::new(
                            WarningKind::OnsetOfImpermeability,
                            format!(
                                "compartment {}: no onset of impermeability between {} m and {} m",
                                i + 1,
                                start_depth,
                                end_depth
                            ),
                        ));
                        (start_ambient, start_tension)
                    }
                }
            };

            let end_pa = to_pascals(end_ambient);
            let onset_ambient_pa = to_pascals(onset_ambient);
            let onset_tension_pa = to_pascals(onset_tension);
            let mut impermeable = |adjusted_radius: f64, gas: &str| -> f64 {
                let onset_radius = 1.0 / (onset_pa / gc + 1.0 / adjusted_radius);
                let a = end_pa - onset_ambient_pa + onset_tension_pa + gc / onset_radius;
                let c = onset_tension_pa * onset_radius.powi(3);
                let root = radius_root(a, gc, c, gc / a, onset_radius);
                report_root(sink, root.status, || {
                    format!("{} compartment {} crushed radius", gas, i + 1)
                });
                let crushing_pa = onset_pa + end_pa - onset_ambient_pa
                    + onset_tension_pa * (1.0 - onset_radius.powi(3) / root.value.powi(3));
                from_pascals(crushing_pa)
            };
            (
                impermeable(state.adjusted_radius_n2[i], "N2"),
                impermeable(state.adjusted_radius_he[i], "He"),
            )
        };

        state.max_crushing_n2[i] = state.max_crushing_n2[i].max(crushing_n2);
        state.max_crushing_he[i] = state.max_crushing_he[i].max(crushing_he);
    }
}

/// Shrink or keep the radii for the next dive after `surface_interval`
/// minutes, then clear the per-dive maxima.
pub fn repetitive_adjustment(state: &mut BubbleState, params: &VpmParameters, surface_interval: f64) {
    let regen = regenerate(state, params, state.last_regeneration_runtime);
    let initial = initial_allowable_gradients(&regen, params);
    let gamma = params.surface_tension;
    let gamma_c = params.skin_compression;
    let decay = (-surface_interval / params.regeneration_time_constant).exp();

    for i in 0..COMPARTMENTS {
        let max_actual = state.max_actual_gradient[i];
        let max_actual_pa = to_pascals(max_actual);
        let adjust = |initial_radius: f64, initial_gradient: f64, adjusted_crushing: f64| -> f64 {
            if max_actual > initial_gradient {
                let new_radius = 2.0 * gamma * (gamma_c - gamma)
                    / (max_actual_pa * gamma_c - gamma * to_pascals(adjusted_crushing));
                initial_radius + (initial_radius - new_radius) * decay
            } else {
                initial_radius
            }
        };
        state.adjusted_radius_n2[i] =
            adjust(state.initial_radius_n2[i], initial.n2[i], regen.adjusted_crushing_n2[i]);
        state.adjusted_radius_he[i] =
            adjust(state.initial_radius_he[i], initial.he[i], regen.adjusted_crushing_he[i]);
    }

    state.max_crushing_n2 = [0.0; COMPARTMENTS];
    state.max_crushing_he = [0.0; COMPARTMENTS];
    state.max_actual_gradient = [0.0; COMPARTMENTS];
}

fn report_root(sink: &mut dyn ReportSink, status: RootStatus, context: impl FnOnce() -> String) {
    let kind = match status {
        RootStatus::Converged => return,
        RootStatus::BracketViolation => WarningKind::BracketViolation,
        RootStatus::IterationLimit => WarningKind::IterationLimit,
    };
    sink.report(Warning::new(kind, context()));
}
