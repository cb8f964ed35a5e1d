//! Bühlmann ZH-L16 calculations with gradient factors.
//!
//! Everything here is a pure function of a tissue snapshot; the planner in
//! `buhlmann_planner` decides when to call what.

use crate::config::ZhlVariant;
use crate::schedule::{time_to_next_step, StopTime, ZoneStart};
use crate::solver::{bisect, Bisection};
use crate::tissue::{Environment, Tissues, Transit, COMPARTMENTS};
use crate::types::Gas;
use crate::{Error, Result};

/// Longest single stop before the schedule is declared unworkable
pub const MAX_STOP_MINUTES: f64 = 1440.0;

// a-coefficients are tabulated in bar
const N2_A_ZHL16C: [f64; COMPARTMENTS] = [
    1.1696, 1.0, 0.8618, 0.7562, 0.62, 0.5043, 0.441, 0.4, 0.375, 0.35, 0.3295, 0.3065, 0.2835,
    0.261, 0.248, 0.2327,
];
const N2_A_ZHL16B: [f64; COMPARTMENTS] = [
    1.1696, 1.0, 0.8618, 0.7562, 0.6667, 0.56, 0.4947, 0.45, 0.4187, 0.3798, 0.3497, 0.3223,
    0.285, 0.2737, 0.2523, 0.2327,
];
const N2_B: [f64; COMPARTMENTS] = [
    0.5578, 0.6514, 0.7222, 0.7825, 0.8126, 0.8434, 0.8693, 0.891, 0.9092, 0.9222, 0.9319, 0.9403,
    0.9477, 0.9544, 0.9602, 0.9653,
];
const HE_A: [f64; COMPARTMENTS] = [
    1.6189, 1.383, 1.1919, 1.0458, 0.922, 0.8205, 0.7305, 0.6502, 0.595, 0.5545, 0.5333, 0.5189,
    0.5181, 0.5176, 0.5172, 0.5119,
];
const HE_B: [f64; COMPARTMENTS] = [
    0.477, 0.5747, 0.6527, 0.7223, 0.7582, 0.7957, 0.8279, 0.8553, 0.8757, 0.8903, 0.8997, 0.9073,
    0.9122, 0.9171, 0.9217, 0.9267,
];

/// M-value coefficients, a in msw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    pub n2_a: [f64; COMPARTMENTS],
    pub n2_b: [f64; COMPARTMENTS],
    pub he_a: [f64; COMPARTMENTS],
    pub he_b: [f64; COMPARTMENTS],
}

impl Coefficients {
    pub fn for_variant(variant: ZhlVariant) -> Self {
        let n2_a_bar = match variant {
            ZhlVariant::Zhl16b => &N2_A_ZHL16B,
            ZhlVariant::Zhl16c => &N2_A_ZHL16C,
        };
        Self {
            n2_a: n2_a_bar.map(|a| a * 10.0),
            n2_b: N2_B,
            he_a: HE_A.map(|a| a * 10.0),
            he_b: HE_B,
        }
    }

    /// a and b weighted by the two gas pressures
    pub fn blended(&self, i: usize, n2: f64, he: f64) -> (f64, f64) {
        let total = n2 + he;
        if total <= 0.0 {
            return (self.n2_a[i], self.n2_b[i]);
        }
        (
            (n2 * self.n2_a[i] + he * self.he_a[i]) / total,
            (n2 * self.n2_b[i] + he * self.he_b[i]) / total,
        )
    }

    /// Highest inert pressure compartment `i` may carry at `ambient`
    pub fn allowable_loading(&self, i: usize, n2: f64, he: f64, ambient: f64, gf: f64) -> f64 {
        let (a, b) = self.blended(i, n2, he);
        ambient * (gf / b - gf + 1.0) + gf * a
    }
}

/// Gradient factor line from GF low at the first stop to GF high at the surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientFactors {
    pub low: f64,
    pub high: f64,
    /// Fixed once the first stop is known
    pub slope: Option<f64>,
    pub current: f64,
}

impl GradientFactors {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            slope: None,
            current: low,
        }
    }

    /// GF to apply when the ceiling is checked against `depth`
    pub fn at(&self, depth: f64) -> f64 {
        match self.slope {
            Some(slope) => slope * depth + self.high,
            None => self.low,
        }
    }

    pub fn fix_slope(&mut self, first_stop: f64) {
        if self.slope.is_none() && first_stop > 0.0 {
            self.slope = Some((self.high - self.low) / (0.0 - first_stop));
        }
    }

    pub fn reset(&mut self) {
        self.slope = None;
        self.current = self.low;
    }
}

/// Shallowest depth the tissues tolerate at gradient factor `gf`; may be negative
pub fn ceiling(tissues: &Tissues, coefficients: &Coefficients, gf: f64, env: &Environment) -> f64 {
    let compartment = |i: usize| {
        let (a, b) = coefficients.blended(i, tissues.n2[i], tissues.he[i]);
        let tolerated = ((tissues.load(i) - a * gf) / (gf / b - gf + 1.0)).max(0.0);
        tolerated - env.surface_pressure
    };
    (1..COMPARTMENTS).fold(compartment(0), |deepest, i| deepest.max(compartment(i)))
}

/// Depth on the way up at which the first compartment starts to off-gas
pub fn deco_zone_start(
    tissues: &Tissues,
    gas: &Gas,
    start_depth: f64,
    ascent_rate: f64,
    env: &Environment,
) -> ZoneStart {
    let start_ambient = env.ambient(start_depth);
    let transit = Transit::with_signed_rate(gas, start_depth, -ascent_rate, env);
    let high = start_ambient / ascent_rate;

    let mut depth: f64 = 0.0;
    let mut converged = true;
    for i in 0..COMPARTMENTS {
        let result = bisect(
            |t| {
                let (n2, he) = transit.loads(tissues, i, t);
                n2 + he - (start_ambient - ascent_rate * t)
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
/// no longer takes any compartment past its allowable loading.
#[allow(clippy::too_many_arguments)]
pub fn projected_ascent(
    tissues: &Tissues,
    gas: &Gas,
    coefficients: &Coefficients,
    gf: f64,
    start_depth: f64,
    stop: f64,
    ascent_rate: f64,
    interval: f64,
    env: &Environment,
) -> f64 {
    let transit = Transit::with_signed_rate(gas, start_depth, -ascent_rate, env);
    let mut stop = stop;
    while stop < start_depth {
        let t = transit.duration(start_depth, stop);
        let ambient = env.ambient(stop);
        let violated = (0..COMPARTMENTS).any(|i| {
            let (n2, he) = transit.loads(tissues, i, t);
            n2 + he > coefficients.allowable_loading(i, n2, he, ambient, gf)
        });
        if !violated {
            return stop;
        }
        stop += interval;
    }
    start_depth
}

/// Time at `stop` until the ceiling clears `next_stop` at gradient factor `gf`.
///
/// The first increment ends on the next multiple of `min_stop` after `runtime`.
/// The stop lasts at least `hold` minutes.
#[allow(clippy::too_many_arguments)]
pub fn stop_time(
    tissues: &Tissues,
    gas: &Gas,
    coefficients: &Coefficients,
    gf: f64,
    stop: f64,
    next_stop: f64,
    runtime: f64,
    min_stop: f64,
    hold: f64,
    env: &Environment,
) -> Result<StopTime> {
    let n2_inspired = env.inspired(stop, gas.n2());
    let he_inspired = env.inspired(stop, gas.he);
    let next_ambient = env.ambient(next_stop);
    if n2_inspired + he_inspired > 0.0 {
        for i in 0..COMPARTMENTS {
            let allowable =
                coefficients.allowable_loading(i, n2_inspired, he_inspired, next_ambient, gf);
            if n2_inspired + he_inspired > allowable {
                return Err(Error::infeasible(
                    stop,
                    format!(
                        "off-gassing gradient too small to reach {} m; raise GF low or use a richer deco gas",
                        next_stop
                    ),
                ));
            }
        }
    }

    let mut minutes = time_to_next_step(runtime, min_stop);
    let mut candidate = *tissues;
    candidate.constant_depth(gas, stop, env, minutes);
    while round2(ceiling(&candidate, coefficients, gf, env)) > next_stop || minutes + 1.0e-9 < hold {
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

/// Leading compartment position relative to its M-value
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MValueStatus {
    /// (load - ambient) / (M - ambient), highest across compartments
    pub gradient_factor: f64,
    /// load / M, highest across compartments
    pub m_value_fraction: f64,
}

pub fn m_value_status(tissues: &Tissues, coefficients: &Coefficients, ambient: f64) -> MValueStatus {
    let mut status = MValueStatus {
        gradient_factor: -1.0,
        m_value_fraction: -1.0,
    };
    for i in 0..COMPARTMENTS {
        let (a, b) = coefficients.blended(i, tissues.n2[i], tissues.he[i]);
        let m_value = ambient / b + a;
        let load = tissues.load(i);
        status.m_value_fraction = status.m_value_fraction.max(load / m_value);
        status.gradient_factor = status
            .gradient_factor
            .max((load - ambient) / (m_value - ambient));
    }
    status
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
