//! Sixteen-compartment inert gas model.
//!
//! Pressures are in msw. Each compartment tracks a nitrogen and a helium
//! partial pressure advanced with the Haldane (constant depth) or Schreiner
//! (linear depth change) equations.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::types::Gas;

pub const COMPARTMENTS: usize = 16;

/// Nitrogen fraction of air
pub const AIR_N2: f64 = 0.79;

/// msw per standard atmosphere
pub const DEPTH_PER_ATM: f64 = 10.0;

pub const N2_HALF_TIMES: [f64; COMPARTMENTS] = [
    5.0, 8.0, 12.5, 18.5, 27.0, 38.3, 54.3, 77.0, 109.0, 146.0, 187.0, 239.0, 305.0, 390.0, 498.0,
    635.0,
];

pub const HE_HALF_TIMES: [f64; COMPARTMENTS] = [
    1.88, 3.02, 4.72, 6.99, 10.21, 14.48, 20.53, 29.11, 41.20, 55.19, 70.69, 90.34, 115.29, 147.42,
    188.24, 240.03,
];

/// Rate constants `ln 2 / half-time`
pub static N2_K: Lazy<[f64; COMPARTMENTS]> = Lazy::new(|| rate_constants(&N2_HALF_TIMES));
pub static HE_K: Lazy<[f64; COMPARTMENTS]> = Lazy::new(|| rate_constants(&HE_HALF_TIMES));

fn rate_constants(half_times: &[f64; COMPARTMENTS]) -> [f64; COMPARTMENTS] {
    let mut k = [0.0; COMPARTMENTS];
    for (k, half_time) in k.iter_mut().zip(half_times) {
        *k = std::f64::consts::LN_2 / half_time;
    }
    k
}

/// Partial pressure after `t` minutes at a constant inspired pressure
pub fn haldane(initial: f64, inspired: f64, k: f64, t: f64) -> f64 {
    initial + (inspired - initial) * (1.0 - (-k * t).exp())
}

/// Partial pressure after `t` minutes while the inspired pressure changes
/// linearly at `rate` per minute. The sign of `rate` follows the depth change.
pub fn schreiner(inspired0: f64, rate: f64, t: f64, k: f64, initial: f64) -> f64 {
    inspired0 + rate * (t - 1.0 / k) - (inspired0 - initial - rate / k) * (-k * t).exp()
}

/// Surface pressure and the alveolar water vapour pressure a model uses
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Environment {
    pub surface_pressure: f64,
    pub water_vapor: f64,
}

impl Environment {
    pub fn new(surface_pressure: f64, water_vapor: f64) -> Self {
        Self {
            surface_pressure,
            water_vapor,
        }
    }

    pub fn ambient(&self, depth: f64) -> f64 {
        depth + self.surface_pressure
    }

    pub fn inspired(&self, depth: f64, fraction: f64) -> f64 {
        ((self.ambient(depth) - self.water_vapor) * fraction).max(0.0)
    }

    /// Nitrogen pressure breathed at the surface on air
    pub fn surface_inspired_n2(&self) -> f64 {
        (self.surface_pressure - self.water_vapor) * AIR_N2
    }

    /// Ambient pressure in atmospheres
    pub fn ata(&self, depth: f64) -> f64 {
        self.ambient(depth) / self.surface_pressure
    }
}

/// Inspired pressures and their rate of change for one linear depth change
#[derive(Clone, Copy, Debug)]
pub struct Transit {
    pub n2_inspired: f64,
    pub he_inspired: f64,
    pub n2_rate: f64,
    pub he_rate: f64,
    /// Signed depth rate, m/min
    pub depth_rate: f64,
}

impl Transit {
    /// `rate` is the unsigned speed; the sign is taken from the direction
    pub fn new(gas: &Gas, start_depth: f64, end_depth: f64, rate: f64, env: &Environment) -> Self {
        let depth_rate = if end_depth < start_depth { -rate.abs() } else { rate.abs() };
        Self::with_signed_rate(gas, start_depth, depth_rate, env)
    }

    pub fn with_signed_rate(gas: &Gas, start_depth: f64, depth_rate: f64, env: &Environment) -> Self {
        Self {
            n2_inspired: env.inspired(start_depth, gas.n2()),
            he_inspired: env.inspired(start_depth, gas.he),
            n2_rate: depth_rate * gas.n2(),
            he_rate: depth_rate * gas.he,
            depth_rate,
        }
    }

    /// Minutes to travel between two depths
    pub fn duration(&self, start_depth: f64, end_depth: f64) -> f64 {
        if self.depth_rate == 0.0 {
            return 0.0;
        }
        ((end_depth - start_depth) / self.depth_rate).max(0.0)
    }

    /// Compartment `i` pressures `t` minutes into the transit
    pub fn loads(&self, tissues: &Tissues, i: usize, t: f64) -> (f64, f64) {
        let n2 = schreiner(self.n2_inspired, self.n2_rate, t, N2_K[i], tissues.n2[i]);
        let he = schreiner(self.he_inspired, self.he_rate, t, HE_K[i], tissues.he[i]);
        (n2.max(0.0), he.max(0.0))
    }
}

/// Nitrogen and helium partial pressures of all compartments
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tissues {
    pub n2: [f64; COMPARTMENTS],
    pub he: [f64; COMPARTMENTS],
}

impl Tissues {
    /// Compartments equilibrated with air at the surface
    pub fn saturated(env: &Environment) -> Self {
        Self {
            n2: [env.surface_inspired_n2(); COMPARTMENTS],
            he: [0.0; COMPARTMENTS],
        }
    }

    pub fn load(&self, i: usize) -> f64 {
        self.n2[i] + self.he[i]
    }

    /// Breathe `gas` at `depth` for `minutes`
    pub fn constant_depth(&mut self, gas: &Gas, depth: f64, env: &Environment, minutes: f64) {
        if minutes <= 0.0 {
            return;
        }
        let n2_inspired = env.inspired(depth, gas.n2());
        let he_inspired = env.inspired(depth, gas.he);
        for i in 0..COMPARTMENTS {
            self.n2[i] = haldane(self.n2[i], n2_inspired, N2_K[i], minutes);
            self.he[i] = haldane(self.he[i], he_inspired, HE_K[i], minutes);
        }
    }

    /// Move linearly between two depths at `rate` m/min; returns the minutes taken
    pub fn ascent_descent(
        &mut self,
        gas: &Gas,
        start_depth: f64,
        end_depth: f64,
        rate: f64,
        env: &Environment,
    ) -> f64 {
        let transit = Transit::new(gas, start_depth, end_depth, rate, env);
        let t = transit.duration(start_depth, end_depth);
        if t <= 0.0 {
            return 0.0;
        }
        for i in 0..COMPARTMENTS {
            let (n2, he) = transit.loads(self, i, t);
            self.n2[i] = n2;
            self.he[i] = he;
        }
        t
    }
}
