//! Surface intervals between repetitive dives.
//!
//! The diver breathes air at the surface. Bühlmann tissues off-gas with
//! half-times stretched over the first three hours; VPM tissues follow the
//! plain exponential and the bubble radii are adjusted for the next dive.
//! CNS loading clears with a 90-minute half-time.

use crate::config::Settings;
use crate::engine::InitialState;
use crate::tissue::{haldane, Environment, Tissues, COMPARTMENTS, HE_K, N2_K};
use crate::types::{DecoModel, Gas};
use crate::vpm::{self, VpmParameters};

/// Minutes after which the off-gassing rate is back to its steady value
const SLOW_PHASE_END: u32 = 180;

/// Fraction of the nominal rate constant used during surface minute `minute`
fn rate_multiplier(minute: u32) -> f64 {
    let i = f64::from(minute);
    match minute {
        0..=44 => 0.9 - 0.005555 * i,
        45..=59 => 0.65,
        60..=179 => 0.65 + 0.0020833 * (i - 60.0),
        _ => 0.9,
    }
}

/// Bühlmann off-gassing on air for exactly `minutes`
pub fn offgas_buhlmann(tissues: &Tissues, env: &Environment, minutes: u32) -> Tissues {
    let n2_inspired = env.surface_inspired_n2();
    let mut result = *tissues;
    let step = |result: &mut Tissues, multiplier: f64, t: f64| {
        for i in 0..COMPARTMENTS {
            result.n2[i] = haldane(result.n2[i], n2_inspired, multiplier * N2_K[i], t);
            result.he[i] = haldane(result.he[i], 0.0, multiplier * HE_K[i], t);
        }
    };

    for minute in 0..minutes.min(SLOW_PHASE_END) {
        step(&mut result, rate_multiplier(minute), 1.0);
    }
    if minutes > SLOW_PHASE_END {
        step(&mut result, rate_multiplier(SLOW_PHASE_END), f64::from(minutes - SLOW_PHASE_END));
    }
    result
}

/// Starting state for the next dive after `minutes` at the surface
pub fn after_surface_interval(
    previous: &InitialState,
    model: DecoModel,
    settings: &Settings,
    minutes: u32,
) -> InitialState {
    let oxygen = previous.oxygen.after_surface_interval(f64::from(minutes));
    match model {
        DecoModel::Buhlmann => {
            let env = Environment::new(
                settings.environment.surface_pressure,
                settings.environment.water_vapor_pressure,
            );
            InitialState {
                tissues: offgas_buhlmann(&previous.tissues, &env, minutes),
                oxygen,
                bubbles: previous.bubbles.clone(),
            }
        }
        DecoModel::Vpm => {
            let params = VpmParameters::from_settings(settings);
            let mut tissues = previous.tissues;
            tissues.constant_depth(&Gas::bottom(0.21, 0.0), 0.0, &params.env, f64::from(minutes));
            let bubbles = previous.bubbles.clone().map(|mut state| {
                vpm::repetitive_adjustment(&mut state, &params, f64::from(minutes));
                state
            });
            tracing::debug!("Surface interval of {} min applied to VPM state", minutes);
            InitialState {
                tissues,
                oxygen,
                bubbles,
            }
        }
    }
}
