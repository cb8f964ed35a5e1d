//! Stop layout and gas selection shared by both planners.

use crate::config::Settings;
use crate::tissue::Tissues;
use crate::types::Gas;

/// Stops at or above this depth use 1 m spacing when fine spacing is on
const FINE_INTERVAL_FROM: f64 = 9.0;
const FINE_INTERVAL: f64 = 1.0;

/// Minutes from `runtime` to the next whole multiple of `step`.
///
/// Always strictly positive: a runtime already on a boundary waits a full step.
pub fn time_to_next_step(runtime: f64, step: f64) -> f64 {
    // absorb float noise such as 11.999999999
    let steps = ((runtime + 1.0e-9) / step).floor();
    (steps + 1.0) * step - runtime
}

/// Where the leading compartment starts to off-gas on a direct ascent
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneStart {
    pub depth: f64,
    /// False when a compartment's search hit the iteration cap
    pub converged: bool,
}

/// Result of timing one stop: the minutes needed and the tissues after them
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StopTime {
    pub minutes: f64,
    pub tissues: Tissues,
}

/// Spacing of decompression stops
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StopLayout {
    pub interval: f64,
    pub last_stop_double: bool,
    pub shallow_fine: bool,
}

impl StopLayout {
    pub fn new(settings: &Settings, fine_allowed: bool) -> Self {
        Self {
            interval: settings.ascent.stop_interval,
            last_stop_double: settings.ascent.last_stop_double_interval,
            shallow_fine: fine_allowed && settings.ascent.shallow_fine_interval,
        }
    }

    /// Distance to the next stop when leaving `stop`
    pub fn step_from(&self, stop: f64) -> f64 {
        if self.last_stop_double && stop == 2.0 * self.interval {
            stop
        } else if self.shallow_fine && stop <= FINE_INTERVAL_FROM {
            FINE_INTERVAL
        } else {
            self.interval
        }
    }

    /// Next stop after `stop`, never shallower than `ending`
    pub fn next_stop(&self, stop: f64, ending: f64) -> f64 {
        (stop - self.step_from(stop)).max(ending)
    }

    /// Deepest whole-interval depth at or below `ceiling`
    pub fn round_up(&self, ceiling: f64) -> f64 {
        if ceiling <= 0.0 {
            0.0
        } else {
            (ceiling / self.interval).ceil() * self.interval
        }
    }
}

/// Minutes a stop row shows.
///
/// The first stop is a whole number of minimum stop increments; later stops
/// include the ascent leading to them.
pub fn shown_stop_minutes(first: bool, ascent_duration: f64, minutes: f64, min_stop: f64) -> f64 {
    if first {
        let shown = if minutes.fract() == 0.0 {
            minutes
        } else {
            (minutes / min_stop).ceil() * min_stop
        };
        round1(shown)
    } else {
        round1(minutes + ascent_duration)
    }
}

/// Displayed start, duration and end of a stop row.
///
/// The first stop row ends when the stop ends; later rows start when the
/// ascent leading to them starts.
pub fn stop_row_timing(
    first: bool,
    ascent_start: f64,
    ascent_duration: f64,
    ascent_end: f64,
    minutes: f64,
    min_stop: f64,
) -> (f64, f64, f64) {
    let end = ascent_end + minutes;
    let shown = shown_stop_minutes(first, ascent_duration, minutes, min_stop);
    let start = if first { end - shown } else { ascent_start };
    (start, shown, end)
}

/// Keeps stop rows from getting shorter on the way up.
///
/// Each stop is held at least as long as the row shown for the stop below it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StopLadder {
    longest: f64,
    first: bool,
}

impl StopLadder {
    pub fn new() -> Self {
        Self {
            longest: 0.0,
            first: true,
        }
    }

    pub fn is_first(&self) -> bool {
        self.first
    }

    /// Minimum minutes at the next stop when reaching it takes `ascent_duration`
    pub fn hold(&self, ascent_duration: f64) -> f64 {
        if self.first {
            0.0
        } else {
            (self.longest - ascent_duration).max(0.0)
        }
    }

    /// Record a stop and return the minutes its row shows
    pub fn record(&mut self, ascent_duration: f64, minutes: f64, min_stop: f64) -> f64 {
        let shown = shown_stop_minutes(self.first, ascent_duration, minutes, min_stop);
        self.longest = self.longest.max(shown);
        self.first = false;
        shown
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Decompression gas to switch to on arrival at `stop`, if any.
///
/// A gas qualifies when the stop is within its switch depth, it is not the
/// one being breathed, and it is shallower-rated than a deco gas already in
/// use. The shallowest qualifying gas wins.
pub fn select_switch(gases: &[Gas], active: usize, stop: f64) -> Option<usize> {
    let current = gases.get(active)?;
    gases
        .iter()
        .enumerate()
        .filter(|(i, gas)| {
            *i != active
                && !gas.is_bottom()
                && stop <= gas.switch_depth
                && (current.is_bottom() || gas.switch_depth < current.switch_depth)
        })
        .min_by(|(_, a), (_, b)| a.switch_depth.total_cmp(&b.switch_depth))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gases() -> Vec<Gas> {
        vec![
            Gas::bottom(0.21, 0.35),
            Gas::decompression(0.5, 0.0, 21.0),
            Gas::decompression(1.0, 0.0, 6.0),
        ]
    }

    #[test]
    fn test_time_to_next_step() {
        assert!((time_to_next_step(34.5, 1.0) - 0.5).abs() < 1e-12);
        assert!((time_to_next_step(35.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((time_to_next_step(11.999_999_999_9, 1.0) - 1.0).abs() < 1e-6);
        assert!((time_to_next_step(7.0, 2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stop_row_timing() {
        // first stop: 2.5 minutes shown as 3, ending with the stop
        let (start, duration, end) = stop_row_timing(true, 30.0, 3.5, 33.5, 2.5, 1.0);
        assert_eq!((start, duration, end), (33.0, 3.0, 36.0));

        // later stop: includes the ascent from the previous stop
        let (start, duration, end) = stop_row_timing(false, 36.0, 0.3333, 36.3333, 1.6667, 1.0);
        assert_eq!(start, 36.0);
        assert_eq!(duration, 2.0);
        assert!((end - 38.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_ladder_holds_shallower_stops() {
        let mut ladder = StopLadder::new();
        assert!(ladder.is_first());
        assert_eq!(ladder.hold(0.5), 0.0);

        // first stop shows 3 minutes
        assert_eq!(ladder.record(0.5, 2.5, 1.0), 3.0);
        assert!((ladder.hold(0.3333) - 2.6667).abs() < 1e-9);

        // a 2 minute row does not lower the floor
        assert_eq!(ladder.record(0.3333, 1.6667, 1.0), 2.0);
        assert!((ladder.hold(0.3333) - 2.6667).abs() < 1e-9);

        assert_eq!(ladder.record(0.3333, 4.6667, 1.0), 5.0);
        assert!((ladder.hold(0.3333) - 4.6667).abs() < 1e-9);
    }

    #[test]
    fn test_select_switch_rules() {
        let gases = gases();
        assert_eq!(select_switch(&gases, 0, 24.0), None);
        assert_eq!(select_switch(&gases, 0, 21.0), Some(1));
        assert_eq!(select_switch(&gases, 1, 9.0), None);
        assert_eq!(select_switch(&gases, 1, 6.0), Some(2));
        // from the bottom gas the shallowest eligible gas is chosen
        assert_eq!(select_switch(&gases, 0, 6.0), Some(2));
        assert_eq!(select_switch(&gases, 2, 3.0), None);
    }

    #[test]
    fn test_stop_layout_default_steps() {
        let layout = StopLayout::new(&Settings::default(), true);
        assert_eq!(layout.next_stop(6.0, 0.0), 3.0);
        assert_eq!(layout.next_stop(3.0, 0.0), 0.0);
        assert_eq!(layout.next_stop(12.0, 10.0), 10.0);
        assert_eq!(layout.round_up(7.2), 9.0);
        assert_eq!(layout.round_up(-1.0), 0.0);
    }

    #[test]
    fn test_stop_layout_options() {
        let mut settings = Settings::default();
        settings.ascent.last_stop_double_interval = true;
        let layout = StopLayout::new(&settings, false);
        assert_eq!(layout.next_stop(6.0, 0.0), 0.0);
        assert_eq!(layout.next_stop(9.0, 0.0), 6.0);

        let mut settings = Settings::default();
        settings.ascent.shallow_fine_interval = true;
        assert_eq!(StopLayout::new(&settings, true).next_stop(9.0, 0.0), 8.0);
        assert_eq!(StopLayout::new(&settings, true).next_stop(12.0, 0.0), 9.0);
        assert_eq!(StopLayout::new(&settings, false).next_stop(9.0, 0.0), 6.0);
    }
}
