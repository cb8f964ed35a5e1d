//! Root finding used by the ceiling and bubble calculations.
//!
//! Both solvers report a missing sign change instead of guessing; callers
//! decide whether that is a warning or a fallback.

const MAX_ITERATIONS: usize = 100;
const BISECTION_TOLERANCE: f64 = 1.0e-3;
const RADIUS_TOLERANCE: f64 = 1.0e-12;

/// Outcome of [`bisect`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bisection {
    Converged(f64),
    /// `f(low)` and `f(high)` have the same sign
    NoBracket,
    /// Best estimate after the iteration cap
    IterationLimit(f64),
}

impl Bisection {
    pub fn value(&self) -> Option<f64> {
        match *self {
            Bisection::Converged(t) | Bisection::IterationLimit(t) => Some(t),
            Bisection::NoBracket => None,
        }
    }
}

/// Find where a monotonic quantity crosses zero on `[low, high]`.
///
/// The returned point is the last evaluated point at which `f <= 0`, so the result
/// sits on the non-positive side of the crossing.
pub fn bisect<F>(mut f: F, low: f64, high: f64) -> Bisection
where
    F: FnMut(f64) -> f64,
{
    let f_low = f(low);
    if f_low == 0.0 {
        return Bisection::Converged(low);
    }
    let f_high = f(high);
    if f_high == 0.0 {
        return Bisection::Converged(high);
    }
    if f_low * f_high > 0.0 {
        return Bisection::NoBracket;
    }

    let (mut t, mut dx) = if f_low < 0.0 {
        (low, high - low)
    } else {
        (high, low - high)
    };

    for _ in 0..MAX_ITERATIONS {
        dx *= 0.5;
        let mid = t + dx;
        if f(mid) <= 0.0 {
            t = mid;
        }
        if dx.abs() < BISECTION_TOLERANCE {
            return Bisection::Converged(t);
        }
    }
    Bisection::IterationLimit(t)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootStatus {
    Converged,
    /// The bounds did not straddle a sign change; the value is a best effort
    BracketViolation,
    IterationLimit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootResult {
    pub value: f64,
    pub status: RootStatus,
}

impl RootResult {
    fn converged(value: f64) -> Self {
        Self {
            value,
            status: RootStatus::Converged,
        }
    }
}

/// Solve `a r³ - b r² - c = 0` for `r` in `[low, high]`.
///
/// Newton-Raphson steps, falling back to bisection whenever a step would
/// leave the bracket or is converging too slowly.
pub fn radius_root(a: f64, b: f64, c: f64, low: f64, high: f64) -> RootResult {
    let cubic = |r: f64| r * (r * (a * r - b)) - c;
    let derivative = |r: f64| r * (r * 3.0 * a - 2.0 * b);

    let f_low = cubic(low);
    let f_high = cubic(high);
    if f_low == 0.0 {
        return RootResult::converged(low);
    }
    if f_high == 0.0 {
        return RootResult::converged(high);
    }
    let bracketed = f_low * f_high < 0.0;

    // r_neg tracks the side where the cubic is negative
    let (mut r_neg, mut r_pos) = if f_low < 0.0 { (low, high) } else { (high, low) };

    let mut r = 0.5 * (low + high);
    let mut last_step = (high - low).abs();
    let mut step = last_step;
    let mut value = cubic(r);
    let mut slope = derivative(r);

    for _ in 0..MAX_ITERATIONS {
        let leaves_bracket = ((r - r_pos) * slope - value) * ((r - r_neg) * slope - value) >= 0.0;
        let too_slow = (2.0 * value).abs() > (last_step * slope).abs();
        if leaves_bracket || too_slow {
            last_step = step;
            step = 0.5 * (r_pos - r_neg);
            r = r_neg + step;
            if r == r_neg {
                return finish(r, bracketed);
            }
        } else {
            last_step = step;
            step = value / slope;
            let previous = r;
            r -= step;
            if r == previous {
                return finish(r, bracketed);
            }
        }
        if step.abs() < RADIUS_TOLERANCE {
            return finish(r, bracketed);
        }
        value = cubic(r);
        slope = derivative(r);
        if value < 0.0 {
            r_neg = r;
        } else {
            r_pos = r;
        }
    }

    RootResult {
        value: r,
        status: if bracketed {
            RootStatus::IterationLimit
        } else {
            RootStatus::BracketViolation
        },
    }
}

fn finish(value: f64, bracketed: bool) -> RootResult {
    RootResult {
        value,
        status: if bracketed {
            RootStatus::Converged
        } else {
            RootStatus::BracketViolation
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_root_recovers_known_root() {
        // 2r³ - 3r² - 4 = 0 has its real root at r = 2
        let result = radius_root(2.0, 3.0, 4.0, 1.0, 3.0);
        assert_eq!(result.status, RootStatus::Converged);
        assert!((result.value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_radius_root_bounds_in_either_order() {
        let result = radius_root(2.0, 3.0, 4.0, 3.0, 1.0);
        assert!((result.value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_radius_root_exact_endpoint() {
        let result = radius_root(2.0, 3.0, 4.0, 2.0, 5.0);
        assert_eq!(result.status, RootStatus::Converged);
        assert_eq!(result.value, 2.0);
    }

    #[test]
    fn test_radius_root_reports_bracket_violation() {
        let result = radius_root(2.0, 3.0, 4.0, 3.0, 4.0);
        assert_eq!(result.status, RootStatus::BracketViolation);
    }

    #[test]
    fn test_radius_root_micrometre_scale() {
        // Bubble radii are around 1e-6 m; a = 1, b = 0, root = cbrt(c)
        let r = 0.8e-6_f64;
        let result = radius_root(1.0, 0.0, r.powi(3), 0.1e-6, 2.0e-6);
        assert!((result.value - r).abs() < 1e-10);
    }

    #[test]
    fn test_bisect_finds_crossing() {
        let result = bisect(|t| t - 2.5, 0.0, 10.0);
        let t = result.value().unwrap();
        assert!(matches!(result, Bisection::Converged(_)));
        assert!((t - 2.5).abs() < 1e-3);
        assert!(t <= 2.5);
    }

    #[test]
    fn test_bisect_decreasing_function() {
        let t = bisect(|t| 4.0 - t, 0.0, 10.0).value().unwrap();
        assert!((t - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_bisect_without_sign_change() {
        assert_eq!(bisect(|t| t + 1.0, 0.0, 10.0), Bisection::NoBracket);
    }

    #[test]
    fn test_bisect_zero_endpoint() {
        assert_eq!(bisect(|t| t, 0.0, 10.0), Bisection::Converged(0.0));
    }
}
