//! Floating point helpers: an absolute-tolerance comparison for tests, and the guarded
//! arithmetic used when a sub-population is empty or a relative risk pushes a
//! probability out of range.

use approx::AbsDiffEq;

/// Targeted accuracy instantiated over `f64`
pub const ACC: f64 = 10e-11;

/// Compares if two floats are close via `approx::abs_diff_eq` using a maximum absolute difference
/// (epsilon) of `acc`.
#[must_use]
pub fn almost_eq(a: f64, b: f64, acc: f64) -> bool {
    if a.is_infinite() && b.is_infinite() {
        return a == b;
    }
    a.abs_diff_eq(&b, acc)
}

/// `numerator / denominator`, or `fallback` when the denominator is not positive.
#[inline]
#[must_use]
pub fn ratio_or(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        fallback
    }
}

/// Clamps a probability-like quantity into `[0, 1]`.
#[inline]
#[must_use]
pub fn clamp_probability(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
