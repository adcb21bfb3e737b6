//! Log-probability arithmetic.
//!
//! Every probability in this crate lives in log space: probability 0 is
//! the sentinel [`LOG_0`] (negative infinity) and probability 1 is
//! [`LOG_1`] (numeric zero). Sums of probabilities become log-sum-exp
//! reductions, products become additions, and intermediate values stay
//! representable even when the underlying probabilities underflow `f64`.
//!
//! Any operation that would leave log space (a negative difference under
//! [`log_sub`], for instance) clamps to the nearer sentinel instead of
//! propagating NaN.

/// Log-space representation of probability 0.
pub const LOG_0: f64 = f64::NEG_INFINITY;

/// Log-space representation of probability 1.
pub const LOG_1: f64 = 0.0;

/// Whether `x` is the log-zero sentinel.
#[inline]
pub fn is_log_zero(x: f64) -> bool {
    x == LOG_0
}

/// log(exp(a) + exp(b)), computed stably.
#[inline]
pub fn log_add(a: f64, b: f64) -> f64 {
    if is_log_zero(a) {
        return b;
    }
    if is_log_zero(b) {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// log(exp(a) - exp(b)), for `a >= b`.
///
/// Clamps to [`LOG_0`] when `b >= a`: a range whose prefix accumulators
/// coincide holds zero mass, and rounding must not turn that into NaN.
#[inline]
pub fn log_sub(a: f64, b: f64) -> f64 {
    debug_assert!(b <= a + 1e-9, "log_sub underflow: {b} > {a}");
    if is_log_zero(b) {
        return a;
    }
    if b >= a {
        return LOG_0;
    }
    // 1 - exp(b - a) is in (0, 1] here.
    a + (-((b - a).exp())).ln_1p()
}

/// Stable log-sum-exp over a slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return LOG_0;
    }
    let max_val = values.iter().cloned().fold(LOG_0, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}
