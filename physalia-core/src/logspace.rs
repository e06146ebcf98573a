//! Log-space probability helpers for numerically stable computation.
//!
//! All Physalia probability models store natural logarithms and combine them
//! with `+`; no `exp` appears in any hot path. Probability zero is
//! representable as [`LOG_ZERO`].

use crate::{PhysaliaError, Result};

/// Log-probability of an impossible event: `ln(0) = -∞`.
pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// Log-probability of a certain event: `ln(1) = 0`.
pub const LOG_ONE: f64 = 0.0;

/// Validated natural logarithm of a probability in `[0, 1]`.
///
/// Zero maps to [`LOG_ZERO`], one to [`LOG_ONE`].
///
/// # Errors
///
/// Returns an error if `p` is negative, greater than one, or NaN.
pub fn ln_checked(p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(PhysaliaError::InvalidInput(format!(
            "probability {p} out of [0, 1]"
        )));
    }
    Ok(if p == 0.0 { LOG_ZERO } else { p.ln() })
}

/// Whether a log-probability denotes a reachable (non-zero) probability.
pub fn is_finite_log(lp: f64) -> bool {
    lp > LOG_ZERO
}
