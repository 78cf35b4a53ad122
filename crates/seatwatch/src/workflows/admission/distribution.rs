//! Gamma waiting-time helpers over `statrs`.

use statrs::distribution::{ContinuousCDF, Gamma};

/// P(T <= t) for T ~ Gamma(shape, rate). A zero shape means nobody is ahead in the queue.
pub(crate) fn gamma_cdf(t: f64, shape: f64, rate: f64) -> f64 {
    if shape <= 0.0 {
        return 1.0;
    }
    if rate <= 0.0 || t <= 0.0 {
        return 0.0;
    }
    match Gamma::new(shape, rate) {
        Ok(gamma) => {
            let value = gamma.cdf(t);
            if value.is_finite() {
                value
            } else {
                0.0
            }
        }
        Err(_) => 0.0,
    }
}

/// Inverse Gamma(shape, rate) CDF, capped at `ceiling`.
pub(crate) fn gamma_quantile(q: f64, shape: f64, rate: f64, ceiling: f64) -> f64 {
    if shape <= 0.0 || q <= 0.0 {
        return 0.0;
    }
    if rate <= 0.0 || q >= 1.0 || gamma_cdf(ceiling, shape, rate) < q {
        return ceiling;
    }
    match Gamma::new(shape, rate) {
        Ok(gamma) => {
            let value = gamma.inverse_cdf(q);
            if value.is_finite() {
                value.clamp(0.0, ceiling)
            } else {
                ceiling
            }
        }
        Err(_) => ceiling,
    }
}
