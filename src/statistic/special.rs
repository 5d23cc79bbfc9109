//! Special functions and log-space helpers
//!
//! Numerical approximations used by the plugin estimators (ln Γ for count
//! likelihoods, digamma / trigamma for the negative binomial Newton steps,
//! Normal cdf for truncated moments) plus the log-sum-exp normalization used
//! by every E-step.

use std::f64::consts::PI;

/// 1/√(2π)
const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// ln √(2π)
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7)
pub fn erf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    sign * (1.0 - erfc_positive(x.abs()))
}

/// `1 - erf(x)` for `x ≥ 0`, evaluated directly so that it keeps its
/// relative precision far in the tail
fn erfc_positive(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;

    let t = 1.0 / (1.0 + P * x);
    let poly = t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5))));
    poly * (-x * x).exp()
}

/// Standard normal density φ(x)
pub fn normal_pdf(x: f64) -> f64 {
    FRAC_1_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal cumulative distribution Φ(x)
pub fn normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    let tail = 0.5 * erfc_positive(x.abs() / std::f64::consts::SQRT_2);
    if x < 0.0 {
        tail
    } else {
        1.0 - tail
    }
}

/// Log density of N(mean, sd²) at x
pub fn normal_lpdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -LN_SQRT_2PI - sd.ln() - 0.5 * z * z
}

/// Lanczos approximation of ln Γ(x), relative error < 2e-10 for x > 0
pub fn ln_gamma(x: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];
    const G: f64 = 7.0;

    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let sum = COEFFICIENTS[1..]
        .iter()
        .enumerate()
        .fold(COEFFICIENTS[0], |acc, (i, &c)| acc + c / (x + i as f64 + 1.0));

    let t = x + G + 0.5;
    LN_SQRT_2PI + (x + 0.5) * t.ln() - t + sum.ln()
}

/// ln(n!)
pub fn ln_factorial(n: usize) -> f64 {
    ln_gamma(n as f64 + 1.0)
}

/// Digamma ψ(x) = d/dx ln Γ(x), by recurrence up to x ≥ 6 then asymptotic series
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result
        + x.ln()
        - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0))))
}

/// Trigamma ψ'(x), by recurrence up to x ≥ 6 then asymptotic series
pub fn trigamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result
        + inv
        + 0.5 * inv2
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

/// Numerically stable ln Σ exp(v)
///
/// Returns -∞ when every entry is -∞ (or the slice is empty).
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// Turns a vector of log weights into a probability vector, in place
///
/// The row maximum is subtracted before exponentiating. The returned value is
/// the log of the normalizing constant. When every weight is -∞ the vector is
/// left untouched and -∞ is returned so the caller can decide what to do.
pub fn log_to_multi(values: &mut [f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
    max + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ln_gamma() {
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-10);
        assert!((ln_factorial(4) - 24.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_digamma_trigamma() {
        // ψ(1) = -γ, ψ'(1) = π²/6
        let euler_gamma = 0.577_215_664_901_532_9;
        assert!((digamma(1.0) + euler_gamma).abs() < 1e-8);
        assert!((trigamma(1.0) - PI * PI / 6.0).abs() < 1e-8);
        // ψ(x + 1) = ψ(x) + 1/x
        assert!((digamma(3.5) - digamma(2.5) - 1.0 / 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.0) + normal_cdf(1.0) - 1.0).abs() < 1e-7);
        // Φ(-10) ≈ 7.62e-24, lost entirely by 1 + erf(x)
        let far = normal_cdf(-10.0);
        assert!(far > 0.0);
        assert!((far.ln() - 7.62e-24f64.ln()).abs() < 0.1);
    }

    #[test]
    fn test_log_to_multi() {
        let mut v = vec![1000.0, 1000.0, f64::NEG_INFINITY];
        let norm = log_to_multi(&mut v);
        assert!((v[0] - 0.5).abs() < 1e-12);
        assert_eq!(v[2], 0.0);
        assert!((norm - (1000.0 + 2.0_f64.ln())).abs() < 1e-9);

        let mut dead = vec![f64::NEG_INFINITY; 3];
        assert_eq!(log_to_multi(&mut dead), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&dead), f64::NEG_INFINITY);
    }
}
