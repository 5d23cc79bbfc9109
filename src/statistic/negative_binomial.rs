//! Negative binomial law, parameterized by (n, p)
//!
//! P(X = x) = Γ(x + n) / (Γ(n) x!) pⁿ (1 - p)ˣ

use rand::Rng;
use rand_distr::{Distribution, Gamma};

use super::discrete::sample_truncated_counts;
use super::poisson;
use super::special::{ln_factorial, ln_gamma};

pub fn lpmf(x: usize, n: f64, p: f64) -> f64 {
    if n <= 0.0 || p <= 0.0 || p > 1.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return if x == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    let xf = x as f64;
    ln_gamma(xf + n) - ln_gamma(n) - ln_factorial(x) + n * p.ln() + xf * (1.0 - p).ln()
}

/// Gamma-Poisson mixture draw
pub fn sample<R: Rng + ?Sized>(rng: &mut R, n: f64, p: f64) -> usize {
    if p >= 1.0 {
        return 0;
    }
    match Gamma::new(n, (1.0 - p) / p) {
        Ok(g) => {
            let lambda = g.sample(rng);
            poisson::sample(rng, lambda)
        }
        Err(_) => 0,
    }
}

/// Draw restricted to [lo, hi], `hi == None` meaning unbounded
pub fn sample_interval<R: Rng + ?Sized>(rng: &mut R, n: f64, p: f64, lo: usize, hi: Option<usize>) -> usize {
    sample_truncated_counts(rng, |k| lpmf(k, n, p), lo, hi)
}
