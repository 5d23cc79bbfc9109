//! Weibull law with shape k and scale λ

use rand::Rng;
use rand_distr::{Distribution, Weibull};

pub fn lpdf(x: f64, k: f64, lambda: f64) -> f64 {
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    let xl = x / lambda;
    k.ln() - lambda.ln() + (k - 1.0) * xl.ln() - xl.powf(k)
}

pub fn cdf(x: f64, k: f64, lambda: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    1.0 - (-(x / lambda).powf(k)).exp()
}

fn quantile(p: f64, k: f64, lambda: f64) -> f64 {
    lambda * (-(1.0 - p).ln()).powf(1.0 / k)
}

pub fn sample<R: Rng + ?Sized>(rng: &mut R, k: f64, lambda: f64) -> f64 {
    match Weibull::new(lambda, k) {
        Ok(w) => w.sample(rng),
        Err(_) => quantile(rng.gen(), k, lambda),
    }
}

/// Inverse-cdf draw restricted to [lo, hi], `hi` may be +∞
pub fn sample_interval<R: Rng + ?Sized>(rng: &mut R, k: f64, lambda: f64, lo: f64, hi: f64) -> f64 {
    let lo = lo.max(0.0);
    let (flo, fhi) = (cdf(lo, k, lambda), cdf(hi, k, lambda));
    if fhi - flo <= f64::EPSILON {
        return if hi.is_finite() { 0.5 * (lo + hi) } else { lo };
    }
    let u = rng.gen_range(flo..fhi);
    quantile(u, k, lambda).clamp(lo, hi)
}
