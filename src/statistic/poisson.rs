//! Poisson law

use rand::Rng;
use rand_distr::{Distribution, Poisson};

use super::discrete::sample_truncated_counts;
use super::special::ln_factorial;

pub fn lpmf(x: usize, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if x == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    x as f64 * lambda.ln() - lambda - ln_factorial(x)
}

pub fn sample<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> usize {
    if lambda <= 0.0 {
        return 0;
    }
    match Poisson::new(lambda) {
        Ok(p) => {
            let x: f64 = p.sample(rng);
            x as usize
        }
        Err(_) => 0,
    }
}

/// Draw restricted to [lo, hi], `hi == None` meaning unbounded
pub fn sample_interval<R: Rng + ?Sized>(rng: &mut R, lambda: f64, lo: usize, hi: Option<usize>) -> usize {
    sample_truncated_counts(rng, |k| lpmf(k, lambda), lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lpmf() {
        // P(X = 2 | λ = 3) = 9/2 e^-3
        let expected = (4.5f64).ln() - 3.0;
        assert!((lpmf(2, 3.0) - expected).abs() < 1e-9);
        assert_eq!(lpmf(0, 0.0), 0.0);
    }
}
