//! Discrete draws: categorical, uniform integers and truncated count laws

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use super::special::log_to_multi;

/// Largest number of support points enumerated for a right-unbounded draw
pub const MAX_ENUMERATED_SUPPORT: usize = 100_000;

/// Relative log mass below which the tail of a unimodal law is dropped
const NEGLIGIBLE_LOG_MASS: f64 = -36.0;

/// Draws an index from a probability vector (need not be normalized)
///
/// Falls back to a uniform draw when every weight is zero.
pub fn sample_categorical<R: Rng + ?Sized>(rng: &mut R, proba: &[f64]) -> usize {
    let total: f64 = proba.iter().sum();
    if total.is_nan() || total <= 0.0 || total.is_infinite() {
        return rng.gen_range(0..proba.len().max(1));
    }
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (k, &p) in proba.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return k;
        }
    }
    // rounding left r at the very top of the cumulative sum
    proba.iter().rposition(|&p| p > 0.0).unwrap_or(0)
}

/// Uniform integer in [low, high] (both included)
pub fn sample_int<R: Rng + ?Sized>(rng: &mut R, low: usize, high: usize) -> usize {
    if high <= low {
        return low;
    }
    rng.gen_range(low..=high)
}

/// Uniform draw among candidate values
pub fn sample_among<R: Rng + ?Sized, T: Copy>(rng: &mut R, candidates: &[T]) -> Option<T> {
    candidates.choose(rng).copied()
}

/// In-place Fisher-Yates shuffle
pub fn shuffle<R: Rng + ?Sized, T>(rng: &mut R, values: &mut [T]) {
    values.shuffle(rng);
}

/// Bernoulli draw, 1 with probability p
pub fn sample_binomial<R: Rng + ?Sized>(rng: &mut R, p: f64) -> usize {
    if rng.gen::<f64>() < p {
        1
    } else {
        0
    }
}

/// Draw from a unimodal count law restricted to [lo, hi] by inversion
///
/// `lpmf` is the log mass function. With `hi == None` the support is
/// enumerated from `lo` until the mass becomes negligible past the mode.
pub fn sample_truncated_counts<R, F>(rng: &mut R, lpmf: F, lo: usize, hi: Option<usize>) -> usize
where
    R: Rng + ?Sized,
    F: Fn(usize) -> f64,
{
    let mut log_mass = Vec::new();
    let mut best = f64::NEG_INFINITY;
    let mut k = lo;
    loop {
        if let Some(h) = hi {
            if k > h {
                break;
            }
        }
        let lp = lpmf(k);
        log_mass.push(lp);
        if lp > best {
            best = lp;
        } else if hi.is_none() && lp < best + NEGLIGIBLE_LOG_MASS {
            break;
        }
        if hi.is_none() && best == f64::NEG_INFINITY && log_mass.len() > 64 {
            break;
        }
        if log_mass.len() >= MAX_ENUMERATED_SUPPORT {
            warn!(lo = lo, "truncated count support enumeration capped");
            break;
        }
        k += 1;
    }

    if log_to_multi(&mut log_mass) == f64::NEG_INFINITY {
        // every candidate has zero mass under the current parameters
        let high = hi.unwrap_or(lo);
        return sample_int(rng, lo, high);
    }
    lo + sample_categorical(rng, &log_mass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_categorical_frequencies() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let proba = [0.2, 0.0, 0.8];
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[sample_categorical(&mut rng, &proba)] += 1;
        }
        assert_eq!(counts[1], 0);
        assert!((counts[0] as f64 / 10_000.0 - 0.2).abs() < 0.02);
    }

    #[test]
    fn test_categorical_all_zero_is_uniform() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let k = sample_categorical(&mut rng, &[0.0, 0.0]);
        assert!(k < 2);
    }

    #[test]
    fn test_truncated_counts_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        // geometric-like log mass
        let lpmf = |k: usize| -(k as f64) * 0.7;
        for _ in 0..1_000 {
            let x = sample_truncated_counts(&mut rng, lpmf, 3, Some(6));
            assert!((3..=6).contains(&x));
            let y = sample_truncated_counts(&mut rng, lpmf, 10, None);
            assert!(y >= 10);
        }
    }
}
