//! Gaussian sampling, including the truncated rejection samplers
//!
//! Draws are made in standardized coordinates. For a two-sided interval
//! containing 0 and narrower than √(2π), a uniform proposal is used. For a
//! one-sided bound (or a wide interval away from 0) a shifted exponential
//! proposal is used. The choice between both is made on the log scale so
//! that very distant bounds never overflow.
//!
//! Every rejection loop is capped at [`MAX_REJECTION_TRIALS`]; past the cap
//! the closest admissible bound is returned and a warning is emitted.

use rand::Rng;
use rand_distr::{Distribution, Exp, StandardNormal};
use tracing::warn;

use super::special::{normal_cdf, normal_lpdf, normal_pdf};

/// Upper bound on proposals for a single truncated draw
pub const MAX_REJECTION_TRIALS: usize = 10_000;

/// √(2π)
const SQRT_2PI: f64 = 2.506_628_274_631_000_7;

/// A draw together with the number of proposals it took
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncatedDraw {
    pub value: f64,
    pub trials: usize,
}

/// Unconstrained draw from N(mean, sd²)
pub fn sample<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + sd * z
}

/// Log density of N(mean, sd²)
pub fn lpdf(x: f64, mean: f64, sd: f64) -> f64 {
    normal_lpdf(x, mean, sd)
}

/// ln P(lo ≤ X ≤ hi) for X ~ N(mean, sd²), bounds possibly infinite
///
/// Intervals above the mean are mirrored below it, where the cdf keeps its
/// relative precision.
pub fn ln_interval_probability(lo: f64, hi: f64, mean: f64, sd: f64) -> f64 {
    let (a, b) = ((lo - mean) / sd, (hi - mean) / sd);
    if a > 0.0 {
        (normal_cdf(-a) - normal_cdf(-b)).ln()
    } else {
        (normal_cdf(b) - normal_cdf(a)).ln()
    }
}

/// Draw from N(mean, sd²) restricted to [lo, hi]
pub fn sample_interval<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64, lo: f64, hi: f64) -> f64 {
    sample_interval_counted(rng, mean, sd, lo, hi).value
}

/// Draw from N(mean, sd²) restricted to [lo, +∞)
pub fn sample_lower_bounded<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64, lo: f64) -> f64 {
    sample_interval_counted(rng, mean, sd, lo, f64::INFINITY).value
}

/// Draw from N(mean, sd²) restricted to (-∞, hi]
pub fn sample_upper_bounded<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64, hi: f64) -> f64 {
    sample_interval_counted(rng, mean, sd, f64::NEG_INFINITY, hi).value
}

/// Truncated draw reporting the number of proposals
///
/// Infinite bounds are allowed on either side.
pub fn sample_interval_counted<R: Rng + ?Sized>(
    rng: &mut R,
    mean: f64,
    sd: f64,
    lo: f64,
    hi: f64,
) -> TruncatedDraw {
    if sd <= 0.0 || !sd.is_finite() {
        return TruncatedDraw {
            value: mean.clamp(lo, hi),
            trials: 0,
        };
    }

    let lower = (lo - mean) / sd;
    let upper = (hi - mean) / sd;

    let draw = if lower < 0.0 && 0.0 < upper {
        if upper - lower < SQRT_2PI {
            lrb_sampler(rng, lower, upper)
        } else {
            normal_rejection(rng, lower, upper)
        }
    } else if upper <= 0.0 {
        let mirrored = side_sampler(rng, -upper, -lower);
        TruncatedDraw {
            value: -mirrored.value,
            trials: mirrored.trials,
        }
    } else {
        side_sampler(rng, lower, upper)
    };

    TruncatedDraw {
        value: (mean + sd * draw.value).clamp(lo, hi),
        trials: draw.trials,
    }
}

/// Mean and variance of N(mean, sd²) truncated to [lo, hi]
pub fn truncated_moments(mean: f64, sd: f64, lo: f64, hi: f64) -> (f64, f64) {
    let a = (lo - mean) / sd;
    let b = (hi - mean) / sd;
    let (pa, pb) = (density_or_zero(a), density_or_zero(b));
    let z = normal_cdf(b) - normal_cdf(a);
    let (ta, tb) = (tail_term(a, pa), tail_term(b, pb));
    let m = (pa - pb) / z;
    let var = 1.0 + (ta - tb) / z - m * m;
    (mean + sd * m, sd * sd * var)
}

fn density_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        normal_pdf(x)
    } else {
        0.0
    }
}

fn tail_term(x: f64, density: f64) -> f64 {
    if x.is_finite() {
        x * density
    } else {
        0.0
    }
}

fn cap_reached(lower: f64, upper: f64) -> TruncatedDraw {
    let fallback = if lower.is_finite() && (lower.abs() <= upper.abs() || !upper.is_finite()) {
        lower
    } else {
        upper
    };
    warn!(
        lower = lower,
        upper = upper,
        trials = MAX_REJECTION_TRIALS,
        "truncated normal rejection cap reached, using closest bound"
    );
    TruncatedDraw {
        value: fallback,
        trials: MAX_REJECTION_TRIALS,
    }
}

/// Plain rejection from the standard Normal, for intervals with high mass
fn normal_rejection<R: Rng + ?Sized>(rng: &mut R, lower: f64, upper: f64) -> TruncatedDraw {
    for trials in 1..=MAX_REJECTION_TRIALS {
        let z: f64 = rng.sample(StandardNormal);
        if lower <= z && z <= upper {
            return TruncatedDraw { value: z, trials };
        }
    }
    cap_reached(lower, upper)
}

/// Uniform proposal on [lower, upper]
fn lrb_sampler<R: Rng + ?Sized>(rng: &mut R, lower: f64, upper: f64) -> TruncatedDraw {
    for trials in 1..=MAX_REJECTION_TRIALS {
        let z = rng.gen_range(lower..=upper);
        let rho = if lower < 0.0 && 0.0 < upper {
            (-0.5 * z * z).exp()
        } else if upper <= 0.0 {
            (0.5 * (upper * upper - z * z)).exp()
        } else {
            (0.5 * (lower * lower - z * z)).exp()
        };
        let u: f64 = rng.gen();
        if u <= rho {
            return TruncatedDraw { value: z, trials };
        }
    }
    cap_reached(lower, upper)
}

/// Shifted exponential proposal on [lower, +∞), draws above `upper` rejected
fn lb_sampler<R: Rng + ?Sized>(rng: &mut R, lower: f64, upper: f64) -> TruncatedDraw {
    if lower < 0.0 {
        return normal_rejection(rng, lower, upper);
    }
    let alpha = 0.5 * (lower + (lower * lower + 4.0).sqrt());
    let exp = match Exp::new(alpha) {
        Ok(e) => e,
        Err(_) => return cap_reached(lower, upper),
    };
    for trials in 1..=MAX_REJECTION_TRIALS {
        let z = exp.sample(rng) + lower;
        if z > upper {
            continue;
        }
        let rho = (-0.5 * (z - alpha) * (z - alpha)).exp();
        let u: f64 = rng.gen();
        if u <= rho {
            return TruncatedDraw { value: z, trials };
        }
    }
    cap_reached(lower, upper)
}

/// Both bounds on the same side of 0, with 0 ≤ lower < upper
fn side_sampler<R: Rng + ?Sized>(rng: &mut R, lower: f64, upper: f64) -> TruncatedDraw {
    let alpha = 0.5 * (lower + (lower * lower + 4.0).sqrt());
    let exponential_side = alpha.ln() + 0.5 * alpha * lower;
    let uniform_side = 0.5 * lower * lower - (upper - lower).ln();
    if exponential_side > uniform_side {
        lb_sampler(rng, lower, upper)
    } else {
        lrb_sampler(rng, lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_narrow_interval_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 100_000;
        let mut total_trials = 0;
        let draws: Vec<f64> = (0..n)
            .map(|_| {
                let d = sample_interval_counted(&mut rng, 0.0, 1.0, -1.0, 1.0);
                total_trials += d.trials;
                d.value
            })
            .collect();

        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        let (expected_mean, expected_var) = truncated_moments(0.0, 1.0, -1.0, 1.0);

        assert!(draws.iter().all(|x| (-1.0..=1.0).contains(x)));
        assert!(expected_mean.abs() < 1e-9);
        assert!((mean - expected_mean).abs() < 0.01, "mean {}", mean);
        assert!(
            ((var - expected_var) / expected_var).abs() < 0.01,
            "variance {} vs {}",
            var,
            expected_var
        );
        let mean_trials = total_trials as f64 / n as f64;
        assert!(mean_trials < 2.0, "mean trials {}", mean_trials);
    }

    #[test]
    fn test_lower_bound_respected() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let n = 100_000;
        let mut total_trials = 0;
        for _ in 0..n {
            let d = sample_interval_counted(&mut rng, 0.0, 1.0, 5.0, f64::INFINITY);
            assert!(d.value >= 5.0);
            total_trials += d.trials;
        }
        assert!((total_trials as f64 / n as f64) < 1.5);
    }

    #[test]
    fn test_upper_bound_mirrors_lower_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 20_000;
        let draws: Vec<f64> = (0..n)
            .map(|_| sample_upper_bounded(&mut rng, 1.0, 1.0, 0.0))
            .collect();
        assert!(draws.iter().all(|&x| x <= 0.0));
        let mean = draws.iter().sum::<f64>() / n as f64;
        let (expected, _) = truncated_moments(1.0, 1.0, f64::NEG_INFINITY, 0.0);
        assert!((mean - expected).abs() < 0.02, "mean {} vs {}", mean, expected);
    }

    #[test]
    fn test_wide_interval_uses_plain_rejection() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let d = sample_interval_counted(&mut rng, 0.0, 1.0, -3.0, 3.0);
        assert!((-3.0..=3.0).contains(&d.value));
        assert!(d.trials >= 1);
    }

    #[test]
    fn test_degenerate_sd() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert_eq!(sample_interval(&mut rng, 10.0, 0.0, 0.0, 1.0), 1.0);
    }
}
