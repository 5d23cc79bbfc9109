//! Weibull plugin: shape k and scale λ per class
//!
//! The shape is the root of the profile likelihood equation
//!
//! ```text
//! g(k) = Σ xᵏ ln x / Σ xᵏ - 1/k - mean(ln x) = 0
//! ```
//!
//! found by Newton-Raphson from the current shape, after which the scale has
//! the closed form λ = (mean xᵏ)^(1/k).

use std::collections::BTreeSet;

use tracing::warn;

use crate::data::{prior_draw, MisType, MisVal, Range};
use crate::param::ConfIntDataStat;
use crate::statistic::{weibull, StreamRng, EPSILON};

use super::simple::SimpleModel;

const ACCEPTED: [MisType; 4] = [
    MisType::Present,
    MisType::Missing,
    MisType::MissingIntervals,
    MisType::MissingRUIntervals,
];

const INIT_SHAPE: f64 = 5.0;
const INIT_SCALE: f64 = 1.0;
const MAX_NEWTON_ITER: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-10;
const MIN_SHAPE: f64 = 1e-3;
const MAX_SHAPE: f64 = 1e3;

#[derive(Debug, Clone)]
pub struct WeibullModel {
    n_class: usize,
    /// k, λ for each class
    param: Vec<f64>,
}

impl WeibullModel {
    pub fn shape(&self, k: usize) -> f64 {
        self.param[2 * k]
    }

    pub fn scale(&self, k: usize) -> f64 {
        self.param[2 * k + 1]
    }
}

/// Newton-Raphson on the profile equation; `None` when the iterate leaves the admissible range
fn estimate_shape(x: &[f64], start: f64) -> Option<f64> {
    let n = x.len() as f64;
    let mean_ln = x.iter().map(|v| v.ln()).sum::<f64>() / n;
    let mut k = start;
    for _ in 0..MAX_NEWTON_ITER {
        let (mut s0, mut s1, mut s2) = (0.0, 0.0, 0.0);
        for &v in x {
            let l = v.ln();
            let p = v.powf(k);
            s0 += p;
            s1 += p * l;
            s2 += p * l * l;
        }
        let g = s1 / s0 - 1.0 / k - mean_ln;
        let dg = (s2 * s0 - s1 * s1) / (s0 * s0) + 1.0 / (k * k);
        let step = g / dg;
        let next = k - step;
        if !next.is_finite() {
            return None;
        }
        k = if next <= 0.0 { k / 2.0 } else { next };
        if step.abs() < NEWTON_TOLERANCE * k {
            break;
        }
    }
    (MIN_SHAPE..=MAX_SHAPE).contains(&k).then_some(k)
}

impl SimpleModel for WeibullModel {
    type Data = f64;
    type Stat = ConfIntDataStat;

    const MODEL_TYPE: &'static str = "Weibull";

    fn new(n_class: usize) -> Self {
        let mut model = Self {
            n_class,
            param: vec![0.0; 2 * n_class],
        };
        model.init_param();
        model
    }

    fn accepted_types(&self) -> &'static [MisType] {
        &ACCEPTED
    }

    fn param(&self) -> &[f64] {
        &self.param
    }

    fn param_mut(&mut self) -> &mut [f64] {
        &mut self.param
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.n_class)
            .flat_map(|k| [format!("k: {}, k", k), format!("k: {}, lambda", k)])
            .collect()
    }

    fn init_param(&mut self) {
        for k in 0..self.n_class {
            self.param[2 * k] = INIT_SHAPE;
            self.param[2 * k + 1] = INIT_SCALE;
        }
    }

    fn m_step(&mut self, data: &[f64], class_ind: &[BTreeSet<usize>]) -> String {
        let mut warn_log = String::new();
        for (k, members) in class_ind.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let x: Vec<f64> = members.iter().map(|&i| data[i].max(EPSILON)).collect();
            match estimate_shape(&x, self.shape(k)) {
                Some(shape) => {
                    let mean_pow = x.iter().map(|v| v.powf(shape)).sum::<f64>() / x.len() as f64;
                    self.param[2 * k] = shape;
                    self.param[2 * k + 1] = mean_pow.powf(1.0 / shape);
                }
                None => {
                    warn!(class = k, "weibull shape estimation did not converge");
                    warn_log.push_str(&format!(
                        "Weibull shape estimation failed in class {}. The values may be too concentrated.\n",
                        k
                    ));
                }
            }
        }
        warn_log
    }

    fn ln_completed(&self, x: f64, k: usize) -> f64 {
        weibull::lpdf(x, self.shape(k), self.scale(k))
    }

    fn ln_observed(&self, x: f64, mis: &MisVal<f64>, k: usize) -> f64 {
        let (shape, scale) = (self.shape(k), self.scale(k));
        match mis {
            MisVal::Present => weibull::lpdf(x, shape, scale),
            MisVal::Interval(a, b) => (weibull::cdf(*b, shape, scale) - weibull::cdf(*a, shape, scale)).ln(),
            MisVal::RightUnbounded(a) => -(a.max(0.0) / scale).powf(shape),
            MisVal::LeftUnbounded(b) => weibull::cdf(*b, shape, scale).ln(),
            MisVal::Missing | MisVal::FiniteValues(_) => 0.0,
        }
    }

    fn sample_conditional(&self, mis: &MisVal<f64>, k: usize, range: Option<&Range<f64>>, rng: &mut StreamRng) -> f64 {
        let (shape, scale) = (self.shape(k), self.scale(k));
        match mis {
            MisVal::Missing => weibull::sample(rng, shape, scale),
            MisVal::Interval(a, b) => weibull::sample_interval(rng, shape, scale, *a, *b),
            MisVal::RightUnbounded(a) => weibull::sample_interval(rng, shape, scale, *a, f64::INFINITY),
            MisVal::LeftUnbounded(b) => weibull::sample_interval(rng, shape, scale, 0.0, *b),
            MisVal::Present | MisVal::FiniteValues(_) => prior_draw(mis, range, rng).unwrap_or(scale),
        }
    }

    fn check_sample_condition(&self, data: &[f64], class_ind: &[BTreeSet<usize>]) -> String {
        for (k, members) in class_ind.iter().enumerate() {
            if !members.iter().any(|&i| data[i] > EPSILON) {
                return format!(
                    "Weibull variables must have at least one positive value in each class. \
                     Class {} only contains zeros.\n",
                    k
                );
            }
        }
        String::new()
    }

    fn nb_free_parameter(&self) -> usize {
        2 * self.n_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistic::{master_rng, RngPool};

    #[test]
    fn test_m_step_recovers_parameters() {
        let mut master = master_rng(Some(12));
        let mut pool = RngPool::new(1, &mut master);
        let rng = pool.get_mut(0);
        let data: Vec<f64> = (0..5_000).map(|_| weibull::sample(rng, 2.0, 3.0)).collect();
        let class_ind = vec![(0..data.len()).collect::<BTreeSet<usize>>()];

        let mut model = WeibullModel::new(1);
        assert!(model.m_step(&data, &class_ind).is_empty());
        assert!((model.shape(0) - 2.0).abs() < 0.1, "shape {}", model.shape(0));
        assert!((model.scale(0) - 3.0).abs() < 0.1, "scale {}", model.scale(0));
    }

    #[test]
    fn test_right_censored_probability() {
        let model = WeibullModel::new(1);
        // survival at the scale is e^-1 whatever the shape
        let lp = model.ln_observed(0.0, &MisVal::RightUnbounded(1.0), 0);
        assert!((lp + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_class() {
        let model = WeibullModel::new(2);
        let class_ind: Vec<BTreeSet<usize>> = vec![[0].into(), [1].into()];
        assert!(!model.check_sample_condition(&[1.0, 0.0], &class_ind).is_empty());
        assert!(model.check_sample_condition(&[1.0, 0.5], &class_ind).is_empty());
    }
}
