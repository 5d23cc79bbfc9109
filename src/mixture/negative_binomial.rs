//! Negative binomial plugin: (n, p) per class
//!
//! With p profiled out as p = n / (n + x̄), the maximum likelihood `n` solves
//!
//! ```text
//! f(n) = Σ ψ(xᵢ + n) - N ψ(n) + N ln(n / (n + x̄)) = 0
//! ```
//!
//! which is found by Newton-Raphson started from the moment estimate.

use std::collections::BTreeSet;

use tracing::debug;

use crate::data::{prior_draw, MisType, MisVal, Range};
use crate::param::DiscreteDataStat;
use crate::statistic::special::{digamma, trigamma};
use crate::statistic::{negative_binomial, StreamRng, EPSILON};

use super::poisson::{ln_mass_above, ln_mass_between};
use super::simple::SimpleModel;

const ACCEPTED: [MisType; 5] = [
    MisType::Present,
    MisType::Missing,
    MisType::MissingIntervals,
    MisType::MissingLUIntervals,
    MisType::MissingRUIntervals,
];

const INIT_N: f64 = 5.2;
const INIT_P: f64 = 0.7;
const MAX_NEWTON_ITER: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-8;
/// Size used when the data shows no overdispersion
const MAX_N: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct NegativeBinomialModel {
    n_class: usize,
    /// n, p for each class
    param: Vec<f64>,
}

impl NegativeBinomialModel {
    pub fn size(&self, k: usize) -> f64 {
        self.param[2 * k]
    }

    pub fn proba(&self, k: usize) -> f64 {
        self.param[2 * k + 1]
    }
}

fn estimate_size(x: &[usize]) -> f64 {
    let count = x.len() as f64;
    let mean = x.iter().sum::<usize>() as f64 / count;
    let var = x.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / count;
    if var <= mean || mean <= 0.0 {
        return MAX_N;
    }

    let mut n = mean * mean / (var - mean);
    for _ in 0..MAX_NEWTON_ITER {
        let mut f = count * ((n / (n + mean)).ln() - digamma(n));
        let mut df = count * (1.0 / n - 1.0 / (n + mean) - trigamma(n));
        for &v in x {
            f += digamma(v as f64 + n);
            df += trigamma(v as f64 + n);
        }
        let next = n - f / df;
        let next = if next.is_finite() && next > 0.0 { next.min(MAX_N) } else { n / 2.0 };
        let converged = (next - n).abs() < NEWTON_TOLERANCE * n;
        n = next;
        if converged {
            break;
        }
    }
    n
}

impl SimpleModel for NegativeBinomialModel {
    type Data = usize;
    type Stat = DiscreteDataStat;

    const MODEL_TYPE: &'static str = "NegativeBinomial";

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
            .flat_map(|k| [format!("k: {}, n", k), format!("k: {}, p", k)])
            .collect()
    }

    fn init_param(&mut self) {
        for k in 0..self.n_class {
            self.param[2 * k] = INIT_N;
            self.param[2 * k + 1] = INIT_P;
        }
    }

    fn m_step(&mut self, data: &[usize], class_ind: &[BTreeSet<usize>]) -> String {
        let mut warn_log = String::new();
        for (k, members) in class_ind.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let x: Vec<usize> = members.iter().map(|&i| data[i]).collect();
            let n = estimate_size(&x);
            let total = x.iter().sum::<usize>() as f64;
            let nn = n * x.len() as f64;
            let p = nn / (nn + total);

            if p < EPSILON || p > 1.0 - EPSILON {
                warn_log.push_str(&format!(
                    "Negative binomial variables must have a probability strictly between 0 and 1 in each class. \
                     Class {} has p = {}.\n",
                    k, p
                ));
            }
            self.param[2 * k] = n;
            self.param[2 * k + 1] = p;
        }
        debug!(param = ?self.param, "negative binomial m-step");
        warn_log
    }

    fn ln_completed(&self, x: usize, k: usize) -> f64 {
        negative_binomial::lpmf(x, self.size(k), self.proba(k))
    }

    fn ln_observed(&self, x: usize, mis: &MisVal<usize>, k: usize) -> f64 {
        let (n, p) = (self.size(k), self.proba(k));
        let lpmf = |v| negative_binomial::lpmf(v, n, p);
        match mis {
            MisVal::Present => lpmf(x),
            MisVal::Missing | MisVal::FiniteValues(_) => 0.0,
            MisVal::Interval(a, b) => ln_mass_between(lpmf, *a, *b),
            MisVal::LeftUnbounded(b) => ln_mass_between(lpmf, 0, *b),
            MisVal::RightUnbounded(a) => ln_mass_above(lpmf, *a),
        }
    }

    fn sample_conditional(
        &self,
        mis: &MisVal<usize>,
        k: usize,
        range: Option<&Range<usize>>,
        rng: &mut StreamRng,
    ) -> usize {
        let (n, p) = (self.size(k), self.proba(k));
        match mis {
            MisVal::Missing => negative_binomial::sample(rng, n, p),
            MisVal::Interval(a, b) => negative_binomial::sample_interval(rng, n, p, *a, Some(*b)),
            MisVal::LeftUnbounded(b) => negative_binomial::sample_interval(rng, n, p, 0, Some(*b)),
            MisVal::RightUnbounded(a) => negative_binomial::sample_interval(rng, n, p, *a, None),
            MisVal::Present | MisVal::FiniteValues(_) => prior_draw(mis, range, rng).unwrap_or(0),
        }
    }

    /// A class with only zeros would give p = 1
    fn check_sample_condition(&self, data: &[usize], class_ind: &[BTreeSet<usize>]) -> String {
        for (k, members) in class_ind.iter().enumerate() {
            if !members.iter().any(|&i| data[i] > 0) {
                return format!(
                    "Negative binomial variables must have at least one non-zero value in each class. \
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
        let mut master = master_rng(Some(8));
        let mut pool = RngPool::new(1, &mut master);
        let rng = pool.get_mut(0);
        let data: Vec<usize> = (0..20_000).map(|_| negative_binomial::sample(rng, 3.0, 0.4)).collect();
        let class_ind = vec![(0..data.len()).collect::<BTreeSet<usize>>()];

        let mut model = NegativeBinomialModel::new(1);
        assert!(model.m_step(&data, &class_ind).is_empty());
        assert!((model.size(0) - 3.0).abs() < 0.3, "n {}", model.size(0));
        assert!((model.proba(0) - 0.4).abs() < 0.03, "p {}", model.proba(0));
    }

    #[test]
    fn test_all_zero_class_is_degenerate() {
        let mut model = NegativeBinomialModel::new(1);
        let data = vec![0, 0, 0];
        let class_ind = vec![(0..3).collect::<BTreeSet<usize>>()];
        assert!(!model.m_step(&data, &class_ind).is_empty());
        assert!(!model.check_sample_condition(&data, &class_ind).is_empty());
    }

    #[test]
    fn test_observed_masses_sum_to_one() {
        let model = NegativeBinomialModel::new(1);
        let below = model.ln_observed(0, &MisVal::LeftUnbounded(2), 0).exp();
        let above = model.ln_observed(0, &MisVal::RightUnbounded(3), 0).exp();
        assert!((below + above - 1.0).abs() < 1e-9);
    }
}
