//! Poisson plugin: one rate λ per class

use std::collections::BTreeSet;

use crate::data::{prior_draw, MisType, MisVal, Range};
use crate::param::DiscreteDataStat;
use crate::statistic::{log_sum_exp, poisson, StreamRng};

use super::simple::SimpleModel;

const ACCEPTED: [MisType; 5] = [
    MisType::Present,
    MisType::Missing,
    MisType::MissingIntervals,
    MisType::MissingLUIntervals,
    MisType::MissingRUIntervals,
];

#[derive(Debug, Clone)]
pub struct PoissonModel {
    n_class: usize,
    lambda: Vec<f64>,
}

impl PoissonModel {
    pub fn lambda(&self, k: usize) -> f64 {
        self.lambda[k]
    }
}

/// ln P(lo ≤ X ≤ hi) for a count law given by its log mass
pub(crate) fn ln_mass_between<F: Fn(usize) -> f64>(lpmf: F, lo: usize, hi: usize) -> f64 {
    let masses: Vec<f64> = (lo..=hi).map(lpmf).collect();
    log_sum_exp(&masses)
}

/// ln P(X ≥ lo) for a count law given by its log mass
pub(crate) fn ln_mass_above<F: Fn(usize) -> f64>(lpmf: F, lo: usize) -> f64 {
    if lo == 0 {
        return 0.0;
    }
    let below = ln_mass_between(lpmf, 0, lo - 1).exp().min(1.0);
    (-below).ln_1p()
}

impl SimpleModel for PoissonModel {
    type Data = usize;
    type Stat = DiscreteDataStat;

    const MODEL_TYPE: &'static str = "Poisson";

    fn new(n_class: usize) -> Self {
        Self {
            n_class,
            lambda: vec![1.0; n_class],
        }
    }

    fn accepted_types(&self) -> &'static [MisType] {
        &ACCEPTED
    }

    fn param(&self) -> &[f64] {
        &self.lambda
    }

    fn param_mut(&mut self) -> &mut [f64] {
        &mut self.lambda
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.n_class).map(|k| format!("k: {}, lambda", k)).collect()
    }

    fn init_param(&mut self) {
        self.lambda.iter_mut().for_each(|l| *l = 1.0);
    }

    fn m_step(&mut self, data: &[usize], class_ind: &[BTreeSet<usize>]) -> String {
        for (k, members) in class_ind.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            self.lambda[k] = members.iter().map(|&i| data[i] as f64).sum::<f64>() / members.len() as f64;
        }
        String::new()
    }

    fn ln_completed(&self, x: usize, k: usize) -> f64 {
        poisson::lpmf(x, self.lambda[k])
    }

    fn ln_observed(&self, x: usize, mis: &MisVal<usize>, k: usize) -> f64 {
        let lambda = self.lambda[k];
        match mis {
            MisVal::Present => poisson::lpmf(x, lambda),
            MisVal::Missing | MisVal::FiniteValues(_) => 0.0,
            MisVal::Interval(a, b) => ln_mass_between(|v| poisson::lpmf(v, lambda), *a, *b),
            MisVal::LeftUnbounded(b) => ln_mass_between(|v| poisson::lpmf(v, lambda), 0, *b),
            MisVal::RightUnbounded(a) => ln_mass_above(|v| poisson::lpmf(v, lambda), *a),
        }
    }

    fn sample_conditional(
        &self,
        mis: &MisVal<usize>,
        k: usize,
        range: Option<&Range<usize>>,
        rng: &mut StreamRng,
    ) -> usize {
        let lambda = self.lambda[k];
        match mis {
            MisVal::Missing => poisson::sample(rng, lambda),
            MisVal::Interval(a, b) => poisson::sample_interval(rng, lambda, *a, Some(*b)),
            MisVal::LeftUnbounded(b) => poisson::sample_interval(rng, lambda, 0, Some(*b)),
            MisVal::RightUnbounded(a) => poisson::sample_interval(rng, lambda, *a, None),
            MisVal::Present | MisVal::FiniteValues(_) => prior_draw(mis, range, rng).unwrap_or(0),
        }
    }

    /// A class with only zeros would get λ = 0
    fn check_sample_condition(&self, data: &[usize], class_ind: &[BTreeSet<usize>]) -> String {
        for (k, members) in class_ind.iter().enumerate() {
            if !members.iter().any(|&i| data[i] > 0) {
                return format!(
                    "Poisson variables must have at least one non-zero value in each class. \
                     Class {} only contains zeros.\n",
                    k
                );
            }
        }
        String::new()
    }

    fn nb_free_parameter(&self) -> usize {
        self.n_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m_step_and_condition() {
        let mut model = PoissonModel::new(2);
        let data = vec![1, 2, 3, 0, 0];
        let class_ind: Vec<BTreeSet<usize>> = vec![[0, 1, 2].into(), [3, 4].into()];
        model.m_step(&data, &class_ind);
        assert!((model.lambda(0) - 2.0).abs() < 1e-12);
        assert_eq!(model.lambda(1), 0.0);
        assert!(model.check_sample_condition(&data, &class_ind).contains("Class 1"));
    }

    #[test]
    fn test_interval_masses() {
        let mut model = PoissonModel::new(1);
        model.param_mut()[0] = 2.0;
        let all = model.ln_observed(0, &MisVal::RightUnbounded(0), 0);
        assert!(all.abs() < 1e-12);
        let lower = model.ln_observed(0, &MisVal::LeftUnbounded(3), 0).exp();
        let upper = model.ln_observed(0, &MisVal::RightUnbounded(4), 0).exp();
        assert!((lower + upper - 1.0).abs() < 1e-9);
        let mid = model.ln_observed(0, &MisVal::Interval(1, 2), 0).exp();
        let expected = (2.0 + 2.0) * (-2.0f64).exp();
        assert!((mid - expected).abs() < 1e-9);
    }
}
