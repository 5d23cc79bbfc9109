//! Gaussian plugin: one (mean, sd) pair per class

use std::collections::BTreeSet;

use tracing::debug;

use crate::data::{prior_draw, MisType, MisVal, Range};
use crate::param::ConfIntDataStat;
use crate::statistic::{gaussian, StreamRng, EPSILON};

use super::simple::SimpleModel;

const ACCEPTED: [MisType; 5] = [
    MisType::Present,
    MisType::Missing,
    MisType::MissingIntervals,
    MisType::MissingLUIntervals,
    MisType::MissingRUIntervals,
];

#[derive(Debug, Clone)]
pub struct GaussianModel {
    n_class: usize,
    /// mean, sd for each class
    param: Vec<f64>,
}

impl GaussianModel {
    pub fn mean(&self, k: usize) -> f64 {
        self.param[2 * k]
    }

    pub fn sd(&self, k: usize) -> f64 {
        self.param[2 * k + 1]
    }
}

impl SimpleModel for GaussianModel {
    type Data = f64;
    type Stat = ConfIntDataStat;

    const MODEL_TYPE: &'static str = "Gaussian";

    fn new(n_class: usize) -> Self {
        Self {
            n_class,
            param: vec![0.0; 2 * n_class],
        }
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
            .flat_map(|k| [format!("k: {}, mean", k), format!("k: {}, sd", k)])
            .collect()
    }

    fn init_param(&mut self) {
        for k in 0..self.n_class {
            self.param[2 * k] = 0.0;
            self.param[2 * k + 1] = 1.0;
        }
    }

    fn m_step(&mut self, data: &[f64], class_ind: &[BTreeSet<usize>]) -> String {
        let mut warn_log = String::new();
        for (k, members) in class_ind.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let n = members.len() as f64;
            let mean = members.iter().map(|&i| data[i]).sum::<f64>() / n;
            let var = members.iter().map(|&i| (data[i] - mean).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();

            if sd < EPSILON {
                warn_log.push_str(&format!(
                    "Gaussian variables must have a non-null standard deviation in each class. \
                     All values of class {} are equal to {}.\n",
                    k, mean
                ));
            }
            self.param[2 * k] = mean;
            self.param[2 * k + 1] = sd;
        }
        debug!(param = ?self.param, "gaussian m-step");
        warn_log
    }

    fn ln_completed(&self, x: f64, k: usize) -> f64 {
        gaussian::lpdf(x, self.mean(k), self.sd(k))
    }

    fn ln_observed(&self, x: f64, mis: &MisVal<f64>, k: usize) -> f64 {
        let (mean, sd) = (self.mean(k), self.sd(k));
        match mis {
            MisVal::Present => gaussian::lpdf(x, mean, sd),
            MisVal::Missing | MisVal::FiniteValues(_) => 0.0,
            MisVal::Interval(a, b) => gaussian::ln_interval_probability(*a, *b, mean, sd),
            MisVal::LeftUnbounded(b) => gaussian::ln_interval_probability(f64::NEG_INFINITY, *b, mean, sd),
            MisVal::RightUnbounded(a) => gaussian::ln_interval_probability(*a, f64::INFINITY, mean, sd),
        }
    }

    fn sample_conditional(&self, mis: &MisVal<f64>, k: usize, range: Option<&Range<f64>>, rng: &mut StreamRng) -> f64 {
        let (mean, sd) = (self.mean(k), self.sd(k));
        match mis {
            MisVal::Present => mean,
            MisVal::Missing => gaussian::sample(rng, mean, sd),
            MisVal::Interval(a, b) => gaussian::sample_interval(rng, mean, sd, *a, *b),
            MisVal::LeftUnbounded(b) => gaussian::sample_upper_bounded(rng, mean, sd, *b),
            MisVal::RightUnbounded(a) => gaussian::sample_lower_bounded(rng, mean, sd, *a),
            MisVal::FiniteValues(_) => prior_draw(mis, range, rng).unwrap_or(mean),
        }
    }

    /// Every class needs two distinct values for its standard deviation to be positive
    fn check_sample_condition(&self, data: &[f64], class_ind: &[BTreeSet<usize>]) -> String {
        for (k, members) in class_ind.iter().enumerate() {
            let mut values = members.iter().map(|&i| data[i]);
            let distinct = match values.next() {
                Some(first) => values.any(|v| (v - first).abs() > EPSILON),
                None => false,
            };
            if !distinct {
                return format!(
                    "Gaussian variables must have at least two different values in each class. \
                     It is not the case in class {}.\n",
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
