//! Parameters of one class of the functional model

use std::collections::BTreeSet;

use ndarray::{Array1, Array2};

use crate::statistic::EPSILON;

use super::computation::{different_values, optimize_alpha, regression};
use super::function::Function;

#[derive(Debug, Clone)]
pub struct FunctionalClass {
    n_sub: usize,
    n_coeff: usize,
    /// `n_sub × 2`, row 0 stays at zero
    pub alpha: Array2<f64>,
    /// `n_sub × n_coeff`
    pub beta: Array2<f64>,
    pub sd: Vec<f64>,
}

impl FunctionalClass {
    pub fn new(n_sub: usize, n_coeff: usize) -> Self {
        Self {
            n_sub,
            n_coeff,
            alpha: Array2::zeros((n_sub, 2)),
            beta: Array2::zeros((n_sub, n_coeff)),
            sd: vec![1.0; n_sub],
        }
    }

    pub fn init_param(&mut self) {
        self.alpha.fill(0.0);
    }

    pub fn m_step(&mut self, data: &[Function], members: &BTreeSet<usize>) -> String {
        let samples: Vec<(f64, usize)> = members
            .iter()
            .flat_map(|&i| data[i].t().iter().copied().zip(data[i].w().iter().copied()))
            .collect();
        optimize_alpha(&mut self.alpha, &samples);
        self.m_step_beta_sd(data, members)
    }

    fn m_step_beta_sd(&mut self, data: &[Function], members: &BTreeSet<usize>) -> String {
        let mut warn_log = String::new();
        for s in 0..self.n_sub {
            let mut rows: Vec<f64> = Vec::new();
            let mut y: Vec<f64> = Vec::new();
            for &i in members {
                let f = &data[i];
                for (j, _) in f.w().iter().enumerate().filter(|(_, &w)| w == s) {
                    rows.extend(f.vandermonde().row(j).iter());
                    y.push(f.x()[j]);
                }
            }
            let n_rows = y.len();
            let fit = Array2::from_shape_vec((n_rows, self.n_coeff), rows)
                .ok()
                .and_then(|design| regression(&design, &Array1::from(y)));
            match fit {
                Some((beta, sd)) => {
                    self.beta.row_mut(s).assign(&beta);
                    self.sd[s] = sd;
                    if sd < EPSILON {
                        warn_log.push_str(&format!(
                            "Sub-regression {} has a standard deviation below {}.\n",
                            s, EPSILON
                        ));
                    }
                }
                None => warn_log.push_str(&format!(
                    "Sub-regression {} could not be fitted, its design matrix is singular.\n",
                    s
                )),
            }
        }
        warn_log
    }

    /// Each sub-regression needs `n_coeff` distinct time values
    pub fn check_sample_condition(&self, data: &[Function], members: &BTreeSet<usize>) -> String {
        for s in 0..self.n_sub {
            let times: Vec<f64> = members
                .iter()
                .flat_map(|&i| {
                    let f = &data[i];
                    f.t().iter().zip(f.w().iter()).filter(|(_, &w)| w == s).map(|(&t, _)| t)
                })
                .collect();
            if !different_values(times, self.n_coeff, EPSILON) {
                return format!(
                    "Not enough different values for t in sub-regression {}. Data points should be separated by at least {}.\n",
                    s, EPSILON
                );
            }
        }
        String::new()
    }

    /// alpha, beta and sd flattened row by row
    pub fn flat_param(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            self.alpha.iter().copied().collect(),
            self.beta.iter().copied().collect(),
            self.sd.clone(),
        )
    }

    pub fn set_flat_param(&mut self, alpha: &[f64], beta: &[f64], sd: &[f64]) {
        self.alpha.iter_mut().zip(alpha).for_each(|(d, s)| *d = *s);
        self.beta.iter_mut().zip(beta).for_each(|(d, s)| *d = *s);
        self.sd.iter_mut().zip(sd).for_each(|(d, s)| *d = *s);
    }

    pub fn n_alpha(&self) -> usize {
        2 * self.n_sub
    }

    pub fn n_beta(&self) -> usize {
        self.n_sub * self.n_coeff
    }

    pub fn n_sd(&self) -> usize {
        self.n_sub
    }
}
