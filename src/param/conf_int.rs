//! Running statistics on estimated parameters
//!
//! During the run phase every plugin logs its flattened parameter vector at
//! each iteration. At the last iteration each coefficient is sorted and
//! summarized by its median and the two quantiles of the confidence level.
//! The median then replaces the live parameter.

use ndarray::{s, Array2};
use serde_json::{json, Value};

use crate::config::parse_n_modality;

/// Absorbs the rounding of `(1 - confidence) / 2` before quantile indices are floored
const QUANTILE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ConfIntParamStat {
    confidence_level: f64,
    n_coeff: usize,
    /// `n_coeff × (iter_max + 1)`
    log_storage: Array2<f64>,
    /// `n_coeff × 3`: median, lower bound, upper bound
    stat_storage: Array2<f64>,
}

impl ConfIntParamStat {
    pub fn new(confidence_level: f64) -> Self {
        Self {
            confidence_level,
            n_coeff: 0,
            log_storage: Array2::zeros((0, 0)),
            stat_storage: Array2::zeros((0, 3)),
        }
    }

    /// Logs `param` at `iteration`, summarizing at `iteration == iteration_max`
    pub fn sample_param(&mut self, param: &[f64], iteration: usize, iteration_max: usize) {
        if iteration == 0 {
            self.n_coeff = param.len();
            self.log_storage = Array2::zeros((self.n_coeff, iteration_max + 1));
            self.stat_storage = Array2::zeros((self.n_coeff, 3));
        }
        if iteration >= self.log_storage.ncols() || param.len() != self.n_coeff {
            return;
        }
        for (p, &v) in param.iter().enumerate() {
            self.log_storage[[p, iteration]] = v;
        }
        if iteration == iteration_max {
            // early stop: drop the columns that were never filled
            if self.log_storage.ncols() > iteration_max + 1 {
                self.log_storage = self.log_storage.slice(s![.., ..=iteration_max]).to_owned();
            }
            self.compute_stat(iteration_max);
        }
    }

    fn compute_stat(&mut self, iteration_max: usize) {
        let alpha = (1.0 - self.confidence_level) / 2.0;
        let ind_low = (alpha * iteration_max as f64 + QUANTILE_TOLERANCE).floor() as usize;
        let ind_high = (((1.0 - alpha) * iteration_max as f64 + QUANTILE_TOLERANCE).floor() as usize + 1).min(iteration_max);
        for p in 0..self.n_coeff {
            let mut row: Vec<f64> = self.log_storage.row(p).to_vec();
            row.sort_by(|a, b| a.total_cmp(b));
            self.stat_storage[[p, 0]] = row[iteration_max / 2];
            self.stat_storage[[p, 1]] = row[ind_low];
            self.stat_storage[[p, 2]] = row[ind_high];
        }
    }

    /// Renormalizes per class when `param_str` is `"nModality: x"`
    ///
    /// Each statistic column is divided, class block by class block, by its
    /// sum so that categorical probabilities still sum to one.
    pub fn normalize_param(&mut self, param_str: &str) {
        let n_modality = match parse_n_modality(param_str) {
            Some(n) if n > 0 => n,
            _ => return,
        };
        let n_class = self.n_coeff / n_modality;
        for j in 0..self.stat_storage.ncols() {
            for k in 0..n_class {
                let block = k * n_modality..(k + 1) * n_modality;
                let sum: f64 = block.clone().map(|p| self.stat_storage[[p, j]]).sum();
                if sum > 0.0 {
                    for p in block {
                        self.stat_storage[[p, j]] /= sum;
                    }
                }
            }
        }
    }

    /// Overwrites the live parameter with the median
    pub fn set_expectation_param(&self, param: &mut [f64]) {
        for (p, v) in param.iter_mut().enumerate().take(self.n_coeff) {
            *v = self.stat_storage[[p, 0]];
        }
    }

    /// Stores imported parameters as statistics (prediction, no quantiles)
    pub fn set_param_storage(&mut self, param: &[f64]) {
        self.n_coeff = param.len();
        self.log_storage = Array2::zeros((self.n_coeff, 0));
        self.stat_storage = Array2::from_shape_fn((self.n_coeff, 1), |(p, _)| param[p]);
    }

    pub fn stat_storage(&self) -> &Array2<f64> {
        &self.stat_storage
    }

    pub fn log_storage(&self) -> &Array2<f64> {
        &self.log_storage
    }

    /// Medians, i.e. the first statistic column
    pub fn median(&self) -> Vec<f64> {
        self.stat_storage.column(0).to_vec()
    }

    pub fn export(&self) -> Value {
        let rows = |m: &Array2<f64>| -> Vec<Vec<f64>> { m.outer_iter().map(|r| r.to_vec()).collect() };
        json!({
            "stat": rows(&self.stat_storage),
            "log": rows(&self.log_storage),
        })
    }
}
