//! Post-estimation diagnostics and partition stability

use ndarray::Array2;
use rayon::prelude::*;

use crate::statistic::{log_to_multi, EPSILON};

use super::MixtureComposer;

impl MixtureComposer {
    /// `p(z_i = k | x_i^j)`, falling back to the proportions when the
    /// variable gives zero density in every class
    fn class_given_variable(&self, i: usize, j: usize) -> Vec<f64> {
        let cache = &self.observed_probability_cache[j];
        let mut t: Vec<f64> = self
            .prop
            .iter()
            .enumerate()
            .map(|(k, &p)| p.ln() + cache[[i, k]])
            .collect();
        if log_to_multi(&mut t) == f64::NEG_INFINITY {
            return self.prop.to_vec();
        }
        t
    }

    /// Discriminative power of each variable for each class, `n_class × n_var`
    ///
    /// Entropy of the class probabilities given the variable alone, summed
    /// over individuals and normalized by `n_ind ln n_class`.
    pub fn id_class(&self) -> Array2<f64> {
        let n_var = self.observed_probability_cache.len();
        if self.n_class < 2 {
            return Array2::ones((self.n_class, n_var));
        }
        let zero = || Array2::<f64>::zeros((self.n_class, n_var));
        let ekj = (0..self.n_ind)
            .into_par_iter()
            .fold(zero, |mut acc, i| {
                for j in 0..n_var {
                    for (k, t) in self.class_given_variable(i, j).into_iter().enumerate() {
                        if t > EPSILON {
                            acc[[k, j]] -= t * t.ln();
                        }
                    }
                }
                acc
            })
            .reduce(zero, |a, b| a + b);
        ekj / (self.n_ind as f64 * (self.n_class as f64).ln())
    }

    /// Similarity between variables, `n_var × n_var`
    ///
    /// One minus the root mean squared distance between the class
    /// probabilities each variable gives on its own.
    pub fn delta(&self) -> Array2<f64> {
        let n_var = self.observed_probability_cache.len();
        let zero = || Array2::<f64>::zeros((n_var, n_var));
        let distance = (0..self.n_ind)
            .into_par_iter()
            .fold(zero, |mut acc, i| {
                let proba_cond: Vec<Vec<f64>> = (0..n_var).map(|j| self.class_given_variable(i, j)).collect();
                for j in 0..n_var {
                    for h in j..n_var {
                        acc[[j, h]] += proba_cond[j]
                            .iter()
                            .zip(&proba_cond[h])
                            .map(|(a, b)| (a - b).powi(2))
                            .sum::<f64>();
                    }
                }
                acc
            })
            .reduce(zero, |a, b| a + b);

        let n = self.n_ind.max(1) as f64;
        let mut delta = Array2::zeros((n_var, n_var));
        for j in 0..n_var {
            for h in j..n_var {
                let d = 1.0 - (distance[[j, h]] / n).sqrt();
                delta[[j, h]] = d;
                delta[[h, j]] = d;
            }
        }
        delta
    }

    /// `ln p(x_i, z_i = k)` for every individual and class
    pub fn ln_proba_given_class(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_ind, self.n_class), |(i, k)| self.ln_observed_probability(i, k))
    }

    pub fn stability_reset(&mut self) {
        self.stability.reset();
    }

    /// Records the current partition, true once it has stayed stable for
    /// `n_stable` consecutive iterations
    pub fn is_partition_stable(&mut self, ratio: f64, n_stable: usize) -> bool {
        self.stability.update(self.z.z(), ratio, n_stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunMode, StrategyConfig};

    /// Variable 0 separates the classes perfectly, variable 1 carries no information
    fn composer_with_caches(n_ind: usize) -> MixtureComposer {
        let config = StrategyConfig::new(2).with_n_ind(n_ind).with_seed(0);
        let mut composer = MixtureComposer::new(&config, RunMode::Learning);
        let informative = Array2::from_shape_fn((n_ind, 2), |(i, k)| if i % 2 == k { 0.0 } else { -50.0 });
        let flat = Array2::zeros((n_ind, 2));
        composer.observed_probability_cache = vec![informative, flat];
        composer
    }

    #[test]
    fn test_id_class() {
        let idc = composer_with_caches(10).id_class();
        assert_eq!(idc.dim(), (2, 2));
        for k in 0..2 {
            assert!(idc[[k, 0]] < 1e-6);
            assert!((idc[[k, 1]] - 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_delta() {
        let delta = composer_with_caches(10).delta();
        assert!((delta[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((delta[[1, 1]] - 1.0).abs() < 1e-12);
        assert!((delta[[0, 1]] - (1.0 - 0.5f64.sqrt())).abs() < 1e-9);
        assert_eq!(delta[[0, 1]], delta[[1, 0]]);
    }

    #[test]
    fn test_ln_proba_given_class() {
        let composer = composer_with_caches(4);
        let p = composer.ln_proba_given_class();
        assert!((p[[0, 0]] - 0.5f64.ln()).abs() < 1e-12);
        assert!((p[[0, 1]] - (0.5f64.ln() - 50.0)).abs() < 1e-12);
    }
}
