//! One observed function: time steps, values and sub-regression labels

use ndarray::Array2;
use rand::Rng;

use crate::error::{MixtError, Result};
use crate::statistic::{gaussian, log_to_multi, sample_categorical, sample_int};

use super::computation::{expectation, log_kappa, vandermonde};

#[derive(Debug, Clone, Default)]
pub struct Function {
    t: Vec<f64>,
    x: Vec<f64>,
    vandermonde: Array2<f64>,
    /// sub-regression label of each time step
    w: Vec<usize>,
}

/// Parses `"t1:x1,t2:x2,..."`
pub fn parse_function(variable: &str, row: usize, literal: &str, n_coeff: usize) -> Result<Function> {
    let mut t = Vec::new();
    let mut x = Vec::new();
    for pair in literal.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair
            .split_once(':')
            .and_then(|(a, b)| Some((a.trim().parse::<f64>().ok()?, b.trim().parse::<f64>().ok()?)));
        match parsed {
            Some((ti, xi)) if ti.is_finite() && xi.is_finite() => {
                t.push(ti);
                x.push(xi);
            }
            _ => return Err(MixtError::parse(variable, row, literal)),
        }
    }
    Ok(Function::new(t, x, n_coeff))
}

impl Function {
    pub fn new(t: Vec<f64>, x: Vec<f64>, n_coeff: usize) -> Self {
        let vandermonde = vandermonde(&t, n_coeff);
        let w = vec![0; t.len()];
        Self { t, x, vandermonde, w }
    }

    pub fn n_time(&self) -> usize {
        self.t.len()
    }

    pub fn t(&self) -> &[f64] {
        &self.t
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn w(&self) -> &[usize] {
        &self.w
    }

    #[cfg(test)]
    pub(crate) fn set_w(&mut self, w: Vec<usize>) {
        self.w = w;
    }

    pub fn vandermonde(&self) -> &Array2<f64> {
        &self.vandermonde
    }

    /// `ln κ_s(t_j) + ln N(x_j; V_j β_s, sd_s)` for every time step and sub-regression
    fn joint_log_proba(&self, alpha: &Array2<f64>, beta: &Array2<f64>, sd: &[f64]) -> Array2<f64> {
        let n_sub = alpha.nrows();
        let mut joint = Array2::zeros((self.n_time(), n_sub));
        for j in 0..self.n_time() {
            let lk = log_kappa(self.t[j], alpha);
            let row = self.vandermonde.row(j);
            for s in 0..n_sub {
                let mean = expectation(row, beta, s);
                joint[[j, s]] = lk[s] + gaussian::lpdf(self.x[j], mean, sd[s]);
            }
        }
        joint
    }

    /// Only the current labels contribute
    pub fn ln_completed_probability(&self, alpha: &Array2<f64>, beta: &Array2<f64>, sd: &[f64]) -> f64 {
        let joint = self.joint_log_proba(alpha, beta, sd);
        self.w.iter().enumerate().map(|(j, &s)| joint[[j, s]]).sum()
    }

    /// Labels are marginalized at every time step
    pub fn ln_observed_probability(&self, alpha: &Array2<f64>, beta: &Array2<f64>, sd: &[f64]) -> f64 {
        let joint = self.joint_log_proba(alpha, beta, sd);
        joint
            .rows()
            .into_iter()
            .map(|row| {
                let mut values = row.to_vec();
                log_to_multi(&mut values)
            })
            .sum()
    }

    /// Draws every label from its posterior given the class parameters
    pub fn sample_w<R: Rng + ?Sized>(&mut self, alpha: &Array2<f64>, beta: &Array2<f64>, sd: &[f64], rng: &mut R) {
        let joint = self.joint_log_proba(alpha, beta, sd);
        for (j, row) in joint.rows().into_iter().enumerate() {
            let mut proba = row.to_vec();
            if log_to_multi(&mut proba) == f64::NEG_INFINITY {
                self.w[j] = sample_int(rng, 0, proba.len() - 1);
            } else {
                self.w[j] = sample_categorical(rng, &proba);
            }
        }
    }

    /// Initial labels: each time step is shared between the two closest
    /// segment midpoints, in proportion to its distance to them
    pub fn remove_missing_quantile_mixing<R: Rng + ?Sized>(&mut self, quantile: &[f64], rng: &mut R) {
        let n_sub = quantile.len().saturating_sub(1);
        if n_sub == 0 {
            return;
        }
        let mid: Vec<f64> = quantile.windows(2).map(|q| 0.5 * (q[0] + q[1])).collect();
        for j in 0..self.n_time() {
            let t = self.t[j];
            let mut proba = vec![0.0; n_sub];
            if t < mid[0] {
                proba[0] = 1.0;
            } else if mid[n_sub - 1] <= t {
                proba[n_sub - 1] = 1.0;
            } else if let Some(s) = (0..n_sub - 1).find(|&s| mid[s] <= t && t < mid[s + 1]) {
                let left = t - mid[s];
                let right = mid[s + 1] - t;
                proba[s] = right / (left + right);
                proba[s + 1] = left / (left + right);
            }
            self.w[j] = sample_categorical(rng, &proba);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_parse() {
        let f = parse_function("f", 0, "0:1.5, 1:2.5,2:-1", 2).unwrap();
        assert_eq!(f.t(), &[0.0, 1.0, 2.0]);
        assert_eq!(f.x(), &[1.5, 2.5, -1.0]);
        assert_eq!(f.vandermonde()[[2, 1]], 2.0);
        assert!(matches!(parse_function("f", 3, "0:1,2", 2), Err(MixtError::Parse { row: 3, .. })));
    }

    #[test]
    fn test_observed_bounds_completed() {
        let mut f = Function::new(vec![0.0, 1.0, 2.0], vec![0.1, 1.9, 4.2], 2);
        let alpha = array![[0.0, 0.0], [0.0, 0.0]];
        let beta = array![[0.0, 2.0], [1.0, 0.0]];
        let sd = [0.5, 0.5];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        f.sample_w(&alpha, &beta, &sd, &mut rng);
        let observed = f.ln_observed_probability(&alpha, &beta, &sd);
        let completed = f.ln_completed_probability(&alpha, &beta, &sd);
        assert!(observed.is_finite());
        assert!(completed <= observed + 1e-12);
    }

    #[test]
    fn test_quantile_mixing_extremes() {
        let mut f = Function::new((0..10).map(|i| i as f64).collect(), vec![0.0; 10], 2);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        f.remove_missing_quantile_mixing(&[0.0, 5.0, 9.0], &mut rng);
        assert_eq!(f.w()[0], 0);
        assert_eq!(f.w()[9], 1);
    }
}
