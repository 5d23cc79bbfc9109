//! Running statistics on missing values
//!
//! Fed only during the recorded Gibbs iterations. At the last iteration the
//! working value of each unobserved individual is replaced by a point
//! estimate: the median for continuous data, the mode for discrete data and
//! class labels.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde_json::{json, Value};

/// Per-type data statistic used by the simple plugins
pub trait DataStat<T>: Send + Sync {
    fn new(missing: Vec<usize>, confidence_level: f64) -> Self
    where
        Self: Sized;

    /// Logs the current completion, finalizing at `iteration == iteration_max`
    fn sample_data(&mut self, data: &[T], iteration: usize, iteration_max: usize);

    /// Overwrites unobserved entries with their point estimate
    fn impute(&self, data: &mut [T]);

    fn export(&self) -> Value;
}

// ═══════════════════════════════════════════════════════════════════════════
//  Continuous data
// ═══════════════════════════════════════════════════════════════════════════

/// Median and quantile bounds per missing individual
#[derive(Debug, Clone)]
pub struct ConfIntDataStat {
    confidence_level: f64,
    missing: Vec<usize>,
    samples: Vec<Vec<f64>>,
    /// median, lower, upper
    stat: Vec<[f64; 3]>,
}

impl DataStat<f64> for ConfIntDataStat {
    fn new(missing: Vec<usize>, confidence_level: f64) -> Self {
        let n = missing.len();
        Self {
            confidence_level,
            missing,
            samples: vec![Vec::new(); n],
            stat: vec![[0.0; 3]; n],
        }
    }

    fn sample_data(&mut self, data: &[f64], iteration: usize, iteration_max: usize) {
        if iteration == 0 {
            for s in &mut self.samples {
                s.clear();
                s.reserve(iteration_max + 1);
            }
        }
        for (m, &i) in self.missing.iter().enumerate() {
            self.samples[m].push(data[i]);
        }
        if iteration == iteration_max {
            let alpha = (1.0 - self.confidence_level) / 2.0;
            for (m, samples) in self.samples.iter_mut().enumerate() {
                if samples.is_empty() {
                    continue;
                }
                samples.sort_by(|a, b| a.total_cmp(b));
                let last = samples.len() - 1;
                let low = (alpha * last as f64) as usize;
                let high = (((1.0 - alpha) * last as f64) as usize + 1).min(last);
                self.stat[m] = [samples[last / 2], samples[low], samples[high]];
            }
        }
    }

    fn impute(&self, data: &mut [f64]) {
        for (m, &i) in self.missing.iter().enumerate() {
            data[i] = self.stat[m][0];
        }
    }

    fn export(&self) -> Value {
        let stat: Vec<Value> = self
            .missing
            .iter()
            .zip(self.stat.iter())
            .map(|(&i, s)| json!({ "index": i, "median": s[0], "low": s[1], "high": s[2] }))
            .collect();
        Value::Array(stat)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Discrete data
// ═══════════════════════════════════════════════════════════════════════════

/// Empirical distribution per missing individual
#[derive(Debug, Clone)]
pub struct DiscreteDataStat {
    confidence_level: f64,
    missing: Vec<usize>,
    counts: Vec<BTreeMap<usize, usize>>,
    n_sample: usize,
}

impl DiscreteDataStat {
    fn mode(counts: &BTreeMap<usize, usize>) -> Option<usize> {
        counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&v, _)| v)
    }
}

impl DataStat<usize> for DiscreteDataStat {
    fn new(missing: Vec<usize>, confidence_level: f64) -> Self {
        let n = missing.len();
        Self {
            confidence_level,
            missing,
            counts: vec![BTreeMap::new(); n],
            n_sample: 0,
        }
    }

    fn sample_data(&mut self, data: &[usize], iteration: usize, _iteration_max: usize) {
        if iteration == 0 {
            self.counts.iter_mut().for_each(|c| c.clear());
            self.n_sample = 0;
        }
        for (m, &i) in self.missing.iter().enumerate() {
            *self.counts[m].entry(data[i]).or_insert(0) += 1;
        }
        self.n_sample += 1;
    }

    fn impute(&self, data: &mut [usize]) {
        for (m, &i) in self.missing.iter().enumerate() {
            if let Some(mode) = Self::mode(&self.counts[m]) {
                data[i] = mode;
            }
        }
    }

    /// Most probable values, kept until their cumulated probability reaches the confidence level
    fn export(&self) -> Value {
        let n = self.n_sample.max(1) as f64;
        let stat: Vec<Value> = self
            .missing
            .iter()
            .zip(self.counts.iter())
            .map(|(&i, counts)| {
                let mut sorted: Vec<(usize, f64)> = counts.iter().map(|(&v, &c)| (v, c as f64 / n)).collect();
                sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
                let mut cumulated = 0.0;
                let mut kept = Vec::new();
                for (v, p) in sorted {
                    kept.push(json!([v, p]));
                    cumulated += p;
                    if cumulated >= self.confidence_level {
                        break;
                    }
                }
                json!({ "index": i, "values": kept })
            })
            .collect();
        Value::Array(stat)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Class labels
// ═══════════════════════════════════════════════════════════════════════════

/// Class frequencies over the recorded Gibbs iterations
#[derive(Debug, Clone)]
pub struct ClassDataStat {
    counts: Array2<f64>,
    n_sample: usize,
}

impl ClassDataStat {
    pub fn new(n_ind: usize, n_class: usize) -> Self {
        Self {
            counts: Array2::zeros((n_ind, n_class)),
            n_sample: 0,
        }
    }

    pub fn sample_data(&mut self, z: &[usize], iteration: usize) {
        if iteration == 0 {
            self.counts.fill(0.0);
            self.n_sample = 0;
        }
        for (i, &k) in z.iter().enumerate() {
            self.counts[[i, k]] += 1.0;
        }
        self.n_sample += 1;
    }

    /// Empirical class frequencies, one row per individual
    pub fn empirical_tik(&self) -> Array2<f64> {
        let n = self.n_sample.max(1) as f64;
        self.counts.mapv(|c| c / n)
    }

    /// Most frequent class of individual `i`
    pub fn mode(&self, i: usize) -> usize {
        self.counts
            .row(i)
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (k, &c)| if c > best.1 { (k, c) } else { best })
            .0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_imputation_median() {
        let mut stat = ConfIntDataStat::new(vec![1], 0.9);
        let iter_max = 4;
        let draws = [3.0, 1.0, 5.0, 2.0, 4.0];
        for (it, &d) in draws.iter().enumerate() {
            stat.sample_data(&[10.0, d], it, iter_max);
        }
        let mut data = vec![10.0, 0.0];
        stat.impute(&mut data);
        assert_eq!(data, vec![10.0, 3.0]);
    }

    #[test]
    fn test_discrete_imputation_mode() {
        let mut stat = DiscreteDataStat::new(vec![0], 0.9);
        for (it, &d) in [2usize, 1, 2, 2, 0].iter().enumerate() {
            stat.sample_data(&[d], it, 4);
        }
        let mut data = vec![0];
        stat.impute(&mut data);
        assert_eq!(data[0], 2);
        let exported = stat.export();
        assert_eq!(exported[0]["values"][0][0], 2);
    }

    #[test]
    fn test_class_data_stat() {
        let mut stat = ClassDataStat::new(2, 2);
        stat.sample_data(&[0, 1], 0);
        stat.sample_data(&[1, 1], 1);
        stat.sample_data(&[1, 1], 2);
        let tik = stat.empirical_tik();
        assert!((tik[[0, 1]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((tik.row(0).sum() - 1.0).abs() < 1e-12);
        assert_eq!(stat.mode(0), 1);
    }
}
