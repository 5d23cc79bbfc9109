//! Empirical distribution of sampled rankings

use std::collections::BTreeMap;

use super::rank_val::RankVal;

/// Frequencies of the rankings visited by a chain
///
/// Used both for the central rank of each class (SEM run phase) and for the
/// completed ranking of each partially observed individual (Gibbs phase).
#[derive(Debug, Clone)]
pub struct RankStat {
    confidence_level: f64,
    counts: BTreeMap<RankVal, usize>,
    log: Vec<RankVal>,
    n_sample: usize,
    /// Most frequent rankings, until their cumulated frequency reaches the confidence level
    stat: Vec<(RankVal, f64)>,
}

impl RankStat {
    pub fn new(confidence_level: f64) -> Self {
        Self {
            confidence_level,
            counts: BTreeMap::new(),
            log: Vec::new(),
            n_sample: 0,
            stat: Vec::new(),
        }
    }

    pub fn sample_value(&mut self, value: &RankVal, iteration: usize, iteration_max: usize) {
        if iteration == 0 {
            self.counts.clear();
            self.log.clear();
            self.n_sample = 0;
        }
        *self.counts.entry(value.clone()).or_insert(0) += 1;
        self.log.push(value.clone());
        self.n_sample += 1;
        if iteration == iteration_max {
            self.compute_stat();
        }
    }

    fn compute_stat(&mut self) {
        let n = self.n_sample.max(1) as f64;
        let mut sorted: Vec<(RankVal, f64)> = self.counts.iter().map(|(r, &c)| (r.clone(), c as f64 / n)).collect();
        // stable sort keeps ties in ranking order
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        self.stat.clear();
        let mut cumulated = 0.0;
        for (rank, p) in sorted {
            cumulated += p;
            self.stat.push((rank, p));
            if cumulated >= self.confidence_level {
                break;
            }
        }
    }

    /// Most frequent ranking
    pub fn mode(&self) -> Option<&RankVal> {
        self.stat.first().map(|(r, _)| r)
    }

    /// Imported ranking, held with probability one (prediction)
    pub fn set_storage(&mut self, value: &RankVal) {
        self.counts.clear();
        self.log.clear();
        self.n_sample = 0;
        self.stat = vec![(value.clone(), 1.0)];
    }

    pub fn stat(&self) -> &[(RankVal, f64)] {
        &self.stat
    }

    pub fn log(&self) -> &[RankVal] {
        &self.log
    }
}
