//! Parameters of one class of the rank model

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use tracing::debug;

use crate::statistic::{log_to_multi, sample_categorical};

use super::individual::RankIndividual;
use super::rank_val::RankVal;

/// Generated (y, x) pairs per class for the observed probability
pub const NB_SAMPLE_OBSERVED: usize = 1000;
/// Candidate central ranks kept per M-step
pub const NB_GIBBS_ITER_RANK_M_STEP: usize = 10;
/// Gibbs sweeps allowed per kept candidate before the M-step gives up
const MAX_SWEEPS_PER_CANDIDATE: usize = 100;

const INIT_PI: f64 = 0.75;

#[derive(Debug, Clone)]
pub struct RankClass {
    pub mu: RankVal,
    pub pi: f64,
    /// Monte-Carlo distribution of the rankings generated by (mu, pi)
    observed_proba: BTreeMap<RankVal, f64>,
}

impl RankClass {
    pub fn new(n_pos: usize) -> Self {
        Self {
            mu: RankVal::identity(n_pos),
            pi: INIT_PI,
            observed_proba: BTreeMap::new(),
        }
    }

    pub fn init_param(&mut self) {
        self.mu = RankVal::identity(self.mu.n_pos());
        self.pi = INIT_PI;
    }

    /// Completed log-likelihood of the members, with the pooled comparison counts
    pub fn ln_completed_probability(&self, data: &[RankIndividual], members: &BTreeSet<usize>) -> (f64, usize, usize) {
        members.iter().fold((0.0, 0, 0), |(lp, a, g), &i| {
            let ind = &data[i];
            let (ai, gi) = ind.ag(&self.mu);
            (lp + ind.ln_completed_probability(&self.mu, self.pi), a + ai, g + gi)
        })
    }

    /// One Gibbs sweep over adjacent transpositions of `mu`
    pub fn sample_mu<R: Rng + ?Sized>(&mut self, data: &[RankIndividual], members: &BTreeSet<usize>, rng: &mut R) {
        let mut current = self.ln_completed_probability(data, members).0;
        for p in 0..self.mu.n_pos().saturating_sub(1) {
            self.mu.permutation(p);
            let permuted = self.ln_completed_probability(data, members).0;
            let mut proba = [current, permuted];
            log_to_multi(&mut proba);
            if sample_categorical(rng, &proba) == 1 {
                current = permuted;
            } else {
                self.mu.permutation(p);
            }
        }
    }

    /// Samples candidate central ranks and keeps the most likely one,
    /// with `pi` estimated as the share of agreeing comparisons
    pub fn m_step<R: Rng + ?Sized>(&mut self, data: &[RankIndividual], members: &BTreeSet<usize>, rng: &mut R) -> String {
        let mut best: Option<(f64, RankVal, f64)> = None;
        let mut kept = 0;
        let max_sweeps = NB_GIBBS_ITER_RANK_M_STEP * MAX_SWEEPS_PER_CANDIDATE;
        for _ in 0..max_sweeps {
            if kept == NB_GIBBS_ITER_RANK_M_STEP {
                break;
            }
            self.sample_mu(data, members, rng);
            let (log_proba, a, g) = self.ln_completed_probability(data, members);
            if 0 < g && g < a {
                kept += 1;
                if best.as_ref().map_or(true, |(lp, _, _)| log_proba > *lp) {
                    best = Some((log_proba, self.mu.clone(), g as f64 / a as f64));
                }
            }
        }
        match best {
            Some((log_proba, mu, pi)) => {
                debug!(mu = %mu, pi, log_proba, kept, "rank m-step");
                self.mu = mu;
                self.pi = pi;
                String::new()
            }
            None => "No central rank with comparisons neither all correct nor all incorrect was found.\n".to_string(),
        }
    }

    /// Refreshes the Monte-Carlo distribution from a fully unobserved individual
    pub fn compute_observed_proba<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut dummy = RankIndividual::missing(self.mu.n_pos());
        dummy.remove_missing(rng);
        self.observed_proba = dummy.observed_proba(&self.mu, self.pi, NB_SAMPLE_OBSERVED, rng);
    }

    /// Sum of the estimated probabilities of every completion of `ind`
    ///
    /// Completions never generated by the chain count as zero, so the result
    /// may be -∞ for a valid individual.
    pub fn ln_observed_probability(&self, ind: &RankIndividual) -> f64 {
        if ind.all_missing() {
            return 0.0;
        }
        let mut log_proba: Vec<f64> = ind
            .enum_completed()
            .iter()
            .map(|rank| self.observed_proba.get(rank).map_or(f64::NEG_INFINITY, |p| p.ln()))
            .collect();
        if log_proba.is_empty() {
            return f64::NEG_INFINITY;
        }
        log_to_multi(&mut log_proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::rank::individual::parse_rank;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generated(mu: &RankVal, pi: f64, n: usize, rng: &mut ChaCha8Rng) -> Vec<RankIndividual> {
        (0..n)
            .map(|_| {
                let mut ind = RankIndividual::missing(mu.n_pos());
                ind.remove_missing(rng);
                ind.y_gen(rng);
                ind.x_gen(mu, pi, rng);
                let literal = ind.x().to_string();
                let mut observed = RankIndividual::new(parse_rank("r", 0, &literal).unwrap().unwrap());
                observed.remove_missing(rng);
                observed
            })
            .collect()
    }

    #[test]
    fn test_m_step_finds_central_rank() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mu = RankVal::from_order(vec![2, 0, 3, 1]).unwrap();
        let mut data = generated(&mu, 0.95, 300, &mut rng);
        let members: BTreeSet<usize> = (0..data.len()).collect();
        let mut class = RankClass::new(4);
        for _ in 0..30 {
            for ind in &mut data {
                ind.sample_y(&class.mu, class.pi, &mut rng);
            }
            assert!(class.m_step(&data, &members, &mut rng).is_empty());
        }
        assert_eq!(class.mu, mu);
        assert!(class.pi > 0.8, "pi {}", class.pi);
    }

    #[test]
    fn test_observed_probability() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut class = RankClass::new(3);
        class.compute_observed_proba(&mut rng);
        let total: f64 = class.observed_proba.values().sum();
        assert!((total - 1.0).abs() < 1e-9);

        let full = RankIndividual::new(parse_rank("r", 0, "1,2,3").unwrap().unwrap());
        let partial = RankIndividual::new(parse_rank("r", 0, "1,?,?").unwrap().unwrap());
        assert!(class.ln_observed_probability(&full) <= class.ln_observed_probability(&partial));
        assert_eq!(class.ln_observed_probability(&RankIndividual::missing(3)), 0.0);
    }
}
