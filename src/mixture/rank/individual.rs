//! One observed ranking under the insertion sorting model
//!
//! The ISR model generates a ranking `x` from a presentation order `y`: the
//! objects are taken in the order of `y` and inserted one after the other by
//! pairwise comparisons against the objects already placed. Each comparison
//! agrees with the central rank `mu` with probability `pi`. `y` is never
//! observed and is resampled by Gibbs moves together with the unobserved
//! positions of `x`.

use std::collections::BTreeMap;

use rand::Rng;

use crate::data::{parse_literal, MisVal};
use crate::error::{MixtError, Result};
use crate::statistic::special::ln_factorial;
use crate::statistic::{log_to_multi, sample_binomial, sample_categorical, sample_int, shuffle};

use super::rank_val::RankVal;

/// Observation of one position of a ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionObs {
    Present(usize),
    Missing,
    /// Object known to lie among these (sorted)
    Among(Vec<usize>),
}

impl PositionObs {
    fn is_authorized(&self, value: usize) -> bool {
        match self {
            PositionObs::Present(_) => false,
            PositionObs::Missing => true,
            PositionObs::Among(candidates) => candidates.binary_search(&value).is_ok(),
        }
    }
}

/// Parses `"1,3,2,4"`, each position being a 1-based object, `?` or `{a b}`
///
/// Returns `Ok(None)` when a position uses a kind of observation that
/// rankings do not support (intervals).
pub fn parse_rank(variable: &str, row: usize, literal: &str) -> Result<Option<Vec<PositionObs>>> {
    let tokens: Vec<&str> = literal.split(',').map(str::trim).collect();
    let n_pos = tokens.len();
    let mut obs = Vec::with_capacity(n_pos);
    let mut seen = vec![false; n_pos];
    let mut supported = true;
    for token in tokens {
        let (value, mis) = parse_literal::<usize>(token, 1).ok_or_else(|| MixtError::parse(variable, row, literal))?;
        let position = match mis {
            MisVal::Present => {
                if value >= n_pos || seen[value] {
                    return Err(MixtError::parse(variable, row, literal));
                }
                seen[value] = true;
                PositionObs::Present(value)
            }
            MisVal::Missing => PositionObs::Missing,
            MisVal::FiniteValues(candidates) => {
                if candidates.iter().any(|&c| c >= n_pos) {
                    return Err(MixtError::parse(variable, row, literal));
                }
                PositionObs::Among(candidates)
            }
            _ => {
                supported = false;
                PositionObs::Missing
            }
        };
        obs.push(position);
    }
    Ok(supported.then_some(obs))
}

fn ln_bernoulli_counts(a: usize, g: usize, pi: f64) -> f64 {
    let good = if g > 0 { g as f64 * pi.ln() } else { 0.0 };
    let bad = if a > g { (a - g) as f64 * (1.0 - pi).ln() } else { 0.0 };
    good + bad
}

#[derive(Debug, Clone)]
pub struct RankIndividual {
    /// `-ln(n_pos!)`, probability of a uniform presentation order
    ln_fac_nb_pos: f64,
    obs: Vec<PositionObs>,
    /// Completed ranking
    x: RankVal,
    /// Presentation order
    y: Vec<usize>,
    all_present: bool,
    all_missing: bool,
}

impl RankIndividual {
    pub fn new(obs: Vec<PositionObs>) -> Self {
        let n_pos = obs.len();
        let all_present = obs.iter().all(|p| matches!(p, PositionObs::Present(_)));
        let all_missing = obs.iter().all(|p| *p == PositionObs::Missing);
        let x = if all_present {
            let order = obs
                .iter()
                .map(|p| match p {
                    PositionObs::Present(v) => *v,
                    _ => 0,
                })
                .collect();
            RankVal::from_order(order).unwrap_or_else(|| RankVal::identity(n_pos))
        } else {
            RankVal::identity(n_pos)
        };
        Self {
            ln_fac_nb_pos: -ln_factorial(n_pos),
            obs,
            x,
            y: (0..n_pos).collect(),
            all_present,
            all_missing,
        }
    }

    /// Fully unobserved ranking of `n_pos` objects
    pub fn missing(n_pos: usize) -> Self {
        Self::new(vec![PositionObs::Missing; n_pos])
    }

    pub fn n_pos(&self) -> usize {
        self.obs.len()
    }

    pub fn x(&self) -> &RankVal {
        &self.x
    }

    pub fn set_x(&mut self, x: RankVal) {
        self.x = x;
    }

    pub fn y(&self) -> &[usize] {
        &self.y
    }

    pub fn all_present(&self) -> bool {
        self.all_present
    }

    pub fn all_missing(&self) -> bool {
        self.all_missing
    }

    pub fn y_gen<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        shuffle(rng, &mut self.y);
    }

    /// Generates `x` from the current `y`, returns `ln P(x, y)`
    pub fn x_gen<R: Rng + ?Sized>(&mut self, mu: &RankVal, pi: f64, rng: &mut R) -> f64 {
        let n_pos = self.n_pos();
        if n_pos == 0 {
            return 0.0;
        }
        let (ln_good, ln_bad) = (pi.ln(), (1.0 - pi).ln());
        let mut log_proba = 0.0;
        let mut x = Vec::with_capacity(n_pos);
        x.push(self.y[0]);
        for j in 1..n_pos {
            let curr = self.y[j];
            let mut placed = false;
            for i in 0..j {
                let mut comparison = mu.r()[curr] < mu.r()[x[i]];
                if sample_binomial(rng, pi) == 1 {
                    log_proba += ln_good;
                } else {
                    comparison = !comparison;
                    log_proba += ln_bad;
                }
                if comparison {
                    x.insert(i, curr);
                    placed = true;
                    break;
                }
            }
            if !placed {
                x.push(curr);
            }
        }
        if let Some(rank) = RankVal::from_order(x) {
            self.x = rank;
        }
        self.ln_fac_nb_pos + log_proba
    }

    /// Number of comparisons `a` and of comparisons agreeing with `mu` `g`
    /// needed to insert `y` into the current `x`
    pub fn ag(&self, mu: &RankVal) -> (usize, usize) {
        let n_pos = self.n_pos();
        let (mut a, mut g) = (0, 0);
        if n_pos == 0 {
            return (a, g);
        }
        let mut x = Vec::with_capacity(n_pos);
        x.push(self.y[0]);
        for j in 1..n_pos {
            let curr = self.y[j];
            let mut placed = false;
            for i in 0..j {
                placed = self.x.r()[curr] < self.x.r()[x[i]];
                a += 1;
                if placed == (mu.r()[curr] < mu.r()[x[i]]) {
                    g += 1;
                }
                if placed {
                    x.insert(i, curr);
                    break;
                }
            }
            if !placed {
                x.push(curr);
            }
        }
        (a, g)
    }

    pub fn ln_completed_probability(&self, mu: &RankVal, pi: f64) -> f64 {
        let (a, g) = self.ag(mu);
        self.ln_fac_nb_pos + ln_bernoulli_counts(a, g, pi)
    }

    /// One Gibbs sweep over adjacent transpositions of `y`
    pub fn sample_y<R: Rng + ?Sized>(&mut self, mu: &RankVal, pi: f64, rng: &mut R) {
        let mut current = self.ln_completed_probability(mu, pi);
        for p in 0..self.n_pos().saturating_sub(1) {
            self.y.swap(p, p + 1);
            let permuted = self.ln_completed_probability(mu, pi);
            let mut proba = [current, permuted];
            log_to_multi(&mut proba);
            if sample_categorical(rng, &proba) == 1 {
                current = permuted;
            } else {
                self.y.swap(p, p + 1);
            }
        }
    }

    /// True when the objects at `p` and `p + 1` may be swapped under the observation
    pub fn check_permutation(&self, p: usize) -> bool {
        let o = self.x.o();
        self.obs[p + 1].is_authorized(o[p]) && self.obs[p].is_authorized(o[p + 1])
    }

    /// One Gibbs sweep over the admissible adjacent transpositions of `x`
    pub fn sample_x<R: Rng + ?Sized>(&mut self, mu: &RankVal, pi: f64, rng: &mut R) {
        if self.all_present {
            return;
        }
        let mut current = self.ln_completed_probability(mu, pi);
        for p in 0..self.n_pos().saturating_sub(1) {
            if !self.check_permutation(p) {
                continue;
            }
            self.x.permutation(p);
            let permuted = self.ln_completed_probability(mu, pi);
            let mut proba = [current, permuted];
            log_to_multi(&mut proba);
            if sample_categorical(rng, &proba) == 1 {
                current = permuted;
            } else {
                self.x.permutation(p);
            }
        }
    }

    fn candidates(&self, pos: usize, available: &[bool]) -> Vec<usize> {
        match &self.obs[pos] {
            PositionObs::Present(v) => {
                if available[*v] {
                    vec![*v]
                } else {
                    Vec::new()
                }
            }
            PositionObs::Missing => (0..available.len()).filter(|&v| available[v]).collect(),
            PositionObs::Among(values) => values.iter().copied().filter(|&v| available[v]).collect(),
        }
    }

    fn enum_rec(&self, pos: usize, available: &mut [bool], completed: &mut Vec<usize>, out: &mut Vec<RankVal>) {
        if pos == self.n_pos() {
            if let Some(rank) = RankVal::from_order(completed.clone()) {
                out.push(rank);
            }
            return;
        }
        for v in self.candidates(pos, available) {
            available[v] = false;
            completed.push(v);
            self.enum_rec(pos + 1, available, completed, out);
            completed.pop();
            available[v] = true;
        }
    }

    /// Every ranking compatible with the observation
    pub fn enum_completed(&self) -> Vec<RankVal> {
        let mut available = vec![true; self.n_pos()];
        let mut completed = Vec::with_capacity(self.n_pos());
        let mut out = Vec::new();
        self.enum_rec(0, &mut available, &mut completed, &mut out);
        out
    }

    /// Uniform presentation order and uniform completion of `x`
    pub fn remove_missing<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.y = (0..self.n_pos()).collect();
        self.y_gen(rng);
        if self.all_missing {
            self.x = RankVal::identity(self.n_pos());
            return;
        }
        let mut completions = self.enum_completed();
        if !completions.is_empty() {
            let index = sample_int(rng, 0, completions.len() - 1);
            self.x = completions.swap_remove(index);
        }
    }

    /// Empirical distribution of `x` over `n_sample` generated (y, x) pairs
    pub fn observed_proba<R: Rng + ?Sized>(
        &mut self,
        mu: &RankVal,
        pi: f64,
        n_sample: usize,
        rng: &mut R,
    ) -> BTreeMap<RankVal, f64> {
        let mut proba: BTreeMap<RankVal, f64> = BTreeMap::new();
        for _ in 0..n_sample {
            self.y_gen(rng);
            self.x_gen(mu, pi, rng);
            *proba.entry(self.x.clone()).or_insert(0.0) += 1.0;
        }
        let n = n_sample.max(1) as f64;
        proba.values_mut().for_each(|p| *p /= n);
        proba
    }
}
