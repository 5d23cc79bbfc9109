//! Rank plugin (`Rank_ISR`)
//!
//! Each individual ranks the same `n_pos` objects, possibly with unknown
//! positions. Classes follow the insertion sorting rank model with a
//! central rank `mu` and a precision `pi`. The observed probability has no
//! closed form and is estimated by generating rankings from each class, so
//! this plugin reports `sample_approximation_of_observed_proba`.
//!
//! Literal format: `"1,3,2,4"` with 1-based objects; a position may be `?`
//! or a finite set such as `{2 4}`. The parameter string is
//! `"nModality: x"`, x being the number of positions.

mod class;
mod individual;
mod rank_val;
mod stat;

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::config::{parse_n_modality, RunMode};
use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;
use crate::param::ConfIntParamStat;
use crate::statistic::{MasterRng, StreamRng};

use super::Mixture;

pub use class::{RankClass, NB_GIBBS_ITER_RANK_M_STEP, NB_SAMPLE_OBSERVED};
pub use individual::{parse_rank, PositionObs, RankIndividual};
pub use rank_val::RankVal;
pub use stat::RankStat;

/// Gibbs sweeps run on each individual once classes have been drawn
pub const NB_GIBBS_INI_ISR: usize = 10;

pub struct RankMixture {
    id_name: String,
    n_class: usize,
    n_pos: usize,
    confidence_level: f64,
    mode: RunMode,
    param_str: String,
    data: Vec<RankIndividual>,
    class: Vec<RankClass>,
    mu_stat: Vec<RankStat>,
    pi_stat: ConfIntParamStat,
    /// Individuals with at least one unobserved position, and their statistic
    data_stat: Vec<(usize, RankStat)>,
    rng: MasterRng,
}

impl RankMixture {
    pub fn new(id_name: &str, n_class: usize, confidence_level: f64, rng: MasterRng) -> Self {
        Self {
            id_name: id_name.to_string(),
            n_class,
            n_pos: 0,
            confidence_level,
            mode: RunMode::Learning,
            param_str: String::new(),
            data: Vec::new(),
            class: Vec::new(),
            mu_stat: Vec::new(),
            pi_stat: ConfIntParamStat::new(confidence_level),
            data_stat: Vec::new(),
            rng,
        }
    }

    pub fn n_pos(&self) -> usize {
        self.n_pos
    }

    pub fn class(&self, k: usize) -> &RankClass {
        &self.class[k]
    }

    pub fn data(&self) -> &[RankIndividual] {
        &self.data
    }

    fn pi(&self) -> Vec<f64> {
        self.class.iter().map(|c| c.pi).collect()
    }

    fn check_param_str(&mut self) -> String {
        if self.param_str.is_empty() {
            self.param_str = format!("nModality: {}", self.n_pos);
            return String::new();
        }
        match parse_n_modality(&self.param_str) {
            None => format!(
                "Variable: {} parameter string is not in the correct format, which should be \"nModality: x\" \
                 with x the number of modalities in the variable.\n",
                self.id_name
            ),
            Some(n) if n != self.n_pos => format!(
                "Variable: {} has {} modalities per rank in its descriptor (or the descriptor from learning, in case \
                 of prediction) but has {} modalities in its data. Those two numbers must be equal.\n",
                self.id_name, n, self.n_pos
            ),
            Some(_) => String::new(),
        }
    }

    fn import_param(&mut self, param: &ParamGraph) -> Result<()> {
        for k in 0..self.n_class {
            let key = format!("k: {}", k);
            let rows: Vec<Vec<usize>> = param.get_payload(&["mu", "stat", key.as_str()], "rank")?;
            let mu = rows
                .first()
                .and_then(|row| row.iter().map(|&v| v.checked_sub(1)).collect::<Option<Vec<usize>>>())
                .and_then(RankVal::from_order)
                .filter(|mu| mu.n_pos() == self.n_pos)
                .ok_or_else(|| {
                    MixtError::Data(format!("variable {}: invalid central rank for class {}", self.id_name, k))
                })?;
            self.mu_stat[k].set_storage(&mu);
            self.class[k].mu = mu;
        }

        let stat: Vec<Vec<f64>> = param.get_payload(&["pi"], "stat")?;
        let pi: Vec<f64> = stat.iter().filter_map(|row| row.first().copied()).collect();
        if pi.len() != self.n_class {
            return Err(MixtError::Data(format!(
                "variable {}: {} precisions imported, {} expected",
                self.id_name,
                pi.len(),
                self.n_class
            )));
        }
        for (class, &p) in self.class.iter_mut().zip(pi.iter()) {
            class.pi = p;
        }
        self.pi_stat.set_param_storage(&pi);
        Ok(())
    }
}

impl Mixture for RankMixture {
    fn id_name(&self) -> &str {
        &self.id_name
    }

    fn model_type(&self) -> &'static str {
        "Rank_ISR"
    }

    fn n_ind(&self) -> usize {
        self.data.len()
    }

    fn set_data_param(
        &mut self,
        mode: RunMode,
        data: &[String],
        param: Option<&ParamGraph>,
        param_str: &str,
    ) -> Result<String> {
        self.mode = mode;
        let mut individuals = Vec::with_capacity(data.len());
        let mut unsupported = Vec::new();
        for (row, literal) in data.iter().enumerate() {
            match parse_rank(&self.id_name, row, literal)? {
                Some(obs) => {
                    if !individuals.is_empty() && obs.len() != self.n_pos {
                        return Err(MixtError::parse(&self.id_name, row, literal));
                    }
                    self.n_pos = obs.len();
                    individuals.push(RankIndividual::new(obs));
                }
                None => unsupported.push(row.to_string()),
            }
        }
        if !unsupported.is_empty() {
            return Ok(format!(
                "Rank variable {} contains individual described by missing data type not implemented yet. \
                 The list of problematic individuals is: {}\n",
                self.id_name,
                unsupported.join(", ")
            ));
        }
        self.data = individuals;
        self.class = (0..self.n_class).map(|_| RankClass::new(self.n_pos)).collect();
        self.mu_stat = (0..self.n_class).map(|_| RankStat::new(self.confidence_level)).collect();

        self.param_str = match (mode, param) {
            (RunMode::Prediction, Some(p)) => p.get_payload_or(&[], "paramStr", param_str.to_string())?,
            _ => param_str.to_string(),
        };
        let warn_log = self.check_param_str();

        if mode == RunMode::Prediction && warn_log.is_empty() {
            let param = param.ok_or_else(|| MixtError::MissingPayload {
                path: format!("variable/param/{}", self.id_name),
                name: "mu".to_string(),
            })?;
            self.import_param(param)?;
        }

        self.data_stat = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, ind)| !ind.all_present())
            .map(|(i, _)| (i, RankStat::new(self.confidence_level)))
            .collect();
        debug!(variable = %self.id_name, n_ind = self.data.len(), n_pos = self.n_pos, "rank variable loaded");
        Ok(warn_log)
    }

    fn init_param(&mut self) {
        self.class.iter_mut().for_each(|c| c.init_param());
    }

    fn init_data(&mut self, rngs: &mut [StreamRng]) {
        self.data
            .par_iter_mut()
            .zip(rngs.par_iter_mut())
            .for_each(|(ind, rng)| ind.remove_missing(rng));
    }

    fn sample_unobserved_and_latent(&mut self, z: &[usize], rngs: &mut [StreamRng]) {
        let class = &self.class;
        self.data
            .par_iter_mut()
            .zip(z.par_iter())
            .zip(rngs.par_iter_mut())
            .for_each(|((ind, &k), rng)| {
                ind.sample_y(&class[k].mu, class[k].pi, rng);
                ind.sample_x(&class[k].mu, class[k].pi, rng);
            });
    }

    fn sample_unobserved_and_latent_ind(&mut self, i: usize, k: usize, rng: &mut StreamRng) {
        let class = &self.class[k];
        self.data[i].sample_y(&class.mu, class.pi, rng);
        self.data[i].sample_x(&class.mu, class.pi, rng);
    }

    fn m_step(&mut self, class_ind: &[BTreeSet<usize>]) -> String {
        if self.mode == RunMode::Prediction {
            return String::new();
        }
        let mut warn_log = String::new();
        for (k, (class, members)) in self.class.iter_mut().zip(class_ind.iter()).enumerate() {
            let log = class.m_step(&self.data, members, &mut self.rng);
            if !log.is_empty() {
                warn_log.push_str(&format!("Error in class {}.\n{}", k, log));
            }
        }
        warn_log
    }

    fn ln_observed_probability(&self, i: usize, k: usize) -> f64 {
        self.class[k].ln_observed_probability(&self.data[i])
    }

    fn ln_completed_probability(&self, i: usize, k: usize) -> f64 {
        let class = &self.class[k];
        self.data[i].ln_completed_probability(&class.mu, class.pi)
    }

    /// The pooled comparisons of each class must be neither all correct nor
    /// all incorrect, otherwise pi would be estimated at 0 or 1
    fn check_sample_condition(&self, class_ind: &[BTreeSet<usize>]) -> String {
        for (class, members) in self.class.iter().zip(class_ind.iter()) {
            let (a, g) = members.iter().fold((0, 0), |(a, g), &i| {
                let (ai, gi) = self.data[i].ag(&class.mu);
                (a + ai, g + gi)
            });
            if g == 0 || g == a {
                return format!(
                    "Error in variable: {} with Rank_ISR model. The comparisons are uniformly correct or invalid in \
                     at least one class. If the number of different observed values is quite low, try using a \
                     categorical model instead.\n",
                    self.id_name
                );
            }
        }
        String::new()
    }

    fn store_sem_run(&mut self, iteration: usize, iteration_max: usize) {
        for (stat, class) in self.mu_stat.iter_mut().zip(self.class.iter()) {
            stat.sample_value(&class.mu, iteration, iteration_max);
        }
        let pi = self.pi();
        self.pi_stat.sample_param(&pi, iteration, iteration_max);
        if iteration == iteration_max {
            for (stat, class) in self.mu_stat.iter().zip(self.class.iter_mut()) {
                if let Some(mode) = stat.mode() {
                    class.mu = mode.clone();
                }
            }
            let mut pi = pi;
            self.pi_stat.set_expectation_param(&mut pi);
            for (class, p) in self.class.iter_mut().zip(pi) {
                class.pi = p;
            }
        }
    }

    fn store_gibbs_run(&mut self, iteration: usize, iteration_max: usize) {
        for (i, stat) in self.data_stat.iter_mut() {
            stat.sample_value(self.data[*i].x(), iteration, iteration_max);
            if iteration == iteration_max {
                if let Some(mode) = stat.mode() {
                    self.data[*i].set_x(mode.clone());
                }
            }
        }
    }

    /// Only the precisions count, the central ranks are discrete
    fn nb_free_parameter(&self) -> usize {
        self.n_class
    }

    fn export_data_param(&self, out: &mut ParamGraph) -> Result<()> {
        let id = self.id_name.as_str();
        let completed: Vec<Vec<usize>> = self.data.iter().map(|ind| ind.x().to_one_based()).collect();
        let stat: Vec<serde_json::Value> = self
            .data_stat
            .iter()
            .map(|(i, stat)| {
                let ranks: Vec<(Vec<usize>, f64)> = stat.stat().iter().map(|(r, p)| (r.to_one_based(), *p)).collect();
                serde_json::json!({ "index": i, "values": ranks })
            })
            .collect();
        out.add_payload(&["variable", "type"], id, "Rank_ISR")?;
        out.add_payload(&["variable", "data", id], "completed", completed)?;
        out.add_payload(&["variable", "data", id], "stat", stat)?;

        let mut param = ParamGraph::new();
        param.add_payload(&[], "paramStr", &self.param_str)?;
        param.add_payload(&[], "nClass", self.n_class)?;
        for (k, stat) in self.mu_stat.iter().enumerate() {
            let key = format!("k: {}", k);
            let rank: Vec<Vec<usize>> = stat.stat().iter().map(|(r, _)| r.to_one_based()).collect();
            let proba: Vec<f64> = stat.stat().iter().map(|(_, p)| *p).collect();
            param.add_payload(&["mu", "stat", key.as_str()], "rank", rank)?;
            param.add_payload(&["mu", "stat", key.as_str()], "proba", proba)?;
            let log: Vec<Vec<usize>> = stat.log().iter().map(RankVal::to_one_based).collect();
            param.add_payload(&["mu", "log"], &key, log)?;
        }
        let mut pi = ParamGraph::from_value(self.pi_stat.export());
        pi.add_payload(&[], "names", (0..self.n_class).map(|k| format!("k: {}, pi", k)).collect::<Vec<_>>())?;
        param.add_child(&[], "pi", pi)?;
        out.add_child(&["variable", "param"], id, param)?;
        Ok(())
    }

    fn compute_observed_proba(&mut self) {
        for class in &mut self.class {
            class.compute_observed_proba(&mut self.rng);
        }
    }

    fn initialize_markov_chain(&mut self, z: &[usize], rngs: &mut [StreamRng]) {
        for _ in 0..NB_GIBBS_INI_ISR {
            self.sample_unobserved_and_latent(z, rngs);
        }
    }

    fn sample_approximation_of_observed_proba(&self) -> bool {
        true
    }
}
