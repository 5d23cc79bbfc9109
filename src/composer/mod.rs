//! Mixture composer
//!
//! The composer owns one plugin per variable together with everything that
//! ties the variables together: class proportions, conditional class
//! probabilities `tik`, class labels and the probability caches. Every step
//! of the SEM-Gibbs algorithm that involves more than one variable is
//! implemented here. Strategies only sequence these steps.
//!
//! Per-individual work is spread over rayon workers, each owning one row of
//! `tik` and one random stream. Anything that can fail inside a parallel
//! loop is collected first and reduced after the join.

mod diagnostics;
mod state;

pub use state::{ComposerState, PartitionStability, SemPhase};

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::{RunMode, StrategyConfig};
use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;
use crate::latent::{check_nb_ind_per_class, ClassSampler, ZClassInd};
use crate::mixture::{Mixture, VariableModel};
use crate::param::{ClassDataStat, ConfIntParamStat};
use crate::statistic::{child_rng, log_sum_exp, log_to_multi, master_rng, shuffle, MasterRng, RngPool};

/// Draws of a class and completed values tried per individual when
/// initializing the latent variables
pub const N_COMPLETED_INIT_TRY: usize = 10;

/// Random sub-partitions fitted when seeding the parameters
pub const N_INIT_CANDIDATE: usize = 10;

/// Classification passes refining the retained seed
pub const N_INIT_CLASSIFICATION_STEP: usize = 5;

/// Name of the class variable in data, descriptors and results
pub const Z_CLASS: &str = "z_class";

pub struct MixtureComposer {
    n_ind: usize,
    n_class: usize,
    confidence_level: f64,
    mode: RunMode,
    state: ComposerState,
    history: Vec<ComposerState>,

    variables: Vec<VariableModel>,
    prop: Array1<f64>,
    tik: Array2<f64>,
    z: ZClassInd,
    sampler: ClassSampler,

    /// `ln p(x_i^j | z_i = k)` per variable, `n_ind × n_class`
    observed_probability_cache: Vec<Array2<f64>>,
    /// `ln Σ_k p(x_i, z_i = k)` with completed values, from the last E-step
    completed_probability_cache: Array1<f64>,

    prop_stat: ConfIntParamStat,
    class_stat: ClassDataStat,
    completed_log_burn_in: Vec<f64>,
    completed_log_run: Vec<f64>,
    stability: PartitionStability,

    master: MasterRng,
    rng: MasterRng,
    pool: RngPool,
}

impl MixtureComposer {
    /// Empty composer sized by `config.n_ind` and `config.n_class`
    pub fn new(config: &StrategyConfig, mode: RunMode) -> Self {
        let n_ind = config.n_ind;
        let n_class = config.n_class.max(1);
        let mut master = master_rng(config.seed);
        let pool = RngPool::new(n_ind, &mut master);
        let rng = child_rng(&mut master);
        let uniform = 1.0 / n_class as f64;

        Self {
            n_ind,
            n_class,
            confidence_level: config.confidence_level,
            mode,
            state: ComposerState::Uninitialized,
            history: vec![ComposerState::Uninitialized],
            variables: Vec::new(),
            prop: Array1::from_elem(n_class, uniform),
            tik: Array2::from_elem((n_ind, n_class), uniform),
            z: ZClassInd::new(n_ind, n_class),
            sampler: ClassSampler::new(),
            observed_probability_cache: Vec::new(),
            completed_probability_cache: Array1::zeros(n_ind),
            prop_stat: ConfIntParamStat::new(config.confidence_level),
            class_stat: ClassDataStat::new(n_ind, n_class),
            completed_log_burn_in: Vec::new(),
            completed_log_run: Vec::new(),
            stability: PartitionStability::default(),
            master,
            rng,
            pool,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn n_ind(&self) -> usize {
        self.n_ind
    }

    pub fn n_class(&self) -> usize {
        self.n_class
    }

    pub fn n_var(&self) -> usize {
        self.variables.len()
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn state(&self) -> ComposerState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[ComposerState] {
        &self.history
    }

    pub fn variables(&self) -> &[VariableModel] {
        &self.variables
    }

    pub fn prop(&self) -> &Array1<f64> {
        &self.prop
    }

    pub fn tik(&self) -> &Array2<f64> {
        &self.tik
    }

    pub fn z(&self) -> &[usize] {
        self.z.z()
    }

    pub fn class_ind(&self) -> &[BTreeSet<usize>] {
        self.z.class_ind()
    }

    pub fn completed_probability_cache(&self) -> &Array1<f64> {
        &self.completed_probability_cache
    }

    /// Completed log-likelihood recorded at each iteration of `phase`
    pub fn completed_log(&self, phase: SemPhase) -> &[f64] {
        match phase {
            SemPhase::BurnIn => &self.completed_log_burn_in,
            SemPhase::Run => &self.completed_log_run,
        }
    }

    pub fn transition(&mut self, next: ComposerState) {
        debug!(from = ?self.state, to = ?next, "composer state");
        self.state = next;
        self.history.push(next);
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Loading
    // ═══════════════════════════════════════════════════════════════════════

    /// Builds one plugin per descriptor entry and hands it its data column
    ///
    /// `data` maps variable names to literal columns, `desc` maps variable
    /// names to `{ type, paramStr }`. In prediction, `param` is the
    /// `variable/param` subtree of a learning result. Returns the
    /// concatenated structural warnings of the plugins.
    pub fn set_data_param(&mut self, data: &ParamGraph, desc: &ParamGraph, param: Option<&ParamGraph>) -> Result<String> {
        let mut warn_log = String::new();

        if data.exists_payload(&[], Z_CLASS) {
            let literals: Vec<String> = data.get_payload(&[], Z_CLASS)?;
            self.z.set_supervision(&literals)?;
        }

        for id in desc.names(&[]) {
            if id == Z_CLASS {
                continue;
            }
            let model_type: String = desc.get_payload(&[id.as_str()], "type")?;
            let param_str: String = desc.get_payload_or(&[id.as_str()], "paramStr", String::new())?;
            let column: Vec<String> = data.get_payload(&[], &id)?;
            if column.len() != self.n_ind {
                return Err(MixtError::Data(format!(
                    "variable {} has {} entries for {} individuals",
                    id,
                    column.len(),
                    self.n_ind
                )));
            }

            let variable_param = match (self.mode, param) {
                (RunMode::Prediction, Some(p)) => Some(p.get_child(&[id.as_str()])?),
                (RunMode::Prediction, None) => {
                    return Err(MixtError::MissingPayload {
                        path: "variable/param".to_string(),
                        name: id,
                    })
                }
                (RunMode::Learning, _) => None,
            };

            let mut variable = VariableModel::from_descriptor(
                &id,
                &model_type,
                self.n_class,
                self.confidence_level,
                child_rng(&mut self.master),
            )?;
            let warning = variable.set_data_param(self.mode, &column, variable_param.as_ref(), &param_str)?;
            if !warning.is_empty() {
                warn_log.push_str(&format!("Variable {}: {}", id, warning));
            }
            self.variables.push(variable);
            self.observed_probability_cache
                .push(Array2::zeros((self.n_ind, self.n_class)));
        }

        if self.variables.is_empty() {
            return Err(MixtError::Config("the descriptor does not name any variable".to_string()));
        }
        if self.mode == RunMode::Prediction {
            let param = param.ok_or_else(|| MixtError::MissingPayload {
                path: "variable/param".to_string(),
                name: Z_CLASS.to_string(),
            })?;
            self.import_prop(param)?;
        }

        debug!(n_ind = self.n_ind, n_var = self.n_var(), n_class = self.n_class, "data loaded");
        self.transition(ComposerState::DataLoaded);
        Ok(warn_log)
    }

    fn import_prop(&mut self, param: &ParamGraph) -> Result<()> {
        let stat: Vec<Vec<f64>> = param.get_payload(&[Z_CLASS], "stat")?;
        if stat.len() != self.n_class {
            return Err(MixtError::Data(format!(
                "{} proportions imported for {} classes",
                stat.len(),
                self.n_class
            )));
        }
        let prop: Vec<f64> = stat.iter().map(|row| row.first().copied().unwrap_or(0.0)).collect();
        self.prop_stat.set_param_storage(&prop);
        self.prop = Array1::from(prop);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Initialization
    // ═══════════════════════════════════════════════════════════════════════

    /// Uniform `tik`, prior draw of the classes and of the unobserved values
    pub fn init_data(&mut self) {
        self.tik.fill(1.0 / self.n_class as f64);
        self.sample_z();
        for variable in &mut self.variables {
            variable.init_data(self.pool.streams_mut());
        }
    }

    /// Uniform proportions and plugin starting values
    pub fn init_param(&mut self) {
        self.prop.fill(1.0 / self.n_class as f64);
        for variable in &mut self.variables {
            variable.init_param();
        }
        self.transition(ComposerState::ParamInitialized);
    }

    /// Seeds the parameters so that the classes start apart
    ///
    /// Each of [`N_INIT_CANDIDATE`] candidates shuffles the individuals and
    /// hands `n_init_per_class` consecutive ones to every class, observed
    /// labels taking precedence. The candidate whose fit has the highest
    /// observed log-likelihood is kept, then refined by up to
    /// [`N_INIT_CLASSIFICATION_STEP`] passes that refit the plugins on the
    /// MAP partition. A pass whose partition breaks a sampling condition
    /// stops the refinement on the previous fit. Returns the warnings of the
    /// last candidate when none of them can be fitted.
    pub fn init_param_sub_partition(&mut self, n_init_per_class: usize) -> String {
        let block = n_init_per_class.min(self.n_ind / self.n_class).max(1);
        let mut best: Option<(f64, Vec<BTreeSet<usize>>)> = None;
        let mut warn_log = String::new();

        for _ in 0..N_INIT_CANDIDATE {
            let partial = self.random_sub_partition(block);
            warn_log = self.fit_partition(&partial);
            if !warn_log.is_empty() {
                continue;
            }
            self.compute_observed_proba();
            self.set_observed_proba_cache();
            let score = self.seed_score();
            if best.as_ref().map_or(true, |(b, _)| score > *b || b.is_nan()) {
                best = Some((score, partial));
            }
        }

        let (score, mut current) = match best {
            Some(b) => b,
            None => return warn_log,
        };
        let warn_log = self.fit_partition(&current);
        if !warn_log.is_empty() {
            return warn_log;
        }
        debug!(block, ln_observed = score, "sub-partition retained");

        for step in 0..N_INIT_CLASSIFICATION_STEP {
            self.compute_observed_proba();
            self.set_observed_proba_cache();
            let partition = self.partition_of(&self.z_mode());
            if partition == current {
                break;
            }
            if !self.fit_partition(&partition).is_empty() {
                debug!(step, "classification refinement stopped");
                return self.fit_partition(&current);
            }
            current = partition;
        }
        String::new()
    }

    /// Disjoint blocks of `block` shuffled individuals, one per class
    fn random_sub_partition(&mut self, block: usize) -> Vec<BTreeSet<usize>> {
        let mut individuals: Vec<usize> = (0..self.n_ind).collect();
        shuffle(&mut self.rng, &mut individuals);

        let mut partial = vec![BTreeSet::new(); self.n_class];
        for (position, &i) in individuals.iter().take(block * self.n_class).enumerate() {
            partial[self.z.admissible_class(i, position / block)].insert(i);
        }
        partial
    }

    /// Observed log-likelihood leaving out Monte-Carlo rows at -∞ in every class
    fn seed_score(&self) -> f64 {
        let ln_prop = self.prop.mapv(f64::ln);
        let approximated = self.approximated();
        (0..self.n_ind)
            .into_par_iter()
            .map(|i| log_sum_exp(&observed_row(&self.observed_probability_cache, &approximated, &ln_prop, i)))
            .sum()
    }

    fn approximated(&self) -> Vec<bool> {
        self.variables
            .iter()
            .map(|v| v.sample_approximation_of_observed_proba())
            .collect()
    }

    fn partition_of(&self, z: &[usize]) -> Vec<BTreeSet<usize>> {
        let mut partition = vec![BTreeSet::new(); self.n_class];
        for (i, &k) in z.iter().enumerate() {
            partition[k].insert(i);
        }
        partition
    }

    /// Proportions and plugins fitted on `partition`, untouched when one of
    /// its sampling conditions fails
    fn fit_partition(&mut self, partition: &[BTreeSet<usize>]) -> String {
        let warn_log = self.check_sample_condition_on(partition);
        if !warn_log.is_empty() {
            return warn_log;
        }
        let total = partition.iter().map(BTreeSet::len).sum::<usize>().max(1) as f64;
        for (p, members) in self.prop.iter_mut().zip(partition) {
            *p = members.len() as f64 / total;
        }
        m_step_variables(&mut self.variables, partition)
    }

    /// Draws classes and completed values with non-zero density for every
    /// individual, then starts the latent chains
    ///
    /// Each individual gets [`N_COMPLETED_INIT_TRY`] attempts at drawing a
    /// class from the proportions and its unobserved values given that
    /// class. An individual that never reaches a finite completed
    /// probability makes the whole initialization fail with a warning.
    pub fn initialize_latent(&mut self) -> String {
        self.compute_observed_proba();
        self.set_observed_proba_cache();
        self.sample_z_proportion();

        let mut warn_log = String::new();
        for i in 0..self.n_ind {
            let initialized = (0..N_COMPLETED_INIT_TRY).any(|_| {
                self.sample_class_ind(i);
                self.sample_unobserved_and_latent_ind(i);
                self.e_step_completed_ind(i)
            });
            if !initialized {
                warn_log.push_str(&format!(
                    "initializeLatent, problem with observation {}, impossible to initialize latent values. \
                     Individual is too different from rest of population and has too many latent variables \
                     (for example, missing values).\n",
                    i
                ));
            }
        }
        if !warn_log.is_empty() {
            return warn_log;
        }

        self.sample_z();
        let z = self.z.z();
        for variable in &mut self.variables {
            variable.initialize_markov_chain(z, self.pool.streams_mut());
        }
        self.sample_unobserved_and_latent();
        self.transition(ComposerState::LatentInitialized);
        String::new()
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  E-step
    // ═══════════════════════════════════════════════════════════════════════

    /// `ln p(x_i, z_i = k)` with observed (marginal) probabilities
    pub fn ln_observed_probability(&self, i: usize, k: usize) -> f64 {
        self.prop[k].ln()
            + self
                .observed_probability_cache
                .iter()
                .map(|cache| cache[[i, k]])
                .sum::<f64>()
    }

    /// `ln p(x_i, z_i = k)` with completed values
    pub fn ln_completed_probability(&self, i: usize, k: usize) -> f64 {
        self.prop[k].ln()
            + self
                .variables
                .iter()
                .map(|v| v.ln_completed_probability(i, k))
                .sum::<f64>()
    }

    /// Lets every plugin refresh its observed-probability approximation
    pub fn compute_observed_proba(&mut self) {
        self.variables
            .par_iter_mut()
            .for_each(|v| v.compute_observed_proba());
    }

    /// Fills the per-variable observed-probability caches
    pub fn set_observed_proba_cache(&mut self) {
        for (variable, cache) in self.variables.iter().zip(self.observed_probability_cache.iter_mut()) {
            cache
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, mut row)| {
                    for (k, value) in row.iter_mut().enumerate() {
                        *value = variable.ln_observed_probability(i, k);
                    }
                });
        }
    }

    /// Sets `tik` to the class probabilities given the observed values
    ///
    /// For plugins whose observed probability is a Monte-Carlo estimate, a
    /// row at -∞ in every class carries no information and is left out of
    /// the sum. Individuals still at zero density in every class are listed
    /// in the returned warning.
    pub fn e_step_observed(&mut self) -> String {
        let ln_prop = self.prop.mapv(f64::ln);
        let caches = &self.observed_probability_cache;
        let approximated = self.approximated();

        let zero_density: Vec<bool> = self
            .tik
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(i, mut row)| {
                let mut ln_p = observed_row(caches, &approximated, &ln_prop, i);
                if log_to_multi(&mut ln_p) == f64::NEG_INFINITY {
                    return true;
                }
                row.iter_mut().zip(&ln_p).for_each(|(t, &p)| *t = p);
                false
            })
            .collect();

        zero_density
            .iter()
            .enumerate()
            .filter(|(_, &zero)| zero)
            .map(|(i, _)| format!("Error in eStepObserved: observation {} has a 0 density of probability.\n", i))
            .collect()
    }

    /// Sets `tik` to the class probabilities given the completed values
    ///
    /// The normalizer of each row goes to the completed probability cache.
    /// An individual with zero completed probability in every class cannot
    /// happen once the latent variables are initialized, so it is reported
    /// as an invariant violation after every row has been processed.
    pub fn e_step_completed(&mut self) -> Result<()> {
        let ln_prop = self.prop.mapv(f64::ln);
        let variables = &self.variables;

        let normalizers: Vec<f64> = self
            .tik
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(i, mut row)| {
                let mut ln_p = completed_row(variables, &ln_prop, i);
                let normalizer = log_to_multi(&mut ln_p);
                if normalizer > f64::NEG_INFINITY {
                    row.iter_mut().zip(&ln_p).for_each(|(t, &p)| *t = p);
                }
                normalizer
            })
            .collect();

        let failed: Vec<String> = normalizers
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == f64::NEG_INFINITY)
            .map(|(i, _)| i.to_string())
            .collect();
        self.completed_probability_cache = Array1::from(normalizers);

        if !failed.is_empty() {
            return Err(MixtError::InvariantViolation(format!(
                "eStepCompleted: individuals {} have a null completed probability in every class",
                failed.join(", ")
            )));
        }
        Ok(())
    }

    /// Single-individual E-step, false when every class has zero probability
    pub fn e_step_completed_ind(&mut self, i: usize) -> bool {
        let ln_prop = self.prop.mapv(f64::ln);
        let mut ln_p = completed_row(&self.variables, &ln_prop, i);
        let normalizer = log_to_multi(&mut ln_p);
        self.completed_probability_cache[i] = normalizer;
        if normalizer == f64::NEG_INFINITY {
            return false;
        }
        self.tik.row_mut(i).iter_mut().zip(&ln_p).for_each(|(t, &p)| *t = p);
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  S-step
    // ═══════════════════════════════════════════════════════════════════════

    pub fn sample_z(&mut self) {
        self.sampler.s_step_all(&mut self.z, &self.tik, self.pool.streams_mut());
    }

    /// Draws the classes from the proportions alone
    pub fn sample_z_proportion(&mut self) {
        for mut row in self.tik.rows_mut() {
            row.assign(&self.prop);
        }
        self.sample_z();
    }

    fn sample_class_ind(&mut self, i: usize) {
        let rng = self.pool.get_mut(i);
        self.sampler.s_step(&mut self.z, &self.tik, i, rng);
    }

    pub fn sample_unobserved_and_latent(&mut self) {
        let z = self.z.z();
        for variable in &mut self.variables {
            variable.sample_unobserved_and_latent(z, self.pool.streams_mut());
        }
    }

    pub fn sample_unobserved_and_latent_ind(&mut self, i: usize) {
        let k = self.z.z()[i];
        let rng = self.pool.get_mut(i);
        for variable in &mut self.variables {
            variable.sample_unobserved_and_latent_ind(i, k, rng);
        }
    }

    pub fn check_nb_ind_per_class(&self) -> String {
        self.z.check_nb_ind_per_class()
    }

    /// Empty classes plus the plugins' own conditions on the current partition
    pub fn check_sample_condition(&self) -> String {
        self.check_sample_condition_on(self.z.class_ind())
    }

    fn check_sample_condition_on(&self, class_ind: &[BTreeSet<usize>]) -> String {
        let mut warn_log = check_nb_ind_per_class(class_ind);
        let per_variable: Vec<String> = self
            .variables
            .par_iter()
            .map(|v| {
                let warning = v.check_sample_condition(class_ind);
                if warning.is_empty() {
                    warning
                } else {
                    format!("checkSampleCondition, error in variable {}\n{}", v.id_name(), warning)
                }
            })
            .collect();
        warn_log.push_str(&per_variable.concat());
        warn_log
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  M-step
    // ═══════════════════════════════════════════════════════════════════════

    /// Proportions as class frequencies
    pub fn m_step_pi(&mut self) {
        let n = self.n_ind.max(1) as f64;
        for (p, members) in self.prop.iter_mut().zip(self.z.class_ind()) {
            *p = members.len() as f64 / n;
        }
    }

    /// Proportions, then every plugin in parallel
    pub fn m_step(&mut self) -> String {
        self.m_step_pi();
        m_step_variables(&mut self.variables, self.z.class_ind())
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Storage
    // ═══════════════════════════════════════════════════════════════════════

    /// Records one SEM iteration
    ///
    /// Both phases log the completed log-likelihood. The run phase also feeds
    /// the parameter statistics; at `iteration == iteration_max` the
    /// proportions and plugin parameters are replaced by their medians.
    pub fn store_sem_run(&mut self, iteration: usize, iteration_max: usize, phase: SemPhase) {
        let completed = self.completed_probability_cache.sum();
        let log = match phase {
            SemPhase::BurnIn => &mut self.completed_log_burn_in,
            SemPhase::Run => &mut self.completed_log_run,
        };
        if iteration == 0 {
            log.clear();
        }
        log.push(completed);

        if phase == SemPhase::BurnIn {
            return;
        }
        self.variables
            .par_iter_mut()
            .for_each(|v| v.store_sem_run(iteration, iteration_max));

        let mut prop = self.prop.to_vec();
        self.prop_stat.sample_param(&prop, iteration, iteration_max);
        if iteration == iteration_max {
            self.prop_stat.normalize_param(&format!("nModality: {}", self.n_class));
            self.prop_stat.set_expectation_param(&mut prop);
            self.prop = Array1::from(prop);
        }
    }

    /// Records one Gibbs iteration, finalizing at the last one
    ///
    /// Finalizing imputes the unobserved classes and values with their
    /// statistics and replaces `tik` by the observed class probabilities.
    pub fn store_gibbs_run(&mut self, iteration: usize, iteration_max: usize) -> String {
        self.class_stat.sample_data(self.z.z(), iteration);
        self.variables
            .par_iter_mut()
            .for_each(|v| v.store_gibbs_run(iteration, iteration_max));

        if iteration < iteration_max {
            return String::new();
        }
        self.finalize()
    }

    fn finalize(&mut self) -> String {
        let imputed: Vec<(usize, usize)> = (0..self.n_ind)
            .filter(|&i| !self.z.zi().is_present(i))
            .map(|i| (i, self.class_stat.mode(i)))
            .collect();
        for (i, k) in imputed {
            self.z.set_z_and_class_ind(i, k);
        }

        self.compute_observed_proba();
        self.set_observed_proba_cache();
        let warn_log = self.e_step_observed();
        if !warn_log.is_empty() {
            warn!(n_ind = self.n_ind, "zero density individuals after the Gibbs phase");
        }
        self.transition(ComposerState::Finalized);
        warn_log
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Criteria
    // ═══════════════════════════════════════════════════════════════════════

    pub fn ln_observed_likelihood(&self) -> f64 {
        (0..self.n_ind)
            .into_par_iter()
            .map(|i| {
                let row: Vec<f64> = (0..self.n_class).map(|k| self.ln_observed_probability(i, k)).collect();
                log_sum_exp(&row)
            })
            .sum()
    }

    pub fn ln_completed_likelihood(&self) -> f64 {
        let z = self.z.z();
        (0..self.n_ind)
            .into_par_iter()
            .map(|i| self.ln_observed_probability(i, z[i]))
            .sum()
    }

    pub fn nb_free_parameters(&self) -> usize {
        self.n_class - 1 + self.variables.iter().map(|v| v.nb_free_parameter()).sum::<usize>()
    }

    pub fn bic(&self) -> f64 {
        self.ln_observed_likelihood() - self.penalty()
    }

    pub fn icl(&self) -> f64 {
        self.ln_completed_likelihood() - self.penalty()
    }

    fn penalty(&self) -> f64 {
        0.5 * self.nb_free_parameters() as f64 * (self.n_ind as f64).ln()
    }

    /// Class probabilities given the observed values, from the caches
    ///
    /// Rows at zero density in every class fall back to the proportions.
    pub fn observed_tik(&self) -> Array2<f64> {
        let ln_prop = self.prop.mapv(f64::ln);
        let approximated = self.approximated();

        let mut tik = Array2::zeros((self.n_ind, self.n_class));
        for (i, mut row) in tik.axis_iter_mut(Axis(0)).enumerate() {
            let mut ln_p = observed_row(&self.observed_probability_cache, &approximated, &ln_prop, i);
            if log_to_multi(&mut ln_p) > f64::NEG_INFINITY {
                row.iter_mut().zip(&ln_p).for_each(|(t, &p)| *t = p);
            } else {
                row.assign(&self.prop);
            }
        }
        tik
    }

    /// MAP class of each individual from the observed probabilities,
    /// among the classes its label allows
    pub fn z_mode(&self) -> Vec<usize> {
        self.observed_tik()
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(|&(k, _)| self.z.is_allowed(i, k))
                    .fold((self.z.z()[i], f64::NEG_INFINITY), |best, (k, &t)| if t > best.1 { (k, t) } else { best })
                    .0
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    //  Export
    // ═══════════════════════════════════════════════════════════════════════

    /// Writes classes, proportions and every plugin under `variable/*`
    pub fn export_data_param(&self, out: &mut ParamGraph) -> Result<()> {
        let completed: Vec<usize> = self.z.z().iter().map(|k| k + 1).collect();
        out.add_payload(&["variable", "type"], Z_CLASS, "LatentClass")?;
        out.add_payload(&["variable", "data", Z_CLASS], "completed", completed)?;
        out.add_payload(&["variable", "data", Z_CLASS], "stat", rows(&self.tik))?;
        out.add_payload(&["variable", "data", Z_CLASS], "empiricalTik", rows(&self.class_stat.empirical_tik()))?;

        let mut param = ParamGraph::from_value(self.prop_stat.export());
        param.add_payload(&[], "paramStr", format!("nModality: {}", self.n_class))?;
        let names: Vec<String> = (0..self.n_class).map(|k| format!("k: {}", k)).collect();
        param.add_payload(&[], "names", names)?;
        out.add_child(&["variable", "param"], Z_CLASS, param)?;

        for variable in &self.variables {
            variable.export_data_param(out)?;
        }
        Ok(())
    }
}

fn completed_row(variables: &[VariableModel], ln_prop: &Array1<f64>, i: usize) -> Vec<f64> {
    ln_prop
        .iter()
        .enumerate()
        .map(|(k, &lp)| lp + variables.iter().map(|v| v.ln_completed_probability(i, k)).sum::<f64>())
        .collect()
}

fn observed_row(caches: &[Array2<f64>], approximated: &[bool], ln_prop: &Array1<f64>, i: usize) -> Vec<f64> {
    let used: Vec<&Array2<f64>> = caches
        .iter()
        .zip(approximated)
        .filter(|(cache, &approx)| {
            !approx || cache.row(i).iter().any(|&v| v > f64::NEG_INFINITY)
        })
        .map(|(cache, _)| cache)
        .collect();
    ln_prop
        .iter()
        .enumerate()
        .map(|(k, &lp)| lp + used.iter().map(|cache| cache[[i, k]]).sum::<f64>())
        .collect()
}

fn m_step_variables(variables: &mut [VariableModel], class_ind: &[BTreeSet<usize>]) -> String {
    let warnings: Vec<String> = variables
        .par_iter_mut()
        .map(|v| {
            let warning = v.m_step(class_ind);
            if warning.is_empty() {
                warning
            } else {
                format!("mStep error in variable: {}\n{}", v.id_name(), warning)
            }
        })
        .collect();
    warnings.concat()
}

fn rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.outer_iter().map(|r| r.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gaussian_composer(values: &[f64], n_class: usize, seed: u64) -> MixtureComposer {
        let column: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let data = ParamGraph::from_value(json!({ "x": column }));
        let desc = ParamGraph::from_value(json!({ "x": { "type": "Gaussian", "paramStr": "" } }));
        let config = StrategyConfig::new(n_class).with_n_ind(values.len()).with_seed(seed);
        let mut composer = MixtureComposer::new(&config, RunMode::Learning);
        let warn_log = composer.set_data_param(&data, &desc, None).unwrap();
        assert!(warn_log.is_empty(), "{}", warn_log);
        composer
    }

    fn two_groups(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { -5.0 + (i % 7) as f64 * 0.1 } else { 5.0 - (i % 5) as f64 * 0.1 })
            .collect()
    }

    #[test]
    fn test_e_step_rows_sum_to_one() {
        let mut composer = gaussian_composer(&two_groups(60), 2, 3);
        composer.init_data();
        composer.init_param();
        assert!(composer.init_param_sub_partition(50).is_empty());
        assert!(composer.initialize_latent().is_empty());
        composer.e_step_completed().unwrap();

        for row in composer.tik().rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert!((composer.prop().sum() - 1.0).abs() < 1e-9);
        assert!(composer.completed_probability_cache().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_sub_partition_separates_groups() {
        let values = two_groups(80);
        for seed in 0..5 {
            let mut composer = gaussian_composer(&values, 2, seed);
            composer.init_data();
            composer.init_param();
            assert!(composer.init_param_sub_partition(10).is_empty());
            composer.compute_observed_proba();
            composer.set_observed_proba_cache();

            let mode = composer.z_mode();
            for (i, &k) in mode.iter().enumerate() {
                assert_eq!(k == mode[0], i % 2 == 0, "seed {}, individual {}", seed, i);
            }
            assert!((composer.prop().sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_z_mode_respects_labels() {
        let values = two_groups(20);
        let column: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let mut labels = vec!["?".to_string(); 20];
        labels[0] = "2".to_string();
        labels[1] = "1".to_string();
        let data = ParamGraph::from_value(json!({ "x": column, "z_class": labels }));
        let desc = ParamGraph::from_value(json!({ "x": { "type": "Gaussian", "paramStr": "" } }));
        let config = StrategyConfig::new(2).with_n_ind(20).with_seed(6);
        let mut composer = MixtureComposer::new(&config, RunMode::Learning);
        composer.set_data_param(&data, &desc, None).unwrap();
        composer.init_data();
        composer.init_param();
        assert!(composer.init_param_sub_partition(5).is_empty());
        composer.compute_observed_proba();
        composer.set_observed_proba_cache();

        let mode = composer.z_mode();
        assert_eq!(mode[0], 1);
        assert_eq!(mode[1], 0);
    }

    #[test]
    fn test_class_index_follows_labels() {
        let mut composer = gaussian_composer(&two_groups(40), 3, 5);
        composer.init_data();
        composer.sample_z();
        let sizes: usize = composer.class_ind().iter().map(|s| s.len()).sum();
        assert_eq!(sizes, 40);
        for (i, &k) in composer.z().iter().enumerate() {
            assert!(composer.class_ind()[k].contains(&i));
        }
    }

    #[test]
    fn test_m_step_pi_frequencies() {
        let mut composer = gaussian_composer(&two_groups(40), 2, 1);
        composer.init_data();
        composer.m_step_pi();
        let sizes = composer.class_ind().iter().map(|s| s.len() as f64 / 40.0);
        for (p, expected) in composer.prop().iter().zip(sizes) {
            assert!((p - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_criteria() {
        let mut composer = gaussian_composer(&two_groups(60), 2, 9);
        composer.init_data();
        composer.init_param();
        composer.set_observed_proba_cache();
        // 1 proportion, mean and sd per class
        assert_eq!(composer.nb_free_parameters(), 5);
        let penalty = 0.5 * 5.0 * (60.0f64).ln();
        assert!((composer.bic() - (composer.ln_observed_likelihood() - penalty)).abs() < 1e-9);
        assert!(composer.ln_completed_likelihood() <= composer.ln_observed_likelihood());
    }

    #[test]
    fn test_state_history() {
        let mut composer = gaussian_composer(&two_groups(20), 2, 2);
        composer.init_data();
        composer.init_param();
        assert_eq!(
            composer.history(),
            &[
                ComposerState::Uninitialized,
                ComposerState::DataLoaded,
                ComposerState::ParamInitialized
            ]
        );
    }

    #[test]
    fn test_column_length_mismatch() {
        let data = ParamGraph::from_value(json!({ "x": ["1.0", "2.0"] }));
        let desc = ParamGraph::from_value(json!({ "x": { "type": "Gaussian" } }));
        let config = StrategyConfig::new(2).with_n_ind(3);
        let mut composer = MixtureComposer::new(&config, RunMode::Learning);
        assert!(matches!(composer.set_data_param(&data, &desc, None), Err(MixtError::Data(_))));
    }

    #[test]
    fn test_zero_observed_density_is_reported() {
        let mut composer = gaussian_composer(&two_groups(10), 2, 4);
        composer.observed_probability_cache[0].row_mut(3).fill(f64::NEG_INFINITY);
        let warn_log = composer.e_step_observed();
        assert!(warn_log.contains("observation 3"));
        assert_eq!(warn_log.lines().count(), 1);
    }
}
