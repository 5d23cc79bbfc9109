//! Stochastic EM with restarts

use tracing::{debug, info, warn};

use crate::composer::{ComposerState, MixtureComposer, SemPhase};
use crate::config::StrategyConfig;
use crate::error::Result;

/// SEM phase: burn-in then recorded run, restarted on structural warnings
#[derive(Debug, Clone)]
pub struct SemStrategy {
    n_sem_try: usize,
    n_init_per_class: usize,
    nb_burn_in_iter: usize,
    nb_iter: usize,
    ratio_stable_criterion: f64,
    n_stable_criterion: usize,
}

impl SemStrategy {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            n_sem_try: config.n_sem_try,
            n_init_per_class: config.n_init_per_class,
            nb_burn_in_iter: config.nb_burn_in_iter,
            nb_iter: config.nb_iter,
            ratio_stable_criterion: config.ratio_stable_criterion,
            n_stable_criterion: config.n_stable_criterion,
        }
    }

    /// Runs tries until one completes without warning
    ///
    /// Returns an empty string on success, or the warning of the last try
    /// once `n_sem_try` tries have failed. Invariant violations end the run
    /// immediately.
    pub fn run(&self, composer: &mut MixtureComposer) -> Result<String> {
        info!(n_sem_try = self.n_sem_try, burn_in = self.nb_burn_in_iter, run = self.nb_iter, "SEM start");
        let mut last_warning = String::new();

        for n_try in 0..self.n_sem_try {
            if n_try > 0 {
                composer.transition(ComposerState::DataLoaded);
            }
            let warn_log = self.run_try(composer)?;
            if warn_log.is_empty() {
                info!(sem_try = n_try + 1, "SEM try succeeded");
                return Ok(String::new());
            }
            warn!(sem_try = n_try + 1, n_sem_try = self.n_sem_try, warning = %warn_log.trim_end(), "SEM try abandoned");
            last_warning = format!("SEM try {}: {}", n_try + 1, warn_log);
        }

        Ok(format!(
            "Number of SEM tries exhausted ({}). Last warning:\n{}",
            self.n_sem_try, last_warning
        ))
    }

    fn run_try(&self, composer: &mut MixtureComposer) -> Result<String> {
        composer.init_data();
        let warn_log = composer.check_nb_ind_per_class();
        if !warn_log.is_empty() {
            return Ok(warn_log);
        }

        composer.init_param();
        let warn_log = composer.init_param_sub_partition(self.n_init_per_class);
        if !warn_log.is_empty() {
            return Ok(warn_log);
        }

        let warn_log = composer.initialize_latent();
        if !warn_log.is_empty() {
            return Ok(warn_log);
        }

        let warn_log = self.run_sem(composer, SemPhase::BurnIn, self.nb_burn_in_iter)?;
        if !warn_log.is_empty() {
            return Ok(warn_log);
        }
        self.run_sem(composer, SemPhase::Run, self.nb_iter)
    }

    /// `n_iter` iterations of E, S and M steps
    ///
    /// Stops early once the partition is stable, the current iteration then
    /// becoming the last one for the statistics.
    pub fn run_sem(&self, composer: &mut MixtureComposer, phase: SemPhase, n_iter: usize) -> Result<String> {
        composer.transition(ComposerState::Running(phase));
        composer.stability_reset();

        for iteration in 0..n_iter {
            composer.e_step_completed()?;
            composer.sample_z();
            composer.sample_unobserved_and_latent();

            let warn_log = composer.check_sample_condition();
            if !warn_log.is_empty() {
                return Ok(warn_log);
            }
            let warn_log = composer.m_step();
            if !warn_log.is_empty() {
                return Ok(warn_log);
            }

            if composer.is_partition_stable(self.ratio_stable_criterion, self.n_stable_criterion) {
                composer.store_sem_run(iteration, iteration, phase);
                debug!(phase = phase.name(), iteration, "partition stable, early stop");
                break;
            }
            composer.store_sem_run(iteration, n_iter - 1, phase);
            debug!(phase = phase.name(), iteration, "SEM iteration");
        }
        Ok(String::new())
    }
}
