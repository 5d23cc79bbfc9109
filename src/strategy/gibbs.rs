//! Gibbs sampling with fixed parameters

use tracing::{debug, info};

use crate::composer::{ComposerState, MixtureComposer};
use crate::config::StrategyConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct GibbsStrategy {
    nb_burn_in_iter: usize,
    nb_iter: usize,
}

impl GibbsStrategy {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            nb_burn_in_iter: config.nb_gibbs_burn_in_iter,
            nb_iter: config.nb_gibbs_iter,
        }
    }

    /// Burn-in, then recorded iterations feeding the data statistics
    ///
    /// The last recorded iteration finalizes the composer; its warning, if
    /// any, is returned.
    pub fn run(&self, composer: &mut MixtureComposer) -> Result<String> {
        info!(burn_in = self.nb_burn_in_iter, run = self.nb_iter, "Gibbs start");
        composer.transition(ComposerState::GibbsRefining);

        for iteration in 0..self.nb_burn_in_iter {
            Self::iterate(composer)?;
            debug!(iteration, "Gibbs burn-in iteration");
        }

        let mut warn_log = String::new();
        for iteration in 0..self.nb_iter {
            Self::iterate(composer)?;
            warn_log = composer.store_gibbs_run(iteration, self.nb_iter - 1);
            debug!(iteration, "Gibbs iteration");
        }
        Ok(warn_log)
    }

    fn iterate(composer: &mut MixtureComposer) -> Result<()> {
        composer.e_step_completed()?;
        composer.sample_z();
        composer.sample_unobserved_and_latent();
        Ok(())
    }
}
