//! Per-variable plugin models
//!
//! Every variable of a dataset is handled by one plugin implementing
//! [`Mixture`]. The composer only talks to plugins through this trait and
//! never inspects their parameters. The set of plugin kinds is closed:
//! [`VariableModel`] enumerates them and is built from a descriptor naming
//! the model type.
//!
//! | type name          | plugin                                    |
//! |--------------------|-------------------------------------------|
//! | `Gaussian`         | [`gaussian::GaussianModel`]               |
//! | `Multinomial`      | [`multinomial::MultinomialModel`]         |
//! | `Poisson`          | [`poisson::PoissonModel`]                 |
//! | `Weibull`          | [`weibull::WeibullModel`]                 |
//! | `NegativeBinomial` | [`negative_binomial::NegativeBinomialModel`] |
//! | `Func_CS`          | [`functional::FunctionalMixture`]         |
//! | `Rank_ISR`         | [`rank::RankMixture`]                     |

pub mod functional;
pub mod gaussian;
pub mod multinomial;
pub mod negative_binomial;
pub mod poisson;
pub mod rank;
pub mod simple;
pub mod weibull;

use std::collections::BTreeSet;

use crate::config::RunMode;
use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;
use crate::statistic::{MasterRng, StreamRng};

pub use functional::FunctionalMixture;
pub use gaussian::GaussianModel;
pub use multinomial::MultinomialModel;
pub use negative_binomial::NegativeBinomialModel;
pub use poisson::PoissonModel;
pub use rank::RankMixture;
pub use simple::{SimpleMixture, SimpleModel};
pub use weibull::WeibullModel;

/// Capabilities of a per-variable plugin, as consumed by the composer
///
/// Methods returning a `String` report structural warnings: an empty string
/// means success, anything else aborts the current SEM try.
pub trait Mixture: Send + Sync {
    fn id_name(&self) -> &str;

    fn model_type(&self) -> &'static str;

    fn n_ind(&self) -> usize;

    /// Parses the data column and, in prediction, imports the parameters
    fn set_data_param(
        &mut self,
        mode: RunMode,
        data: &[String],
        param: Option<&ParamGraph>,
        param_str: &str,
    ) -> Result<String>;

    /// Sets starting parameter values (learning only)
    fn init_param(&mut self);

    /// Draws unobserved values from their range-only prior
    fn init_data(&mut self, rngs: &mut [StreamRng]);

    /// Redraws unobserved values and latent variables given the classes,
    /// in parallel, one stream per individual
    fn sample_unobserved_and_latent(&mut self, z: &[usize], rngs: &mut [StreamRng]);

    /// Same as [`sample_unobserved_and_latent`](Self::sample_unobserved_and_latent)
    /// for a single individual in class `k`
    fn sample_unobserved_and_latent_ind(&mut self, i: usize, k: usize, rng: &mut StreamRng);

    fn m_step(&mut self, class_ind: &[BTreeSet<usize>]) -> String;

    fn ln_observed_probability(&self, i: usize, k: usize) -> f64;

    fn ln_completed_probability(&self, i: usize, k: usize) -> f64;

    fn check_sample_condition(&self, class_ind: &[BTreeSet<usize>]) -> String;

    fn store_sem_run(&mut self, iteration: usize, iteration_max: usize);

    fn store_gibbs_run(&mut self, iteration: usize, iteration_max: usize);

    fn nb_free_parameter(&self) -> usize;

    fn export_data_param(&self, out: &mut ParamGraph) -> Result<()>;

    /// Refreshes any cached observed-probability approximation
    fn compute_observed_proba(&mut self) {}

    /// Prepares the latent chain once classes have been drawn
    fn initialize_markov_chain(&mut self, _z: &[usize], _rngs: &mut [StreamRng]) {}

    /// True when `ln_observed_probability` is a Monte-Carlo estimate that may
    /// be -∞ for every class even though the individual is valid
    fn sample_approximation_of_observed_proba(&self) -> bool {
        false
    }
}

/// Closed set of plugin kinds
pub enum VariableModel {
    Gaussian(SimpleMixture<GaussianModel>),
    Multinomial(SimpleMixture<MultinomialModel>),
    Poisson(SimpleMixture<PoissonModel>),
    Weibull(SimpleMixture<WeibullModel>),
    NegativeBinomial(SimpleMixture<NegativeBinomialModel>),
    Functional(FunctionalMixture),
    Rank(RankMixture),
}

impl VariableModel {
    /// Builds the plugin named by `model_type`
    pub fn from_descriptor(
        id_name: &str,
        model_type: &str,
        n_class: usize,
        confidence_level: f64,
        rng: MasterRng,
    ) -> Result<Self> {
        let model = match model_type {
            "Gaussian" => VariableModel::Gaussian(SimpleMixture::new(id_name, n_class, confidence_level)),
            "Multinomial" | "Categorical" => {
                VariableModel::Multinomial(SimpleMixture::new(id_name, n_class, confidence_level))
            }
            "Poisson" => VariableModel::Poisson(SimpleMixture::new(id_name, n_class, confidence_level)),
            "Weibull" => VariableModel::Weibull(SimpleMixture::new(id_name, n_class, confidence_level)),
            "NegativeBinomial" => {
                VariableModel::NegativeBinomial(SimpleMixture::new(id_name, n_class, confidence_level))
            }
            "Func_CS" => VariableModel::Functional(FunctionalMixture::new(id_name, n_class, confidence_level)),
            "Rank_ISR" => VariableModel::Rank(RankMixture::new(id_name, n_class, confidence_level, rng)),
            other => {
                return Err(MixtError::Config(format!(
                    "variable {}: unknown model type \"{}\"",
                    id_name, other
                )))
            }
        };
        Ok(model)
    }
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            VariableModel::Gaussian($m) => $body,
            VariableModel::Multinomial($m) => $body,
            VariableModel::Poisson($m) => $body,
            VariableModel::Weibull($m) => $body,
            VariableModel::NegativeBinomial($m) => $body,
            VariableModel::Functional($m) => $body,
            VariableModel::Rank($m) => $body,
        }
    };
}

impl Mixture for VariableModel {
    fn id_name(&self) -> &str {
        dispatch!(self, m => m.id_name())
    }

    fn model_type(&self) -> &'static str {
        dispatch!(self, m => m.model_type())
    }

    fn n_ind(&self) -> usize {
        dispatch!(self, m => m.n_ind())
    }

    fn set_data_param(
        &mut self,
        mode: RunMode,
        data: &[String],
        param: Option<&ParamGraph>,
        param_str: &str,
    ) -> Result<String> {
        dispatch!(self, m => m.set_data_param(mode, data, param, param_str))
    }

    fn init_param(&mut self) {
        dispatch!(self, m => m.init_param())
    }

    fn init_data(&mut self, rngs: &mut [StreamRng]) {
        dispatch!(self, m => m.init_data(rngs))
    }

    fn sample_unobserved_and_latent(&mut self, z: &[usize], rngs: &mut [StreamRng]) {
        dispatch!(self, m => m.sample_unobserved_and_latent(z, rngs))
    }

    fn sample_unobserved_and_latent_ind(&mut self, i: usize, k: usize, rng: &mut StreamRng) {
        dispatch!(self, m => m.sample_unobserved_and_latent_ind(i, k, rng))
    }

    fn m_step(&mut self, class_ind: &[BTreeSet<usize>]) -> String {
        dispatch!(self, m => m.m_step(class_ind))
    }

    fn ln_observed_probability(&self, i: usize, k: usize) -> f64 {
        dispatch!(self, m => m.ln_observed_probability(i, k))
    }

    fn ln_completed_probability(&self, i: usize, k: usize) -> f64 {
        dispatch!(self, m => m.ln_completed_probability(i, k))
    }

    fn check_sample_condition(&self, class_ind: &[BTreeSet<usize>]) -> String {
        dispatch!(self, m => m.check_sample_condition(class_ind))
    }

    fn store_sem_run(&mut self, iteration: usize, iteration_max: usize) {
        dispatch!(self, m => m.store_sem_run(iteration, iteration_max))
    }

    fn store_gibbs_run(&mut self, iteration: usize, iteration_max: usize) {
        dispatch!(self, m => m.store_gibbs_run(iteration, iteration_max))
    }

    fn nb_free_parameter(&self) -> usize {
        dispatch!(self, m => m.nb_free_parameter())
    }

    fn export_data_param(&self, out: &mut ParamGraph) -> Result<()> {
        dispatch!(self, m => m.export_data_param(out))
    }

    fn compute_observed_proba(&mut self) {
        dispatch!(self, m => m.compute_observed_proba())
    }

    fn initialize_markov_chain(&mut self, z: &[usize], rngs: &mut [StreamRng]) {
        dispatch!(self, m => m.initialize_markov_chain(z, rngs))
    }

    fn sample_approximation_of_observed_proba(&self) -> bool {
        dispatch!(self, m => m.sample_approximation_of_observed_proba())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistic::master_rng;

    #[test]
    fn test_factory() {
        for name in ["Gaussian", "Multinomial", "Poisson", "Weibull", "NegativeBinomial", "Func_CS", "Rank_ISR"] {
            let model = VariableModel::from_descriptor("v", name, 2, 0.95, master_rng(Some(0))).unwrap();
            assert_eq!(model.id_name(), "v");
        }
        let err = VariableModel::from_descriptor("v", "Ordinal", 2, 0.95, master_rng(Some(0)));
        assert!(matches!(err, Err(MixtError::Config(_))));
    }
}
