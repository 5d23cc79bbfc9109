//! Run configuration
//!
//! Hyperparameters of the SEM-Gibbs strategy, read from the `algo` graph
//! (camelCase keys, every field optional except `nClass`) or built in code
//! with the `with_*` builders.

use serde::{Deserialize, Serialize};

use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;

/// Learning estimates parameters, prediction reuses imported ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Learning,
    Prediction,
}

/// SEM-Gibbs strategy hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyConfig {
    pub n_class: usize,
    /// Number of individuals, filled from the data
    pub n_ind: usize,
    pub confidence_level: f64,
    /// Number of SEM restarts before giving up
    pub n_sem_try: usize,
    /// Individuals per class used to seed the parameters
    pub n_init_per_class: usize,
    pub nb_burn_in_iter: usize,
    pub nb_iter: usize,
    pub nb_gibbs_burn_in_iter: usize,
    pub nb_gibbs_iter: usize,
    /// Fraction of unchanged labels for an iteration to count as stable
    pub ratio_stable_criterion: f64,
    /// Consecutive stable iterations that end the run phase early
    pub n_stable_criterion: usize,
    pub seed: Option<u64>,
    pub n_threads: Option<usize>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            n_class: 2,
            n_ind: 0,
            confidence_level: 0.95,
            n_sem_try: 20,
            n_init_per_class: 50,
            nb_burn_in_iter: 50,
            nb_iter: 50,
            nb_gibbs_burn_in_iter: 50,
            nb_gibbs_iter: 50,
            ratio_stable_criterion: 0.99,
            n_stable_criterion: 20,
            seed: None,
            n_threads: None,
        }
    }
}

impl StrategyConfig {
    pub fn new(n_class: usize) -> Self {
        Self {
            n_class,
            ..Self::default()
        }
    }

    /// Reads the configuration from an `algo` graph
    pub fn from_graph(algo: &ParamGraph) -> Result<Self> {
        if !algo.exists_payload(&[], "nClass") {
            return Err(MixtError::MissingPayload {
                path: "algo".to_string(),
                name: "nClass".to_string(),
            });
        }
        let config: StrategyConfig = serde_json::from_value(algo.value().clone())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_class == 0 {
            return Err(MixtError::Config("nClass must be at least 1".to_string()));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(MixtError::Config(format!(
                "confidenceLevel must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.n_sem_try == 0 {
            return Err(MixtError::Config("nSemTry must be at least 1".to_string()));
        }
        if self.nb_iter == 0 || self.nb_gibbs_iter == 0 {
            return Err(MixtError::Config("nbIter and nbGibbsIter must be at least 1".to_string()));
        }
        if !(self.ratio_stable_criterion > 0.0 && self.ratio_stable_criterion <= 1.0) {
            return Err(MixtError::Config(format!(
                "ratioStableCriterion must lie in (0, 1], got {}",
                self.ratio_stable_criterion
            )));
        }
        if self.n_threads == Some(0) {
            return Err(MixtError::Config("nThreads must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_n_ind(mut self, n_ind: usize) -> Self {
        self.n_ind = n_ind;
        self
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn with_n_sem_try(mut self, n: usize) -> Self {
        self.n_sem_try = n;
        self
    }

    pub fn with_n_init_per_class(mut self, n: usize) -> Self {
        self.n_init_per_class = n;
        self
    }

    pub fn with_sem_iterations(mut self, burn_in: usize, run: usize) -> Self {
        self.nb_burn_in_iter = burn_in;
        self.nb_iter = run;
        self
    }

    pub fn with_gibbs_iterations(mut self, burn_in: usize, run: usize) -> Self {
        self.nb_gibbs_burn_in_iter = burn_in;
        self.nb_gibbs_iter = run;
        self
    }

    pub fn with_stability(mut self, ratio: f64, n_stable: usize) -> Self {
        self.ratio_stable_criterion = ratio;
        self.n_stable_criterion = n_stable;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }
}

/// Value of `key` in a `"key1: v1, key2: v2"` parameter string
pub fn param_str_value(param_str: &str, key: &str) -> Option<usize> {
    param_str.split(',').find_map(|entry| {
        let (k, v) = entry.split_once(':')?;
        if k.trim() == key {
            v.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Modality count of a `"nModality: x"` parameter string
pub fn parse_n_modality(param_str: &str) -> Option<usize> {
    param_str_value(param_str, "nModality")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_graph_uses_defaults() {
        let algo = ParamGraph::from_value(json!({ "nClass": 3, "nbBurnInIter": 10, "seed": 4 }));
        let config = StrategyConfig::from_graph(&algo).unwrap();
        assert_eq!(config.n_class, 3);
        assert_eq!(config.nb_burn_in_iter, 10);
        assert_eq!(config.seed, Some(4));
        assert_eq!(config.nb_iter, StrategyConfig::default().nb_iter);
    }

    #[test]
    fn test_missing_n_class() {
        let algo = ParamGraph::from_value(json!({ "nbIter": 10 }));
        assert!(matches!(
            StrategyConfig::from_graph(&algo),
            Err(MixtError::MissingPayload { .. })
        ));
    }

    #[test]
    fn test_validate() {
        assert!(StrategyConfig::new(2).validate().is_ok());
        assert!(StrategyConfig::new(0).validate().is_err());
        assert!(StrategyConfig::new(2).with_confidence_level(1.5).validate().is_err());
    }

    #[test]
    fn test_param_str() {
        assert_eq!(parse_n_modality("nModality: 4"), Some(4));
        assert_eq!(param_str_value("nSub: 2, nCoeff: 3", "nCoeff"), Some(3));
        assert_eq!(parse_n_modality(""), None);
    }
}
