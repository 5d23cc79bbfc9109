//! MixtComp - Mixture composition engine
//!
//! This crate fits latent class mixture models (model-based clustering) on
//! datasets whose variables have heterogeneous types and may be partially
//! observed:
//! - Stochastic EM estimation with restarts, then Gibbs sampling
//! - Typed missing values (missing, finite set, interval, half-lines)
//! - One plugin model per variable behind a common contract
//! - Multiple imputation statistics and parameter confidence intervals
//!
//! # Modules
//!
//! ## Engine
//! - [`composer`] - Joint E/S/M steps, likelihoods and diagnostics
//! - [`strategy`] - SEM and Gibbs strategies
//! - [`run`] - Learning and prediction entry points
//!
//! ## Models
//! - [`mixture`] - Plugin contract and the Gaussian, Multinomial, Poisson,
//!   Weibull, NegativeBinomial, Func_CS and Rank_ISR plugins
//! - [`latent`] - Class labels and the class sampler
//!
//! ## Data and statistics
//! - [`data`] - Missing-value taxonomy, augmented data and literal parsing
//! - [`param`] - Running statistics on parameters and missing values
//! - [`statistic`] - Random streams, samplers and special functions
//!
//! ## Utilities
//! - [`graph`] - Named configuration and result tree
//! - [`config`] - Strategy hyperparameters
//! - [`utils`] - Thread pool configuration and timing
//!
//! # Example
//!
//! ```no_run
//! use mixtcomp::prelude::*;
//! use serde_json::json;
//!
//! let algo = ParamGraph::from_value(json!({ "nClass": 2, "seed": 1 }));
//! let data = ParamGraph::from_value(json!({ "x": ["-1.2", "?", "4.9", "[3.0:5.0]"] }));
//! let desc = ParamGraph::from_value(json!({ "x": { "type": "Gaussian", "paramStr": "" } }));
//! let result = learn(&algo, &data, &desc)?;
//! let warn_log: String = result.get_payload(&["mixture"], "warnLog")?;
//! # Ok::<(), MixtError>(())
//! ```

// Core error handling
pub mod error;

// Engine
pub mod composer;
pub mod run;
pub mod strategy;

// Models
pub mod latent;
pub mod mixture;

// Data and statistics
pub mod data;
pub mod param;
pub mod statistic;

// Utilities
pub mod config;
pub mod graph;
pub mod utils;

pub use error::{MixtError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{MixtError, Result};

    // Engine
    pub use crate::composer::{ComposerState, MixtureComposer, SemPhase};
    pub use crate::run::{learn, predict};
    pub use crate::strategy::{GibbsStrategy, SemStrategy};

    // Models
    pub use crate::latent::{ClassSampler, ZClassInd};
    pub use crate::mixture::{Mixture, VariableModel};

    // Data
    pub use crate::data::{AugmentedData, MisType, MisVal};

    // Configuration
    pub use crate::config::{RunMode, StrategyConfig};
    pub use crate::graph::ParamGraph;
    pub use crate::utils::ParallelConfig;
}
