//! Statistics layer
//!
//! Seeded random streams, elementary samplers and the special functions the
//! plugins build their likelihoods on.

pub mod discrete;
pub mod gaussian;
pub mod negative_binomial;
pub mod poisson;
pub mod rng;
pub mod special;
pub mod weibull;

pub use discrete::{sample_binomial, sample_categorical, sample_int, shuffle};
pub use rng::{child_rng, master_rng, MasterRng, RngPool, StreamRng};
pub use special::{log_sum_exp, log_to_multi};

/// Numerical tolerance used for degeneracy checks (null variance, p ∈ {0, 1}, ...)
pub const EPSILON: f64 = 1e-8;
