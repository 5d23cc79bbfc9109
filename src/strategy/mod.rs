//! Estimation strategies
//!
//! [`SemStrategy`] estimates the parameters (learning only) and
//! [`GibbsStrategy`] then samples the latent and unobserved values with the
//! parameters fixed, to impute them and compute the final class
//! probabilities. Both only sequence composer steps.

mod gibbs;
mod sem;

pub use gibbs::GibbsStrategy;
pub use sem::SemStrategy;
