//! Latent class labels

pub mod class_sampler;
pub mod z_class_ind;

pub use class_sampler::ClassSampler;
pub use z_class_ind::{check_nb_ind_per_class, ZClassInd};
