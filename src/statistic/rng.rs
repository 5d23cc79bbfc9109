//! Seeded random streams
//!
//! A run has a single master seed. From it a [`RngPool`] derives one
//! independent `Xoshiro256PlusPlus` stream per individual, separated by
//! `jump()` (2^128 draws apart), so per-individual parallel sampling is both
//! race-free and reproducible whatever the thread count. Variable-level
//! randomness (M-step Gibbs, Monte-Carlo probabilities) uses a private
//! `ChaCha8Rng` per plugin, derived from the same master seed.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Stream handed to a worker owning one individual
pub type StreamRng = Xoshiro256PlusPlus;

/// Master / variable-level generator
pub type MasterRng = ChaCha8Rng;

/// Master generator, from a seed or from OS entropy
pub fn master_rng(seed: Option<u64>) -> MasterRng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Derives a child generator for a named consumer (a variable, the composer)
pub fn child_rng(master: &mut MasterRng) -> MasterRng {
    ChaCha8Rng::seed_from_u64(master.next_u64())
}

/// One independent stream per individual
#[derive(Debug, Clone)]
pub struct RngPool {
    streams: Vec<StreamRng>,
}

impl RngPool {
    /// Builds `n` streams, each one `jump()` ahead of the previous one
    pub fn new(n: usize, master: &mut MasterRng) -> Self {
        let mut current = Xoshiro256PlusPlus::seed_from_u64(master.next_u64());
        let mut streams = Vec::with_capacity(n);
        for _ in 0..n {
            streams.push(current.clone());
            current.jump();
        }
        Self { streams }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut StreamRng {
        &mut self.streams[i]
    }

    /// Exclusive slice, one stream per individual, for zipped parallel loops
    pub fn streams_mut(&mut self) -> &mut [StreamRng] {
        &mut self.streams
    }
}
