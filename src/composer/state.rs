//! Lifecycle of a composer

use serde::{Deserialize, Serialize};

/// The two halves of the SEM phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemPhase {
    /// Unrecorded iterations, only the completed log-likelihood is kept
    BurnIn,
    /// Recorded iterations feeding the parameter statistics
    Run,
}

impl SemPhase {
    pub fn name(self) -> &'static str {
        match self {
            SemPhase::BurnIn => "burn-in",
            SemPhase::Run => "run",
        }
    }
}

/// Where a composer stands between loading and export
///
/// A warning raised before [`ComposerState::Running`] sends control back
/// to the SEM retry loop, which restarts from [`ComposerState::DataLoaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComposerState {
    Uninitialized,
    DataLoaded,
    ParamInitialized,
    LatentInitialized,
    Running(SemPhase),
    GibbsRefining,
    Finalized,
}

impl Default for ComposerState {
    fn default() -> Self {
        ComposerState::Uninitialized
    }
}

/// Partition stability tracker for the early stop of the SEM phase
#[derive(Debug, Clone, Default)]
pub struct PartitionStability {
    last_partition: Option<Vec<usize>>,
    n_stable: usize,
}

impl PartitionStability {
    pub fn reset(&mut self) {
        self.last_partition = None;
        self.n_stable = 0;
    }

    /// Records `z` and returns true once `n_required` consecutive
    /// partitions each kept more than `ratio` of the labels unchanged
    pub fn update(&mut self, z: &[usize], ratio: f64, n_required: usize) -> bool {
        match &self.last_partition {
            Some(last) if !z.is_empty() => {
                let same = last.iter().zip(z).filter(|(a, b)| a == b).count();
                if ratio < same as f64 / z.len() as f64 {
                    self.n_stable += 1;
                } else {
                    self.n_stable = 0;
                }
            }
            _ => self.n_stable = 0,
        }
        self.last_partition = Some(z.to_vec());
        self.n_stable >= n_required
    }

    pub fn n_stable(&self) -> usize {
        self.n_stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_counts_consecutive_partitions() {
        let mut stability = PartitionStability::default();
        let z = vec![0, 1, 1, 0];
        assert!(!stability.update(&z, 0.9, 2));
        assert!(!stability.update(&z, 0.9, 2));
        assert!(stability.update(&z, 0.9, 2));

        // a single changed label out of 4 breaks the streak
        assert!(!stability.update(&[1, 1, 1, 0], 0.9, 2));
        assert_eq!(stability.n_stable(), 0);

        stability.reset();
        assert!(!stability.update(&z, 0.9, 1));
        assert!(stability.update(&z, 0.9, 1));
    }
}
