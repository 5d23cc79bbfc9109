//! S-step: categorical draw of class labels from `tik`

use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;

use crate::data::MisVal;
use crate::statistic::{sample_categorical, StreamRng};

use super::z_class_ind::ZClassInd;

/// Draws class labels under the (semi-)supervision constraints
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassSampler;

impl ClassSampler {
    pub fn new() -> Self {
        Self
    }

    /// Draw for one individual, restricted by its observation tag
    ///
    /// Present labels are returned as is. For a finite set the row is
    /// restricted to the allowed classes and renormalized, falling back to a
    /// uniform draw among them when every weight vanishes.
    pub fn sample_class(&self, tik_row: ArrayView1<f64>, mis: &MisVal<usize>, current: usize, rng: &mut StreamRng) -> usize {
        match mis {
            MisVal::Present => current,
            MisVal::FiniteValues(allowed) => {
                let weights: Vec<f64> = allowed.iter().map(|&k| tik_row[k]).collect();
                allowed[sample_categorical(rng, &weights)]
            }
            MisVal::Interval(a, b) => {
                let weights: Vec<f64> = (*a..=*b).map(|k| tik_row[k]).collect();
                a + sample_categorical(rng, &weights)
            }
            _ => {
                let row: Vec<f64> = tik_row.iter().copied().collect();
                sample_categorical(rng, &row)
            }
        }
    }

    /// S-step for a single individual
    pub fn s_step(&self, z: &mut ZClassInd, tik: &Array2<f64>, i: usize, rng: &mut StreamRng) {
        let k = self.sample_class(tik.row(i), &z.zi().mis_data[i], z.z()[i], rng);
        z.set_z_and_class_ind(i, k);
    }

    /// S-step for every individual
    ///
    /// Draws are computed in parallel, one stream per individual, then
    /// applied sequentially through the mutator.
    pub fn s_step_all(&self, z: &mut ZClassInd, tik: &Array2<f64>, rngs: &mut [StreamRng]) {
        let draws: Vec<usize> = {
            let zi = z.zi();
            tik.axis_iter(Axis(0))
                .into_par_iter()
                .zip(zi.mis_data.par_iter())
                .zip(zi.data.par_iter())
                .zip(rngs.par_iter_mut())
                .map(|(((row, mis), &current), rng)| self.sample_class(row, mis, current, rng))
                .collect()
        };
        z.set_all(&draws);
    }
}
