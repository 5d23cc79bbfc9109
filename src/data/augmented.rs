//! Augmented data: observed values paired with a typed missing-value tag
//!
//! Every individual keeps its original [`MisVal`] tag for the whole run while
//! `data` always holds a concrete working value once a sampling pass has
//! been made. Before any parameter exists, unobserved entries are drawn from
//! a prior that only depends on the variable range (`remove_missing`).
//! Afterwards the owning plugin substitutes its per-class conditional
//! sampler for the same taxonomy.

use std::fmt::Debug;

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MixtError, Result};
use crate::statistic::discrete::{sample_among, sample_int};
use crate::statistic::StreamRng;

// ═══════════════════════════════════════════════════════════════════════════
//  Missing-value taxonomy
// ═══════════════════════════════════════════════════════════════════════════

/// Kind of an entry, used for counting and for accepted-kind checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MisType {
    Present,
    Missing,
    MissingFiniteValues,
    MissingIntervals,
    MissingLUIntervals,
    MissingRUIntervals,
}

impl MisType {
    pub const ALL: [MisType; 6] = [
        MisType::Present,
        MisType::Missing,
        MisType::MissingFiniteValues,
        MisType::MissingIntervals,
        MisType::MissingLUIntervals,
        MisType::MissingRUIntervals,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn description(self) -> &'static str {
        match self {
            MisType::Present => "present value",
            MisType::Missing => "missing value",
            MisType::MissingFiniteValues => "missing value among a finite set",
            MisType::MissingIntervals => "missing value in an interval",
            MisType::MissingLUIntervals => "missing value in a left-unbounded interval",
            MisType::MissingRUIntervals => "missing value in a right-unbounded interval",
        }
    }
}

/// Original observation of one individual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MisVal<T> {
    Present,
    Missing,
    FiniteValues(Vec<T>),
    Interval(T, T),
    LeftUnbounded(T),
    RightUnbounded(T),
}

impl<T> MisVal<T> {
    pub fn mis_type(&self) -> MisType {
        match self {
            MisVal::Present => MisType::Present,
            MisVal::Missing => MisType::Missing,
            MisVal::FiniteValues(_) => MisType::MissingFiniteValues,
            MisVal::Interval(..) => MisType::MissingIntervals,
            MisVal::LeftUnbounded(_) => MisType::MissingLUIntervals,
            MisVal::RightUnbounded(_) => MisType::MissingRUIntervals,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, MisVal::Present)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Value types
// ═══════════════════════════════════════════════════════════════════════════

/// Scalar stored in an [`AugmentedData`]: `f64` for continuous variables,
/// `usize` for counts and modalities
pub trait DataValue:
    Copy + PartialOrd + Default + Debug + Send + Sync + Serialize + 'static
{
    const IS_DISCRETE: bool;

    /// Parses a number, shifting it down by `offset` for discrete values
    fn parse_value(literal: &str, offset: usize) -> Option<Self>;

    /// Uniform draw in [low, high]
    fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, low: Self, high: Self) -> Self;

    /// Width of the support spanned by [min, max]
    fn span(min: Self, max: Self) -> Self;

    fn to_f64(self) -> f64;

    /// Inverse of the parsing offset, for reporting
    fn with_offset(self, offset: usize) -> Self;
}

impl DataValue for f64 {
    const IS_DISCRETE: bool = false;

    fn parse_value(literal: &str, _offset: usize) -> Option<Self> {
        literal.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, low: Self, high: Self) -> Self {
        if high <= low {
            return low;
        }
        rng.gen_range(low..=high)
    }

    fn span(min: Self, max: Self) -> Self {
        max - min
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn with_offset(self, _offset: usize) -> Self {
        self
    }
}

impl DataValue for usize {
    const IS_DISCRETE: bool = true;

    fn parse_value(literal: &str, offset: usize) -> Option<Self> {
        let raw = match literal.parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                let f = literal.parse::<f64>().ok()?;
                if f.fract() != 0.0 || !f.is_finite() {
                    return None;
                }
                f as i64
            }
        };
        let shifted = raw.checked_sub(offset as i64)?;
        usize::try_from(shifted).ok()
    }

    fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, low: Self, high: Self) -> Self {
        sample_int(rng, low, high)
    }

    fn span(min: Self, max: Self) -> Self {
        max - min + 1
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn with_offset(self, offset: usize) -> Self {
        self + offset
    }
}

/// Support of a variable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
    /// `max - min` (continuous) or the number of modalities `max - min + 1` (discrete)
    pub range: T,
}

impl<T: DataValue> Range<T> {
    pub fn new(min: T, max: T) -> Self {
        Self {
            min,
            max,
            range: T::span(min, max),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Augmented data
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct AugmentedData<T> {
    /// Working values, completed for unobserved entries
    pub data: Vec<T>,
    /// Original observation tags
    pub mis_data: Vec<MisVal<T>>,
    /// Number of individuals per [`MisType`]
    pub mis_count: [usize; 6],
    pub data_range: Option<Range<T>>,
}

impl<T: DataValue> AugmentedData<T> {
    /// `n` fully missing individuals
    pub fn new(n: usize) -> Self {
        let mut mis_count = [0; 6];
        mis_count[MisType::Missing.index()] = n;
        Self {
            data: vec![T::default(); n],
            mis_data: vec![MisVal::Missing; n],
            mis_count,
            data_range: None,
        }
    }

    /// Builds from per-individual tags and working values
    pub fn from_parts(data: Vec<T>, mis_data: Vec<MisVal<T>>) -> Result<Self> {
        if data.len() != mis_data.len() {
            return Err(MixtError::Data(format!(
                "{} values for {} observation tags",
                data.len(),
                mis_data.len()
            )));
        }
        let mut mis_count = [0; 6];
        for m in &mis_data {
            mis_count[m.mis_type().index()] += 1;
        }
        Ok(Self {
            data,
            mis_data,
            mis_count,
            data_range: None,
        })
    }

    pub fn n_ind(&self) -> usize {
        self.data.len()
    }

    pub fn n_missing(&self) -> usize {
        self.n_ind() - self.mis_count[MisType::Present.index()]
    }

    pub fn is_present(&self, i: usize) -> bool {
        self.mis_data[i].is_present()
    }

    /// Indices of the individuals with an unobserved value
    pub fn missing_indices(&self) -> Vec<usize> {
        (0..self.n_ind()).filter(|&i| !self.is_present(i)).collect()
    }

    /// Derives min / max from present values and from every finite bound
    ///
    /// Returns an error when no entry carries any information at all.
    pub fn compute_range(&mut self) -> Result<Range<T>> {
        let mut bounds: Option<(T, T)> = None;
        let mut extend = |v: T| {
            bounds = Some(match bounds {
                None => (v, v),
                Some((lo, hi)) => (
                    if v < lo { v } else { lo },
                    if v > hi { v } else { hi },
                ),
            });
        };

        for (value, mis) in self.data.iter().zip(self.mis_data.iter()) {
            match mis {
                MisVal::Present => extend(*value),
                MisVal::Missing => {}
                MisVal::FiniteValues(candidates) => candidates.iter().for_each(|&c| extend(c)),
                MisVal::Interval(a, b) => {
                    extend(*a);
                    extend(*b);
                }
                MisVal::LeftUnbounded(b) => extend(*b),
                MisVal::RightUnbounded(a) => extend(*a),
            }
        }

        let (min, max) = bounds.ok_or_else(|| {
            MixtError::Data("no observed value or bound to compute a range from".to_string())
        })?;
        let range = Range::new(min, max);
        self.data_range = Some(range);
        Ok(range)
    }

    /// Overrides the support, e.g. with the modality count of a categorical model
    pub fn set_range(&mut self, min: T, max: T) {
        self.data_range = Some(Range::new(min, max));
    }

    /// Reports the individuals whose tag is not among `accepted`
    ///
    /// Returns an empty string when every tag is accepted.
    pub fn check_missing_type(&self, accepted: &[MisType]) -> String {
        let mut warn_log = String::new();
        for kind in MisType::ALL.iter() {
            let count = self.mis_count[kind.index()];
            if count > 0 && !accepted.contains(kind) {
                warn_log.push_str(&format!(
                    "{} individual(s) with a {}, which is not supported by this model.\n",
                    count,
                    kind.description()
                ));
            }
        }
        warn_log
    }

    /// Prior draw of one unobserved individual, using the variable range
    pub fn remove_missing<R: Rng + ?Sized>(&mut self, i: usize, rng: &mut R) {
        if let Some(value) = prior_draw(&self.mis_data[i], self.data_range.as_ref(), rng) {
            self.data[i] = value;
        }
    }

    /// Prior draw of every unobserved individual, one stream per individual
    pub fn remove_missing_all(&mut self, rngs: &mut [StreamRng]) {
        let range = self.data_range;
        self.data
            .par_iter_mut()
            .zip(self.mis_data.par_iter())
            .zip(rngs.par_iter_mut())
            .for_each(|((value, mis), rng)| {
                if let Some(v) = prior_draw(mis, range.as_ref(), rng) {
                    *value = v;
                }
            });
    }
}

/// Draw for one tag from the range-only prior, `None` for present values
pub fn prior_draw<T: DataValue, R: Rng + ?Sized>(
    mis: &MisVal<T>,
    range: Option<&Range<T>>,
    rng: &mut R,
) -> Option<T> {
    match mis {
        MisVal::Present => None,
        MisVal::Missing => range.map(|r| T::sample_uniform(rng, r.min, r.max)),
        MisVal::FiniteValues(candidates) => sample_among(rng, candidates),
        MisVal::Interval(a, b) => Some(T::sample_uniform(rng, *a, *b)),
        MisVal::LeftUnbounded(b) => Some(match range {
            Some(r) if r.min < *b => T::sample_uniform(rng, r.min, *b),
            _ => *b,
        }),
        MisVal::RightUnbounded(a) => Some(match range {
            Some(r) if *a < r.max => T::sample_uniform(rng, *a, r.max),
            _ => *a,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistic::{master_rng, RngPool};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample_data() -> AugmentedData<f64> {
        AugmentedData::from_parts(
            vec![1.0, 0.0, 4.0, 0.0, 0.0],
            vec![
                MisVal::Present,
                MisVal::Missing,
                MisVal::Present,
                MisVal::Interval(2.0, 6.0),
                MisVal::LeftUnbounded(0.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_compute_range() {
        let mut data = sample_data();
        let range = data.compute_range().unwrap();
        assert_eq!(range.min, 0.5);
        assert_eq!(range.max, 6.0);
        assert!((range.range - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_discrete_range_counts_modalities() {
        let mut data =
            AugmentedData::from_parts(vec![0usize, 2, 0], vec![MisVal::Present, MisVal::Present, MisVal::Missing])
                .unwrap();
        let range = data.compute_range().unwrap();
        assert_eq!(range.range, 3);
    }

    #[test]
    fn test_remove_missing_respects_tags() {
        let mut data = sample_data();
        data.compute_range().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..200 {
            for i in 0..data.n_ind() {
                data.remove_missing(i, &mut rng);
            }
            assert_eq!(data.data[0], 1.0);
            assert!((0.5..=6.0).contains(&data.data[1]));
            assert!((2.0..=6.0).contains(&data.data[3]));
            // min of the range equals the bound, so the bound itself is used
            assert_eq!(data.data[4], 0.5);
        }
    }

    #[test]
    fn test_fully_missing_discrete_is_uniform() {
        let n = 10_000;
        let mut data = AugmentedData::<usize>::new(n);
        data.set_range(0, 2);
        let mut pool = RngPool::new(n, &mut master_rng(Some(12)));
        data.remove_missing_all(pool.streams_mut());

        let mut counts = [0usize; 3];
        for &v in &data.data {
            counts[v] += 1;
        }
        for c in counts {
            let freq = c as f64 / n as f64;
            assert!((freq - 1.0 / 3.0).abs() < 0.02, "frequency {}", freq);
        }
    }

    #[test]
    fn test_check_missing_type() {
        let data = sample_data();
        let accepted = [MisType::Present, MisType::Missing, MisType::MissingIntervals];
        let warn_log = data.check_missing_type(&accepted);
        assert!(warn_log.contains("left-unbounded"));
        assert!(!warn_log.contains("missing value in an interval"));

        let all = MisType::ALL;
        assert!(data.check_missing_type(&all).is_empty());
    }
}
