//! Class labels and their reverse index
//!
//! `zi[i]` is the class of individual `i` and `class_ind[k]` the set of
//! individuals currently in class `k`. Both move together through
//! [`ZClassInd::set_z_and_class_ind`], the only mutator, so that
//! `i ∈ class_ind[zi[i]]` holds at every point.

use std::collections::BTreeSet;

use crate::data::{parse_augmented_data, AugmentedData, MisType, MisVal};
use crate::error::{MixtError, Result};

/// Kinds of observation accepted for the class column
pub const ACCEPTED_Z_TYPES: [MisType; 3] = [MisType::Present, MisType::Missing, MisType::MissingFiniteValues];

#[derive(Debug, Clone)]
pub struct ZClassInd {
    n_class: usize,
    zi: AugmentedData<usize>,
    class_ind: Vec<BTreeSet<usize>>,
}

impl ZClassInd {
    /// Unsupervised labels: every individual missing, all placed in class 0
    pub fn new(n_ind: usize, n_class: usize) -> Self {
        let mut zi = AugmentedData::new(n_ind);
        zi.set_range(0, n_class.saturating_sub(1));
        let mut class_ind = vec![BTreeSet::new(); n_class];
        if n_class > 0 {
            class_ind[0] = (0..n_ind).collect();
        }
        Self { n_class, zi, class_ind }
    }

    /// Reads a (semi-)supervision column, classes are 1-based in input
    pub fn set_supervision(&mut self, literals: &[String]) -> Result<()> {
        if literals.len() != self.n_ind() {
            return Err(MixtError::Data(format!(
                "z_class has {} entries for {} individuals",
                literals.len(),
                self.n_ind()
            )));
        }
        let parsed = parse_augmented_data::<usize>("z_class", literals, 1)?;
        let warn_log = parsed.check_missing_type(&ACCEPTED_Z_TYPES);
        if !warn_log.is_empty() {
            return Err(MixtError::Data(format!("z_class: {}", warn_log)));
        }
        for (i, mis) in parsed.mis_data.iter().enumerate() {
            let out_of_range = match mis {
                MisVal::Present => parsed.data[i] >= self.n_class,
                MisVal::FiniteValues(c) => c.iter().any(|&k| k >= self.n_class),
                _ => false,
            };
            if out_of_range {
                return Err(MixtError::Data(format!(
                    "z_class, individual {}: class outside of 1..={}",
                    i, self.n_class
                )));
            }
        }

        let values = parsed.data;
        self.zi.mis_data = parsed.mis_data;
        self.zi.mis_count = parsed.mis_count;
        for (i, &k) in values.iter().enumerate() {
            if self.zi.is_present(i) {
                self.set_z_and_class_ind(i, k);
            }
        }
        Ok(())
    }

    pub fn n_ind(&self) -> usize {
        self.zi.n_ind()
    }

    pub fn n_class(&self) -> usize {
        self.n_class
    }

    /// Current label of every individual
    pub fn z(&self) -> &[usize] {
        &self.zi.data
    }

    pub fn zi(&self) -> &AugmentedData<usize> {
        &self.zi
    }

    pub fn class_ind(&self) -> &[BTreeSet<usize>] {
        &self.class_ind
    }

    /// Moves individual `i` to class `k`
    pub fn set_z_and_class_ind(&mut self, i: usize, k: usize) {
        let old = self.zi.data[i];
        self.class_ind[old].remove(&i);
        self.class_ind[k].insert(i);
        self.zi.data[i] = k;
    }

    /// Applies a batch of draws, in individual order
    pub fn set_all(&mut self, z: &[usize]) {
        for (i, &k) in z.iter().enumerate() {
            self.set_z_and_class_ind(i, k);
        }
    }

    /// Whether individual `i` may be put in class `k`
    pub fn is_allowed(&self, i: usize, k: usize) -> bool {
        match &self.zi.mis_data[i] {
            MisVal::Present => self.zi.data[i] == k,
            MisVal::FiniteValues(allowed) => allowed.contains(&k),
            _ => k < self.n_class,
        }
    }

    /// `proposed` when allowed for `i`, else its label or first allowed class
    pub fn admissible_class(&self, i: usize, proposed: usize) -> usize {
        if self.is_allowed(i, proposed) {
            return proposed;
        }
        match &self.zi.mis_data[i] {
            MisVal::FiniteValues(allowed) => allowed.first().copied().unwrap_or(proposed),
            _ => self.zi.data[i],
        }
    }

    pub fn n_ind_per_class(&self) -> Vec<usize> {
        self.class_ind.iter().map(|s| s.len()).collect()
    }

    pub fn check_nb_ind_per_class(&self) -> String {
        check_nb_ind_per_class(&self.class_ind)
    }
}

/// Non-empty message when any class has no individual
pub fn check_nb_ind_per_class(class_ind: &[BTreeSet<usize>]) -> String {
    let empty: Vec<String> = class_ind
        .iter()
        .enumerate()
        .filter(|(_, members)| members.is_empty())
        .map(|(k, _)| (k + 1).to_string())
        .collect();

    if empty.is_empty() {
        String::new()
    } else {
        format!(
            "At least one class is empty (class {}). Maybe you asked for more classes than the number of observations, \
             or the classes were poorly initialized. Try again with fewer classes or more initialization tries.\n",
            empty.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_consistent(z: &ZClassInd) {
        for (i, &k) in z.z().iter().enumerate() {
            assert!(z.class_ind()[k].contains(&i));
        }
        for k in 0..z.n_class() {
            let count = z.z().iter().filter(|&&c| c == k).count();
            assert_eq!(count, z.class_ind()[k].len());
        }
    }

    #[test]
    fn test_mutator_keeps_index_consistent() {
        let mut z = ZClassInd::new(5, 3);
        assert_consistent(&z);
        z.set_z_and_class_ind(0, 2);
        z.set_z_and_class_ind(3, 1);
        z.set_z_and_class_ind(0, 1);
        assert_consistent(&z);
        assert_eq!(z.n_ind_per_class(), vec![3, 2, 0]);
    }

    #[test]
    fn test_check_nb_ind_per_class() {
        let mut z = ZClassInd::new(5, 3);
        z.set_all(&[0, 0, 1, 1, 0]);
        let warn_log = z.check_nb_ind_per_class();
        assert!(!warn_log.is_empty());
        assert!(warn_log.contains("empty"));

        z.set_z_and_class_ind(4, 2);
        assert!(z.check_nb_ind_per_class().is_empty());
    }

    #[test]
    fn test_supervision() {
        let mut z = ZClassInd::new(3, 2);
        let literals: Vec<String> = ["2", "?", "{1 2}"].iter().map(|s| s.to_string()).collect();
        z.set_supervision(&literals).unwrap();
        assert_eq!(z.z()[0], 1);
        assert!(z.zi().is_present(0));
        assert_consistent(&z);

        assert_eq!(z.admissible_class(0, 0), 1);
        assert_eq!(z.admissible_class(1, 0), 0);
        assert!(z.is_allowed(2, 0) && z.is_allowed(2, 1));

        let bad: Vec<String> = ["3", "?", "?"].iter().map(|s| s.to_string()).collect();
        assert!(ZClassInd::new(3, 2).set_supervision(&bad).is_err());
    }
}
