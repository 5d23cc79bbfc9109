//! Categorical plugin
//!
//! Modalities are 1-based in input and 0-based internally. The modality
//! count is carried by the parameter string `"nModality: m"`: in learning it
//! is inferred from the largest observed modality when absent, in every
//! other case the data is validated against it.

use std::collections::BTreeSet;

use crate::config::{parse_n_modality, RunMode};
use crate::data::{prior_draw, AugmentedData, MisType, MisVal, Range};
use crate::error::{MixtError, Result};
use crate::param::DiscreteDataStat;
use crate::statistic::{sample_categorical, StreamRng};

use super::simple::SimpleModel;

const ACCEPTED: [MisType; 3] = [MisType::Present, MisType::Missing, MisType::MissingFiniteValues];

#[derive(Debug, Clone)]
pub struct MultinomialModel {
    n_class: usize,
    n_modality: usize,
    /// class-major: `param[k * n_modality + m]`
    param: Vec<f64>,
}

impl MultinomialModel {
    pub fn n_modality(&self) -> usize {
        self.n_modality
    }

    pub fn proba(&self, k: usize, m: usize) -> f64 {
        self.param[k * self.n_modality + m]
    }

    fn class_proba(&self, k: usize) -> &[f64] {
        &self.param[k * self.n_modality..(k + 1) * self.n_modality]
    }
}

impl SimpleModel for MultinomialModel {
    type Data = usize;
    type Stat = DiscreteDataStat;

    const MODEL_TYPE: &'static str = "Multinomial";
    const OFFSET: usize = 1;

    fn new(n_class: usize) -> Self {
        Self {
            n_class,
            n_modality: 0,
            param: Vec::new(),
        }
    }

    fn accepted_types(&self) -> &'static [MisType] {
        &ACCEPTED
    }

    fn set_param_str(&mut self, param_str: &str, data: &mut AugmentedData<usize>, mode: RunMode) -> Result<String> {
        let n_modality = if param_str.trim().is_empty() && mode == RunMode::Learning {
            match data.data_range {
                Some(range) => range.max + 1,
                None => {
                    return Err(MixtError::Data(
                        "cannot infer the number of modalities of a variable without any observed value".to_string(),
                    ))
                }
            }
        } else {
            let n = parse_n_modality(param_str)
                .ok_or_else(|| MixtError::Config(format!("invalid parameter string \"{}\"", param_str)))?;
            if let Some(range) = data.data_range {
                if range.max >= n {
                    return Err(MixtError::Data(format!(
                        "modality {} observed while the parameter string declares {} modalities",
                        range.max + 1,
                        n
                    )));
                }
            }
            n
        };

        if n_modality == 0 {
            return Err(MixtError::Config("a categorical variable needs at least one modality".to_string()));
        }
        data.set_range(0, n_modality - 1);
        self.n_modality = n_modality;
        self.param = vec![1.0 / n_modality as f64; self.n_class * n_modality];
        Ok(format!("nModality: {}", n_modality))
    }

    fn param(&self) -> &[f64] {
        &self.param
    }

    fn param_mut(&mut self) -> &mut [f64] {
        &mut self.param
    }

    fn param_names(&self) -> Vec<String> {
        (0..self.n_class)
            .flat_map(|k| (0..self.n_modality).map(move |m| format!("k: {}, modality: {}", k, m + 1)))
            .collect()
    }

    fn init_param(&mut self) {
        let uniform = 1.0 / self.n_modality.max(1) as f64;
        self.param.iter_mut().for_each(|p| *p = uniform);
    }

    fn m_step(&mut self, data: &[usize], class_ind: &[BTreeSet<usize>]) -> String {
        let n_modality = self.n_modality;
        for (k, members) in class_ind.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let block = &mut self.param[k * n_modality..(k + 1) * n_modality];
            block.iter_mut().for_each(|p| *p = 0.0);
            for &i in members {
                block[data[i]] += 1.0;
            }
            let n = members.len() as f64;
            block.iter_mut().for_each(|p| *p /= n);
        }
        String::new()
    }

    fn ln_completed(&self, x: usize, k: usize) -> f64 {
        self.proba(k, x).ln()
    }

    fn ln_observed(&self, x: usize, mis: &MisVal<usize>, k: usize) -> f64 {
        match mis {
            MisVal::Present => self.proba(k, x).ln(),
            MisVal::FiniteValues(candidates) => candidates
                .iter()
                .filter(|&&m| m < self.n_modality)
                .map(|&m| self.proba(k, m))
                .sum::<f64>()
                .ln(),
            _ => 0.0,
        }
    }

    fn sample_conditional(
        &self,
        mis: &MisVal<usize>,
        k: usize,
        range: Option<&Range<usize>>,
        rng: &mut StreamRng,
    ) -> usize {
        match mis {
            MisVal::Missing => sample_categorical(rng, self.class_proba(k)),
            MisVal::FiniteValues(candidates) => {
                let weights: Vec<f64> = candidates
                    .iter()
                    .map(|&m| if m < self.n_modality { self.proba(k, m) } else { 0.0 })
                    .collect();
                candidates[sample_categorical(rng, &weights)]
            }
            _ => prior_draw(mis, range, rng).unwrap_or(0),
        }
    }

    /// A modality absent from a class would get a null probability
    fn check_sample_condition(&self, data: &[usize], class_ind: &[BTreeSet<usize>]) -> String {
        for (k, members) in class_ind.iter().enumerate() {
            let mut seen = vec![false; self.n_modality];
            for &i in members {
                if let Some(s) = seen.get_mut(data[i]) {
                    *s = true;
                }
            }
            if let Some(m) = seen.iter().position(|&s| !s) {
                return format!(
                    "Categorical variables must have one individual with each modality present in each class. \
                     Modality {} is absent from class {}.\n",
                    m + 1,
                    k
                );
            }
        }
        String::new()
    }

    fn nb_free_parameter(&self) -> usize {
        self.n_class * (self.n_modality.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_augmented_data;

    fn literals(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn loaded(values: &[&str], param_str: &str, mode: RunMode) -> Result<(MultinomialModel, AugmentedData<usize>)> {
        let mut data = parse_augmented_data::<usize>("cat", &literals(values), 1)?;
        let _ = data.compute_range();
        let mut model = MultinomialModel::new(2);
        model.set_param_str(param_str, &mut data, mode)?;
        Ok((model, data))
    }

    #[test]
    fn test_param_str_inferred_and_validated() {
        let (model, data) = loaded(&["1", "3", "?", "{1 2}"], "", RunMode::Learning).unwrap();
        assert_eq!(model.n_modality(), 3);
        assert_eq!(data.data_range.map(|r| r.range), Some(3));

        let (model, _) = loaded(&["1", "2"], "nModality: 4", RunMode::Learning).unwrap();
        assert_eq!(model.n_modality(), 4);

        assert!(loaded(&["1", "5"], "nModality: 4", RunMode::Learning).is_err());
        assert!(loaded(&["1", "2"], "", RunMode::Prediction).is_err());
    }

    #[test]
    fn test_m_step_frequencies() {
        let (mut model, _) = loaded(&["1", "2", "3"], "", RunMode::Learning).unwrap();
        let data = vec![0, 0, 1, 2, 2, 2];
        let class_ind = vec![(0..3).collect(), (3..6).collect()];
        assert!(model.m_step(&data, &class_ind).is_empty());
        assert!((model.proba(0, 0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((model.proba(1, 2) - 1.0).abs() < 1e-12);
        let sum: f64 = (0..3).map(|m| model.proba(0, m)).sum();
        assert!((sum - 1.0).abs() < 1e-12);

        let warn = model.check_sample_condition(&data, &class_ind);
        assert!(warn.contains("Modality 3 is absent from class 0"));
        assert_eq!(model.nb_free_parameter(), 4);
    }

    #[test]
    fn test_finite_set_probability() {
        let (model, _) = loaded(&["1", "2", "3", "4"], "", RunMode::Learning).unwrap();
        let lp = model.ln_observed(0, &MisVal::FiniteValues(vec![0, 2]), 1);
        assert!((lp - 0.5f64.ln()).abs() < 1e-12);
    }
}
