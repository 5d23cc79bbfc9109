//! Generic plugin for scalar variables
//!
//! A [`SimpleModel`] only knows its law: per-class parameters, densities,
//! conditional samplers for each missing-value kind and its M-step.
//! [`SimpleMixture`] wraps it with the augmented data, the parameter and
//! data statistics and the parallel sampling loops, and implements
//! [`Mixture`] on top.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::config::RunMode;
use crate::data::{parse_augmented_data, AugmentedData, DataValue, MisType, MisVal, Range};
use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;
use crate::param::{ConfIntParamStat, DataStat};
use crate::statistic::StreamRng;

use super::Mixture;

/// Law of a scalar variable, per class
pub trait SimpleModel: Send + Sync + Sized {
    type Data: DataValue;
    type Stat: DataStat<Self::Data>;

    const MODEL_TYPE: &'static str;

    /// Shift between input values and internal values (1 for 1-based modalities)
    const OFFSET: usize = 0;

    fn new(n_class: usize) -> Self;

    fn accepted_types(&self) -> &'static [MisType];

    /// Validates or builds the parameter string, once the data is known
    ///
    /// Returns the parameter string actually used.
    fn set_param_str(&mut self, param_str: &str, data: &mut AugmentedData<Self::Data>, mode: RunMode) -> Result<String> {
        let _ = (data, mode);
        Ok(param_str.to_string())
    }

    /// Flattened parameters, class blocks in order
    fn param(&self) -> &[f64];

    fn param_mut(&mut self) -> &mut [f64];

    /// Names of the flattened coefficients, in `param()` order
    fn param_names(&self) -> Vec<String>;

    fn init_param(&mut self);

    fn m_step(&mut self, data: &[Self::Data], class_ind: &[BTreeSet<usize>]) -> String;

    /// Density (or mass) of a completed value
    fn ln_completed(&self, x: Self::Data, k: usize) -> f64;

    /// Marginal probability of an observation under its tag
    fn ln_observed(&self, x: Self::Data, mis: &MisVal<Self::Data>, k: usize) -> f64;

    /// Draw of an unobserved value given its tag and class
    fn sample_conditional(
        &self,
        mis: &MisVal<Self::Data>,
        k: usize,
        range: Option<&Range<Self::Data>>,
        rng: &mut StreamRng,
    ) -> Self::Data;

    fn check_sample_condition(&self, data: &[Self::Data], class_ind: &[BTreeSet<usize>]) -> String;

    fn nb_free_parameter(&self) -> usize;
}

pub struct SimpleMixture<M: SimpleModel> {
    id_name: String,
    n_class: usize,
    confidence_level: f64,
    mode: RunMode,
    param_str: String,
    model: M,
    data: AugmentedData<M::Data>,
    param_stat: ConfIntParamStat,
    data_stat: M::Stat,
}

impl<M: SimpleModel> SimpleMixture<M> {
    pub fn new(id_name: &str, n_class: usize, confidence_level: f64) -> Self {
        Self {
            id_name: id_name.to_string(),
            n_class,
            confidence_level,
            mode: RunMode::Learning,
            param_str: String::new(),
            model: M::new(n_class),
            data: AugmentedData::new(0),
            param_stat: ConfIntParamStat::new(confidence_level),
            data_stat: M::Stat::new(Vec::new(), confidence_level),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn data(&self) -> &AugmentedData<M::Data> {
        &self.data
    }

    pub fn param_str(&self) -> &str {
        &self.param_str
    }

    /// Reads the median column of an exported parameter graph
    fn import_param(&mut self, param: &ParamGraph) -> Result<()> {
        let stat: Vec<Vec<f64>> = param.get_payload(&[], "stat")?;
        let values: Vec<f64> = stat.iter().filter_map(|row| row.first().copied()).collect();
        let expected = self.model.param().len();
        if values.len() != expected {
            return Err(MixtError::Data(format!(
                "variable {}: {} parameters imported, {} expected",
                self.id_name,
                values.len(),
                expected
            )));
        }
        self.model.param_mut().copy_from_slice(&values);
        self.param_stat.set_param_storage(&values);
        Ok(())
    }
}

impl<M: SimpleModel> Mixture for SimpleMixture<M> {
    fn id_name(&self) -> &str {
        &self.id_name
    }

    fn model_type(&self) -> &'static str {
        M::MODEL_TYPE
    }

    fn n_ind(&self) -> usize {
        self.data.n_ind()
    }

    fn set_data_param(
        &mut self,
        mode: RunMode,
        data: &[String],
        param: Option<&ParamGraph>,
        param_str: &str,
    ) -> Result<String> {
        self.mode = mode;
        self.data = parse_augmented_data(&self.id_name, data, M::OFFSET)?;

        let mut warn_log = self.data.check_missing_type(self.model.accepted_types());

        let param_str = match (mode, param) {
            (RunMode::Prediction, Some(p)) => p.get_payload_or(&[], "paramStr", param_str.to_string())?,
            _ => param_str.to_string(),
        };
        if self.data.compute_range().is_err() && M::Data::IS_DISCRETE && param_str.is_empty() {
            warn_log.push_str("no observed value to infer the support from.\n");
        }
        self.param_str = self.model.set_param_str(&param_str, &mut self.data, mode)?;

        if mode == RunMode::Prediction {
            let param = param.ok_or_else(|| MixtError::MissingPayload {
                path: format!("variable/param/{}", self.id_name),
                name: "stat".to_string(),
            })?;
            self.import_param(param)?;
        }

        self.data_stat = M::Stat::new(self.data.missing_indices(), self.confidence_level);
        debug!(
            variable = %self.id_name,
            model = M::MODEL_TYPE,
            n_ind = self.data.n_ind(),
            n_missing = self.data.n_missing(),
            "variable loaded"
        );
        Ok(warn_log)
    }

    fn init_param(&mut self) {
        self.model.init_param();
    }

    fn init_data(&mut self, rngs: &mut [StreamRng]) {
        self.data.remove_missing_all(rngs);
    }

    fn sample_unobserved_and_latent(&mut self, z: &[usize], rngs: &mut [StreamRng]) {
        let model = &self.model;
        let range = self.data.data_range;
        self.data
            .data
            .par_iter_mut()
            .zip(self.data.mis_data.par_iter())
            .zip(z.par_iter())
            .zip(rngs.par_iter_mut())
            .for_each(|(((value, mis), &k), rng)| {
                if !mis.is_present() {
                    *value = model.sample_conditional(mis, k, range.as_ref(), rng);
                }
            });
    }

    fn sample_unobserved_and_latent_ind(&mut self, i: usize, k: usize, rng: &mut StreamRng) {
        if !self.data.is_present(i) {
            let range = self.data.data_range;
            self.data.data[i] = self.model.sample_conditional(&self.data.mis_data[i], k, range.as_ref(), rng);
        }
    }

    fn m_step(&mut self, class_ind: &[BTreeSet<usize>]) -> String {
        if self.mode == RunMode::Prediction {
            return String::new();
        }
        self.model.m_step(&self.data.data, class_ind)
    }

    fn ln_observed_probability(&self, i: usize, k: usize) -> f64 {
        self.model.ln_observed(self.data.data[i], &self.data.mis_data[i], k)
    }

    fn ln_completed_probability(&self, i: usize, k: usize) -> f64 {
        self.model.ln_completed(self.data.data[i], k)
    }

    fn check_sample_condition(&self, class_ind: &[BTreeSet<usize>]) -> String {
        self.model.check_sample_condition(&self.data.data, class_ind)
    }

    fn store_sem_run(&mut self, iteration: usize, iteration_max: usize) {
        self.param_stat.sample_param(self.model.param(), iteration, iteration_max);
        if iteration == iteration_max {
            self.param_stat.normalize_param(&self.param_str);
            self.param_stat.set_expectation_param(self.model.param_mut());
        }
    }

    fn store_gibbs_run(&mut self, iteration: usize, iteration_max: usize) {
        self.data_stat.sample_data(&self.data.data, iteration, iteration_max);
        if iteration == iteration_max {
            self.data_stat.impute(&mut self.data.data);
        }
    }

    fn nb_free_parameter(&self) -> usize {
        self.model.nb_free_parameter()
    }

    fn export_data_param(&self, out: &mut ParamGraph) -> Result<()> {
        let id = self.id_name.as_str();
        let completed: Vec<M::Data> = self.data.data.iter().map(|v| v.with_offset(M::OFFSET)).collect();
        out.add_payload(&["variable", "type"], id, M::MODEL_TYPE)?;
        out.add_payload(&["variable", "data", id], "completed", completed)?;
        out.add_payload(&["variable", "data", id], "stat", self.data_stat.export())?;

        let mut param = ParamGraph::from_value(self.param_stat.export());
        param.add_payload(&[], "paramStr", &self.param_str)?;
        param.add_payload(&[], "names", self.model.param_names())?;
        param.add_payload(&[], "nClass", self.n_class)?;
        out.add_child(&["variable", "param"], id, param)?;
        Ok(())
    }
}
