//! Functional plugin (`Func_CS`)
//!
//! Each individual is a sampled curve `{(t_j, x_j)}`. Within a class the
//! curve is a mixture of `n_sub` polynomial regressions of `n_coeff`
//! coefficients, the regression active at each time step being drawn from a
//! logistic law in time. The label of each time step is a latent variable
//! resampled with the rest of the unobserved data.
//!
//! Literal format: `"t1:x1,t2:x2,..."`. The parameter string
//! `"nSub: s, nCoeff: c"` is required.

mod class;
mod computation;
mod function;

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use crate::config::{param_str_value, RunMode};
use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;
use crate::param::ConfIntParamStat;
use crate::statistic::StreamRng;

use super::Mixture;

pub use class::FunctionalClass;
pub use computation::{global_quantile, optimize_alpha, regression, vandermonde};
pub use function::{parse_function, Function};

pub struct FunctionalMixture {
    id_name: String,
    n_class: usize,
    n_sub: usize,
    n_coeff: usize,
    mode: RunMode,
    param_str: String,
    data: Vec<Function>,
    quantile: Vec<f64>,
    class: Vec<FunctionalClass>,
    alpha_stat: ConfIntParamStat,
    beta_stat: ConfIntParamStat,
    sd_stat: ConfIntParamStat,
}

impl FunctionalMixture {
    pub fn new(id_name: &str, n_class: usize, confidence_level: f64) -> Self {
        Self {
            id_name: id_name.to_string(),
            n_class,
            n_sub: 0,
            n_coeff: 0,
            mode: RunMode::Learning,
            param_str: String::new(),
            data: Vec::new(),
            quantile: Vec::new(),
            class: Vec::new(),
            alpha_stat: ConfIntParamStat::new(confidence_level),
            beta_stat: ConfIntParamStat::new(confidence_level),
            sd_stat: ConfIntParamStat::new(confidence_level),
        }
    }

    pub fn class(&self, k: usize) -> &FunctionalClass {
        &self.class[k]
    }

    pub fn data(&self) -> &[Function] {
        &self.data
    }

    /// Every class' coefficients, concatenated class by class
    fn flat_param(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut alpha = Vec::new();
        let mut beta = Vec::new();
        let mut sd = Vec::new();
        for class in &self.class {
            let (a, b, s) = class.flat_param();
            alpha.extend(a);
            beta.extend(b);
            sd.extend(s);
        }
        (alpha, beta, sd)
    }

    fn set_flat_param(&mut self, alpha: &[f64], beta: &[f64], sd: &[f64]) {
        for (k, class) in self.class.iter_mut().enumerate() {
            let (na, nb, ns) = (class.n_alpha(), class.n_beta(), class.n_sd());
            class.set_flat_param(
                &alpha[k * na..(k + 1) * na],
                &beta[k * nb..(k + 1) * nb],
                &sd[k * ns..(k + 1) * ns],
            );
        }
    }

    fn import_param(&mut self, param: &ParamGraph) -> Result<()> {
        let median = |name: &str| -> Result<Vec<f64>> {
            let stat: Vec<Vec<f64>> = param.get_payload(&[name], "stat")?;
            Ok(stat.iter().filter_map(|row| row.first().copied()).collect())
        };
        let (alpha, beta, sd) = (median("alpha")?, median("beta")?, median("sd")?);
        let expected = (
            self.n_class * 2 * self.n_sub,
            self.n_class * self.n_sub * self.n_coeff,
            self.n_class * self.n_sub,
        );
        if (alpha.len(), beta.len(), sd.len()) != expected {
            return Err(MixtError::Data(format!(
                "variable {}: imported parameters do not match \"{}\"",
                self.id_name, self.param_str
            )));
        }
        self.set_flat_param(&alpha, &beta, &sd);
        self.alpha_stat.set_param_storage(&alpha);
        self.beta_stat.set_param_storage(&beta);
        self.sd_stat.set_param_storage(&sd);
        Ok(())
    }

    fn param_names(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut alpha = Vec::new();
        let mut beta = Vec::new();
        let mut sd = Vec::new();
        for k in 0..self.n_class {
            for s in 0..self.n_sub {
                alpha.push(format!("k: {}, s: {}, alpha0", k, s));
                alpha.push(format!("k: {}, s: {}, alpha1", k, s));
                for c in 0..self.n_coeff {
                    beta.push(format!("k: {}, s: {}, c: {}", k, s, c));
                }
                sd.push(format!("k: {}, s: {}", k, s));
            }
        }
        (alpha, beta, sd)
    }
}

impl Mixture for FunctionalMixture {
    fn id_name(&self) -> &str {
        &self.id_name
    }

    fn model_type(&self) -> &'static str {
        "Func_CS"
    }

    fn n_ind(&self) -> usize {
        self.data.len()
    }

    fn set_data_param(
        &mut self,
        mode: RunMode,
        data: &[String],
        param: Option<&ParamGraph>,
        param_str: &str,
    ) -> Result<String> {
        self.mode = mode;
        self.param_str = match (mode, param) {
            (RunMode::Prediction, Some(p)) => p.get_payload_or(&[], "paramStr", param_str.to_string())?,
            _ => param_str.to_string(),
        };
        let sizes = (
            param_str_value(&self.param_str, "nSub"),
            param_str_value(&self.param_str, "nCoeff"),
        );
        let (n_sub, n_coeff) = match sizes {
            (Some(s), Some(c)) if s > 0 && c > 0 => (s, c),
            _ => {
                return Ok(format!(
                    "Variable {} has no valid parameter description. It is required and must take the form \
                     \"nSub: x, nCoeff: y\".\n",
                    self.id_name
                ))
            }
        };
        self.n_sub = n_sub;
        self.n_coeff = n_coeff;
        self.param_str = format!("nSub: {}, nCoeff: {}", n_sub, n_coeff);
        self.class = (0..self.n_class).map(|_| FunctionalClass::new(n_sub, n_coeff)).collect();

        self.data = data
            .iter()
            .enumerate()
            .map(|(row, literal)| parse_function(&self.id_name, row, literal, n_coeff))
            .collect::<Result<Vec<_>>>()?;

        let mut warn_log = String::new();
        let empty = self.data.iter().filter(|f| f.n_time() == 0).count();
        if empty > 0 {
            warn_log.push_str(&format!(
                "{} individual(s) with a missing function, which is not supported by this model.\n",
                empty
            ));
        }

        if mode == RunMode::Prediction {
            let param = param.ok_or_else(|| MixtError::MissingPayload {
                path: format!("variable/param/{}", self.id_name),
                name: "alpha".to_string(),
            })?;
            self.import_param(param)?;
        }

        self.quantile = global_quantile(self.data.iter().map(|f| f.t()), n_sub);
        debug!(variable = %self.id_name, n_ind = self.data.len(), n_sub, n_coeff, "functional variable loaded");
        Ok(warn_log)
    }

    fn init_param(&mut self) {
        self.class.iter_mut().for_each(|c| c.init_param());
    }

    fn init_data(&mut self, rngs: &mut [StreamRng]) {
        let quantile = &self.quantile;
        self.data
            .par_iter_mut()
            .zip(rngs.par_iter_mut())
            .for_each(|(f, rng)| f.remove_missing_quantile_mixing(quantile, rng));
    }

    fn sample_unobserved_and_latent(&mut self, z: &[usize], rngs: &mut [StreamRng]) {
        let class = &self.class;
        self.data
            .par_iter_mut()
            .zip(z.par_iter())
            .zip(rngs.par_iter_mut())
            .for_each(|((f, &k), rng)| f.sample_w(&class[k].alpha, &class[k].beta, &class[k].sd, rng));
    }

    fn sample_unobserved_and_latent_ind(&mut self, i: usize, k: usize, rng: &mut StreamRng) {
        let class = &self.class[k];
        self.data[i].sample_w(&class.alpha, &class.beta, &class.sd, rng);
    }

    fn m_step(&mut self, class_ind: &[BTreeSet<usize>]) -> String {
        if self.mode == RunMode::Prediction {
            return String::new();
        }
        let data = &self.data;
        let logs: Vec<String> = self
            .class
            .par_iter_mut()
            .zip(class_ind.par_iter())
            .map(|(class, members)| class.m_step(data, members))
            .collect();
        logs.iter()
            .enumerate()
            .filter(|(_, log)| !log.is_empty())
            .map(|(k, log)| format!("Error in class {}.\n{}", k, log))
            .collect()
    }

    fn ln_observed_probability(&self, i: usize, k: usize) -> f64 {
        let class = &self.class[k];
        self.data[i].ln_observed_probability(&class.alpha, &class.beta, &class.sd)
    }

    fn ln_completed_probability(&self, i: usize, k: usize) -> f64 {
        let class = &self.class[k];
        self.data[i].ln_completed_probability(&class.alpha, &class.beta, &class.sd)
    }

    fn check_sample_condition(&self, class_ind: &[BTreeSet<usize>]) -> String {
        let class_log: String = self
            .class
            .iter()
            .zip(class_ind.iter())
            .enumerate()
            .map(|(k, (class, members))| (k, class.check_sample_condition(&self.data, members)))
            .filter(|(_, log)| !log.is_empty())
            .map(|(k, log)| format!("Class: {}: {}", k, log))
            .collect();
        if class_log.is_empty() {
            return class_log;
        }
        format!(
            "Error(s) in variable: {} with Func_CS model. The errors in the various classes are:\n{}",
            self.id_name, class_log
        )
    }

    fn store_sem_run(&mut self, iteration: usize, iteration_max: usize) {
        let (alpha, beta, sd) = self.flat_param();
        self.alpha_stat.sample_param(&alpha, iteration, iteration_max);
        self.beta_stat.sample_param(&beta, iteration, iteration_max);
        self.sd_stat.sample_param(&sd, iteration, iteration_max);
        if iteration == iteration_max {
            let (mut alpha, mut beta, mut sd) = (alpha, beta, sd);
            self.alpha_stat.set_expectation_param(&mut alpha);
            self.beta_stat.set_expectation_param(&mut beta);
            self.sd_stat.set_expectation_param(&mut sd);
            self.set_flat_param(&alpha, &beta, &sd);
        }
    }

    /// Curves are fully observed, nothing to impute
    fn store_gibbs_run(&mut self, _iteration: usize, _iteration_max: usize) {}

    fn nb_free_parameter(&self) -> usize {
        self.n_class * ((self.n_sub.saturating_sub(1)) * 2 + self.n_sub * self.n_coeff + self.n_sub)
    }

    fn export_data_param(&self, out: &mut ParamGraph) -> Result<()> {
        let id = self.id_name.as_str();
        let data: Vec<&[f64]> = self.data.iter().map(|f| f.x()).collect();
        let time: Vec<&[f64]> = self.data.iter().map(|f| f.t()).collect();
        let w: Vec<&[usize]> = self.data.iter().map(|f| f.w()).collect();
        out.add_payload(&["variable", "type"], id, "Func_CS")?;
        out.add_payload(&["variable", "data", id], "data", data)?;
        out.add_payload(&["variable", "data", id], "time", time)?;
        out.add_payload(&["variable", "data", id], "w", w)?;

        let (alpha_names, beta_names, sd_names) = self.param_names();
        let mut param = ParamGraph::new();
        param.add_payload(&[], "paramStr", &self.param_str)?;
        param.add_payload(&[], "nClass", self.n_class)?;
        for (name, stat, names) in [
            ("alpha", &self.alpha_stat, alpha_names),
            ("beta", &self.beta_stat, beta_names),
            ("sd", &self.sd_stat, sd_names),
        ] {
            let mut child = ParamGraph::from_value(stat.export());
            child.add_payload(&[], "names", names)?;
            param.add_child(&[], name, child)?;
        }
        out.add_child(&["variable", "param"], id, param)?;
        Ok(())
    }
}
