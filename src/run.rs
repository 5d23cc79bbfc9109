//! Learning and prediction runs
//!
//! Both entry points take structured graphs and return the result graph:
//!
//! - `algo`: strategy hyperparameters (see [`StrategyConfig`])
//! - `data`: one column of literals per variable, plus the optional `z_class`
//!   (semi-)supervision column
//! - `desc`: `{ type, paramStr }` per variable
//! - `param` (prediction only): the result graph of a learning run
//!
//! Structural failures do not make a run fail: the result graph then only
//! carries `mixture/warnLog` and `mixture/runTime`. Malformed input and
//! invariant violations are returned as errors.

use tracing::{info, warn};

use crate::composer::{MixtureComposer, SemPhase, Z_CLASS};
use crate::config::{RunMode, StrategyConfig};
use crate::error::{MixtError, Result};
use crate::graph::ParamGraph;
use crate::strategy::{GibbsStrategy, SemStrategy};
use crate::utils::{ParallelConfig, Timer};

/// Estimates a mixture model on `data`
pub fn learn(algo: &ParamGraph, data: &ParamGraph, desc: &ParamGraph) -> Result<ParamGraph> {
    run(RunMode::Learning, algo, data, desc, None)
}

/// Computes class probabilities and imputations on `data` with the
/// parameters of a previous learning result
pub fn predict(algo: &ParamGraph, data: &ParamGraph, desc: &ParamGraph, param: &ParamGraph) -> Result<ParamGraph> {
    run(RunMode::Prediction, algo, data, desc, Some(param))
}

fn run(
    mode: RunMode,
    algo: &ParamGraph,
    data: &ParamGraph,
    desc: &ParamGraph,
    param: Option<&ParamGraph>,
) -> Result<ParamGraph> {
    let timer = Timer::start();
    let n_ind = count_individuals(data, desc)?;
    let config = StrategyConfig::from_graph(algo)?.with_n_ind(n_ind);
    info!(mode = ?mode, n_class = config.n_class, n_ind, "mixtcomp run");

    let parallel = ParallelConfig {
        n_threads: config.n_threads,
    };
    parallel.install(|| run_engine(mode, &config, data, desc, param, timer))?
}

/// Length of the first data column named in the descriptor
fn count_individuals(data: &ParamGraph, desc: &ParamGraph) -> Result<usize> {
    let id = desc
        .names(&[])
        .into_iter()
        .find(|id| id != Z_CLASS)
        .ok_or_else(|| MixtError::Config("the descriptor does not name any variable".to_string()))?;
    let column: Vec<String> = data.get_payload(&[], &id)?;
    if column.is_empty() {
        return Err(MixtError::Data(format!("variable {} has no individual", id)));
    }
    Ok(column.len())
}

fn run_engine(
    mode: RunMode,
    config: &StrategyConfig,
    data: &ParamGraph,
    desc: &ParamGraph,
    param: Option<&ParamGraph>,
    timer: Timer,
) -> Result<ParamGraph> {
    let mut composer = MixtureComposer::new(config, mode);
    let variable_param = param.map(|p| p.get_child(&["variable", "param"])).transpose()?;

    let warn_log = composer.set_data_param(data, desc, variable_param.as_ref())?;
    if !warn_log.is_empty() {
        return warning_result(warn_log, timer);
    }

    let warn_log = match mode {
        RunMode::Learning => SemStrategy::new(config).run(&mut composer)?,
        RunMode::Prediction => {
            composer.init_data();
            composer.initialize_latent()
        }
    };
    if !warn_log.is_empty() {
        return warning_result(warn_log, timer);
    }

    let warn_log = GibbsStrategy::new(config).run(&mut composer)?;
    if !warn_log.is_empty() {
        return warning_result(warn_log, timer);
    }

    let mut out = ParamGraph::new();
    write_mixture(&composer, mode, &mut out)?;
    composer.export_data_param(&mut out)?;
    out.add_payload(&["mixture"], "runTime", timer.elapsed_secs())?;
    info!(
        run_time = timer.elapsed_secs(),
        ln_observed_likelihood = composer.ln_observed_likelihood(),
        "mixtcomp run finished"
    );
    Ok(out)
}

fn warning_result(warn_log: String, timer: Timer) -> Result<ParamGraph> {
    warn!(warning = %warn_log.trim_end(), "run ended with a warning");
    let mut out = ParamGraph::new();
    out.add_payload(&["mixture"], "warnLog", warn_log)?;
    out.add_payload(&["mixture"], "runTime", timer.elapsed_secs())?;
    Ok(out)
}

fn write_mixture(composer: &MixtureComposer, mode: RunMode, out: &mut ParamGraph) -> Result<()> {
    let rows = |m: ndarray::Array2<f64>| -> Vec<Vec<f64>> { m.outer_iter().map(|r| r.to_vec()).collect() };
    let path = ["mixture"];
    let mode_name = match mode {
        RunMode::Learning => "learn",
        RunMode::Prediction => "predict",
    };

    out.add_payload(&path, "mode", mode_name)?;
    out.add_payload(&path, "nbInd", composer.n_ind())?;
    out.add_payload(&path, "nbCluster", composer.n_class())?;
    out.add_payload(&path, "nbFreeParameters", composer.nb_free_parameters())?;
    out.add_payload(&path, "lnObservedLikelihood", composer.ln_observed_likelihood())?;
    out.add_payload(&path, "lnCompletedLikelihood", composer.ln_completed_likelihood())?;
    out.add_payload(&path, "BIC", composer.bic())?;
    out.add_payload(&path, "ICL", composer.icl())?;
    out.add_payload(&path, "IDClass", rows(composer.id_class()))?;
    out.add_payload(&path, "delta", rows(composer.delta()))?;
    out.add_payload(&path, "lnProbaGivenClass", rows(composer.ln_proba_given_class()))?;
    out.add_payload(&path, "completedProbabilityLogBurnIn", composer.completed_log(SemPhase::BurnIn))?;
    out.add_payload(&path, "completedProbabilityLogRun", composer.completed_log(SemPhase::Run))?;
    out.add_payload(&path, "warnLog", "")?;
    Ok(())
}
