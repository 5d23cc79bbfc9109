//! Integration test: SEM-Gibbs estimation end-to-end

use mixtcomp::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde_json::json;

/// Logs to the test output, filtered by `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mixtcomp=warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// 100 draws of N(-5, 1) followed by 100 draws of N(5, 1)
fn two_gaussians(seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let left = Normal::new(-5.0, 1.0).unwrap();
    let right = Normal::new(5.0, 1.0).unwrap();
    (0..200)
        .map(|i| if i < 100 { left.sample(&mut rng) } else { right.sample(&mut rng) })
        .collect()
}

fn literals(values: &[f64]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn algo(n_class: usize) -> ParamGraph {
    ParamGraph::from_value(json!({
        "nClass": n_class,
        "nSemTry": 5,
        "nbBurnInIter": 20,
        "nbIter": 50,
        "nbGibbsBurnInIter": 20,
        "nbGibbsIter": 20,
        "seed": 42
    }))
}

fn gaussian_desc(names: &[&str]) -> ParamGraph {
    let mut desc = ParamGraph::new();
    for &name in names {
        desc.add_payload(&[name], "type", "Gaussian").unwrap();
        desc.add_payload(&[name], "paramStr", "").unwrap();
    }
    desc
}

/// Medians of the class means, sorted
fn sorted_means(result: &ParamGraph, variable: &str) -> Vec<f64> {
    let stat: Vec<Vec<f64>> = result.get_payload(&["variable", "param", variable], "stat").unwrap();
    let mut means: Vec<f64> = stat.iter().step_by(2).map(|row| row[0]).collect();
    means.sort_by(|a, b| a.total_cmp(b));
    means
}

fn algo_with_seed(n_class: usize, seed: u64) -> ParamGraph {
    let mut algo = algo(n_class);
    algo.add_payload(&[], "seed", seed).unwrap();
    algo
}

#[test]
fn test_two_gaussian_recovery() {
    init_tracing();
    for seed in 0..20u64 {
        let data = ParamGraph::from_value(json!({ "x": literals(&two_gaussians(seed + 500)) }));
        let result = learn(&algo_with_seed(2, seed), &data, &gaussian_desc(&["x"])).unwrap();

        let warn_log: String = result.get_payload(&["mixture"], "warnLog").unwrap();
        assert!(warn_log.is_empty(), "seed {}: {}", seed, warn_log);

        let means = sorted_means(&result, "x");
        assert!((means[0] + 5.0).abs() < 0.5, "seed {}: means {:?}", seed, means);
        assert!((means[1] - 5.0).abs() < 0.5, "seed {}: means {:?}", seed, means);

        let prop: Vec<Vec<f64>> = result.get_payload(&["variable", "param", "z_class"], "stat").unwrap();
        for row in &prop {
            assert!((row[0] - 0.5).abs() < 0.1, "seed {}: proportions {:?}", seed, prop);
        }
        let total: f64 = prop.iter().map(|row| row[0]).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_single_variable_with_missing_values() {
    for seed in 0..5u64 {
        let values = two_gaussians(seed + 900);
        let observed = ParamGraph::from_value(json!({ "x": literals(&values) }));
        let reference = learn(&algo_with_seed(2, seed), &observed, &gaussian_desc(&["x"])).unwrap();

        let with_missing: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, v)| if i % 10 == 3 { "?".to_string() } else { v.to_string() })
            .collect();
        let data = ParamGraph::from_value(json!({ "x": with_missing }));
        let result = learn(&algo_with_seed(2, seed), &data, &gaussian_desc(&["x"])).unwrap();

        let warn_log: String = result.get_payload(&["mixture"], "warnLog").unwrap();
        assert!(warn_log.is_empty(), "seed {}: {}", seed, warn_log);

        let expected = sorted_means(&reference, "x");
        let means = sorted_means(&result, "x");
        for (m, e) in means.iter().zip(&expected) {
            assert!((m - e).abs() <= 1.0, "seed {}: means {:?} against {:?}", seed, means, expected);
        }

        let present: Vec<f64> = values.iter().enumerate().filter(|(i, _)| i % 10 != 3).map(|(_, &v)| v).collect();
        let min = present.iter().copied().fold(f64::INFINITY, f64::min);
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let completed: Vec<f64> = result.get_payload(&["variable", "data", "x"], "completed").unwrap();
        for i in (3..200).step_by(10) {
            assert!(completed[i] >= min && completed[i] <= max, "seed {}, individual {}: {}", seed, i, completed[i]);
        }
    }
}

#[test]
fn test_result_graph_layout() {
    let data = ParamGraph::from_value(json!({ "x": literals(&two_gaussians(3)) }));
    let result = learn(&algo(2), &data, &gaussian_desc(&["x"])).unwrap();

    let n_cluster: usize = result.get_payload(&["mixture"], "nbCluster").unwrap();
    let n_free: usize = result.get_payload(&["mixture"], "nbFreeParameters").unwrap();
    let ln_obs: f64 = result.get_payload(&["mixture"], "lnObservedLikelihood").unwrap();
    let ln_comp: f64 = result.get_payload(&["mixture"], "lnCompletedLikelihood").unwrap();
    let bic: f64 = result.get_payload(&["mixture"], "BIC").unwrap();
    let icl: f64 = result.get_payload(&["mixture"], "ICL").unwrap();
    let mode: String = result.get_payload(&["mixture"], "mode").unwrap();
    assert_eq!(n_cluster, 2);
    assert_eq!(n_free, 5);
    assert_eq!(mode, "learn");
    assert!(ln_comp <= ln_obs);
    assert!(icl <= bic);

    let tik: Vec<Vec<f64>> = result.get_payload(&["variable", "data", "z_class"], "stat").unwrap();
    assert_eq!(tik.len(), 200);
    for row in &tik {
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    let z: Vec<usize> = result.get_payload(&["variable", "data", "z_class"], "completed").unwrap();
    assert!(z.iter().all(|&k| k == 1 || k == 2));
    // the two generating groups end up in different classes
    assert_ne!(z[0], z[199]);

    let burn_in: Vec<f64> = result.get_payload(&["mixture"], "completedProbabilityLogBurnIn").unwrap();
    assert!(!burn_in.is_empty() && burn_in.len() <= 20);
    let id_class: Vec<Vec<f64>> = result.get_payload(&["mixture"], "IDClass").unwrap();
    assert_eq!(id_class.len(), 2);
    assert_eq!(id_class[0].len(), 1);
}

#[test]
fn test_missing_values_are_imputed() {
    let x1 = two_gaussians(11);
    let x2 = two_gaussians(12);
    let x1_literals: Vec<String> = x1
        .iter()
        .enumerate()
        .map(|(i, v)| if i % 10 == 0 { "?".to_string() } else { v.to_string() })
        .collect();
    let data = ParamGraph::from_value(json!({ "x1": x1_literals, "x2": literals(&x2) }));
    let result = learn(&algo(2), &data, &gaussian_desc(&["x1", "x2"])).unwrap();

    let warn_log: String = result.get_payload(&["mixture"], "warnLog").unwrap();
    assert!(warn_log.is_empty(), "{}", warn_log);

    let completed: Vec<f64> = result.get_payload(&["variable", "data", "x1"], "completed").unwrap();
    assert_eq!(completed.len(), 200);
    for i in (0..200).step_by(10) {
        // the class is known from x2, the imputation is the median of its conditional draws
        let expected = if i < 100 { -5.0 } else { 5.0 };
        assert!((completed[i] - expected).abs() < 2.0, "individual {}: {}", i, completed[i]);
    }
    for i in (0..200).filter(|i| i % 10 != 0) {
        assert_eq!(completed[i], x1[i]);
    }
}

#[test]
fn test_more_classes_than_individuals() {
    init_tracing();
    let data = ParamGraph::from_value(json!({ "x": ["1.0", "2.0"] }));
    let result = learn(&algo(3), &data, &gaussian_desc(&["x"])).unwrap();
    let warn_log: String = result.get_payload(&["mixture"], "warnLog").unwrap();
    assert!(warn_log.contains("empty"), "{}", warn_log);
    assert!(!result.exists_payload(&["mixture"], "BIC"));
}

#[test]
fn test_supervised_classes_are_kept() {
    let values = two_gaussians(5);
    let z: Vec<String> = (0..200)
        .map(|i| match i {
            0..=29 => "1".to_string(),
            170..=199 => "2".to_string(),
            _ => "?".to_string(),
        })
        .collect();
    let data = ParamGraph::from_value(json!({ "x": literals(&values), "z_class": z }));
    let result = learn(&algo(2), &data, &gaussian_desc(&["x"])).unwrap();

    let completed: Vec<usize> = result.get_payload(&["variable", "data", "z_class"], "completed").unwrap();
    assert_eq!(completed[0], 1);
    assert_eq!(completed[199], 2);
    assert_eq!(completed[50], 1);
    assert_eq!(completed[150], 2);
}

#[test]
fn test_predict_with_learnt_parameters() {
    let data = ParamGraph::from_value(json!({ "x": literals(&two_gaussians(21)) }));
    let learnt = learn(&algo(2), &data, &gaussian_desc(&["x"])).unwrap();
    let z_learn: Vec<usize> = learnt.get_payload(&["variable", "data", "z_class"], "completed").unwrap();

    let new_data = ParamGraph::from_value(json!({ "x": ["-5.2", "4.8", "?", "[3.0:+inf]"] }));
    let predicted = predict(&algo(2), &new_data, &gaussian_desc(&["x"]), &learnt).unwrap();

    let warn_log: String = predicted.get_payload(&["mixture"], "warnLog").unwrap();
    assert!(warn_log.is_empty(), "{}", warn_log);
    let mode: String = predicted.get_payload(&["mixture"], "mode").unwrap();
    assert_eq!(mode, "predict");

    let z: Vec<usize> = predicted.get_payload(&["variable", "data", "z_class"], "completed").unwrap();
    assert_eq!(z[0], z_learn[0]);
    assert_eq!(z[1], z_learn[199]);
    assert_eq!(z[3], z_learn[199]);

    // parameters are unchanged by prediction
    assert_eq!(sorted_means(&predicted, "x"), sorted_means(&learnt, "x"));
}

#[test]
fn test_same_seed_same_result() {
    let data = ParamGraph::from_value(json!({ "x": literals(&two_gaussians(9)) }));
    let a = learn(&algo(2), &data, &gaussian_desc(&["x"])).unwrap();
    let b = learn(&algo(2), &data, &gaussian_desc(&["x"])).unwrap();
    let za: Vec<usize> = a.get_payload(&["variable", "data", "z_class"], "completed").unwrap();
    let zb: Vec<usize> = b.get_payload(&["variable", "data", "z_class"], "completed").unwrap();
    assert_eq!(za, zb);
    assert_eq!(sorted_means(&a, "x"), sorted_means(&b, "x"));
}

#[test]
fn test_missing_nclass_is_an_error() {
    let data = ParamGraph::from_value(json!({ "x": ["1.0", "2.0"] }));
    let algo = ParamGraph::from_value(json!({ "nbIter": 10 }));
    assert!(matches!(
        learn(&algo, &data, &gaussian_desc(&["x"])),
        Err(MixtError::MissingPayload { .. })
    ));
}
