//! Integration test: every plugin kind inside a full learning run

use mixtcomp::prelude::*;
use serde_json::json;

const N: usize = 120;

fn algo() -> ParamGraph {
    ParamGraph::from_value(json!({
        "nClass": 2,
        "nSemTry": 5,
        "nbBurnInIter": 20,
        "nbIter": 30,
        "nbGibbsBurnInIter": 10,
        "nbGibbsIter": 20,
        "seed": 5
    }))
}

/// Continuous column separating the two halves of the dataset
fn anchor_column() -> Vec<String> {
    (0..N)
        .map(|i| {
            let jitter = ((i * 13) % 11) as f64 / 10.0 - 0.5;
            let center = if i < N / 2 { -6.0 } else { 6.0 };
            (center + jitter).to_string()
        })
        .collect()
}

fn describe(entries: &[(&str, &str, &str)]) -> ParamGraph {
    let mut desc = ParamGraph::new();
    for &(name, model, param_str) in entries {
        desc.add_payload(&[name], "type", model).unwrap();
        desc.add_payload(&[name], "paramStr", param_str).unwrap();
    }
    desc
}

fn warn_log(result: &ParamGraph) -> String {
    result.get_payload(&["mixture"], "warnLog").unwrap()
}

#[test]
fn test_poisson_counts() {
    let counts: Vec<String> = (0..N)
        .map(|i| (if i < N / 2 { 1 + i % 3 } else { 12 + i % 5 }).to_string())
        .collect();
    let data = ParamGraph::from_value(json!({ "n": counts, "anchor": anchor_column() }));
    let result = learn(&algo(), &data, &describe(&[("n", "Poisson", ""), ("anchor", "Gaussian", "")])).unwrap();
    assert!(warn_log(&result).is_empty(), "{}", warn_log(&result));

    let stat: Vec<Vec<f64>> = result.get_payload(&["variable", "param", "n"], "stat").unwrap();
    let mut lambda: Vec<f64> = stat.iter().map(|row| row[0]).collect();
    lambda.sort_by(|a, b| a.total_cmp(b));
    assert!((lambda[0] - 2.0).abs() < 0.5, "lambda {:?}", lambda);
    assert!((lambda[1] - 14.0).abs() < 1.0, "lambda {:?}", lambda);

    let n_free: usize = result.get_payload(&["mixture"], "nbFreeParameters").unwrap();
    assert_eq!(n_free, 1 + 2 + 4);
}

#[test]
fn test_poisson_class_of_zeros() {
    let counts: Vec<String> = (0..N).map(|_| "0".to_string()).collect();
    let data = ParamGraph::from_value(json!({ "n": counts, "anchor": anchor_column() }));
    let result = learn(&algo(), &data, &describe(&[("n", "Poisson", ""), ("anchor", "Gaussian", "")])).unwrap();
    assert!(warn_log(&result).contains("only contains zeros"), "{}", warn_log(&result));
}

#[test]
fn test_multinomial_declared_modalities() {
    let c: Vec<String> = (0..N).map(|i| (if i < N / 2 { 1 + i % 2 } else { 3 + i % 2 }).to_string()).collect();
    let data = ParamGraph::from_value(json!({ "c": c, "anchor": anchor_column() }));
    let desc = describe(&[("c", "Multinomial", "nModality: 4"), ("anchor", "Gaussian", "")]);
    let result = learn(&algo(), &data, &desc).unwrap();

    // modalities 3 and 4 never appear in the first class
    assert!(warn_log(&result).contains("error in variable c"), "{}", warn_log(&result));
    assert!(warn_log(&result).contains("is absent from class"), "{}", warn_log(&result));
}

#[test]
fn test_multinomial_modality_out_of_declared_range() {
    let c: Vec<String> = (0..N).map(|i| (1 + i % 5).to_string()).collect();
    let data = ParamGraph::from_value(json!({ "c": c }));
    let desc = describe(&[("c", "Multinomial", "nModality: 3")]);
    assert!(matches!(learn(&algo(), &data, &desc), Err(MixtError::Data(_))));
}

#[test]
fn test_weibull_positive_values() {
    let x: Vec<String> = (0..N)
        .map(|i| {
            let spread = 1.0 + (i % 7) as f64 / 3.0;
            (if i < N / 2 { 0.5 * spread } else { 8.0 * spread }).to_string()
        })
        .collect();
    let data = ParamGraph::from_value(json!({ "w": x, "anchor": anchor_column() }));
    let result = learn(&algo(), &data, &describe(&[("w", "Weibull", ""), ("anchor", "Gaussian", "")])).unwrap();
    assert!(warn_log(&result).is_empty(), "{}", warn_log(&result));

    let stat: Vec<Vec<f64>> = result.get_payload(&["variable", "param", "w"], "stat").unwrap();
    assert_eq!(stat.len(), 4);
    assert!(stat.iter().all(|row| row[0] > 0.0));
}

#[test]
fn test_negative_binomial_overdispersed_counts() {
    let low = [0, 1, 3, 8];
    let high = [10, 20, 35, 55];
    let counts: Vec<String> = (0..N)
        .map(|i| (if i < N / 2 { low[i % 4] } else { high[i % 4] }).to_string())
        .collect();
    let data = ParamGraph::from_value(json!({ "n": counts, "anchor": anchor_column() }));
    let desc = describe(&[("n", "NegativeBinomial", ""), ("anchor", "Gaussian", "")]);
    let result = learn(&algo(), &data, &desc).unwrap();
    assert!(warn_log(&result).is_empty(), "{}", warn_log(&result));

    let stat: Vec<Vec<f64>> = result.get_payload(&["variable", "param", "n"], "stat").unwrap();
    // size then probability, per class
    for k in 0..2 {
        assert!(stat[2 * k][0] > 0.0);
        assert!(stat[2 * k + 1][0] > 0.0 && stat[2 * k + 1][0] < 1.0);
    }
}

#[test]
fn test_functional_requires_param_str() {
    let curves: Vec<String> = (0..N).map(|_| "0:1.0,1:2.0,2:3.0".to_string()).collect();
    let data = ParamGraph::from_value(json!({ "f": curves }));
    let result = learn(&algo(), &data, &describe(&[("f", "Func_CS", "")])).unwrap();
    assert!(warn_log(&result).contains("nSub: x, nCoeff: y"), "{}", warn_log(&result));
}

#[test]
fn test_rank_with_noisy_orders() {
    let ranks: Vec<String> = (0..N)
        .map(|i| {
            let mut order = if i < N / 2 { vec![1, 2, 3, 4] } else { vec![4, 3, 2, 1] };
            // one adjacent swap every third individual
            if i % 3 == 0 {
                let p = (i / 3) % 3;
                order.swap(p, p + 1);
            }
            order.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(",")
        })
        .collect();
    let data = ParamGraph::from_value(json!({ "r": ranks, "anchor": anchor_column() }));
    let result = learn(&algo(), &data, &describe(&[("r", "Rank_ISR", "nModality: 4"), ("anchor", "Gaussian", "")])).unwrap();
    assert!(warn_log(&result).is_empty(), "{}", warn_log(&result));

    let completed: Vec<Vec<usize>> = result.get_payload(&["variable", "data", "r"], "completed").unwrap();
    assert_eq!(completed.len(), N);
    assert_eq!(completed[1], vec![1, 2, 3, 4]);
}

#[test]
fn test_rank_position_out_of_range() {
    let data = ParamGraph::from_value(json!({ "r": ["1,2,3", "1,2,5"] }));
    let result = learn(&algo(), &data, &describe(&[("r", "Rank_ISR", "nModality: 3")]));
    assert!(matches!(result, Err(MixtError::Parse { row: 1, .. })));
}

#[test]
fn test_unknown_model_type() {
    let data = ParamGraph::from_value(json!({ "x": ["1.0", "2.0"] }));
    let result = learn(&algo(), &data, &describe(&[("x", "Student", "")]));
    assert!(matches!(result, Err(MixtError::Config(_))));
}
