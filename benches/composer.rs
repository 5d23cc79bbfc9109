use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mixtcomp::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

fn create_gaussian_data(n_ind: usize, n_var: usize) -> (ParamGraph, ParamGraph) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut data = serde_json::Map::new();
    let mut desc = serde_json::Map::new();
    for j in 0..n_var {
        let column: Vec<String> = (0..n_ind)
            .map(|i| {
                let center = if i % 2 == 0 { -3.0 } else { 3.0 };
                if rng.gen::<f64>() < 0.05 {
                    "?".to_string()
                } else {
                    (center + rng.gen::<f64>() * 2.0 - 1.0).to_string()
                }
            })
            .collect();
        data.insert(format!("x{}", j), json!(column));
        desc.insert(format!("x{}", j), json!({ "type": "Gaussian", "paramStr": "" }));
    }
    (
        ParamGraph::from_value(serde_json::Value::Object(data)),
        ParamGraph::from_value(serde_json::Value::Object(desc)),
    )
}

fn prepared_composer(n_ind: usize, data: &ParamGraph, desc: &ParamGraph) -> MixtureComposer {
    let config = StrategyConfig::new(3).with_n_ind(n_ind).with_seed(7);
    let mut composer = MixtureComposer::new(&config, RunMode::Learning);
    composer.set_data_param(data, desc, None).unwrap();
    composer.init_data();
    composer.init_param();
    composer.init_param_sub_partition(config.n_init_per_class);
    composer.initialize_latent();
    composer
}

fn bench_sem_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("sem_iteration");

    for n_ind in [1000, 10000].iter() {
        let (data, desc) = create_gaussian_data(*n_ind, 5);
        let mut composer = prepared_composer(*n_ind, &data, &desc);

        group.bench_with_input(BenchmarkId::new("e_s_m", n_ind), n_ind, |b, _| {
            b.iter(|| {
                composer.e_step_completed().unwrap();
                composer.sample_z();
                composer.sample_unobserved_and_latent();
                black_box(composer.m_step())
            })
        });
    }

    group.finish();
}

fn bench_learn(c: &mut Criterion) {
    let mut group = c.benchmark_group("learn");
    group.sample_size(10);

    let (data, desc) = create_gaussian_data(2000, 5);
    let algo = ParamGraph::from_value(json!({
        "nClass": 3,
        "nbBurnInIter": 20,
        "nbIter": 20,
        "nbGibbsBurnInIter": 10,
        "nbGibbsIter": 10,
        "seed": 1
    }));

    group.bench_function("gaussian_2000x5", |b| {
        b.iter(|| learn(black_box(&algo), black_box(&data), black_box(&desc)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_sem_iteration, bench_learn);
criterion_main!(benches);
