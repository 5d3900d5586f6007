use criterion::{criterion_group, criterion_main, Criterion};
use dafsm_domain::*;
use dafsm_verify::*;

// Layered chain with parallel edges per hop: 8 layers with 3 parallel
// transitions each expand into 3^8 detailed paths.
fn layered_model(layers: usize, width: usize) -> SpecModel {
    let mut states: Vec<StateName> = vec!["_".into(), "L0".into()];
    let mut transitions = vec![Transition::new("_", "L0", "seed")
        .called_by("p1", &[])
        .introducing("p1", &["R1"])];
    for i in 0..layers {
        let from = format!("L{i}");
        let to = format!("L{}", i + 1);
        states.push(to.clone());
        for j in 0..width {
            transitions.push(Transition::new(&from, &to, &format!("hop{i}_{j}")).called_by("p1", &[]));
        }
    }
    let mut model = SpecModel {
        states,
        transitions,
        ..SpecModel::default()
    };
    model.prepare().expect("layered model prepares");
    model
}

fn bench_detailed_paths(c: &mut Criterion) {
    let model = layered_model(8, 3);
    let graph = PathGraph::new(&model);
    let target = "L8";

    c.bench_function("detailed_path_enumeration", |b| {
        b.iter(|| {
            let n = graph.detailed_paths(target).count();
            assert_eq!(n, 3usize.pow(8));
        })
    });

    c.bench_function("caller_introduction_walk", |b| {
        let config = VerifyConfig::default().with_log(false);
        let probe = Transition::new(target, target, "probe").called_by("p1", &["R1"]);
        b.iter(|| {
            // fresh checker per iteration: the memo would otherwise absorb
            // everything after the first walk
            let mut checker = CallerIntroductionChecker::new(&model, &config);
            assert!(checker.is_caller_introduced(&probe).expect("single caller"));
        })
    });
}

criterion_group!(benches, bench_detailed_paths);
criterion_main!(benches);
