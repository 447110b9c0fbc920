use calsample::calibration::CalibrationSystem;
use calsample::context::SearchContext;
use calsample::cube::project::CalibrationProjector;
use calsample::cube::FlightHeuristic;
use calsample::instance::Instance;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;

fn setup_system(population: usize, vectors: usize) -> Arc<CalibrationSystem> {
    let mut x = Vec::with_capacity(population * vectors);
    for i in 0..population {
        for j in 0..vectors {
            x.push(((i * (j + 3)) % 11) as f64 + 1.0);
        }
    }
    let inst = Instance::new("bench", population, population / 10, vectors, x)
        .expect("Failed to build instance");
    Arc::new(CalibrationSystem::from_instance(&inst).expect("Failed to build system"))
}

fn criterion_benchmark(c: &mut Criterion) {
    let system = setup_system(500, 5);
    let ctx = SearchContext::default();

    let mut projector = CalibrationProjector::new(system.clone()).expect("projector");
    let pi = vec![0.1; 500];
    let v: Vec<f64> = (0..500).map(|i| ((i % 7) as f64 - 3.0) / 10.0).collect();
    c.bench_function("project (N=500, p=5)", |b| {
        b.iter(|| projector.project(black_box(&v), black_box(&pi)))
    });

    let mut flight = FlightHeuristic::new(system, None).expect("flight");
    let mut rng = fastrand::Rng::with_seed(1);
    c.bench_function("cube flight (N=500, p=5)", |b| {
        b.iter(|| flight.run(black_box(vec![0.1; 500]), &mut rng, &ctx))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
