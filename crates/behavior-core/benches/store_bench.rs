//! Benchmarks for the nearest-neighbor store backends.
//!
//! Compares linear scan and kd-tree across archive sizes typical for
//! novelty archives (thousands of points, low-dimensional descriptors).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

use behavior_core::{
    store::{KdTreeStore, LinearScanStore},
    Descriptor, NeighborStore,
};

/// Generate random descriptors in [0, 1)^dim.
fn generate_points(n: usize, dim: usize) -> Vec<Vec<f64>> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| (0..dim).map(|_| rng.r#gen::<f64>()).collect())
        .collect()
}

/// Benchmark insertion performance.
fn bench_insert(c: &mut Criterion) {
    let dim = 2;
    let points = generate_points(5000, dim);

    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(5000));

    group.bench_function("linear", |b| {
        b.iter(|| {
            let mut store = LinearScanStore::new(dim);
            for (i, p) in points.iter().enumerate() {
                store.insert(Descriptor::new(p.clone()), i).unwrap();
            }
            black_box(store)
        })
    });

    group.bench_function("kdtree", |b| {
        b.iter(|| {
            let mut store = KdTreeStore::new(dim);
            for (i, p) in points.iter().enumerate() {
                store.insert(Descriptor::new(p.clone()), i).unwrap();
            }
            black_box(store)
        })
    });

    group.finish();
}

/// Benchmark k-NN queries against pre-built stores.
fn bench_knn(c: &mut Criterion) {
    let dim = 2;
    let k = 25;
    let sizes = [1000, 5000, 10000];
    let queries = generate_points(100, dim);

    let mut group = c.benchmark_group("knn");
    group.throughput(Throughput::Elements(100));

    for &n in &sizes {
        let points = generate_points(n, dim);

        let linear = {
            let mut store = LinearScanStore::new(dim);
            for (i, p) in points.iter().enumerate() {
                store.insert(Descriptor::new(p.clone()), i).unwrap();
            }
            store
        };

        let kd = {
            let mut store = KdTreeStore::new(dim);
            for (i, p) in points.iter().enumerate() {
                store.insert(Descriptor::new(p.clone()), i).unwrap();
            }
            store.optimize();
            store
        };

        group.bench_with_input(BenchmarkId::new("linear", n), &n, |b, _| {
            b.iter(|| {
                for q in &queries {
                    black_box(linear.knn(q, k));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("kdtree", n), &n, |b, _| {
            b.iter(|| {
                for q in &queries {
                    black_box(kd.knn(q, k));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark the rebuild path.
fn bench_optimize(c: &mut Criterion) {
    let dim = 2;
    let points = generate_points(10000, dim);

    let mut group = c.benchmark_group("optimize");

    group.bench_function("kdtree_rebuild", |b| {
        let mut store = KdTreeStore::new(dim);
        for (i, p) in points.iter().enumerate() {
            store.insert(Descriptor::new(p.clone()), i).unwrap();
        }
        b.iter(|| {
            store.optimize();
            black_box(store.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_knn, bench_optimize);
criterion_main!(benches);
