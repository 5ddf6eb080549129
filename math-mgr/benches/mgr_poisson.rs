//! Benchmark: MGR setup and solve on the 1-D Poisson problem
//!
//! Run with:
//!   cargo bench -p math-audio-mgr --bench mgr_poisson

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use math_audio_mgr::{
    CoarseGridMethod, CsrMatrix, MgrConfig, MgrSolver, NonGalerkinMethod, ParCsrMatrix,
    Partition, SerialComm, ThreadComm,
};
use ndarray::Array1;
use std::time::Duration;

fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push((i, i, 2.0));
        if i > 0 {
            triplets.push((i, i - 1, -1.0));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, -1.0));
        }
    }
    CsrMatrix::from_triplets(n, n, triplets)
}

fn config() -> MgrConfig {
    MgrConfig::builder()
        .max_coarse_levels(4)
        .coarse_grid_method(CoarseGridMethod::NonGalerkin(
            NonGalerkinMethod::BlockDiagonal,
        ))
        .tol(1e-8)
        .build()
        .expect("valid benchmark configuration")
}

fn bench_serial(c: &mut Criterion) {
    let mut group = c.benchmark_group("mgr_poisson_serial");
    group.measurement_time(Duration::from_secs(5));

    for &n in &[1_000, 10_000, 50_000] {
        let part = Partition::uniform(n, 1);
        let a = ParCsrMatrix::from_serial(SerialComm::shared(), &laplacian_1d(n), part.clone(), part)
            .expect("serial matrix");
        let b = Array1::ones(n);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("setup", n), &n, |bench, _| {
            bench.iter(|| {
                let mut mgr = MgrSolver::new(config());
                mgr.setup(&a, &b, &Array1::zeros(n)).expect("setup");
                black_box(mgr.num_levels())
            })
        });

        let mut mgr = MgrSolver::new(config());
        mgr.setup(&a, &b, &Array1::zeros(n)).expect("setup");
        group.bench_with_input(BenchmarkId::new("solve", n), &n, |bench, _| {
            bench.iter(|| {
                let mut x = Array1::zeros(n);
                mgr.solve(&b, &mut x).expect("solve");
                black_box(x)
            })
        });
    }
    group.finish();
}

fn bench_ranks(c: &mut Criterion) {
    let mut group = c.benchmark_group("mgr_poisson_ranks");
    group.measurement_time(Duration::from_secs(5));
    let n = 20_000;
    let global = laplacian_1d(n);

    for &size in &[1, 2, 4] {
        group.bench_with_input(BenchmarkId::new("setup_solve", size), &size, |bench, &size| {
            bench.iter(|| {
                ThreadComm::run(size, |comm| {
                    let part = Partition::uniform(n, size);
                    let a = ParCsrMatrix::from_serial(comm, &global, part.clone(), part)
                        .expect("distributed matrix");
                    let b = Array1::ones(a.local_rows());
                    let mut x = Array1::zeros(a.local_rows());
                    let mut mgr = MgrSolver::new(config());
                    mgr.setup(&a, &b, &x).expect("setup");
                    mgr.solve(&b, &mut x).expect("solve");
                    black_box(mgr.num_iterations().expect("solved"))
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_serial, bench_ranks);
criterion_main!(benches);
