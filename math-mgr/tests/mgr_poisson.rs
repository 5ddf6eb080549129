//! End-to-end MGR solves on small model problems, on one and several simulated ranks
//!
//! The block systems use two unknowns per node, interleaved: a "pressure" unknown (label
//! 0) kept on the coarse grid and a "saturation" unknown (label 1) eliminated by the
//! reduction.

use math_audio_mgr::{
    CoarseGridMethod, Communicator, CsrMatrix, DirectSolver, FRelaxMethod, InterpType,
    LevelSolver, MgrConfig, MgrError, MgrSolver, NonGalerkinMethod, ParCsrMatrix, Partition,
    RelaxType, RestrictType, SerialComm, ThreadComm,
};
use ndarray::Array1;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
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

/// Two unknowns per node. Pressure rows couple to the neighbouring pressures and to
/// their own saturation; saturation rows couple to their own pressure and, with
/// `saturation_coupling > 0`, to the neighbouring saturations.
fn block_system(nodes: usize, saturation_coupling: f64) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
    for k in 0..nodes {
        let p = 2 * k;
        let s = p + 1;
        triplets.push((p, p, 4.0));
        triplets.push((p, s, -1.0));
        triplets.push((s, p, -1.0));
        triplets.push((s, s, 4.0));
        if k > 0 {
            triplets.push((p, p - 2, -1.0));
            if saturation_coupling > 0.0 {
                triplets.push((s, s - 2, -saturation_coupling));
            }
        }
        if k + 1 < nodes {
            triplets.push((p, p + 2, -1.0));
            if saturation_coupling > 0.0 {
                triplets.push((s, s + 2, -saturation_coupling));
            }
        }
    }
    CsrMatrix::from_triplets(2 * nodes, 2 * nodes, triplets)
}

fn distribute(comm: Arc<dyn Communicator>, a: &CsrMatrix<f64>) -> ParCsrMatrix<f64> {
    let part = Partition::uniform(a.num_rows, comm.size());
    ParCsrMatrix::from_serial(comm, a, part.clone(), part).unwrap()
}

struct Outcome {
    iterations: usize,
    relative_residual: f64,
    history: Vec<f64>,
}

fn run(
    comm: Arc<dyn Communicator>,
    a: &CsrMatrix<f64>,
    config: &MgrConfig,
) -> Result<Outcome, MgrError> {
    let a = distribute(comm, a);
    let b = Array1::ones(a.local_rows());
    let mut x = Array1::zeros(a.local_rows());
    let mut mgr = MgrSolver::new(config.clone());
    mgr.setup(&a, &b, &x)?;
    mgr.solve(&b, &mut x)?;
    Ok(Outcome {
        iterations: mgr.num_iterations()?,
        relative_residual: mgr.final_relative_residual_norm()?,
        history: mgr.residual_history()?.to_vec(),
    })
}

fn poisson_config() -> MgrConfig {
    MgrConfig::builder()
        .max_coarse_levels(2)
        .interp_type(InterpType::DiagonalScaled)
        .coarse_grid_method(CoarseGridMethod::NonGalerkin(
            NonGalerkinMethod::BlockDiagonal,
        ))
        .relax_type(RelaxType::Jacobi)
        .num_relax_sweeps(1)
        .tol(1e-6)
        .max_iter(20)
        .logging(1)
        .build()
        .unwrap()
}

#[test]
fn test_poisson_16_converges_on_one_rank() {
    init_logging();
    let outcome = run(SerialComm::shared(), &laplacian_1d(16), &poisson_config()).unwrap();
    assert!(outcome.iterations <= 20);
    assert!(outcome.relative_residual < 1e-6);
}

#[test]
fn test_poisson_16_converges_on_several_ranks() {
    init_logging();
    let a = laplacian_1d(16);
    let config = poisson_config();
    for size in [2, 4] {
        let outcomes = ThreadComm::run(size, |comm| run(comm, &a, &config).unwrap());
        let first = &outcomes[0];
        assert!(first.iterations <= 20);
        assert!(first.relative_residual < 1e-6);
        for other in &outcomes[1..] {
            assert_eq!(other.iterations, first.iterations);
            assert_eq!(other.relative_residual, first.relative_residual);
        }
    }
}

#[test]
fn test_block_system_residual_is_monotone() {
    init_logging();
    let config = MgrConfig::builder()
        .cpoints_by_block(2, vec![vec![0]])
        .num_relax_sweeps(2)
        .coarse_grid_method(CoarseGridMethod::NonGalerkin(
            NonGalerkinMethod::BlockDiagonal,
        ))
        .tol(1e-8)
        .max_iter(40)
        .logging(1)
        .build()
        .unwrap();
    let a = block_system(12, 0.5);
    for size in [1, 3] {
        let outcomes = ThreadComm::run(size, |comm| run(comm, &a, &config).unwrap());
        let outcome = &outcomes[0];
        assert!(outcome.relative_residual < 1e-8);
        assert_eq!(outcome.history.len(), outcome.iterations);
        for pair in outcome.history.windows(2) {
            assert!(pair[1] <= pair[0], "residual went up: {pair:?}");
        }
    }
}

/// Saturation rows only couple to their own pressure, so `A_FF` is diagonal and every
/// interpolation/coarse-grid pairing below reproduces the exact Schur complement.
#[test]
fn test_exact_reduction_paths_on_block_system() {
    init_logging();
    let a = block_system(8, 0.0);
    let paths = [
        (InterpType::DiagonalScaled, CoarseGridMethod::Galerkin),
        (
            InterpType::BlockJacobi,
            CoarseGridMethod::NonGalerkin(NonGalerkinMethod::BlockDiagonal),
        ),
        (
            InterpType::DiagonalScaled,
            CoarseGridMethod::NonGalerkin(NonGalerkinMethod::CprScalar),
        ),
        (
            InterpType::ApproximateInverse,
            CoarseGridMethod::NonGalerkin(NonGalerkinMethod::ApproximateInverse),
        ),
    ];
    for (interp, method) in paths {
        let config = MgrConfig::builder()
            .cpoints_by_block(2, vec![vec![0]])
            .interp_type(interp)
            .coarse_grid_method(method)
            .restrict_type(RestrictType::Injection)
            .build()
            .unwrap();
        for size in [1, 2, 4] {
            let outcomes = ThreadComm::run(size, |comm| run(comm, &a, &config).unwrap());
            let outcome = &outcomes[0];
            assert_eq!(
                outcome.iterations, 1,
                "{interp:?} / {method:?} on {size} ranks"
            );
            assert!(outcome.relative_residual < 1e-10);
        }
    }
}

#[test]
fn test_multilevel_f_relaxation_and_user_solvers() {
    init_logging();
    let a = block_system(10, 0.5);
    let amg_config = MgrConfig::builder()
        .cpoints_by_block(2, vec![vec![0]])
        .f_relax_method(FRelaxMethod::MultiLevel)
        .tol(1e-8)
        .build()
        .unwrap();
    let outcome = run(SerialComm::shared(), &a, &amg_config).unwrap();
    assert!(outcome.relative_residual < 1e-8);

    let user = ThreadComm::run(2, |comm| {
        let a = distribute(comm, &a);
        let b = Array1::ones(a.local_rows());
        let mut x = Array1::zeros(a.local_rows());
        let config = MgrConfig::builder()
            .cpoints_by_block(2, vec![vec![0]])
            .use_default_coarse_solver(false)
            .tol(1e-8)
            .build()
            .unwrap();
        let mut mgr = MgrSolver::new(config);
        mgr.set_coarse_solver(Box::new(DirectSolver::new()));
        mgr.set_f_solver(0, Box::new(DirectSolver::new())).unwrap();
        mgr.setup(&a, &b, &x).unwrap();
        mgr.solve(&b, &mut x).unwrap();
        (
            mgr.num_iterations().unwrap(),
            mgr.final_relative_residual_norm().unwrap(),
        )
    });
    for (iterations, residual) in user {
        assert!(iterations <= 20);
        assert!(residual < 1e-8);
    }
}

#[test]
fn test_mgr_as_level_solver() {
    init_logging();
    let a = distribute(SerialComm::shared(), &laplacian_1d(16));
    let b = Array1::ones(16);
    let mut x = Array1::zeros(16);
    let mut solver: Box<dyn LevelSolver<f64>> = Box::new(MgrSolver::new(poisson_config()));
    assert!(matches!(
        solver.solve(&a, &b, &mut x),
        Err(MgrError::NotSetUp)
    ));
    solver.setup(&a, &b, &x).unwrap();
    solver.solve(&a, &b, &mut x).unwrap();
    assert!(solver.convergence_factor().unwrap() < 1e-6);
}

#[test]
fn test_size_error_on_one_rank_is_reported_everywhere() {
    init_logging();
    let a = laplacian_1d(16);
    let config = poisson_config();
    let results = ThreadComm::run(2, |comm| {
        let rank = comm.rank();
        let a = distribute(comm, &a);
        let n = a.local_rows();
        let b = Array1::ones(if rank == 1 { n - 1 } else { n });
        let mut mgr = MgrSolver::new(config.clone());
        let setup = mgr.setup(&a, &b, &Array1::zeros(n));

        let mut ok = MgrSolver::new(config.clone());
        ok.setup(&a, &Array1::ones(n), &Array1::zeros(n)).unwrap();
        let mut x = Array1::zeros(if rank == 0 { n + 1 } else { n });
        let solve = ok.solve(&Array1::ones(n), &mut x);
        (setup, solve)
    });
    let (setup0, solve0) = &results[0];
    let (setup1, solve1) = &results[1];
    assert!(matches!(setup0, Err(MgrError::InvalidArgument(_))));
    assert!(matches!(setup1, Err(MgrError::DimensionMismatch { .. })));
    assert!(matches!(solve0, Err(MgrError::DimensionMismatch { .. })));
    assert!(matches!(solve1, Err(MgrError::InvalidArgument(_))));
}

#[test]
fn test_json_config_drives_setup() {
    init_logging();
    let config = MgrConfig::from_json_str(
        r#"{
            "max_coarse_levels": 1,
            "cpoint_selection": { "ByBlock": { "block_size": 2, "levels": [[0]] } },
            "block_size": 2,
            "tol": 1e-9
        }"#,
    )
    .unwrap();
    let outcome = run(SerialComm::shared(), &block_system(6, 0.0), &config).unwrap();
    assert!(outcome.relative_residual < 1e-9);
}
