//! Distributed multigrid reduction (MGR) for block-structured sparse systems
//!
//! This crate provides an MGR solver for row-distributed sparse matrices, together with
//! the distributed sparse substrate and the building blocks it is assembled from.
//!
//! # Features
//!
//! - **MGR**: multilevel C/F reduction with per-level configuration and pluggable
//!   F-relaxation and coarse-grid solvers
//! - **Interpolation**: injection, Jacobi, diagonal-scaled, block-Jacobi,
//!   approximate-inverse and classical prolongation/restriction
//! - **Coarse operators**: Galerkin `R A P` or non-Galerkin Schur-complement
//!   approximations with entry dropping
//! - **Relaxation**: point Jacobi, ℓ1-Jacobi, hybrid Gauss-Seidel and block smoothers
//! - **Sub-solvers**: classical AMG V-cycle and redundant direct LU
//! - **Distribution**: row-partitioned `ParCsrMatrix` over a [`Communicator`], with
//!   in-process simulated ranks for testing
//! - **Generic Scalar Types**: Works with f64, f32, Complex64, Complex32
//!
//! # Example
//!
//! ```ignore
//! use math_audio_mgr::{MgrConfig, MgrSolver, ParCsrMatrix, Partition, SerialComm};
//!
//! let part = Partition::uniform(n, 1);
//! let a = ParCsrMatrix::from_serial(SerialComm::shared(), &csr, part.clone(), part)?;
//!
//! let config = MgrConfig::builder().max_coarse_levels(2).tol(1e-8).build()?;
//! let mut mgr = MgrSolver::new(config);
//! mgr.setup(&a, &b, &x)?;
//! mgr.solve(&b, &mut x)?;
//! ```

pub mod amg;
pub mod approx_inverse;
pub mod block;
pub mod classical;
pub mod coarse;
pub mod comm;
pub mod dense;
pub mod direct;
pub mod error;
pub mod interp;
pub mod mgr;
pub mod parallel;
pub mod partition;
pub mod relax;
pub mod sparse;
pub mod subblock;
pub mod traits;

// Re-export main types
pub use comm::{CommError, CommExt, Communicator, SerialComm, ThreadComm};
pub use error::MgrError;
pub use partition::{C_PT, F_PT, Partition};
pub use sparse::{CsrBuilder, CsrMatrix, ParCsrMatrix};
pub use traits::{ComplexField, LevelSolver};

// Re-export the solver and its configuration
pub use coarse::{CoarseGridMethod, NonGalerkinMethod, NonGalerkinOrdering};
pub use interp::{InterpType, RestrictType};
pub use mgr::{
    CpointSelection, FRelaxMethod, GlobalSmoothCycle, MgrConfig, MgrConfigBuilder, MgrSolver,
};
pub use relax::{BlockRelaxMethod, RelaxType};

// Re-export sub-solvers
pub use amg::{AmgConfig, AmgDiagnostics, AmgSolver};
pub use classical::ClassicalInterp;
pub use direct::{DirectSolver, LuError, LuFactorization, lu_solve};

#[cfg(test)]
pub(crate) mod testing {
    use crate::sparse::CsrMatrix;
    use ndarray::Array2;

    /// 1-D Poisson matrix: 2 on the diagonal, -1 on both neighbours
    pub fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
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

    /// Diagonally dominant nonsymmetric matrix with a second upper band
    pub fn nonsymmetric_test_matrix(n: usize) -> CsrMatrix<f64> {
        let mut triplets = Vec::with_capacity(4 * n);
        for i in 0..n {
            triplets.push((i, i, 4.0 + 0.1 * i as f64));
            if i > 0 {
                triplets.push((i, i - 1, -1.0 - 0.05 * i as f64));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -0.5));
            }
            if i + 2 < n {
                triplets.push((i, i + 2, 0.25));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    pub fn assert_dense_eq(a: &Array2<f64>, b: &Array2<f64>, tol: f64) {
        assert_eq!(a.dim(), b.dim(), "shape mismatch");
        for ((idx, x), y) in a.indexed_iter().zip(b.iter()) {
            assert!(
                (x - y).abs() <= tol,
                "entry {idx:?}: {x} vs {y} (tol {tol})"
            );
        }
    }
}
