//! Multigrid reduction (MGR) solver
//!
//! Each reduction level splits its rows into F points, which are eliminated by a cheap
//! relaxation, and C points, which carry the problem to the next level through a
//! prolongation `P`, a restriction `R` and a coarse operator. The last coarse operator
//! is handed to a pluggable coarse-grid solver.
//!
//! ```ignore
//! use math_audio_mgr::{MgrConfig, MgrSolver, InterpType};
//!
//! let config = MgrConfig::builder()
//!     .cpoints_by_block(2, vec![vec![0]])
//!     .interp_type(InterpType::DiagonalScaled)
//!     .tol(1e-8)
//!     .build()?;
//! let mut mgr = MgrSolver::new(config);
//! mgr.setup(&a, &b, &x)?;
//! mgr.solve(&b, &mut x)?;
//! println!("{} cycles", mgr.num_iterations()?);
//! ```

mod config;
mod cycle;
mod level;
mod setup;

pub use config::{CpointSelection, FRelaxMethod, GlobalSmoothCycle, MgrConfig, MgrConfigBuilder};

use crate::comm::{CommExt, Communicator};
use crate::error::MgrError;
use crate::sparse::ParCsrMatrix;
use crate::traits::{ComplexField, LevelSolver};
use level::{CoarseGrid, MgrLevel};
use ndarray::Array1;
use std::fmt;

/// Levels built by [`MgrSolver::setup`]
struct Hierarchy<T: ComplexField> {
    levels: Vec<MgrLevel<T>>,
    coarse: CoarseGrid<T>,
    /// Global rows per level, coarse grid included
    level_rows: Vec<usize>,
    level_nnz: Vec<usize>,
}

impl<T: ComplexField> Hierarchy<T> {
    fn finest(&self) -> &ParCsrMatrix<T> {
        self.levels.first().map_or(&self.coarse.matrix, |l| &l.matrix)
    }
}

/// Outcome of the last [`MgrSolver::solve`]
#[derive(Debug, Clone, Default)]
struct SolveStats {
    iterations: usize,
    final_relative_residual: f64,
    history: Vec<f64>,
}

/// Collective: make a per-rank check fail on every rank when it fails on any of them.
/// The failing ranks keep their own error.
fn agree<X>(comm: &dyn Communicator, local: Result<X, MgrError>) -> Result<X, MgrError> {
    let failed_ranks = comm.all_reduce_sum(usize::from(local.is_err()))?;
    match local {
        Err(e) => Err(e),
        Ok(_) if failed_ranks > 0 => Err(MgrError::InvalidArgument(format!(
            "invalid input on {failed_ranks} rank(s)"
        ))),
        ok => ok,
    }
}

/// Multigrid reduction solver
pub struct MgrSolver<T: ComplexField> {
    config: MgrConfig,
    coarse_solver: Option<Box<dyn LevelSolver<T>>>,
    f_solvers: Vec<Option<Box<dyn LevelSolver<T>>>>,
    hierarchy: Option<Hierarchy<T>>,
    stats: Option<SolveStats>,
}

impl<T: ComplexField> fmt::Debug for MgrSolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MgrSolver")
            .field("config", &self.config)
            .field("user_coarse_solver", &self.coarse_solver.is_some())
            .field(
                "user_f_solvers",
                &self.f_solvers.iter().filter(|s| s.is_some()).count(),
            )
            .field("num_levels", &self.num_levels())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<T: ComplexField> MgrSolver<T> {
    pub fn new(config: MgrConfig) -> Self {
        Self {
            config,
            coarse_solver: None,
            f_solvers: Vec::new(),
            hierarchy: None,
            stats: None,
        }
    }

    pub fn config(&self) -> &MgrConfig {
        &self.config
    }

    /// Replace the coarse-grid solver. Takes effect at the next setup.
    pub fn set_coarse_solver(&mut self, solver: Box<dyn LevelSolver<T>>) {
        self.coarse_solver = Some(solver);
    }

    /// Use `solver` on `A_FF` as the F-relaxation of reduction level `level`.
    /// Takes effect at the next setup.
    pub fn set_f_solver(
        &mut self,
        level: usize,
        solver: Box<dyn LevelSolver<T>>,
    ) -> Result<(), MgrError> {
        let levels = self.config.num_reduction_levels();
        if level >= levels {
            return Err(MgrError::InvalidArgument(format!(
                "F-relaxation solver for level {level}, but only {levels} reduction levels"
            )));
        }
        if self.f_solvers.len() <= level {
            self.f_solvers.resize_with(level + 1, || None);
        }
        self.f_solvers[level] = Some(solver);
        Ok(())
    }

    fn hierarchy(&self) -> Result<&Hierarchy<T>, MgrError> {
        self.hierarchy.as_ref().ok_or(MgrError::NotSetUp)
    }

    fn stats(&self) -> Result<&SolveStats, MgrError> {
        self.hierarchy()?;
        self.stats.as_ref().ok_or(MgrError::NotSolved)
    }

    /// Cycles run by the last solve
    pub fn num_iterations(&self) -> Result<usize, MgrError> {
        Ok(self.stats()?.iterations)
    }

    /// `‖b - A x‖ / ‖b‖` after the last solve
    pub fn final_relative_residual_norm(&self) -> Result<f64, MgrError> {
        Ok(self.stats()?.final_relative_residual)
    }

    /// Relative residual after every cycle of the last solve; empty unless `logging > 0`
    pub fn residual_history(&self) -> Result<&[f64], MgrError> {
        Ok(&self.stats()?.history)
    }

    /// Convergence factor reported by the coarse-grid solver, if it tracks one
    pub fn coarse_grid_convergence_factor(&self) -> Result<Option<f64>, MgrError> {
        self.stats()?;
        let solver = self
            .coarse_solver
            .as_ref()
            .ok_or(MgrError::MissingSolver { what: "coarse-grid" })?;
        Ok(solver.convergence_factor())
    }

    /// Operator handed to the coarse-grid solver
    pub fn coarse_grid_matrix(&self) -> Result<&ParCsrMatrix<T>, MgrError> {
        Ok(&self.hierarchy()?.coarse.matrix)
    }

    /// Coarse-grid solution of the last cycle
    pub fn coarse_grid_solution(&self) -> Result<&Array1<T>, MgrError> {
        self.hierarchy()?
            .coarse
            .solution
            .as_ref()
            .ok_or(MgrError::NotSolved)
    }

    /// Coarse-grid right-hand side of the last cycle
    pub fn coarse_grid_rhs(&self) -> Result<&Array1<T>, MgrError> {
        self.hierarchy()?
            .coarse
            .rhs
            .as_ref()
            .ok_or(MgrError::NotSolved)
    }

    /// Number of levels, coarse grid included (0 before setup)
    pub fn num_levels(&self) -> usize {
        self.hierarchy.as_ref().map_or(0, |h| h.level_rows.len())
    }

    /// Global rows of every level, finest first
    pub fn level_sizes(&self) -> Result<&[usize], MgrError> {
        Ok(&self.hierarchy()?.level_rows)
    }

    /// Total nonzeros of all level operators over the nonzeros of the finest one
    pub fn operator_complexity(&self) -> Result<f64, MgrError> {
        let h = self.hierarchy()?;
        Ok(crate::amg::complexities(&h.level_rows, &h.level_nnz).1)
    }
}

impl<T: ComplexField> LevelSolver<T> for MgrSolver<T> {
    fn setup(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &Array1<T>,
    ) -> Result<(), MgrError> {
        MgrSolver::setup(self, a, b, x)
    }

    /// Runs the configured number of cycles on `a`, which must be the operator given to
    /// setup
    fn solve(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
    ) -> Result<(), MgrError> {
        let finest = self.hierarchy()?.finest();
        if finest.global_rows() != a.global_rows() {
            return Err(MgrError::DimensionMismatch {
                expected: finest.global_rows(),
                got: a.global_rows(),
            });
        }
        MgrSolver::solve(self, b, x)
    }

    fn convergence_factor(&self) -> Option<f64> {
        let stats = self.stats.as_ref()?;
        (stats.iterations > 0)
            .then(|| stats.final_relative_residual.powf(1.0 / stats.iterations as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::direct::DirectSolver;
    use crate::partition::Partition;
    use crate::interp::{InterpType, RestrictType};
    use crate::partition::is_coarse;
    use crate::testing::{assert_dense_eq, laplacian_1d};
    use ndarray::Array2;

    fn poisson(n: usize) -> ParCsrMatrix<f64> {
        let part = Partition::uniform(n, 1);
        ParCsrMatrix::from_serial(SerialComm::shared(), &laplacian_1d(n), part.clone(), part)
            .unwrap()
    }

    fn two_level_config() -> MgrConfig {
        MgrConfig::builder()
            .max_coarse_levels(2)
            .logging(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_getters_before_setup_and_solve() {
        let mut mgr = MgrSolver::<f64>::new(two_level_config());
        assert_eq!(mgr.num_levels(), 0);
        assert!(matches!(mgr.num_iterations(), Err(MgrError::NotSetUp)));
        assert!(matches!(mgr.coarse_grid_matrix(), Err(MgrError::NotSetUp)));
        assert!(matches!(mgr.level_sizes(), Err(MgrError::NotSetUp)));

        let a = poisson(16);
        let b = Array1::ones(16);
        let mut x = Array1::zeros(16);
        assert!(matches!(mgr.solve(&b, &mut x), Err(MgrError::NotSetUp)));

        mgr.setup(&a, &b, &x).unwrap();
        assert!(matches!(mgr.num_iterations(), Err(MgrError::NotSolved)));
        assert!(matches!(mgr.coarse_grid_rhs(), Err(MgrError::NotSolved)));
        assert!(matches!(
            mgr.coarse_grid_convergence_factor(),
            Err(MgrError::NotSolved)
        ));
    }

    #[test]
    fn test_poisson_hierarchy_and_exact_reduction() {
        let a = poisson(16);
        let b = Array1::ones(16);
        let mut x = Array1::zeros(16);
        let mut mgr = MgrSolver::new(two_level_config());
        mgr.setup(&a, &b, &x).unwrap();

        assert_eq!(mgr.level_sizes().unwrap(), &[16, 8, 4]);
        assert_eq!(mgr.num_levels(), 3);
        assert_eq!(mgr.coarse_grid_matrix().unwrap().global_rows(), 4);
        assert!(mgr.operator_complexity().unwrap() > 1.0);

        mgr.solve(&b, &mut x).unwrap();
        assert_eq!(mgr.num_iterations().unwrap(), 1);
        assert!(mgr.final_relative_residual_norm().unwrap() < 1e-10);
        assert_eq!(mgr.residual_history().unwrap().len(), 1);
        assert_eq!(mgr.coarse_grid_rhs().unwrap().len(), 4);
        assert_eq!(mgr.coarse_grid_solution().unwrap().len(), 4);
        assert!(mgr.coarse_grid_convergence_factor().unwrap().is_some());
    }

    #[test]
    fn test_zero_rhs_zeroes_the_solution() {
        let a = poisson(8);
        let b = Array1::zeros(8);
        let mut x = Array1::from_elem(8, 3.0);
        let mut mgr = MgrSolver::new(two_level_config());
        mgr.setup(&a, &b, &x).unwrap();
        mgr.solve(&b, &mut x).unwrap();
        assert!(x.iter().all(|&v| v == 0.0));
        assert_eq!(mgr.num_iterations().unwrap(), 0);
        assert_eq!(mgr.final_relative_residual_norm().unwrap(), 0.0);
    }

    #[test]
    fn test_missing_coarse_solver_is_reported() {
        let config = MgrConfig::builder()
            .use_default_coarse_solver(false)
            .build()
            .unwrap();
        let a = poisson(8);
        let b = Array1::ones(8);
        let x = Array1::zeros(8);
        let mut mgr = MgrSolver::new(config);
        assert!(matches!(
            mgr.setup(&a, &b, &x),
            Err(MgrError::MissingSolver { .. })
        ));
        assert_eq!(mgr.num_levels(), 0);

        mgr.set_coarse_solver(Box::new(DirectSolver::new()));
        mgr.setup(&a, &b, &x).unwrap();
        assert!(mgr.num_levels() > 1);
    }

    #[test]
    fn test_user_f_solver_level_checked() {
        let mut mgr = MgrSolver::<f64>::new(two_level_config());
        assert!(mgr.set_f_solver(1, Box::new(DirectSolver::new())).is_ok());
        assert!(matches!(
            mgr.set_f_solver(2, Box::new(DirectSolver::new())),
            Err(MgrError::InvalidArgument(_))
        ));
        assert!(format!("{mgr:?}").contains("user_f_solvers: 1"));
    }

    #[test]
    fn test_jacobi_transfer_operators_are_unswept() {
        let n = 8;
        let config = MgrConfig::builder()
            .max_coarse_levels(1)
            .interp_type(InterpType::Jacobi)
            .restrict_type(RestrictType::Jacobi)
            .build()
            .unwrap();
        let a = poisson(n);
        let mut mgr = MgrSolver::new(config);
        mgr.setup(&a, &Array1::ones(n), &Array1::zeros(n)).unwrap();

        let level = &mgr.hierarchy().unwrap().levels[0];
        let dense = laplacian_1d(n).to_dense();
        let coarse: Vec<Option<usize>> = level
            .cf_marker
            .iter()
            .scan(0, |next, &m| {
                Some(is_coarse(m).then(|| {
                    *next += 1;
                    *next - 1
                }))
            })
            .collect();
        let nc = coarse.iter().flatten().count();
        let mut p_expected = Array2::zeros((n, nc));
        let mut r_expected = Array2::zeros((nc, n));
        for i in 0..n {
            for j in 0..n {
                match (coarse[i], coarse[j]) {
                    (Some(ci), _) if i == j => {
                        p_expected[[i, ci]] = 1.0;
                        r_expected[[ci, i]] = 1.0;
                    }
                    (None, Some(cj)) => p_expected[[i, cj]] = -dense[[i, j]],
                    (Some(ci), None) => r_expected[[ci, j]] = -dense[[i, j]],
                    _ => {}
                }
            }
        }
        assert_dense_eq(&level.prolongation.to_global_dense().unwrap(), &p_expected, 1e-14);
        assert_dense_eq(&level.restriction.to_global_dense().unwrap(), &r_expected, 1e-14);
    }

    #[test]
    fn test_setup_rejects_wrong_vector_length() {
        let a = poisson(8);
        let mut mgr = MgrSolver::new(two_level_config());
        let result = mgr.setup(&a, &Array1::ones(7), &Array1::zeros(8));
        assert!(matches!(
            result,
            Err(MgrError::DimensionMismatch {
                expected: 8,
                got: 7
            })
        ));
    }
}
