//! Algebraic multigrid solver
//!
//! Classical AMG on distributed matrices, used as the default coarse-grid solver of MGR
//! and as its multilevel F-relaxation.
//!
//! ## Features
//!
//! - **Coarsening**: Ruge-Stüben splitting of the strength graph, rank by rank
//! - **Interpolation**: direct, standard and extended classical interpolation
//! - **Smoothers**: weighted Jacobi, l1-Jacobi and hybrid Gauss-Seidel
//! - **Coarsest level**: redundant dense LU
//!
//! ## Usage
//!
//! ```ignore
//! use math_audio_mgr::{AmgConfig, AmgSolver, LevelSolver};
//!
//! let mut amg = AmgSolver::new(AmgConfig::default());
//! amg.setup(&a, &b, &x)?;
//! amg.solve(&a, &b, &mut x)?;
//! ```

use crate::classical::{
    ClassicalInterp, classical_interpolation, ruge_stuben, strength_of_connection,
};
use crate::coarse::galerkin_coarse_operator;
use crate::direct::DirectSolver;
use crate::error::{MgrError, check_len};
use crate::interp::truncate_interp;
use crate::partition::coarse_range;
use crate::relax::{RelaxType, relax_points};
use crate::sparse::ParCsrMatrix;
use crate::sparse::vector::global_norm;
use crate::traits::{ComplexField, LevelSolver};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Configuration for [`AmgSolver`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmgConfig {
    /// Interpolation operator type
    pub interpolation: ClassicalInterp,

    /// Smoother for pre- and post-relaxation
    pub smoother: RelaxType,

    /// Strong connection threshold (default: 0.25)
    /// Connections with |a_ij| >= θ * max_k |a_ik| are considered strong
    pub strong_threshold: f64,

    /// Maximum number of levels in the hierarchy
    pub max_levels: usize,

    /// Coarsest level size - switch to direct solve below this
    pub coarse_size: usize,

    /// Number of pre-smoothing sweeps (ν₁)
    pub num_pre_smooth: usize,

    /// Number of post-smoothing sweeps (ν₂)
    pub num_post_smooth: usize,

    /// Jacobi damping parameter (ω)
    pub jacobi_weight: f64,

    /// Truncation factor for interpolation (drop small weights)
    pub trunc_factor: f64,

    /// Maximum interpolation stencil size per row (0 = unlimited)
    pub max_interp_elements: usize,

    /// V-cycles per solve
    pub max_iter: usize,

    /// Stop early once `‖r‖/‖b‖` falls below this (0 = always run `max_iter` cycles)
    pub tol: f64,
}

impl Default for AmgConfig {
    fn default() -> Self {
        Self {
            interpolation: ClassicalInterp::default(),
            smoother: RelaxType::default(),
            strong_threshold: 0.25,
            max_levels: 25,
            coarse_size: 50,
            num_pre_smooth: 1,
            num_post_smooth: 1,
            jacobi_weight: 0.6667, // 2/3 is optimal for Poisson
            trunc_factor: 0.0,
            max_interp_elements: 4,
            max_iter: 1,
            tol: 0.0,
        }
    }
}

impl AmgConfig {
    /// A solver run to convergence, for when AMG is the outer method
    pub fn standalone(tol: f64, max_iter: usize) -> Self {
        Self {
            max_iter,
            tol,
            smoother: RelaxType::HybridGaussSeidel,
            ..Default::default()
        }
    }

    fn relax_weight(&self) -> f64 {
        match self.smoother {
            RelaxType::Jacobi => self.jacobi_weight,
            RelaxType::L1Jacobi | RelaxType::HybridGaussSeidel => 1.0,
        }
    }
}

/// Transfer operators between level `k` and `k + 1`, plus the operator of `k + 1`
#[derive(Debug, Clone)]
struct AmgLevel<T: ComplexField> {
    prolongation: ParCsrMatrix<T>,
    restriction: ParCsrMatrix<T>,
    coarse_matrix: ParCsrMatrix<T>,
}

/// Diagnostic information about AMG setup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmgDiagnostics {
    /// Number of levels, the finest included
    pub num_levels: usize,
    /// Grid complexity
    pub grid_complexity: f64,
    /// Operator complexity
    pub operator_complexity: f64,
    /// Setup time in milliseconds
    pub setup_time_ms: f64,
    /// Global rows per level
    pub level_rows: Vec<usize>,
    /// Global non-zeros per level
    pub level_nnz: Vec<usize>,
}

/// Classical AMG V-cycle solver
///
/// The hierarchy keeps the coarse operators only; the finest operator is the one handed
/// to [`LevelSolver::solve`].
#[derive(Debug, Clone)]
pub struct AmgSolver<T: ComplexField> {
    config: AmgConfig,
    levels: Vec<AmgLevel<T>>,
    coarsest: DirectSolver<T>,
    diagnostics: Option<AmgDiagnostics>,
    convergence_factor: Option<f64>,
}

impl<T: ComplexField> AmgSolver<T> {
    pub fn new(config: AmgConfig) -> Self {
        Self {
            config,
            levels: Vec::new(),
            coarsest: DirectSolver::new(),
            diagnostics: None,
            convergence_factor: None,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &AmgConfig {
        &self.config
    }

    /// Setup statistics, once [`LevelSolver::setup`] has run
    pub fn diagnostics(&self) -> Option<&AmgDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Get number of levels in hierarchy (0 before setup)
    pub fn num_levels(&self) -> usize {
        self.diagnostics.as_ref().map_or(0, |d| d.num_levels)
    }

    /// Collective: build the hierarchy for `a`
    fn build(&mut self, a: &ParCsrMatrix<T>) -> Result<(), MgrError> {
        let start = std::time::Instant::now();
        self.levels.clear();
        self.diagnostics = None;

        let mut level_rows = vec![a.global_rows()];
        let mut level_nnz = vec![a.global_nnz()?];

        while level_rows.len() < self.config.max_levels.max(1) {
            let current = self.levels.last().map_or(a, |l| &l.coarse_matrix);
            let n = current.global_rows();
            if n <= self.config.coarse_size {
                break;
            }

            let strength = strength_of_connection(current, self.config.strong_threshold);
            let cf_marker = ruge_stuben(&strength, None);
            let num_coarse = coarse_range(current.comm().as_ref(), &cf_marker)?.total;
            if num_coarse == 0 || num_coarse >= n {
                log::debug!("AMG: coarsening stalled at {n} rows");
                break;
            }

            let p =
                classical_interpolation(current, &strength, &cf_marker, self.config.interpolation)?;
            let p = truncate_interp(
                p,
                &cf_marker,
                self.config.trunc_factor,
                self.config.max_interp_elements,
            )?;
            let r = p.transpose()?;
            let coarse_matrix = galerkin_coarse_operator(&r, current, &p)?;

            log::debug!(
                "AMG level {}: {} -> {} rows",
                level_rows.len() - 1,
                n,
                num_coarse
            );
            level_rows.push(num_coarse);
            level_nnz.push(coarse_matrix.global_nnz()?);
            self.levels.push(AmgLevel {
                prolongation: p,
                restriction: r,
                coarse_matrix,
            });
        }

        let coarsest = self.levels.last().map_or(a, |l| &l.coarse_matrix);
        self.coarsest.factorize(coarsest)?;

        let (grid_complexity, operator_complexity) = complexities(&level_rows, &level_nnz);
        let diagnostics = AmgDiagnostics {
            num_levels: level_rows.len(),
            grid_complexity,
            operator_complexity,
            setup_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            level_rows,
            level_nnz,
        };
        log::debug!(
            "AMG setup: {} levels, operator complexity {:.3}",
            diagnostics.num_levels,
            diagnostics.operator_complexity
        );
        self.diagnostics = Some(diagnostics);
        Ok(())
    }

    fn operator<'a>(&'a self, a: &'a ParCsrMatrix<T>, level: usize) -> &'a ParCsrMatrix<T> {
        match level {
            0 => a,
            k => &self.levels[k - 1].coarse_matrix,
        }
    }

    fn smooth(
        &self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        sweeps: usize,
    ) -> Result<(), MgrError> {
        for _ in 0..sweeps {
            relax_points(a, b, x, None, self.config.smoother, self.config.relax_weight())?;
        }
        Ok(())
    }

    /// Collective: one V-cycle from `level` down
    fn v_cycle(
        &self,
        a: &ParCsrMatrix<T>,
        level: usize,
        x: &mut Array1<T>,
        b: &Array1<T>,
    ) -> Result<(), MgrError> {
        let matrix = self.operator(a, level);

        // Coarsest level: direct solve
        if level == self.levels.len() {
            *x = self.coarsest.solve_local(matrix, b)?;
            return Ok(());
        }
        let lvl = &self.levels[level];

        self.smooth(matrix, b, x, self.config.num_pre_smooth)?;

        let r = matrix.residual(b, x)?;
        let r_coarse = lvl.restriction.matvec(&r)?;
        let mut e_coarse = Array1::zeros(r_coarse.len());
        self.v_cycle(a, level + 1, &mut e_coarse, &r_coarse)?;
        *x += &lvl.prolongation.matvec(&e_coarse)?;

        self.smooth(matrix, b, x, self.config.num_post_smooth)
    }
}

/// (Σ rows / fine rows, Σ nnz / fine nnz)
pub(crate) fn complexities(level_rows: &[usize], level_nnz: &[usize]) -> (f64, f64) {
    let ratio = |v: &[usize]| match v.first() {
        Some(&fine) if fine > 0 => v.iter().sum::<usize>() as f64 / fine as f64,
        _ => 1.0,
    };
    (ratio(level_rows), ratio(level_nnz))
}

impl<T: ComplexField> LevelSolver<T> for AmgSolver<T> {
    fn setup(
        &mut self,
        a: &ParCsrMatrix<T>,
        _b: &Array1<T>,
        _x: &Array1<T>,
    ) -> Result<(), MgrError> {
        self.build(a)
    }

    fn solve(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
    ) -> Result<(), MgrError> {
        if self.diagnostics.is_none() {
            return Err(MgrError::NotSetUp);
        }
        check_len(a.local_rows(), b.len())?;
        check_len(a.local_rows(), x.len())?;

        let comm = a.comm().as_ref();
        let b_norm = T::real_to_f64(global_norm(comm, b)?);
        let initial = T::real_to_f64(global_norm(comm, &a.residual(b, x)?)?);
        let mut current = initial;
        let mut cycles = 0;

        for _ in 0..self.config.max_iter {
            self.v_cycle(a, 0, x, b)?;
            cycles += 1;
            current = T::real_to_f64(global_norm(comm, &a.residual(b, x)?)?);
            if self.config.tol > 0.0 && b_norm > 0.0 && current / b_norm < self.config.tol {
                break;
            }
        }

        self.convergence_factor = (cycles > 0 && initial > 0.0)
            .then(|| (current / initial).powf(1.0 / cycles as f64));
        log::trace!("AMG solve: {cycles} cycles, |r| {initial:.3e} -> {current:.3e}");
        Ok(())
    }

    fn convergence_factor(&self) -> Option<f64> {
        self.convergence_factor
    }
}
