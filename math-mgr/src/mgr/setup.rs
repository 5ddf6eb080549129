//! Collective construction of the MGR hierarchy

use super::config::{FRelaxMethod, MgrConfig};
use super::level::{
    CoarseGrid, FRelax, GlobalSmoother, LevelBlocks, MgrLevel, RowLabels, Splitting,
    split_level,
};
use super::{Hierarchy, MgrSolver, agree};
use crate::amg::AmgSolver;
use crate::coarse::{
    CoarseGridMethod, NonGalerkinMethod, NonGalerkinOptions, galerkin_coarse_operator,
    non_galerkin_coarse_operator, truncate_coarse_grid,
};
use crate::error::{MgrError, check_len};
use crate::interp::{
    InterpOptions, InterpType, block_jacobi_weights, build_interp, build_restriction,
};
use crate::partition::coarse_range;
use crate::relax::BlockRelax;
use crate::sparse::ParCsrMatrix;
use crate::subblock::build_aff;
use crate::traits::{ComplexField, LevelSolver};
use log::{debug, info, warn};
use ndarray::Array1;
use std::sync::Arc;
use std::time::Instant;

/// Transfer and coarse operators of one level
struct LevelOperators<T: ComplexField> {
    prolongation: ParCsrMatrix<T>,
    restriction: ParCsrMatrix<T>,
    coarse_matrix: ParCsrMatrix<T>,
}

impl<T: ComplexField> MgrSolver<T> {
    /// Collective: build the hierarchy for `a`.
    ///
    /// Any previous hierarchy and solve statistics are dropped first. `b` and `x` are
    /// only checked for size here; they are passed on to the sub-solvers' setup.
    pub fn setup(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &Array1<T>,
    ) -> Result<(), MgrError> {
        self.hierarchy = None;
        self.stats = None;
        self.config.validate()?;
        let comm = Arc::clone(a.comm());
        agree(
            comm.as_ref(),
            check_len(a.local_rows(), b.len()).and_then(|()| check_len(a.local_rows(), x.len())),
        )?;
        if a.global_rows() != a.global_cols() {
            return Err(MgrError::InvalidArgument(format!(
                "MGR needs a square operator, got {} x {}",
                a.global_rows(),
                a.global_cols()
            )));
        }
        if self.coarse_solver.is_none() && !self.config.use_default_coarse_solver {
            warn!("MGR setup: no coarse-grid solver registered and the default one is disabled");
            return Err(MgrError::MissingSolver { what: "coarse-grid" });
        }

        let start = Instant::now();
        let config = &self.config;
        let num_levels = config.num_reduction_levels();
        let has_reserved = !config.reserved_coarse_nodes.is_empty();

        // Every rank has to agree before the first collective of the level loop
        let mut rows = agree(
            comm.as_ref(),
            RowLabels::finest(config, a.first_row(), a.local_rows(), a.global_rows()),
        )?;

        let mut levels = Vec::with_capacity(num_levels);
        let mut level_rows = vec![a.global_rows()];
        let mut level_nnz = vec![a.global_nnz()?];
        let mut matrix = a.clone();

        for lev in 0..num_levels {
            let splitting = Splitting::for_level(config, lev, num_levels, has_reserved);
            let cf_marker = split_level(&matrix, &rows, splitting);
            let n = matrix.global_rows();
            let num_coarse = coarse_range(comm.as_ref(), &cf_marker)?.total;
            if num_coarse == 0 {
                warn!(
                    "MGR setup: {}; the hierarchy stops at {lev} reduction levels",
                    MgrError::EmptyCoarseGrid { level: lev }
                );
                break;
            }
            if num_coarse == n {
                debug!("MGR level {lev}: no F points, the hierarchy stops here");
                break;
            }

            let blocks = LevelBlocks::for_level(config, lev);
            let ops = level_operators(config, lev, &matrix, &cf_marker, blocks)?;
            let user = self.f_solvers.get_mut(lev).and_then(Option::as_mut);
            let f_relax = setup_f_relax(config, lev, &matrix, &cf_marker, user)?;
            let global_smoother = match config.max_global_smooth_iters_at(lev) {
                0 => None,
                iters => Some(GlobalSmoother {
                    relax: BlockRelax::setup(&matrix, blocks.system),
                    method: config.global_smooth_type_at(lev),
                    iters,
                }),
            };

            let coarse_nnz = ops.coarse_matrix.global_nnz()?;
            debug!(
                "MGR level {lev}: {n} rows -> {num_coarse} coarse, blocks {}/{}/{}, {} nnz on the coarse grid",
                blocks.system, blocks.fine, blocks.coarse, coarse_nnz
            );
            level_rows.push(num_coarse);
            level_nnz.push(coarse_nnz);
            rows = rows.coarsen(&cf_marker);

            levels.push(MgrLevel {
                matrix: std::mem::replace(&mut matrix, ops.coarse_matrix),
                cf_marker,
                prolongation: ops.prolongation,
                restriction: ops.restriction,
                f_relax,
                global_smoother,
            });
        }

        let coarse_solver = self
            .coarse_solver
            .get_or_insert_with(|| Box::new(AmgSolver::new(config.coarse_solver.clone())));
        let zeros = Array1::zeros(matrix.local_rows());
        coarse_solver.setup(&matrix, &zeros, &zeros)?;

        let hierarchy = Hierarchy {
            levels,
            coarse: CoarseGrid {
                matrix,
                rhs: None,
                solution: None,
            },
            level_rows,
            level_nnz,
        };
        if config.print_level > 0 {
            let (_, operator_complexity) =
                crate::amg::complexities(&hierarchy.level_rows, &hierarchy.level_nnz);
            info!(
                "MGR setup: {} levels, rows {:?}, operator complexity {:.3}, {:.1} ms",
                hierarchy.level_rows.len(),
                hierarchy.level_rows,
                operator_complexity,
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        self.hierarchy = Some(hierarchy);
        Ok(())
    }
}

/// Collective: `P`, `R` and the coarse operator of reduction level `lev`
fn level_operators<T: ComplexField>(
    config: &MgrConfig,
    lev: usize,
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    blocks: LevelBlocks,
) -> Result<LevelOperators<T>, MgrError> {
    let interp = config.interp_type_at(lev);
    let interp_options = InterpOptions {
        block_size: blocks.fine,
        trunc_factor: config.trunc_factor,
        max_elmts: config.p_max_elmts_at(lev),
        num_sweeps: config.num_interp_sweeps,
        ..Default::default()
    };

    // Block-Jacobi weights double as the Schur correction of the block-diagonal method
    let wp = match interp {
        InterpType::BlockJacobi => Some(block_jacobi_weights(a, cf_marker, blocks.fine)?),
        _ => None,
    };
    let prolongation = match &wp {
        Some(wp) => build_interp(
            a,
            cf_marker,
            InterpType::Injection,
            &interp_options,
            Some(wp.clone()),
        )?,
        None => build_interp(a, cf_marker, interp, &interp_options, None)?,
    };

    let restrict_options = InterpOptions {
        block_size: blocks.fine,
        num_sweeps: config.num_restrict_sweeps,
        ..Default::default()
    };
    let restriction =
        build_restriction(a, cf_marker, config.restrict_type_at(lev), &restrict_options)?;

    let coarse_matrix = match config.coarse_grid_method_at(lev) {
        CoarseGridMethod::Galerkin => galerkin_coarse_operator(&restriction, a, &prolongation)?,
        CoarseGridMethod::NonGalerkin(method) => {
            let reuse = wp
                .as_ref()
                .filter(|_| method == NonGalerkinMethod::BlockDiagonal);
            let options = NonGalerkinOptions {
                method,
                fine_block_size: blocks.fine,
                coarse_block_size: blocks.coarse,
                max_elmts: config.non_galerkin_max_elmts_at(lev),
                ordering: config.non_galerkin_ordering,
            };
            non_galerkin_coarse_operator(a, cf_marker, reuse, &options)?
        }
    };
    let coarse_matrix = if config.truncate_coarse_grid_threshold > 0.0 {
        truncate_coarse_grid(&coarse_matrix, config.truncate_coarse_grid_threshold)?
    } else {
        coarse_matrix
    };

    Ok(LevelOperators {
        prolongation,
        restriction,
        coarse_matrix,
    })
}

/// Collective: F-relaxation of level `lev`. A registered user solver wins over the
/// configured method.
fn setup_f_relax<T: ComplexField>(
    config: &MgrConfig,
    lev: usize,
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    user: Option<&mut Box<dyn LevelSolver<T>>>,
) -> Result<FRelax<T>, MgrError> {
    let sweeps = config.num_relax_sweeps_at(lev);
    if let Some(solver) = user {
        let a_ff = build_aff(a, cf_marker)?;
        let zeros = Array1::zeros(a_ff.local_rows());
        solver.setup(&a_ff, &zeros, &zeros)?;
        return Ok(FRelax::User { a_ff, sweeps });
    }

    match config.f_relax_method_at(lev) {
        FRelaxMethod::SingleLevel => Ok(FRelax::Points {
            relax_type: config.f_relax_type_at(lev),
            sweeps,
        }),
        FRelaxMethod::MultiLevel => {
            let a_ff = build_aff(a, cf_marker)?;
            let zeros = Array1::zeros(a_ff.local_rows());
            let mut solver = Box::new(AmgSolver::new(config.f_relax_amg.clone()));
            solver.setup(&a_ff, &zeros, &zeros)?;
            Ok(FRelax::Amg {
                a_ff,
                solver,
                sweeps,
            })
        }
    }
}
