//! MGR V-cycle and the outer iteration

use super::config::{GlobalSmoothCycle, MgrConfig};
use super::level::{CoarseGrid, FRelax, MgrLevel};
use super::{MgrSolver, SolveStats, agree};
use crate::error::{MgrError, check_len};
use crate::partition::F_PT;
use crate::relax::relax_points;
use crate::sparse::ParCsrMatrix;
use crate::sparse::vector::{gather_add_by_marker, global_norm, scatter_add_by_marker};
use crate::traits::{ComplexField, LevelSolver};
use log::{debug, info, warn};
use ndarray::Array1;

type UserSolvers<T> = [Option<Box<dyn LevelSolver<T>>>];

impl<T: ComplexField> MgrSolver<T> {
    /// Collective: run MGR cycles on `A x = b` with `x` as initial guess.
    ///
    /// Stops once `‖b − A x‖ / ‖b‖ < tol` or after `max_iter` cycles; not converging is
    /// not an error. A non-fatal error inside a cycle is logged and the iteration goes on;
    /// the first one is returned at the end. Communication errors abort at once.
    pub fn solve(&mut self, b: &Array1<T>, x: &mut Array1<T>) -> Result<(), MgrError> {
        let Self {
            config,
            coarse_solver,
            f_solvers,
            hierarchy,
            stats,
        } = self;
        let hierarchy = hierarchy.as_mut().ok_or(MgrError::NotSetUp)?;
        let coarse_solver = coarse_solver.as_mut().ok_or(MgrError::NotSetUp)?;
        *stats = None;

        let a = hierarchy.finest();
        let comm = a.comm().clone();
        agree(
            comm.as_ref(),
            check_len(a.local_rows(), b.len()).and_then(|()| check_len(a.local_rows(), x.len())),
        )?;

        let b_norm = T::real_to_f64(global_norm(comm.as_ref(), b)?);
        if b_norm == 0.0 {
            x.fill(T::zero());
            *stats = Some(SolveStats::default());
            return Ok(());
        }
        let relative_residual = |a: &ParCsrMatrix<T>, x: &Array1<T>| -> Result<f64, MgrError> {
            let r = a.residual(b, x)?;
            Ok(T::real_to_f64(global_norm(comm.as_ref(), &r)?) / b_norm)
        };

        let mut rel = relative_residual(a, &*x)?;
        let mut iterations = 0;
        let mut history = Vec::new();
        let mut first_error = None;

        while rel >= config.tol && iterations < config.max_iter {
            let outcome = cycle(
                config,
                &mut hierarchy.levels,
                &mut hierarchy.coarse,
                &mut **coarse_solver,
                f_solvers,
                b,
                x,
            );
            match outcome {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("MGR cycle {}: {e}", iterations + 1);
                    first_error.get_or_insert(e);
                }
                Ok(()) => {}
            }
            iterations += 1;

            rel = relative_residual(hierarchy.finest(), &*x)?;
            if config.logging > 0 {
                history.push(rel);
            }
            if config.print_level > 0 {
                info!("MGR cycle {iterations}: relative residual {rel:.6e}");
            }
        }

        if rel >= config.tol {
            debug!(
                "MGR stopped after {iterations} cycles at relative residual {rel:.3e} (tol {:.1e})",
                config.tol
            );
        }
        *stats = Some(SolveStats {
            iterations,
            final_relative_residual: rel,
            history,
        });
        first_error.map_or(Ok(()), Err)
    }
}

/// Collective: one V-cycle from the first of `levels` down to the coarse grid, updating
/// `u` in place
fn cycle<T: ComplexField>(
    config: &MgrConfig,
    levels: &mut [MgrLevel<T>],
    coarse: &mut CoarseGrid<T>,
    coarse_solver: &mut dyn LevelSolver<T>,
    f_solvers: &mut UserSolvers<T>,
    f: &Array1<T>,
    u: &mut Array1<T>,
) -> Result<(), MgrError> {
    let Some((level, coarser)) = levels.split_first_mut() else {
        coarse_solver.solve(&coarse.matrix, f, u)?;
        coarse.rhs = Some(f.clone());
        coarse.solution = Some(u.clone());
        return Ok(());
    };
    let (user, coarser_f_solvers) = match f_solvers.split_first_mut() {
        Some((first, rest)) => (first.as_mut(), rest),
        None => (None, Default::default()),
    };
    let MgrLevel {
        matrix,
        cf_marker,
        prolongation,
        restriction,
        f_relax,
        global_smoother,
    } = level;
    let matrix = &*matrix;
    let cf_marker = cf_marker.as_slice();
    let global_smoother = global_smoother.as_ref();

    let smooth = |u: &mut Array1<T>| -> Result<(), MgrError> {
        if let Some(gs) = global_smoother {
            for _ in 0..gs.iters {
                gs.relax.apply(matrix, f, u, gs.method)?;
            }
        }
        Ok(())
    };

    if config.global_smooth_cycle == GlobalSmoothCycle::Pre {
        smooth(&mut *u)?;
    }

    match f_relax {
        FRelax::Points { relax_type, sweeps } => {
            for _ in 0..*sweeps {
                relax_points(
                    matrix,
                    f,
                    u,
                    Some((cf_marker, F_PT)),
                    *relax_type,
                    config.relax_weight,
                )?;
            }
        }
        FRelax::Amg {
            a_ff,
            solver,
            sweeps,
        } => f_solve(matrix, cf_marker, a_ff, &mut **solver, *sweeps, f, u)?,
        FRelax::User { a_ff, sweeps } => {
            let solver = user.ok_or(MgrError::MissingSolver {
                what: "F-relaxation",
            })?;
            f_solve(matrix, cf_marker, a_ff, &mut **solver, *sweeps, f, u)?;
        }
    }

    let r = matrix.residual(f, u)?;
    let f_coarse = restriction.matvec(&r)?;
    let mut u_coarse = Array1::zeros(f_coarse.len());
    cycle(
        config,
        coarser,
        coarse,
        coarse_solver,
        coarser_f_solvers,
        &f_coarse,
        &mut u_coarse,
    )?;
    *u += &prolongation.matvec(&u_coarse)?;

    if config.global_smooth_cycle == GlobalSmoothCycle::Post {
        smooth(&mut *u)?;
    }
    Ok(())
}

/// Collective: `sweeps` times `u_F += A_FF⁻¹ (f − A u)_F`, the inverse applied by `solver`
fn f_solve<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    a_ff: &ParCsrMatrix<T>,
    solver: &mut dyn LevelSolver<T>,
    sweeps: usize,
    f: &Array1<T>,
    u: &mut Array1<T>,
) -> Result<(), MgrError> {
    for _ in 0..sweeps {
        let r = a.residual(f, u)?;
        let mut r_f = Array1::zeros(a_ff.local_rows());
        gather_add_by_marker(T::one(), &r, T::zero(), &mut r_f, cf_marker, F_PT);
        let mut e_f = Array1::zeros(r_f.len());
        solver.solve(a_ff, &r_f, &mut e_f)?;
        scatter_add_by_marker(T::one(), &e_f, T::one(), u, cf_marker, F_PT);
    }
    Ok(())
}
