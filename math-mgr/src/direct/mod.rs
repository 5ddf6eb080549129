//! Direct solvers for linear systems
//!
//! - [`LuFactorization`]: dense LU with partial pivoting
//! - [`DirectSolver`]: redundant LU of a gathered distributed matrix, usable as a
//!   [`LevelSolver`](crate::traits::LevelSolver)

mod lu;
mod solver;

pub use lu::{LuError, LuFactorization, lu_solve};
pub use solver::DirectSolver;
