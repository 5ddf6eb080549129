//! Redundant direct solve of a distributed system
//!
//! Every rank gathers the whole matrix, factorises it and solves the gathered right-hand
//! side, then keeps its own slice of the solution.

use super::lu::LuFactorization;
use crate::comm::CommExt;
use crate::error::{MgrError, check_len};
use crate::sparse::ParCsrMatrix;
use crate::traits::{ComplexField, LevelSolver};
use ndarray::Array1;

/// Dense LU on the gathered operator
#[derive(Debug, Clone)]
pub struct DirectSolver<T: ComplexField> {
    factors: Option<LuFactorization<T>>,
}

impl<T: ComplexField> DirectSolver<T> {
    pub fn new() -> Self {
        Self { factors: None }
    }

    /// Collective: gather and factorise `a`
    pub fn factorize(&mut self, a: &ParCsrMatrix<T>) -> Result<(), MgrError> {
        let dense = a.to_global_dense()?;
        log::debug!("direct solver: factorising {} x {}", dense.nrows(), dense.ncols());
        self.factors = Some(LuFactorization::new(&dense)?);
        Ok(())
    }

    /// Collective: solve with the stored factors; `b` and the result are local slices
    pub fn solve_local(
        &self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
    ) -> Result<Array1<T>, MgrError> {
        let factors = self.factors.as_ref().ok_or(MgrError::NotSetUp)?;
        check_len(a.local_rows(), b.len())?;

        let pieces = a.comm().all_gather(b.to_vec())?;
        let global = Array1::from_iter(pieces.into_iter().flatten());
        let x = factors.solve(&global)?;

        let range = a.row_partition().local_range(a.comm().rank());
        Ok(x.slice(ndarray::s![range.start..range.end]).to_owned())
    }
}

impl<T: ComplexField> Default for DirectSolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComplexField> LevelSolver<T> for DirectSolver<T> {
    fn setup(
        &mut self,
        a: &ParCsrMatrix<T>,
        _b: &Array1<T>,
        _x: &Array1<T>,
    ) -> Result<(), MgrError> {
        self.factorize(a)
    }

    fn solve(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
    ) -> Result<(), MgrError> {
        *x = self.solve_local(a, b)?;
        Ok(())
    }
}
