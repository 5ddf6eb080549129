//! Dense LU factorization with partial pivoting
//!
//! Coarse grids of a multigrid hierarchy are small, so the bottom of the hierarchy is
//! factorised densely in pure Rust.

use crate::traits::ComplexField;
use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors that can occur during LU factorization
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LuError {
    #[error("matrix is singular or nearly singular (pivot {pivot})")]
    SingularMatrix { pivot: usize },
    #[error("matrix dimensions mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Row-pivoted LU factors, `P A = L U`
#[derive(Debug, Clone)]
pub struct LuFactorization<T: ComplexField> {
    /// L below the diagonal (unit diagonal implied), U on and above it
    pub lu: Array2<T>,
    /// `perm[i]` is the original row placed at position `i`
    pub perm: Vec<usize>,
    /// Matrix dimension
    pub n: usize,
}

impl<T: ComplexField> LuFactorization<T> {
    /// Factorise a square dense matrix
    pub fn new(a: &Array2<T>) -> Result<Self, LuError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LuError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }

        let mut lu = a.clone();
        let mut perm: Vec<usize> = (0..n).collect();
        let tiny = T::tiny();

        for k in 0..n {
            let (max_row, max_val) = (k..n)
                .map(|i| (i, lu[[i, k]].norm()))
                .fold((k, lu[[k, k]].norm()), |best, cur| {
                    if cur.1 > best.1 { cur } else { best }
                });
            if max_val <= tiny {
                return Err(LuError::SingularMatrix { pivot: k });
            }

            if max_row != k {
                for j in 0..n {
                    lu.swap([k, j], [max_row, j]);
                }
                perm.swap(k, max_row);
            }

            let pivot_inv = lu[[k, k]].inv();
            for i in (k + 1)..n {
                let mult = lu[[i, k]] * pivot_inv;
                lu[[i, k]] = mult;
                for j in (k + 1)..n {
                    let update = mult * lu[[k, j]];
                    lu[[i, j]] -= update;
                }
            }
        }

        Ok(Self { lu, perm, n })
    }

    /// Solve `A x = b` with the stored factors
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>, LuError> {
        if b.len() != self.n {
            return Err(LuError::DimensionMismatch {
                expected: self.n,
                got: b.len(),
            });
        }

        let mut x = Array1::from_iter(self.perm.iter().map(|&p| b[p]));

        // L y = P b
        for i in 0..self.n {
            let mut s = x[i];
            for j in 0..i {
                s -= self.lu[[i, j]] * x[j];
            }
            x[i] = s;
        }

        // U x = y
        for i in (0..self.n).rev() {
            let mut s = x[i];
            for j in (i + 1)..self.n {
                s -= self.lu[[i, j]] * x[j];
            }
            x[i] = s * self.lu[[i, i]].inv();
        }

        Ok(x)
    }
}

/// Factorise and solve in one go
pub fn lu_solve<T: ComplexField>(a: &Array2<T>, b: &Array1<T>) -> Result<Array1<T>, LuError> {
    LuFactorization::new(a)?.solve(b)
}
