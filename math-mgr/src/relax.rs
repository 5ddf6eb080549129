//! Relaxation
//!
//! - [`BlockRelax`]: block-Jacobi / block-Gauss-Seidel with pre-inverted diagonal blocks
//! - [`relax_points`]: scalar Jacobi, l1-Jacobi and hybrid Gauss-Seidel, optionally
//!   restricted to the rows of one point class
//!
//! Off-process values always come from the halo exchanged before the sweep, so
//! Gauss-Seidel is only Gauss-Seidel within a rank (Jacobi across ranks).

use crate::block::{BlockDiagonal, extract_block_diag};
use crate::comm::CommError;
use crate::dense::block_matvec_add;
use crate::parallel::parallel_map_indexed;
use crate::partition::is_coarse;
use crate::sparse::ParCsrMatrix;
use crate::traits::ComplexField;
use ndarray::Array1;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Sweep order of the block smoother
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockRelaxMethod {
    /// Every block sees the values from before the sweep
    #[default]
    Jacobi,
    /// Blocks see the already updated values of earlier blocks on this rank
    GaussSeidel,
}

/// Scalar smoother
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelaxType {
    /// Weighted Jacobi
    #[default]
    Jacobi,
    /// Jacobi scaled by the l1 norm of each row
    L1Jacobi,
    /// Forward Gauss-Seidel within a rank, Jacobi across ranks
    HybridGaussSeidel,
}

/// Block smoother holding the inverted diagonal blocks of its operator
#[derive(Debug, Clone)]
pub struct BlockRelax<T: ComplexField> {
    inverse: BlockDiagonal<T>,
}

impl<T: ComplexField> BlockRelax<T> {
    /// Extract and invert the `block_size` diagonal blocks of `a`
    pub fn setup(a: &ParCsrMatrix<T>, block_size: usize) -> Self {
        Self {
            inverse: extract_block_diag(a, block_size, None, true),
        }
    }

    pub fn block_size(&self) -> usize {
        self.inverse.block_size()
    }

    /// The inverted blocks
    pub fn inverse(&self) -> &BlockDiagonal<T> {
        &self.inverse
    }

    /// Collective: one sweep `u_b += D_b⁻¹ (f − A u)_b` over all blocks
    pub fn apply(
        &self,
        a: &ParCsrMatrix<T>,
        f: &Array1<T>,
        u: &mut Array1<T>,
        method: BlockRelaxMethod,
    ) -> Result<(), CommError> {
        let halo = a.halo_vector(u)?;
        let num_blocks = self.inverse.num_blocks();

        match method {
            BlockRelaxMethod::Jacobi => {
                let u_old = u.clone();
                let deltas =
                    parallel_map_indexed(num_blocks, |b| self.block_update(a, f, &u_old, &halo, b));
                for (b, delta) in deltas.into_iter().enumerate() {
                    for (i, d) in self.inverse.block_rows(b).zip(delta) {
                        u[i] += d;
                    }
                }
            }
            BlockRelaxMethod::GaussSeidel => {
                for b in 0..num_blocks {
                    let delta = self.block_update(a, f, u, &halo, b);
                    for (i, d) in self.inverse.block_rows(b).zip(delta) {
                        u[i] += d;
                    }
                }
            }
        }
        Ok(())
    }

    fn block_update(
        &self,
        a: &ParCsrMatrix<T>,
        f: &Array1<T>,
        u: &Array1<T>,
        halo: &Array1<T>,
        b: usize,
    ) -> Vec<T> {
        let rows = self.inverse.block_rows(b);
        let n = rows.len();
        let residual: Vec<T> = rows
            .clone()
            .map(|i| row_residual(a, f, u, halo, i))
            .collect();
        let mut delta = vec![T::zero(); n];
        block_matvec_add(self.inverse.block(b), n, &residual, &mut delta);
        delta
    }
}

#[inline]
fn row_residual<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    f: &Array1<T>,
    u: &Array1<T>,
    halo: &Array1<T>,
    i: usize,
) -> T {
    let mut r = f[i];
    for (j, v) in a.diag().row_entries(i) {
        r -= v * u[j];
    }
    for (k, v) in a.offd().row_entries(i) {
        r -= v * halo[k];
    }
    r
}

/// `Σ_j |a_ij|` over the whole row, diag and offd parts
pub fn l1_norms<T: ComplexField>(a: &ParCsrMatrix<T>) -> Array1<T::Real> {
    Array1::from_iter((0..a.local_rows()).map(|i| {
        a.diag()
            .row_entries(i)
            .chain(a.offd().row_entries(i))
            .fold(T::Real::zero(), |acc, (_, v)| acc + v.norm())
    }))
}

/// Collective: one sweep of a scalar smoother on the rows selected by `points`.
///
/// `points` is `(cf_marker, point_type)`; `None` relaxes every row. Rows with a vanishing
/// diagonal (or l1 norm) are left untouched.
pub fn relax_points<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    f: &Array1<T>,
    u: &mut Array1<T>,
    points: Option<(&[i32], i32)>,
    relax_type: RelaxType,
    weight: f64,
) -> Result<(), CommError> {
    let n = a.local_rows();
    let halo = a.halo_vector(u)?;
    let w = T::from_f64(weight);
    let tiny = T::tiny();
    let selected = |i: usize| match points {
        None => true,
        Some((marker, pt)) => is_coarse(marker[i]) == is_coarse(pt),
    };
    let diagonal = a.local_diagonal();

    match relax_type {
        RelaxType::Jacobi | RelaxType::L1Jacobi => {
            let scale: Array1<T> = match relax_type {
                RelaxType::L1Jacobi => l1_norms(a).mapv(T::from_real),
                _ => diagonal,
            };
            let u_old = u.clone();
            let updates = parallel_map_indexed(n, |i| {
                if !selected(i) || scale[i].norm() <= tiny {
                    return T::zero();
                }
                w * row_residual(a, f, &u_old, &halo, i) * scale[i].inv()
            });
            for (ui, d) in u.iter_mut().zip(updates) {
                *ui += d;
            }
        }
        RelaxType::HybridGaussSeidel => {
            for i in (0..n).filter(|&i| selected(i)) {
                if diagonal[i].norm() <= tiny {
                    continue;
                }
                let r = row_residual(a, f, u, &halo, i);
                u[i] += w * r * diagonal[i].inv();
            }
        }
    }
    Ok(())
}
