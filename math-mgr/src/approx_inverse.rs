//! Sparse approximate inverse
//!
//! A column-wise minimal-residual pass gives an initial guess `M₀ ≈ A⁻¹`, which
//! Newton–Schulz–Hotelling iterations refine as `M ← M + M (I − A M)`. After every update
//! small entries are dropped relative to the row maximum and each row is capped to a
//! fixed number of non-zeros, so the inverse stays as sparse as `A`. Only the diagonal
//! block of a distributed matrix is inverted; the result has no off-process columns.

use crate::comm::CommError;
use crate::parallel::parallel_map_indexed;
use crate::sparse::{CsrBuilder, CsrMatrix, ParCsrMatrix};
use crate::traits::ComplexField;
use num_traits::{Float, Zero};
use std::sync::Arc;

/// Iteration and dropping parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproxInverseParams {
    /// Newton–Schulz–Hotelling iterations
    pub nsh_max_iter: usize,
    /// Non-zeros kept per row after each NSH update
    pub nsh_max_row_nnz: usize,
    /// Stop NSH once `‖I − A M‖_F` falls below this
    pub nsh_tol: f64,
    /// Minimal-residual iterations per column
    pub mr_max_iter: usize,
    /// Non-zeros kept per column during the MR pass
    pub mr_max_row_nnz: usize,
    /// Stop MR for a column once its residual falls below this
    pub mr_tol: f64,
    /// Relative drop tolerances for the MR and NSH stages
    pub droptol: [f64; 2],
}

impl Default for ApproxInverseParams {
    fn default() -> Self {
        Self {
            nsh_max_iter: 2,
            nsh_max_row_nnz: 2,
            nsh_tol: 1e-3,
            mr_max_iter: 1,
            mr_max_row_nnz: 2,
            mr_tol: 1e-3,
            droptol: [1e-2, 1e-2],
        }
    }
}

/// Collective: approximate inverse of a square distributed matrix with the fixed defaults
pub fn approximate_inverse<T: ComplexField>(
    a: &ParCsrMatrix<T>,
) -> Result<ParCsrMatrix<T>, CommError> {
    approximate_inverse_with(a, &ApproxInverseParams::default())
}

/// Collective: approximate inverse with explicit parameters
pub fn approximate_inverse_with<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    params: &ApproxInverseParams,
) -> Result<ParCsrMatrix<T>, CommError> {
    let m = approximate_inverse_local(a.diag(), params);
    ParCsrMatrix::from_local_diag(Arc::clone(a.comm()), a.row_partition().clone(), m)
}

/// Approximate inverse of a square serial matrix
pub fn approximate_inverse_local<T: ComplexField>(
    a: &CsrMatrix<T>,
    params: &ApproxInverseParams,
) -> CsrMatrix<T> {
    let n = a.num_rows;
    if n == 0 {
        return CsrMatrix::new(0, 0);
    }

    // Rows of Aᵀ are the columns of A
    let at = a.transpose();
    let columns = parallel_map_indexed(n, |j| mr_column(&at, j, params));
    let mut m = rows_to_csr(n, columns).transpose();

    let nsh_tol = T::real(params.nsh_tol);
    let droptol = T::real(params.droptol[1]);
    for iter in 0..params.nsh_max_iter {
        let residual = identity_minus(&a.matmul(&m));
        let norm = frobenius_norm(&residual);
        log::trace!(
            "NSH iteration {iter}: |I - AM|_F = {:.3e}",
            T::real_to_f64(norm)
        );
        if norm < nsh_tol {
            break;
        }

        let correction = m.matmul(&residual);
        let rows = (0..n)
            .map(|i| {
                let summed = merge(m.row_entries(i).chain(correction.row_entries(i)).collect());
                drop_small(summed, i, droptol, params.nsh_max_row_nnz)
            })
            .collect();
        m = rows_to_csr(n, rows);
    }

    m
}

/// Minimal-residual approximation of column `j` of `A⁻¹`, as sparse `(row, value)` pairs
fn mr_column<T: ComplexField>(
    at: &CsrMatrix<T>,
    j: usize,
    params: &ApproxInverseParams,
) -> Vec<(usize, T)> {
    let tiny = T::tiny();
    let mr_tol = T::real(params.mr_tol);
    let droptol = T::real(params.droptol[0]);

    let mut m: Vec<(usize, T)> = Vec::new();
    let mut r: Vec<(usize, T)> = vec![(j, T::one())];

    for _ in 0..params.mr_max_iter {
        let q = combine_rows(at, &r);
        let qq = q
            .iter()
            .fold(T::Real::zero(), |acc, (_, v)| acc + v.norm_sqr());
        if qq <= tiny {
            break;
        }
        let qr = sparse_dot(&q, &r);
        let alpha = qr * T::from_real(qq.recip());

        let updated = merge(
            m.iter()
                .copied()
                .chain(r.iter().map(|&(i, v)| (i, alpha * v)))
                .collect(),
        );
        m = drop_small(updated, j, droptol, params.mr_max_row_nnz);

        let am = combine_rows(at, &m);
        r = merge(
            std::iter::once((j, T::one()))
                .chain(am.into_iter().map(|(i, v)| (i, -v)))
                .collect(),
        );
        let rnorm = r
            .iter()
            .fold(T::Real::zero(), |acc, (_, v)| acc + v.norm_sqr())
            .sqrt();
        if rnorm < mr_tol {
            break;
        }
    }

    m
}

/// `Σ_k x_k · rows[k]`
fn combine_rows<T: ComplexField>(rows: &CsrMatrix<T>, x: &[(usize, T)]) -> Vec<(usize, T)> {
    merge(
        x.iter()
            .flat_map(|&(k, xk)| rows.row_entries(k).map(move |(i, v)| (i, xk * v)))
            .collect(),
    )
}

/// `Σ conj(a_i) b_i` over two sorted sparse vectors
fn sparse_dot<T: ComplexField>(a: &[(usize, T)], b: &[(usize, T)]) -> T {
    let (mut ia, mut ib) = (0, 0);
    let mut acc = T::zero();
    while ia < a.len() && ib < b.len() {
        match a[ia].0.cmp(&b[ib].0) {
            std::cmp::Ordering::Less => ia += 1,
            std::cmp::Ordering::Greater => ib += 1,
            std::cmp::Ordering::Equal => {
                acc += a[ia].1.conj() * b[ib].1;
                ia += 1;
                ib += 1;
            }
        }
    }
    acc
}

/// Sort by index and sum duplicates
fn merge<T: ComplexField>(mut entries: Vec<(usize, T)>) -> Vec<(usize, T)> {
    entries.sort_by_key(|&(i, _)| i);
    let mut merged: Vec<(usize, T)> = Vec::with_capacity(entries.len());
    for (i, v) in entries {
        match merged.last_mut() {
            Some((last, acc)) if *last == i => *acc += v,
            _ => merged.push((i, v)),
        }
    }
    merged
}

/// Drop entries below `droptol` times the largest magnitude, then keep at most `max_nnz`
/// of the largest. The entry at `keep` always survives.
fn drop_small<T: ComplexField>(
    mut entries: Vec<(usize, T)>,
    keep: usize,
    droptol: T::Real,
    max_nnz: usize,
) -> Vec<(usize, T)> {
    let max = entries
        .iter()
        .fold(T::Real::zero(), |acc, (_, v)| acc.max(v.norm()));
    let threshold = droptol * max;
    entries.retain(|&(i, v)| i == keep || v.norm() >= threshold);

    if entries.len() > max_nnz.max(1) {
        entries.sort_by(|x, y| {
            (x.0 != keep).cmp(&(y.0 != keep)).then_with(|| {
                y.1.norm()
                    .partial_cmp(&x.1.norm())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        entries.truncate(max_nnz.max(1));
        entries.sort_by_key(|&(i, _)| i);
    }
    entries
}

fn identity_minus<T: ComplexField>(a: &CsrMatrix<T>) -> CsrMatrix<T> {
    let rows = (0..a.num_rows)
        .map(|i| {
            merge(
                std::iter::once((i, T::one()))
                    .chain(a.row_entries(i).map(|(j, v)| (j, -v)))
                    .collect(),
            )
        })
        .collect();
    rows_to_csr(a.num_cols, rows)
}

fn frobenius_norm<T: ComplexField>(a: &CsrMatrix<T>) -> T::Real {
    a.values
        .iter()
        .fold(T::Real::zero(), |acc, v| acc + v.norm_sqr())
        .sqrt()
}

fn rows_to_csr<T: ComplexField>(num_cols: usize, rows: Vec<Vec<(usize, T)>>) -> CsrMatrix<T> {
    let nnz = rows.iter().map(Vec::len).sum();
    let mut builder = CsrBuilder::with_capacity(rows.len(), num_cols, nnz);
    for row in rows {
        builder.add_row_entries(row);
    }
    builder.finish()
}
