//! Interpolation and restriction operators
//!
//! Every prolongation has the shape `P = [-W; I]` up to the ordering of the rows: coarse
//! rows carry one unit entry in their own coarse column, fine rows carry the weights of a
//! narrow operator `W ≈ A_FF⁻¹ A_FC`. The strategies differ only in how `W` is formed.
//! Restrictions run the same machinery on `Aᵀ` and transpose the result, so `R` is stored
//! as an `n_C × n` matrix applied with a plain matvec.

use crate::approx_inverse::approximate_inverse;
use crate::block::block_diag_matrix;
use crate::classical::{ClassicalInterp, classical_interpolation, strength_of_connection};
use crate::comm::CommError;
use crate::dense::scalar_inverse;
use crate::partition::{F_PT, Partition, coarse_range, is_coarse};
use crate::sparse::{CsrBuilder, CsrMatrix, ParCsrMatrix, ParCsrParts};
use crate::subblock::{build_afc, build_aff, get_acf_cpr};
use crate::traits::ComplexField;
use num_traits::{Float, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prolongation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpType {
    /// `W` taken from a precomputed operator, or zero (plain injection) without one
    Injection,
    /// `W = A_FC`
    Jacobi,
    /// `W = D_FF⁻¹ A_FC`
    #[default]
    DiagonalScaled,
    /// `W = M A_FC` with `M` a sparse approximate inverse of `A_FF`
    ApproximateInverse,
    /// Classical extended interpolation
    Extended,
    /// `W = B_FF⁻¹ A_FC` with `B_FF` the block diagonal of `A_FF`
    BlockJacobi,
    /// Classical standard interpolation
    Classical,
}

impl InterpType {
    /// Map a numeric interpolation code; unknown codes fall back to classical
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Injection,
            1 => Self::Jacobi,
            2 => Self::DiagonalScaled,
            4 => Self::ApproximateInverse,
            5..=7 => Self::Extended,
            12 => Self::BlockJacobi,
            _ => Self::Classical,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Injection => 0,
            Self::Jacobi => 1,
            Self::DiagonalScaled => 2,
            Self::Classical => 3,
            Self::ApproximateInverse => 4,
            Self::Extended => 5,
            Self::BlockJacobi => 12,
        }
    }
}

/// Restriction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestrictType {
    /// `R = [0 I]`
    #[default]
    Injection,
    /// `Wᵀ = (Aᵀ)_FC`
    Jacobi,
    /// `Wᵀ = D_FF⁻¹ (Aᵀ)_FC`
    DiagonalScaled,
    /// Approximate inverse of `(Aᵀ)_FF`
    ApproximateInverse,
    /// Block-diagonal inverse of `(Aᵀ)_FF`
    BlockJacobi,
    /// Each coarse row only couples to the fine unknowns of its own block
    Cpr,
    /// Classical interpolation on `Aᵀ`
    Classical,
}

impl RestrictType {
    /// Map a numeric restriction code; unknown codes fall back to classical
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Injection,
            1 => Self::Jacobi,
            2 => Self::DiagonalScaled,
            3 => Self::ApproximateInverse,
            12 => Self::BlockJacobi,
            13 => Self::Cpr,
            _ => Self::Classical,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Injection => 0,
            Self::Jacobi => 1,
            Self::DiagonalScaled => 2,
            Self::ApproximateInverse => 3,
            Self::Classical => 5,
            Self::BlockJacobi => 12,
            Self::Cpr => 13,
        }
    }
}

/// Knobs shared by the interpolation and restriction builders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpOptions {
    /// Block size of block-Jacobi and CPR operators
    pub block_size: usize,
    /// Relative drop threshold of truncation (0 disables)
    pub trunc_factor: f64,
    /// Maximum entries per fine row (0 disables)
    pub max_elmts: usize,
    /// Strength threshold of the classical strategies
    pub strong_threshold: f64,
    /// Jacobi sweeps applied to Jacobi and diagonal-scaled operators
    pub num_sweeps: usize,
}

impl Default for InterpOptions {
    fn default() -> Self {
        Self {
            block_size: 1,
            trunc_factor: 0.0,
            max_elmts: 0,
            strong_threshold: 0.25,
            num_sweeps: 0,
        }
    }
}

/// Collective: `P = [0; I]`
pub fn injection<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let comm = Arc::clone(a.comm());
    let coarse = coarse_range(comm.as_ref(), cf_marker)?;
    let mut next = coarse.range.start;
    let rows = cf_marker
        .iter()
        .map(|&m| {
            if is_coarse(m) {
                next += 1;
                vec![(next - 1, T::one())]
            } else {
                Vec::new()
            }
        })
        .collect();
    let col_part = Partition::from_local_count(comm.as_ref(), coarse.local_count)?;
    ParCsrMatrix::from_global_rows(comm, a.row_partition().clone(), col_part, rows)
}

/// Collective: `P = [-W; I]` from an `n_F × n_C` operator `W`.
///
/// `W` is consumed: its blocks and column map move into `P` without copying. Its column
/// partition must be the coarse partition of `cf_marker`.
pub fn build_p_from_wp<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    wp: ParCsrMatrix<T>,
    cf_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let n = a.local_rows();
    let ParCsrParts {
        comm,
        col_part,
        diag: w_diag,
        offd: w_offd,
        col_map_offd,
        ..
    } = wp.into_parts();

    let mut diag = CsrBuilder::with_capacity(n, w_diag.num_cols, w_diag.nnz() + n);
    let mut offd = CsrBuilder::with_capacity(n, col_map_offd.len(), w_offd.nnz());
    let (mut f, mut c) = (0, 0);
    for &m in cf_marker {
        if is_coarse(m) {
            diag.add_row_entries([(c, T::one())]);
            offd.add_row_entries(std::iter::empty());
            c += 1;
        } else {
            diag.add_row_entries(w_diag.row_entries(f).map(|(j, v)| (j, -v)));
            offd.add_row_entries(w_offd.row_entries(f).map(|(k, v)| (k, -v)));
            f += 1;
        }
    }
    debug_assert_eq!(f, w_diag.num_rows);
    debug_assert_eq!(c, w_diag.num_cols);

    ParCsrMatrix::from_parts(ParCsrParts {
        comm,
        row_part: a.row_partition().clone(),
        col_part,
        diag: diag.finish(),
        offd: offd.finish(),
        col_map_offd,
    })
}

/// Scale local row `i` by `scale[i]`
fn scale_rows<T: ComplexField>(
    m: ParCsrMatrix<T>,
    scale: &[T],
) -> Result<ParCsrMatrix<T>, CommError> {
    let mut parts = m.into_parts();
    for block in [&mut parts.diag, &mut parts.offd] {
        scale_csr_rows(block, scale);
    }
    ParCsrMatrix::from_parts(parts)
}

fn scale_csr_rows<T: ComplexField>(m: &mut CsrMatrix<T>, scale: &[T]) {
    for (i, &s) in scale.iter().enumerate().take(m.num_rows) {
        let range = m.row_range(i);
        for v in &mut m.values[range] {
            *v *= s;
        }
    }
}

/// How the narrow operator `W` is formed from `A_FC`
#[derive(Debug, Clone, Copy)]
enum NarrowOperator {
    Unscaled,
    DiagonalScaled,
    ApproximateInverse,
    BlockJacobi(usize),
}

/// Collective: `W` for the `A_FC`-based strategies
fn build_wp<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    kind: NarrowOperator,
) -> Result<ParCsrMatrix<T>, CommError> {
    let a_fc = build_afc(a, cf_marker)?;
    match kind {
        NarrowOperator::Unscaled => Ok(a_fc),
        NarrowOperator::DiagonalScaled => {
            let diag = a.local_diagonal();
            let inv: Vec<T> = cf_marker
                .iter()
                .zip(diag.iter())
                .filter(|(m, _)| !is_coarse(**m))
                .map(|(_, &d)| scalar_inverse(d))
                .collect();
            scale_rows(a_fc, &inv)
        }
        NarrowOperator::ApproximateInverse => {
            let m = approximate_inverse(&build_aff(a, cf_marker)?)?;
            m.matmul(&a_fc)
        }
        NarrowOperator::BlockJacobi(block_size) => {
            let inv = block_diag_matrix(a, block_size, Some((cf_marker, F_PT)), true)?;
            inv.matmul(&a_fc)
        }
    }
}

/// Collective: `W = blockdiag(A_FF)⁻¹ A_FC` with blocks of `block_size` fine rows
pub fn block_jacobi_weights<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    block_size: usize,
) -> Result<ParCsrMatrix<T>, CommError> {
    build_wp(a, cf_marker, NarrowOperator::BlockJacobi(block_size))
}

/// Collective: prolongation for the splitting `cf_marker`.
///
/// `wp` is only consulted by [`InterpType::Injection`]: when present it becomes the
/// interpolation weights, otherwise the fine rows stay empty.
pub fn build_interp<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    kind: InterpType,
    options: &InterpOptions,
    wp: Option<ParCsrMatrix<T>>,
) -> Result<ParCsrMatrix<T>, CommError> {
    let p = match kind {
        InterpType::Injection => match wp {
            Some(wp) => build_p_from_wp(a, wp, cf_marker)?,
            None => injection(a, cf_marker)?,
        },
        InterpType::Jacobi => {
            build_p_from_wp(a, build_wp(a, cf_marker, NarrowOperator::Unscaled)?, cf_marker)?
        }
        InterpType::DiagonalScaled => {
            let wp = build_wp(a, cf_marker, NarrowOperator::DiagonalScaled)?;
            build_p_from_wp(a, wp, cf_marker)?
        }
        InterpType::ApproximateInverse => {
            let wp = build_wp(a, cf_marker, NarrowOperator::ApproximateInverse)?;
            build_p_from_wp(a, wp, cf_marker)?
        }
        InterpType::BlockJacobi => {
            let wp = build_wp(a, cf_marker, NarrowOperator::BlockJacobi(options.block_size))?;
            build_p_from_wp(a, wp, cf_marker)?
        }
        InterpType::Extended | InterpType::Classical => {
            let strength = strength_of_connection(a, options.strong_threshold);
            let formula = if kind == InterpType::Extended {
                ClassicalInterp::Extended
            } else {
                ClassicalInterp::Standard
            };
            classical_interpolation(a, &strength, cf_marker, formula)?
        }
    };
    let p = match kind {
        InterpType::Jacobi | InterpType::DiagonalScaled => {
            (0..options.num_sweeps).try_fold(p, |p, _| jacobi_interp_sweep(a, p, cf_marker))?
        }
        _ => p,
    };
    truncate_interp(p, cf_marker, options.trunc_factor, options.max_elmts)
}

/// Collective: one Jacobi sweep on the fine rows of `A P = 0`, i.e.
/// `P_F ← P_F − D_FF⁻¹ (A P)_F`. Coarse rows are kept and exact zeros dropped.
pub fn jacobi_interp_sweep<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    p: ParCsrMatrix<T>,
    cf_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let ap = a.matmul(&p)?;
    let diagonal = a.local_diagonal();
    let tiny = T::tiny();
    let rows = (0..p.local_rows())
        .map(|i| {
            let mut row = p.global_row(i);
            if !is_coarse(cf_marker[i]) && diagonal[i].norm() > tiny {
                let scale = -diagonal[i].inv();
                row.extend(ap.global_row(i).into_iter().map(|(g, v)| (g, scale * v)));
            }
            row
        })
        .collect();
    ParCsrMatrix::from_global_rows(
        Arc::clone(p.comm()),
        p.row_partition().clone(),
        p.col_partition().clone(),
        rows,
    )?
    .filter_entries(|_, _, v| v.norm() > T::Real::zero())
}

/// Collective: restriction for the splitting `cf_marker`, stored as `n_C × n`
pub fn build_restriction<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    kind: RestrictType,
    options: &InterpOptions,
) -> Result<ParCsrMatrix<T>, CommError> {
    let same_as_interp = match kind {
        RestrictType::Injection => return injection(a, cf_marker)?.transpose(),
        RestrictType::Cpr => None,
        RestrictType::Jacobi => Some(InterpType::Jacobi),
        RestrictType::DiagonalScaled => Some(InterpType::DiagonalScaled),
        RestrictType::ApproximateInverse => Some(InterpType::ApproximateInverse),
        RestrictType::BlockJacobi => Some(InterpType::BlockJacobi),
        RestrictType::Classical => Some(InterpType::Classical),
    };

    let at = a.transpose()?;
    let rt = match same_as_interp {
        Some(interp) => build_interp(&at, cf_marker, interp, options, None)?,
        None => cpr_restriction_transposed(a, &at, cf_marker, options.block_size)?,
    };
    rt.transpose()
}

/// `Rᵀ = [-Wrᵀ; I]` with `Wrᵀ = B_FF(Aᵀ)⁻¹ · (A_CF truncated to own blocks)ᵀ`
fn cpr_restriction_transposed<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    at: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    block_size: usize,
) -> Result<ParCsrMatrix<T>, CommError> {
    let blk_a_cf_t = get_acf_cpr(a, block_size, cf_marker)?.transpose()?;
    let inv = block_diag_matrix(at, block_size, Some((cf_marker, F_PT)), true)?;
    let wr_t = inv.matmul(&blk_a_cf_t)?;
    build_p_from_wp(at, wr_t, cf_marker)
}

/// Collective: drop small interpolation weights and cap the entries per fine row.
///
/// Entries below `trunc_factor` times the row maximum are dropped, then only the
/// `max_elmts` largest are kept. The survivors are rescaled to the original row sum.
/// Coarse rows are left untouched.
pub fn truncate_interp<T: ComplexField>(
    p: ParCsrMatrix<T>,
    cf_marker: &[i32],
    trunc_factor: f64,
    max_elmts: usize,
) -> Result<ParCsrMatrix<T>, CommError> {
    if trunc_factor <= 0.0 && max_elmts == 0 {
        return Ok(p);
    }
    let rows = (0..p.local_rows())
        .map(|i| {
            let row = p.global_row(i);
            if is_coarse(cf_marker[i]) {
                row
            } else {
                truncate_row(row, T::real(trunc_factor), max_elmts)
            }
        })
        .collect();
    ParCsrMatrix::from_global_rows(
        Arc::clone(p.comm()),
        p.row_partition().clone(),
        p.col_partition().clone(),
        rows,
    )
}

fn truncate_row<T: ComplexField>(
    mut row: Vec<(usize, T)>,
    trunc_factor: T::Real,
    max_elmts: usize,
) -> Vec<(usize, T)> {
    let original_len = row.len();
    let original_sum = row.iter().fold(T::zero(), |acc, &(_, v)| acc + v);

    if trunc_factor > T::Real::zero() {
        let max = row
            .iter()
            .fold(T::Real::zero(), |acc, (_, v)| acc.max(v.norm()));
        let threshold = trunc_factor * max;
        row.retain(|(_, v)| v.norm() >= threshold);
    }
    if max_elmts > 0 && row.len() > max_elmts {
        row.sort_by(|x, y| {
            y.1.norm()
                .partial_cmp(&x.1.norm())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        row.truncate(max_elmts);
        row.sort_by_key(|&(g, _)| g);
    }

    if row.len() < original_len {
        let new_sum = row.iter().fold(T::zero(), |acc, &(_, v)| acc + v);
        if new_sum.norm() > T::tiny() {
            let scale = original_sum * new_sum.inv();
            for (_, v) in &mut row {
                *v *= scale;
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};
    use crate::partition::C_PT;
    use crate::testing::{assert_dense_eq, laplacian_1d, nonsymmetric_test_matrix};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn alternating(range: std::ops::Range<usize>) -> Vec<i32> {
        range.map(|g| if g % 2 == 1 { C_PT } else { F_PT }).collect()
    }

    const ALL_INTERP: [InterpType; 7] = [
        InterpType::Injection,
        InterpType::Jacobi,
        InterpType::DiagonalScaled,
        InterpType::ApproximateInverse,
        InterpType::Extended,
        InterpType::BlockJacobi,
        InterpType::Classical,
    ];

    #[test]
    fn test_coarse_rows_carry_one_unit_entry() {
        let n = 10;
        let a = nonsymmetric_test_matrix(n);
        for kind in ALL_INTERP {
            let results = ThreadComm::run(2, |comm| {
                let part = Partition::uniform(n, comm.size());
                let range = part.local_range(comm.rank());
                let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
                let cf = alternating(range);
                let options = InterpOptions {
                    block_size: 2,
                    ..Default::default()
                };
                build_interp(&m, &cf, kind, &options, None)
                    .unwrap()
                    .to_global_dense()
                    .unwrap()
            });
            for p in results {
                assert_eq!(p.dim(), (n, n / 2));
                for k in 0..n / 2 {
                    let row = p.row(2 * k + 1);
                    assert_eq!(row.iter().filter(|v| **v != 0.0).count(), 1, "{kind:?}");
                    assert_eq!(row[k], 1.0);
                }
            }
        }
    }

    #[test]
    fn test_diagonal_scaled_weights() {
        let n = 8;
        let a = nonsymmetric_test_matrix(n);
        let d = a.to_dense();
        let results = ThreadComm::run(2, |comm| {
            let part = Partition::uniform(n, comm.size());
            let range = part.local_range(comm.rank());
            let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
            let cf = alternating(range);
            let scaled = build_interp(&m, &cf, InterpType::DiagonalScaled, &Default::default(), None)
                .unwrap()
                .to_global_dense()
                .unwrap();
            let jacobi = build_interp(&m, &cf, InterpType::Jacobi, &Default::default(), None)
                .unwrap()
                .to_global_dense()
                .unwrap();
            (scaled, jacobi)
        });
        for (scaled, jacobi) in results {
            for f in (0..n).step_by(2) {
                for c in 0..n / 2 {
                    let a_fc = d[[f, 2 * c + 1]];
                    assert_relative_eq!(jacobi[[f, c]], -a_fc);
                    assert_relative_eq!(scaled[[f, c]], -a_fc / d[[f, f]], epsilon = 1e-15);
                }
            }
        }
    }

    #[test]
    fn test_scalar_block_jacobi_matches_diagonal_scaled() {
        let n = 9;
        let a = nonsymmetric_test_matrix(n);
        let results = ThreadComm::run(3, |comm| {
            let part = Partition::uniform(n, comm.size());
            let range = part.local_range(comm.rank());
            let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
            let cf = alternating(range);
            let options = InterpOptions::default();
            let block = build_interp(&m, &cf, InterpType::BlockJacobi, &options, None).unwrap();
            let scaled = build_interp(&m, &cf, InterpType::DiagonalScaled, &options, None).unwrap();
            (
                block.to_global_dense().unwrap(),
                scaled.to_global_dense().unwrap(),
            )
        });
        for (block, scaled) in results {
            assert_dense_eq(&block, &scaled, 1e-14);
        }
    }

    #[test]
    fn test_jacobi_sweep_reaches_harmonic_weights() {
        let n = 10;
        let a = laplacian_1d(n);
        let results = ThreadComm::run(2, |comm| {
            let part = Partition::uniform(n, comm.size());
            let range = part.local_range(comm.rank());
            let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
            let cf = alternating(range);
            let options = InterpOptions {
                num_sweeps: 1,
                ..Default::default()
            };
            let swept = build_interp(&m, &cf, InterpType::Jacobi, &options, None).unwrap();
            let scaled = build_interp(&m, &cf, InterpType::DiagonalScaled, &options, None).unwrap();
            let plain =
                build_interp(&m, &cf, InterpType::DiagonalScaled, &Default::default(), None)
                    .unwrap();
            (
                swept.to_global_dense().unwrap(),
                scaled.to_global_dense().unwrap(),
                plain.to_global_dense().unwrap(),
            )
        });
        for (swept, scaled, plain) in results {
            assert_dense_eq(&swept, &plain, 1e-15);
            assert_dense_eq(&scaled, &plain, 1e-15);
        }
    }

    #[test]
    fn test_injection_uses_precomputed_weights() {
        let a = laplacian_1d(4);
        let part = Partition::uniform(4, 1);
        let comm = SerialComm::shared();
        let m = ParCsrMatrix::from_serial(Arc::clone(&comm), &a, part.clone(), part).unwrap();
        let cf = [F_PT, C_PT, F_PT, C_PT];

        let wp = ParCsrMatrix::from_global_rows(
            comm,
            Partition::uniform(2, 1),
            Partition::uniform(2, 1),
            vec![vec![(0, 0.25)], vec![(0, 0.5), (1, 0.5)]],
        )
        .unwrap();
        let p = build_interp(&m, &cf, InterpType::Injection, &Default::default(), Some(wp))
            .unwrap()
            .to_global_dense()
            .unwrap();
        let expected = ndarray::array![[-0.25, 0.0], [1.0, 0.0], [-0.5, -0.5], [0.0, 1.0]];
        assert_dense_eq(&p, &expected, 0.0);

        let plain = build_interp(&m, &cf, InterpType::Injection, &Default::default(), None)
            .unwrap()
            .to_global_dense()
            .unwrap();
        assert_eq!(plain.sum(), 2.0);
    }

    #[test]
    fn test_truncation_rescales_to_row_sum() {
        let row = vec![(0, 0.5_f64), (1, 0.3), (2, 0.05)];
        let kept = truncate_row(row.clone(), 0.2, 0);
        assert_eq!(kept.len(), 2);
        assert_relative_eq!(kept[0].1, 0.5 * 0.85 / 0.8, epsilon = 1e-15);
        assert_relative_eq!(kept[1].1, 0.3 * 0.85 / 0.8, epsilon = 1e-15);

        let capped = truncate_row(row, 0.0, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].0, 0);
        assert_relative_eq!(capped[0].1, 0.85, epsilon = 1e-15);
    }

    #[test]
    fn test_restriction_shapes_and_symmetry() {
        let n = 8;
        let a = laplacian_1d(n);
        let results = ThreadComm::run(2, |comm| {
            let part = Partition::uniform(n, comm.size());
            let range = part.local_range(comm.rank());
            let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
            let cf = alternating(range);
            let options = InterpOptions::default();
            let r_inj = build_restriction(&m, &cf, RestrictType::Injection, &options).unwrap();
            let r_diag = build_restriction(&m, &cf, RestrictType::DiagonalScaled, &options).unwrap();
            let r_cpr = build_restriction(&m, &cf, RestrictType::Cpr, &options).unwrap();
            let p = build_interp(&m, &cf, InterpType::DiagonalScaled, &options, None).unwrap();
            (
                r_inj.to_global_dense().unwrap(),
                r_diag.to_global_dense().unwrap(),
                r_cpr.to_global_dense().unwrap(),
                p.to_global_dense().unwrap(),
            )
        });
        for (r_inj, r_diag, r_cpr, p) in results {
            let expected_inj = Array2::from_shape_fn((4, 8), |(c, i)| if i == 2 * c + 1 { 1.0 } else { 0.0 });
            assert_dense_eq(&r_inj, &expected_inj, 0.0);
            // Symmetric A: restriction on Aᵀ is the transpose of the prolongation
            assert_dense_eq(&r_diag, &p.t().to_owned(), 1e-15);
            // CPR with unit blocks: coarse row k only sees fine point 2k
            assert_eq!(r_cpr.dim(), (4, 8));
            for c in 0..4 {
                assert_eq!(r_cpr[[c, 2 * c + 1]], 1.0);
                assert_relative_eq!(r_cpr[[c, 2 * c]], 0.5);
                if c + 1 < 4 {
                    assert_eq!(r_cpr[[c, 2 * c + 2]], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(InterpType::from_code(6), InterpType::Extended);
        assert_eq!(InterpType::from_code(99), InterpType::Classical);
        assert_eq!(InterpType::from_code(12).code(), 12);
        assert_eq!(RestrictType::from_code(13), RestrictType::Cpr);
        assert_eq!(RestrictType::from_code(2).code(), 2);
    }
}
