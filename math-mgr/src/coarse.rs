//! Coarse-grid operators
//!
//! The next level's matrix is either the Galerkin product `R A P` or a non-Galerkin
//! approximation of the Schur complement `A_CC - A_CF A_FF⁻¹ A_FC`, where `A_FF⁻¹` is
//! replaced by something cheap (a block-diagonal inverse, possibly combined with a
//! CPR-truncated `A_CF`, or a sparse approximate inverse).

use crate::approx_inverse::approximate_inverse;
use crate::block::block_diag_matrix;
use crate::comm::CommError;
use crate::partition::F_PT;
use crate::sparse::ParCsrMatrix;
use crate::subblock::{get_acf_cpr, split_blocks};
use crate::traits::ComplexField;
use num_traits::{Float, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Approximation of `A_FF⁻¹` in the Schur complement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonGalerkinMethod {
    /// Block-diagonal inverse of `A_FF` with the system block size
    BlockDiagonal,
    /// Scalar diagonal inverse of `A_FF`, with `A_CF` truncated to each coarse row's block
    CprScalar,
    /// Block-diagonal inverse of `A_FF`, with `A_CF` truncated to each coarse row's block
    CprBlock,
    /// Sparse approximate inverse of `A_FF`
    ApproximateInverse,
}

/// How the coarse operator of a level is formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoarseGridMethod {
    /// `R A P`
    #[default]
    Galerkin,
    /// `A_CC - A_CF W A_FC`
    NonGalerkin(NonGalerkinMethod),
}

impl CoarseGridMethod {
    /// Map the numeric method code (0 Galerkin, 1-4 non-Galerkin variants)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Galerkin),
            1 => Some(Self::NonGalerkin(NonGalerkinMethod::BlockDiagonal)),
            2 => Some(Self::NonGalerkin(NonGalerkinMethod::CprScalar)),
            3 => Some(Self::NonGalerkin(NonGalerkinMethod::CprBlock)),
            4 => Some(Self::NonGalerkin(NonGalerkinMethod::ApproximateInverse)),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Galerkin => 0,
            Self::NonGalerkin(NonGalerkinMethod::BlockDiagonal) => 1,
            Self::NonGalerkin(NonGalerkinMethod::CprScalar) => 2,
            Self::NonGalerkin(NonGalerkinMethod::CprBlock) => 3,
            Self::NonGalerkin(NonGalerkinMethod::ApproximateInverse) => 4,
        }
    }
}

/// Unknown ordering assumed by the dropping of the Schur correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NonGalerkinOrdering {
    /// The unknowns of one physical block are consecutive
    #[default]
    Interleaved,
    /// Each unknown type is numbered contiguously
    Contiguous,
}

/// Collective: `R (A P)`
pub fn galerkin_coarse_operator<T: ComplexField>(
    r: &ParCsrMatrix<T>,
    a: &ParCsrMatrix<T>,
    p: &ParCsrMatrix<T>,
) -> Result<ParCsrMatrix<T>, CommError> {
    r.matmul(&a.matmul(p)?)
}

/// Parameters of [`non_galerkin_coarse_operator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonGalerkinOptions {
    pub method: NonGalerkinMethod,
    /// F unknowns per physical block: size of the `A_FF` blocks and of the CPR window
    pub fine_block_size: usize,
    /// C unknowns per physical block: width of the diagonal window kept by dropping
    pub coarse_block_size: usize,
    /// Off-block entries kept per coarse row of the correction (0 keeps everything)
    pub max_elmts: usize,
    pub ordering: NonGalerkinOrdering,
}

/// Collective: `A_H = A_CC - A_CF W A_FC`.
///
/// When `wp ≈ A_FF⁻¹ A_FC` was already formed for the prolongation it is reused and the
/// correction is simply `A_CF wp`.
pub fn non_galerkin_coarse_operator<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
    wp: Option<&ParCsrMatrix<T>>,
    options: &NonGalerkinOptions,
) -> Result<ParCsrMatrix<T>, CommError> {
    let blocks = split_blocks(a, cf_marker)?;
    let bs = options.fine_block_size.max(1);

    let correction = match (wp, options.method) {
        (Some(wp), _) => blocks.cf.matmul(wp)?,
        (None, NonGalerkinMethod::BlockDiagonal) => {
            let inv = block_diag_matrix(a, bs, Some((cf_marker, F_PT)), true)?;
            blocks.cf.matmul(&inv.matmul(&blocks.fc)?)?
        }
        (None, NonGalerkinMethod::CprScalar | NonGalerkinMethod::CprBlock) => {
            let inv_size = if options.method == NonGalerkinMethod::CprBlock {
                bs
            } else {
                1
            };
            let a_cf_trunc = get_acf_cpr(a, bs, cf_marker)?;
            let inv = block_diag_matrix(a, inv_size, Some((cf_marker, F_PT)), true)?;
            a_cf_trunc.matmul(&inv)?.matmul(&blocks.fc)?
        }
        (None, NonGalerkinMethod::ApproximateInverse) => {
            let m = approximate_inverse(&blocks.ff)?;
            blocks.cf.matmul(&m.matmul(&blocks.fc)?)?
        }
    };

    let correction = if options.max_elmts == 0 {
        correction
    } else {
        match options.ordering {
            NonGalerkinOrdering::Interleaved => {
                let coarse_bs = options.coarse_block_size.max(1);
                drop_off_block_entries(&correction, coarse_bs, options.max_elmts)?
            }
            NonGalerkinOrdering::Contiguous => {
                log::debug!("correction dropping is not available for contiguous ordering");
                correction
            }
        }
    };

    ParCsrMatrix::add(T::one(), &blocks.cc, -T::one(), &correction)
}

/// Collective: keep the entries of every row inside its own diagonal block, plus the
/// off-block entries among the `max_elmts` largest of the row.
///
/// Local row `i` owns the local columns `[i - i % block_size, i - i % block_size + block_size)`.
fn drop_off_block_entries<T: ComplexField>(
    m: &ParCsrMatrix<T>,
    block_size: usize,
    max_elmts: usize,
) -> Result<ParCsrMatrix<T>, CommError> {
    let first_col = m.first_col();
    let rows = (0..m.local_rows())
        .map(|i| {
            let row_start = first_col + i - i % block_size;
            let in_block = |g: usize| (row_start..row_start + block_size).contains(&g);
            let row = m.global_row(i);

            let mut order: Vec<usize> = (0..row.len()).collect();
            order.sort_by(|&x, &y| {
                row[y]
                    .1
                    .norm()
                    .partial_cmp(&row[x].1.norm())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut keep: Vec<bool> = row.iter().map(|&(g, _)| in_block(g)).collect();
            for &k in order.iter().take(max_elmts) {
                keep[k] = true;
            }

            row.into_iter()
                .zip(keep)
                .filter_map(|(entry, k)| k.then_some(entry))
                .collect()
        })
        .collect();

    ParCsrMatrix::from_global_rows(
        Arc::clone(m.comm()),
        m.row_partition().clone(),
        m.col_partition().clone(),
        rows,
    )
}

/// Collective: drop off-diagonal entries below `threshold` times the largest magnitude in
/// their row. The diagonal is always kept.
pub fn truncate_coarse_grid<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    threshold: f64,
) -> Result<ParCsrMatrix<T>, CommError> {
    let threshold = T::real(threshold);
    let first_row = a.first_row();
    let row_max: Vec<T::Real> = (0..a.local_rows())
        .map(|i| {
            a.diag()
                .row_entries(i)
                .chain(a.offd().row_entries(i))
                .fold(T::Real::zero(), |acc, (_, v)| acc.max(v.norm()))
        })
        .collect();
    a.filter_entries(|i, g, v| g == first_row + i || v.norm() >= threshold * row_max[i])
}
