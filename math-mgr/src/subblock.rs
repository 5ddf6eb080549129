//! Marker-driven sub-block extraction
//!
//! [`extract_sub_block`] keeps the rows whose row marker is coarse and, within them, the
//! columns whose column marker is coarse. Rows and columns of the result are renumbered
//! compactly in two independent global numberings, so `A_FF`, `A_FC`, `A_CF` and `A_CC`
//! are all obtained by flipping the sign of a CF marker.

use crate::comm::CommError;
use crate::partition::{Partition, coarse_range, is_coarse};
use crate::sparse::{CsrBuilder, ParCsrMatrix, ParCsrParts};
use crate::traits::ComplexField;
use std::sync::Arc;

/// Collective: the rows with `row_marker > 0` and columns with `col_marker > 0` of `a`.
///
/// `row_marker` has one entry per local row and `col_marker` one per local column. The
/// marker of every off-process column is fetched through the halo plan of `a` before the
/// local passes, so each selected entry is classified without further communication.
pub fn extract_sub_block<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    row_marker: &[i32],
    col_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let comm = Arc::clone(a.comm());
    let rank = comm.rank();
    debug_assert_eq!(row_marker.len(), a.local_rows());
    debug_assert_eq!(col_marker.len(), a.local_cols());

    let rows = coarse_range(comm.as_ref(), row_marker)?;
    let cols = coarse_range(comm.as_ref(), col_marker)?;
    let row_part = Partition::from_local_count(comm.as_ref(), rows.local_count)?;
    let col_part = Partition::from_local_count(comm.as_ref(), cols.local_count)?;
    debug_assert_eq!(col_part.starts()[rank], cols.range.start);

    let mut compact = vec![None; a.local_cols()];
    let mut next = 0;
    for (j, &m) in col_marker.iter().enumerate() {
        if is_coarse(m) {
            compact[j] = Some(next);
            next += 1;
        }
    }

    // New global column of every offd column of `a`, or None when it is not selected
    let col_start = cols.range.start;
    let halo: Vec<Option<usize>> = a.exchange_with(|j| compact[j].map(|c| c + col_start))?;

    let selected: Vec<usize> = (0..a.local_rows())
        .filter(|&i| is_coarse(row_marker[i]))
        .collect();

    // Pass 1: exact sizes and the offd columns actually referenced
    let mut diag_nnz = 0;
    let mut offd_nnz = 0;
    let mut offd_used = vec![false; halo.len()];
    for &i in &selected {
        diag_nnz += a
            .diag()
            .row_entries(i)
            .filter(|&(j, _)| compact[j].is_some())
            .count();
        for (k, _) in a.offd().row_entries(i) {
            if halo[k].is_some() {
                offd_nnz += 1;
                offd_used[k] = true;
            }
        }
    }

    // Offd columns of `a` are sorted by global index and the compact numbering is monotone,
    // so the kept ones stay sorted.
    let mut offd_index = vec![usize::MAX; halo.len()];
    let mut col_map_offd = Vec::new();
    for (k, g) in halo.iter().enumerate() {
        if let (true, Some(g)) = (offd_used[k], g) {
            offd_index[k] = col_map_offd.len();
            col_map_offd.push(*g);
        }
    }

    // Pass 2: fill with compact numbering
    let mut diag = CsrBuilder::with_capacity(selected.len(), cols.local_count, diag_nnz);
    let mut offd = CsrBuilder::with_capacity(selected.len(), col_map_offd.len(), offd_nnz);
    for &i in &selected {
        diag.add_row_entries(
            a.diag()
                .row_entries(i)
                .filter_map(|(j, v)| compact[j].map(|c| (c, v))),
        );
        offd.add_row_entries(
            a.offd()
                .row_entries(i)
                .filter(|&(k, _)| halo[k].is_some())
                .map(|(k, v)| (offd_index[k], v)),
        );
    }

    ParCsrMatrix::from_parts(ParCsrParts {
        comm,
        row_part,
        col_part,
        diag: diag.finish(),
        offd: offd.finish(),
        col_map_offd,
    })
}

/// Marker with coarse and fine swapped
pub fn negate_marker(cf_marker: &[i32]) -> Vec<i32> {
    cf_marker
        .iter()
        .map(|&m| if is_coarse(m) { -1 } else { 1 })
        .collect()
}

/// Collective: `A_FF`
pub fn build_aff<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let f = negate_marker(cf_marker);
    extract_sub_block(a, &f, &f)
}

/// Collective: `A_FC`
pub fn build_afc<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let f = negate_marker(cf_marker);
    extract_sub_block(a, &f, cf_marker)
}

/// The four blocks of a CF splitting
#[derive(Debug, Clone)]
pub struct CfBlocks<T: ComplexField> {
    pub ff: ParCsrMatrix<T>,
    pub fc: ParCsrMatrix<T>,
    pub cf: ParCsrMatrix<T>,
    pub cc: ParCsrMatrix<T>,
}

/// Collective: `(A_FF, A_FC, A_CF, A_CC)`
pub fn split_blocks<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    cf_marker: &[i32],
) -> Result<CfBlocks<T>, CommError> {
    let f = negate_marker(cf_marker);
    Ok(CfBlocks {
        ff: extract_sub_block(a, &f, &f)?,
        fc: extract_sub_block(a, &f, cf_marker)?,
        cf: extract_sub_block(a, cf_marker, &f)?,
        cc: extract_sub_block(a, cf_marker, cf_marker)?,
    })
}

/// Collective: `A_CF` truncated to the fine unknowns of each coarse row's own block.
///
/// The k-th local coarse row keeps only the local fine columns whose local fine index lies
/// in `[k * block_size, (k + 1) * block_size)`. Off-process columns are dropped.
pub fn get_acf_cpr<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    block_size: usize,
    cf_marker: &[i32],
) -> Result<ParCsrMatrix<T>, CommError> {
    let comm = Arc::clone(a.comm());
    let n = a.local_rows();

    let mut fine_index = vec![usize::MAX; n];
    let mut num_fine = 0;
    for (i, &m) in cf_marker.iter().enumerate() {
        if !is_coarse(m) {
            fine_index[i] = num_fine;
            num_fine += 1;
        }
    }
    let num_coarse = n - num_fine;

    let mut diag = CsrBuilder::new(num_coarse, num_fine);
    let coarse_rows = (0..n).filter(|&i| is_coarse(cf_marker[i]));
    for (k, i) in coarse_rows.enumerate() {
        let window = k * block_size..(k + 1) * block_size;
        diag.add_row_entries(a.diag().row_entries(i).filter_map(|(j, v)| {
            let f = fine_index.get(j).copied().filter(|&f| f != usize::MAX)?;
            window.contains(&f).then_some((f, v))
        }));
    }

    let row_part = Partition::from_local_count(comm.as_ref(), num_coarse)?;
    let col_part = Partition::from_local_count(comm.as_ref(), num_fine)?;
    ParCsrMatrix::from_parts(ParCsrParts {
        comm,
        row_part,
        col_part,
        diag: diag.finish(),
        offd: crate::sparse::CsrMatrix::new(num_coarse, 0),
        col_map_offd: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ThreadComm;
    use crate::partition::{C_PT, F_PT};
    use crate::sparse::CsrMatrix;
    use crate::testing::{assert_dense_eq, laplacian_1d, nonsymmetric_test_matrix};
    use ndarray::Array2;

    fn alternating_marker(range: std::ops::Range<usize>) -> Vec<i32> {
        range
            .map(|g| if g % 2 == 1 { C_PT } else { F_PT })
            .collect()
    }

    /// Dense sub-block of the serial matrix, for comparison
    fn dense_block(a: &CsrMatrix<f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
        let d = a.to_dense();
        Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| d[[rows[i], cols[j]]])
    }

    #[test]
    fn test_all_selected_reproduces_matrix() {
        let a = nonsymmetric_test_matrix(9);
        for nranks in [1, 2, 3] {
            let results = ThreadComm::run(nranks, |comm| {
                let part = Partition::uniform(9, comm.size());
                let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
                let all = vec![C_PT; m.local_rows()];
                let sub = extract_sub_block(&m, &all, &all).unwrap();
                (sub.global_nnz().unwrap(), sub.to_global_dense().unwrap())
            });
            for (nnz, dense) in results {
                assert_eq!(nnz, a.nnz());
                assert_dense_eq(&dense, &a.to_dense(), 0.0);
            }
        }
    }

    #[test]
    fn test_split_blocks_match_dense_blocks() {
        let n = 10;
        let a = nonsymmetric_test_matrix(n);
        let fine: Vec<usize> = (0..n).filter(|g| g % 2 == 0).collect();
        let coarse: Vec<usize> = (0..n).filter(|g| g % 2 == 1).collect();

        for nranks in [1, 2, 4] {
            let results = ThreadComm::run(nranks, |comm| {
                let part = Partition::uniform(n, comm.size());
                let range = part.local_range(comm.rank());
                let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
                let cf = alternating_marker(range);
                let blocks = split_blocks(&m, &cf).unwrap();
                [
                    blocks.ff.to_global_dense().unwrap(),
                    blocks.fc.to_global_dense().unwrap(),
                    blocks.cf.to_global_dense().unwrap(),
                    blocks.cc.to_global_dense().unwrap(),
                ]
            });
            for [ff, fc, cf, cc] in results {
                assert_dense_eq(&ff, &dense_block(&a, &fine, &fine), 0.0);
                assert_dense_eq(&fc, &dense_block(&a, &fine, &coarse), 0.0);
                assert_dense_eq(&cf, &dense_block(&a, &coarse, &fine), 0.0);
                assert_dense_eq(&cc, &dense_block(&a, &coarse, &coarse), 0.0);
            }
        }
    }

    #[test]
    fn test_empty_selection_is_legal() {
        let a = laplacian_1d(6);
        let results = ThreadComm::run(2, |comm| {
            let part = Partition::uniform(6, comm.size());
            let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
            let rows = vec![C_PT; m.local_rows()];
            let none = vec![F_PT; m.local_cols()];
            let sub = extract_sub_block(&m, &rows, &none).unwrap();
            (sub.global_rows(), sub.global_cols(), sub.local_nnz())
        });
        for r in results {
            assert_eq!(r, (6, 0, 0));
        }
    }

    #[test]
    fn test_acf_cpr_keeps_own_block() {
        // Two unknowns per physical block, the second one coarse
        let n = 8;
        let a = nonsymmetric_test_matrix(n);
        let results = ThreadComm::run(2, |comm| {
            let part = Partition::uniform(n, comm.size());
            let range = part.local_range(comm.rank());
            let m = ParCsrMatrix::from_serial(comm, &a, part.clone(), part).unwrap();
            let cf = alternating_marker(range);
            get_acf_cpr(&m, 1, &cf).unwrap().to_global_dense().unwrap()
        });
        // Coarse row 2k + 1 keeps only fine column 2k
        let d = a.to_dense();
        for dense in results {
            assert_eq!(dense.dim(), (4, 4));
            for k in 0..4 {
                for f in 0..4 {
                    let expected = if f == k { d[[2 * k + 1, 2 * k]] } else { 0.0 };
                    assert_eq!(dense[[k, f]], expected);
                }
            }
        }
    }
}
