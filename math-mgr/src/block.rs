//! Block-diagonal extraction
//!
//! The diagonal block of a distributed matrix is cut into consecutive square blocks of
//! `block_size` rows. When the row count is not a multiple of the block size, the
//! remaining rows form one smaller block stored last. With a marker filter only the rows
//! (and columns) of one point class take part, numbered compactly in local order, which
//! yields the block diagonal of e.g. `A_FF` without forming `A_FF`.

use crate::comm::CommError;
use crate::dense::{block_matvec_add, invert_in_place};
use crate::partition::{Partition, is_coarse};
use crate::sparse::{CsrBuilder, ParCsrMatrix};
use crate::traits::ComplexField;
use ndarray::Array1;
use num_traits::Zero;
use std::ops::Range;
use std::sync::Arc;

/// Flattened row-major blocks along the diagonal
#[derive(Debug, Clone)]
pub struct BlockDiagonal<T: ComplexField> {
    block_size: usize,
    num_rows: usize,
    data: Vec<T>,
}

impl<T: ComplexField> BlockDiagonal<T> {
    /// Zero blocks covering `num_rows` rows
    pub fn zeros(num_rows: usize, block_size: usize) -> Self {
        let bs = block_size.max(1);
        let full = num_rows / bs;
        let left = num_rows % bs;
        Self {
            block_size: bs,
            num_rows,
            data: vec![T::zero(); full * bs * bs + left * left],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Rows covered
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Blocks including the trailing smaller one
    pub fn num_blocks(&self) -> usize {
        self.num_rows.div_ceil(self.block_size)
    }

    /// Rows of block `b` (compact numbering)
    pub fn block_rows(&self, b: usize) -> Range<usize> {
        let start = b * self.block_size;
        start..(start + self.block_size).min(self.num_rows)
    }

    fn offset(&self, b: usize) -> usize {
        b * self.block_size * self.block_size
    }

    /// Row-major entries of block `b`
    pub fn block(&self, b: usize) -> &[T] {
        let n = self.block_rows(b).len();
        let off = self.offset(b);
        &self.data[off..off + n * n]
    }

    fn block_mut(&mut self, b: usize) -> &mut [T] {
        let n = self.block_rows(b).len();
        let off = self.offset(b);
        &mut self.data[off..off + n * n]
    }

    /// The whole flattened buffer
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Invert every block in place
    pub fn invert(&mut self) {
        for b in 0..self.num_blocks() {
            let n = self.block_rows(b).len();
            invert_in_place(self.block_mut(b), n);
        }
    }

    /// `y = B x` block by block
    pub fn apply(&self, x: &Array1<T>) -> Array1<T> {
        let mut y = Array1::from_elem(self.num_rows, T::zero());
        for b in 0..self.num_blocks() {
            let rows = self.block_rows(b);
            let n = rows.len();
            let xb: Vec<T> = rows.clone().map(|i| x[i]).collect();
            let mut yb = vec![T::zero(); n];
            block_matvec_add(self.block(b), n, &xb, &mut yb);
            for (i, v) in rows.zip(yb) {
                y[i] = v;
            }
        }
        y
    }

    /// Collective: the blocks as a distributed matrix whose rows are the covered rows
    pub fn to_parcsr(
        &self,
        comm: Arc<dyn crate::comm::Communicator>,
    ) -> Result<ParCsrMatrix<T>, CommError> {
        let part = Partition::from_local_count(comm.as_ref(), self.num_rows)?;
        let mut builder = CsrBuilder::with_capacity(self.num_rows, self.num_rows, self.data.len());
        for b in 0..self.num_blocks() {
            let rows = self.block_rows(b);
            let n = rows.len();
            let block = self.block(b);
            for r in 0..n {
                builder.add_row_entries(
                    (0..n)
                        .map(|c| (rows.start + c, block[r * n + c]))
                        .filter(|(_, v)| v.norm() > T::Real::zero()),
                );
            }
        }
        ParCsrMatrix::from_local_diag(comm, part, builder.finish())
    }
}

/// Local rows selected by an optional `(marker, point_type)` filter
pub fn selected_rows(n: usize, filter: Option<(&[i32], i32)>) -> Vec<usize> {
    match filter {
        None => (0..n).collect(),
        Some((marker, point_type)) => (0..n)
            .filter(|&i| is_coarse(marker[i]) == is_coarse(point_type))
            .collect(),
    }
}

/// Cut the diagonal block of `a` into `block_size` blocks, optionally restricted to one
/// point class, and optionally invert them. Entries below the smallest normal real are
/// skipped.
pub fn extract_block_diag<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    block_size: usize,
    filter: Option<(&[i32], i32)>,
    invert: bool,
) -> BlockDiagonal<T> {
    let rows = selected_rows(a.local_rows(), filter);
    let mut compact = vec![usize::MAX; a.local_cols()];
    for (p, &i) in rows.iter().enumerate() {
        compact[i] = p;
    }

    let mut blocks = BlockDiagonal::zeros(rows.len(), block_size);
    let tiny = T::tiny();
    for b in 0..blocks.num_blocks() {
        let range = blocks.block_rows(b);
        let n = range.len();
        let (start, off) = (range.start, blocks.offset(b));
        for p in range.clone() {
            for (j, v) in a.diag().row_entries(rows[p]) {
                let q = compact[j];
                if range.contains(&q) && v.norm() > tiny {
                    blocks.data[off + (p - start) * n + (q - start)] = v;
                }
            }
        }
    }

    if invert {
        blocks.invert();
    }
    blocks
}

/// Collective: [`extract_block_diag`] returned as a distributed matrix over the selected rows
pub fn block_diag_matrix<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    block_size: usize,
    filter: Option<(&[i32], i32)>,
    invert: bool,
) -> Result<ParCsrMatrix<T>, CommError> {
    extract_block_diag(a, block_size, filter, invert).to_parcsr(Arc::clone(a.comm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};
    use crate::partition::{C_PT, F_PT};
    use crate::sparse::CsrMatrix;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn serial(dense: ndarray::Array2<f64>) -> ParCsrMatrix<f64> {
        let a = CsrMatrix::from_dense(&dense, 0.0);
        let part = Partition::uniform(a.num_rows, 1);
        ParCsrMatrix::from_serial(SerialComm::shared(), &a, part.clone(), part).unwrap()
    }

    #[test]
    fn test_blocks_with_leftover() {
        let a = serial(array![
            [4.0, 1.0, 2.0, 0.0, 0.0],
            [1.0, 5.0, 0.0, 0.0, 0.0],
            [0.0, 3.0, 6.0, 1.0, 0.0],
            [0.0, 0.0, 2.0, 7.0, 0.0],
            [1.0, 0.0, 0.0, 0.0, 8.0],
        ]);
        let blocks = extract_block_diag(&a, 2, None, false);
        assert_eq!(blocks.num_blocks(), 3);
        assert_eq!(blocks.data().len(), 2 * 4 + 1);
        assert_eq!(blocks.block(0), &[4.0, 1.0, 1.0, 5.0]);
        assert_eq!(blocks.block(1), &[6.0, 1.0, 2.0, 7.0]);
        assert_eq!(blocks.block(2), &[8.0]);

        let inv = extract_block_diag(&a, 2, None, true);
        assert_relative_eq!(inv.block(2)[0], 0.125);
        let y = inv.apply(&array![5.0, 6.0, 7.0, 9.0, 8.0]);
        assert_relative_eq!(y[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(y[1], 1.0, epsilon = 1e-14);
        assert_relative_eq!(y[2], 1.0, epsilon = 1e-14);
        assert_relative_eq!(y[3], 1.0, epsilon = 1e-14);
        assert_relative_eq!(y[4], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_filtered_blocks_use_compact_numbering() {
        let a = serial(array![
            [2.0, 9.0, 1.0, 0.0],
            [9.0, 9.0, 9.0, 9.0],
            [1.0, 9.0, 3.0, 0.0],
            [0.0, 9.0, 0.0, 4.0],
        ]);
        let marker = [F_PT, C_PT, F_PT, F_PT];
        let blocks = extract_block_diag(&a, 2, Some((&marker, F_PT)), false);
        assert_eq!(blocks.num_rows(), 3);
        assert_eq!(blocks.block(0), &[2.0, 1.0, 1.0, 3.0]);
        assert_eq!(blocks.block(1), &[4.0]);
    }

    #[test]
    fn test_block_diag_matrix_distributed() {
        let results = ThreadComm::run(2, |comm| {
            let n = 4;
            let dense = crate::testing::laplacian_1d(2 * n);
            let part = Partition::uniform(2 * n, comm.size());
            let a = ParCsrMatrix::from_serial(comm, &dense, part.clone(), part).unwrap();
            let m = block_diag_matrix(&a, 2, None, false).unwrap();
            (m.global_rows(), m.local_nnz(), m.offd().nnz())
        });
        for (rows, nnz, offd) in results {
            assert_eq!(rows, 8);
            assert_eq!(nnz, 8);
            assert_eq!(offd, 0);
        }
    }
}
