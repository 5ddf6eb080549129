//! Compressed Sparse Row (CSR) matrix format
//!
//! CSR format stores:
//! - `values`: Non-zero entries in row-major order
//! - `col_indices`: Column index for each value
//! - `row_ptrs`: Index into values/col_indices where each row starts
//!
//! This is the rank-local building block of [`ParCsrMatrix`](super::ParCsrMatrix): the
//! diagonal block and the compressed off-diagonal block are both `CsrMatrix` values.
//! Explicitly stored zeros are kept; structure only changes where an algorithm drops
//! entries on purpose.

use crate::traits::ComplexField;
use ndarray::{Array1, Array2};
use std::ops::Range;

/// Compressed Sparse Row (CSR) matrix format
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix<T: ComplexField> {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Non-zero values in row-major order
    pub values: Vec<T>,
    /// Column indices for each value
    pub col_indices: Vec<usize>,
    /// Row pointers: row_ptrs[i] is the start index in values/col_indices for row i
    /// row_ptrs[num_rows] = nnz (total number of non-zeros)
    pub row_ptrs: Vec<usize>,
}

impl<T: ComplexField> CsrMatrix<T> {
    /// Create a new empty CSR matrix
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Create a CSR matrix from raw components
    ///
    /// # Panics
    ///
    /// Panics if the input arrays are inconsistent:
    /// - `row_ptrs` must have length `num_rows + 1`
    /// - `col_indices` and `values` must have the same length
    /// - `row_ptrs[num_rows]` must equal `values.len()`
    pub fn from_raw_parts(
        num_rows: usize,
        num_cols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(
            row_ptrs.len(),
            num_rows + 1,
            "row_ptrs must have num_rows + 1 elements"
        );
        assert_eq!(
            col_indices.len(),
            values.len(),
            "col_indices and values must have the same length"
        );
        assert_eq!(
            row_ptrs[num_rows],
            values.len(),
            "row_ptrs[num_rows] must equal nnz"
        );

        Self {
            num_rows,
            num_cols,
            row_ptrs,
            col_indices,
            values,
        }
    }

    /// Create a CSR matrix from a dense matrix
    ///
    /// Only stores entries with magnitude > threshold
    pub fn from_dense(dense: &Array2<T>, threshold: T::Real) -> Self {
        let mut builder = CsrBuilder::new(dense.nrows(), dense.ncols());
        for row in dense.rows() {
            builder.add_row_entries(
                row.iter()
                    .copied()
                    .enumerate()
                    .filter(|(_, v)| v.norm() > threshold),
            );
        }
        builder.finish()
    }

    /// Create a CSR matrix from COO (Coordinate) format triplets
    ///
    /// Triplets are (row, col, value). Duplicate entries are summed.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        triplets.sort_by_key(|&(r, c, _)| (r, c));

        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut col_indices: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut counts = vec![0usize; num_rows];
        let mut prev: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            if prev == Some((row, col)) {
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
                continue;
            }
            values.push(val);
            col_indices.push(col);
            counts[row] += 1;
            prev = Some((row, col));
        }

        let mut row_ptrs = Vec::with_capacity(num_rows + 1);
        row_ptrs.push(0);
        for c in counts {
            let last = row_ptrs[row_ptrs.len() - 1];
            row_ptrs.push(last + c);
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Get the range of indices in values/col_indices for a given row
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// Get the (col, value) pairs for a row
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Number of stored entries in a row
    pub fn row_nnz(&self, row: usize) -> usize {
        self.row_ptrs[row + 1] - self.row_ptrs[row]
    }

    /// Matrix-vector product: y = A * x
    pub fn matvec(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");
        let mut y = Array1::from_elem(self.num_rows, T::zero());
        self.matvec_add(x, &mut y);
        y
    }

    /// Matrix-vector product with accumulation: y += A * x
    pub fn matvec_add(&self, x: &Array1<T>, y: &mut Array1<T>) {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");
        assert_eq!(y.len(), self.num_rows, "Output vector size mismatch");

        for i in 0..self.num_rows {
            let mut sum = T::zero();
            for idx in self.row_range(i) {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            y[i] += sum;
        }
    }

    /// Get element at (i, j), returns 0 if not stored
    pub fn get(&self, i: usize, j: usize) -> T {
        self.row_entries(i)
            .find(|&(c, _)| c == j)
            .map_or(T::zero(), |(_, v)| v)
    }

    /// Extract diagonal elements
    pub fn diagonal(&self) -> Array1<T> {
        let n = self.num_rows.min(self.num_cols);
        Array1::from_iter((0..n).map(|i| self.get(i, i)))
    }

    /// Scale all values by a scalar
    pub fn scale(&mut self, scalar: T) {
        for val in &mut self.values {
            *val *= scalar;
        }
    }

    /// Create identity matrix in CSR format
    pub fn identity(n: usize) -> Self {
        Self {
            num_rows: n,
            num_cols: n,
            values: vec![T::one(); n],
            col_indices: (0..n).collect(),
            row_ptrs: (0..=n).collect(),
        }
    }

    /// Transpose (columns become rows, entries of each new row sorted by column)
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.num_cols];
        for &c in &self.col_indices {
            counts[c] += 1;
        }
        let mut row_ptrs = Vec::with_capacity(self.num_cols + 1);
        row_ptrs.push(0);
        for c in &counts {
            let last = row_ptrs[row_ptrs.len() - 1];
            row_ptrs.push(last + c);
        }

        let mut next = row_ptrs[..self.num_cols].to_vec();
        let mut col_indices = vec![0usize; self.nnz()];
        let mut values = vec![T::zero(); self.nnz()];
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                let dst = next[j];
                col_indices[dst] = i;
                values[dst] = v;
                next[j] += 1;
            }
        }

        Self {
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Sparse product `A B` (row-by-row accumulation, columns of each row sorted)
    pub fn matmul(&self, other: &CsrMatrix<T>) -> CsrMatrix<T> {
        assert_eq!(self.num_cols, other.num_rows, "Inner dimension mismatch");

        let mut builder = CsrBuilder::with_capacity(self.num_rows, other.num_cols, self.nnz());
        let mut acc = vec![T::zero(); other.num_cols];
        let mut seen = vec![false; other.num_cols];
        let mut cols: Vec<usize> = Vec::new();

        for i in 0..self.num_rows {
            for (k, a) in self.row_entries(i) {
                for (j, b) in other.row_entries(k) {
                    if !seen[j] {
                        seen[j] = true;
                        cols.push(j);
                    }
                    acc[j] += a * b;
                }
            }
            cols.sort_unstable();
            builder.add_row_entries(cols.iter().map(|&j| (j, acc[j])));
            for &j in &cols {
                acc[j] = T::zero();
                seen[j] = false;
            }
            cols.clear();
        }

        builder.finish()
    }

    /// Convert to dense matrix (for debugging/small matrices)
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.num_rows, self.num_cols), T::zero());

        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                dense[[i, j]] += v;
            }
        }

        dense
    }
}

/// Builder for constructing CSR matrices row by row
#[derive(Debug)]
pub struct CsrBuilder<T: ComplexField> {
    num_rows: usize,
    num_cols: usize,
    values: Vec<T>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
}

impl<T: ComplexField> CsrBuilder<T> {
    /// Create a new CSR builder
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self::with_capacity(num_rows, num_cols, 0)
    }

    /// Create a new CSR builder with estimated non-zeros
    pub fn with_capacity(num_rows: usize, num_cols: usize, nnz_estimate: usize) -> Self {
        let mut row_ptrs = Vec::with_capacity(num_rows + 1);
        row_ptrs.push(0);
        Self {
            num_rows,
            num_cols,
            values: Vec::with_capacity(nnz_estimate),
            col_indices: Vec::with_capacity(nnz_estimate),
            row_ptrs,
        }
    }

    /// Append the entries of the next row, in the order given
    pub fn add_row_entries(&mut self, entries: impl IntoIterator<Item = (usize, T)>) {
        for (col, val) in entries {
            debug_assert!(col < self.num_cols);
            self.values.push(val);
            self.col_indices.push(col);
        }
        self.row_ptrs.push(self.values.len());
    }

    /// Finish building and return the CSR matrix; rows never added are empty
    pub fn finish(mut self) -> CsrMatrix<T> {
        while self.row_ptrs.len() <= self.num_rows {
            self.row_ptrs.push(self.values.len());
        }

        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            values: self.values,
            col_indices: self.col_indices,
            row_ptrs: self.row_ptrs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_csr_from_dense() {
        let dense = array![[1.0_f64, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]];

        let csr = CsrMatrix::from_dense(&dense, 1e-15);

        assert_eq!(csr.num_rows, 3);
        assert_eq!(csr.num_cols, 3);
        assert_eq!(csr.nnz(), 5);
        assert_relative_eq!(csr.get(0, 2), 2.0);
        assert_relative_eq!(csr.get(2, 0), 4.0);
        assert_relative_eq!(csr.get(1, 0), 0.0);
    }

    #[test]
    fn test_csr_matvec_complex() {
        let dense = array![
            [Complex64::new(1.0, 0.0), Complex64::new(2.0, 1.0)],
            [Complex64::new(3.0, 0.0), Complex64::new(4.0, 0.0)],
        ];

        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        let x = array![Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)];

        let y = csr.matvec(&x);

        assert_relative_eq!(y[0].re, 5.0, epsilon = 1e-12);
        assert_relative_eq!(y[0].im, 2.0, epsilon = 1e-12);
        assert_relative_eq!(y[1].re, 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_csr_triplets_duplicate_and_empty_rows() {
        let triplets = vec![(2, 1, 1.0_f64), (0, 0, 1.0), (0, 0, 2.0), (2, 0, 4.0)];

        let csr = CsrMatrix::from_triplets(4, 2, triplets);

        assert_eq!(csr.row_ptrs, vec![0, 1, 1, 3, 3]);
        assert_eq!(csr.col_indices, vec![0, 0, 1]);
        assert_relative_eq!(csr.get(0, 0), 3.0);
        assert_eq!(csr.row_nnz(3), 0);
    }

    #[test]
    fn test_csr_transpose() {
        let dense = array![[1.0_f64, 0.0, 2.0], [0.0, 3.0, 0.0]];
        let t = CsrMatrix::from_dense(&dense, 0.0).transpose();

        assert_eq!(t.num_rows, 3);
        assert_eq!(t.num_cols, 2);
        assert_eq!(t.to_dense(), dense.t().to_owned());
    }

    #[test]
    fn test_csr_builder_keeps_explicit_zeros() {
        let mut builder: CsrBuilder<f64> = CsrBuilder::new(3, 3);
        builder.add_row_entries([(0, 1.0), (2, 0.0)]);
        builder.add_row_entries([(1, 3.0)]);

        let csr = builder.finish();

        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.row_ptrs, vec![0, 2, 3, 3]);
        assert_relative_eq!(csr.get(1, 1), 3.0);
    }

    #[test]
    fn test_identity_diagonal() {
        let id: CsrMatrix<f64> = CsrMatrix::identity(3);
        assert_eq!(id.diagonal(), array![1.0, 1.0, 1.0]);
        assert_eq!(id.matvec(&array![1.0, 2.0, 3.0]), array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_csr_matmul_matches_dense() {
        let a = array![[1.0_f64, 2.0, 0.0], [0.0, 0.0, 3.0]];
        let b = array![[1.0_f64, 0.0], [0.0, 4.0], [5.0, 1.0]];
        let c = CsrMatrix::from_dense(&a, 0.0).matmul(&CsrMatrix::from_dense(&b, 0.0));

        assert_eq!(c.num_rows, 2);
        assert_eq!(c.num_cols, 2);
        assert_eq!(c.to_dense(), a.dot(&b));
        assert_eq!(c.col_indices, vec![0, 1, 0, 1]);
    }
}
