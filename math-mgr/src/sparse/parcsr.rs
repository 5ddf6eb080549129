//! Row-distributed sparse matrix (ParCSR)
//!
//! Each rank owns a contiguous block of rows. Its part of the matrix is split into
//! - `diag`: the columns this rank also owns, numbered locally
//! - `offd`: every other column, numbered compactly through `col_map_offd`
//!
//! `col_map_offd` is sorted by global column, so the off-process columns owned by one
//! neighbour form a contiguous range of `offd` positions. The [`CommPkg`] built at
//! construction records, per neighbour, which local entries to send and which `offd`
//! range to receive; every halo exchange in the crate goes through it.

use super::csr::{CsrBuilder, CsrMatrix};
use crate::comm::{CommError, CommExt, Communicator};
use crate::partition::Partition;
use crate::traits::ComplexField;
use ndarray::{Array1, Array2};
use std::ops::Range;
use std::sync::Arc;

/// Halo exchange plan of a distributed matrix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommPkg {
    /// `(rank, local indices)` whose values `rank` needs from us
    pub sends: Vec<(usize, Vec<usize>)>,
    /// `(rank, offd positions)` filled by values owned by `rank`
    pub recvs: Vec<(usize, Range<usize>)>,
}

impl CommPkg {
    /// Collective: derive the plan from the sorted off-process column map
    fn build(
        comm: &dyn Communicator,
        col_part: &Partition,
        col_map_offd: &[usize],
    ) -> Result<Self, CommError> {
        let mut recvs: Vec<(usize, Range<usize>)> = Vec::new();
        for (k, &g) in col_map_offd.iter().enumerate() {
            let owner = col_part.owner(g);
            match recvs.last_mut() {
                Some((rank, range)) if *rank == owner => range.end = k + 1,
                _ => recvs.push((owner, k..k + 1)),
            }
        }

        let requests = recvs
            .iter()
            .map(|(rank, range)| (*rank, col_map_offd[range.clone()].to_vec()))
            .collect();
        let first_col = col_part.starts()[comm.rank()];
        let sends = comm
            .exchange(requests)?
            .into_iter()
            .map(|(src, globals)| (src, globals.into_iter().map(|g| g - first_col).collect()))
            .collect();

        Ok(Self { sends, recvs })
    }

    /// Number of halo values received
    pub fn num_recv(&self) -> usize {
        self.recvs.last().map_or(0, |(_, r)| r.end)
    }

    fn place_received<X>(&self, received: Vec<(usize, Vec<X>)>) -> Result<Vec<X>, CommError> {
        let mut halo = Vec::with_capacity(self.num_recv());
        let mut incoming = received.into_iter();
        for (rank, range) in &self.recvs {
            match incoming.next() {
                Some((src, data)) if src == *rank && data.len() == range.len() => {
                    halo.extend(data)
                }
                _ => return Err(CommError::MissingContribution { rank: *rank }),
            }
        }
        if let Some((src, _)) = incoming.next() {
            return Err(CommError::TypeMismatch { rank: src });
        }
        Ok(halo)
    }
}

/// Raw blocks of a [`ParCsrMatrix`], for moving storage between matrices
#[derive(Debug)]
pub struct ParCsrParts<T: ComplexField> {
    pub comm: Arc<dyn Communicator>,
    pub row_part: Partition,
    pub col_part: Partition,
    pub diag: CsrMatrix<T>,
    pub offd: CsrMatrix<T>,
    pub col_map_offd: Vec<usize>,
}

/// Distributed sparse matrix with a diagonal/off-diagonal block split
#[derive(Debug, Clone)]
pub struct ParCsrMatrix<T: ComplexField> {
    comm: Arc<dyn Communicator>,
    row_part: Partition,
    col_part: Partition,
    diag: CsrMatrix<T>,
    offd: CsrMatrix<T>,
    col_map_offd: Vec<usize>,
    comm_pkg: CommPkg,
}

impl<T: ComplexField> ParCsrMatrix<T> {
    /// Collective: assemble from this rank's rows given in global column numbering.
    ///
    /// Duplicate columns within a row are summed. Explicit zeros are kept.
    pub fn from_global_rows(
        comm: Arc<dyn Communicator>,
        row_part: Partition,
        col_part: Partition,
        rows: Vec<Vec<(usize, T)>>,
    ) -> Result<Self, CommError> {
        let rank = comm.rank();
        debug_assert_eq!(rows.len(), row_part.local_len(rank));
        let col_range = col_part.local_range(rank);

        let rows: Vec<Vec<(usize, T)>> = rows.into_iter().map(merge_sorted).collect();

        let mut col_map_offd: Vec<usize> = rows
            .iter()
            .flatten()
            .map(|&(g, _)| g)
            .filter(|g| !col_range.contains(g))
            .collect();
        col_map_offd.sort_unstable();
        col_map_offd.dedup();

        let n_local = rows.len();
        let mut diag = CsrBuilder::new(n_local, col_range.len());
        let mut offd = CsrBuilder::new(n_local, col_map_offd.len());
        for row in &rows {
            diag.add_row_entries(
                row.iter()
                    .filter(|(g, _)| col_range.contains(g))
                    .map(|&(g, v)| (g - col_range.start, v)),
            );
            offd.add_row_entries(row.iter().filter(|(g, _)| !col_range.contains(g)).map(
                |&(g, v)| {
                    let k = col_map_offd.partition_point(|&c| c < g);
                    (k, v)
                },
            ));
        }

        Self::from_parts(ParCsrParts {
            comm,
            row_part,
            col_part,
            diag: diag.finish(),
            offd: offd.finish(),
            col_map_offd,
        })
    }

    /// Collective: take ownership of raw blocks and build the halo plan
    pub fn from_parts(parts: ParCsrParts<T>) -> Result<Self, CommError> {
        let ParCsrParts {
            comm,
            row_part,
            col_part,
            diag,
            offd,
            col_map_offd,
        } = parts;
        debug_assert_eq!(offd.num_cols, col_map_offd.len());
        debug_assert!(col_map_offd.windows(2).all(|w| w[0] < w[1]));

        let comm_pkg = CommPkg::build(comm.as_ref(), &col_part, &col_map_offd)?;
        Ok(Self {
            comm,
            row_part,
            col_part,
            diag,
            offd,
            col_map_offd,
            comm_pkg,
        })
    }

    /// Give up the raw blocks; the column map moves with them
    pub fn into_parts(self) -> ParCsrParts<T> {
        ParCsrParts {
            comm: self.comm,
            row_part: self.row_part,
            col_part: self.col_part,
            diag: self.diag,
            offd: self.offd,
            col_map_offd: self.col_map_offd,
        }
    }

    /// Collective: distribute a matrix every rank holds in full
    pub fn from_serial(
        comm: Arc<dyn Communicator>,
        global: &CsrMatrix<T>,
        row_part: Partition,
        col_part: Partition,
    ) -> Result<Self, CommError> {
        let rows = row_part
            .local_range(comm.rank())
            .map(|i| global.row_entries(i).collect())
            .collect();
        Self::from_global_rows(comm, row_part, col_part, rows)
    }

    /// Collective: square matrix with the given diagonal block only
    pub fn from_local_diag(
        comm: Arc<dyn Communicator>,
        part: Partition,
        diag: CsrMatrix<T>,
    ) -> Result<Self, CommError> {
        let n = diag.num_rows;
        Self::from_parts(ParCsrParts {
            comm,
            row_part: part.clone(),
            col_part: part,
            diag,
            offd: CsrMatrix::new(n, 0),
            col_map_offd: Vec::new(),
        })
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn row_partition(&self) -> &Partition {
        &self.row_part
    }

    pub fn col_partition(&self) -> &Partition {
        &self.col_part
    }

    /// Block of columns owned by this rank, local numbering
    pub fn diag(&self) -> &CsrMatrix<T> {
        &self.diag
    }

    /// Block of off-process columns, numbered through [`Self::col_map_offd`]
    pub fn offd(&self) -> &CsrMatrix<T> {
        &self.offd
    }

    pub fn col_map_offd(&self) -> &[usize] {
        &self.col_map_offd
    }

    pub fn comm_pkg(&self) -> &CommPkg {
        &self.comm_pkg
    }

    pub fn local_rows(&self) -> usize {
        self.diag.num_rows
    }

    pub fn local_cols(&self) -> usize {
        self.diag.num_cols
    }

    pub fn global_rows(&self) -> usize {
        self.row_part.total()
    }

    pub fn global_cols(&self) -> usize {
        self.col_part.total()
    }

    /// Global index of the first local row
    pub fn first_row(&self) -> usize {
        self.row_part.starts()[self.comm.rank()]
    }

    /// Global index of the first local column
    pub fn first_col(&self) -> usize {
        self.col_part.starts()[self.comm.rank()]
    }

    /// Stored entries on this rank
    pub fn local_nnz(&self) -> usize {
        self.diag.nnz() + self.offd.nnz()
    }

    /// Collective: stored entries over all ranks
    pub fn global_nnz(&self) -> Result<usize, CommError> {
        self.comm.all_reduce_sum(self.local_nnz())
    }

    /// Entries of local row `i` in global column numbering, sorted by column
    pub fn global_row(&self, i: usize) -> Vec<(usize, T)> {
        let first_col = self.first_col();
        let mut row: Vec<(usize, T)> = self
            .diag
            .row_entries(i)
            .map(|(j, v)| (j + first_col, v))
            .chain(
                self.offd
                    .row_entries(i)
                    .map(|(k, v)| (self.col_map_offd[k], v)),
            )
            .collect();
        row.sort_by_key(|&(g, _)| g);
        row
    }

    /// Diagonal entries of the local rows (square matrices)
    pub fn local_diagonal(&self) -> Array1<T> {
        self.diag.diagonal()
    }

    /// Collective: fetch, for every offd column, the value `value_at(local index)` computed
    /// by its owner. The result is in offd order.
    pub fn exchange_with<X, F>(&self, value_at: F) -> Result<Vec<X>, CommError>
    where
        X: Clone + Send + Sync + 'static,
        F: Fn(usize) -> X,
    {
        let messages = self
            .comm_pkg
            .sends
            .iter()
            .map(|(dest, idx)| (*dest, idx.iter().map(|&i| value_at(i)).collect()))
            .collect();
        let received = self.comm.exchange(messages)?;
        self.comm_pkg.place_received(received)
    }

    /// Collective: off-process values of a column-distributed array
    pub fn exchange_halo<X>(&self, local: &[X]) -> Result<Vec<X>, CommError>
    where
        X: Clone + Send + Sync + 'static,
    {
        self.exchange_with(|i| local[i].clone())
    }

    /// Collective: off-process entries of a column-distributed vector
    pub fn halo_vector(&self, x: &Array1<T>) -> Result<Array1<T>, CommError> {
        Ok(Array1::from_vec(self.exchange_with(|i| x[i])?))
    }

    /// `y = A x` given the already exchanged halo of `x`
    pub fn matvec_with_halo(&self, x: &Array1<T>, halo: &Array1<T>) -> Array1<T> {
        let mut y = self.diag.matvec(x);
        self.offd.matvec_add(halo, &mut y);
        y
    }

    /// Collective: `y = A x`
    pub fn matvec(&self, x: &Array1<T>) -> Result<Array1<T>, CommError> {
        let halo = self.halo_vector(x)?;
        Ok(self.matvec_with_halo(x, &halo))
    }

    /// Collective: `b - A x`
    pub fn residual(&self, b: &Array1<T>, x: &Array1<T>) -> Result<Array1<T>, CommError> {
        let ax = self.matvec(x)?;
        Ok(b - &ax)
    }

    /// Collective: `Aᵀ`. Off-process entries travel to the owner of their new row.
    pub fn transpose(&self) -> Result<Self, CommError> {
        let rank = self.comm.rank();
        let first_row = self.first_row();

        let mut outgoing: Vec<Vec<(usize, usize, T)>> = vec![Vec::new(); self.comm.size()];
        for i in 0..self.local_rows() {
            for (k, v) in self.offd.row_entries(i) {
                let g = self.col_map_offd[k];
                outgoing[self.col_part.owner(g)].push((g, first_row + i, v));
            }
        }
        let messages = outgoing
            .into_iter()
            .enumerate()
            .filter(|(_, m)| !m.is_empty())
            .collect();
        let received = self.comm.exchange(messages)?;

        let diag_t = self.diag.transpose();
        let new_first_row = self.col_part.starts()[rank];
        let mut rows: Vec<Vec<(usize, T)>> = (0..diag_t.num_rows)
            .map(|j| {
                diag_t
                    .row_entries(j)
                    .map(|(i, v)| (i + first_row, v))
                    .collect()
            })
            .collect();
        for (_, triplets) in received {
            for (g_row, g_col, v) in triplets {
                rows[g_row - new_first_row].push((g_col, v));
            }
        }

        Self::from_global_rows(
            Arc::clone(&self.comm),
            self.col_part.clone(),
            self.row_part.clone(),
            rows,
        )
    }

    /// Collective: `A B`. The rows of `B` matching this matrix's offd columns are fetched
    /// through this matrix's halo plan.
    pub fn matmul(&self, b: &Self) -> Result<Self, CommError> {
        debug_assert_eq!(self.col_part, b.row_part);
        let remote_rows = self.exchange_with(|i| b.global_row(i))?;
        let local_rows: Vec<Vec<(usize, T)>> =
            (0..b.local_rows()).map(|i| b.global_row(i)).collect();

        let rows = (0..self.local_rows())
            .map(|i| {
                let mut acc: Vec<(usize, T)> = Vec::new();
                for (j, a) in self.diag.row_entries(i) {
                    acc.extend(local_rows[j].iter().map(|&(g, bv)| (g, a * bv)));
                }
                for (k, a) in self.offd.row_entries(i) {
                    acc.extend(remote_rows[k].iter().map(|&(g, bv)| (g, a * bv)));
                }
                acc
            })
            .collect();

        Self::from_global_rows(
            Arc::clone(&self.comm),
            self.row_part.clone(),
            b.col_part.clone(),
            rows,
        )
    }

    /// Collective: `alpha A + beta B` for matrices with identical partitions
    pub fn add(alpha: T, a: &Self, beta: T, b: &Self) -> Result<Self, CommError> {
        debug_assert_eq!(a.row_part, b.row_part);
        debug_assert_eq!(a.col_part, b.col_part);
        let rows = (0..a.local_rows())
            .map(|i| {
                a.global_row(i)
                    .into_iter()
                    .map(|(g, v)| (g, alpha * v))
                    .chain(b.global_row(i).into_iter().map(|(g, v)| (g, beta * v)))
                    .collect()
            })
            .collect();
        Self::from_global_rows(
            Arc::clone(&a.comm),
            a.row_part.clone(),
            a.col_part.clone(),
            rows,
        )
    }

    /// Scale every entry
    pub fn scale(&mut self, alpha: T) {
        self.diag.scale(alpha);
        self.offd.scale(alpha);
    }

    /// Collective: rebuild keeping only the entries for which `keep(local row, global col,
    /// value)` holds
    pub fn filter_entries<F>(&self, keep: F) -> Result<Self, CommError>
    where
        F: Fn(usize, usize, T) -> bool,
    {
        let rows = (0..self.local_rows())
            .map(|i| {
                self.global_row(i)
                    .into_iter()
                    .filter(|&(g, v)| keep(i, g, v))
                    .collect()
            })
            .collect();
        Self::from_global_rows(
            Arc::clone(&self.comm),
            self.row_part.clone(),
            self.col_part.clone(),
            rows,
        )
    }

    /// Collective: the whole matrix as serial CSR on every rank
    pub fn gather_serial(&self) -> Result<CsrMatrix<T>, CommError> {
        let local: Vec<Vec<(usize, T)>> =
            (0..self.local_rows()).map(|i| self.global_row(i)).collect();
        let gathered = self.comm.all_gather(local)?;

        let mut builder = CsrBuilder::with_capacity(
            self.global_rows(),
            self.global_cols(),
            gathered.iter().flatten().map(Vec::len).sum(),
        );
        for row in gathered.into_iter().flatten() {
            builder.add_row_entries(row);
        }
        Ok(builder.finish())
    }

    /// Collective: the whole matrix as a dense array on every rank (small problems)
    pub fn to_global_dense(&self) -> Result<Array2<T>, CommError> {
        Ok(self.gather_serial()?.to_dense())
    }
}

/// Sort a row by column and sum duplicate columns
fn merge_sorted<T: ComplexField>(mut row: Vec<(usize, T)>) -> Vec<(usize, T)> {
    row.sort_by_key(|&(g, _)| g);
    let mut merged: Vec<(usize, T)> = Vec::with_capacity(row.len());
    for (g, v) in row {
        match merged.last_mut() {
            Some((last, acc)) if *last == g => *acc += v,
            _ => merged.push((g, v)),
        }
    }
    merged
}
