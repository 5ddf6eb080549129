//! Sparse matrix structures
//!
//! - [`CsrMatrix`]: rank-local Compressed Sparse Row storage
//! - [`ParCsrMatrix`]: row-distributed matrix built from two CSR blocks and a halo plan
//! - [`vector`]: reductions and marker-driven scatter/gather on distributed vectors

mod csr;
mod parcsr;
pub mod vector;

pub use csr::{CsrBuilder, CsrMatrix};
pub use parcsr::{CommPkg, ParCsrMatrix, ParCsrParts};
