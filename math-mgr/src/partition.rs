//! Row ownership and marker-driven global numbering
//!
//! A [`Partition`] records where each rank's contiguous block of rows (or columns) starts.
//! [`global_range`] derives a fresh global numbering for the rows carrying a given marker
//! value, which is how coarse and fine point sets get their own index spaces.

use crate::comm::{CommError, CommExt, Communicator};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Marker value of a coarse point
pub const C_PT: i32 = 1;
/// Marker value of a fine point
pub const F_PT: i32 = -1;

/// Coarse points carry a positive marker
#[inline]
pub fn is_coarse(marker: i32) -> bool {
    marker > 0
}

/// Contiguous row ownership: rank `p` owns `[starts[p], starts[p + 1])`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    starts: Vec<usize>,
}

impl Partition {
    /// Build from explicit start offsets (`size + 1` entries, non-decreasing)
    pub fn from_starts(starts: Vec<usize>) -> Self {
        debug_assert!(!starts.is_empty());
        debug_assert!(starts.windows(2).all(|w| w[0] <= w[1]));
        Self { starts }
    }

    /// Collective: every rank contributes the number of rows it owns
    pub fn from_local_count(comm: &dyn Communicator, local: usize) -> Result<Self, CommError> {
        let counts = comm.all_gather(local)?;
        let mut starts = Vec::with_capacity(counts.len() + 1);
        starts.push(0);
        for c in counts {
            let last = starts[starts.len() - 1];
            starts.push(last + c);
        }
        Ok(Self { starts })
    }

    /// Split `n` rows as evenly as possible over `size` ranks, lower ranks taking the remainder
    pub fn uniform(n: usize, size: usize) -> Self {
        let base = n / size;
        let extra = n % size;
        let mut starts = Vec::with_capacity(size + 1);
        starts.push(0);
        for p in 0..size {
            let last = starts[p];
            starts.push(last + base + usize::from(p < extra));
        }
        Self { starts }
    }

    /// Start offsets, one per rank plus the total
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Number of ranks
    pub fn num_ranks(&self) -> usize {
        self.starts.len() - 1
    }

    /// Global rows owned by `rank`
    pub fn local_range(&self, rank: usize) -> Range<usize> {
        self.starts[rank]..self.starts[rank + 1]
    }

    /// Number of rows owned by `rank`
    pub fn local_len(&self, rank: usize) -> usize {
        self.starts[rank + 1] - self.starts[rank]
    }

    /// Global row count
    pub fn total(&self) -> usize {
        self.starts[self.starts.len() - 1]
    }

    /// Rank owning global index `global`
    pub fn owner(&self, global: usize) -> usize {
        // Last rank whose start is <= global; empty ranks are skipped
        self.starts.partition_point(|&s| s <= global) - 1
    }
}

/// Global numbering of the local rows whose marker equals `value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalRange {
    /// Matching rows on this rank
    pub local_count: usize,
    /// `[start, end)` of this rank's matching rows in the new numbering
    pub range: Range<usize>,
    /// Matching rows over all ranks
    pub total: usize,
}

/// Count rows with `marker[i] == value`, scan the counts across ranks and broadcast the
/// grand total from the last rank.
pub fn global_range(
    comm: &dyn Communicator,
    marker: &[i32],
    value: i32,
) -> Result<GlobalRange, CommError> {
    let local_count = marker.iter().filter(|&&m| m == value).count();
    counted_range(comm, local_count)
}

/// [`global_range`] for the coarse class (`marker > 0`)
pub fn coarse_range(comm: &dyn Communicator, marker: &[i32]) -> Result<GlobalRange, CommError> {
    let local_count = marker.iter().filter(|&&m| is_coarse(m)).count();
    counted_range(comm, local_count)
}

/// [`global_range`] for the fine class (`marker <= 0`)
pub fn fine_range(comm: &dyn Communicator, marker: &[i32]) -> Result<GlobalRange, CommError> {
    let local_count = marker.iter().filter(|&&m| !is_coarse(m)).count();
    counted_range(comm, local_count)
}

fn counted_range(comm: &dyn Communicator, local_count: usize) -> Result<GlobalRange, CommError> {
    let (start, _) = comm.exclusive_scan(local_count)?;
    let end = start + local_count;
    let total = comm.broadcast_from_last(end)?;
    Ok(GlobalRange {
        local_count,
        range: start..end,
        total,
    })
}
