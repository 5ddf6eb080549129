//! Classical coarsening and interpolation
//!
//! - Strength of connection by magnitude: `|a_ij| >= θ · max_{k≠i} |a_ik|`
//! - Ruge-Stüben coarsening, performed independently on every rank over the strong
//!   connections inside its diagonal block
//! - Direct, standard and extended interpolation, with off-process neighbours resolved
//!   through the halo plan of `A`

use crate::comm::CommError;
use crate::parallel::parallel_map_indexed;
use crate::partition::{C_PT, F_PT, Partition, coarse_range, is_coarse};
use crate::sparse::ParCsrMatrix;
use crate::traits::ComplexField;
use num_traits::{Float, Zero};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Classical interpolation formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassicalInterp {
    /// `w_ij = -a_ij / a_ii` over strong C neighbours
    Direct,
    /// Direct weights rescaled so the row sum of `A` is interpolated exactly
    #[default]
    Standard,
    /// Adds distance-two contributions through strong F neighbours
    Extended,
}

/// Strong connections of every local row.
///
/// Column `j < num_local` is a diag column; `num_local + k` is offd column `k`.
#[derive(Debug, Clone)]
pub struct Strength {
    rows: Vec<Vec<usize>>,
    num_local: usize,
}

impl Strength {
    /// Strong columns of local row `i`, in the extended numbering
    pub fn row(&self, i: usize) -> &[usize] {
        &self.rows[i]
    }

    /// Local rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Is the extended column a diag column?
    pub fn is_local(&self, col: usize) -> bool {
        col < self.num_local
    }
}

/// Strong connections of every local row of a square matrix
pub fn strength_of_connection<T: ComplexField>(a: &ParCsrMatrix<T>, theta: f64) -> Strength {
    let n = a.local_rows();
    let theta = T::real(theta);
    let rows = parallel_map_indexed(n, |i| {
        let off_diag = || {
            a.diag()
                .row_entries(i)
                .filter(move |&(j, _)| j != i)
                .chain(a.offd().row_entries(i).map(move |(k, v)| (n + k, v)))
        };

        let max_off_diag = off_diag().fold(T::Real::zero(), |acc, (_, v)| acc.max(v.norm()));
        if max_off_diag <= T::Real::zero() {
            return Vec::new();
        }

        let threshold = theta * max_off_diag;
        off_diag()
            .filter(|(_, v)| v.norm() >= threshold)
            .map(|(j, _)| j)
            .collect()
    });

    Strength { rows, num_local: n }
}

/// Ruge-Stüben first pass on the rank-local strong connections.
///
/// Points flagged in `forced_coarse` start as C points. The others are visited by
/// decreasing influence `λ_i = |{j : i ∈ S_j}|`; an undecided point becomes C and every
/// undecided point strongly depending on it becomes F. Returns a CF marker.
pub fn ruge_stuben(strength: &Strength, forced_coarse: Option<&[bool]>) -> Vec<i32> {
    const UNDECIDED: i32 = 0;
    let n = strength.num_rows();
    let mut marker = vec![UNDECIDED; n];

    // dependents[i]: local points j with i ∈ S_j
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for j in 0..n {
        for &i in strength.row(j).iter().filter(|&&i| strength.is_local(i)) {
            dependents[i].push(j);
        }
    }
    let mut lambda: Vec<usize> = dependents.iter().map(Vec::len).collect();

    let make_coarse = |i: usize, marker: &mut [i32], lambda: &mut [usize]| {
        marker[i] = C_PT;
        for &j in &dependents[i] {
            if marker[j] != UNDECIDED {
                continue;
            }
            marker[j] = F_PT;
            for &k in strength.row(j).iter().filter(|&&k| strength.is_local(k)) {
                if marker[k] == UNDECIDED {
                    lambda[k] = lambda[k].saturating_sub(1);
                }
            }
        }
    };

    if let Some(forced) = forced_coarse {
        for i in (0..n).filter(|&i| forced[i]) {
            make_coarse(i, &mut marker, &mut lambda);
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| lambda[y].cmp(&lambda[x]));
    for i in order {
        if marker[i] == UNDECIDED {
            make_coarse(i, &mut marker, &mut lambda);
        }
    }

    marker
}

/// One stored entry of a row, with everything interpolation needs about its column
#[derive(Debug, Clone)]
struct Entry<T> {
    col: usize,
    value: T,
    strong: bool,
    coarse: Option<usize>,
}

/// A row as seen by the interpolation of its neighbours
#[derive(Debug, Clone)]
struct RowSummary<T> {
    row: usize,
    diag: T,
    entries: Vec<Entry<T>>,
}

/// Collective: classical prolongation for the CF splitting `cf_marker`.
///
/// Columns of `P` are numbered by the global coarse numbering of `cf_marker`. C rows get a
/// unit entry in their own coarse column; F rows without strong C neighbours stay empty.
pub fn classical_interpolation<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    strength: &Strength,
    cf_marker: &[i32],
    kind: ClassicalInterp,
) -> Result<ParCsrMatrix<T>, CommError> {
    let comm = Arc::clone(a.comm());
    let n = a.local_rows();
    let first_row = a.first_row();

    let coarse = coarse_range(comm.as_ref(), cf_marker)?;
    let mut coarse_index: Vec<Option<usize>> = vec![None; n];
    let mut next = coarse.range.start;
    for (i, &m) in cf_marker.iter().enumerate() {
        if is_coarse(m) {
            coarse_index[i] = Some(next);
            next += 1;
        }
    }
    let coarse_halo = a.exchange_halo(&coarse_index)?;

    let summaries: Vec<RowSummary<T>> = (0..n)
        .map(|i| {
            let strong = strength.row(i);
            let diag_entries = a
                .diag()
                .row_entries(i)
                .filter(|&(j, _)| j != i)
                .map(|(j, v)| Entry {
                    col: first_row + j,
                    value: v,
                    strong: strong.contains(&j),
                    coarse: coarse_index[j],
                });
            let offd_entries = a.offd().row_entries(i).map(|(k, v)| Entry {
                col: a.col_map_offd()[k],
                value: v,
                strong: strong.contains(&(n + k)),
                coarse: coarse_halo[k],
            });
            RowSummary {
                row: first_row + i,
                diag: a.diag().get(i, i),
                entries: diag_entries.chain(offd_entries).collect(),
            }
        })
        .collect();

    // Distance-two weights need the rows of off-process F neighbours
    let remote: HashMap<usize, RowSummary<T>> = if kind == ClassicalInterp::Extended {
        a.exchange_with(|i| summaries[i].clone())?
            .into_iter()
            .map(|r| (r.row, r))
            .collect()
    } else {
        HashMap::new()
    };
    let neighbour_row = |col: usize| {
        if (first_row..first_row + n).contains(&col) {
            Some(&summaries[col - first_row])
        } else {
            remote.get(&col)
        }
    };

    let tiny = T::tiny();
    let rows: Vec<Vec<(usize, T)>> = (0..n)
        .map(|i| {
            if let Some(c) = coarse_index[i] {
                return vec![(c, T::one())];
            }
            let row = &summaries[i];
            if row.diag.norm() <= tiny {
                return Vec::new();
            }
            let diag_inv = row.diag.inv();

            let mut weights: Vec<(usize, T)> = row
                .entries
                .iter()
                .filter(|e| e.strong)
                .filter_map(|e| e.coarse.map(|c| (c, -e.value * diag_inv)))
                .collect();

            match kind {
                ClassicalInterp::Direct => {}
                ClassicalInterp::Standard => {
                    let (strong_c_sum, other_sum) =
                        row.entries
                            .iter()
                            .fold((T::zero(), T::zero()), |(c_sum, o_sum), e| {
                                if e.strong && e.coarse.is_some() {
                                    (c_sum + e.value, o_sum)
                                } else {
                                    (c_sum, o_sum + e.value)
                                }
                            });
                    if strong_c_sum.norm() > tiny {
                        let scale = T::one() + other_sum * strong_c_sum.inv();
                        for (_, w) in &mut weights {
                            *w *= scale;
                        }
                    }
                }
                ClassicalInterp::Extended => {
                    for e in row.entries.iter().filter(|e| e.strong && e.coarse.is_none()) {
                        let Some(k_row) = neighbour_row(e.col) else {
                            continue;
                        };
                        if k_row.diag.norm() <= tiny {
                            continue;
                        }
                        let factor = e.value * diag_inv * k_row.diag.inv();
                        for kj in k_row.entries.iter().filter(|kj| kj.strong) {
                            if let Some(c) = kj.coarse {
                                weights.push((c, factor * kj.value));
                            }
                        }
                    }
                }
            }
            weights
        })
        .collect();

    let col_part = Partition::from_local_count(comm.as_ref(), coarse.local_count)?;
    ParCsrMatrix::from_global_rows(comm, a.row_partition().clone(), col_part, rows)
}
