//! Distributed vector helpers
//!
//! Vectors are plain `Array1` holding this rank's entries; the helpers here add the
//! collective reductions and the marker-driven scatter/gather between a level vector and
//! its F- or C-subvector.

use crate::comm::{CommError, CommExt, Communicator};
use crate::partition::is_coarse;
use crate::traits::ComplexField;
use ndarray::Array1;
use num_traits::Float;

/// Collective: `Σ conj(x_i) y_i` over all ranks
pub fn global_dot<T: ComplexField>(
    comm: &dyn Communicator,
    x: &Array1<T>,
    y: &Array1<T>,
) -> Result<T, CommError> {
    let local = x
        .iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (a, b)| acc + a.conj() * *b);
    comm.all_reduce_sum(local)
}

/// Collective: Euclidean norm over all ranks
pub fn global_norm<T: ComplexField>(
    comm: &dyn Communicator,
    x: &Array1<T>,
) -> Result<T::Real, CommError> {
    let local = x
        .iter()
        .fold(<T::Real as num_traits::Zero>::zero(), |acc, v| acc + v.norm_sqr());
    Ok(comm.all_reduce_sum(local)?.sqrt())
}

fn same_class(marker: i32, point_type: i32) -> bool {
    is_coarse(marker) == is_coarse(point_type)
}

/// `to[i] = beta * to[i] + alpha * from[j]` where `i` runs over the rows of the class of
/// `point_type` and `j` counts them. Scatters a subvector back into the level vector.
pub fn scatter_add_by_marker<T: ComplexField>(
    alpha: T,
    from: &Array1<T>,
    beta: T,
    to: &mut Array1<T>,
    marker: &[i32],
    point_type: i32,
) {
    let mut j = 0;
    for (i, &m) in marker.iter().enumerate() {
        if same_class(m, point_type) {
            to[i] = beta * to[i] + alpha * from[j];
            j += 1;
        }
    }
}

/// `to[j] = beta * to[j] + alpha * from[i]` with the same indexing as
/// [`scatter_add_by_marker`]. Gathers a subvector out of the level vector.
pub fn gather_add_by_marker<T: ComplexField>(
    alpha: T,
    from: &Array1<T>,
    beta: T,
    to: &mut Array1<T>,
    marker: &[i32],
    point_type: i32,
) {
    let mut j = 0;
    for (i, &m) in marker.iter().enumerate() {
        if same_class(m, point_type) {
            to[j] = beta * to[j] + alpha * from[i];
            j += 1;
        }
    }
}
