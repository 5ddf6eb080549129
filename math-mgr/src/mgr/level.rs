//! Per-level data of the MGR hierarchy and the C/F splitting of a level

use super::config::{CpointSelection, MgrConfig};
use crate::amg::AmgSolver;
use crate::classical::{ruge_stuben, strength_of_connection};
use crate::error::MgrError;
use crate::partition::{C_PT, F_PT, is_coarse};
use crate::relax::{BlockRelax, BlockRelaxMethod, RelaxType};
use crate::sparse::ParCsrMatrix;
use crate::traits::ComplexField;
use ndarray::Array1;

/// Strength threshold of the classical fallback coarsening
const CLASSICAL_STRONG_THRESHOLD: f64 = 0.25;

/// F-relaxation of one level
pub(crate) enum FRelax<T: ComplexField> {
    /// Point smoother restricted to the F rows
    Points { relax_type: RelaxType, sweeps: usize },
    /// AMG on `A_FF`
    Amg {
        a_ff: ParCsrMatrix<T>,
        solver: Box<AmgSolver<T>>,
        sweeps: usize,
    },
    /// User solver registered for this level, applied to `A_FF`
    User { a_ff: ParCsrMatrix<T>, sweeps: usize },
}

/// Global smoother of one level
pub(crate) struct GlobalSmoother<T: ComplexField> {
    pub relax: BlockRelax<T>,
    pub method: BlockRelaxMethod,
    pub iters: usize,
}

/// One reduction level: the operator, its splitting and the transfer operators to the
/// next coarser level
pub(crate) struct MgrLevel<T: ComplexField> {
    pub matrix: ParCsrMatrix<T>,
    pub cf_marker: Vec<i32>,
    pub prolongation: ParCsrMatrix<T>,
    pub restriction: ParCsrMatrix<T>,
    pub f_relax: FRelax<T>,
    pub global_smoother: Option<GlobalSmoother<T>>,
}

/// Coarsest level, solved by the coarse-grid solver
pub(crate) struct CoarseGrid<T: ComplexField> {
    pub matrix: ParCsrMatrix<T>,
    pub rhs: Option<Array1<T>>,
    pub solution: Option<Array1<T>>,
}

/// Row labels and reserved flags carried from one level to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowLabels {
    pub labels: Vec<i32>,
    pub reserved: Vec<bool>,
}

impl RowLabels {
    /// Labels of this rank's finest-level rows `[first_row, first_row + n)`
    pub fn finest(
        config: &MgrConfig,
        first_row: usize,
        n: usize,
        global_rows: usize,
    ) -> Result<Self, MgrError> {
        let labels = match &config.cpoint_selection {
            CpointSelection::Classical => vec![0; n],
            CpointSelection::ByBlock { block_size, .. } => (first_row..first_row + n)
                .map(|g| (g % block_size) as i32)
                .collect(),
            CpointSelection::ByContiguousBlock { begin_indices, .. } => (first_row
                ..first_row + n)
                .map(|g| begin_indices.partition_point(|&b| b <= g).saturating_sub(1) as i32)
                .collect(),
            CpointSelection::ByPointMarker { markers, .. } => {
                if markers.len() != n {
                    return Err(MgrError::InvalidArgument(format!(
                        "point marker array has {} entries for {n} local rows",
                        markers.len()
                    )));
                }
                markers.clone()
            }
        };

        if let Some(bad) = config
            .reserved_coarse_nodes
            .iter()
            .find(|&&g| g >= global_rows)
        {
            return Err(MgrError::InvalidArgument(format!(
                "reserved coarse node {bad} outside 0..{global_rows}"
            )));
        }
        let reserved = (first_row..first_row + n)
            .map(|g| config.reserved_coarse_nodes.contains(&g))
            .collect();

        Ok(Self { labels, reserved })
    }

    /// Labels of the rows that stay coarse, in coarse order
    pub fn coarsen(&self, cf_marker: &[i32]) -> Self {
        let keep = |i: &usize| is_coarse(cf_marker[*i]);
        Self {
            labels: (0..self.labels.len())
                .filter(keep)
                .map(|i| self.labels[i])
                .collect(),
            reserved: (0..self.reserved.len())
                .filter(keep)
                .map(|i| self.reserved[i])
                .collect(),
        }
    }
}

/// How one level decides its C points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Splitting<'a> {
    /// Only the reserved rows are coarse
    ReservedOnly,
    /// Rows whose label is listed are coarse; the rest are F
    Labels(&'a [i32]),
    /// Ruge-Stüben, with the listed labels and the reserved rows forced coarse
    Classical(Option<&'a [i32]>),
}

impl<'a> Splitting<'a> {
    /// Splitting of reduction level `level` out of `num_levels`
    pub fn for_level(
        config: &'a MgrConfig,
        level: usize,
        num_levels: usize,
        has_reserved: bool,
    ) -> Self {
        let last = level + 1 == num_levels;
        if has_reserved && (last || config.reserved_cpoints_level_to_keep == Some(level)) {
            return Self::ReservedOnly;
        }
        match config.cpoint_selection.level_labels().get(level) {
            Some(coarse) if config.non_c_points_to_f => Self::Labels(coarse),
            coarse => Self::Classical(coarse.map(Vec::as_slice)),
        }
    }
}

/// CF marker of one level
pub(crate) fn split_level<T: ComplexField>(
    a: &ParCsrMatrix<T>,
    rows: &RowLabels,
    splitting: Splitting<'_>,
) -> Vec<i32> {
    let mark = |c: bool| if c { C_PT } else { F_PT };
    match splitting {
        Splitting::ReservedOnly => rows.reserved.iter().map(|&r| mark(r)).collect(),
        Splitting::Labels(coarse) => rows
            .labels
            .iter()
            .zip(&rows.reserved)
            .map(|(l, &r)| mark(r || coarse.contains(l)))
            .collect(),
        Splitting::Classical(coarse) => {
            let forced: Vec<bool> = rows
                .labels
                .iter()
                .zip(&rows.reserved)
                .map(|(l, &r)| r || coarse.is_some_and(|c| c.contains(l)))
                .collect();
            let strength = strength_of_connection(a, CLASSICAL_STRONG_THRESHOLD);
            ruge_stuben(&strength, Some(forced.as_slice()))
        }
    }
}

/// Block sizes of a level: the whole system, its F part and its C part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LevelBlocks {
    pub system: usize,
    pub fine: usize,
    pub coarse: usize,
}

impl LevelBlocks {
    pub fn for_level(config: &MgrConfig, level: usize) -> Self {
        let blocks = match &config.cpoint_selection {
            CpointSelection::ByBlock { block_size, levels } => {
                let system = match level {
                    0 => *block_size,
                    k => levels.get(k - 1).map_or(1, Vec::len),
                };
                let coarse = levels.get(level).map_or(0, Vec::len);
                Self {
                    system,
                    fine: system.saturating_sub(coarse),
                    coarse,
                }
            }
            _ => Self {
                system: if level == 0 { config.block_size } else { 1 },
                fine: 1,
                coarse: 1,
            },
        };
        let fine = match config.block_jacobi_block_size {
            0 => blocks.fine,
            bs => bs,
        };
        Self {
            system: blocks.system.max(1),
            fine: fine.max(1),
            coarse: blocks.coarse.max(1),
        }
    }
}
