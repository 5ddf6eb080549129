//! MGR configuration
//!
//! Every per-level knob has a global value and an optional `level_*` override array,
//! indexed by reduction level. Configurations are plain data: build them with
//! [`MgrConfigBuilder`], load them from JSON, or fill the struct and let
//! [`MgrConfig::validate`] check it (setup validates again).

use crate::amg::AmgConfig;
use crate::coarse::{CoarseGridMethod, NonGalerkinOrdering};
use crate::error::MgrError;
use crate::interp::{InterpType, RestrictType};
use crate::relax::{BlockRelaxMethod, RelaxType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How the C points of each reduction level are chosen.
///
/// The labelled variants give every row a label; `levels[k]` lists the labels that stay
/// coarse at reduction level `k`. Labels dropped at one level cannot come back later.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CpointSelection {
    /// Ruge-Stüben coarsening on every level
    #[default]
    Classical,
    /// Interleaved unknowns: row `g` has label `g % block_size`
    ByBlock {
        block_size: usize,
        levels: Vec<Vec<i32>>,
    },
    /// Contiguous unknowns: row `g` has the label `c` of the last `begin_indices[c] <= g`
    ByContiguousBlock {
        begin_indices: Vec<usize>,
        levels: Vec<Vec<i32>>,
    },
    /// Explicit labels for this rank's rows
    ByPointMarker {
        markers: Vec<i32>,
        levels: Vec<Vec<i32>>,
    },
}

impl CpointSelection {
    /// Coarse label lists, empty for classical coarsening
    pub fn level_labels(&self) -> &[Vec<i32>] {
        match self {
            Self::Classical => &[],
            Self::ByBlock { levels, .. }
            | Self::ByContiguousBlock { levels, .. }
            | Self::ByPointMarker { levels, .. } => levels,
        }
    }
}

/// F-relaxation strategy of a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FRelaxMethod {
    /// Sweeps of a point smoother on the F rows
    #[default]
    SingleLevel,
    /// AMG V-cycles on `A_FF`
    MultiLevel,
}

/// Where the global smoother runs relative to the coarse-grid correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlobalSmoothCycle {
    #[default]
    Pre,
    Post,
}

impl GlobalSmoothCycle {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Pre),
            2 => Some(Self::Post),
            _ => None,
        }
    }
}

/// Complete MGR configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MgrConfig {
    /// Upper bound on reduction levels
    pub max_coarse_levels: usize,
    /// Unknowns per physical block on the finest level
    pub block_size: usize,
    pub cpoint_selection: CpointSelection,
    /// Global rows forced coarse on every level
    pub reserved_coarse_nodes: Vec<usize>,
    /// Reduction level at which only the reserved nodes stay coarse
    pub reserved_cpoints_level_to_keep: Option<usize>,
    /// Labelled rows not kept coarse become F points (otherwise classical coarsening decides)
    pub non_c_points_to_f: bool,

    /// Point smoother of single-level F-relaxation
    pub relax_type: RelaxType,
    pub level_f_relax_type: Option<Vec<RelaxType>>,
    /// Weight of the point smoothers
    pub relax_weight: f64,
    pub num_relax_sweeps: usize,
    pub level_num_relax_sweeps: Option<Vec<usize>>,
    pub f_relax_method: FRelaxMethod,
    pub level_f_relax_method: Option<Vec<FRelaxMethod>>,
    /// AMG used by multilevel F-relaxation
    pub f_relax_amg: AmgConfig,

    pub coarse_grid_method: CoarseGridMethod,
    pub level_coarse_grid_method: Option<Vec<CoarseGridMethod>>,
    pub non_galerkin_ordering: NonGalerkinOrdering,
    /// Off-block entries kept per row of the non-Galerkin correction (0 keeps all)
    pub non_galerkin_max_elmts: usize,
    pub level_non_galerkin_max_elmts: Option<Vec<usize>>,
    /// Relative drop threshold applied to every coarse operator (0 disables)
    pub truncate_coarse_grid_threshold: f64,

    pub interp_type: InterpType,
    pub level_interp_type: Option<Vec<InterpType>>,
    pub restrict_type: RestrictType,
    pub level_restrict_type: Option<Vec<RestrictType>>,
    pub num_interp_sweeps: usize,
    pub num_restrict_sweeps: usize,
    /// Relative drop threshold of interpolation (0 disables)
    pub trunc_factor: f64,
    /// Entries kept per interpolation row (0 keeps all)
    pub p_max_elmts: usize,
    pub level_p_max_elmts: Option<Vec<usize>>,
    /// Block size of block-Jacobi operators (0 derives it from the labels)
    pub block_jacobi_block_size: usize,

    pub global_smooth_type: BlockRelaxMethod,
    pub level_global_smooth_type: Option<Vec<BlockRelaxMethod>>,
    pub max_global_smooth_iters: usize,
    pub level_max_global_smooth_iters: Option<Vec<usize>>,
    pub global_smooth_cycle: GlobalSmoothCycle,

    pub max_iter: usize,
    pub tol: f64,
    /// 0 silent, 1 setup summary and residual per cycle
    pub print_level: u32,
    /// Keep the residual history when > 0
    pub logging: u32,
    /// Fall back to AMG when no coarse-grid solver was registered
    pub use_default_coarse_solver: bool,
    /// AMG used as the default coarse-grid solver
    pub coarse_solver: AmgConfig,
}

impl Default for MgrConfig {
    fn default() -> Self {
        Self {
            max_coarse_levels: 10,
            block_size: 1,
            cpoint_selection: CpointSelection::default(),
            reserved_coarse_nodes: Vec::new(),
            reserved_cpoints_level_to_keep: None,
            non_c_points_to_f: true,
            relax_type: RelaxType::Jacobi,
            level_f_relax_type: None,
            relax_weight: 1.0,
            num_relax_sweeps: 1,
            level_num_relax_sweeps: None,
            f_relax_method: FRelaxMethod::SingleLevel,
            level_f_relax_method: None,
            f_relax_amg: AmgConfig::default(),
            coarse_grid_method: CoarseGridMethod::Galerkin,
            level_coarse_grid_method: None,
            non_galerkin_ordering: NonGalerkinOrdering::Interleaved,
            non_galerkin_max_elmts: 0,
            level_non_galerkin_max_elmts: None,
            truncate_coarse_grid_threshold: 0.0,
            interp_type: InterpType::DiagonalScaled,
            level_interp_type: None,
            restrict_type: RestrictType::Injection,
            level_restrict_type: None,
            num_interp_sweeps: 0,
            num_restrict_sweeps: 0,
            trunc_factor: 0.0,
            p_max_elmts: 0,
            level_p_max_elmts: None,
            block_jacobi_block_size: 0,
            global_smooth_type: BlockRelaxMethod::Jacobi,
            level_global_smooth_type: None,
            max_global_smooth_iters: 0,
            level_max_global_smooth_iters: None,
            global_smooth_cycle: GlobalSmoothCycle::Pre,
            max_iter: 20,
            tol: 1e-6,
            print_level: 0,
            logging: 0,
            use_default_coarse_solver: true,
            coarse_solver: AmgConfig::default(),
        }
    }
}

fn at_level<X: Copy>(global: X, overrides: &Option<Vec<X>>, level: usize) -> X {
    overrides
        .as_ref()
        .and_then(|v| v.get(level).copied())
        .unwrap_or(global)
}

fn invalid(msg: impl Into<String>) -> MgrError {
    MgrError::InvalidArgument(msg.into())
}

impl MgrConfig {
    pub fn builder() -> MgrConfigBuilder {
        MgrConfigBuilder::new()
    }

    /// Parse and validate a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, MgrError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, MgrError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Number of reduction levels setup will attempt
    pub fn num_reduction_levels(&self) -> usize {
        match self.cpoint_selection {
            CpointSelection::Classical => self.max_coarse_levels,
            _ => self
                .max_coarse_levels
                .min(self.cpoint_selection.level_labels().len()),
        }
    }

    pub fn f_relax_type_at(&self, level: usize) -> RelaxType {
        at_level(self.relax_type, &self.level_f_relax_type, level)
    }

    pub fn num_relax_sweeps_at(&self, level: usize) -> usize {
        at_level(self.num_relax_sweeps, &self.level_num_relax_sweeps, level)
    }

    pub fn f_relax_method_at(&self, level: usize) -> FRelaxMethod {
        at_level(self.f_relax_method, &self.level_f_relax_method, level)
    }

    pub fn coarse_grid_method_at(&self, level: usize) -> CoarseGridMethod {
        at_level(self.coarse_grid_method, &self.level_coarse_grid_method, level)
    }

    pub fn non_galerkin_max_elmts_at(&self, level: usize) -> usize {
        at_level(
            self.non_galerkin_max_elmts,
            &self.level_non_galerkin_max_elmts,
            level,
        )
    }

    pub fn interp_type_at(&self, level: usize) -> InterpType {
        at_level(self.interp_type, &self.level_interp_type, level)
    }

    pub fn restrict_type_at(&self, level: usize) -> RestrictType {
        at_level(self.restrict_type, &self.level_restrict_type, level)
    }

    pub fn p_max_elmts_at(&self, level: usize) -> usize {
        at_level(self.p_max_elmts, &self.level_p_max_elmts, level)
    }

    pub fn global_smooth_type_at(&self, level: usize) -> BlockRelaxMethod {
        at_level(self.global_smooth_type, &self.level_global_smooth_type, level)
    }

    pub fn max_global_smooth_iters_at(&self, level: usize) -> usize {
        at_level(
            self.max_global_smooth_iters,
            &self.level_max_global_smooth_iters,
            level,
        )
    }

    /// Check sizes, label lists and override lengths
    pub fn validate(&self) -> Result<(), MgrError> {
        if self.block_size == 0 {
            return Err(invalid("block_size must be positive"));
        }
        if self.tol.is_nan() || self.tol < 0.0 {
            return Err(invalid(format!("tol must be non-negative, got {}", self.tol)));
        }
        if !(self.relax_weight > 0.0 && self.relax_weight.is_finite()) {
            return Err(invalid(format!(
                "relax_weight must be positive, got {}",
                self.relax_weight
            )));
        }
        if self.trunc_factor < 0.0 || self.truncate_coarse_grid_threshold < 0.0 {
            return Err(invalid("truncation thresholds must be non-negative"));
        }
        self.validate_selection()?;

        let levels = self.num_reduction_levels();
        let lengths = [
            ("level_f_relax_type", self.level_f_relax_type.as_ref().map(Vec::len)),
            ("level_num_relax_sweeps", self.level_num_relax_sweeps.as_ref().map(Vec::len)),
            ("level_f_relax_method", self.level_f_relax_method.as_ref().map(Vec::len)),
            ("level_coarse_grid_method", self.level_coarse_grid_method.as_ref().map(Vec::len)),
            (
                "level_non_galerkin_max_elmts",
                self.level_non_galerkin_max_elmts.as_ref().map(Vec::len),
            ),
            ("level_interp_type", self.level_interp_type.as_ref().map(Vec::len)),
            ("level_restrict_type", self.level_restrict_type.as_ref().map(Vec::len)),
            ("level_p_max_elmts", self.level_p_max_elmts.as_ref().map(Vec::len)),
            ("level_global_smooth_type", self.level_global_smooth_type.as_ref().map(Vec::len)),
            (
                "level_max_global_smooth_iters",
                self.level_max_global_smooth_iters.as_ref().map(Vec::len),
            ),
        ];
        if let Some((name, len)) = lengths
            .into_iter()
            .find_map(|(name, len)| len.filter(|&len| len < levels).map(|len| (name, len)))
        {
            return Err(invalid(format!(
                "{name} has {len} entries, {levels} reduction levels need one each"
            )));
        }

        match self.reserved_cpoints_level_to_keep {
            Some(keep) if keep >= levels.max(1) => Err(invalid(format!(
                "reserved_cpoints_level_to_keep {keep} is beyond the {levels} reduction levels"
            ))),
            _ => Ok(()),
        }
    }

    fn validate_selection(&self) -> Result<(), MgrError> {
        let num_labels = match &self.cpoint_selection {
            CpointSelection::Classical => return Ok(()),
            CpointSelection::ByBlock { block_size, .. } => {
                if *block_size == 0 {
                    return Err(invalid("C-point block size must be positive"));
                }
                Some(*block_size)
            }
            CpointSelection::ByContiguousBlock { begin_indices, .. } => {
                if begin_indices.is_empty() || !begin_indices.windows(2).all(|w| w[0] < w[1]) {
                    return Err(invalid(
                        "begin_indices must be non-empty and strictly increasing",
                    ));
                }
                Some(begin_indices.len())
            }
            CpointSelection::ByPointMarker { .. } => None,
        };

        let levels = self.cpoint_selection.level_labels();
        if levels.is_empty() {
            return Err(invalid("C-point selection needs at least one level"));
        }
        for (k, labels) in levels.iter().enumerate() {
            if let Some(n) = num_labels {
                if let Some(bad) = labels.iter().find(|&&l| l < 0 || l as usize >= n) {
                    return Err(invalid(format!("level {k}: label {bad} outside 0..{n}")));
                }
            }
            if k > 0 {
                if let Some(bad) = labels.iter().find(|l| !levels[k - 1].contains(l)) {
                    return Err(invalid(format!(
                        "level {k}: label {bad} is not coarse on level {}",
                        k - 1
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`MgrConfig`], validated once by [`MgrConfigBuilder::build`]
///
/// # Example
///
/// ```ignore
/// use math_audio_mgr::{CoarseGridMethod, InterpType, MgrConfig};
///
/// let config = MgrConfig::builder()
///     .max_coarse_levels(2)
///     .interp_type(InterpType::DiagonalScaled)
///     .coarse_grid_method(CoarseGridMethod::from_code(1).unwrap())
///     .tol(1e-8)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MgrConfigBuilder {
    cfg: MgrConfig,
}

impl MgrConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn max_coarse_levels(mut self, v: usize) -> Self {
        self.cfg.max_coarse_levels = v;
        self
    }
    pub fn block_size(mut self, v: usize) -> Self {
        self.cfg.block_size = v;
        self
    }
    /// Interleaved labels `g % block_size`; `levels[k]` stay coarse on level `k`
    pub fn cpoints_by_block(mut self, block_size: usize, levels: Vec<Vec<i32>>) -> Self {
        self.cfg.block_size = block_size;
        self.cfg.cpoint_selection = CpointSelection::ByBlock { block_size, levels };
        self
    }
    pub fn cpoints_by_contiguous_block(
        mut self,
        begin_indices: Vec<usize>,
        levels: Vec<Vec<i32>>,
    ) -> Self {
        self.cfg.cpoint_selection = CpointSelection::ByContiguousBlock {
            begin_indices,
            levels,
        };
        self
    }
    pub fn cpoints_by_point_marker(mut self, markers: Vec<i32>, levels: Vec<Vec<i32>>) -> Self {
        self.cfg.cpoint_selection = CpointSelection::ByPointMarker { markers, levels };
        self
    }
    pub fn reserved_coarse_nodes(mut self, v: Vec<usize>) -> Self {
        self.cfg.reserved_coarse_nodes = v;
        self
    }
    pub fn reserved_cpoints_level_to_keep(mut self, v: usize) -> Self {
        self.cfg.reserved_cpoints_level_to_keep = Some(v);
        self
    }
    pub fn non_c_points_to_f(mut self, v: bool) -> Self {
        self.cfg.non_c_points_to_f = v;
        self
    }
    pub fn relax_type(mut self, v: RelaxType) -> Self {
        self.cfg.relax_type = v;
        self
    }
    pub fn level_f_relax_type(mut self, v: Vec<RelaxType>) -> Self {
        self.cfg.level_f_relax_type = Some(v);
        self
    }
    pub fn relax_weight(mut self, v: f64) -> Self {
        self.cfg.relax_weight = v;
        self
    }
    pub fn num_relax_sweeps(mut self, v: usize) -> Self {
        self.cfg.num_relax_sweeps = v;
        self
    }
    pub fn level_num_relax_sweeps(mut self, v: Vec<usize>) -> Self {
        self.cfg.level_num_relax_sweeps = Some(v);
        self
    }
    pub fn f_relax_method(mut self, v: FRelaxMethod) -> Self {
        self.cfg.f_relax_method = v;
        self
    }
    pub fn level_f_relax_method(mut self, v: Vec<FRelaxMethod>) -> Self {
        self.cfg.level_f_relax_method = Some(v);
        self
    }
    pub fn f_relax_amg(mut self, v: AmgConfig) -> Self {
        self.cfg.f_relax_amg = v;
        self
    }
    pub fn coarse_grid_method(mut self, v: CoarseGridMethod) -> Self {
        self.cfg.coarse_grid_method = v;
        self
    }
    pub fn level_coarse_grid_method(mut self, v: Vec<CoarseGridMethod>) -> Self {
        self.cfg.level_coarse_grid_method = Some(v);
        self
    }
    pub fn non_galerkin_ordering(mut self, v: NonGalerkinOrdering) -> Self {
        self.cfg.non_galerkin_ordering = v;
        self
    }
    pub fn non_galerkin_max_elmts(mut self, v: usize) -> Self {
        self.cfg.non_galerkin_max_elmts = v;
        self
    }
    pub fn truncate_coarse_grid_threshold(mut self, v: f64) -> Self {
        self.cfg.truncate_coarse_grid_threshold = v;
        self
    }
    pub fn interp_type(mut self, v: InterpType) -> Self {
        self.cfg.interp_type = v;
        self
    }
    pub fn level_interp_type(mut self, v: Vec<InterpType>) -> Self {
        self.cfg.level_interp_type = Some(v);
        self
    }
    pub fn restrict_type(mut self, v: RestrictType) -> Self {
        self.cfg.restrict_type = v;
        self
    }
    pub fn level_restrict_type(mut self, v: Vec<RestrictType>) -> Self {
        self.cfg.level_restrict_type = Some(v);
        self
    }
    pub fn num_interp_sweeps(mut self, v: usize) -> Self {
        self.cfg.num_interp_sweeps = v;
        self
    }
    pub fn num_restrict_sweeps(mut self, v: usize) -> Self {
        self.cfg.num_restrict_sweeps = v;
        self
    }
    pub fn trunc_factor(mut self, v: f64) -> Self {
        self.cfg.trunc_factor = v;
        self
    }
    pub fn p_max_elmts(mut self, v: usize) -> Self {
        self.cfg.p_max_elmts = v;
        self
    }
    pub fn block_jacobi_block_size(mut self, v: usize) -> Self {
        self.cfg.block_jacobi_block_size = v;
        self
    }
    pub fn global_smooth_type(mut self, v: BlockRelaxMethod) -> Self {
        self.cfg.global_smooth_type = v;
        self
    }
    pub fn max_global_smooth_iters(mut self, v: usize) -> Self {
        self.cfg.max_global_smooth_iters = v;
        self
    }
    pub fn level_max_global_smooth_iters(mut self, v: Vec<usize>) -> Self {
        self.cfg.level_max_global_smooth_iters = Some(v);
        self
    }
    pub fn global_smooth_cycle(mut self, v: GlobalSmoothCycle) -> Self {
        self.cfg.global_smooth_cycle = v;
        self
    }
    pub fn max_iter(mut self, v: usize) -> Self {
        self.cfg.max_iter = v;
        self
    }
    pub fn tol(mut self, v: f64) -> Self {
        self.cfg.tol = v;
        self
    }
    pub fn print_level(mut self, v: u32) -> Self {
        self.cfg.print_level = v;
        self
    }
    pub fn logging(mut self, v: u32) -> Self {
        self.cfg.logging = v;
        self
    }
    pub fn use_default_coarse_solver(mut self, v: bool) -> Self {
        self.cfg.use_default_coarse_solver = v;
        self
    }
    pub fn coarse_solver(mut self, v: AmgConfig) -> Self {
        self.cfg.coarse_solver = v;
        self
    }

    /// Builds and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MgrError::InvalidArgument`] for zero sizes, malformed label lists or
    /// override arrays shorter than the number of reduction levels.
    pub fn build(self) -> Result<MgrConfig, MgrError> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MgrConfig::builder().build().unwrap();
        assert_eq!(config.max_coarse_levels, 10);
        assert_eq!(config.interp_type, InterpType::DiagonalScaled);
        assert_eq!(config.restrict_type, RestrictType::Injection);
        assert_eq!(config.max_iter, 20);
        assert!(config.non_c_points_to_f);
        assert_eq!(config.num_reduction_levels(), 10);
    }

    #[test]
    fn test_level_overrides() {
        let config = MgrConfig::builder()
            .max_coarse_levels(2)
            .interp_type(InterpType::Jacobi)
            .level_interp_type(vec![InterpType::BlockJacobi, InterpType::Injection])
            .build()
            .unwrap();
        assert_eq!(config.interp_type_at(0), InterpType::BlockJacobi);
        assert_eq!(config.interp_type_at(1), InterpType::Injection);
        assert_eq!(config.restrict_type_at(1), RestrictType::Injection);
    }

    #[test]
    fn test_short_override_rejected() {
        let err = MgrConfig::builder()
            .max_coarse_levels(3)
            .level_num_relax_sweeps(vec![1, 2])
            .build()
            .unwrap_err();
        assert!(matches!(err, MgrError::InvalidArgument(msg) if msg.contains("level_num_relax_sweeps")));
    }

    #[test]
    fn test_selection_limits_reduction_levels() {
        let config = MgrConfig::builder()
            .cpoints_by_block(3, vec![vec![0, 1], vec![0]])
            .level_interp_type(vec![InterpType::Jacobi; 2])
            .build()
            .unwrap();
        assert_eq!(config.num_reduction_levels(), 2);
        assert_eq!(config.block_size, 3);
    }

    #[test]
    fn test_invalid_selections() {
        let out_of_range = MgrConfig::builder().cpoints_by_block(2, vec![vec![2]]).build();
        assert!(matches!(out_of_range, Err(MgrError::InvalidArgument(_))));

        let resurrected = MgrConfig::builder()
            .cpoints_by_block(3, vec![vec![0], vec![0, 1]])
            .build();
        assert!(matches!(resurrected, Err(MgrError::InvalidArgument(_))));

        let unsorted = MgrConfig::builder()
            .cpoints_by_contiguous_block(vec![0, 8, 4], vec![vec![0]])
            .build();
        assert!(matches!(unsorted, Err(MgrError::InvalidArgument(_))));

        let zero = MgrConfig::builder().block_size(0).build();
        assert!(matches!(zero, Err(MgrError::InvalidArgument(_))));
    }

    #[test]
    fn test_json_round_trip_with_partial_input() {
        let config = MgrConfig::from_json_str(
            r#"{
                "max_coarse_levels": 2,
                "coarse_grid_method": {"NonGalerkin": "BlockDiagonal"},
                "cpoint_selection": {"ByBlock": {"block_size": 2, "levels": [[0]]}},
                "tol": 1e-8
            }"#,
        )
        .unwrap();
        assert_eq!(config.num_reduction_levels(), 1);
        assert_eq!(config.coarse_grid_method.code(), 1);
        assert_eq!(config.relax_weight, 1.0);

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(MgrConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_json_errors() {
        assert!(matches!(
            MgrConfig::from_json_str("{ not json"),
            Err(MgrError::Config(_))
        ));
        assert!(matches!(
            MgrConfig::from_json_file("/nonexistent/mgr.json"),
            Err(MgrError::Io(_))
        ));
    }
}
