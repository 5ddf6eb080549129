//! Error types
//!
//! Each subsystem has its own error enum; [`MgrError`] is what the solver surface returns
//! and wraps the others.

use crate::comm::CommError;
use crate::direct::LuError;
use thiserror::Error;

/// Errors reported by MGR setup, solve and the components it drives
#[derive(Error, Debug)]
pub enum MgrError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("communication failure: {0}")]
    Comm(#[from] CommError),

    #[error("direct solve failed: {0}")]
    Lu(#[from] LuError),

    #[error("solver has not been set up")]
    NotSetUp,

    #[error("solve has not been run")]
    NotSolved,

    #[error("no {what} solver registered and the default solver is disabled")]
    MissingSolver { what: &'static str },

    #[error("coarse grid at level {level} is empty")]
    EmptyCoarseGrid { level: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MgrError {
    /// Communication failures leave ranks out of step; the solve loop must not continue past them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MgrError::Comm(_))
    }
}

/// Check that a vector has the expected local length
pub(crate) fn check_len(expected: usize, got: usize) -> Result<(), MgrError> {
    if expected != got {
        return Err(MgrError::DimensionMismatch { expected, got });
    }
    Ok(())
}
