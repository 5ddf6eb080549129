//! Core traits for the multigrid reduction stack
//!
//! This module defines the two abstractions the rest of the crate is written against:
//! - [`ComplexField`]: Trait for scalar types (complex and real numbers)
//! - [`LevelSolver`]: Trait for solvers that can be plugged in as the coarse-grid
//!   solver or as the F-relaxation solver of an MGR level

use crate::error::MgrError;
use crate::sparse::ParCsrMatrix;
use ndarray::Array1;
use num_complex::{Complex32, Complex64};
use num_traits::{Float, NumAssign, One, ToPrimitive, Zero};
use std::fmt::Debug;
use std::ops::Neg;

/// Trait for scalar types that can be used in linear algebra operations.
///
/// This trait abstracts over real and complex number types, providing
/// a unified interface for operations like conjugation, norm computation,
/// and conversion from real values.
///
/// # Implementations
///
/// Provided for:
/// - `f64` (the common case for reservoir and Poisson-type systems)
/// - `f32`
/// - `Complex64`
/// - `Complex32`
pub trait ComplexField:
    NumAssign + Clone + Copy + Send + Sync + Debug + Zero + One + Neg<Output = Self> + 'static
{
    /// The real number type underlying this field
    type Real: Float + NumAssign + ToPrimitive + Send + Sync + Debug + 'static;

    /// Complex conjugate
    fn conj(&self) -> Self;

    /// Squared magnitude |z|²
    fn norm_sqr(&self) -> Self::Real;

    /// Magnitude |z|
    fn norm(&self) -> Self::Real {
        self.norm_sqr().sqrt()
    }

    /// Create from a real value
    fn from_real(r: Self::Real) -> Self;

    /// Real part
    fn re(&self) -> Self::Real;

    /// Multiplicative inverse (1/z)
    fn inv(&self) -> Self;

    /// Convert an `f64` constant (tolerance, weight) into the real type
    fn real(x: f64) -> Self::Real;

    /// Create a scalar from an `f64` constant
    fn from_f64(x: f64) -> Self {
        Self::from_real(Self::real(x))
    }

    /// Real value as `f64`, for reporting
    fn real_to_f64(r: Self::Real) -> f64 {
        r.to_f64().unwrap_or(f64::NAN)
    }

    /// Smallest positive normal real, used as the "tiny" guard of scalar inverses
    fn tiny() -> Self::Real {
        Self::Real::min_positive_value()
    }
}

impl ComplexField for Complex64 {
    type Real = f64;

    #[inline]
    fn conj(&self) -> Self {
        Complex64::conj(self)
    }

    #[inline]
    fn norm_sqr(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn from_real(r: f64) -> Self {
        Complex64::new(r, 0.0)
    }

    #[inline]
    fn re(&self) -> f64 {
        self.re
    }

    #[inline]
    fn inv(&self) -> Self {
        let denom = self.norm_sqr();
        Complex64::new(self.re / denom, -self.im / denom)
    }

    #[inline]
    fn real(x: f64) -> f64 {
        x
    }
}

impl ComplexField for Complex32 {
    type Real = f32;

    #[inline]
    fn conj(&self) -> Self {
        Complex32::conj(self)
    }

    #[inline]
    fn norm_sqr(&self) -> f32 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn from_real(r: f32) -> Self {
        Complex32::new(r, 0.0)
    }

    #[inline]
    fn re(&self) -> f32 {
        self.re
    }

    #[inline]
    fn inv(&self) -> Self {
        let denom = self.norm_sqr();
        Complex32::new(self.re / denom, -self.im / denom)
    }

    #[inline]
    fn real(x: f64) -> f32 {
        x as f32
    }
}

impl ComplexField for f64 {
    type Real = f64;

    #[inline]
    fn conj(&self) -> Self {
        *self
    }

    #[inline]
    fn norm_sqr(&self) -> f64 {
        *self * *self
    }

    #[inline]
    fn norm(&self) -> f64 {
        self.abs()
    }

    #[inline]
    fn from_real(r: f64) -> Self {
        r
    }

    #[inline]
    fn re(&self) -> f64 {
        *self
    }

    #[inline]
    fn inv(&self) -> Self {
        1.0 / *self
    }

    #[inline]
    fn real(x: f64) -> f64 {
        x
    }
}

impl ComplexField for f32 {
    type Real = f32;

    #[inline]
    fn conj(&self) -> Self {
        *self
    }

    #[inline]
    fn norm_sqr(&self) -> f32 {
        *self * *self
    }

    #[inline]
    fn norm(&self) -> f32 {
        self.abs()
    }

    #[inline]
    fn from_real(r: f32) -> Self {
        r
    }

    #[inline]
    fn re(&self) -> f32 {
        *self
    }

    #[inline]
    fn inv(&self) -> Self {
        1.0 / *self
    }

    #[inline]
    fn real(x: f64) -> f32 {
        x as f32
    }
}

/// A solver that can sit at the bottom of an MGR hierarchy or relax the F-points of a level.
///
/// Both methods are collective: every rank of the matrix communicator must call them
/// in the same order. `setup` is called once per MGR setup with the operator the solver
/// will later be asked to invert, `solve` once per application with `x` holding the
/// initial guess on entry and the approximation on return.
pub trait LevelSolver<T: ComplexField>: Send + Sync {
    /// Prepare the solver for the given operator
    fn setup(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &Array1<T>,
    ) -> Result<(), MgrError>;

    /// Approximately solve `a x = b`, updating `x` in place
    fn solve(
        &mut self,
        a: &ParCsrMatrix<T>,
        b: &Array1<T>,
        x: &mut Array1<T>,
    ) -> Result<(), MgrError>;

    /// Average residual reduction per iteration of the last solve, when the solver tracks it
    fn convergence_factor(&self) -> Option<f64> {
        None
    }
}
