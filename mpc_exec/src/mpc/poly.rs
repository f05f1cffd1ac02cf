//! Reference polynomial fitting
//!
//! The reference path is a polynomial `y = f(x)` in the vehicle frame, fitted by least squares
//! through the transformed waypoints. Coefficients are stored lowest power first.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Point2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use util::maths::{poly_deriv, poly_deriv2, poly_val};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Diagonal entries of `R` smaller than this fraction of the largest one mark the design matrix
/// as rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A reference polynomial in the vehicle frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefPoly {
    coeffs: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Clone)]
pub enum FitError {
    #[error("Fitting an order {order} polynomial needs more than {order} points, got {num_points}")]
    TooFewPoints { num_points: usize, order: usize },

    #[error("The waypoints do not determine a unique polynomial (rank deficient design matrix)")]
    RankDeficient,

    #[error("The fitted coefficients are not finite: {0:?}")]
    NonFinite(Vec<f64>),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RefPoly {
    /// Create a polynomial from coefficients, lowest power first.
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    /// Least squares fit of a polynomial of the given order through the points.
    ///
    /// Solves the Vandermonde system with a Householder QR decomposition. When there are exactly
    /// `order + 1` points the fit passes through all of them.
    pub fn fit(points: &[Point2<f64>], order: usize) -> Result<Self, FitError> {
        let num_coeffs = order + 1;

        if points.len() < num_coeffs {
            return Err(FitError::TooFewPoints {
                num_points: points.len(),
                order,
            });
        }

        let design = DMatrix::from_fn(points.len(), num_coeffs, |r, c| points[r].x.powi(c as i32));
        let obs = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));

        let qr = design.qr();
        let r = qr.r();

        let max_diag = r.diagonal().iter().fold(0.0f64, |m, d| m.max(d.abs()));
        if !(max_diag > 0.0)
            || r
                .diagonal()
                .iter()
                .any(|d| d.abs() <= RANK_TOLERANCE * max_diag)
        {
            return Err(FitError::RankDeficient);
        }

        let qtb = qr.q().tr_mul(&obs);
        let coeffs = match r.solve_upper_triangular(&qtb) {
            Some(c) => c,
            None => return Err(FitError::RankDeficient),
        };

        let coeffs: Vec<f64> = coeffs.iter().cloned().collect();
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(FitError::NonFinite(coeffs));
        }

        Ok(Self { coeffs })
    }

    /// The polynomial's coefficients, lowest power first.
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn order(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// `f(x)`
    pub fn eval(&self, x: f64) -> f64 {
        poly_val(x, &self.coeffs)
    }

    /// `f'(x)`
    pub fn deriv(&self, x: f64) -> f64 {
        poly_deriv(x, &self.coeffs)
    }

    /// `f''(x)`
    pub fn deriv2(&self, x: f64) -> f64 {
        poly_deriv2(x, &self.coeffs)
    }

    /// Sample the polynomial at `num_points` x positions spaced `spacing` apart, starting at the
    /// vehicle.
    pub fn sample(&self, spacing: f64, num_points: usize) -> (Vec<f64>, Vec<f64>) {
        (0..num_points)
            .map(|i| {
                let x = spacing * i as f64;
                (x, self.eval(x))
            })
            .unzip()
    }
}
