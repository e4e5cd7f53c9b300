//! Weighted least-squares polynomial trend fitting
//!
//! Timestamps are ~1.7e9 s, so a cubic in raw seconds spans ~27 orders of
//! magnitude. The fitter maps x onto [-1, 1] before building the Vandermonde
//! matrix and solves it with an SVD, treating singular values below
//! `ε · max(n, d+1) · σ_max` as zero.

use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Default polynomial degree for trend fitting
pub const DEFAULT_DEGREE: usize = 3;

/// Fitted polynomial in a normalized variable `u = (x - center) / scale`
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    /// Ascending-power coefficients in `u`
    coefficients: Vec<f64>,
    center: f64,
    scale: f64,
}

impl Polynomial {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Value of the trend at `x`
    pub fn eval(&self, x: f64) -> f64 {
        let u = (x - self.center) / self.scale;
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }

    /// First derivative `dy/dx` at `x`
    pub fn slope(&self, x: f64) -> f64 {
        let u = (x - self.center) / self.scale;
        let du = self
            .coefficients
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (k, c)| acc * u + k as f64 * c);
        du / self.scale
    }
}

/// Fits bounded-degree polynomials to `(x, y)` pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFitter {
    pub degree: usize,
}

impl Default for TrendFitter {
    fn default() -> Self {
        Self {
            degree: DEFAULT_DEGREE,
        }
    }
}

impl TrendFitter {
    pub fn new(degree: usize) -> Self {
        Self { degree }
    }

    /// Minimize `Σ wᵢ (yᵢ - p(xᵢ))²` (unit weights when `weights` is `None`)
    ///
    /// Points with zero weight do not constrain the fit.
    ///
    /// # Errors
    /// - `InvalidInput` for mismatched lengths, non-finite points, or weights
    ///   that are negative or not finite
    /// - `UnderdeterminedFit` when fewer than `degree + 1` distinct x values
    ///   carry positive weight
    pub fn fit(&self, x: &[f64], y: &[f64], weights: Option<&[f64]>) -> Result<Polynomial> {
        let n = x.len();
        if y.len() != n {
            return Err(Error::InvalidInput(format!("{} x values but {} y values", n, y.len())));
        }
        if let Some(w) = weights {
            if w.len() != n {
                return Err(Error::InvalidInput(format!("{} points but {} weights", n, w.len())));
            }
            if w.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
                return Err(Error::InvalidInput("weights must be finite and non-negative".to_string()));
            }
        }
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput("non-finite point".to_string()));
        }

        let required = self.degree + 1;
        let weighted: Vec<f64> = match weights {
            Some(w) => x.iter().zip(w).filter(|(_, w)| **w > 0.0).map(|(x, _)| *x).collect(),
            None => x.to_vec(),
        };
        let distinct = count_distinct(weighted);
        if distinct < required {
            return Err(Error::UnderdeterminedFit { distinct, required });
        }

        let (lo, hi) = x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let center = (lo + hi) / 2.0;
        let scale = if hi > lo { (hi - lo) / 2.0 } else { 1.0 };

        let row_weight = |i: usize| weights.map_or(1.0, |w| w[i].sqrt());

        let a = DMatrix::from_fn(n, required, |i, j| {
            let u = (x[i] - center) / scale;
            row_weight(i) * u.powi(j as i32)
        });
        let b = DVector::from_iterator(n, (0..n).map(|i| row_weight(i) * y[i]));

        let svd = a.svd(true, true);
        let sigma_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
        let eps = f64::EPSILON * n.max(required) as f64 * sigma_max;
        let solution = svd
            .solve(&b, eps)
            .map_err(|e| Error::InvalidInput(format!("least-squares solve failed: {}", e)))?;

        Ok(Polynomial {
            coefficients: solution.iter().copied().collect(),
            center,
            scale,
        })
    }
}

fn count_distinct(mut sorted: Vec<f64>) -> usize {
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted.len()
}
