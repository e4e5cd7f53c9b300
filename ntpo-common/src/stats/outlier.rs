//! Interquartile-range outlier fencing
//!
//! Quartiles use linear interpolation between order statistics
//! (Hyndman & Fan type 7): `h = (n - 1)·p`, `q = x[⌊h⌋] + (h - ⌊h⌋)(x[⌈h⌉] - x[⌊h⌋])`.

use super::polyfit::TrendFitter;
use crate::{Error, Result};

/// Tukey's standard fence multiplier
pub const TUKEY_LEVEL: f64 = 1.5;

/// Quantile of the finite values in `data` (NaN entries are ignored)
///
/// # Errors
/// `InsufficientData` when no finite value exists; `InvalidInput` for `p` outside [0, 1].
pub fn quantile(data: &[f64], p: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidInput(format!("quantile probability {} outside [0, 1]", p)));
    }
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Err(Error::InsufficientData { needed: 1, got: 0 });
    }
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    Ok(quantile_sorted(&sorted, p))
}

fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Inclusive acceptance interval `[Q1 - level·IQR, Q3 + level·IQR]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fence {
    pub lower: f64,
    pub upper: f64,
}

impl Fence {
    pub fn from_values(values: &[f64], level: f64) -> Result<Self> {
        let q1 = quantile(values, 0.25)?;
        let q3 = quantile(values, 0.75)?;
        let iqr = q3 - q1;
        Ok(Self {
            lower: q1 - level * iqr,
            upper: q3 + level * iqr,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Single-pass IQR outlier detector, optionally detrended against a covariate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFilter {
    /// IQR multiplier; larger admits more spread
    pub level: f64,
    /// Degree of the detrending polynomial
    pub degree: usize,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            level: TUKEY_LEVEL,
            degree: super::polyfit::DEFAULT_DEGREE,
        }
    }
}

impl OutlierFilter {
    pub fn new(level: f64, degree: usize) -> Self {
        Self { level, degree }
    }

    /// Inlier mask aligned with `values`
    ///
    /// With a covariate `x`, the fence is applied to residuals
    /// `values - fit(x)` of a (weighted) polynomial trend.
    ///
    /// # Errors
    /// Length mismatches, an empty series, or a failed detrending fit.
    pub fn mask(&self, values: &[f64], x: Option<&[f64]>, weights: Option<&[f64]>) -> Result<Vec<bool>> {
        if let Some(w) = weights {
            if w.len() != values.len() {
                return Err(Error::InvalidInput(format!(
                    "{} values but {} weights",
                    values.len(),
                    w.len()
                )));
            }
        }

        let residuals: Vec<f64> = match x {
            Some(x) => {
                if x.len() != values.len() {
                    return Err(Error::InvalidInput(format!(
                        "{} values but {} covariate values",
                        values.len(),
                        x.len()
                    )));
                }
                let trend = TrendFitter::new(self.degree).fit(x, values, weights)?;
                values.iter().zip(x).map(|(v, x)| v - trend.eval(*x)).collect()
            }
            None => values.to_vec(),
        };

        let fence = Fence::from_values(&residuals, self.level)?;
        Ok(residuals.iter().map(|r| fence.contains(*r)).collect())
    }

    /// Number of values outside the fence
    pub fn count_outliers(&self, values: &[f64], x: Option<&[f64]>, weights: Option<&[f64]>) -> Result<usize> {
        Ok(self.mask(values, x, weights)?.iter().filter(|keep| !**keep).count())
    }
}
