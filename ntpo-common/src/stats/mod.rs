//! Robust statistics used by the estimator
//!
//! - [`weighting`]: inverse-variance weights and weighted means
//! - [`polyfit`]: weighted polynomial trend fitting
//! - [`outlier`]: single-pass IQR fencing, optionally detrended
//! - [`trim`]: trim-and-refit convergence loop
//! - [`adev`]: Allan deviation for offline stability analysis

pub mod adev;
pub mod outlier;
pub mod polyfit;
pub mod trim;
pub mod weighting;

pub use outlier::{Fence, OutlierFilter, TUKEY_LEVEL};
pub use polyfit::{Polynomial, TrendFitter, DEFAULT_DEGREE};
pub use trim::{RobustTrim, Trimmed, MIN_SAMPLES};
pub use weighting::{mean, mean_with_uncertainty, weighted_mean, weights_from_uncertainty, weights_or_uniform, Estimate};
