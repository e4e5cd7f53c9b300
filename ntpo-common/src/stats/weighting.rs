//! Inverse-variance weighting and weighted means

use crate::{Error, Result};
use tracing::debug;

/// Mean of a set of values with its standard error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub mean: f64,
    pub std_error: f64,
}

/// Convert uncertainties into weights `w = 1/σ²`
///
/// Non-positive σ values carry no noise information; they are replaced by
/// half of the smallest finite positive σ before inversion. An infinite σ
/// gets weight zero. The input slice is left untouched.
///
/// # Errors
/// - `InvalidInput` when any σ is NaN
/// - `NoUsableUncertainty` when no finite positive σ exists
pub fn weights_from_uncertainty(sigmas: &[f64]) -> Result<Vec<f64>> {
    if let Some(i) = sigmas.iter().position(|s| s.is_nan()) {
        return Err(Error::InvalidInput(format!("uncertainty {} is NaN", i)));
    }

    let floor = sigmas
        .iter()
        .copied()
        .filter(|s| s.is_finite() && *s > 0.0)
        .fold(f64::INFINITY, f64::min);

    if !floor.is_finite() {
        return Err(Error::NoUsableUncertainty);
    }

    let replacement = floor / 2.0;
    Ok(sigmas
        .iter()
        .map(|&s| {
            if s == f64::INFINITY {
                return 0.0;
            }
            let s = if s > 0.0 { s } else { replacement };
            1.0 / (s * s)
        })
        .collect())
}

/// Weights from uncertainties, or uniform weights when none are usable
pub fn weights_or_uniform(sigmas: &[f64]) -> Vec<f64> {
    match weights_from_uncertainty(sigmas) {
        Ok(w) => w,
        Err(e) => {
            debug!(n = sigmas.len(), "{}, falling back to uniform weights", e);
            vec![1.0; sigmas.len()]
        }
    }
}

/// Inverse-variance weighted mean
///
/// `mean = Σ wᵢvᵢ / Σ wᵢ`, `std_error = sqrt(1 / Σ wᵢ)`.
///
/// # Errors
/// - `InsufficientData` for empty input
/// - `InvalidInput` for mismatched lengths, weights that are negative or not
///   finite, or weights summing to zero
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Result<Estimate> {
    if values.len() != weights.len() {
        return Err(Error::InvalidInput(format!(
            "{} values but {} weights",
            values.len(),
            weights.len()
        )));
    }
    if values.is_empty() {
        return Err(Error::InsufficientData { needed: 1, got: 0 });
    }
    if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        return Err(Error::InvalidInput(format!("weight {} is not finite and non-negative", w)));
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(Error::InvalidInput("weights sum to zero".to_string()));
    }
    let weighted: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();

    Ok(Estimate {
        mean: weighted / total,
        std_error: (1.0 / total).sqrt(),
    })
}

/// Arithmetic mean; `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Aggregate values with per-value uncertainties
///
/// Uses the inverse-variance weighted mean when any uncertainty is usable.
/// Otherwise falls back to the arithmetic mean with the standard error of the
/// mean (sample standard deviation over √n, zero for a single value).
pub fn mean_with_uncertainty(values: &[f64], sigmas: &[f64]) -> Result<Estimate> {
    match weights_from_uncertainty(sigmas) {
        Ok(weights) => weighted_mean(values, &weights),
        Err(Error::NoUsableUncertainty) => {
            let m = mean(values).ok_or(Error::InsufficientData { needed: 1, got: 0 })?;
            let n = values.len();
            let std_error = if n > 1 {
                let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
                (var / n as f64).sqrt()
            } else {
                0.0
            };
            Ok(Estimate { mean: m, std_error })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_sigmas_replaced_by_half_min() {
        let sigmas = [0.0, -1.0, 2.0, 4.0];
        let w = weights_from_uncertainty(&sigmas).unwrap();
        assert_eq!(w, vec![1.0, 1.0, 0.25, 0.0625]);
        // caller data untouched
        assert_eq!(sigmas, [0.0, -1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_all_non_positive_is_error() {
        let err = weights_from_uncertainty(&[0.0, -2.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::NoUsableUncertainty));
        assert_eq!(weights_or_uniform(&[0.0, 0.0]), vec![1.0, 1.0]);
    }

    #[test]
    fn test_equal_weights_match_arithmetic_mean() {
        let values = [1.5, -2.0, 7.25, 3.0, 0.125];
        for w in [0.5, 1.0, 3.0, 1e6] {
            let est = weighted_mean(&values, &[w; 5]).unwrap();
            let expected = mean(&values).unwrap();
            assert!((est.mean - expected).abs() < 1e-12, "w={} mean={}", w, est.mean);
        }
    }

    #[test]
    fn test_weighted_mean_empty_is_insufficient() {
        let err = weighted_mean(&[], &[]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 1, got: 0 }));
    }

    #[test]
    fn test_weighted_mean_single_point_error_is_sigma() {
        let sigma = 0.5;
        let w = weights_from_uncertainty(&[sigma]).unwrap();
        let est = weighted_mean(&[42.0], &w).unwrap();
        assert_eq!(est.mean, 42.0);
        assert_eq!(est.std_error, sigma);
    }

    #[test]
    fn test_weighted_mean_favours_precise_values() {
        let est = mean_with_uncertainty(&[0.0, 10.0], &[1.0, 0.1]).unwrap();
        assert!(est.mean > 9.8);
        assert!(est.std_error < 0.1);
    }

    #[test]
    fn test_weighted_mean_rejects_mismatch_and_bad_weights() {
        assert!(matches!(
            weighted_mean(&[1.0, 2.0], &[1.0]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            weighted_mean(&[1.0, 2.0], &[1.0, -1.0]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            weighted_mean(&[1.0, 2.0], &[0.0, 0.0]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            weighted_mean(&[1.0, 2.0], &[1.0, f64::INFINITY]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_infinite_sigma_carries_no_weight() {
        assert_eq!(weights_from_uncertainty(&[f64::INFINITY, 1.0]).unwrap(), vec![0.0, 1.0]);
        // -inf is non-positive and takes the substitute like zero does
        assert_eq!(
            weights_from_uncertainty(&[f64::NEG_INFINITY, 0.0, 2.0, f64::INFINITY]).unwrap(),
            vec![1.0, 1.0, 0.25, 0.0]
        );

        let est = mean_with_uncertainty(&[100.0, 1.0], &[f64::INFINITY, 0.5]).unwrap();
        assert_eq!(est.mean, 1.0);
        assert_eq!(est.std_error, 0.5);
    }

    #[test]
    fn test_all_infinite_sigmas_fall_back_to_sem() {
        let sigmas = [f64::INFINITY, f64::INFINITY];
        assert!(matches!(
            weights_from_uncertainty(&sigmas),
            Err(Error::NoUsableUncertainty)
        ));
        let est = mean_with_uncertainty(&[1.0, 3.0], &sigmas).unwrap();
        assert_eq!(est.mean, 2.0);
    }

    #[test]
    fn test_nan_sigma_is_rejected() {
        assert!(matches!(
            weights_from_uncertainty(&[1.0, f64::NAN]),
            Err(Error::InvalidInput(_))
        ));
        assert!(mean_with_uncertainty(&[1.0, 2.0], &[1.0, f64::NAN]).is_err());
        assert_eq!(weights_or_uniform(&[f64::NAN, 1.0]), vec![1.0, 1.0]);
    }

    #[test]
    fn test_mean_with_uncertainty_falls_back_to_sem() {
        let est = mean_with_uncertainty(&[1.0, 3.0], &[0.0, 0.0]).unwrap();
        assert_eq!(est.mean, 2.0);
        // sample std = sqrt(2), sem = 1
        assert!((est.std_error - 1.0).abs() < 1e-12);

        let single = mean_with_uncertainty(&[5.0], &[0.0]).unwrap();
        assert_eq!(single.std_error, 0.0);
    }
}
