//! Iterative trim-and-refit outlier rejection
//!
//! Each round fences the surviving points with [`OutlierFilter`] (refitting
//! the detrending polynomial on the survivors) and drops the flagged ones.
//! The loop stops after a round that flagged no more than
//! `max_outlier_fraction × initial count` points, or before a round whose
//! removal would leave fewer than `min_samples`.

use super::outlier::OutlierFilter;
use crate::Result;
use tracing::trace;

/// Default stop threshold on the flagged fraction
pub const DEFAULT_MAX_OUTLIER_FRACTION: f64 = 1.0 / 20.0;

/// Minimum surviving sample count, independent of the polynomial degree
pub const MIN_SAMPLES: usize = 5;

/// Outcome of a trim run
#[derive(Debug, Clone, PartialEq)]
pub struct Trimmed {
    /// Indices (into the input) of the surviving points, ascending
    pub kept: Vec<usize>,
    /// Number of removal rounds performed
    pub iterations: usize,
    /// True when the loop stopped on the sample floor rather than converging
    pub hit_floor: bool,
}

impl Trimmed {
    fn untouched(n: usize) -> Self {
        Self {
            kept: (0..n).collect(),
            iterations: 0,
            hit_floor: n < MIN_SAMPLES,
        }
    }

    /// Select the surviving entries of `values`
    pub fn select<T: Copy>(&self, values: &[T]) -> Vec<T> {
        self.kept.iter().map(|&i| values[i]).collect()
    }
}

/// Convergence loop around [`OutlierFilter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustTrim {
    pub filter: OutlierFilter,
    pub max_outlier_fraction: f64,
    pub min_samples: usize,
}

impl Default for RobustTrim {
    fn default() -> Self {
        Self {
            filter: OutlierFilter::default(),
            max_outlier_fraction: DEFAULT_MAX_OUTLIER_FRACTION,
            min_samples: MIN_SAMPLES,
        }
    }
}

impl RobustTrim {
    pub fn new(level: f64, degree: usize) -> Self {
        Self {
            filter: OutlierFilter::new(level, degree),
            ..Self::default()
        }
    }

    /// Trim `values` (optionally detrended against `x`, weighted by `weights`)
    ///
    /// Inputs shorter than `min_samples` are returned untouched with
    /// `hit_floor` set; the caller decides how to treat a short set.
    ///
    /// # Errors
    /// Whatever the underlying [`OutlierFilter::mask`] reports, e.g.
    /// `UnderdeterminedFit` when the survivors share too few distinct x values.
    pub fn trim(&self, values: &[f64], x: Option<&[f64]>, weights: Option<&[f64]>) -> Result<Trimmed> {
        let total = values.len();
        if total < self.min_samples {
            return Ok(Trimmed::untouched(total));
        }

        let threshold = self.max_outlier_fraction * total as f64;
        let mut kept: Vec<usize> = (0..total).collect();
        let mut iterations = 0;

        loop {
            let ys: Vec<f64> = kept.iter().map(|&i| values[i]).collect();
            let xs: Option<Vec<f64>> = x.map(|x| kept.iter().map(|&i| x[i]).collect());
            let ws: Option<Vec<f64>> = weights.map(|w| kept.iter().map(|&i| w[i]).collect());

            let mask = self.filter.mask(&ys, xs.as_deref(), ws.as_deref())?;
            let outliers = mask.iter().filter(|keep| !**keep).count();

            if outliers == 0 {
                trace!(iterations, kept = kept.len(), "trim converged");
                return Ok(Trimmed {
                    kept,
                    iterations,
                    hit_floor: false,
                });
            }

            if kept.len() - outliers < self.min_samples {
                trace!(iterations, kept = kept.len(), outliers, "trim stopped at sample floor");
                return Ok(Trimmed {
                    kept,
                    iterations,
                    hit_floor: true,
                });
            }

            kept = kept
                .into_iter()
                .zip(mask)
                .filter_map(|(i, keep)| keep.then_some(i))
                .collect();
            iterations += 1;

            if outliers as f64 <= threshold {
                trace!(iterations, kept = kept.len(), outliers, "trim converged");
                return Ok(Trimmed {
                    kept,
                    iterations,
                    hit_floor: false,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::outlier::TUKEY_LEVEL;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian(rng: &mut StdRng, n: usize) -> Vec<f64> {
        // Box-Muller
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    #[test]
    fn test_gaussian_data_converges_immediately() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..10 {
            let values = gaussian(&mut rng, 400);
            let x: Vec<f64> = (0..400).map(|i| i as f64).collect();

            let trimmed = RobustTrim::new(TUKEY_LEVEL, 3).trim(&values, Some(&x), None).unwrap();
            assert!(trimmed.iterations <= 1);
            assert!(trimmed.kept.len() as f64 >= 0.95 * 400.0);
            assert!(!trimmed.hit_floor);
        }
    }

    #[test]
    fn test_removes_gross_outliers() {
        let mut values = vec![1.0, 1.1, 0.9, 1.05, 0.95, 1.02, 0.98, 1.01, 0.99, 1.03];
        values.push(50.0);
        values.push(-40.0);
        let trimmed = RobustTrim::new(TUKEY_LEVEL, 0).trim(&values, None, None).unwrap();
        assert!(!trimmed.kept.contains(&10));
        assert!(!trimmed.kept.contains(&11));
        assert!(trimmed.iterations >= 1);
    }

    #[test]
    fn test_never_trims_below_floor() {
        // Heavy-tailed values with a tight level keep flagging points every round
        let values: Vec<f64> = (0..12).map(|i| (i as f64).powi(3) * if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let trim = RobustTrim {
            filter: OutlierFilter::new(0.0, 0),
            max_outlier_fraction: 0.0,
            min_samples: MIN_SAMPLES,
        };
        let trimmed = trim.trim(&values, None, None).unwrap();
        assert!(trimmed.kept.len() >= MIN_SAMPLES);
        assert!(trimmed.hit_floor);
    }

    #[test]
    fn test_short_input_returned_untouched() {
        let trimmed = RobustTrim::default().trim(&[1.0, 2.0, 300.0], None, None).unwrap();
        assert_eq!(trimmed.kept, vec![0, 1, 2]);
        assert_eq!(trimmed.iterations, 0);
        assert!(trimmed.hit_floor);
    }

    #[test]
    fn test_select_follows_kept_indices() {
        let trimmed = Trimmed {
            kept: vec![0, 2],
            iterations: 1,
            hit_floor: false,
        };
        assert_eq!(trimmed.select(&['a', 'b', 'c']), vec!['a', 'c']);
    }
}
