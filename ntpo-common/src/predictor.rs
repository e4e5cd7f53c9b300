//! Sliding-window reference time prediction
//!
//! Maps a local timestamp onto an estimated reference timestamp using the
//! history rows recorded in the trailing window `[t - window, t)`. History
//! is expected in `local_time` order; the window is found by binary search.
//!
//! The estimate degrades instead of failing:
//!
//! | Window content                         | Estimate                         |
//! |----------------------------------------|----------------------------------|
//! | empty                                  | `t` (zero offset)                |
//! | 1 to 4 rows                            | `t + mean(offset)`               |
//! | trim or fit unusable, < 5 survivors    | `t + mean(offset)` of the window |
//! | otherwise                              | `t + trend(t)`                   |

use crate::model::HistoryRecord;
use crate::stats::{mean, weights_or_uniform, RobustTrim, TrendFitter, DEFAULT_DEGREE, MIN_SAMPLES};
use crate::Error;
use tracing::{debug, warn};

/// Default trailing window in seconds
pub const DEFAULT_WINDOW_SECS: f64 = 3000.0;

/// IQR multiplier for trimming the window; looser than the per-cycle trim
/// since a longer window carries legitimate drift
pub const DEFAULT_PREDICT_LEVEL: f64 = 1.5;

/// How a prediction was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Basis {
    NoHistory,
    /// Mean offset of `rows` in-window rows
    FlatOffset { rows: usize },
    /// Polynomial trend over `kept` of `rows` in-window rows; `drift` is the
    /// trend's slope (s/s) at the query time
    Trend { rows: usize, kept: usize, drift: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub time: f64,
    pub basis: Basis,
}

/// Predicts reference time from recent history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePredictor {
    pub window: f64,
    pub trim: RobustTrim,
}

impl Default for TimePredictor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_PREDICT_LEVEL, DEFAULT_DEGREE)
    }
}

impl TimePredictor {
    pub fn new(window: f64, level: f64, degree: usize) -> Self {
        Self {
            window,
            trim: RobustTrim::new(level, degree),
        }
    }

    /// Predicted reference time for `local_time`
    pub fn predict(&self, local_time: f64, history: &[HistoryRecord]) -> f64 {
        self.predict_detailed(local_time, history).time
    }

    /// Prediction together with the rung of the degradation ladder used
    pub fn predict_detailed(&self, local_time: f64, history: &[HistoryRecord]) -> Prediction {
        let lower = local_time - self.window;
        let start = history.partition_point(|r| r.local_time < lower);
        let end = history.partition_point(|r| r.local_time < local_time).max(start);
        let selection = &history[start..end];

        let times: Vec<f64> = selection.iter().map(|r| r.local_time).collect();
        let offsets: Vec<f64> = selection.iter().map(|r| r.offset).collect();
        let rows = selection.len();

        let Some(mean_offset) = mean(&offsets) else {
            return Prediction {
                time: local_time,
                basis: Basis::NoHistory,
            };
        };
        let flat = Prediction {
            time: local_time + mean_offset,
            basis: Basis::FlatOffset { rows },
        };

        if rows < self.trim.min_samples.max(MIN_SAMPLES) {
            return flat;
        }

        let sigmas: Vec<f64> = selection.iter().map(|r| r.sig_offset).collect();
        let weights = weights_or_uniform(&sigmas);

        let trimmed = match self.trim.trim(&offsets, Some(&times), Some(&weights)) {
            Ok(t) => t,
            Err(e) => {
                log_fallback(&e, "trim");
                return flat;
            }
        };
        let kept = trimmed.kept.len();
        if kept < MIN_SAMPLES {
            return flat;
        }

        let fitter = TrendFitter::new(self.trim.filter.degree);
        let kept_times = trimmed.select(&times);
        match fitter.fit(&kept_times, &trimmed.select(&offsets), Some(&trimmed.select(&weights))) {
            Ok(trend) => Prediction {
                time: local_time + trend.eval(local_time),
                basis: Basis::Trend {
                    rows,
                    kept,
                    drift: trend.slope(local_time),
                },
            },
            Err(e) => {
                log_fallback(&e, "fit");
                flat
            }
        }
    }
}

fn log_fallback(err: &Error, stage: &str) {
    if err.is_degradable() {
        debug!(stage, "Falling back to flat offset: {}", err);
    } else {
        warn!(stage, "Falling back to flat offset: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(local_time: f64, offset: f64, sig_offset: f64) -> HistoryRecord {
        HistoryRecord {
            local_time,
            pred_time: local_time,
            serv_time: local_time + offset,
            offset,
            sig_offset,
            pred_offset: offset,
            sig_pred_offset: sig_offset,
        }
    }

    #[test]
    fn test_empty_history_returns_local_time() {
        let p = TimePredictor::default().predict_detailed(1.7e9, &[]);
        assert_eq!(p.time, 1.7e9);
        assert_eq!(p.basis, Basis::NoHistory);
    }

    #[test]
    fn test_window_excludes_query_point_and_stale_rows() {
        let t = 1.7e9;
        let history = [row(t - 5000.0, 9.0, 0.01), row(t, 9.0, 0.01), row(t + 5.0, 9.0, 0.01)];
        let p = TimePredictor::default().predict_detailed(t, &history);
        assert_eq!(p.basis, Basis::NoHistory);
        assert_eq!(p.time, t);
    }

    #[test]
    fn test_sparse_window_uses_mean_offset() {
        let t = 1.7e9;
        let history = [row(t - 30.0, 0.1, 0.01), row(t - 20.0, 0.2, 0.01), row(t - 10.0, 0.6, 0.01)];
        let p = TimePredictor::default().predict_detailed(t, &history);
        assert_eq!(p.basis, Basis::FlatOffset { rows: 3 });
        assert!((p.time - (t + 0.3)).abs() < 1e-6);
    }

    #[test]
    fn test_window_lower_bound_inclusive() {
        let t = 1.7e9;
        let history = [row(t - DEFAULT_WINDOW_SECS, 0.5, 0.01)];
        let p = TimePredictor::default().predict_detailed(t, &history);
        assert_eq!(p.basis, Basis::FlatOffset { rows: 1 });
    }

    #[test]
    fn test_degenerate_times_fall_back_to_mean() {
        // Six rows at only two distinct times cannot support a cubic
        let t = 1.7e9;
        let history: Vec<_> = (0..6)
            .map(|i| row(t - 100.0 + (i % 2) as f64, 0.2, 0.01))
            .collect();
        let p = TimePredictor::default().predict_detailed(t, &history);
        assert_eq!(p.basis, Basis::FlatOffset { rows: 6 });
        assert!((p.time - (t + 0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_window_sliced_from_long_history() {
        let t = 1.7e9;
        let mut history: Vec<_> = (0..1000).map(|i| row(t - 20_000.0 + i as f64, 5.0, 0.01)).collect();
        history.extend([
            row(t - DEFAULT_WINDOW_SECS, 0.1, 0.01),
            row(t - 1000.0, 0.2, 0.01),
            row(t - 1.0, 0.3, 0.01),
            row(t, 9.0, 0.01),
            row(t + 1.0, 9.0, 0.01),
        ]);

        let p = TimePredictor::default().predict_detailed(t, &history);
        assert_eq!(p.basis, Basis::FlatOffset { rows: 3 });
        assert!((p.time - (t + 0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_linear_drift_recovered_despite_outliers() {
        let t0 = 1.75e9;
        let slope = 2e-5;
        let sigma = 1e-4;
        let mut history: Vec<_> = (0..50)
            .map(|i| {
                let lt = t0 + i as f64 * 50.0;
                // deterministic small wiggle well inside sigma
                let noise = sigma * 0.3 * ((i as f64) * 1.3).sin();
                row(lt, 0.05 + slope * (lt - t0) + noise, sigma)
            })
            .collect();
        history[17].offset += 10.0 * sigma;
        history[33].offset -= 10.0 * sigma;

        let query = t0 + 50.0 * 50.0;
        let predictor = TimePredictor::default();
        let p = predictor.predict_detailed(query, &history);

        let Basis::Trend { rows, kept, drift } = p.basis else {
            panic!("expected trend basis, got {:?}", p.basis);
        };
        assert_eq!(rows, 50);
        assert!(kept <= 48 && kept >= MIN_SAMPLES);
        assert!((drift - slope).abs() < 4e-8, "drift {}", drift);

        let expected = query + 0.05 + slope * (query - t0);
        assert!((p.time - expected).abs() < 2e-5, "error {}", p.time - expected);

        // Same weighted trim the predictor runs on the window
        let times: Vec<f64> = history.iter().map(|r| r.local_time).collect();
        let offsets: Vec<f64> = history.iter().map(|r| r.offset).collect();
        let sigmas: Vec<f64> = history.iter().map(|r| r.sig_offset).collect();
        let trimmed = predictor
            .trim
            .trim(&offsets, Some(&times), Some(&weights_or_uniform(&sigmas)))
            .unwrap();
        assert_eq!(trimmed.kept.len(), kept);
        assert!(!trimmed.kept.contains(&17));
        assert!(!trimmed.kept.contains(&33));
    }
}
