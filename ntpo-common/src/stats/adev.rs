//! Overlapping Allan deviation of phase (time-offset) data

use serde::Serialize;

/// One point of an Allan deviation curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdevPoint {
    /// Averaging time in seconds
    pub tau: f64,
    pub deviation: f64,
    /// `deviation / sqrt(N - 2m)`
    pub error: f64,
    /// Number of second differences contributing
    pub terms: usize,
}

/// Averaging factors 1, 2, 4, … while at least two second differences exist
pub fn octave_factors(len: usize) -> Vec<usize> {
    std::iter::successors(Some(1usize), |m| m.checked_mul(2))
        .take_while(|m| len >= 2 * m + 2)
        .collect()
}

/// Overlapping Allan deviation for phase samples taken at `rate` Hz
///
/// `σ(τ) = sqrt(Σ (x[i+2m] - 2x[i+m] + x[i])² / (2 (N-2m))) / τ` with `τ = m / rate`.
/// Factors leaving fewer than one second difference are skipped.
pub fn overlapping_adev(phase: &[f64], rate: f64, factors: &[usize]) -> Vec<AdevPoint> {
    let n = phase.len();
    factors
        .iter()
        .copied()
        .filter(|&m| m > 0 && n > 2 * m)
        .map(|m| {
            let terms = n - 2 * m;
            let sum: f64 = (0..terms)
                .map(|i| {
                    let d = phase[i + 2 * m] - 2.0 * phase[i + m] + phase[i];
                    d * d
                })
                .sum();
            let tau = m as f64 / rate;
            let deviation = (sum / (2.0 * terms as f64)).sqrt() / tau;
            AdevPoint {
                tau,
                deviation,
                error: deviation / (terms as f64).sqrt(),
                terms,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_phase_has_zero_deviation() {
        // Constant frequency offset: phase ramps linearly
        let phase: Vec<f64> = (0..64).map(|i| 1e-6 * i as f64).collect();
        for p in overlapping_adev(&phase, 1.0, &octave_factors(phase.len())) {
            assert!(p.deviation < 1e-15, "tau={} dev={}", p.tau, p.deviation);
        }
    }

    #[test]
    fn test_alternating_phase_known_value() {
        // x = 0, 1, 0, 1, ... : second difference at m=1 is ±2
        let phase: Vec<f64> = (0..10).map(|i| (i % 2) as f64).collect();
        let points = overlapping_adev(&phase, 2.0, &[1]);
        assert_eq!(points.len(), 1);
        let p = points[0];
        assert_eq!(p.terms, 8);
        assert_eq!(p.tau, 0.5);
        // sqrt(8·4 / 16) / 0.5
        assert!((p.deviation - 2.0f64.sqrt() / 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_octave_factors_bounded_by_length() {
        assert_eq!(octave_factors(10), vec![1, 2, 4]);
        assert!(octave_factors(3).is_empty());
        assert!(overlapping_adev(&[1.0, 2.0], 1.0, &[1]).is_empty());
    }
}
