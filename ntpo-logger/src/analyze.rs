//! Offline stability report for a history file

use ntpo_common::stats::adev::{octave_factors, overlapping_adev, AdevPoint};
use ntpo_common::stats::{OutlierFilter, TrendFitter, DEFAULT_DEGREE};
use ntpo_common::{Error, History, Result};
use serde::Serialize;
use std::fmt;

/// Fence multiplier for the filtered predicted-offset curve
pub const FILTER_LEVEL: f64 = 5.0;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub records: usize,
    pub duration_secs: f64,
    /// Mean sampling rate in Hz
    pub rate_hz: f64,
    /// Linear drift of `offset` against `serv_time`, seconds per second
    pub drift: Option<f64>,
    pub offset_adev: Vec<AdevPoint>,
    pub pred_offset_adev: Vec<AdevPoint>,
    pub filtered_pred_offset_adev: Vec<AdevPoint>,
    /// Rows surviving the filter for `filtered_pred_offset_adev`
    pub filtered_kept: usize,
}

/// Build the stability report for `history`
///
/// # Errors
/// `InsufficientData` with fewer than two rows; `InvalidInput` when the rows
/// do not advance in server time.
pub fn analyze(history: &History) -> Result<Report> {
    let rows = history.records();
    if rows.len() < 2 {
        return Err(Error::InsufficientData {
            needed: 2,
            got: rows.len(),
        });
    }

    let serv_times: Vec<f64> = rows.iter().map(|r| r.serv_time).collect();
    let offsets: Vec<f64> = rows.iter().map(|r| r.offset).collect();
    let pred_offsets: Vec<f64> = rows.iter().map(|r| r.pred_offset).collect();

    let duration_secs = serv_times[rows.len() - 1] - serv_times[0];
    if duration_secs.is_nan() || duration_secs <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "history spans {} s of server time",
            duration_secs
        )));
    }
    // 1 / mean spacing of consecutive rows
    let rate_hz = (rows.len() - 1) as f64 / duration_secs;

    let drift = TrendFitter::new(1)
        .fit(&serv_times, &offsets, None)
        .ok()
        .map(|line| line.slope(serv_times[0]));

    let filter = OutlierFilter::new(FILTER_LEVEL, DEFAULT_DEGREE);
    let filtered: Vec<f64> = match filter.mask(&pred_offsets, Some(&serv_times), None) {
        Ok(mask) => pred_offsets
            .iter()
            .zip(mask)
            .filter_map(|(&v, keep)| keep.then_some(v))
            .collect(),
        Err(_) => pred_offsets.clone(),
    };

    let adev = |phase: &[f64]| overlapping_adev(phase, rate_hz, &octave_factors(phase.len()));

    Ok(Report {
        records: rows.len(),
        duration_secs,
        rate_hz,
        drift,
        offset_adev: adev(&offsets),
        pred_offset_adev: adev(&pred_offsets),
        filtered_pred_offset_adev: adev(&filtered),
        filtered_kept: filtered.len(),
    })
}

/// Plain-text rendering: summary lines, then one table row per averaging time
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records:   {}", self.records)?;
        writeln!(f, "duration:  {:.1} s", self.duration_secs)?;
        writeln!(f, "rate:      {:.4} Hz", self.rate_hz)?;
        match self.drift {
            Some(d) => writeln!(f, "drift:     {:.4e} s/s ({:.3} ppm)", d, d * 1e6)?,
            None => writeln!(f, "drift:     n/a")?,
        }
        writeln!(
            f,
            "filtered:  {} of {} rows kept (level {})",
            self.filtered_kept, self.records, FILTER_LEVEL
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>12}  {:>21}  {:>21}  {:>21}",
            "tau [s]", "adev(offset)", "adev(pred_offset)", "adev(filtered)"
        )?;

        for (i, point) in self.offset_adev.iter().enumerate() {
            let cell = |curve: &[AdevPoint]| match curve.get(i) {
                Some(p) => format!("{:.3e} ±{:.1e}", p.deviation, p.error),
                None => "-".to_string(),
            };
            writeln!(
                f,
                "{:>12.1}  {:>21}  {:>21}  {:>21}",
                point.tau,
                cell(&self.offset_adev),
                cell(&self.pred_offset_adev),
                cell(&self.filtered_pred_offset_adev),
            )?;
        }
        Ok(())
    }
}
