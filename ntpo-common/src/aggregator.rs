//! One acquisition cycle: batch in, one history row out
//!
//! The batch trim runs tighter (`level` 0.5) than the predictor's window trim
//! (`level` 1.5): same-cycle scatter is network noise, while a long window
//! also carries real drift.

use crate::history::History;
use crate::model::{Batch, HistoryRecord, PredictedSample};
use crate::predictor::TimePredictor;
use crate::source::{collect_batch, TimeSource};
use crate::stats::{mean, mean_with_uncertainty, weights_or_uniform, RobustTrim, DEFAULT_DEGREE};
use crate::Result;
use tracing::{debug, warn};

/// Default IQR multiplier for trimming a single batch
pub const DEFAULT_TRIM_LEVEL: f64 = 0.5;

/// Default number of exchanges per cycle
pub const DEFAULT_BATCH_SIZE: usize = 60;

/// Result of one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A row was appended to the history
    Recorded {
        record: HistoryRecord,
        samples: usize,
        kept: usize,
    },
    /// Every exchange failed; nothing was recorded
    Empty { attempted: usize },
    /// Samples arrived but could not be reduced to a row; nothing was recorded
    Failed { samples: usize, error: String },
}

/// Turns batches of samples into history rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleAggregator {
    pub predictor: TimePredictor,
    pub trim: RobustTrim,
    pub batch_size: usize,
    pub max_in_flight: usize,
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self {
            predictor: TimePredictor::default(),
            trim: RobustTrim::new(DEFAULT_TRIM_LEVEL, DEFAULT_DEGREE),
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: 1,
        }
    }
}

impl SampleAggregator {
    /// Collect a batch from `source`, aggregate it and append the row to `history`
    pub async fn run_cycle<S: TimeSource>(&self, source: &S, history: &mut History) -> CycleOutcome {
        let batch = collect_batch(source, self.batch_size, self.max_in_flight).await;
        self.record(&batch, history)
    }

    /// Aggregate an already collected batch and append the row to `history`
    pub fn record(&self, batch: &Batch, history: &mut History) -> CycleOutcome {
        match self.aggregate(batch, history.records()) {
            Ok(Some((record, kept))) => {
                history.append(record);
                CycleOutcome::Recorded {
                    record,
                    samples: batch.samples.len(),
                    kept,
                }
            }
            Ok(None) => {
                warn!(
                    attempted = batch.attempted(),
                    "Empty cycle: no exchange succeeded, nothing recorded"
                );
                CycleOutcome::Empty {
                    attempted: batch.attempted(),
                }
            }
            Err(e) => {
                warn!(samples = batch.samples.len(), "Cycle failed, nothing recorded: {}", e);
                CycleOutcome::Failed {
                    samples: batch.samples.len(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Aggregate `batch` against `history`; `Ok(None)` for an empty batch
    ///
    /// Returns the row together with the number of samples surviving the trim.
    pub fn aggregate(&self, batch: &Batch, history: &[HistoryRecord]) -> Result<Option<(HistoryRecord, usize)>> {
        if batch.is_empty() {
            return Ok(None);
        }

        let predicted: Vec<PredictedSample> = batch
            .samples
            .iter()
            .map(|s| PredictedSample::new(*s, self.predictor.predict(s.local_time, history)))
            .collect();

        let survivors = self.trim_batch(&predicted);
        let kept = survivors.len();
        debug!(samples = predicted.len(), kept, "Batch trimmed");

        let record = summarize(&survivors)?;
        Ok(Some((record, kept)))
    }

    fn trim_batch(&self, predicted: &[PredictedSample]) -> Vec<PredictedSample> {
        let offsets: Vec<f64> = predicted.iter().map(|p| p.sample.offset).collect();
        let times: Vec<f64> = predicted.iter().map(|p| p.sample.local_time).collect();
        let sigmas: Vec<f64> = predicted.iter().map(|p| p.sample.sig_offset).collect();
        let weights = weights_or_uniform(&sigmas);

        match self.trim.trim(&offsets, Some(&times), Some(&weights)) {
            Ok(trimmed) => trimmed.select(predicted),
            Err(e) => {
                debug!("Batch trim skipped, keeping all samples: {}", e);
                predicted.to_vec()
            }
        }
    }
}

fn summarize(samples: &[PredictedSample]) -> Result<HistoryRecord> {
    let column = |f: fn(&PredictedSample) -> f64| -> Vec<f64> { samples.iter().map(f).collect() };

    let offset = mean_with_uncertainty(&column(|p| p.sample.offset), &column(|p| p.sample.sig_offset))?;
    let pred_offset = mean_with_uncertainty(&column(|p| p.pred_offset), &column(|p| p.sig_pred_offset))?;

    let local_times = column(|p| p.sample.local_time);
    let insufficient = || crate::Error::InsufficientData { needed: 1, got: 0 };

    Ok(HistoryRecord {
        local_time: mean(&local_times).ok_or_else(insufficient)?,
        pred_time: mean(&column(|p| p.pred_time)).ok_or_else(insufficient)?,
        serv_time: mean(&column(|p| p.sample.serv_time)).ok_or_else(insufficient)?,
        offset: offset.mean,
        sig_offset: offset.std_error,
        pred_offset: pred_offset.mean,
        sig_pred_offset: pred_offset.std_error,
    })
}
