//! # NTP Offset Estimator Common Library
//!
//! Shared code for the offset logger:
//! - Typed sample and history records
//! - Robust statistics (weighting, trend fitting, IQR trimming)
//! - Sliding-window reference time prediction
//! - Per-cycle sample aggregation
//! - History file persistence
//! - Configuration loading

pub mod aggregator;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod predictor;
pub mod source;
pub mod stats;
pub mod time;

pub use aggregator::{CycleOutcome, SampleAggregator};
pub use error::{Error, Result};
pub use history::{History, HistorySink};
pub use model::{Batch, Exchange, HistoryRecord, PredictedSample, Sample};
pub use predictor::{Prediction, TimePredictor};
pub use source::TimeSource;
