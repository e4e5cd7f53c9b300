//! Long-running logging process
//!
//! Owns the time source, the in-memory history and the history sink for the
//! lifetime of a session. The sink is opened once in [`OffsetLogger::init`]
//! and flushed when the logger is dropped.

use ntpo_common::config::TomlConfig;
use ntpo_common::history::{read_history, HistorySink};
use ntpo_common::time::{unix_now, until_next_boundary};
use ntpo_common::{CycleOutcome, History, Result, SampleAggregator, TimeSource};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub struct OffsetLogger<S> {
    source: S,
    aggregator: SampleAggregator,
    history: History,
    sink: HistorySink,
    interval: Duration,
}

impl<S: TimeSource> OffsetLogger<S> {
    /// Open the history file, load its rows and start a new session header
    pub fn init(source: S, config: &TomlConfig) -> Result<Self> {
        let mut sink = HistorySink::open(&config.history.path)?;
        let history = read_history(&config.history.path)?;
        sink.write_header()?;
        info!(
            rows = history.len(),
            "History file {} opened, logging against {}",
            sink.path().display(),
            source.describe()
        );
        Ok(Self {
            source,
            aggregator: config.aggregator(),
            history,
            sink,
            interval: Duration::from_secs(config.acquisition.interval_secs),
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one acquisition cycle and persist the row it produces
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let outcome = self.aggregator.run_cycle(&self.source, &mut self.history).await;

        if let CycleOutcome::Recorded { record, samples, kept } = &outcome {
            self.sink.append(record)?;
            info!(
                samples,
                kept,
                offset = record.offset,
                pred_offset = record.pred_offset,
                "Recorded {}",
                ntpo_common::history::format_record(record)
            );
        }
        Ok(outcome)
    }

    /// Run cycles on wall-clock boundaries until `shutdown` resolves
    ///
    /// A cycle interrupted by shutdown is abandoned before anything is
    /// appended, so the history never receives a partial row.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut recorded = 0usize;
        let mut empty = 0usize;
        let mut failed = 0usize;

        loop {
            let wait = until_next_boundary(unix_now(), self.interval);
            debug!("Next cycle in {:.3} s", wait.as_secs_f64());

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(wait) => {}
            }

            tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_cycle() => match outcome? {
                    CycleOutcome::Recorded { .. } => recorded += 1,
                    CycleOutcome::Empty { .. } => empty += 1,
                    CycleOutcome::Failed { .. } => failed += 1,
                },
            }
        }

        self.sink.flush()?;
        info!(recorded, empty, failed, rows = self.history.len(), "Logger stopped");
        Ok(())
    }
}
