//! Reference time sources and batch collection

use crate::model::{Batch, Exchange, Sample};
use crate::Result;
use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::warn;

/// A remote reference clock that can answer one timestamp exchange
///
/// Implementations bound each request with their own timeout and report any
/// failure as `Error::TransientSampleFailure`.
pub trait TimeSource {
    fn request(&self) -> impl Future<Output = Result<Exchange>> + Send;

    /// Human-readable identity for logs
    fn describe(&self) -> String;
}

/// Issue `attempts` exchanges, at most `max_in_flight` concurrently
///
/// Failed exchanges are logged and counted; they never abort the batch and
/// are not retried within the same batch.
pub async fn collect_batch<S: TimeSource>(source: &S, attempts: usize, max_in_flight: usize) -> Batch {
    let results: Vec<Result<Exchange>> = stream::iter(0..attempts)
        .map(|_| source.request())
        .buffer_unordered(max_in_flight.max(1))
        .collect()
        .await;

    let mut batch = Batch::default();
    for result in results {
        match result {
            Ok(exchange) => batch.samples.push(Sample::from(exchange)),
            Err(e) => {
                warn!("Failed to fetch time from {}: {}", source.describe(), e);
                batch.failures += 1;
            }
        }
    }
    batch
}
