//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds since the Unix epoch as `f64`, microsecond resolution
pub fn to_unix_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_micros()) * 1e-6
}

/// Current time as seconds since the Unix epoch
pub fn unix_now() -> f64 {
    to_unix_secs(now())
}

/// Time remaining until the next wall-clock multiple of `interval`
///
/// Exactly on a boundary, waits a full interval.
pub fn until_next_boundary(now_secs: f64, interval: Duration) -> Duration {
    let period = interval.as_secs_f64();
    if period <= 0.0 {
        return Duration::ZERO;
    }
    let remaining = period - now_secs.rem_euclid(period);
    Duration::from_secs_f64(remaining.clamp(0.0, period))
}
