//! Common error types for the offset estimator

use thiserror::Error;

/// Common result type for estimator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the estimation core, the history sink and the
/// time sources
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer usable points than the operation requires
    #[error("Insufficient data: need at least {needed} point(s), got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Not enough distinct covariate values for the requested polynomial degree
    #[error("Underdetermined fit: {distinct} distinct x value(s), degree needs {required}")]
    UnderdeterminedFit { distinct: usize, required: usize },

    /// Every uncertainty value was non-positive, so no weights can be derived
    #[error("No usable uncertainty data")]
    NoUsableUncertainty,

    /// A single round-trip exchange failed (timeout, no reply, bad reply)
    #[error("Sample failed: {0}")]
    TransientSampleFailure(String),

    /// Invalid argument (length mismatch, non-finite weight, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the robust pipeline absorbs by degrading precision
    /// rather than failing the caller.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientData { .. }
                | Error::UnderdeterminedFit { .. }
                | Error::NoUsableUncertainty
        )
    }
}
