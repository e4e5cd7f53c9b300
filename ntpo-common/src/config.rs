//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `NTPO_CONFIG` environment variable
//! 3. `<config_dir>/ntpo/config.toml`
//! 4. Compiled defaults (no file)
//!
//! A missing file is not fatal: the logger starts on compiled defaults.

use crate::aggregator::{DEFAULT_BATCH_SIZE, DEFAULT_TRIM_LEVEL};
use crate::predictor::{DEFAULT_PREDICT_LEVEL, DEFAULT_WINDOW_SECS};
use crate::stats::trim::DEFAULT_MAX_OUTLIER_FRACTION;
use crate::stats::{RobustTrim, DEFAULT_DEGREE, MIN_SAMPLES};
use crate::{Error, Result, SampleAggregator, TimePredictor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NTPO_CONFIG";

/// Highest polynomial degree accepted from configuration
pub const MAX_DEGREE: usize = 8;

/// Complete TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub source: SourceConfig,
    pub acquisition: AcquisitionConfig,
    pub estimator: EstimatorConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

/// Reference time server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub server: String,
    pub port: u16,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Protocol version placed in requests
    pub version: u8,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            server: "utcnist.colorado.edu".to_string(),
            port: 123,
            timeout_ms: 500,
            version: 3,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cycle cadence and batch shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Cycle cadence; wakeups align to multiples of this on the wall clock
    pub interval_secs: u64,
    /// Exchanges attempted per cycle
    pub batch_size: usize,
    /// Concurrent exchanges (1 = sequential)
    pub max_in_flight: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: 1,
        }
    }
}

/// Robust estimator tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub window_secs: f64,
    pub predict_level: f64,
    pub trim_level: f64,
    pub degree: usize,
    pub max_outlier_fraction: f64,
    pub min_samples: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            predict_level: DEFAULT_PREDICT_LEVEL,
            trim_level: DEFAULT_TRIM_LEVEL,
            degree: DEFAULT_DEGREE,
            max_outlier_fraction: DEFAULT_MAX_OUTLIER_FRACTION,
            min_samples: MIN_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("offsetlogger.csv"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, validating the result
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load the config file, falling back to defaults when none exists
    ///
    /// An explicitly named file (CLI or environment) that cannot be read or
    /// parsed is an error; an absent default-location file is not.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            info!("Loading config from {}", path.display());
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            info!("Loading config from {} ({})", path.display(), CONFIG_ENV_VAR);
            return Self::load(&path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => {
                warn!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.acquisition;
        let e = &self.estimator;

        if a.interval_secs == 0 {
            return Err(Error::Config("acquisition.interval_secs must be > 0".to_string()));
        }
        if a.batch_size == 0 {
            return Err(Error::Config("acquisition.batch_size must be > 0".to_string()));
        }
        if self.source.timeout_ms == 0 {
            return Err(Error::Config("source.timeout_ms must be > 0".to_string()));
        }
        if !(e.window_secs.is_finite() && e.window_secs > 0.0) {
            return Err(Error::Config("estimator.window_secs must be > 0".to_string()));
        }
        if e.degree > MAX_DEGREE {
            return Err(Error::Config(format!("estimator.degree must be <= {}", MAX_DEGREE)));
        }
        for (name, level) in [("predict_level", e.predict_level), ("trim_level", e.trim_level)] {
            if !(level.is_finite() && level >= 0.0) {
                return Err(Error::Config(format!("estimator.{} must be finite and >= 0", name)));
            }
        }
        if !(0.0..1.0).contains(&e.max_outlier_fraction) {
            return Err(Error::Config("estimator.max_outlier_fraction must be in [0, 1)".to_string()));
        }
        if e.min_samples < e.degree + 1 {
            return Err(Error::Config(format!(
                "estimator.min_samples must be >= degree + 1 ({})",
                e.degree + 1
            )));
        }
        Ok(())
    }

    /// Build the cycle aggregator described by this configuration
    pub fn aggregator(&self) -> SampleAggregator {
        let e = &self.estimator;
        let tune = |level: f64| RobustTrim {
            max_outlier_fraction: e.max_outlier_fraction,
            min_samples: e.min_samples,
            ..RobustTrim::new(level, e.degree)
        };

        SampleAggregator {
            predictor: TimePredictor {
                window: e.window_secs,
                trim: tune(e.predict_level),
            },
            trim: tune(e.trim_level),
            batch_size: self.acquisition.batch_size,
            max_in_flight: self.acquisition.max_in_flight.max(1),
        }
    }
}

/// Default config file path for the platform, if a config directory exists
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ntpo").join("config.toml"))
}
