//! Typed records flowing through the estimator
//!
//! All times are seconds since the Unix epoch as `f64`; offsets and their
//! uncertainties are seconds.

/// Raw result of one timestamp exchange with a reference source
///
/// Field naming follows the usual four-timestamp round trip:
/// `orig_time` (local send), `recv_time` (remote receive),
/// `tx_time` (remote transmit), `dest_time` (local receive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exchange {
    pub orig_time: f64,
    pub recv_time: f64,
    pub tx_time: f64,
    pub dest_time: f64,
    /// Dispersion estimate reported by the source, used as uncertainty proxy
    pub root_dispersion: f64,
}

impl Exchange {
    /// Round-trip delay excluding the time spent inside the remote source
    pub fn delay(&self) -> f64 {
        (self.dest_time - self.orig_time) - (self.tx_time - self.recv_time)
    }
}

/// One round-trip measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Midpoint of local send/receive
    pub local_time: f64,
    /// Midpoint of remote receive/transmit
    pub serv_time: f64,
    /// Measured clock delta (reference minus local)
    pub offset: f64,
    /// Uncertainty proxy; may be zero
    pub sig_offset: f64,
}

impl From<Exchange> for Sample {
    fn from(ex: Exchange) -> Self {
        Self {
            local_time: (ex.orig_time + ex.dest_time) / 2.0,
            serv_time: (ex.recv_time + ex.tx_time) / 2.0,
            offset: ((ex.recv_time - ex.orig_time) + (ex.tx_time - ex.dest_time)) / 2.0,
            sig_offset: ex.root_dispersion,
        }
    }
}

/// A sample paired with the predictor's estimate for its local time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedSample {
    pub sample: Sample,
    pub pred_time: f64,
    /// `serv_time - pred_time`
    pub pred_offset: f64,
    pub sig_pred_offset: f64,
}

impl PredictedSample {
    pub fn new(sample: Sample, pred_time: f64) -> Self {
        Self {
            sample,
            pred_time,
            pred_offset: sample.serv_time - pred_time,
            sig_pred_offset: sample.sig_offset,
        }
    }
}

/// One aggregated row per acquisition cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryRecord {
    pub local_time: f64,
    pub pred_time: f64,
    pub serv_time: f64,
    pub offset: f64,
    pub sig_offset: f64,
    pub pred_offset: f64,
    pub sig_pred_offset: f64,
}

/// Transient collection of samples gathered within one cycle
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub samples: Vec<Sample>,
    /// Number of exchanges that produced no sample
    pub failures: usize,
}

impl Batch {
    pub fn attempted(&self) -> usize {
        self.samples.len() + self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_from_exchange_symmetric_path() {
        // Remote clock 0.25 s ahead, 20 ms each way, 2 ms processing
        let ex = Exchange {
            orig_time: 100.000,
            recv_time: 100.270,
            tx_time: 100.272,
            dest_time: 100.042,
            root_dispersion: 0.001,
        };
        let s = Sample::from(ex);

        assert!((s.offset - 0.25).abs() < 1e-9);
        assert!((s.local_time - 100.021).abs() < 1e-9);
        assert!((s.serv_time - 100.271).abs() < 1e-9);
        assert_eq!(s.sig_offset, 0.001);
        assert!((ex.delay() - 0.040).abs() < 1e-9);
    }

    #[test]
    fn test_predicted_sample_offset() {
        let s = Sample {
            local_time: 10.0,
            serv_time: 10.5,
            offset: 0.5,
            sig_offset: 0.01,
        };
        let p = PredictedSample::new(s, 10.4);
        assert!((p.pred_offset - 0.1).abs() < 1e-12);
        assert_eq!(p.sig_pred_offset, 0.01);
    }

    #[test]
    fn test_batch_attempted_counts_failures() {
        let batch = Batch {
            samples: vec![],
            failures: 3,
        };
        assert!(batch.is_empty());
        assert_eq!(batch.attempted(), 3);
    }
}
