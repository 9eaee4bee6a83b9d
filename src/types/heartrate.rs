//! types/heartrate.rs
//!
//! Heart rate samples, the RR intervals approximated from them, and the
//! HRV metrics computed over a window of intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hrv::estimator;

/// Milliseconds per minute, the numerator of the BPM -> RR approximation.
pub const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Source label attached to samples pushed by the companion device.
pub const COMPANION_SOURCE: &str = "companion device";

/// A single heart rate reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub beats_per_minute: u32,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl HeartRateSample {
    pub fn new(beats_per_minute: u32, timestamp: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            beats_per_minute,
            timestamp,
            source: source.into(),
        }
    }
}

/// Time between two beats in milliseconds.
///
/// Derived as `60000 / bpm`, which is only an approximation of true
/// inter-beat timing: it is exact only when samples are one-per-beat.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RrInterval {
    pub interval_millis: f64,
    pub timestamp: DateTime<Utc>,
}

impl RrInterval {
    /// Approximate the RR interval for a sample. `None` for a zero reading.
    pub fn from_sample(sample: &HeartRateSample) -> Option<Self> {
        if sample.beats_per_minute == 0 {
            return None;
        }
        Some(Self {
            interval_millis: MILLIS_PER_MINUTE / f64::from(sample.beats_per_minute),
            timestamp: sample.timestamp,
        })
    }
}

/// Time-domain HRV metrics over one window of RR intervals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HrvMetrics {
    /// Root mean square of successive differences (ms)
    pub rmssd: f64,
    /// Population standard deviation of the intervals (ms)
    pub sdnn: f64,
    /// Percentage of successive differences above 50 ms (0-100)
    pub pnn50: f64,
    /// When the metrics were computed
    pub timestamp: DateTime<Utc>,
    /// Number of RR intervals the metrics were computed from
    pub sample_count: usize,
}

impl HrvMetrics {
    /// Run all three estimators over an ordered interval sequence.
    pub fn compute(rr: &[f64], timestamp: DateTime<Utc>) -> Self {
        Self {
            rmssd: estimator::rmssd(rr),
            sdnn: estimator::sdnn(rr),
            pnn50: estimator::pnn50(rr),
            timestamp,
            sample_count: rr.len(),
        }
    }

    /// Metrics from fewer than two intervals are informational only.
    pub fn is_valid(&self) -> bool {
        self.sample_count >= 2
    }
}
