//! Time-domain HRV estimators
//!
//! All functions take RR intervals in milliseconds, in acquisition order.
//! Order matters: RMSSD and PNN50 work on successive differences.
//! Inputs must be finite; RR intervals are only ever built from positive BPM.

use crate::types::heartrate::{HeartRateSample, RrInterval};

/// Successive differences strictly above this count towards PNN50.
pub const PNN50_THRESHOLD_MS: f64 = 50.0;

/// Root mean square of successive differences. 0.0 for fewer than two intervals.
pub fn rmssd(rr: &[f64]) -> f64 {
    if rr.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = rr.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (sum_sq / (rr.len() - 1) as f64).sqrt()
}

/// Population standard deviation of the intervals. 0.0 for an empty input.
pub fn sdnn(rr: &[f64]) -> f64 {
    if rr.is_empty() {
        return 0.0;
    }
    let n = rr.len() as f64;
    let mean = rr.iter().sum::<f64>() / n;
    let variance = rr.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Percentage of successive differences whose magnitude exceeds 50 ms.
pub fn pnn50(rr: &[f64]) -> f64 {
    if rr.len() < 2 {
        return 0.0;
    }
    let over = rr
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > PNN50_THRESHOLD_MS)
        .count();
    100.0 * over as f64 / (rr.len() - 1) as f64
}

/// Approximate one RR interval per sample, preserving order.
///
/// Zero-BPM samples have no interval and are skipped.
pub fn rr_intervals(samples: &[HeartRateSample]) -> Vec<RrInterval> {
    samples.iter().filter_map(RrInterval::from_sample).collect()
}
