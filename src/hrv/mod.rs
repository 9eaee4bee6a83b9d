//! HRV computation
//!
//! Naive time-domain estimators over RR intervals approximated from
//! heart rate samples. No artifact correction or ectopic-beat rejection.

pub mod estimator;

pub use estimator::{pnn50, rmssd, rr_intervals, sdnn, PNN50_THRESHOLD_MS};
