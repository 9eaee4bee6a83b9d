//! Biometric record model
//!
//! Transient value types produced by the health gateway and the companion
//! channel. Nothing here is persisted.

pub mod heartrate;
pub mod result;

pub use heartrate::{HeartRateSample, HrvMetrics, RrInterval};
pub use result::OperationResult;
