//! HealthGateway - gated reads and HRV computation over a `HealthStore`
//!
//! Availability and permission state are re-queried on every call; grants
//! can change between calls, so nothing is cached. Every public operation
//! returns an `OperationResult`; store faults are captured here and never
//! propagate as `Err`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{HealthPermission, HealthStore, HeartRateRecord, TimeRange};
use crate::config::GatewayConfig;
use crate::hrv::rr_intervals;
use crate::stream::EventStream;
use crate::types::{HeartRateSample, HrvMetrics, OperationResult};

pub const READ_HEART_RATE_FAILED: &str = "Failed to read heart rate data";
pub const READ_HRV_FAILED: &str = "Failed to read HRV data";
pub const INSUFFICIENT_DATA: &str = "Insufficient heart rate data for HRV calculation";
pub const INSUFFICIENT_DENSITY: &str = "Insufficient sampling density for HRV calculation";
pub const INVALID_RANGE: &str = "Invalid time range";
pub const INVALID_INTERVAL: &str = "Invalid poll interval";

/// Availability as last observed by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AvailabilityState {
    #[default]
    Unchecked,
    Available,
    Unavailable,
}

/// Permission grant as last observed by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionState {
    #[default]
    Unchecked,
    Granted,
    Denied,
}

#[derive(Clone)]
pub struct HealthGateway {
    store: Arc<dyn HealthStore>,
    config: GatewayConfig,
}

impl HealthGateway {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self::with_config(store, GatewayConfig::default())
    }

    pub fn with_config(store: Arc<dyn HealthStore>, config: GatewayConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The permissions this gateway needs from the store.
    pub fn required_permissions(&self) -> HashSet<HealthPermission> {
        let mut required = HashSet::from([HealthPermission::ReadHeartRate]);
        if self.store.supports_native_hrv() {
            required.insert(HealthPermission::ReadHrvRmssd);
        }
        required
    }

    pub async fn is_available(&self) -> bool {
        self.store.availability().await.is_available()
    }

    /// Fails closed: a failed permission query counts as not granted.
    pub async fn has_all_permissions(&self) -> bool {
        match self.store.granted_permissions().await {
            Ok(granted) => self.required_permissions().is_subset(&granted),
            Err(e) => {
                log::warn!("Permission query failed, treating as denied: {}", e);
                false
            }
        }
    }

    pub async fn availability_state(&self) -> AvailabilityState {
        if self.is_available().await {
            AvailabilityState::Available
        } else {
            AvailabilityState::Unavailable
        }
    }

    pub async fn permission_state(&self) -> PermissionState {
        if self.has_all_permissions().await {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        }
    }

    /// Returns `Some(gate)` when the call must stop before touching the store.
    async fn gate<T>(&self) -> Option<OperationResult<T>> {
        if !self.is_available().await {
            return Some(OperationResult::NotAvailable);
        }
        if !self.has_all_permissions().await {
            return Some(OperationResult::PermissionDenied);
        }
        None
    }

    /// Read all heart rate samples in `[start, end]`, ascending by timestamp.
    pub async fn read_heart_rate_data(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> OperationResult<Vec<HeartRateSample>> {
        if let Some(gated) = self.gate().await {
            return gated;
        }
        if start > end {
            return OperationResult::error(INVALID_RANGE);
        }

        match self
            .store
            .read_heart_rate_records(TimeRange::between(start, end))
            .await
        {
            Ok(records) => OperationResult::Success(flatten_records(records)),
            Err(e) => {
                log::warn!("Heart rate read failed: {}", e);
                OperationResult::error_with_cause(READ_HEART_RATE_FAILED, e)
            }
        }
    }

    /// Read natively computed RMSSD values in `[start, end]`, ascending by time.
    pub async fn read_hrv_data(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> OperationResult<Vec<f64>> {
        if let Some(gated) = self.gate().await {
            return gated;
        }
        if !self.store.supports_native_hrv() {
            return OperationResult::NotAvailable;
        }
        if start > end {
            return OperationResult::error(INVALID_RANGE);
        }

        match self
            .store
            .read_hrv_rmssd_records(TimeRange::between(start, end))
            .await
        {
            Ok(mut records) => {
                records.sort_by_key(|r| r.time);
                OperationResult::Success(records.into_iter().map(|r| r.rmssd_millis).collect())
            }
            Err(e) => {
                log::warn!("HRV read failed: {}", e);
                OperationResult::error_with_cause(READ_HRV_FAILED, e)
            }
        }
    }

    /// Compute HRV metrics from heart rate samples in `[start, end]`.
    ///
    /// RR intervals are approximated as `60000 / bpm`, one per sample.
    pub async fn calculate_hrv_metrics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> OperationResult<HrvMetrics> {
        self.read_heart_rate_data(start, end)
            .await
            .and_then(|samples| self.metrics_from_samples(&samples, start, end))
    }

    fn metrics_from_samples(
        &self,
        samples: &[HeartRateSample],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> OperationResult<HrvMetrics> {
        if samples.len() < 2 {
            return OperationResult::error(INSUFFICIENT_DATA);
        }

        if let Some(min_rate) = self.config.min_samples_per_minute {
            let window_minutes = (end - start).num_milliseconds() as f64 / 60_000.0;
            if window_minutes > 0.0 && (samples.len() as f64 / window_minutes) < min_rate {
                log::debug!(
                    "{} samples over {:.1} min is below {} per minute",
                    samples.len(),
                    window_minutes,
                    min_rate
                );
                return OperationResult::error(INSUFFICIENT_DENSITY);
            }
        }

        let rr: Vec<f64> = rr_intervals(samples)
            .iter()
            .map(|r| r.interval_millis)
            .collect();
        OperationResult::Success(HrvMetrics::compute(&rr, Utc::now()))
    }

    /// HRV metrics over the trailing `hours_back` hours.
    pub async fn get_recent_hrv_metrics(&self, hours_back: u32) -> OperationResult<HrvMetrics> {
        match TimeRange::trailing_hours(hours_back) {
            Some(range) => self.calculate_hrv_metrics(range.start, range.end).await,
            None => OperationResult::error(INVALID_RANGE),
        }
    }

    /// Re-read the trailing window every `interval_minutes`, forever.
    ///
    /// The first read happens immediately. Drop or cancel the stream to
    /// stop polling. An interval of zero is treated as one minute; an
    /// interval too large to schedule yields a single `Error` item. Must be
    /// called inside a tokio runtime.
    pub fn stream_heart_rate_data(
        &self,
        interval_minutes: u64,
    ) -> EventStream<OperationResult<Vec<HeartRateSample>>> {
        let gateway = self.clone();
        let minutes = interval_minutes.max(1);
        let cadence = minutes
            .checked_mul(60)
            .map(StdDuration::from_secs)
            .zip(i64::try_from(minutes).ok().and_then(Duration::try_minutes));

        EventStream::spawn(move |sink| async move {
            let Some((period, window)) = cadence else {
                log::warn!("Poll interval of {} min cannot be scheduled", minutes);
                sink.send(OperationResult::error(INVALID_INTERVAL)).await;
                return;
            };
            loop {
                let result = match TimeRange::trailing(window) {
                    Some(range) => gateway.read_heart_rate_data(range.start, range.end).await,
                    None => OperationResult::error(INVALID_RANGE),
                };
                if !sink.send(result).await {
                    break;
                }
                log::debug!("Heart rate poll emitted, next in {} min", minutes);
                tokio::time::sleep(period).await;
            }
        })
    }
}

/// Flatten record samples into one timestamp-ordered list.
///
/// Zero readings cannot yield an RR interval and are dropped here. The sort
/// is stable, so equal timestamps keep store order.
fn flatten_records(records: Vec<HeartRateRecord>) -> Vec<HeartRateSample> {
    let mut samples: Vec<HeartRateSample> = Vec::new();
    for record in records {
        for sample in record.samples {
            if sample.beats_per_minute == 0 {
                log::warn!("Dropping zero BPM sample from {}", record.origin);
                continue;
            }
            samples.push(HeartRateSample::new(
                sample.beats_per_minute,
                sample.time,
                record.origin.clone(),
            ));
        }
    }
    samples.sort_by_key(|s| s.timestamp);
    samples
}
