//! Health store access layer
//!
//! Defines the `HealthStore` collaborator trait that a platform health
//! record store conforms to, plus the gateway that gates reads behind the
//! store's availability and permission state.

pub mod gateway;
pub mod simulated;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HealthStoreError;

pub use gateway::{AvailabilityState, HealthGateway, PermissionState};
pub use simulated::SimHealthStore;

/// SDK status reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreAvailability {
    Available,
    NotInstalled,
    UpdateRequired,
}

impl StoreAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, StoreAvailability::Available)
    }
}

/// Read permissions the pipeline may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthPermission {
    ReadHeartRate,
    ReadHrvRmssd,
}

/// A closed time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window of length `span` ending now. `None` if it leaves the
    /// representable time range.
    pub fn trailing(span: Duration) -> Option<Self> {
        let end = Utc::now();
        end.checked_sub_signed(span).map(|start| Self { start, end })
    }

    pub fn trailing_hours(hours: u32) -> Option<Self> {
        Duration::try_hours(i64::from(hours)).and_then(Self::trailing)
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant <= self.end
    }
}

/// One sample inside a stored heart rate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSample {
    pub beats_per_minute: u32,
    pub time: DateTime<Utc>,
}

/// A stored heart rate series written by one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateRecord {
    /// Package label of the writing app.
    pub origin: String,
    pub samples: Vec<RecordSample>,
}

/// A natively computed RMSSD figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvRmssdRecord {
    pub origin: String,
    pub time: DateTime<Utc>,
    pub rmssd_millis: f64,
}

/// What the pipeline needs from a platform health store.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Query the store's SDK status.
    async fn availability(&self) -> StoreAvailability;

    /// The permission set the user has currently granted.
    async fn granted_permissions(&self) -> Result<HashSet<HealthPermission>, HealthStoreError>;

    /// Whether the store exposes native HRV-RMSSD records.
    fn supports_native_hrv(&self) -> bool {
        true
    }

    /// Read heart rate records overlapping the range, in store order.
    async fn read_heart_rate_records(
        &self,
        range: TimeRange,
    ) -> Result<Vec<HeartRateRecord>, HealthStoreError>;

    /// Read native RMSSD records inside the range, in store order.
    async fn read_hrv_rmssd_records(
        &self,
        range: TimeRange,
    ) -> Result<Vec<HrvRmssdRecord>, HealthStoreError>;
}
