//! In-process health store
//!
//! A `HealthStore` backed by in-memory records. Availability, grants and
//! read failures can be flipped at runtime, and every read is recorded so
//! tests can assert what the gateway asked for. Also backs the CLI.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    HealthPermission, HealthStore, HeartRateRecord, HrvRmssdRecord, RecordSample,
    StoreAvailability, TimeRange,
};
use crate::error::HealthStoreError;
use crate::types::HeartRateSample;

const SIM_ORIGIN: &str = "sim.health.store";

struct SimState {
    availability: StoreAvailability,
    granted: HashSet<HealthPermission>,
    permission_query_fails: bool,
    read_failure: Option<String>,
    records: Vec<HeartRateRecord>,
    hrv_records: Vec<HrvRmssdRecord>,
    requested_ranges: Vec<TimeRange>,
}

pub struct SimHealthStore {
    state: Mutex<SimState>,
    native_hrv: bool,
    reads: AtomicUsize,
}

impl Default for SimHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHealthStore {
    /// An available store with no data and no grants.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                availability: StoreAvailability::Available,
                granted: HashSet::new(),
                permission_query_fails: false,
                read_failure: None,
                records: Vec::new(),
                hrv_records: Vec::new(),
                requested_ranges: Vec::new(),
            }),
            native_hrv: true,
            reads: AtomicUsize::new(0),
        }
    }

    /// Build a store holding `samples`, one record per source label.
    pub fn from_samples(samples: Vec<HeartRateSample>) -> Self {
        let mut by_origin: BTreeMap<String, Vec<RecordSample>> = BTreeMap::new();
        for sample in samples {
            by_origin.entry(sample.source).or_default().push(RecordSample {
                beats_per_minute: sample.beats_per_minute,
                time: sample.timestamp,
            });
        }
        let store = Self::new();
        for (origin, samples) in by_origin {
            store.push_record(HeartRateRecord { origin, samples });
        }
        store
    }

    /// Present the store as one without native HRV-RMSSD records.
    pub fn without_native_hrv(mut self) -> Self {
        self.native_hrv = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_availability(&self, availability: StoreAvailability) {
        self.state().availability = availability;
    }

    pub fn grant(&self, permission: HealthPermission) {
        self.state().granted.insert(permission);
    }

    pub fn grant_all(&self) {
        let mut state = self.state();
        state.granted.insert(HealthPermission::ReadHeartRate);
        state.granted.insert(HealthPermission::ReadHrvRmssd);
    }

    pub fn revoke_all(&self) {
        self.state().granted.clear();
    }

    pub fn fail_permission_query(&self, fail: bool) {
        self.state().permission_query_fails = fail;
    }

    /// Make every subsequent read fail with the given message (`None` heals).
    pub fn fail_reads(&self, failure: Option<String>) {
        self.state().read_failure = failure;
    }

    pub fn push_record(&self, record: HeartRateRecord) {
        self.state().records.push(record);
    }

    pub fn push_hrv_record(&self, time: DateTime<Utc>, rmssd_millis: f64) {
        self.state().hrv_records.push(HrvRmssdRecord {
            origin: SIM_ORIGIN.to_string(),
            time,
            rmssd_millis,
        });
    }

    /// Number of record reads that reached the store.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Ranges requested by heart rate reads, in call order.
    pub fn requested_ranges(&self) -> Vec<TimeRange> {
        self.state().requested_ranges.clone()
    }

    fn begin_read(&self, state: &SimState) -> Result<(), HealthStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !state.availability.is_available() {
            return Err(HealthStoreError::Unavailable);
        }
        match &state.read_failure {
            Some(message) => Err(HealthStoreError::Io(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HealthStore for SimHealthStore {
    async fn availability(&self) -> StoreAvailability {
        self.state().availability
    }

    async fn granted_permissions(&self) -> Result<HashSet<HealthPermission>, HealthStoreError> {
        let state = self.state();
        if state.permission_query_fails {
            return Err(HealthStoreError::Remote("permission controller unreachable".into()));
        }
        Ok(state.granted.clone())
    }

    fn supports_native_hrv(&self) -> bool {
        self.native_hrv
    }

    async fn read_heart_rate_records(
        &self,
        range: TimeRange,
    ) -> Result<Vec<HeartRateRecord>, HealthStoreError> {
        let mut state = self.state();
        state.requested_ranges.push(range);
        self.begin_read(&state)?;

        let records = state
            .records
            .iter()
            .filter_map(|record| {
                let samples: Vec<RecordSample> = record
                    .samples
                    .iter()
                    .filter(|s| range.contains(&s.time))
                    .cloned()
                    .collect();
                if samples.is_empty() {
                    None
                } else {
                    Some(HeartRateRecord {
                        origin: record.origin.clone(),
                        samples,
                    })
                }
            })
            .collect();
        Ok(records)
    }

    async fn read_hrv_rmssd_records(
        &self,
        range: TimeRange,
    ) -> Result<Vec<HrvRmssdRecord>, HealthStoreError> {
        let state = self.state();
        self.begin_read(&state)?;
        Ok(state
            .hrv_records
            .iter()
            .filter(|r| range.contains(&r.time))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_read_filters_by_range() {
        let store = SimHealthStore::from_samples(vec![
            HeartRateSample::new(60, at(0), "a"),
            HeartRateSample::new(61, at(100), "a"),
            HeartRateSample::new(62, at(50), "b"),
        ]);

        let records = store
            .read_heart_rate_records(TimeRange::between(at(0), at(60)))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].origin, "a");
        assert_eq!(records[0].samples.len(), 1);
        assert_eq!(records[1].origin, "b");
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_query_can_fail() {
        let store = SimHealthStore::new();
        store.grant_all();
        assert_eq!(store.granted_permissions().await.unwrap().len(), 2);
        store.fail_permission_query(true);
        assert!(store.granted_permissions().await.is_err());
        store.revoke_all();
        store.fail_permission_query(false);
        assert!(store.granted_permissions().await.unwrap().is_empty());
    }
}
