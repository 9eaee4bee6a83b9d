//! HealthMonitor - observable state over the gateway and companion channel
//!
//! The monitor is the single writer of its published view. Readers observe
//! through `watch` receivers. Every gateway outcome maps onto the view:
//! successes replace data and clear the error, failures replace the error.
//! A standing error never blocks the next operation.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::companion::CompanionChannel;
use crate::config::MonitorConfig;
use crate::health::gateway::INVALID_RANGE;
use crate::health::{HealthGateway, TimeRange};
use crate::types::{HeartRateSample, HrvMetrics, OperationResult};

pub const PERMISSION_DENIED_MESSAGE: &str =
    "Permission denied. Please grant health store permissions.";
pub const NOT_AVAILABLE_MESSAGE: &str = "Health store is not available on this device.";
pub const MONITORING_FAILED_MESSAGE: &str =
    "Failed to start monitoring. Is your companion device connected?";

/// Point-in-time copy of every published channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub store_available: bool,
    pub permissions_granted: bool,
    pub companion_connected: bool,
    pub metrics: Option<HrvMetrics>,
    pub recent_samples: Vec<HeartRateSample>,
    pub current_bpm: Option<u32>,
    pub monitoring: bool,
    pub last_error: Option<String>,
}

struct MonitorState {
    store_available: watch::Sender<bool>,
    permissions_granted: watch::Sender<bool>,
    companion_connected: watch::Sender<bool>,
    metrics: watch::Sender<Option<HrvMetrics>>,
    recent_samples: watch::Sender<Vec<HeartRateSample>>,
    current_bpm: watch::Sender<Option<u32>>,
    monitoring: watch::Sender<bool>,
    last_error: watch::Sender<Option<String>>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            store_available: watch::channel(false).0,
            permissions_granted: watch::channel(false).0,
            companion_connected: watch::channel(false).0,
            metrics: watch::channel(None).0,
            recent_samples: watch::channel(Vec::new()).0,
            current_bpm: watch::channel(None).0,
            monitoring: watch::channel(false).0,
            last_error: watch::channel(None).0,
        }
    }

    fn publish_error(&self, message: impl Into<String>) {
        self.last_error.send_replace(Some(message.into()));
    }

    fn publish_failure<T>(&self, result: OperationResult<T>) {
        match result {
            OperationResult::Success(_) => {}
            OperationResult::PermissionDenied => {
                self.publish_error(PERMISSION_DENIED_MESSAGE);
                self.permissions_granted.send_replace(false);
            }
            OperationResult::NotAvailable => {
                self.publish_error(NOT_AVAILABLE_MESSAGE);
                self.store_available.send_replace(false);
            }
            OperationResult::Error { message, .. } => self.publish_error(message),
        }
    }

    fn record_live_sample(&self, sample: HeartRateSample, cap: usize) {
        let bpm = sample.beats_per_minute;
        self.recent_samples.send_modify(|samples| {
            samples.push(sample);
            if samples.len() > cap {
                let excess = samples.len() - cap;
                samples.drain(..excess);
            }
        });
        self.current_bpm.send_replace(Some(bpm));
    }
}

pub struct HealthMonitor {
    gateway: HealthGateway,
    companion: CompanionChannel,
    config: MonitorConfig,
    state: Arc<MonitorState>,
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(gateway: HealthGateway, companion: CompanionChannel, config: MonitorConfig) -> Self {
        Self {
            gateway,
            companion,
            config,
            state: Arc::new(MonitorState::new()),
            collector: Mutex::new(None),
        }
    }

    fn collector_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.collector.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe_store_available(&self) -> watch::Receiver<bool> {
        self.state.store_available.subscribe()
    }

    pub fn subscribe_permissions_granted(&self) -> watch::Receiver<bool> {
        self.state.permissions_granted.subscribe()
    }

    pub fn subscribe_companion_connected(&self) -> watch::Receiver<bool> {
        self.state.companion_connected.subscribe()
    }

    pub fn subscribe_metrics(&self) -> watch::Receiver<Option<HrvMetrics>> {
        self.state.metrics.subscribe()
    }

    pub fn subscribe_recent_samples(&self) -> watch::Receiver<Vec<HeartRateSample>> {
        self.state.recent_samples.subscribe()
    }

    pub fn subscribe_current_bpm(&self) -> watch::Receiver<Option<u32>> {
        self.state.current_bpm.subscribe()
    }

    pub fn subscribe_monitoring(&self) -> watch::Receiver<bool> {
        self.state.monitoring.subscribe()
    }

    pub fn subscribe_last_error(&self) -> watch::Receiver<Option<String>> {
        self.state.last_error.subscribe()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            store_available: *self.state.store_available.borrow(),
            permissions_granted: *self.state.permissions_granted.borrow(),
            companion_connected: *self.state.companion_connected.borrow(),
            metrics: self.state.metrics.borrow().clone(),
            recent_samples: self.state.recent_samples.borrow().clone(),
            current_bpm: *self.state.current_bpm.borrow(),
            monitoring: *self.state.monitoring.borrow(),
            last_error: self.state.last_error.borrow().clone(),
        }
    }

    pub async fn check_availability(&self) {
        let available = self.gateway.is_available().await;
        self.state.store_available.send_replace(available);
    }

    pub async fn check_permissions(&self) {
        let granted = self.gateway.has_all_permissions().await;
        self.state.permissions_granted.send_replace(granted);
    }

    pub async fn check_companion(&self) {
        let connected = self.companion.is_device_connected().await;
        self.state.companion_connected.send_replace(connected);
    }

    /// Re-run every check and reload the default window.
    pub async fn refresh_all(&self) {
        self.check_availability().await;
        self.check_permissions().await;
        self.check_companion().await;
        self.load_samples(self.config.default_hours_back).await;
        self.compute_metrics(self.config.default_hours_back).await;
    }

    pub async fn compute_metrics(&self, hours_back: u32) {
        match self.gateway.get_recent_hrv_metrics(hours_back).await {
            OperationResult::Success(metrics) => {
                self.state.metrics.send_replace(Some(metrics));
                self.state.last_error.send_replace(None);
            }
            other => self.state.publish_failure(other),
        }
    }

    pub async fn load_samples(&self, hours_back: u32) {
        let Some(range) = TimeRange::trailing_hours(hours_back) else {
            self.state.publish_error(INVALID_RANGE);
            return;
        };
        match self.gateway.read_heart_rate_data(range.start, range.end).await {
            OperationResult::Success(samples) => {
                if let Some(latest) = samples.last() {
                    self.state.current_bpm.send_replace(Some(latest.beats_per_minute));
                }
                self.state.recent_samples.send_replace(samples);
                self.state.last_error.send_replace(None);
            }
            other => self.state.publish_failure(other),
        }
    }

    /// Ask the companion to start streaming and collect its samples.
    ///
    /// Returns whether the companion accepted. A running collector is
    /// replaced.
    pub async fn start_monitoring(&self) -> bool {
        if !self.companion.start_monitoring().await {
            self.state.publish_error(MONITORING_FAILED_MESSAGE);
            return false;
        }
        self.state.monitoring.send_replace(true);
        self.state.last_error.send_replace(None);

        let mut stream = self.companion.listen_for_heart_rate_data();
        let state = Arc::clone(&self.state);
        let cap = self.config.max_recent_samples;
        let handle = tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    OperationResult::Success(sample) => state.record_live_sample(sample, cap),
                    OperationResult::Error { message, .. } => state.publish_error(message),
                    OperationResult::PermissionDenied | OperationResult::NotAvailable => {}
                }
            }
        });

        let previous = self.collector_slot().replace(handle);
        if let Some(previous) = previous {
            join_collector(previous).await;
        }
        true
    }

    /// Ask the companion to stop and release the live listener.
    ///
    /// Returns whether the stop message reached every device; the local
    /// collector is torn down either way.
    pub async fn stop_monitoring(&self) -> bool {
        let stopped = self.companion.stop_monitoring().await;
        let collector = self.collector_slot().take();
        if let Some(handle) = collector {
            join_collector(handle).await;
        }
        self.state.monitoring.send_replace(false);
        stopped
    }

    pub fn clear_error(&self) {
        self.state.last_error.send_replace(None);
    }
}

/// Abort a collector and wait for it to finish unwinding.
async fn join_collector(handle: JoinHandle<()>) {
    handle.abort();
    if let Err(e) = handle.await {
        if !e.is_cancelled() {
            log::error!("Live sample collector failed: {}", e);
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.collector_slot().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::companion::{SimCompanionTransport, CAPABILITY_HEART_RATE};
    use crate::health::{HeartRateRecord, RecordSample, SimHealthStore, StoreAvailability};

    struct Fixture {
        store: Arc<SimHealthStore>,
        transport: Arc<SimCompanionTransport>,
        monitor: HealthMonitor,
    }

    fn fixture(config: MonitorConfig) -> Fixture {
        let store = Arc::new(SimHealthStore::new());
        let transport = Arc::new(SimCompanionTransport::new());
        let monitor = HealthMonitor::new(
            HealthGateway::new(store.clone()),
            CompanionChannel::new(transport.clone()),
            config,
        );
        Fixture {
            store,
            transport,
            monitor,
        }
    }

    fn recent_record(bpms: &[u32]) -> HeartRateRecord {
        let now = Utc::now();
        HeartRateRecord {
            origin: "app".into(),
            samples: bpms
                .iter()
                .enumerate()
                .map(|(i, bpm)| RecordSample {
                    beats_per_minute: *bpm,
                    time: now - Duration::minutes(30 - i as i64),
                })
                .collect(),
        }
    }

    async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut done: F)
    where
        F: FnMut(&T) -> bool,
    {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if done(&*rx.borrow_and_update()) {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_publishes_checks_and_metrics() {
        let f = fixture(MonitorConfig::default());
        f.store.grant_all();
        f.store.push_record(recent_record(&[75, 60, 75]));
        f.transport.add_node("watch", &[CAPABILITY_HEART_RATE]);

        f.monitor.refresh_all().await;
        let snap = f.monitor.snapshot();
        assert!(snap.store_available);
        assert!(snap.permissions_granted);
        assert!(snap.companion_connected);
        assert_eq!(snap.recent_samples.len(), 3);
        assert_eq!(snap.current_bpm, Some(75));
        assert_eq!(snap.metrics.unwrap().sample_count, 3);
        assert_eq!(snap.last_error, None);
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_until_cleared() {
        let f = fixture(MonitorConfig::default());
        f.monitor.compute_metrics(24).await;

        let snap = f.monitor.snapshot();
        assert_eq!(snap.last_error.as_deref(), Some(PERMISSION_DENIED_MESSAGE));
        assert!(!snap.permissions_granted);
        assert!(snap.metrics.is_none());

        f.monitor.clear_error();
        assert_eq!(f.monitor.snapshot().last_error, None);
    }

    #[tokio::test]
    async fn test_stale_error_does_not_block_next_operation() {
        let f = fixture(MonitorConfig::default());
        f.store.set_availability(StoreAvailability::NotInstalled);
        f.monitor.load_samples(1).await;
        assert_eq!(
            f.monitor.snapshot().last_error.as_deref(),
            Some(NOT_AVAILABLE_MESSAGE)
        );

        f.store.set_availability(StoreAvailability::Available);
        f.store.grant_all();
        f.store.push_record(recent_record(&[70, 72]));
        f.monitor.load_samples(1).await;
        let snap = f.monitor.snapshot();
        assert_eq!(snap.last_error, None);
        assert_eq!(snap.recent_samples.len(), 2);
    }

    #[tokio::test]
    async fn test_load_window_out_of_range_sets_error() {
        let f = fixture(MonitorConfig::default());
        f.store.grant_all();
        f.monitor.load_samples(u32::MAX).await;
        assert_eq!(
            f.monitor.snapshot().last_error.as_deref(),
            Some(INVALID_RANGE)
        );
        assert_eq!(f.store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_window_out_of_range_sets_error() {
        let f = fixture(MonitorConfig::default());
        f.store.grant_all();
        f.monitor.compute_metrics(u32::MAX).await;
        let snap = f.monitor.snapshot();
        assert_eq!(snap.last_error.as_deref(), Some(INVALID_RANGE));
        assert!(snap.metrics.is_none());
    }

    #[tokio::test]
    async fn test_insufficient_data_message() {
        let f = fixture(MonitorConfig::default());
        f.store.grant_all();
        f.store.push_record(recent_record(&[70]));
        f.monitor.compute_metrics(24).await;
        assert_eq!(
            f.monitor.snapshot().last_error.as_deref(),
            Some(crate::health::gateway::INSUFFICIENT_DATA)
        );
    }

    #[tokio::test]
    async fn test_start_without_device_reports_error() {
        let f = fixture(MonitorConfig::default());
        assert!(!f.monitor.start_monitoring().await);
        let snap = f.monitor.snapshot();
        assert!(!snap.monitoring);
        assert_eq!(snap.last_error.as_deref(), Some(MONITORING_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn test_live_samples_flow_until_stopped() {
        let config = MonitorConfig {
            max_recent_samples: 2,
            ..MonitorConfig::default()
        };
        let f = fixture(config);
        f.transport.add_node("watch", &[CAPABILITY_HEART_RATE]);

        assert!(f.monitor.start_monitoring().await);
        assert!(f.monitor.snapshot().monitoring);
        assert_eq!(f.transport.listener_count(), 1);

        let mut bpm_rx = f.monitor.subscribe_current_bpm();
        for bpm in [70, 71, 72] {
            f.transport.push_heart_rate(bpm, Utc::now());
        }
        wait_for(&mut bpm_rx, |bpm| *bpm == Some(72)).await;
        let samples = f.monitor.snapshot().recent_samples;
        assert_eq!(
            samples.iter().map(|s| s.beats_per_minute).collect::<Vec<_>>(),
            vec![71, 72]
        );

        assert!(f.monitor.stop_monitoring().await);
        assert!(!f.monitor.snapshot().monitoring);
        assert_eq!(f.transport.listener_count(), 0);
        assert_eq!(f.transport.listener_removals(), 1);

        f.transport.push_heart_rate(99, Utc::now());
        tokio::task::yield_now().await;
        assert_eq!(f.monitor.snapshot().current_bpm, Some(72));
    }

    #[tokio::test]
    async fn test_restart_replaces_collector() {
        let f = fixture(MonitorConfig::default());
        f.transport.add_node("watch", &[CAPABILITY_HEART_RATE]);

        assert!(f.monitor.start_monitoring().await);
        assert!(f.monitor.start_monitoring().await);
        assert_eq!(f.transport.listener_count(), 1);
        assert_eq!(f.transport.listener_removals(), 1);
    }

    #[tokio::test]
    async fn test_join_collector_absorbs_failed_task() {
        let handle: JoinHandle<()> = tokio::spawn(async { panic!("collector crashed") });
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        join_collector(handle).await;
    }

    #[tokio::test]
    async fn test_malformed_live_payload_sets_error() {
        let f = fixture(MonitorConfig::default());
        f.transport.add_node("watch", &[CAPABILITY_HEART_RATE]);
        assert!(f.monitor.start_monitoring().await);

        let mut err_rx = f.monitor.subscribe_last_error();
        f.transport
            .push_raw(crate::companion::PATH_HEART_RATE, vec![0xff]);
        wait_for(&mut err_rx, |e| e.is_some()).await;
        assert_eq!(
            f.monitor.snapshot().last_error.as_deref(),
            Some(crate::companion::channel::PARSE_FAILED)
        );
        assert!(f.monitor.snapshot().monitoring);
    }
}
