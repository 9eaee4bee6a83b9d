//! End-to-end pipeline test over the simulated collaborators
//!
//! Drives the health gateway, the companion channel and the monitor
//! together: store gating, HRV computation, periodic polling, and a live
//! companion session from start to stop.
//!
//! Run with:
//!   cargo test --test pipeline

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use futures_util::StreamExt;

use cardiolink::companion::{
    SimCompanionTransport, CAPABILITY_HEART_RATE, PATH_START_MONITORING, PATH_STOP_MONITORING,
};
use cardiolink::config::MonitorConfig;
use cardiolink::health::{HeartRateRecord, RecordSample, SimHealthStore};
use cardiolink::{CompanionChannel, HealthGateway, HealthMonitor, OperationResult};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// BPM series whose RR intervals are exactly 800/1000 ms alternating.
fn alternating_record(origin: &str, count: usize) -> HeartRateRecord {
    let now = Utc::now();
    HeartRateRecord {
        origin: origin.to_string(),
        samples: (0..count)
            .map(|i| RecordSample {
                beats_per_minute: if i % 2 == 0 { 75 } else { 60 },
                time: now - Duration::minutes(count as i64 - i as i64),
            })
            .collect(),
    }
}

fn granted_store() -> Arc<SimHealthStore> {
    let store = Arc::new(SimHealthStore::new());
    store.grant_all();
    store
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_recent_metrics_from_store() {
    let store = granted_store();
    store.push_record(alternating_record("com.example.watch", 10));
    let gateway = HealthGateway::new(store);

    let metrics = gateway.get_recent_hrv_metrics(1).await.success().unwrap();
    assert_eq!(metrics.sample_count, 10);
    assert!(metrics.is_valid());
    // every successive difference is 200 ms
    assert!((metrics.rmssd - 200.0).abs() < 1e-9);
    assert!((metrics.sdnn - 100.0).abs() < 1e-9);
    assert!((metrics.pnn50 - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_revoked_grant_is_seen_on_next_call() {
    let store = granted_store();
    store.push_record(alternating_record("app", 4));
    let gateway = HealthGateway::new(store.clone());

    assert!(gateway.get_recent_hrv_metrics(1).await.is_success());
    store.revoke_all();
    assert!(matches!(
        gateway.get_recent_hrv_metrics(1).await,
        OperationResult::PermissionDenied
    ));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_stream_restarts_on_resubscribe() {
    let store = granted_store();
    let gateway = HealthGateway::new(store.clone());

    let first: Vec<_> = gateway.stream_heart_rate_data(1).take(2).collect().await;
    assert_eq!(first.len(), 2);

    let mut second = gateway.stream_heart_rate_data(1);
    assert!(second.next().await.unwrap().is_success());
    second.cancel();

    let reads = store.read_count();
    tokio::time::sleep(StdDuration::from_secs(600)).await;
    assert_eq!(store.read_count(), reads);
}

#[tokio::test]
async fn test_live_session_round_trip() {
    let store = granted_store();
    let transport = Arc::new(SimCompanionTransport::new());
    transport.add_node("pixel-watch", &[CAPABILITY_HEART_RATE]);

    let monitor = HealthMonitor::new(
        HealthGateway::new(store),
        CompanionChannel::new(transport.clone()),
        MonitorConfig::default(),
    );

    assert!(monitor.start_monitoring().await);
    let mut bpm = monitor.subscribe_current_bpm();
    transport.push_heart_rate(66, Utc::now());
    tokio::time::timeout(StdDuration::from_secs(5), bpm.wait_for(|b| *b == Some(66)))
        .await
        .unwrap()
        .unwrap();

    assert!(monitor.stop_monitoring().await);
    let paths: Vec<String> = transport.sent_messages().into_iter().map(|m| m.path).collect();
    assert_eq!(paths, vec![PATH_START_MONITORING, PATH_STOP_MONITORING]);
    assert_eq!(transport.listener_count(), 0);
    assert_eq!(transport.listener_removals(), 1);

    let snap = monitor.snapshot();
    assert!(!snap.monitoring);
    assert_eq!(snap.recent_samples.len(), 1);
    assert_eq!(snap.recent_samples[0].source, "companion device");
}
