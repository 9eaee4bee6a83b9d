//! CompanionChannel - heart rate monitoring protocol over a `CompanionTransport`
//!
//! Control calls report a plain success flag; transport faults are logged
//! and swallowed. Live samples arrive as an `EventStream` in which a bad
//! payload becomes a single `Error` item.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use super::payload::DataMap;
use super::{
    CompanionTransport, DataEvent, DataEventKind, DataListener, Node, CAPABILITY_HEART_RATE,
    KEY_BPM, KEY_TIMESTAMP, PATH_HEART_RATE, PATH_START_MONITORING, PATH_STOP_MONITORING,
};
use crate::error::PayloadError;
use crate::stream::EventStream;
use crate::types::heartrate::COMPANION_SOURCE;
use crate::types::{HeartRateSample, OperationResult};

pub const PARSE_FAILED: &str = "Failed to parse heart rate data";

#[derive(Clone)]
pub struct CompanionChannel {
    transport: Arc<dyn CompanionTransport>,
}

impl CompanionChannel {
    pub fn new(transport: Arc<dyn CompanionTransport>) -> Self {
        Self { transport }
    }

    /// Reachable nodes able to stream heart rate; empty on any failure.
    pub async fn find_heart_rate_devices(&self) -> Vec<Node> {
        match self.transport.find_nodes(CAPABILITY_HEART_RATE).await {
            Ok(nodes) => nodes,
            Err(e) => {
                log::warn!("Capability lookup failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn is_device_connected(&self) -> bool {
        !self.find_heart_rate_devices().await.is_empty()
    }

    /// Every connected node regardless of capability; empty on failure.
    pub async fn connected_nodes(&self) -> Vec<Node> {
        match self.transport.connected_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                log::warn!("Connected node query failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn start_monitoring(&self) -> bool {
        self.broadcast_control(PATH_START_MONITORING).await
    }

    pub async fn stop_monitoring(&self) -> bool {
        self.broadcast_control(PATH_STOP_MONITORING).await
    }

    /// Send an empty control message to every capable node and wait for all sends.
    async fn broadcast_control(&self, path: &str) -> bool {
        let nodes = self.find_heart_rate_devices().await;
        if nodes.is_empty() {
            log::info!("No heart rate device reachable for {}", path);
            return false;
        }

        let sends = nodes
            .iter()
            .map(|node| self.transport.send_message(&node.id, path, &[]));
        let results = join_all(sends).await;

        let mut all_sent = true;
        for (node, result) in nodes.iter().zip(results) {
            if let Err(e) = result {
                log::warn!("Failed to send {} to {}: {}", path, node.id, e);
                all_sent = false;
            }
        }
        all_sent
    }

    /// Live heart rate samples pushed by the companion device.
    ///
    /// Holds one listener registration, removed when the stream is
    /// cancelled or dropped.
    pub fn listen_for_heart_rate_data(&self) -> EventStream<OperationResult<HeartRateSample>> {
        let transport = Arc::clone(&self.transport);
        EventStream::listen(move |sink| {
            let listener: DataListener = Arc::new(move |events: &[DataEvent]| {
                for event in events {
                    if event.kind != DataEventKind::Changed || event.path != PATH_HEART_RATE {
                        continue;
                    }
                    let item = match decode_sample(&event.payload) {
                        Ok(sample) => OperationResult::Success(sample),
                        Err(e) => {
                            log::warn!("Malformed heart rate payload: {}", e);
                            OperationResult::error_with_cause(PARSE_FAILED, e)
                        }
                    };
                    sink.try_send(item);
                }
            });
            let listener_id = transport.add_data_listener(listener);
            log::debug!("Registered heart rate listener {}", listener_id);
            move || {
                transport.remove_data_listener(listener_id);
                log::debug!("Removed heart rate listener {}", listener_id);
            }
        })
    }

    /// Push a reading to the companion for display.
    pub async fn send_heart_rate_to_wear(&self, beats_per_minute: u32) -> bool {
        let payload = DataMap::new()
            .put_long(KEY_BPM, i64::from(beats_per_minute))
            .put_long(KEY_TIMESTAMP, Utc::now().timestamp_millis());

        let bytes = match payload.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Failed to encode heart rate payload: {}", e);
                return false;
            }
        };

        match self.transport.put_data_item(PATH_HEART_RATE, bytes).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to push heart rate to companion: {}", e);
                false
            }
        }
    }
}

/// Encode a sample the way the companion device sends it.
pub fn encode_sample(
    beats_per_minute: u32,
    timestamp: DateTime<Utc>,
) -> Result<Vec<u8>, PayloadError> {
    DataMap::new()
        .put_long(KEY_BPM, i64::from(beats_per_minute))
        .put_long(KEY_TIMESTAMP, timestamp.timestamp_millis())
        .to_bytes()
}

/// Decode an inbound `{bpm, timestamp}` payload.
pub fn decode_sample(payload: &[u8]) -> Result<HeartRateSample, PayloadError> {
    let map = DataMap::from_bytes(payload)?;

    let bpm = map.get_long(KEY_BPM)?;
    let beats_per_minute = u32::try_from(bpm)
        .ok()
        .filter(|b| *b > 0)
        .ok_or_else(|| PayloadError::OutOfRange {
            key: KEY_BPM.to_string(),
            value: bpm,
        })?;

    let millis = map.get_long(KEY_TIMESTAMP)?;
    let timestamp =
        DateTime::from_timestamp_millis(millis).ok_or_else(|| PayloadError::OutOfRange {
            key: KEY_TIMESTAMP.to_string(),
            value: millis,
        })?;

    Ok(HeartRateSample::new(beats_per_minute, timestamp, COMPANION_SOURCE))
}
