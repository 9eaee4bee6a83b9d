//! Companion device layer
//!
//! Abstracts the message/data-item channel to a paired wearable, defines
//! the heart rate monitoring protocol spoken over it, and provides an
//! in-process simulated transport for testing.

pub mod channel;
pub mod payload;
pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CompanionError;

pub use channel::CompanionChannel;
pub use payload::{DataMap, DataValue};
pub use simulated::SimCompanionTransport;

/// Capability advertised by nodes able to stream heart rate.
pub const CAPABILITY_HEART_RATE: &str = "heart_rate_monitoring";
/// Data item path carrying heart rate payloads (both directions).
pub const PATH_HEART_RATE: &str = "/heart_rate";
pub const PATH_START_MONITORING: &str = "/start_monitoring";
pub const PATH_STOP_MONITORING: &str = "/stop_monitoring";
pub const KEY_BPM: &str = "bpm";
/// Epoch milliseconds.
pub const KEY_TIMESTAMP: &str = "timestamp";

/// A paired device known to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub display_name: String,
    pub is_nearby: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEventKind {
    Changed,
    Deleted,
}

/// A data item change pushed by the transport.
#[derive(Debug, Clone)]
pub struct DataEvent {
    pub kind: DataEventKind,
    pub path: String,
    pub payload: Vec<u8>,
}

/// Callback invoked with each batch of data events.
pub type DataListener = Arc<dyn Fn(&[DataEvent]) + Send + Sync>;

/// What the pipeline needs from the wearable transport.
#[async_trait]
pub trait CompanionTransport: Send + Sync {
    /// Reachable nodes advertising `capability`.
    async fn find_nodes(&self, capability: &str) -> Result<Vec<Node>, CompanionError>;

    /// All currently connected nodes, regardless of capability.
    async fn connected_nodes(&self) -> Result<Vec<Node>, CompanionError>;

    /// Send a one-shot message to a node.
    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<(), CompanionError>;

    /// Write a synchronized data item.
    async fn put_data_item(&self, path: &str, payload: Vec<u8>) -> Result<(), CompanionError>;

    /// Register a data listener. Returns its registration ID.
    fn add_data_listener(&self, listener: DataListener) -> Uuid;

    /// Remove a data listener.
    fn remove_data_listener(&self, listener_id: Uuid);
}
