//! In-process companion transport
//!
//! Simulates a set of paired nodes, the message channel to them and the
//! data-item listener registry, entirely in memory. Used for testing and
//! by the CLI without requiring a real wearable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::channel::encode_sample;
use super::{CompanionTransport, DataEvent, DataEventKind, DataListener, Node, PATH_HEART_RATE};
use crate::error::CompanionError;

/// A message accepted by the simulated transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub node_id: String,
    pub path: String,
    pub payload: Vec<u8>,
}

struct SimNode {
    node: Node,
    capabilities: HashSet<String>,
    reachable: bool,
    fail_sends: bool,
}

#[derive(Default)]
struct SimState {
    nodes: Vec<SimNode>,
    listeners: HashMap<Uuid, DataListener>,
    sent: Vec<SentMessage>,
    data_items: Vec<(String, Vec<u8>)>,
    discovery_fails: bool,
    data_items_fail: bool,
}

#[derive(Default)]
pub struct SimCompanionTransport {
    state: Mutex<SimState>,
    removals: AtomicUsize,
}

impl SimCompanionTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pair a reachable node advertising `capabilities`.
    pub fn add_node(&self, id: &str, capabilities: &[&str]) {
        self.state().nodes.push(SimNode {
            node: Node {
                id: id.to_string(),
                display_name: format!("Sim {}", id),
                is_nearby: true,
            },
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            reachable: true,
            fail_sends: false,
        });
    }

    pub fn set_reachable(&self, id: &str, reachable: bool) {
        if let Some(n) = self.state().nodes.iter_mut().find(|n| n.node.id == id) {
            n.reachable = reachable;
        }
    }

    pub fn fail_sends_to(&self, id: &str) {
        if let Some(n) = self.state().nodes.iter_mut().find(|n| n.node.id == id) {
            n.fail_sends = true;
        }
    }

    pub fn fail_discovery(&self, fail: bool) {
        self.state().discovery_fails = fail;
    }

    pub fn fail_data_items(&self, fail: bool) {
        self.state().data_items_fail = fail;
    }

    /// Deliver a `Changed` data event to every registered listener.
    pub fn push_raw(&self, path: &str, payload: Vec<u8>) {
        let event = DataEvent {
            kind: DataEventKind::Changed,
            path: path.to_string(),
            payload,
        };
        self.dispatch(&[event]);
    }

    /// Deliver a well-formed heart rate payload, as a watch would.
    pub fn push_heart_rate(&self, beats_per_minute: u32, timestamp: DateTime<Utc>) {
        match encode_sample(beats_per_minute, timestamp) {
            Ok(payload) => self.push_raw(PATH_HEART_RATE, payload),
            Err(e) => log::warn!("Sim transport could not encode sample: {}", e),
        }
    }

    /// Call listeners outside the lock so they may re-enter the transport.
    pub fn dispatch(&self, events: &[DataEvent]) {
        let listeners: Vec<DataListener> = self.state().listeners.values().cloned().collect();
        for listener in listeners {
            listener(events);
        }
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    pub fn data_items(&self) -> Vec<(String, Vec<u8>)> {
        self.state().data_items.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Number of successful `remove_data_listener` calls.
    pub fn listener_removals(&self) -> usize {
        self.removals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompanionTransport for SimCompanionTransport {
    async fn find_nodes(&self, capability: &str) -> Result<Vec<Node>, CompanionError> {
        let state = self.state();
        if state.discovery_fails {
            return Err(CompanionError::Timeout);
        }
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.reachable && n.capabilities.contains(capability))
            .map(|n| n.node.clone())
            .collect())
    }

    async fn connected_nodes(&self) -> Result<Vec<Node>, CompanionError> {
        let state = self.state();
        if state.discovery_fails {
            return Err(CompanionError::Timeout);
        }
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.reachable)
            .map(|n| n.node.clone())
            .collect())
    }

    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        payload: &[u8],
    ) -> Result<(), CompanionError> {
        let mut state = self.state();
        let node = state
            .nodes
            .iter()
            .find(|n| n.node.id == node_id)
            .ok_or_else(|| CompanionError::NodeUnreachable(node_id.to_string()))?;
        if !node.reachable {
            return Err(CompanionError::NodeUnreachable(node_id.to_string()));
        }
        if node.fail_sends {
            return Err(CompanionError::SendFailed(format!("{} rejected {}", node_id, path)));
        }
        state.sent.push(SentMessage {
            node_id: node_id.to_string(),
            path: path.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn put_data_item(&self, path: &str, payload: Vec<u8>) -> Result<(), CompanionError> {
        let mut state = self.state();
        if state.data_items_fail {
            return Err(CompanionError::DataItemFailed(path.to_string()));
        }
        state.data_items.push((path.to_string(), payload));
        Ok(())
    }

    fn add_data_listener(&self, listener: DataListener) -> Uuid {
        let id = Uuid::new_v4();
        self.state().listeners.insert(id, listener);
        id
    }

    fn remove_data_listener(&self, listener_id: Uuid) {
        if self.state().listeners.remove(&listener_id).is_some() {
            self.removals.fetch_add(1, Ordering::SeqCst);
        }
    }
}
