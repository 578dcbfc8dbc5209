//! Node registry: what the gateway knows about each mesh node.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use meshota_protocol::NodeId;
use serde::Serialize;
use tracing::{debug, info};

/// Reachability of a node as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Heard from recently
    Online,
    /// Silent past the liveness threshold or disconnected
    Offline,
    /// An update session exists for this node
    Updating,
}

/// One node's registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    /// Mesh node id
    pub id: NodeId,
    /// Logical device class, once reported
    pub role: Option<String>,
    /// Firmware version the node last reported
    pub reported_version: Option<String>,
    /// Human-readable name from sensor traffic
    pub device_name: Option<String>,
    /// Current status
    pub status: NodeStatus,
    /// Wall-clock time of the last inbound message
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip)]
    last_seen: Instant,
}

impl NodeRecord {
    fn new(id: NodeId, now: Instant) -> Self {
        Self {
            id,
            role: None,
            reported_version: None,
            device_name: None,
            status: NodeStatus::Online,
            last_seen_at: Utc::now(),
            last_seen: now,
        }
    }

    /// Monotonic time of the last inbound message.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Fields carried by an inbound message that describe its sender.
#[derive(Debug, Clone, Default)]
pub struct NodeReport<'a> {
    /// Reported role
    pub role: Option<&'a str>,
    /// Reported running version
    pub version: Option<&'a str>,
    /// Reported device name
    pub device_name: Option<&'a str>,
}

/// Owned collection of node records, mutated only by the gateway loop.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, NodeRecord>,
    offline_after: Duration,
}

impl NodeRegistry {
    /// Empty registry with the given liveness threshold.
    pub fn new(offline_after: Duration) -> Self {
        Self {
            nodes: BTreeMap::new(),
            offline_after,
        }
    }

    /// Record an inbound message from `id`, creating the record on first
    /// contact. An offline node comes back online; an updating node stays
    /// updating.
    pub fn observe(&mut self, id: NodeId, report: NodeReport<'_>, now: Instant) -> &NodeRecord {
        let record = self.nodes.entry(id).or_insert_with(|| {
            info!("Registered node {}", id);
            NodeRecord::new(id, now)
        });
        record.last_seen = now;
        record.last_seen_at = Utc::now();
        if record.status == NodeStatus::Offline {
            debug!("Node {} back online", id);
            record.status = NodeStatus::Online;
        }
        if let Some(role) = report.role.filter(|r| !r.is_empty()) {
            record.role = Some(role.to_string());
        }
        if let Some(version) = report.version.filter(|v| !v.is_empty()) {
            record.reported_version = Some(version.to_string());
        }
        if let Some(name) = report.device_name.filter(|n| !n.is_empty()) {
            record.device_name = Some(name.to_string());
        }
        record
    }

    /// Bridge reported the node joining the mesh.
    pub fn mark_connected(&mut self, id: NodeId, now: Instant) -> &NodeRecord {
        self.observe(id, NodeReport::default(), now)
    }

    /// Mark a node offline after a bridge disconnect or timeout notice.
    ///
    /// Unknown nodes are ignored, and a node being updated keeps its status
    /// until its session ends.
    pub fn mark_disconnected(&mut self, id: NodeId) {
        if let Some(record) = self.nodes.get_mut(&id)
            && record.status == NodeStatus::Online
        {
            info!("Node {} offline", id);
            record.status = NodeStatus::Offline;
        }
    }

    /// Set a node's status directly (session start and end).
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) {
        if let Some(record) = self.nodes.get_mut(&id) {
            record.status = status;
        }
    }

    /// Record the version a node reported after a successful update.
    pub fn set_version(&mut self, id: NodeId, version: &str) {
        if let Some(record) = self.nodes.get_mut(&id) {
            record.reported_version = Some(version.to_string());
        }
    }

    /// Mark silent online nodes offline. Returns the nodes that changed.
    pub fn sweep_liveness(&mut self, now: Instant) -> Vec<NodeId> {
        let mut gone = Vec::new();
        for record in self.nodes.values_mut() {
            let silent = now.saturating_duration_since(record.last_seen);
            if record.status == NodeStatus::Online && silent > self.offline_after {
                record.status = NodeStatus::Offline;
                gone.push(record.id);
            }
        }
        for id in &gone {
            info!("Node {} offline after {:?} of silence", id, self.offline_after);
        }
        gone
    }

    /// Look up one node
    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    /// All nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is known
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in `status`
    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.values().filter(|n| n.status == status).count()
    }
}
