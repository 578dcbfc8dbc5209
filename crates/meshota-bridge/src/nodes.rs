//! Bridge-side table of mesh nodes and their heartbeat state.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use meshota_protocol::NodeId;
use serde::Serialize;

/// One node heard on the mesh.
#[derive(Debug, Clone, Serialize)]
pub struct MeshNode {
    /// Mesh node id
    pub id: NodeId,
    /// Name from sensor traffic
    pub device_name: Option<String>,
    /// Firmware version from sensor traffic
    pub fw_version: Option<String>,
    /// Consecutive liveness checks the node was silent for
    pub missed_heartbeats: u32,
    #[serde(skip)]
    last_seen: Instant,
}

impl MeshNode {
    /// Time of the last message from the node
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Nodes currently considered connected.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: BTreeMap<NodeId, MeshNode>,
}

impl NodeTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record traffic from `id`. Returns true on first contact.
    pub fn touch(&mut self, id: NodeId, now: Instant) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.last_seen = now;
                node.missed_heartbeats = 0;
                false
            }
            None => {
                self.nodes.insert(
                    id,
                    MeshNode {
                        id,
                        device_name: None,
                        fw_version: None,
                        missed_heartbeats: 0,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Remember the name and version a node reports in its sensor traffic.
    pub fn describe(&mut self, id: NodeId, device_name: Option<&str>, fw_version: Option<&str>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if let Some(name) = device_name {
                node.device_name = Some(name.to_string());
            }
            if let Some(version) = fw_version {
                node.fw_version = Some(version.to_string());
            }
        }
    }

    /// Forget `id`
    pub fn remove(&mut self, id: NodeId) -> Option<MeshNode> {
        self.nodes.remove(&id)
    }

    /// Count a missed heartbeat for every node silent longer than `timeout`
    /// and remove those that reached `max_missed`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration, max_missed: u32) -> Vec<MeshNode> {
        for node in self.nodes.values_mut() {
            if now.saturating_duration_since(node.last_seen) > timeout {
                node.missed_heartbeats = node.missed_heartbeats.saturating_add(1);
            }
        }
        let expired: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.missed_heartbeats >= max_missed)
            .map(|n| n.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.nodes.remove(&id))
            .collect()
    }

    /// Look up one node
    pub fn get(&self, id: NodeId) -> Option<&MeshNode> {
        self.nodes.get(&id)
    }

    /// Ids of every connected node
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Iterate over nodes
    pub fn iter(&self) -> impl Iterator<Item = &MeshNode> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No nodes connected
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_needs_consecutive_misses() {
        let mut table = NodeTable::new();
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        assert!(table.touch(NodeId(1), start));
        assert!(!table.touch(NodeId(1), start));

        let t1 = start + Duration::from_secs(31);
        assert!(table.sweep(t1, timeout, 2).is_empty());
        assert_eq!(table.get(NodeId(1)).map(|n| n.missed_heartbeats), Some(1));

        // Traffic clears the count.
        table.touch(NodeId(1), t1);
        let t2 = t1 + Duration::from_secs(31);
        assert!(table.sweep(t2, timeout, 2).is_empty());

        let t3 = t2 + Duration::from_secs(20);
        let gone = table.sweep(t3, timeout, 2);
        assert_eq!(gone.len(), 1);
        assert!(table.is_empty());
    }
}
