//! Transport seams used by the router.
//!
//! The mesh stack and the serial port are external; the router only needs
//! to hand them whole lines. The in-memory implementations here back
//! single-process deployments and tests.

use meshota_protocol::NodeId;

/// The radio mesh, as seen from the bridge.
pub trait MeshTransport {
    /// Mesh id of the bridge itself
    fn node_id(&self) -> NodeId;

    /// Send `line` to one node. Returns false if the mesh refused it.
    fn unicast(&mut self, node: NodeId, line: &str) -> bool;

    /// Send `line` to every node
    fn broadcast(&mut self, line: &str);
}

/// The serial link toward the gateway.
pub trait SerialLink {
    /// Write one line (without terminator)
    fn send_line(&mut self, line: &str);
}

impl SerialLink for Vec<String> {
    fn send_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// A frame sent over [`MeshOutbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshFrame {
    /// Addressed to one node
    Unicast(NodeId, String),
    /// Addressed to every node
    Broadcast(String),
}

impl MeshFrame {
    /// Line carried by the frame
    pub fn line(&self) -> &str {
        match self {
            MeshFrame::Unicast(_, line) | MeshFrame::Broadcast(line) => line,
        }
    }

    /// Whether `node` should receive the frame
    pub fn reaches(&self, node: NodeId) -> bool {
        match self {
            MeshFrame::Unicast(target, _) => *target == node,
            MeshFrame::Broadcast(_) => true,
        }
    }
}

/// Mesh transport that collects outgoing frames for the host to deliver.
#[derive(Debug, Clone)]
pub struct MeshOutbox {
    id: NodeId,
    frames: Vec<MeshFrame>,
}

impl MeshOutbox {
    /// Outbox for a bridge with mesh id `id`
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            frames: Vec::new(),
        }
    }

    /// Frames queued so far
    pub fn frames(&self) -> &[MeshFrame] {
        &self.frames
    }

    /// Remove and return every queued frame
    pub fn take(&mut self) -> Vec<MeshFrame> {
        std::mem::take(&mut self.frames)
    }
}

impl MeshTransport for MeshOutbox {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn unicast(&mut self, node: NodeId, line: &str) -> bool {
        self.frames.push(MeshFrame::Unicast(node, line.to_string()));
        true
    }

    fn broadcast(&mut self, line: &str) {
        self.frames.push(MeshFrame::Broadcast(line.to_string()));
    }
}
