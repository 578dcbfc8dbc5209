//! Bridge router: relays between the serial link and the mesh.
//!
//! Update-protocol lines (`ota_*`) cross the bridge verbatim and bypass the
//! queues; the only field read on the way down is `target_node`, found by
//! scan. Every other line from the mesh is classified by priority and goes
//! through the [`AdmissionQueue`], which [`BridgeRouter::poll`] drains on
//! its own timer alongside the heartbeat, liveness and status duties.

use std::time::Instant;

use meshota_protocol::{NodeId, OtaMessage, scan};
use meshota_scheduler::TickSchedule;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::nodes::{MeshNode, NodeTable};
use crate::priority::{Priority, PriorityClassifier};
use crate::queue::{AdmissionQueue, QueuedMessage};
use crate::transport::{MeshTransport, SerialLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duty {
    Drain,
    Heartbeat,
    Liveness,
    Status,
}

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Update messages forwarded mesh → serial
    pub ota_upstream: u64,
    /// Update messages forwarded serial → mesh
    pub ota_downstream: u64,
    /// High-priority messages queued
    pub queued_high: u64,
    /// Normal messages queued
    pub queued_normal: u64,
    /// Normal messages refused under congestion
    pub dropped_congestion: u64,
    /// Lines that could not be parsed or routed
    pub dropped_malformed: u64,
    /// Queued messages written to serial
    pub forwarded: u64,
    /// Heartbeat broadcasts sent
    pub heartbeats_sent: u64,
    /// Nodes dropped after missed heartbeats
    pub nodes_timed_out: u64,
}

/// The bridge's routing state and its two transports.
pub struct BridgeRouter<M, S> {
    config: BridgeConfig,
    mesh: M,
    serial: S,
    queue: AdmissionQueue,
    classifier: PriorityClassifier,
    nodes: NodeTable,
    schedule: TickSchedule<Duty>,
    started: Instant,
    stats: BridgeStats,
}

impl<M: MeshTransport, S: SerialLink> BridgeRouter<M, S> {
    /// Build a router.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: BridgeConfig, mesh: M, serial: S, now: Instant) -> anyhow::Result<Self> {
        config.validate()?;

        let mut schedule = TickSchedule::new(now);
        schedule.add(Duty::Drain, config.drain_interval())?;
        schedule.add(Duty::Heartbeat, config.heartbeat_interval())?;
        schedule.add(Duty::Liveness, config.heartbeat_interval())?;
        schedule.add(Duty::Status, config.status_interval())?;

        info!(
            "Bridge {} up as mesh node {} (queue {}, threshold {:.0}%)",
            config.gateway_id,
            mesh.node_id(),
            config.queue_capacity,
            config.congestion_threshold * 100.0
        );

        Ok(Self {
            queue: AdmissionQueue::new(config.queue_capacity, config.congestion_threshold),
            classifier: PriorityClassifier::new(config.priority_markers.iter().cloned()),
            nodes: NodeTable::new(),
            schedule,
            started: now,
            stats: BridgeStats::default(),
            config,
            mesh,
            serial,
        })
    }

    /// Handle a line received from mesh node `from`.
    pub fn on_mesh_message(&mut self, from: NodeId, line: &str, now: Instant) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.register(from, now);

        match scan::message_type(line) {
            Some("ota_check") => self.forward_check(from, line, now),
            Some(_) if scan::is_ota_line(line) => {
                self.serial.send_line(line);
                self.stats.ota_upstream = self.stats.ota_upstream.saturating_add(1);
                debug!("ota up from node {}", from);
            }
            Some("heartbeat_response") => debug!("Heartbeat response from node {}", from),
            _ => self.enqueue(from, line, now),
        }
    }

    /// Handle a line received from the gateway.
    pub fn on_serial_line(&mut self, line: &str, _now: Instant) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if scan::is_ota_line(line) {
            match scan::scan_target_node(line) {
                Some(target) => {
                    if self.mesh.unicast(target, line) {
                        self.stats.ota_downstream = self.stats.ota_downstream.saturating_add(1);
                    } else {
                        warn!("Mesh refused update message for node {}", target);
                    }
                }
                None => {
                    self.stats.dropped_malformed = self.stats.dropped_malformed.saturating_add(1);
                    warn!("Dropping update message without target_node");
                }
            }
            return;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => self.on_command(&value),
            Err(e) => {
                self.stats.dropped_malformed = self.stats.dropped_malformed.saturating_add(1);
                debug!("Ignoring unparseable serial line: {}", e);
            }
        }
    }

    /// Mesh layer reports a new neighbour.
    pub fn on_node_connected(&mut self, node: NodeId, now: Instant) {
        self.register(node, now);
    }

    /// Mesh layer reports a lost neighbour.
    pub fn on_node_disconnected(&mut self, node: NodeId) {
        if self.nodes.remove(node).is_some() {
            info!("Node {} disconnected", node);
            self.notify(&json!({
                "type": "node_disconnected",
                "node_id": node.get(),
                "reason": "mesh_disconnect",
            }));
        }
    }

    /// Run the timed duties that are due.
    pub fn poll(&mut self, now: Instant) {
        for duty in self.schedule.due(now) {
            match duty {
                Duty::Drain => {
                    self.drain();
                }
                Duty::Heartbeat => self.heartbeat(now),
                Duty::Liveness => self.check_liveness(now),
                Duty::Status => self.report_status(now),
            }
        }
    }

    /// Forward one pass worth of queued traffic. Returns the number of lines written.
    pub fn drain(&mut self) -> usize {
        let batch = self.queue.drain(self.config.normal_batch_size);
        let count = batch.len();
        for message in batch {
            self.serial.send_line(&message.payload);
        }
        self.stats.forwarded = self
            .stats
            .forwarded
            .saturating_add(u64::try_from(count).unwrap_or(u64::MAX));
        count
    }

    fn register(&mut self, node: NodeId, now: Instant) {
        if !self.nodes.touch(node, now) {
            return;
        }
        info!("Node {} connected ({} total)", node, self.nodes.len());
        let timestamp = self.uptime_ms(now);
        self.notify(&json!({
            "type": "node_connected",
            "node_id": node.get(),
            "gateway_id": self.config.gateway_id,
            "timestamp": timestamp,
        }));
        let welcome = json!({
            "type": "welcome",
            "gateway_id": self.config.gateway_id,
            "timestamp": timestamp,
            "version": env!("CARGO_PKG_VERSION"),
        });
        if !self.mesh.unicast(node, &welcome.to_string()) {
            debug!("Welcome to node {} not delivered", node);
        }
    }

    fn forward_check(&mut self, from: NodeId, line: &str, now: Instant) {
        let forward = match OtaMessage::decode(line) {
            Ok(OtaMessage::OtaCheck { role, fw_version }) => OtaMessage::OtaCheckForward {
                source_node: from,
                role,
                fw_version,
                gateway_id: Some(self.config.gateway_id.clone()),
                timestamp: Some(self.uptime_ms(now)),
            },
            Ok(other) => {
                debug!("Unexpected {} tagged as ota_check", other.kind());
                return;
            }
            Err(e) => {
                self.stats.dropped_malformed = self.stats.dropped_malformed.saturating_add(1);
                warn!("Malformed ota_check from node {}: {}", from, e);
                return;
            }
        };
        match forward.encode() {
            Ok(encoded) => {
                info!("ota_check from node {} forwarded", from);
                self.serial.send_line(&encoded);
                self.stats.ota_upstream = self.stats.ota_upstream.saturating_add(1);
            }
            Err(e) => warn!("Failed to encode ota_check_forward: {}", e),
        }
    }

    fn enqueue(&mut self, from: NodeId, line: &str, now: Instant) {
        let mut value = match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) | Err(_) => {
                self.stats.dropped_malformed = self.stats.dropped_malformed.saturating_add(1);
                warn!("Dropping malformed line from node {}", from);
                return;
            }
        };

        let priority = self.classifier.classify(line);
        let payload = if value.get("type").and_then(Value::as_str) == Some("sensor_data") {
            self.wrap_sensor_data(from, value, priority, now)
        } else {
            if let Some(object) = value.as_object_mut() {
                object
                    .entry("source_node")
                    .or_insert_with(|| json!(from.get()));
            }
            value.to_string()
        };

        let admitted = self.queue.push(QueuedMessage {
            payload,
            enqueued_at: now,
            priority,
        });
        match (admitted, priority) {
            (true, Priority::High) => {
                self.stats.queued_high = self.stats.queued_high.saturating_add(1);
                debug!("High-priority message from node {} queued", from);
            }
            (true, Priority::Normal) => {
                self.stats.queued_normal = self.stats.queued_normal.saturating_add(1);
            }
            (false, _) => {
                self.stats.dropped_congestion = self.stats.dropped_congestion.saturating_add(1);
            }
        }
    }

    fn wrap_sensor_data(&mut self, from: NodeId, data: Value, priority: Priority, now: Instant) -> String {
        let device_name = data.get("device_name").and_then(Value::as_str).map(str::to_string);
        let fw_version = data.get("fw_version").and_then(Value::as_str).map(str::to_string);
        self.nodes
            .describe(from, device_name.as_deref(), fw_version.as_deref());

        let mut wrapped = json!({
            "type": "mesh_data",
            "source_node": from.get(),
            "gateway_id": self.config.gateway_id,
            "timestamp": self.uptime_ms(now),
            "priority": priority.as_str(),
            "device_name": device_name,
            "fw_version": fw_version,
        });
        if let Some(object) = wrapped.as_object_mut() {
            if let Some(role) = data.get("role").cloned() {
                object.insert("role".to_string(), role);
            }
            object.insert("data".to_string(), data);
        }
        wrapped.to_string()
    }

    fn on_command(&mut self, value: &Value) {
        let kind = value.get("type").and_then(Value::as_str);
        let action = value.get("action").and_then(Value::as_str);
        match (kind, action) {
            (Some("command"), Some("restart_node")) => {
                let Some(node) = node_field(value, "node_id") else {
                    warn!("restart_node command without node_id");
                    return;
                };
                info!("Restart requested for node {}", node);
                let restart = json!({"type": "restart"}).to_string();
                if !self.mesh.unicast(node, &restart) {
                    warn!("Restart for node {} not delivered", node);
                }
            }
            _ => debug!("Ignoring serial line {:?}/{:?}", kind, action),
        }
    }

    fn heartbeat(&mut self, now: Instant) {
        let request = json!({
            "type": "heartbeat_request",
            "gateway_id": self.config.gateway_id,
            "timestamp": self.uptime_ms(now),
        });
        self.mesh.broadcast(&request.to_string());
        self.stats.heartbeats_sent = self.stats.heartbeats_sent.saturating_add(1);
    }

    fn check_liveness(&mut self, now: Instant) {
        let expired = self.nodes.sweep(
            now,
            self.config.node_timeout(),
            self.config.max_missed_heartbeats,
        );
        for node in expired {
            self.report_timeout(&node);
        }
    }

    fn report_timeout(&mut self, node: &MeshNode) {
        warn!(
            "Node {} timed out after {} missed heartbeats",
            node.id, node.missed_heartbeats
        );
        self.notify(&json!({
            "type": "node_timeout",
            "node_id": node.id.get(),
            "missed_heartbeats": node.missed_heartbeats,
            "device_name": node.device_name,
        }));
        self.stats.nodes_timed_out = self.stats.nodes_timed_out.saturating_add(1);
    }

    fn report_status(&mut self, now: Instant) {
        let nodes: Vec<u32> = self.nodes.ids().into_iter().map(NodeId::get).collect();
        let status = json!({
            "type": "mesh_status",
            "gateway_id": self.config.gateway_id,
            "mesh_node_id": self.mesh.node_id().get(),
            "timestamp": self.uptime_ms(now),
            "node_count": nodes.len(),
            "nodes": nodes,
            "queue_high": self.queue.high_len(),
            "queue_normal": self.queue.normal_len(),
            "dropped": self.queue.dropped(),
        });
        self.notify(&status);
    }

    fn notify(&mut self, value: &Value) {
        self.serial.send_line(&value.to_string());
    }

    fn uptime_ms(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.started).as_millis()).unwrap_or(u64::MAX)
    }

    /// Counters
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// The admission queue (read-only)
    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Connected nodes
    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Active configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Mesh transport
    pub fn mesh(&self) -> &M {
        &self.mesh
    }

    /// Mesh transport, mutably
    pub fn mesh_mut(&mut self) -> &mut M {
        &mut self.mesh
    }

    /// Serial link
    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// Serial link, mutably
    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }
}

fn node_field(value: &Value, key: &str) -> Option<NodeId> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(NodeId),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
