//! Gateway dispatcher: routes inbound serial lines to the registry, the
//! session manager and the auto-update policy, and exposes the operator
//! operations.

use std::sync::Arc;
use std::time::Instant;

use meshota_errors::{OtaError, Result};
use meshota_manifest::{FirmwareRepository, Manifest, is_newer, prepare_firmware};
use meshota_protocol::{NodeId, OtaMessage, scan};
use meshota_scheduler::TickSchedule;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::auto::AutoUpdatePolicy;
use crate::config::GatewayConfig;
use crate::registry::{NodeRecord, NodeRegistry, NodeReport, NodeStatus};
use crate::session::{
    SessionCounters, SessionId, SessionManager, SessionOrigin, SessionRecord, SessionSettings,
    SessionSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duty {
    SessionSweep,
    LivenessSweep,
}

/// Gateway-wide counters and node totals for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    /// Gateway identity
    pub gateway_id: String,
    /// Known nodes
    pub total_nodes: usize,
    /// Nodes online
    pub online_nodes: usize,
    /// Nodes offline
    pub offline_nodes: usize,
    /// Nodes with an active session
    pub updating_nodes: usize,
    /// Nodes whose reported version is older than the manifest's
    pub outdated_nodes: usize,
    /// Active sessions
    pub active_sessions: usize,
    /// Lifetime session counters
    pub sessions: SessionCounters,
    /// Automatic update switch
    pub auto_update_enabled: bool,
    /// Cached manifest version
    pub manifest_version: Option<String>,
    /// Lines received from the bridge
    pub lines_received: u64,
    /// Lines that could not be parsed
    pub lines_malformed: u64,
    /// Last `mesh_status` reported by the bridge
    pub bridge_status: Option<Value>,
}

/// Manifest summary returned by a forced refresh.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSummary {
    /// Published version
    pub version: String,
    /// Roles with an asset
    pub roles: Vec<String>,
    /// Roles with a usable digest
    pub verified_roles: Vec<String>,
}

impl From<&Manifest> for ManifestSummary {
    fn from(manifest: &Manifest) -> Self {
        Self {
            version: manifest.version().to_string(),
            roles: manifest.assets().keys().cloned().collect(),
            verified_roles: manifest.sha256().keys().cloned().collect(),
        }
    }
}

/// The gateway's update loop state.
///
/// Every mutation happens through `&mut self`, so the owner decides how the
/// gateway is shared (the async service keeps it inside a single task).
/// Outbound messages are appended to the caller's buffer and written to the
/// serial link by the caller.
pub struct Gateway<R: FirmwareRepository + ?Sized> {
    config: GatewayConfig,
    repo: Arc<R>,
    registry: NodeRegistry,
    sessions: SessionManager,
    auto: AutoUpdatePolicy,
    schedule: TickSchedule<Duty>,
    lines_received: u64,
    lines_malformed: u64,
    bridge_status: Option<Value>,
}

impl<R: FirmwareRepository + ?Sized> Gateway<R> {
    /// Build a gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: GatewayConfig, repo: Arc<R>, now: Instant) -> anyhow::Result<Self> {
        config.validate()?;

        let mut schedule = TickSchedule::new(now);
        schedule.add(Duty::SessionSweep, config.sweep_interval())?;
        schedule.add(Duty::LivenessSweep, config.sweep_interval())?;

        Ok(Self {
            registry: NodeRegistry::new(config.node_offline_after()),
            sessions: SessionManager::new(SessionSettings {
                chunk_size: config.chunk_size,
                timeout: config.session_timeout(),
                history_limit: config.history_limit,
            }),
            auto: AutoUpdatePolicy::new(config.auto_update_enabled, config.auto_update_cooldown()),
            schedule,
            repo,
            config,
            lines_received: 0,
            lines_malformed: 0,
            bridge_status: None,
        })
    }

    /// Handle one line received from the bridge.
    pub async fn handle_line(&mut self, line: &str, now: Instant, out: &mut Vec<OtaMessage>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.lines_received = self.lines_received.saturating_add(1);

        if scan::is_ota_line(line) {
            match OtaMessage::decode(line) {
                Ok(msg) => self.handle_message(msg, now, out).await,
                Err(e) => {
                    self.lines_malformed = self.lines_malformed.saturating_add(1);
                    warn!("Dropping malformed update message: {}", e);
                }
            }
            return;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => self.handle_notification(&value, now),
            Err(e) => {
                self.lines_malformed = self.lines_malformed.saturating_add(1);
                debug!("Ignoring non-JSON line from bridge: {}", e);
            }
        }
    }

    /// Handle one decoded update-protocol message.
    pub async fn handle_message(&mut self, msg: OtaMessage, now: Instant, out: &mut Vec<OtaMessage>) {
        if let Some(source) = msg.source() {
            self.registry.observe(source, NodeReport::default(), now);
        }

        match msg {
            OtaMessage::OtaCheckForward {
                source_node,
                role,
                fw_version,
                ..
            } => self.on_check(source_node, &role, &fw_version, now, out).await,
            OtaMessage::OtaAccept { source_node } => {
                self.sessions.on_accept(source_node, now);
            }
            OtaMessage::OtaNext { source_node, idx } => {
                self.sessions.on_next(source_node, idx, now, out);
            }
            OtaMessage::OtaError {
                source_node,
                idx,
                reason,
                ..
            } => {
                self.sessions.on_chunk_error(source_node, idx, &reason, now, out);
            }
            OtaMessage::OtaResult {
                source_node,
                ok,
                msg,
                new_version,
                error_count,
            } => self.on_result(source_node, ok, &msg, new_version.as_deref(), error_count),
            OtaMessage::OtaAbort {
                source_node: Some(node),
                reason,
                ..
            } => {
                if self.sessions.on_peer_abort(node, &reason).is_some() {
                    self.registry.set_status(node, NodeStatus::Online);
                }
            }
            other => debug!("Ignoring {} at gateway", other.kind()),
        }
    }

    fn handle_notification(&mut self, value: &Value, now: Instant) {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        let node = node_field(value, "source_node").or_else(|| node_field(value, "node_id"));

        match (kind, node) {
            ("mesh_data" | "sensor_data" | "node_status", Some(node)) => {
                let report = NodeReport {
                    role: value.get("role").and_then(Value::as_str),
                    version: value.get("fw_version").and_then(Value::as_str),
                    device_name: value.get("device_name").and_then(Value::as_str),
                };
                self.registry.observe(node, report, now);
            }
            ("node_connected", Some(node)) => {
                self.registry.mark_connected(node, now);
            }
            ("node_disconnected" | "node_timeout", Some(node)) => {
                self.registry.mark_disconnected(node);
            }
            ("mesh_status", _) => {
                debug!("Bridge status update");
                self.bridge_status = Some(value.clone());
            }
            _ => debug!("Ignoring {:?} line from bridge", kind),
        }
    }

    async fn on_check(
        &mut self,
        node: NodeId,
        role: &str,
        version: &str,
        now: Instant,
        out: &mut Vec<OtaMessage>,
    ) {
        let report = NodeReport {
            role: Some(role),
            version: Some(version),
            device_name: None,
        };
        self.registry.observe(node, report, now);

        if !self.auto.is_enabled() {
            return;
        }
        if self.auto.in_cooldown(node, now) {
            debug!(
                "Node {} in auto-update cooldown for {:?}",
                node,
                self.auto.cooldown_remaining(node, now)
            );
            return;
        }
        if self.sessions.contains(node) {
            return;
        }

        let manifest = match self.repo.manifest(false).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Auto-update check for node {} skipped: {}", node, e);
                return;
            }
        };
        if manifest.resolve_role(role).is_err() {
            debug!("No firmware published for role {}", role);
            return;
        }
        if !is_newer(version, manifest.version()) {
            debug!("Node {} is up-to-date ({})", node, version);
            return;
        }

        info!(
            "Auto-update: node {} runs {} but {} is published",
            node,
            version,
            manifest.version()
        );
        self.auto.stamp(node, now);
        if let Err(e) = self
            .start_session(node, role, SessionOrigin::Auto, now, out)
            .await
        {
            error!("Auto-update for node {} failed to start: {}", node, e);
        }
    }

    fn on_result(
        &mut self,
        node: NodeId,
        ok: bool,
        message: &str,
        new_version: Option<&str>,
        error_count: Option<u32>,
    ) {
        let Some(record) = self.sessions.on_result(node, ok, message, error_count) else {
            return;
        };
        self.registry.set_status(node, NodeStatus::Online);
        if ok {
            let version = new_version.unwrap_or(&record.target_version);
            self.registry.set_version(node, version);
        }
    }

    /// Resolve, download and verify firmware for `role`, then open a session
    /// and offer it to `node`.
    ///
    /// Nothing about the node changes unless the session is created.
    pub async fn start_session(
        &mut self,
        node: NodeId,
        role: &str,
        origin: SessionOrigin,
        now: Instant,
        out: &mut Vec<OtaMessage>,
    ) -> Result<SessionId> {
        if self.registry.get(node).is_none() {
            return Err(OtaError::NodeUnknown(node.get()));
        }
        if self.sessions.contains(node) {
            return Err(OtaError::SessionAlreadyActive(node.get()));
        }

        let firmware = prepare_firmware(self.repo.as_ref(), role).await?;

        let id = self.sessions.open(node, &firmware, origin, now, out)?;
        self.registry.set_status(node, NodeStatus::Updating);
        Ok(id)
    }

    /// Operator trigger: start a session using the node's reported role.
    pub async fn trigger(
        &mut self,
        node: NodeId,
        now: Instant,
        out: &mut Vec<OtaMessage>,
    ) -> Result<SessionId> {
        let role = self
            .registry
            .get(node)
            .ok_or(OtaError::NodeUnknown(node.get()))?
            .role
            .clone()
            .ok_or_else(|| OtaError::firmware_not_found("unknown", "node has not reported a role"))?;
        info!("Operator triggered update for node {} ({})", node, role);
        self.start_session(node, &role, SessionOrigin::Operator, now, out)
            .await
    }

    /// Run the periodic sweeps that are due.
    pub fn tick(&mut self, now: Instant, out: &mut Vec<OtaMessage>) {
        for duty in self.schedule.due(now) {
            match duty {
                Duty::SessionSweep => {
                    for record in self.sessions.tick(now, out) {
                        self.registry.set_status(record.node_id, NodeStatus::Online);
                    }
                }
                Duty::LivenessSweep => {
                    self.registry.sweep_liveness(now);
                }
            }
        }
    }

    /// Force a manifest refresh.
    pub async fn refresh_manifest(&mut self) -> Result<ManifestSummary> {
        let manifest = self.repo.manifest(true).await?;
        Ok(ManifestSummary::from(manifest.as_ref()))
    }

    /// Turn automatic updates on or off
    pub fn set_auto_update(&mut self, enabled: bool) {
        self.auto.set_enabled(enabled);
    }

    /// Flip automatic updates, returning the new state
    pub fn toggle_auto_update(&mut self) -> bool {
        self.auto.toggle()
    }

    /// Whether automatic updates are on
    pub fn auto_update_enabled(&self) -> bool {
        self.auto.is_enabled()
    }

    /// All known nodes
    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.registry.iter().cloned().collect()
    }

    /// One node
    pub fn node(&self, node: NodeId) -> Option<&NodeRecord> {
        self.registry.get(node)
    }

    /// Active sessions
    pub fn sessions(&self, now: Instant) -> Vec<SessionSnapshot> {
        self.sessions.snapshots(now)
    }

    /// Session manager (read-only)
    pub fn session_manager(&self) -> &SessionManager {
        &self.sessions
    }

    /// Terminated sessions, newest first
    pub fn history(&self) -> Vec<SessionRecord> {
        self.sessions.history()
    }

    /// Cached manifest summary
    pub fn manifest(&self) -> Option<ManifestSummary> {
        self.repo
            .cached_manifest()
            .map(|m| ManifestSummary::from(m.as_ref()))
    }

    /// Counters and node totals
    pub fn stats(&self) -> GatewayStats {
        let manifest = self.repo.cached_manifest();
        let outdated_nodes = manifest.as_ref().map_or(0, |m| {
            self.registry
                .iter()
                .filter(|n| is_outdated(n, m))
                .count()
        });
        GatewayStats {
            gateway_id: self.config.gateway_id.clone(),
            total_nodes: self.registry.len(),
            online_nodes: self.registry.count(NodeStatus::Online),
            offline_nodes: self.registry.count(NodeStatus::Offline),
            updating_nodes: self.registry.count(NodeStatus::Updating),
            outdated_nodes,
            active_sessions: self.sessions.len(),
            sessions: self.sessions.counters(),
            auto_update_enabled: self.auto.is_enabled(),
            manifest_version: manifest.map(|m| m.version().to_string()),
            lines_received: self.lines_received,
            lines_malformed: self.lines_malformed,
            bridge_status: self.bridge_status.clone(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

fn is_outdated(node: &NodeRecord, manifest: &Manifest) -> bool {
    match (&node.role, &node.reported_version) {
        (Some(role), Some(version)) => {
            manifest.assets().contains_key(role) && is_newer(version, manifest.version())
        }
        _ => false,
    }
}

fn node_field(value: &Value, key: &str) -> Option<NodeId> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(NodeId),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
