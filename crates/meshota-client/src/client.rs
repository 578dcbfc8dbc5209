//! The node-side update state machine.
//!
//! ```text
//! Idle ──offer──▶ Offered ──accept, next(0)──▶ Receiving ──chunk──▶ Receiving
//!                                                 │  └─bad chunk─▶ ota_error (budget) ─▶ restart
//!                                                 ├──end──▶ Finalizing ──▶ ota_result ─▶ restart
//!                                                 └──abort / stall──▶ Aborted ─▶ Idle
//! ```
//!
//! Every request for data is explicit: the client asks for chunk `n` with
//! `ota_next` only after chunk `n - 1` was decoded and written.

use std::time::Instant;

use meshota_errors::OtaError;
use meshota_protocol::{NodeId, OtaMessage, decode_chunk, scan};
use meshota_scheduler::IntervalTimer;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::seams::{DeviceControl, FirmwareWriter, MeshUplink};
use crate::state::{UpdateClientState, UpdatePhase};

/// Update client for one node.
pub struct UpdateClient<W, D, U> {
    config: ClientConfig,
    node_id: NodeId,
    running_version: String,
    writer: W,
    device: D,
    uplink: U,
    state: UpdateClientState,
    hasher: Sha256,
    check_timer: IntervalTimer,
}

impl<W, D, U> UpdateClient<W, D, U>
where
    W: FirmwareWriter,
    D: DeviceControl,
    U: MeshUplink,
{
    /// Build a client for mesh node `node_id`. The first `ota_check` goes
    /// out on the first [`poll`](Self::poll).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: ClientConfig,
        node_id: NodeId,
        writer: W,
        device: D,
        uplink: U,
        now: Instant,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let check_timer = IntervalTimer::immediate(config.check_interval(), now)?;
        Ok(Self {
            running_version: config.current_version.clone(),
            config,
            node_id,
            writer,
            device,
            uplink,
            state: UpdateClientState::idle(),
            hasher: Sha256::new(),
            check_timer,
        })
    }

    /// Handle one line received from mesh node `from`.
    pub fn handle_line(&mut self, from: NodeId, line: &str, now: Instant) {
        if !scan::is_ota_line(line) {
            return;
        }
        let msg = match OtaMessage::decode(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Ignoring malformed update message: {}", e);
                return;
            }
        };
        if let Some(target) = msg.target()
            && target != self.node_id
        {
            return;
        }

        match msg {
            OtaMessage::OtaOffer {
                version,
                size,
                chunk,
                sha256,
                ..
            } => {
                self.on_offer(from, &version, size, chunk, sha256, now);
            }
            OtaMessage::OtaChunk { idx, data, .. } => self.on_chunk(from, idx, &data, now),
            OtaMessage::OtaEnd { .. } => self.on_end(from),
            OtaMessage::OtaAbort { reason, .. } => self.on_abort(&reason),
            other => debug!("Ignoring {} at node", other.kind()),
        }
    }

    /// Consider an offer. Returns whether it was accepted.
    ///
    /// Offers are refused without a reply when busy, when the version is
    /// empty or already running, or when the size or chunk size is zero.
    pub fn on_offer(
        &mut self,
        from: NodeId,
        version: &str,
        size: u32,
        chunk: u32,
        sha256: Option<String>,
        now: Instant,
    ) -> bool {
        if self.is_busy() {
            debug!("Offer of v{} ignored, update in progress", version);
            return false;
        }
        if version.is_empty() || version == self.running_version {
            debug!("Offer of v{} ignored, already running", version);
            return false;
        }
        if size == 0 || chunk == 0 {
            warn!("Degenerate offer ignored (size {}, chunk {})", size, chunk);
            return false;
        }

        if let Err(e) = self.writer.begin(size) {
            error!("Cannot prepare {} bytes for v{}: {}", size, version, e);
            self.send_to(
                from,
                &OtaMessage::OtaAbort {
                    target_node: None,
                    source_node: Some(self.node_id),
                    reason: e.reason().to_string(),
                },
            );
            return false;
        }

        self.hasher = Sha256::new();
        self.state = UpdateClientState {
            phase: UpdatePhase::Offered,
            expected_total_size: size,
            target_version: version.to_string(),
            gateway_node_id: Some(from),
            chunk_size: chunk,
            expected_hash: sha256,
            last_chunk_at: Some(now),
            ..UpdateClientState::idle()
        };
        info!(
            "Accepting v{} ({} bytes, {} byte chunks) from node {}",
            version, size, chunk, from
        );

        let me = self.node_id;
        self.send_to(from, &OtaMessage::OtaAccept { source_node: me });
        self.send_to(from, &OtaMessage::OtaNext { source_node: me, idx: 0 });
        self.state.phase = UpdatePhase::Receiving;
        true
    }

    fn on_chunk(&mut self, from: NodeId, idx: u32, data: &str, now: Instant) {
        if self.state.phase != UpdatePhase::Receiving || self.state.gateway_node_id != Some(from) {
            debug!("Chunk {} from node {} outside a transfer", idx, from);
            return;
        }
        if idx != self.state.next_index {
            debug!(
                "Chunk {} ignored, waiting for {}",
                idx, self.state.next_index
            );
            return;
        }

        let bytes = match decode_chunk(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.local_failure(from, idx, &OtaError::from(e));
                return;
            }
        };
        let Some(received) = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| self.state.bytes_received.checked_add(len))
            .filter(|total| *total <= self.state.expected_total_size)
        else {
            let e = OtaError::ChunkWriteFailed(format!("chunk {idx} overruns offered size"));
            self.local_failure(from, idx, &e);
            return;
        };
        if let Err(e) = self.writer.write(&bytes) {
            self.local_failure(from, idx, &e);
            return;
        }

        self.hasher.update(&bytes);
        self.state.bytes_received = received;
        self.state.next_index = idx.saturating_add(1);
        self.state.consecutive_failures = 0;
        self.state.last_chunk_at = Some(now);
        debug!(
            "Chunk {} ok ({}%)",
            idx,
            self.state.progress_percent()
        );

        let next = OtaMessage::OtaNext {
            source_node: self.node_id,
            idx: self.state.next_index,
        };
        self.send_to(from, &next);
    }

    fn local_failure(&mut self, gateway: NodeId, idx: u32, err: &OtaError) {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        self.state.total_failures = self.state.total_failures.saturating_add(1);
        warn!(
            "Chunk {} failed ({}/{}): {}",
            idx, self.state.consecutive_failures, self.config.max_consecutive_failures, err
        );

        if self.state.consecutive_failures >= self.config.max_consecutive_failures {
            error!("Chunk failure budget exhausted, abandoning update");
            let result = OtaMessage::OtaResult {
                source_node: self.node_id,
                ok: false,
                msg: format!("too many chunk failures: {err}"),
                new_version: None,
                error_count: Some(self.state.total_failures),
            };
            self.send_to(gateway, &result);
            self.writer.abort();
            self.state = UpdateClientState::idle();
            self.device.restart();
            return;
        }

        let report = OtaMessage::OtaError {
            source_node: self.node_id,
            idx,
            reason: err.reason().to_string(),
            error_count: self.state.consecutive_failures,
        };
        self.send_to(gateway, &report);
    }

    fn on_end(&mut self, from: NodeId) {
        if self.state.phase != UpdatePhase::Receiving || self.state.gateway_node_id != Some(from) {
            debug!("ota_end from node {} outside a transfer", from);
            return;
        }
        self.state.phase = UpdatePhase::Finalizing;

        if let Err(e) = self.verify_image() {
            self.fail_finalize(from, &e);
            return;
        }
        if let Err(e) = self.writer.finalize() {
            self.fail_finalize(from, &e);
            return;
        }

        let version = std::mem::take(&mut self.state.target_version);
        info!("Update to v{} finalized, restarting", version);
        let result = OtaMessage::OtaResult {
            source_node: self.node_id,
            ok: true,
            msg: "Update finalized".to_string(),
            new_version: Some(version.clone()),
            error_count: Some(self.state.total_failures),
        };
        self.send_to(from, &result);
        self.running_version = version;
        self.state = UpdateClientState::idle();
        self.device.restart();
    }

    fn verify_image(&mut self) -> meshota_errors::Result<()> {
        let expected = self.state.expected_total_size;
        let received = self.state.bytes_received;
        if received != expected {
            return Err(OtaError::DownloadIncomplete {
                expected: u64::from(expected),
                received: u64::from(received),
            });
        }
        let actual = hex::encode(self.hasher.finalize_reset());
        match self.state.expected_hash.as_deref() {
            Some(hash) if is_digest(hash) && !hash.eq_ignore_ascii_case(&actual) => {
                Err(OtaError::IntegrityMismatch {
                    expected: hash.to_ascii_lowercase(),
                    actual,
                })
            }
            Some(hash) if !is_digest(hash) => {
                warn!("Offered digest is malformed, skipping verification");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn fail_finalize(&mut self, gateway: NodeId, err: &OtaError) {
        error!("Update to v{} failed: {}", self.state.target_version, err);
        let result = OtaMessage::OtaResult {
            source_node: self.node_id,
            ok: false,
            msg: err.to_string(),
            new_version: None,
            error_count: Some(self.state.total_failures),
        };
        self.send_to(gateway, &result);
        self.writer.abort();
        self.state = UpdateClientState::idle();
    }

    /// Cancel the transfer on the gateway's request. Idempotent, and never
    /// answered.
    pub fn on_abort(&mut self, reason: &str) {
        if !self.state.phase.is_active() {
            debug!("Abort ({}) with no transfer in progress", reason);
            return;
        }
        warn!("Update to v{} aborted by gateway: {}", self.state.target_version, reason);
        self.writer.abort();
        self.state = UpdateClientState::idle();
    }

    /// Time-driven duties: stall detection while receiving, and the periodic
    /// `ota_check` while idle.
    pub fn poll(&mut self, now: Instant) {
        let check_due = self.check_timer.poll(now);

        if self.state.phase == UpdatePhase::Receiving
            && let Some(last) = self.state.last_chunk_at
            && now.saturating_duration_since(last) > self.config.stall_timeout()
        {
            self.stall();
            return;
        }

        if check_due && self.state.phase == UpdatePhase::Idle {
            self.announce();
        }
    }

    fn stall(&mut self) {
        warn!(
            "No chunk for {:?} (waiting for {}), abandoning update",
            self.config.stall_timeout(),
            self.state.next_index
        );
        if let Some(gateway) = self.state.gateway_node_id {
            let abort = OtaMessage::OtaAbort {
                target_node: None,
                source_node: Some(self.node_id),
                reason: "chunk_timeout".to_string(),
            };
            self.send_to(gateway, &abort);
        }
        self.writer.abort();
        self.state = UpdateClientState::idle();
    }

    /// Broadcast `ota_check` with the running version now.
    pub fn announce(&mut self) {
        let check = OtaMessage::OtaCheck {
            role: self.config.role.clone(),
            fw_version: self.running_version.clone(),
        };
        match check.encode() {
            Ok(line) => self.uplink.broadcast(&line),
            Err(e) => error!("Failed to encode ota_check: {}", e),
        }
    }

    fn send_to(&mut self, node: NodeId, msg: &OtaMessage) {
        match msg.encode() {
            Ok(line) => self.uplink.send_to(node, &line),
            Err(e) => error!("Failed to encode {}: {}", msg.kind(), e),
        }
    }

    /// Whether a transfer is in progress; hosts may pause optional work.
    pub fn is_busy(&self) -> bool {
        self.state.phase != UpdatePhase::Idle
    }

    /// Current phase
    pub fn phase(&self) -> UpdatePhase {
        self.state.phase
    }

    /// Transfer state
    pub fn state(&self) -> &UpdateClientState {
        &self.state
    }

    /// Version of the running image
    pub fn running_version(&self) -> &str {
        &self.running_version
    }

    /// Mesh id of this node
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Firmware writer
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Device control
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Uplink
    pub fn uplink(&self) -> &U {
        &self.uplink
    }

    /// Uplink, mutably
    pub fn uplink_mut(&mut self) -> &mut U {
        &mut self.uplink
    }
}

fn is_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
