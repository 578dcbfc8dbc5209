//! Per-node update sessions.
//!
//! A session turns a verified image into an offer and then serves chunks
//! strictly on request: the node pulls chunk `idx` with `ota_next` and the
//! manager answers with exactly that chunk, or with `ota_end` once `idx` is
//! past the image. The manager never pushes data unprompted, so a slow node
//! cannot be flooded.
//!
//! A session is removed as soon as it reaches a terminal outcome: the node's
//! `ota_result`, a node-side abort, or the inactivity timeout in
//! [`SessionManager::tick`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use meshota_errors::{OtaError, Result};
use meshota_manifest::PreparedFirmware;
use meshota_protocol::{MessageSink, NodeId, OtaMessage, chunk_count, encode_chunk};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session identifier
pub type SessionId = Uuid;

/// Who asked for the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Triggered through the operator surface
    Operator,
    /// Triggered by a node's `ota_check`
    Auto,
}

/// Session outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Transfer in progress
    Pending,
    /// Node reported a finalized image
    Succeeded,
    /// Node reported failure or aborted
    Failed,
    /// No request within the inactivity budget
    TimedOut,
}

/// Bookkeeping for one in-progress update.
#[derive(Debug)]
pub struct UpdateSession {
    id: SessionId,
    node_id: NodeId,
    role: String,
    target_version: String,
    firmware: Arc<[u8]>,
    total_size: u32,
    chunk_size: u32,
    bytes_sent: u32,
    next_chunk_index: u32,
    expected_hash: String,
    started_at: Instant,
    started_at_wall: DateTime<Utc>,
    last_activity_at: Instant,
    origin: SessionOrigin,
    consecutive_chunk_failures: u32,
    total_chunk_failures: u32,
    end_sent: bool,
    outcome: SessionOutcome,
}

impl UpdateSession {
    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Target node
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Version being delivered
    pub fn target_version(&self) -> &str {
        &self.target_version
    }

    /// Image size
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Bytes served so far, always `next_chunk_index * chunk_size` clipped to the image
    pub fn bytes_sent(&self) -> u32 {
        self.bytes_sent
    }

    /// Index the node is expected to request next
    pub fn next_chunk_index(&self) -> u32 {
        self.next_chunk_index
    }

    /// Failed chunks since the last successful `ota_next`
    pub fn consecutive_chunk_failures(&self) -> u32 {
        self.consecutive_chunk_failures
    }

    /// Who started the session
    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    /// Current outcome (always `Pending` while the session is held)
    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    /// Last request time
    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Whether `ota_end` has been sent
    pub fn end_sent(&self) -> bool {
        self.end_sent
    }

    /// Serve chunk `idx`, or `ota_end` if it lies past the image.
    fn serve(&mut self, idx: u32, out: &mut impl MessageSink) {
        let start = u64::from(idx).saturating_mul(u64::from(self.chunk_size));
        let total = u64::from(self.total_size);

        if start >= total {
            if !self.end_sent {
                info!(
                    "All {} chunks served to node {}, awaiting result",
                    chunk_count(self.total_size, self.chunk_size),
                    self.node_id
                );
            }
            self.end_sent = true;
            out.send(OtaMessage::OtaEnd {
                target_node: self.node_id,
            });
            return;
        }

        let end = start.saturating_add(u64::from(self.chunk_size)).min(total);
        let slice = usize::try_from(start)
            .ok()
            .zip(usize::try_from(end).ok())
            .and_then(|(s, e)| self.firmware.get(s..e));
        let Some(bytes) = slice else {
            warn!("Chunk {} for node {} outside image", idx, self.node_id);
            return;
        };

        out.send(OtaMessage::OtaChunk {
            target_node: self.node_id,
            idx,
            data: encode_chunk(bytes),
        });
        self.next_chunk_index = idx.saturating_add(1);
        self.bytes_sent = u32::try_from(end).unwrap_or(self.total_size);
        debug!(
            "Chunk {} -> node {} ({}/{} bytes)",
            idx, self.node_id, self.bytes_sent, self.total_size
        );
    }

    /// Serializable view without the image bytes.
    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            node_id: self.node_id,
            role: self.role.clone(),
            target_version: self.target_version.clone(),
            origin: self.origin,
            outcome: self.outcome,
            total_size: self.total_size,
            bytes_sent: self.bytes_sent,
            next_chunk_index: self.next_chunk_index,
            total_chunks: chunk_count(self.total_size, self.chunk_size),
            progress_percent: progress_percent(self.bytes_sent, self.total_size),
            consecutive_chunk_failures: self.consecutive_chunk_failures,
            expected_hash: self.expected_hash.clone(),
            started_at: self.started_at_wall,
            idle_secs: now.saturating_duration_since(self.last_activity_at).as_secs(),
        }
    }

    fn close(self, outcome: SessionOutcome, message: String, reported_errors: Option<u32>) -> SessionRecord {
        let finished_at = Utc::now();
        SessionRecord {
            id: self.id,
            node_id: self.node_id,
            role: self.role,
            target_version: self.target_version,
            origin: self.origin,
            outcome,
            message,
            started_at: self.started_at_wall,
            finished_at,
            duration_ms: u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            bytes_sent: self.bytes_sent,
            total_size: self.total_size,
            chunk_failures: self.total_chunk_failures,
            reported_errors,
        }
    }
}

fn progress_percent(sent: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u64::from(sent).saturating_mul(100) / u64::from(total);
    u8::try_from(pct.min(100)).unwrap_or(100)
}

/// Active session as reported to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session id
    pub id: SessionId,
    /// Target node
    pub node_id: NodeId,
    /// Node role
    pub role: String,
    /// Version being delivered
    pub target_version: String,
    /// Who started it
    pub origin: SessionOrigin,
    /// Outcome so far
    pub outcome: SessionOutcome,
    /// Image size
    pub total_size: u32,
    /// Bytes served
    pub bytes_sent: u32,
    /// Next expected chunk
    pub next_chunk_index: u32,
    /// Chunks in the image
    pub total_chunks: u32,
    /// Served fraction
    pub progress_percent: u8,
    /// Failed chunks since the last good request
    pub consecutive_chunk_failures: u32,
    /// Digest offered to the node
    pub expected_hash: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Seconds since the last request
    pub idle_secs: u64,
}

/// A terminated session kept in history.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    /// Session id
    pub id: SessionId,
    /// Target node
    pub node_id: NodeId,
    /// Node role
    pub role: String,
    /// Version that was delivered
    pub target_version: String,
    /// Who started it
    pub origin: SessionOrigin,
    /// Terminal outcome
    pub outcome: SessionOutcome,
    /// Node message or abort reason
    pub message: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub finished_at: DateTime<Utc>,
    /// Wall duration
    pub duration_ms: u64,
    /// Bytes served
    pub bytes_sent: u32,
    /// Image size
    pub total_size: u32,
    /// Chunk failures reported during the session
    pub chunk_failures: u32,
    /// Error count reported by the node in its result
    pub reported_errors: Option<u32>,
}

/// Lifetime session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Sessions created
    pub started: u64,
    /// Sessions the node reported as finalized
    pub succeeded: u64,
    /// Sessions that failed, including timeouts
    pub failed: u64,
    /// Sessions removed by the inactivity sweep
    pub timed_out: u64,
}

/// Session manager limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Bytes per chunk
    pub chunk_size: u32,
    /// Inactivity budget
    pub timeout: Duration,
    /// Terminated sessions retained
    pub history_limit: usize,
}

/// Owns every active session, keyed by node.
#[derive(Debug)]
pub struct SessionManager {
    settings: SessionSettings,
    sessions: HashMap<NodeId, UpdateSession>,
    history: VecDeque<SessionRecord>,
    counters: SessionCounters,
}

impl SessionManager {
    /// Empty manager.
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            sessions: HashMap::new(),
            history: VecDeque::with_capacity(settings.history_limit),
            counters: SessionCounters::default(),
        }
    }

    /// Create a session for `node` and send the offer.
    ///
    /// Fails with `SessionAlreadyActive`, leaving the existing session
    /// untouched, if one is already held for the node.
    pub fn open(
        &mut self,
        node: NodeId,
        firmware: &PreparedFirmware,
        origin: SessionOrigin,
        now: Instant,
        out: &mut impl MessageSink,
    ) -> Result<SessionId> {
        if self.sessions.contains_key(&node) {
            return Err(OtaError::SessionAlreadyActive(node.get()));
        }
        let total_size = u32::try_from(firmware.size())
            .map_err(|e| OtaError::firmware_not_found(&firmware.role, e.to_string()))?;
        if total_size == 0 {
            return Err(OtaError::firmware_not_found(&firmware.role, "image is empty"));
        }

        let session = UpdateSession {
            id: Uuid::new_v4(),
            node_id: node,
            role: firmware.role.clone(),
            target_version: firmware.version.clone(),
            firmware: Arc::clone(&firmware.bytes),
            total_size,
            chunk_size: self.settings.chunk_size,
            bytes_sent: 0,
            next_chunk_index: 0,
            expected_hash: firmware.digest.clone(),
            started_at: now,
            started_at_wall: Utc::now(),
            last_activity_at: now,
            origin,
            consecutive_chunk_failures: 0,
            total_chunk_failures: 0,
            end_sent: false,
            outcome: SessionOutcome::Pending,
        };

        out.send(OtaMessage::OtaOffer {
            target_node: node,
            version: session.target_version.clone(),
            size: total_size,
            chunk: self.settings.chunk_size,
            sha256: Some(session.expected_hash.clone()),
        });

        info!(
            "Session {} opened for node {}: {} v{} ({} bytes, {} chunks, {:?})",
            session.id,
            node,
            session.role,
            session.target_version,
            total_size,
            chunk_count(total_size, self.settings.chunk_size),
            origin
        );

        let id = session.id;
        self.sessions.insert(node, session);
        self.counters.started = self.counters.started.saturating_add(1);
        Ok(id)
    }

    /// Node accepted the offer. Only refreshes activity; data flows on `ota_next`.
    pub fn on_accept(&mut self, node: NodeId, now: Instant) -> bool {
        match self.sessions.get_mut(&node) {
            Some(session) => {
                session.last_activity_at = now;
                info!("Node {} accepted offer for v{}", node, session.target_version);
                true
            }
            None => {
                debug!("ota_accept from node {} without session", node);
                false
            }
        }
    }

    /// Node requests chunk `idx`.
    pub fn on_next(&mut self, node: NodeId, idx: u32, now: Instant, out: &mut impl MessageSink) -> bool {
        let Some(session) = self.sessions.get_mut(&node) else {
            debug!("ota_next from node {} without session", node);
            return false;
        };
        session.last_activity_at = now;
        session.consecutive_chunk_failures = 0;
        session.serve(idx, out);
        true
    }

    /// Node could not decode or write chunk `idx` and asks for it again.
    pub fn on_chunk_error(
        &mut self,
        node: NodeId,
        idx: u32,
        reason: &str,
        now: Instant,
        out: &mut impl MessageSink,
    ) -> bool {
        let Some(session) = self.sessions.get_mut(&node) else {
            debug!("ota_error from node {} without session", node);
            return false;
        };
        session.last_activity_at = now;
        session.consecutive_chunk_failures = session.consecutive_chunk_failures.saturating_add(1);
        session.total_chunk_failures = session.total_chunk_failures.saturating_add(1);
        warn!(
            "Node {} failed chunk {} ({}), consecutive failures: {}",
            node, idx, reason, session.consecutive_chunk_failures
        );
        session.serve(idx, out);
        true
    }

    /// Node reported the terminal outcome. Removes the session.
    pub fn on_result(
        &mut self,
        node: NodeId,
        ok: bool,
        message: &str,
        reported_errors: Option<u32>,
    ) -> Option<SessionRecord> {
        let Some(session) = self.sessions.remove(&node) else {
            debug!("ota_result from node {} without session", node);
            return None;
        };
        let outcome = if ok {
            self.counters.succeeded = self.counters.succeeded.saturating_add(1);
            info!("Node {} updated to v{}: {}", node, session.target_version, message);
            SessionOutcome::Succeeded
        } else {
            self.counters.failed = self.counters.failed.saturating_add(1);
            warn!("Node {} update to v{} failed: {}", node, session.target_version, message);
            SessionOutcome::Failed
        };
        Some(self.archive(session.close(outcome, message.to_string(), reported_errors)))
    }

    /// Node aborted the transfer on its side. Removes the session, if any.
    pub fn on_peer_abort(&mut self, node: NodeId, reason: &str) -> Option<SessionRecord> {
        let session = self.sessions.remove(&node)?;
        warn!("Node {} aborted update: {}", node, reason);
        self.counters.failed = self.counters.failed.saturating_add(1);
        Some(self.archive(session.close(SessionOutcome::Failed, reason.to_string(), None)))
    }

    /// Abort and remove every session idle past the timeout.
    pub fn tick(&mut self, now: Instant, out: &mut impl MessageSink) -> Vec<SessionRecord> {
        let timeout = self.settings.timeout;
        let expired: Vec<NodeId> = self
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_activity_at) > timeout)
            .map(|s| s.node_id)
            .collect();

        let mut closed = Vec::with_capacity(expired.len());
        for node in expired {
            let Some(session) = self.sessions.remove(&node) else {
                continue;
            };
            warn!(
                "Session {} for node {} timed out after {:?} idle",
                session.id, node, timeout
            );
            out.send(OtaMessage::abort_to(node, OtaError::Timeout.reason()));
            self.counters.failed = self.counters.failed.saturating_add(1);
            self.counters.timed_out = self.counters.timed_out.saturating_add(1);
            let record = session.close(
                SessionOutcome::TimedOut,
                OtaError::Timeout.reason().to_string(),
                None,
            );
            closed.push(self.archive(record));
        }
        closed
    }

    fn archive(&mut self, record: SessionRecord) -> SessionRecord {
        while self.history.len() >= self.settings.history_limit.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        record
    }

    /// Session for `node`
    pub fn get(&self, node: NodeId) -> Option<&UpdateSession> {
        self.sessions.get(&node)
    }

    /// Whether `node` has a session
    pub fn contains(&self, node: NodeId) -> bool {
        self.sessions.contains_key(&node)
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is active
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshots of all active sessions, ordered by node
    pub fn snapshots(&self, now: Instant) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> = self.sessions.values().map(|s| s.snapshot(now)).collect();
        all.sort_by_key(|s| s.node_id);
        all
    }

    /// Terminated sessions, newest first
    pub fn history(&self) -> Vec<SessionRecord> {
        self.history.iter().rev().cloned().collect()
    }

    /// Lifetime counters
    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// Configured limits
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }
}
