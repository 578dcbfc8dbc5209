//! Update-protocol message catalog.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::node::{NodeId, serialize_as_string, serialize_opt_as_string};
use crate::{OTA_TYPE_PREFIX, scan};

/// One update-protocol record.
///
/// Messages flowing toward a node address it with `target_node`; messages
/// flowing toward the gateway identify their origin with `source_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OtaMessage {
    /// Node announces its role and running version (node → bridge)
    OtaCheck {
        /// Logical device class
        role: String,
        /// Running firmware version
        #[serde(alias = "fw")]
        fw_version: String,
    },

    /// Bridge relays an `ota_check` with the sender attached (bridge → gateway)
    OtaCheckForward {
        /// Node that sent the check
        source_node: NodeId,
        /// Logical device class
        role: String,
        /// Running firmware version
        #[serde(alias = "fw")]
        fw_version: String,
        /// Bridge identity
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gateway_id: Option<String>,
        /// Bridge uptime in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Gateway offers an image (gateway → node)
    OtaOffer {
        /// Addressed node
        #[serde(serialize_with = "serialize_as_string")]
        target_node: NodeId,
        /// Version being offered
        version: String,
        /// Image size in bytes
        size: u32,
        /// Chunk size in bytes
        chunk: u32,
        /// Expected hex digest of the image, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },

    /// Node accepts the offer
    OtaAccept {
        /// Accepting node
        source_node: NodeId,
    },

    /// Node pulls chunk `idx`
    OtaNext {
        /// Requesting node
        source_node: NodeId,
        /// Requested chunk index
        idx: u32,
    },

    /// Gateway serves a chunk
    OtaChunk {
        /// Addressed node
        #[serde(serialize_with = "serialize_as_string")]
        target_node: NodeId,
        /// Chunk index
        idx: u32,
        /// Base64 chunk bytes
        data: String,
    },

    /// Gateway signals that all chunks have been served
    OtaEnd {
        /// Addressed node
        #[serde(serialize_with = "serialize_as_string")]
        target_node: NodeId,
    },

    /// Either side cancels the transfer
    OtaAbort {
        /// Addressed node when sent by the gateway
        #[serde(
            default,
            serialize_with = "serialize_opt_as_string",
            skip_serializing_if = "Option::is_none"
        )]
        target_node: Option<NodeId>,
        /// Origin node when sent by a node
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_node: Option<NodeId>,
        /// Short reason code
        reason: String,
    },

    /// Node reports the terminal outcome
    OtaResult {
        /// Reporting node
        source_node: NodeId,
        /// Whether the new image was finalized
        ok: bool,
        /// Human-readable detail
        #[serde(default)]
        msg: String,
        /// Version now installed, on success
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_version: Option<String>,
        /// Local failures seen during the transfer
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_count: Option<u32>,
    },

    /// Node reports a recoverable chunk failure and asks for `idx` again
    OtaError {
        /// Reporting node
        source_node: NodeId,
        /// Chunk that failed
        idx: u32,
        /// Short reason code
        reason: String,
        /// Consecutive local failures so far
        error_count: u32,
    },
}

impl OtaMessage {
    /// Parse one line.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        match scan::message_type(line) {
            Some(kind) if !kind.starts_with(OTA_TYPE_PREFIX) => {
                Err(ProtocolError::UnknownType(kind.to_string()))
            }
            _ => serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string())),
        }
    }

    /// Serialize to a single line without trailing newline.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Wire `type` value.
    pub fn kind(&self) -> &'static str {
        match self {
            OtaMessage::OtaCheck { .. } => "ota_check",
            OtaMessage::OtaCheckForward { .. } => "ota_check_forward",
            OtaMessage::OtaOffer { .. } => "ota_offer",
            OtaMessage::OtaAccept { .. } => "ota_accept",
            OtaMessage::OtaNext { .. } => "ota_next",
            OtaMessage::OtaChunk { .. } => "ota_chunk",
            OtaMessage::OtaEnd { .. } => "ota_end",
            OtaMessage::OtaAbort { .. } => "ota_abort",
            OtaMessage::OtaResult { .. } => "ota_result",
            OtaMessage::OtaError { .. } => "ota_error",
        }
    }

    /// Node this message is addressed to, for gateway → node messages.
    pub fn target(&self) -> Option<NodeId> {
        match self {
            OtaMessage::OtaOffer { target_node, .. }
            | OtaMessage::OtaChunk { target_node, .. }
            | OtaMessage::OtaEnd { target_node } => Some(*target_node),
            OtaMessage::OtaAbort { target_node, .. } => *target_node,
            _ => None,
        }
    }

    /// Node this message originates from, for node → gateway messages.
    pub fn source(&self) -> Option<NodeId> {
        match self {
            OtaMessage::OtaCheckForward { source_node, .. }
            | OtaMessage::OtaAccept { source_node }
            | OtaMessage::OtaNext { source_node, .. }
            | OtaMessage::OtaResult { source_node, .. }
            | OtaMessage::OtaError { source_node, .. } => Some(*source_node),
            OtaMessage::OtaAbort { source_node, .. } => *source_node,
            _ => None,
        }
    }

    /// Gateway-originated abort addressed to `node`.
    pub fn abort_to(node: NodeId, reason: impl Into<String>) -> Self {
        OtaMessage::OtaAbort {
            target_node: Some(node),
            source_node: None,
            reason: reason.into(),
        }
    }
}

/// Destination for outbound protocol messages.
///
/// Components emit messages through a sink instead of owning a transport, so
/// a state machine can be driven from a test with a plain `Vec`.
pub trait MessageSink {
    /// Queue one message for delivery.
    fn send(&mut self, msg: OtaMessage);
}

impl MessageSink for Vec<OtaMessage> {
    fn send(&mut self, msg: OtaMessage) {
        self.push(msg);
    }
}
