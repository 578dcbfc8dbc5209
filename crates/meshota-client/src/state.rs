//! Update client phases and transfer state.

use std::time::Instant;

use meshota_protocol::NodeId;
use serde::Serialize;

/// Where the client is in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    /// No update in progress
    Idle,
    /// Offer accepted, first chunk not yet requested
    Offered,
    /// Pulling chunks
    Receiving,
    /// `ota_end` received, verifying and finalizing
    Finalizing,
    /// Transfer cancelled; passes straight back to `Idle`
    Aborted,
}

impl UpdatePhase {
    /// Whether a transfer owns the writer
    pub fn is_active(self) -> bool {
        matches!(
            self,
            UpdatePhase::Offered | UpdatePhase::Receiving | UpdatePhase::Finalizing
        )
    }
}

/// Transfer bookkeeping. Lost on restart.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateClientState {
    /// Current phase
    pub phase: UpdatePhase,
    /// Offered image size
    pub expected_total_size: u32,
    /// Bytes decoded and written
    pub bytes_received: u32,
    /// Offered version
    pub target_version: String,
    /// Mesh node the offer came from
    pub gateway_node_id: Option<NodeId>,
    /// Next chunk index to request
    pub next_index: u32,
    /// Offered chunk size
    pub chunk_size: u32,
    /// Offered digest, if any
    pub expected_hash: Option<String>,
    /// Local failures since the last good chunk
    pub consecutive_failures: u32,
    /// Local failures over the whole transfer
    pub total_failures: u32,
    #[serde(skip)]
    pub(crate) last_chunk_at: Option<Instant>,
}

impl UpdateClientState {
    /// Idle state
    pub fn idle() -> Self {
        Self {
            phase: UpdatePhase::Idle,
            expected_total_size: 0,
            bytes_received: 0,
            target_version: String::new(),
            gateway_node_id: None,
            next_index: 0,
            chunk_size: 0,
            expected_hash: None,
            consecutive_failures: 0,
            total_failures: 0,
            last_chunk_at: None,
        }
    }

    /// Time the last chunk was accepted, or the transfer started
    pub fn last_chunk_at(&self) -> Option<Instant> {
        self.last_chunk_at
    }

    /// Received fraction in percent
    pub fn progress_percent(&self) -> u8 {
        if self.expected_total_size == 0 {
            return 0;
        }
        let pct = u64::from(self.bytes_received).saturating_mul(100)
            / u64::from(self.expected_total_size);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}

impl Default for UpdateClientState {
    fn default() -> Self {
        Self::idle()
    }
}
