//! The update pipeline error enum and its classification helpers.

use core::fmt;

/// Errors raised anywhere along the manifest → gateway → bridge → node path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtaError {
    /// No manifest could be fetched and none is cached
    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// Manifest payload is missing `version` or `assets`
    #[error("manifest malformed: {0}")]
    ManifestMalformed(String),

    /// The manifest has no asset for this role
    #[error("role not found in manifest: {0}")]
    RoleNotFound(String),

    /// Firmware for a role could not be obtained
    #[error("firmware not found for role {role}: {reason}")]
    FirmwareNotFound {
        /// Role that was being resolved
        role: String,
        /// Underlying cause
        reason: String,
    },

    /// Non-success status or transport error while downloading
    #[error("download of {url} failed: {reason}")]
    DownloadFailed {
        /// Resource that was requested
        url: String,
        /// Underlying cause
        reason: String,
    },

    /// Stream closed before the declared length was reached
    #[error("download incomplete: expected {expected} bytes, received {received}")]
    DownloadIncomplete {
        /// Declared content length
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// Computed digest does not match the manifest digest
    #[error("integrity mismatch: expected {expected}, computed {actual}")]
    IntegrityMismatch {
        /// Digest from the manifest
        expected: String,
        /// Digest computed over the downloaded bytes
        actual: String,
    },

    /// A session for this node already exists
    #[error("update session already active for node {0}")]
    SessionAlreadyActive(u32),

    /// No registry record exists for this node
    #[error("unknown node {0}")]
    NodeUnknown(u32),

    /// A chunk payload could not be decoded
    #[error("chunk decode failed: {0}")]
    ChunkDecodeFailed(String),

    /// A decoded chunk could not be written to the firmware target
    #[error("chunk write failed: {0}")]
    ChunkWriteFailed(String),

    /// No progress within the inactivity budget
    #[error("operation timed out")]
    Timeout,

    /// The remote side aborted the transfer
    #[error("aborted by peer: {0}")]
    AbortedByPeer(String),
}

impl OtaError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OtaError::ManifestUnavailable(_)
            | OtaError::ManifestMalformed(_)
            | OtaError::RoleNotFound(_) => ErrorCategory::Manifest,
            OtaError::FirmwareNotFound { .. }
            | OtaError::DownloadFailed { .. }
            | OtaError::DownloadIncomplete { .. }
            | OtaError::IntegrityMismatch { .. } => ErrorCategory::Transfer,
            OtaError::SessionAlreadyActive(_)
            | OtaError::NodeUnknown(_)
            | OtaError::Timeout
            | OtaError::AbortedByPeer(_) => ErrorCategory::Session,
            OtaError::ChunkDecodeFailed(_) | OtaError::ChunkWriteFailed(_) => ErrorCategory::Node,
        }
    }

    /// Whether retrying the same operation later can reasonably succeed.
    ///
    /// Malformed manifests and digest mismatches need the upstream artifact to
    /// change; everything else is transient.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            OtaError::ManifestMalformed(_)
                | OtaError::RoleNotFound(_)
                | OtaError::IntegrityMismatch { .. }
        )
    }

    /// Short machine-readable code, used as the `reason` on the wire and as the
    /// `code` field of operator API errors.
    pub fn reason(&self) -> &'static str {
        match self {
            OtaError::ManifestUnavailable(_) => "manifest_unavailable",
            OtaError::ManifestMalformed(_) => "manifest_malformed",
            OtaError::RoleNotFound(_) => "role_not_found",
            OtaError::FirmwareNotFound { .. } => "firmware_not_found",
            OtaError::DownloadFailed { .. } => "download_failed",
            OtaError::DownloadIncomplete { .. } => "download_incomplete",
            OtaError::IntegrityMismatch { .. } => "integrity_mismatch",
            OtaError::SessionAlreadyActive(_) => "session_already_active",
            OtaError::NodeUnknown(_) => "node_unknown",
            OtaError::ChunkDecodeFailed(_) => "chunk_decode_failed",
            OtaError::ChunkWriteFailed(_) => "chunk_write_failed",
            OtaError::Timeout => "timeout",
            OtaError::AbortedByPeer(_) => "aborted_by_peer",
        }
    }

    /// Create a `DownloadFailed` error.
    pub fn download_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        OtaError::DownloadFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a `FirmwareNotFound` error.
    pub fn firmware_not_found(role: impl Into<String>, reason: impl Into<String>) -> Self {
        OtaError::FirmwareNotFound {
            role: role.into(),
            reason: reason.into(),
        }
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Manifest fetch, parse and lookup
    Manifest = 0,
    /// Firmware download and verification
    Transfer = 1,
    /// Gateway session lifecycle
    Session = 2,
    /// Node-local chunk handling
    Node = 3,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Manifest => write!(f, "Manifest"),
            ErrorCategory::Transfer => write!(f, "Transfer"),
            ErrorCategory::Session => write!(f, "Session"),
            ErrorCategory::Node => write!(f, "Node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_reason_matches_wire_code() {
        assert_eq!(OtaError::Timeout.reason(), "timeout");
    }

    #[test]
    fn test_integrity_mismatch_is_not_recoverable() {
        let err = OtaError::IntegrityMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Transfer);
    }
}
