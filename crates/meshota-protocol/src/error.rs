//! Protocol decoding errors

use meshota_errors::OtaError;
use thiserror::Error;

/// Errors raised while framing, decoding or encoding protocol lines
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line is not a well-formed message
    #[error("malformed message: {0}")]
    Malformed(String),

    /// `type` is present but not an update-protocol type
    #[error("not an update-protocol message: {0}")]
    UnknownType(String),

    /// Chunk payload is not valid transport encoding
    #[error("chunk decode failed: {0}")]
    ChunkDecode(String),

    /// Message could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<ProtocolError> for OtaError {
    fn from(e: ProtocolError) -> Self {
        OtaError::ChunkDecodeFailed(e.to_string())
    }
}
