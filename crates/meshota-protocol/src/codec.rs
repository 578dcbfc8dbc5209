//! Text-safe chunk encoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::ProtocolError;

/// Encode chunk bytes for inclusion in a text message.
pub fn encode_chunk(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a chunk payload.
///
/// An empty payload is an error: a served chunk always carries at least one
/// byte.
pub fn decode_chunk(data: &str) -> Result<Vec<u8>, ProtocolError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ProtocolError::ChunkDecode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ProtocolError::ChunkDecode("empty chunk".to_string()));
    }
    Ok(bytes)
}

/// Number of chunks needed for `total` bytes.
pub fn chunk_count(total: u32, chunk_size: u32) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    total.div_ceil(chunk_size)
}
