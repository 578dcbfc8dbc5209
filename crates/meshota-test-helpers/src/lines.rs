//! Helpers for inspecting protocol output.

use meshota_protocol::{OtaMessage, ProtocolError};

/// Decode every line, failing on the first malformed one.
pub fn decode_all<S: AsRef<str>>(lines: &[S]) -> Result<Vec<OtaMessage>, ProtocolError> {
    lines.iter().map(|l| OtaMessage::decode(l.as_ref())).collect()
}

/// `type` of every message.
pub fn kinds(messages: &[OtaMessage]) -> Vec<&'static str> {
    messages.iter().map(OtaMessage::kind).collect()
}
