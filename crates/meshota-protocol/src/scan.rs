//! Field scans that avoid a full structural parse.
//!
//! The bridge forwards update-protocol lines verbatim and only needs the
//! message type and the addressed node. Scanning for those two keys keeps
//! the forwarding path cheap and means a malformed payload elsewhere in the
//! line cannot make routing fail open.

use crate::node::NodeId;
use crate::OTA_TYPE_PREFIX;

/// Locate the raw text following `"key"` and its colon.
fn value_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("\"{key}\"");
    let pos = line.find(&needle)?;
    let rest = line.get(pos + needle.len()..)?;
    rest.trim_start().strip_prefix(':').map(str::trim_start)
}

/// Value of the top-level `type` field, if it is a string.
pub fn message_type(line: &str) -> Option<&str> {
    let rest = value_after(line, "type")?.strip_prefix('"')?;
    let end = rest.find('"')?;
    rest.get(..end)
}

/// True when the line's `type` is an update-protocol type.
pub fn is_ota_line(line: &str) -> bool {
    message_type(line).is_some_and(|t| t.starts_with(OTA_TYPE_PREFIX))
}

fn scan_node(line: &str, key: &str) -> Option<NodeId> {
    let rest = value_after(line, key)?;
    let rest = rest.strip_prefix('"').unwrap_or(rest);
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().map(NodeId)
}

/// `target_node` as a number or numeric string.
pub fn scan_target_node(line: &str) -> Option<NodeId> {
    scan_node(line, "target_node")
}

/// `source_node` as a number or numeric string.
pub fn scan_source_node(line: &str) -> Option<NodeId> {
    scan_node(line, "source_node")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_tolerates_whitespace() {
        assert_eq!(message_type(r#"{ "type" : "ota_end", "x":1}"#), Some("ota_end"));
        assert_eq!(message_type(r#"{"kind":"ota_end"}"#), None);
    }

    #[test]
    fn test_target_node_string_or_number() {
        assert_eq!(
            scan_target_node(r#"{"type":"ota_chunk","target_node":"123","idx":0}"#),
            Some(NodeId(123))
        );
        assert_eq!(
            scan_target_node(r#"{"type":"ota_end","target_node": 77}"#),
            Some(NodeId(77))
        );
    }

    #[test]
    fn test_malformed_target_scans_to_none() {
        assert_eq!(scan_target_node(r#"{"type":"ota_end","target_node":"abc"}"#), None);
        assert_eq!(scan_target_node(r#"{"type":"ota_end"}"#), None);
    }

    #[test]
    fn test_is_ota_line_ignores_payload_garbage() {
        assert!(is_ota_line(r#"{"type":"ota_chunk","target_node":"1","data":"{{{"#));
        assert!(!is_ota_line(r#"{"type":"sensor_data","ota_":true}"#));
    }
}
