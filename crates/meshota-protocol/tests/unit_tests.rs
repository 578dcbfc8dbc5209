//! Message catalog tests against literal wire lines.

use meshota_protocol::{MessageSink, NodeId, OtaMessage, ProtocolError};

#[test]
fn test_decode_every_gateway_bound_type() -> Result<(), ProtocolError> {
    let cases = [
        (
            r#"{"type":"ota_check_forward","source_node":11,"role":"sender","fw_version":"1.0.0","gateway_id":"bridge","timestamp":5}"#,
            "ota_check_forward",
        ),
        (r#"{"type":"ota_accept","source_node":11}"#, "ota_accept"),
        (r#"{"type":"ota_next","source_node":11,"idx":0}"#, "ota_next"),
        (
            r#"{"type":"ota_result","source_node":11,"ok":true,"msg":"done","new_version":"2.1.1"}"#,
            "ota_result",
        ),
        (
            r#"{"type":"ota_error","source_node":11,"idx":2,"reason":"chunk_decode_failed","error_count":1}"#,
            "ota_error",
        ),
        (
            r#"{"type":"ota_abort","source_node":11,"reason":"user"}"#,
            "ota_abort",
        ),
    ];
    for (line, kind) in cases {
        let msg = OtaMessage::decode(line)?;
        assert_eq!(msg.kind(), kind);
        assert_eq!(msg.source(), Some(NodeId(11)));
    }
    Ok(())
}

#[test]
fn test_decode_node_bound_with_numeric_target() -> Result<(), ProtocolError> {
    let msg = OtaMessage::decode(r#"{"type":"ota_end","target_node":9}"#)?;
    assert_eq!(msg.target(), Some(NodeId(9)));
    Ok(())
}

#[test]
fn test_result_without_msg_defaults_empty() -> Result<(), ProtocolError> {
    let msg = OtaMessage::decode(r#"{"type":"ota_result","source_node":1,"ok":false}"#)?;
    match msg {
        OtaMessage::OtaResult { msg, new_version, .. } => {
            assert!(msg.is_empty());
            assert!(new_version.is_none());
        }
        other => return Err(ProtocolError::Malformed(format!("{other:?}"))),
    }
    Ok(())
}

#[test]
fn test_malformed_json_is_error() {
    assert!(matches!(
        OtaMessage::decode(r#"{"type":"ota_next","source_node":1"#),
        Err(ProtocolError::Malformed(_))
    ));
    assert!(matches!(
        OtaMessage::decode(r#"{"type":"ota_next","source_node":1}"#),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_vec_sink_collects() {
    let mut out: Vec<OtaMessage> = Vec::new();
    out.send(OtaMessage::abort_to(NodeId(2), "timeout"));
    assert_eq!(out.len(), 1);
    assert_eq!(out.first().and_then(OtaMessage::target), Some(NodeId(2)));
}
