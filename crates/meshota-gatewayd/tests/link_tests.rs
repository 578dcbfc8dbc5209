//! Serial link over TCP against a live gateway task.

use std::sync::Arc;
use std::time::Duration;

use meshota_gateway::{Gateway, GatewayConfig, GatewayService, SerialChannels};
use meshota_gatewayd::link::run_serial_link;
use meshota_protocol::{NodeId, OtaMessage};
use meshota_test_helpers::{FirmwareFixture, StaticRepository, must, must_some};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_bridge_connection_carries_offer_and_chunks() {
    let bridge = must(TcpListener::bind("127.0.0.1:0").await);
    let addr = must(bridge.local_addr()).to_string();

    let fixture = FirmwareFixture::new(700, "mem://sender.bin");
    let repo = Arc::new(must(StaticRepository::for_fixture("2.1.1", &fixture)));
    let gateway = must(Gateway::new(
        GatewayConfig::default(),
        repo,
        std::time::Instant::now(),
    ));
    let (to_gateway, inbound) = mpsc::channel(16);
    let (outbound, from_gateway) = mpsc::channel(16);
    let (handle, _task) = GatewayService::spawn(gateway, SerialChannels { inbound, outbound });
    let link = tokio::spawn(run_serial_link(
        addr,
        Duration::from_millis(50),
        to_gateway,
        from_gateway,
    ));

    let (socket, _) = must(must(tokio::time::timeout(WAIT, bridge.accept()).await));
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();

    must(
        write
            .write_all(
                b"{\"type\":\"ota_check_forward\",\"source_node\":42,\"role\":\"sender\",\"fw_version\":\"2.0.0\"}\n",
            )
            .await,
    );
    let offer = must_some(
        must(must(tokio::time::timeout(WAIT, lines.next_line()).await)),
        "link closed",
    );
    assert!(matches!(
        must(OtaMessage::decode(&offer)),
        OtaMessage::OtaOffer { target_node: NodeId(42), size: 700, chunk: 512, .. }
    ));

    must(write.write_all(b"{\"type\":\"ota_next\",\"source_node\":42,\"idx\":1}\n").await);
    let chunk = must_some(
        must(must(tokio::time::timeout(WAIT, lines.next_line()).await)),
        "link closed",
    );
    assert!(matches!(
        must(OtaMessage::decode(&chunk)),
        OtaMessage::OtaChunk { target_node: NodeId(42), idx: 1, .. }
    ));

    assert_eq!(must(handle.stats().await).lines_received, 2);
    link.abort();
}

#[tokio::test]
async fn test_link_reconnects_after_bridge_drop() {
    let bridge = must(TcpListener::bind("127.0.0.1:0").await);
    let addr = must(bridge.local_addr()).to_string();

    let (to_gateway, mut inbound) = mpsc::channel(16);
    let (_outbound, from_gateway) = mpsc::channel::<String>(16);
    let link = tokio::spawn(run_serial_link(
        addr,
        Duration::from_millis(50),
        to_gateway,
        from_gateway,
    ));

    let (first, _) = must(must(tokio::time::timeout(WAIT, bridge.accept()).await));
    drop(first);

    let (mut second, _) = must(must(tokio::time::timeout(WAIT, bridge.accept()).await));
    must(second.write_all(b"{\"type\":\"node_status\"}\n").await);
    let line = must_some(
        must(tokio::time::timeout(WAIT, inbound.recv()).await),
        "link stopped",
    );
    assert_eq!(line, r#"{"type":"node_status"}"#);
    link.abort();
}

#[tokio::test]
async fn test_link_stops_when_gateway_drops_outbound() {
    let (to_gateway, _inbound) = mpsc::channel(16);
    let (outbound, from_gateway) = mpsc::channel::<String>(16);
    // Nothing listens here, so the link sits in its reconnect wait.
    let link = tokio::spawn(run_serial_link(
        "127.0.0.1:9".to_string(),
        Duration::from_millis(50),
        to_gateway,
        from_gateway,
    ));
    drop(outbound);
    must(must(tokio::time::timeout(WAIT, link).await));
}
