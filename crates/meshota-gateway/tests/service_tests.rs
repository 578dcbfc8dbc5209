//! Gateway task tests over channels.

use std::sync::Arc;
use std::time::Duration;

use meshota_errors::OtaError;
use meshota_gateway::{
    Gateway, GatewayConfig, GatewayHandle, GatewayService, SerialChannels, ServiceError,
    SessionOutcome,
};
use meshota_protocol::{NodeId, OtaMessage};
use meshota_test_helpers::{FirmwareFixture, StaticRepository, must, must_some};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    handle: GatewayHandle,
    task: JoinHandle<()>,
    to_gateway: mpsc::Sender<String>,
    from_gateway: mpsc::Receiver<String>,
}

fn spawn_gateway(auto_update: bool) -> Harness {
    let fixture = FirmwareFixture::new(1500, "mem://sender.bin");
    let repo = Arc::new(must(StaticRepository::for_fixture("2.1.1", &fixture)));
    let config = GatewayConfig {
        auto_update_enabled: auto_update,
        ..GatewayConfig::default()
    };
    let now = tokio::time::Instant::now().into_std();
    let gateway = must(Gateway::new(config, repo, now));

    let (to_gateway, inbound) = mpsc::channel(16);
    let (outbound, from_gateway) = mpsc::channel(16);
    let (handle, task) = GatewayService::spawn(gateway, SerialChannels { inbound, outbound });
    Harness {
        handle,
        task,
        to_gateway,
        from_gateway,
    }
}

async fn next_message(rx: &mut mpsc::Receiver<String>) -> OtaMessage {
    let line = must_some(
        must(tokio::time::timeout(Duration::from_secs(600), rx.recv()).await),
        "gateway output closed",
    );
    must(OtaMessage::decode(&line))
}

const CHECK: &str = r#"{"type":"ota_check_forward","source_node":42,"role":"sender","fw_version":"2.0.0"}"#;

#[tokio::test(start_paused = true)]
async fn test_check_produces_offer_on_serial() -> Result<(), ServiceError> {
    let mut h = spawn_gateway(true);
    must(h.to_gateway.send(CHECK.to_string()).await);

    let offer = next_message(&mut h.from_gateway).await;
    assert!(matches!(
        offer,
        OtaMessage::OtaOffer { target_node: NodeId(42), size: 1500, chunk: 512, .. }
    ));

    must(h.to_gateway.send(r#"{"type":"ota_next","source_node":42,"idx":0}"#.to_string()).await);
    assert!(matches!(
        next_message(&mut h.from_gateway).await,
        OtaMessage::OtaChunk { idx: 0, .. }
    ));

    let sessions = h.handle.sessions().await?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].next_chunk_index, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_operator_commands() -> Result<(), ServiceError> {
    let mut h = spawn_gateway(false);
    must(h.to_gateway.send(CHECK.to_string()).await);

    // The check is processed before the command that follows it.
    let nodes = h.handle.nodes().await?;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].role.as_deref(), Some("sender"));

    let unknown = h.handle.trigger(NodeId(9)).await;
    assert!(matches!(unknown, Err(ServiceError::Ota(OtaError::NodeUnknown(9)))));

    h.handle.trigger(NodeId(42)).await?;
    assert!(matches!(
        next_message(&mut h.from_gateway).await,
        OtaMessage::OtaOffer { .. }
    ));
    let duplicate = h.handle.trigger(NodeId(42)).await;
    assert!(matches!(
        duplicate,
        Err(ServiceError::Ota(OtaError::SessionAlreadyActive(42)))
    ));

    assert!(h.handle.toggle_auto_update().await?);
    assert!(!h.handle.set_auto_update(false).await?);

    let summary = h.handle.refresh_manifest().await?;
    assert_eq!(summary.version, "2.1.1");
    assert!(h.handle.manifest().await?.is_some());

    let stats = h.handle.stats().await?;
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.updating_nodes, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_is_aborted_by_the_sweep() -> Result<(), ServiceError> {
    let mut h = spawn_gateway(true);
    must(h.to_gateway.send(CHECK.to_string()).await);
    assert!(matches!(
        next_message(&mut h.from_gateway).await,
        OtaMessage::OtaOffer { .. }
    ));

    // Paused time advances on its own while the gateway waits.
    let abort = next_message(&mut h.from_gateway).await;
    assert_eq!(abort, OtaMessage::abort_to(NodeId(42), "timeout"));

    let history = h.handle.history().await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, SessionOutcome::TimedOut);
    Ok(())
}

#[tokio::test]
async fn test_closing_serial_stops_the_task() {
    let h = spawn_gateway(true);
    drop(h.to_gateway);
    must(h.task.await);

    assert!(matches!(h.handle.nodes().await, Err(ServiceError::Stopped)));
}
