//! Operator API handlers against a live gateway task.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use meshota_gateway::{Gateway, GatewayConfig, GatewayHandle, GatewayService, SerialChannels};
use meshota_gatewayd::api::{self, AutoUpdateRequest, TriggerRequest};
use meshota_protocol::{NodeId, OtaMessage};
use meshota_test_helpers::{FirmwareFixture, StaticRepository, must, must_some};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    handle: GatewayHandle,
    task: JoinHandle<()>,
    to_gateway: mpsc::Sender<String>,
    from_gateway: mpsc::Receiver<String>,
    repo: Arc<StaticRepository>,
}

fn spawn_gateway() -> Harness {
    let fixture = FirmwareFixture::new(1200, "mem://sender.bin");
    let repo = Arc::new(must(StaticRepository::for_fixture("2.1.1", &fixture)));
    let config = GatewayConfig {
        auto_update_enabled: false,
        ..GatewayConfig::default()
    };
    let gateway = must(Gateway::new(config, repo.clone(), std::time::Instant::now()));
    let (to_gateway, inbound) = mpsc::channel(16);
    let (outbound, from_gateway) = mpsc::channel(16);
    let (handle, task) = GatewayService::spawn(gateway, SerialChannels { inbound, outbound });
    Harness {
        handle,
        task,
        to_gateway,
        from_gateway,
        repo,
    }
}

async fn body(resp: Response) -> Value {
    let bytes = must(axum::body::to_bytes(resp.into_body(), usize::MAX).await);
    must(serde_json::from_slice(&bytes))
}

async fn check_in(h: &Harness, node: u32) {
    let line = format!(
        r#"{{"type":"ota_check_forward","source_node":{node},"role":"sender","fw_version":"2.0.0"}}"#
    );
    must(h.to_gateway.send(line).await);
    // Any command is handled after the line, so this waits for registration.
    must(h.handle.nodes().await);
}

fn ok(result: Result<Response, api::ApiError>) -> Response {
    match result {
        Ok(resp) => resp,
        Err(e) => panic!("handler failed: {:?}", e.0),
    }
}

fn err(result: Result<Response, api::ApiError>) -> Response {
    match result {
        Ok(resp) => panic!("handler succeeded with {}", resp.status()),
        Err(e) => axum::response::IntoResponse::into_response(e),
    }
}

#[tokio::test]
async fn test_health_reports_gateway_state() {
    let h = spawn_gateway();
    let resp = ok(api::health(State(h.handle.clone())).await);
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["gateway_id"], "gateway");
    assert_eq!(json["auto_update_enabled"], false);
    assert_eq!(json["active_sessions"], 0);
}

#[tokio::test]
async fn test_nodes_lists_checked_in_nodes() {
    let h = spawn_gateway();
    check_in(&h, 42).await;

    let json = body(ok(api::nodes(State(h.handle.clone())).await)).await;
    let nodes = must_some(json.as_array(), "nodes array");
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["id"], 42);
    assert_eq!(nodes[0]["role"], "sender");
    assert_eq!(nodes[0]["reported_version"], "2.0.0");
}

#[tokio::test]
async fn test_trigger_starts_session_and_sends_offer() {
    let mut h = spawn_gateway();
    check_in(&h, 42).await;

    let resp = ok(api::trigger(
        State(h.handle.clone()),
        Json(TriggerRequest { node_id: NodeId(42) }),
    )
    .await);
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let json = body(resp).await;
    assert_eq!(json["node_id"], 42);
    assert!(json["session_id"].is_string());

    let line = must_some(
        must(tokio::time::timeout(Duration::from_secs(5), h.from_gateway.recv()).await),
        "gateway output closed",
    );
    assert!(matches!(
        must(OtaMessage::decode(&line)),
        OtaMessage::OtaOffer { target_node: NodeId(42), size: 1200, .. }
    ));

    let sessions = body(ok(api::sessions(State(h.handle.clone())).await)).await;
    assert_eq!(must_some(sessions.as_array(), "sessions array").len(), 1);
    assert_eq!(sessions[0]["origin"], "operator");
}

#[tokio::test]
async fn test_trigger_errors_carry_reason_codes() {
    let h = spawn_gateway();

    let resp = err(api::trigger(
        State(h.handle.clone()),
        Json(TriggerRequest { node_id: NodeId(9) }),
    )
    .await);
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body(resp).await;
    assert_eq!(json["code"], "node_unknown");
    assert_eq!(json["error"], "unknown node 9");

    check_in(&h, 42).await;
    ok(api::trigger(State(h.handle.clone()), Json(TriggerRequest { node_id: NodeId(42) })).await);
    let resp = err(api::trigger(
        State(h.handle.clone()),
        Json(TriggerRequest { node_id: NodeId(42) }),
    )
    .await);
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body(resp).await["code"], "session_already_active");
}

#[tokio::test]
async fn test_auto_update_switch() {
    let h = spawn_gateway();

    let json = body(ok(api::set_auto(
        State(h.handle.clone()),
        Json(AutoUpdateRequest { enabled: true }),
    )
    .await))
    .await;
    assert_eq!(json["auto_update_enabled"], true);

    let json = body(ok(api::toggle_auto(State(h.handle.clone())).await)).await;
    assert_eq!(json["auto_update_enabled"], false);

    let stats = body(ok(api::stats(State(h.handle.clone())).await)).await;
    assert_eq!(stats["auto_update_enabled"], false);
}

#[tokio::test]
async fn test_manifest_refresh() {
    let h = spawn_gateway();
    let json = body(ok(api::refresh_manifest(State(h.handle.clone())).await)).await;
    assert_eq!(json["version"], "2.1.1");
    assert_eq!(json["roles"][0], "sender");

    h.repo.set_manifest_unavailable(true);
    let resp = err(api::refresh_manifest(State(h.handle.clone())).await);
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body(resp).await["code"], "manifest_unavailable");
}

#[tokio::test]
async fn test_history_is_empty_before_any_session() {
    let h = spawn_gateway();
    let json = body(ok(api::history(State(h.handle.clone())).await)).await;
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_stopped_gateway_maps_to_unavailable() {
    let h = spawn_gateway();
    let handle = h.handle.clone();
    drop(h.to_gateway);
    must(h.task.await);

    let resp = err(api::stats(State(handle)).await);
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body(resp).await["code"], "service_stopped");
}

#[tokio::test]
async fn test_router_builds() {
    let h = spawn_gateway();
    let _router = api::router(h.handle.clone());
}
