//! Gateway → bridge → node update scenarios over the in-memory mesh.

use std::time::Duration;

use anyhow::Result;
use meshota_client::{MeshUplink, UpdatePhase};
use meshota_gateway::{NodeStatus, SessionOrigin, SessionOutcome};
use meshota_integration_tests::MeshNetwork;
use meshota_protocol::NodeId;
use meshota_test_helpers::must_some;
use tracing_test::traced_test;

const TICK: Duration = Duration::from_secs(5);

#[tokio::test]
#[traced_test]
async fn test_outdated_node_is_updated_end_to_end() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 3000)?;
    net.add_node(42, "2.0.0")?;
    net.settle().await?;

    let node = must_some(net.node(42), "node 42");
    assert_eq!(node.running_version(), "2.1.1");
    assert_eq!(node.phase(), UpdatePhase::Idle);
    assert_eq!(node.writer().image(), Some(net.fixture.bytes.as_slice()));
    assert_eq!(node.device().restarts(), 1);

    let history = net.gateway.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, SessionOutcome::Succeeded);
    assert_eq!(history[0].origin, SessionOrigin::Auto);
    assert_eq!(history[0].bytes_sent, 3000);
    assert_eq!(history[0].chunk_failures, 0);
    assert_eq!(history[0].reported_errors, Some(0));

    let record = must_some(net.gateway.node(NodeId(42)), "gateway record");
    assert_eq!(record.reported_version.as_deref(), Some("2.1.1"));
    assert_eq!(record.status, NodeStatus::Online);
    assert!(net.gateway.sessions(net.now()).is_empty());

    let bridge = net.bridge.stats();
    assert!(bridge.ota_upstream > 0);
    assert!(bridge.ota_downstream > 0);
    assert_eq!(net.repo.downloads(), 1);
    Ok(())
}

#[tokio::test]
async fn test_updated_node_is_not_offered_again() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 1024)?;
    net.add_node(42, "2.0.0")?;
    net.settle().await?;
    assert_eq!(net.gateway.history().len(), 1);

    // Past both the node's check interval and the gateway's cooldown.
    net.run_for(Duration::from_secs(320), Duration::from_secs(10)).await?;

    assert_eq!(net.gateway.history().len(), 1);
    assert_eq!(net.repo.downloads(), 1);
    assert!(net.gateway.stats().lines_received > 0);
    let node = must_some(net.node(42), "node 42");
    assert_eq!(node.device().restarts(), 1);
    Ok(())
}

#[tokio::test]
async fn test_current_node_is_left_alone() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 1024)?;
    net.add_node(44, "2.1.1")?;
    net.settle().await?;

    let node = must_some(net.node(44), "node 44");
    assert_eq!(node.writer().image(), None);
    assert_eq!(node.device().restarts(), 0);
    assert!(net.gateway.history().is_empty());
    assert_eq!(net.repo.downloads(), 0);
    assert_eq!(
        must_some(net.gateway.node(NodeId(44)), "gateway record")
            .reported_version
            .as_deref(),
        Some("2.1.1")
    );
    Ok(())
}

#[tokio::test]
async fn test_several_nodes_update_independently() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 2500)?;
    net.add_node(42, "2.0.0")?;
    net.add_node(43, "1.9.4")?;
    net.add_node(44, "2.1.1")?;
    net.settle().await?;

    for id in [42, 43] {
        let node = must_some(net.node(id), "updated node");
        assert_eq!(node.running_version(), "2.1.1");
        assert_eq!(node.writer().image(), Some(net.fixture.bytes.as_slice()));
    }
    assert_eq!(must_some(net.node(44), "node 44").device().restarts(), 0);

    let history = net.gateway.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.outcome == SessionOutcome::Succeeded));
    assert_eq!(net.gateway.stats().sessions.succeeded, 2);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_corrupted_chunk_is_requested_again() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 3000)?;
    net.faults.corrupt_once.insert(2);
    net.add_node(42, "2.0.0")?;
    net.settle().await?;

    let node = must_some(net.node(42), "node 42");
    assert_eq!(node.running_version(), "2.1.1");
    assert_eq!(node.writer().image(), Some(net.fixture.bytes.as_slice()));

    let history = net.gateway.history();
    assert_eq!(history[0].outcome, SessionOutcome::Succeeded);
    assert_eq!(history[0].chunk_failures, 1);
    assert_eq!(history[0].reported_errors, Some(1));
    Ok(())
}

#[tokio::test]
async fn test_persistent_corruption_exhausts_failure_budget() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 3000)?;
    net.faults.corrupt_always = Some(1);
    net.add_node(42, "2.0.0")?;
    net.settle().await?;

    let node = must_some(net.node(42), "node 42");
    assert_eq!(node.running_version(), "2.0.0");
    assert_eq!(node.phase(), UpdatePhase::Idle);
    assert_eq!(node.writer().aborts(), 1);
    assert_eq!(node.writer().image(), None);
    assert_eq!(node.device().restarts(), 1);

    let history = net.gateway.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, SessionOutcome::Failed);
    // Four reports ask for the chunk again; the fifth failure ends the update.
    assert_eq!(history[0].chunk_failures, 4);
    assert_eq!(history[0].reported_errors, Some(5));

    let record = must_some(net.gateway.node(NodeId(42)), "gateway record");
    assert_eq!(record.reported_version.as_deref(), Some("2.0.0"));
    assert_eq!(record.status, NodeStatus::Online);
    Ok(())
}

#[tokio::test]
async fn test_node_stall_aborts_gateway_session() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 3000)?;
    net.faults.drop_chunks_from = Some(3);
    net.add_node(42, "2.0.0")?;
    net.settle().await?;

    let node = must_some(net.node(42), "node 42");
    assert_eq!(node.phase(), UpdatePhase::Receiving);
    assert_eq!(node.state().next_index, 3);
    assert_eq!(node.state().bytes_received, 3 * 512);
    assert_eq!(net.gateway.sessions(net.now()).len(), 1);

    net.run_for(Duration::from_secs(40), TICK).await?;

    let node = must_some(net.node(42), "node 42");
    assert_eq!(node.phase(), UpdatePhase::Idle);
    assert_eq!(node.writer().aborts(), 1);
    assert_eq!(node.device().restarts(), 0);
    assert_eq!(node.running_version(), "2.0.0");

    assert!(net.gateway.sessions(net.now()).is_empty());
    let history = net.gateway.history();
    assert_eq!(history[0].outcome, SessionOutcome::Failed);
    assert_eq!(history[0].message, "chunk_timeout");
    Ok(())
}

#[tokio::test]
async fn test_gateway_times_out_unreachable_node() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 3000)?;
    net.faults.drop_chunks_from = Some(2);
    net.add_node(42, "2.0.0")?;
    net.settle().await?;

    net.faults.drop_upstream = true;
    net.run_for(Duration::from_secs(320), Duration::from_secs(10)).await?;

    assert!(net.gateway.sessions(net.now()).is_empty());
    let history = net.gateway.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, SessionOutcome::TimedOut);
    assert_eq!(history[0].message, "timeout");
    assert_eq!(net.gateway.stats().sessions.failed, 1);

    // The node gave up on its own long before the gateway did.
    assert_eq!(must_some(net.node(42), "node 42").phase(), UpdatePhase::Idle);
    Ok(())
}

#[tokio::test]
async fn test_priority_traffic_flows_during_transfer() -> Result<()> {
    let mut net = MeshNetwork::new("2.1.1", 3000)?;
    net.faults.drop_chunks_from = Some(2);
    net.add_node(42, "2.0.0")?;
    net.settle().await?;

    let reading = r#"{"type":"sensor_data","device_name":"quake-7","fw_version":"2.0.0","alert":"earthquake","pga":0.41}"#;
    if let Some(node) = net.nodes.get_mut(&NodeId(42)) {
        node.uplink_mut().broadcast(reading);
    }
    net.settle().await?;

    let stats = net.bridge.stats();
    assert_eq!(stats.queued_high, 1);
    assert_eq!(stats.dropped_congestion, 0);
    let record = must_some(net.gateway.node(NodeId(42)), "gateway record");
    assert_eq!(record.device_name.as_deref(), Some("quake-7"));
    assert_eq!(record.status, NodeStatus::Updating);
    assert_eq!(net.gateway.sessions(net.now()).len(), 1);
    Ok(())
}
