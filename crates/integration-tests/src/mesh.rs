//! In-memory mesh: one gateway, one bridge, any number of nodes.
//!
//! Time is explicit. [`MeshNetwork::step`] moves every pending line one hop
//! and runs the timed duties due at the current instant;
//! [`MeshNetwork::settle`] repeats it until nothing moves.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use meshota_bridge::{BridgeConfig, BridgeRouter, MeshFrame, MeshOutbox};
use meshota_client::{BufferedWriter, ClientConfig, RestartCounter, UpdateClient, UplinkOutbox};
use meshota_gateway::{Gateway, GatewayConfig};
use meshota_protocol::{NodeId, OtaMessage, scan};
use meshota_test_helpers::{FirmwareFixture, StaticRepository};
use tracing::{debug, warn};

/// Mesh id of the bridge
pub const BRIDGE_ID: NodeId = NodeId(1);

const SETTLE_LIMIT: usize = 10_000;

/// Update client as wired inside the simulation
pub type SimClient = UpdateClient<BufferedWriter, RestartCounter, UplinkOutbox>;

/// Damage applied to traffic between the bridge and the nodes.
#[derive(Debug, Default, Clone)]
pub struct LinkFaults {
    /// Chunk indices corrupted once, the first time they cross the mesh
    pub corrupt_once: BTreeSet<u32>,
    /// Chunk index corrupted every time
    pub corrupt_always: Option<u32>,
    /// Chunks at or past this index never arrive
    pub drop_chunks_from: Option<u32>,
    /// Nothing from the nodes reaches the bridge
    pub drop_upstream: bool,
}

impl LinkFaults {
    /// Apply the faults to a downstream frame. `None` means the frame is lost.
    fn downstream(&mut self, frame: MeshFrame) -> Option<MeshFrame> {
        let MeshFrame::Unicast(node, line) = &frame else {
            return Some(frame);
        };
        let Ok(OtaMessage::OtaChunk {
            target_node,
            idx,
            data,
        }) = OtaMessage::decode(line)
        else {
            return Some(frame);
        };

        if self.drop_chunks_from.is_some_and(|from| idx >= from) {
            debug!("Dropping chunk {} for node {}", idx, node);
            return None;
        }
        if self.corrupt_always == Some(idx) || self.corrupt_once.remove(&idx) {
            let damaged = OtaMessage::OtaChunk {
                target_node,
                idx,
                data: format!("%{}", data.get(1..).unwrap_or_default()),
            };
            match damaged.encode() {
                Ok(line) => return Some(MeshFrame::Unicast(*node, line)),
                Err(e) => warn!("Failed to re-encode damaged chunk: {}", e),
            }
        }
        Some(frame)
    }
}

/// One gateway, one bridge and a set of nodes exchanging lines in memory.
pub struct MeshNetwork {
    /// Gateway under test
    pub gateway: Gateway<StaticRepository>,
    /// Bridge between the gateway's serial link and the mesh
    pub bridge: BridgeRouter<MeshOutbox, Vec<String>>,
    /// Nodes by mesh id
    pub nodes: BTreeMap<NodeId, SimClient>,
    /// Firmware published to the gateway
    pub repo: Arc<StaticRepository>,
    /// Image published for the sender role
    pub fixture: FirmwareFixture,
    /// Fault injection on the mesh side
    pub faults: LinkFaults,
    now: Instant,
}

impl MeshNetwork {
    /// Network whose manifest publishes `version` with a `len`-byte image.
    ///
    /// # Errors
    ///
    /// Returns an error if any component rejects its default configuration.
    pub fn new(version: &str, len: usize) -> Result<Self> {
        Self::with_config(version, len, GatewayConfig::default())
    }

    /// Same as [`new`](Self::new) with a custom gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any component rejects its configuration.
    pub fn with_config(version: &str, len: usize, config: GatewayConfig) -> Result<Self> {
        let now = Instant::now();
        let fixture = FirmwareFixture::new(len, "mem://sender.bin");
        let repo = Arc::new(StaticRepository::for_fixture(version, &fixture)?);
        let gateway = Gateway::new(config, repo.clone(), now)?;
        let bridge = BridgeRouter::new(
            BridgeConfig::default(),
            MeshOutbox::new(BRIDGE_ID),
            Vec::new(),
            now,
        )?;
        Ok(Self {
            gateway,
            bridge,
            nodes: BTreeMap::new(),
            repo,
            fixture,
            faults: LinkFaults::default(),
            now,
        })
    }

    /// Join a sender node running `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client configuration is invalid.
    pub fn add_node(&mut self, id: u32, version: &str) -> Result<()> {
        let config = ClientConfig {
            current_version: version.to_string(),
            device_name: format!("node-{id}"),
            ..ClientConfig::default()
        };
        let node = NodeId(id);
        let client = UpdateClient::new(
            config,
            node,
            BufferedWriter::new(),
            RestartCounter::default(),
            UplinkOutbox::new(),
            self.now,
        )?;
        self.nodes.insert(node, client);
        self.bridge.on_node_connected(node, self.now);
        Ok(())
    }

    /// Current simulated time
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Move simulated time forward
    pub fn advance(&mut self, by: Duration) {
        self.now = self.now.checked_add(by).unwrap_or(self.now);
    }

    /// Node `id`, if it joined
    pub fn node(&self, id: u32) -> Option<&SimClient> {
        self.nodes.get(&NodeId(id))
    }

    /// Move every pending line one hop. Returns the number of lines moved.
    pub async fn step(&mut self) -> usize {
        let now = self.now;
        let mut moved = 0usize;

        // nodes -> bridge
        for (id, client) in &mut self.nodes {
            client.poll(now);
            for (_, line) in client.uplink_mut().take() {
                moved = moved.saturating_add(1);
                if self.faults.drop_upstream {
                    continue;
                }
                self.bridge.on_mesh_message(*id, &line, now);
            }
        }

        // bridge -> gateway
        self.bridge.poll(now);
        self.bridge.drain();
        let mut out = Vec::new();
        for line in std::mem::take(self.bridge.serial_mut()) {
            moved = moved.saturating_add(1);
            self.gateway.handle_line(&line, now, &mut out).await;
        }

        // gateway -> bridge
        self.gateway.tick(now, &mut out);
        for msg in out {
            match msg.encode() {
                Ok(line) => {
                    moved = moved.saturating_add(1);
                    self.bridge.on_serial_line(&line, now);
                }
                Err(e) => warn!("Failed to encode {}: {}", msg.kind(), e),
            }
        }

        // bridge -> nodes
        for frame in self.bridge.mesh_mut().take() {
            moved = moved.saturating_add(1);
            let Some(frame) = self.faults.downstream(frame) else {
                continue;
            };
            for (id, client) in &mut self.nodes {
                if !frame.reaches(*id) {
                    continue;
                }
                if scan::message_type(frame.line()) == Some("heartbeat_request") {
                    let reply = format!(r#"{{"type":"heartbeat_response","node_id":{}}}"#, id.get());
                    if !self.faults.drop_upstream {
                        self.bridge.on_mesh_message(*id, &reply, now);
                    }
                    continue;
                }
                client.handle_line(BRIDGE_ID, frame.line(), now);
            }
        }

        moved
    }

    /// Step until no line moves.
    ///
    /// # Errors
    ///
    /// Returns an error if traffic never quiesces.
    pub async fn settle(&mut self) -> Result<usize> {
        let mut total = 0usize;
        for _ in 0..SETTLE_LIMIT {
            let moved = self.step().await;
            if moved == 0 {
                return Ok(total);
            }
            total = total.saturating_add(moved);
        }
        bail!("mesh did not settle after {SETTLE_LIMIT} steps")
    }

    /// Advance time in `tick` increments up to `total`, settling after each.
    ///
    /// # Errors
    ///
    /// Returns an error if traffic never quiesces.
    pub async fn run_for(&mut self, total: Duration, tick: Duration) -> Result<()> {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.advance(tick);
            elapsed = elapsed.saturating_add(tick);
            self.settle().await?;
        }
        Ok(())
    }
}
