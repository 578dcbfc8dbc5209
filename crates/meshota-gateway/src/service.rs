//! Async host for the gateway.
//!
//! The [`Gateway`] is owned by a single task. Serial lines and operator
//! commands arrive over channels and are handled one at a time, so registry
//! and session mutations never interleave. Operators talk to the task
//! through a cloneable [`GatewayHandle`].

use std::time::Duration;

use meshota_errors::OtaError;
use meshota_manifest::FirmwareRepository;
use meshota_protocol::{NodeId, OtaMessage};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::gateway::{Gateway, GatewayStats, ManifestSummary};
use crate::registry::NodeRecord;
use crate::session::{SessionId, SessionRecord, SessionSnapshot};

/// Errors returned through a [`GatewayHandle`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The gateway task is no longer running
    #[error("gateway service stopped")]
    Stopped,

    /// The operation itself failed
    #[error(transparent)]
    Ota(#[from] OtaError),
}

/// Operator requests executed inside the gateway task.
#[derive(Debug)]
pub enum GatewayCommand {
    /// List nodes
    Nodes(oneshot::Sender<Vec<NodeRecord>>),
    /// List active sessions
    Sessions(oneshot::Sender<Vec<SessionSnapshot>>),
    /// List terminated sessions
    History(oneshot::Sender<Vec<SessionRecord>>),
    /// Counters and totals
    Stats(oneshot::Sender<GatewayStats>),
    /// Cached manifest
    Manifest(oneshot::Sender<Option<ManifestSummary>>),
    /// Start an operator session
    Trigger(NodeId, oneshot::Sender<Result<SessionId, OtaError>>),
    /// Set the automatic update switch
    SetAutoUpdate(bool, oneshot::Sender<bool>),
    /// Flip the automatic update switch
    ToggleAutoUpdate(oneshot::Sender<bool>),
    /// Force a manifest refresh
    RefreshManifest(oneshot::Sender<Result<ManifestSummary, OtaError>>),
}

/// Cloneable client for the gateway task.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    commands: mpsc::Sender<GatewayCommand>,
}

impl GatewayHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> GatewayCommand,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_closed| ServiceError::Stopped)?;
        rx.await.map_err(|_dropped| ServiceError::Stopped)
    }

    /// Known nodes
    pub async fn nodes(&self) -> Result<Vec<NodeRecord>, ServiceError> {
        self.request(GatewayCommand::Nodes).await
    }

    /// Active sessions
    pub async fn sessions(&self) -> Result<Vec<SessionSnapshot>, ServiceError> {
        self.request(GatewayCommand::Sessions).await
    }

    /// Terminated sessions, newest first
    pub async fn history(&self) -> Result<Vec<SessionRecord>, ServiceError> {
        self.request(GatewayCommand::History).await
    }

    /// Counters and totals
    pub async fn stats(&self) -> Result<GatewayStats, ServiceError> {
        self.request(GatewayCommand::Stats).await
    }

    /// Cached manifest summary
    pub async fn manifest(&self) -> Result<Option<ManifestSummary>, ServiceError> {
        self.request(GatewayCommand::Manifest).await
    }

    /// Start an operator-triggered session for `node`
    pub async fn trigger(&self, node: NodeId) -> Result<SessionId, ServiceError> {
        Ok(self.request(|tx| GatewayCommand::Trigger(node, tx)).await??)
    }

    /// Set automatic updates, returning the new state
    pub async fn set_auto_update(&self, enabled: bool) -> Result<bool, ServiceError> {
        self.request(|tx| GatewayCommand::SetAutoUpdate(enabled, tx))
            .await
    }

    /// Flip automatic updates, returning the new state
    pub async fn toggle_auto_update(&self) -> Result<bool, ServiceError> {
        self.request(GatewayCommand::ToggleAutoUpdate).await
    }

    /// Force a manifest refresh
    pub async fn refresh_manifest(&self) -> Result<ManifestSummary, ServiceError> {
        Ok(self.request(GatewayCommand::RefreshManifest).await??)
    }
}

/// Channels connecting the gateway task to the serial link.
pub struct SerialChannels {
    /// Lines received from the bridge
    pub inbound: mpsc::Receiver<String>,
    /// Lines to write to the bridge
    pub outbound: mpsc::Sender<String>,
}

/// Spawns and runs the gateway task.
pub struct GatewayService;

impl GatewayService {
    /// Spawn the task. It runs until the inbound serial channel closes.
    pub fn spawn<R>(gateway: Gateway<R>, serial: SerialChannels) -> (GatewayHandle, JoinHandle<()>)
    where
        R: FirmwareRepository + ?Sized + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let tick = gateway.config().sweep_interval().min(Duration::from_secs(1));
        let task = tokio::spawn(run(gateway, serial, rx, tick));
        (GatewayHandle { commands: tx }, task)
    }
}

async fn run<R>(
    mut gateway: Gateway<R>,
    serial: SerialChannels,
    mut commands: mpsc::Receiver<GatewayCommand>,
    tick: Duration,
) where
    R: FirmwareRepository + ?Sized,
{
    let SerialChannels {
        mut inbound,
        outbound,
    } = serial;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Gateway {} running", gateway.config().gateway_id);

    loop {
        let mut out = Vec::new();
        // Serial lines first so a command observes every line sent before it.
        tokio::select! {
            biased;
            line = inbound.recv() => match line {
                Some(line) => gateway.handle_line(&line, now(), &mut out).await,
                None => {
                    info!("Serial link closed, stopping gateway");
                    break;
                }
            },
            Some(cmd) = commands.recv() => execute(&mut gateway, cmd, &mut out).await,
            _ = ticker.tick() => gateway.tick(now(), &mut out),
        }

        if !flush(&outbound, out).await {
            error!("Serial writer gone, stopping gateway");
            break;
        }
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn flush(outbound: &mpsc::Sender<String>, out: Vec<OtaMessage>) -> bool {
    for msg in out {
        match msg.encode() {
            Ok(line) => {
                debug!("-> bridge: {}", msg.kind());
                if outbound.send(line).await.is_err() {
                    return false;
                }
            }
            Err(e) => error!("Failed to encode {}: {}", msg.kind(), e),
        }
    }
    true
}

async fn execute<R>(gateway: &mut Gateway<R>, cmd: GatewayCommand, out: &mut Vec<OtaMessage>)
where
    R: FirmwareRepository + ?Sized,
{
    // A dropped reply receiver only means the caller stopped waiting.
    match cmd {
        GatewayCommand::Nodes(reply) => {
            let _sent = reply.send(gateway.nodes());
        }
        GatewayCommand::Sessions(reply) => {
            let _sent = reply.send(gateway.sessions(now()));
        }
        GatewayCommand::History(reply) => {
            let _sent = reply.send(gateway.history());
        }
        GatewayCommand::Stats(reply) => {
            let _sent = reply.send(gateway.stats());
        }
        GatewayCommand::Manifest(reply) => {
            let _sent = reply.send(gateway.manifest());
        }
        GatewayCommand::Trigger(node, reply) => {
            let result = gateway.trigger(node, now(), out).await;
            let _sent = reply.send(result);
        }
        GatewayCommand::SetAutoUpdate(enabled, reply) => {
            gateway.set_auto_update(enabled);
            let _sent = reply.send(gateway.auto_update_enabled());
        }
        GatewayCommand::ToggleAutoUpdate(reply) => {
            let _sent = reply.send(gateway.toggle_auto_update());
        }
        GatewayCommand::RefreshManifest(reply) => {
            let _sent = reply.send(gateway.refresh_manifest().await);
        }
    }
}
