//! Gateway daemon.
//!
//! Wires the [`meshota_gateway`] task to the outside world:
//!
//! ```text
//! bridge (TCP serial) ◀─▶ link ◀─▶ GatewayService ◀─▶ api (axum) ◀─▶ operator
//!                                        │
//!                                        ▼
//!                         HttpFirmwareRepository (manifest + images)
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod api;
pub mod cli;
pub mod link;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use meshota_gateway::{Gateway, GatewayConfig, GatewayService, SerialChannels};
use meshota_manifest::{
    FetcherConfig, FirmwareFetcher, HttpFirmwareRepository, ManifestResolver, ResolverConfig,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Delay between serial reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

const SERIAL_QUEUE: usize = 256;

/// Build the HTTP-backed firmware repository described by `config`.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be built.
pub fn repository(config: &GatewayConfig) -> Result<HttpFirmwareRepository> {
    let resolver = ManifestResolver::new(
        ResolverConfig::new(config.manifest_url.clone())
            .with_ttl(config.manifest_ttl())
            .with_http_timeout(Duration::from_secs(config.manifest_timeout_secs)),
    )?;
    let fetcher = FirmwareFetcher::new(
        FetcherConfig::default()
            .with_timeout(Duration::from_secs(config.download_timeout_secs))
            .with_max_bytes(config.max_firmware_bytes),
    )?;
    Ok(HttpFirmwareRepository::new(resolver, fetcher))
}

/// Run the daemon until Ctrl+C or until the gateway task stops.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the API address
/// cannot be bound.
pub async fn run(config: GatewayConfig) -> Result<()> {
    config.validate()?;
    info!(
        "Starting gateway {} v{} (manifest {})",
        config.gateway_id,
        env!("CARGO_PKG_VERSION"),
        config.manifest_url
    );

    let repo = Arc::new(repository(&config)?);
    let gateway = Gateway::new(config.clone(), repo, Instant::now())?;

    let (to_gateway, inbound) = mpsc::channel(SERIAL_QUEUE);
    let (outbound, from_gateway) = mpsc::channel(SERIAL_QUEUE);
    let (handle, gateway_task) = GatewayService::spawn(gateway, SerialChannels { inbound, outbound });

    let link_task = tokio::spawn(link::run_serial_link(
        config.serial_addr.clone(),
        RECONNECT_DELAY,
        to_gateway,
        from_gateway,
    ));

    let listener = TcpListener::bind(&config.api_bind)
        .await
        .with_context(|| format!("Failed to bind operator API on {}", config.api_bind))?;
    info!("Operator API listening on {}", config.api_bind);
    let api_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api::router(handle)).await {
            error!("Operator API error: {}", e);
        }
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down");
        }
        joined = gateway_task => {
            joined.context("Gateway task failed")?;
            warn!("Gateway task stopped");
        }
    }

    api_task.abort();
    link_task.abort();
    info!("Gateway stopped");
    Ok(())
}
