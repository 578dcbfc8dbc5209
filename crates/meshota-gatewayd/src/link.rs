//! Newline-framed link to the bridge's serial endpoint.
//!
//! The bridge exposes its serial port as a TCP stream. Inbound bytes are
//! split into lines and handed to the gateway task; outbound lines get a
//! `\n` terminator. The connection is re-established after a drop while the
//! gateway keeps running.

use std::time::Duration;

use anyhow::{Context, Result};
use meshota_protocol::LineBuffer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const READ_BUF: usize = 1024;

/// Why a pump over one connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The bridge closed the connection
    PeerClosed,
    /// The gateway task dropped its end of a channel
    GatewayStopped,
}

/// Move lines both ways over `stream` until either side goes away.
///
/// # Errors
///
/// Returns an error on a read or write failure.
pub async fn pump<S>(
    stream: S,
    inbound: &mpsc::Sender<String>,
    outbound: &mut mpsc::Receiver<String>,
) -> Result<PumpEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut framer = LineBuffer::default();
    let mut buf = [0u8; READ_BUF];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read.context("Serial read failed")?;
                if n == 0 {
                    return Ok(PumpEnd::PeerClosed);
                }
                for line in framer.push(buf.get(..n).unwrap_or_default()) {
                    if inbound.send(line).await.is_err() {
                        return Ok(PumpEnd::GatewayStopped);
                    }
                }
            }
            line = outbound.recv() => {
                let Some(line) = line else {
                    return Ok(PumpEnd::GatewayStopped);
                };
                writer.write_all(line.as_bytes()).await.context("Serial write failed")?;
                writer.write_all(b"\n").await.context("Serial write failed")?;
                writer.flush().await.context("Serial flush failed")?;
            }
        }
    }
}

/// Keep a TCP connection to `addr` alive, pumping lines until the gateway
/// stops.
///
/// Lines the gateway emits while disconnected are dropped; nodes recover
/// through their own stall handling and the gateway's session timeout.
pub async fn run_serial_link(
    addr: String,
    reconnect_delay: Duration,
    inbound: mpsc::Sender<String>,
    mut outbound: mpsc::Receiver<String>,
) {
    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                info!("Connected to bridge at {}", addr);
                match pump(stream, &inbound, &mut outbound).await {
                    Ok(PumpEnd::GatewayStopped) => {
                        info!("Gateway stopped, closing serial link");
                        return;
                    }
                    Ok(PumpEnd::PeerClosed) => warn!("Bridge closed the serial link"),
                    Err(e) => warn!("Serial link error: {:#}", e),
                }
            }
            Err(e) => warn!("Failed to connect to bridge at {}: {}", addr, e),
        }

        if !idle(&mut outbound, reconnect_delay).await {
            info!("Gateway stopped, closing serial link");
            return;
        }
        debug!("Reconnecting to {}", addr);
    }
}

/// Discard outbound lines for `delay`. Returns false if the gateway stopped.
async fn idle(outbound: &mut mpsc::Receiver<String>, delay: Duration) -> bool {
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => return true,
            line = outbound.recv() => match line {
                Some(line) => debug!("Bridge offline, dropping {} bytes", line.len()),
                None => return false,
            },
        }
    }
}
