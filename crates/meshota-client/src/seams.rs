//! Hardware seams: flash writer, device control and mesh uplink.
//!
//! The client drives these traits and never touches hardware directly.
//! In-memory implementations are provided for hosts without flash and for
//! tests.

use meshota_errors::{OtaError, Result};
use meshota_protocol::NodeId;

/// Destination of the incoming image.
pub trait FirmwareWriter {
    /// Prepare to receive `size` bytes, discarding any previous partial image.
    fn begin(&mut self, size: u32) -> Result<()>;

    /// Append `bytes` to the image.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Mark the written image bootable.
    fn finalize(&mut self) -> Result<()>;

    /// Discard the partial image. Safe to call when nothing was begun.
    fn abort(&mut self);
}

/// Device-level control.
pub trait DeviceControl {
    /// Reboot the device. On real hardware this does not return.
    fn restart(&mut self);
}

/// Sending side of the mesh, as seen from a node.
pub trait MeshUplink {
    /// Send `line` to one node
    fn send_to(&mut self, node: NodeId, line: &str);

    /// Send `line` to every node
    fn broadcast(&mut self, line: &str);
}

/// Writer that keeps the image in memory.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    expected: Option<u32>,
    buffer: Vec<u8>,
    image: Option<Vec<u8>>,
    aborts: u32,
}

impl BufferedWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Last finalized image
    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    /// Bytes of the image in progress
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Whether an image is in progress
    pub fn in_progress(&self) -> bool {
        self.expected.is_some()
    }

    /// Times a partial image was discarded
    pub fn aborts(&self) -> u32 {
        self.aborts
    }
}

impl FirmwareWriter for BufferedWriter {
    fn begin(&mut self, size: u32) -> Result<()> {
        let capacity = usize::try_from(size)
            .map_err(|e| OtaError::ChunkWriteFailed(format!("image too large: {e}")))?;
        self.buffer = Vec::with_capacity(capacity);
        self.expected = Some(size);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(expected) = self.expected else {
            return Err(OtaError::ChunkWriteFailed("write before begin".to_string()));
        };
        let after = self.buffer.len().saturating_add(bytes.len());
        if u64::try_from(after).unwrap_or(u64::MAX) > u64::from(expected) {
            return Err(OtaError::ChunkWriteFailed(format!(
                "write past end of {expected}-byte image"
            )));
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let Some(expected) = self.expected.take() else {
            return Err(OtaError::ChunkWriteFailed("finalize before begin".to_string()));
        };
        let written = std::mem::take(&mut self.buffer);
        if u64::try_from(written.len()).unwrap_or(u64::MAX) != u64::from(expected) {
            return Err(OtaError::ChunkWriteFailed(format!(
                "image incomplete: {} of {} bytes",
                written.len(),
                expected
            )));
        }
        self.image = Some(written);
        Ok(())
    }

    fn abort(&mut self) {
        if self.expected.take().is_some() {
            self.aborts = self.aborts.saturating_add(1);
        }
        self.buffer.clear();
    }
}

/// Device control that only counts restart requests.
#[derive(Debug, Default)]
pub struct RestartCounter {
    restarts: u32,
}

impl RestartCounter {
    /// Restarts requested so far
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl DeviceControl for RestartCounter {
    fn restart(&mut self) {
        self.restarts = self.restarts.saturating_add(1);
    }
}

/// Uplink that collects outgoing lines for the host to deliver.
#[derive(Debug, Default)]
pub struct UplinkOutbox {
    sent: Vec<(Option<NodeId>, String)>,
}

impl UplinkOutbox {
    /// Empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines sent so far with their destination (`None` for broadcast)
    pub fn sent(&self) -> &[(Option<NodeId>, String)] {
        &self.sent
    }

    /// Remove and return every queued line
    pub fn take(&mut self) -> Vec<(Option<NodeId>, String)> {
        std::mem::take(&mut self.sent)
    }
}

impl MeshUplink for UplinkOutbox {
    fn send_to(&mut self, node: NodeId, line: &str) {
        self.sent.push((Some(node), line.to_string()));
    }

    fn broadcast(&mut self, line: &str) {
        self.sent.push((None, line.to_string()));
    }
}
