//! Newline framing for byte-stream links.

use tracing::warn;

/// Default maximum length of one line, in bytes.
pub const DEFAULT_MAX_LINE: usize = 2048;

/// Accumulates bytes from a stream link and yields complete lines.
///
/// `\n` and `\r` both terminate a line; empty lines are skipped. A line that
/// grows past `max_len` is discarded up to its terminator.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
    overflows: u64,
}

impl LineBuffer {
    /// Create a buffer with the given line length limit.
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len.min(DEFAULT_MAX_LINE)),
            max_len,
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' || b == b'\r' {
                if self.discarding {
                    self.discarding = false;
                } else if !self.buf.is_empty() {
                    let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
                self.buf.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.buf.len() >= self.max_len {
                self.overflows = self.overflows.saturating_add(1);
                warn!("Discarding line longer than {} bytes", self.max_len);
                self.buf.clear();
                self.discarding = true;
                continue;
            }
            self.buf.push(b);
        }
        lines
    }

    /// Bytes held for the current partial line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Number of oversized lines discarded so far.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}
