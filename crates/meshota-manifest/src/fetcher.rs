//! Firmware download and content-hash verification.

use std::time::Duration;

use anyhow::Context;
use meshota_errors::{OtaError, Result};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Download limits.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Hard timeout for the whole transfer
    pub timeout: Duration,
    /// Largest image accepted
    pub max_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 4 * 1024 * 1024,
        }
    }
}

impl FetcherConfig {
    /// Set the transfer timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the size limit
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// Streams firmware images into memory.
pub struct FirmwareFetcher {
    config: FetcherConfig,
    client: Client,
}

impl FirmwareFetcher {
    /// Create a fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(config: FetcherConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("meshota-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    /// Current limits
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Download `url` fully.
    ///
    /// Fails with `DownloadFailed` on transport errors, non-success status or
    /// an image larger than the limit, and with `DownloadIncomplete` when the
    /// stream ends short of a declared `Content-Length`.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        info!("Downloading firmware from: {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OtaError::download_failed(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OtaError::download_failed(
                url,
                format!(
                    "status {} - {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let declared = response.content_length();
        if let Some(len) = declared
            && len > self.config.max_bytes
        {
            return Err(OtaError::download_failed(
                url,
                format!("image of {len} bytes exceeds limit of {}", self.config.max_bytes),
            ));
        }

        let capacity = declared
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        let mut bytes = Vec::with_capacity(capacity);

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    let received = bytes.len() as u64;
                    if let Some(expected) = declared
                        && received < expected
                    {
                        warn!("Download of {} interrupted after {} bytes: {}", url, received, e);
                        return Err(OtaError::DownloadIncomplete { expected, received });
                    }
                    return Err(OtaError::download_failed(url, e.to_string()));
                }
            };
            let total = (bytes.len() as u64).saturating_add(chunk.len() as u64);
            if total > self.config.max_bytes {
                return Err(OtaError::download_failed(
                    url,
                    format!("image exceeds limit of {} bytes", self.config.max_bytes),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        check_complete(declared, bytes.len() as u64)?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

/// Compare received length against a declared length.
pub fn check_complete(declared: Option<u64>, received: u64) -> Result<()> {
    match declared {
        Some(expected) if received < expected => {
            Err(OtaError::DownloadIncomplete { expected, received })
        }
        _ => Ok(()),
    }
}

/// Lowercase hex SHA-256 digest of `data`.
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Whether `s` looks like a hex SHA-256 digest.
pub fn is_valid_digest(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Case-insensitive exact digest match over the full byte sequence.
///
/// A malformed `expected` never matches.
pub fn verify(data: &[u8], expected: &str) -> bool {
    let expected = expected.trim();
    is_valid_digest(expected) && compute_digest(data).eq_ignore_ascii_case(expected)
}
