//! Gateway configuration

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Complete gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity reported in logs and API responses
    pub gateway_id: String,
    /// Manifest URL
    pub manifest_url: String,
    /// Seconds a fetched manifest is served from cache
    pub manifest_ttl_secs: u64,
    /// HTTP timeout for the manifest request, in seconds
    pub manifest_timeout_secs: u64,
    /// Hard timeout for a firmware download, in seconds
    pub download_timeout_secs: u64,
    /// Largest firmware image accepted
    pub max_firmware_bytes: u64,
    /// Chunk size offered to nodes
    pub chunk_size: u32,
    /// Seconds without a request before a session is aborted
    pub session_timeout_secs: u64,
    /// Start sessions automatically from `ota_check`
    pub auto_update_enabled: bool,
    /// Minimum seconds between automatic attempts for one node
    pub auto_update_cooldown_secs: u64,
    /// Seconds of silence before a node is marked offline
    pub node_offline_after_secs: u64,
    /// Period of the session and liveness sweeps, in milliseconds
    pub sweep_interval_ms: u64,
    /// Completed sessions kept for the operator
    pub history_limit: usize,
    /// Address of the bridge's serial endpoint
    pub serial_addr: String,
    /// Bind address of the operator API
    pub api_bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_id: "gateway".to_string(),
            manifest_url: "http://localhost:8000/firmware/manifest.json".to_string(),
            manifest_ttl_secs: 300,
            manifest_timeout_secs: 15,
            download_timeout_secs: 30,
            max_firmware_bytes: 4 * 1024 * 1024,
            chunk_size: meshota_protocol::DEFAULT_CHUNK_SIZE,
            session_timeout_secs: 300,
            auto_update_enabled: true,
            auto_update_cooldown_secs: 300,
            node_offline_after_secs: 60,
            sweep_interval_ms: 5000,
            history_limit: 100,
            serial_addr: "127.0.0.1:7000".to_string(),
            api_bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: GatewayConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path:?}"))?;

        config.validate()?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.manifest_url.trim().is_empty() {
            anyhow::bail!("Manifest URL must not be empty");
        }
        if self.chunk_size == 0 || self.chunk_size > 4096 {
            anyhow::bail!("Invalid chunk size: {} bytes", self.chunk_size);
        }
        if self.session_timeout_secs == 0 {
            anyhow::bail!("Session timeout must be non-zero");
        }
        if self.sweep_interval_ms == 0 {
            anyhow::bail!("Sweep interval must be non-zero");
        }
        if self.node_offline_after_secs == 0 {
            anyhow::bail!("Node offline threshold must be non-zero");
        }
        if self.max_firmware_bytes == 0 || self.max_firmware_bytes > u64::from(u32::MAX) {
            anyhow::bail!("Invalid firmware size limit: {} bytes", self.max_firmware_bytes);
        }
        if self.history_limit == 0 {
            anyhow::bail!("History limit must be non-zero");
        }
        Ok(())
    }

    /// Manifest cache TTL
    pub fn manifest_ttl(&self) -> Duration {
        Duration::from_secs(self.manifest_ttl_secs)
    }

    /// Session inactivity budget
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Per-node auto-update cooldown
    pub fn auto_update_cooldown(&self) -> Duration {
        Duration::from_secs(self.auto_update_cooldown_secs)
    }

    /// Liveness threshold
    pub fn node_offline_after(&self) -> Duration {
        Duration::from_secs(self.node_offline_after_secs)
    }

    /// Sweep period
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() -> Result<()> {
        GatewayConfig::default().validate()
    }

    #[test]
    fn test_rejects_bad_chunk_size() {
        let config = GatewayConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = GatewayConfig {
            chunk_size: 8192,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("gateway.json");
        let config = GatewayConfig {
            chunk_size: 256,
            auto_update_enabled: false,
            ..Default::default()
        };
        config.save_to_path(&path).await?;
        let loaded = GatewayConfig::load_from_path(&path).await?;
        assert_eq!(loaded.chunk_size, 256);
        assert!(!loaded.auto_update_enabled);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gateway.json");
        tokio::fs::write(&path, r#"{"session_timeout_secs": 120}"#).await?;
        let loaded = GatewayConfig::load_from_path(&path).await?;
        assert_eq!(loaded.session_timeout_secs, 120);
        assert_eq!(loaded.chunk_size, 512);
        Ok(())
    }
}
