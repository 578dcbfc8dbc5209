//! Bridge configuration

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Markers that mark a line as urgent when found anywhere in its raw text.
pub const DEFAULT_PRIORITY_MARKERS: [&str; 5] =
    ["earthquake", "emergency", "alert", "\"si\":", "\"pga\":"];

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Identity stamped on forwarded traffic
    pub gateway_id: String,
    /// Combined capacity of both queues
    pub queue_capacity: u32,
    /// Occupancy fraction at which normal traffic is dropped
    pub congestion_threshold: f64,
    /// Normal messages forwarded per drain pass
    pub normal_batch_size: usize,
    /// Drain period in milliseconds
    pub drain_interval_ms: u64,
    /// Heartbeat broadcast period in seconds
    pub heartbeat_interval_secs: u64,
    /// Silence after which a node misses a heartbeat, in seconds
    pub node_timeout_secs: u64,
    /// Missed heartbeats before a node is dropped
    pub max_missed_heartbeats: u32,
    /// `mesh_status` period in seconds
    pub status_interval_secs: u64,
    /// Raw-text markers of urgent traffic
    pub priority_markers: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            gateway_id: "bridge".to_string(),
            queue_capacity: 200,
            congestion_threshold: 0.70,
            normal_batch_size: 5,
            drain_interval_ms: 20,
            heartbeat_interval_secs: 20,
            node_timeout_secs: 30,
            max_missed_heartbeats: 2,
            status_interval_secs: 60,
            priority_markers: DEFAULT_PRIORITY_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be positive");
        }
        if !(self.congestion_threshold > 0.0 && self.congestion_threshold <= 1.0) {
            bail!(
                "congestion_threshold must be in (0, 1], got {}",
                self.congestion_threshold
            );
        }
        if self.normal_batch_size == 0 {
            bail!("normal_batch_size must be positive");
        }
        if self.drain_interval_ms == 0
            || self.heartbeat_interval_secs == 0
            || self.node_timeout_secs == 0
            || self.status_interval_secs == 0
        {
            bail!("bridge intervals must be positive");
        }
        if self.max_missed_heartbeats == 0 {
            bail!("max_missed_heartbeats must be positive");
        }
        if self.priority_markers.iter().any(String::is_empty) {
            bail!("priority markers must not be empty");
        }
        Ok(())
    }

    /// Drain period
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Heartbeat period
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence budget per heartbeat
    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    /// Status period
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}
