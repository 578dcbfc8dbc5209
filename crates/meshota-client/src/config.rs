//! Update client configuration

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Update client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Logical device class announced in `ota_check`
    pub role: String,
    /// Version of the running image
    pub current_version: String,
    /// Human-readable name
    pub device_name: String,
    /// Seconds without an accepted chunk before the transfer is abandoned
    pub stall_timeout_secs: u64,
    /// Consecutive local chunk failures before the client gives up and restarts
    pub max_consecutive_failures: u32,
    /// Period of the `ota_check` announcement, in seconds
    pub check_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            role: "sender".to_string(),
            current_version: "0.0.0".to_string(),
            device_name: "node".to_string(),
            stall_timeout_secs: 30,
            max_consecutive_failures: 5,
            check_interval_secs: 300,
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.role.is_empty() {
            bail!("role must not be empty");
        }
        if self.stall_timeout_secs == 0 || self.check_interval_secs == 0 {
            bail!("client intervals must be positive");
        }
        if self.max_consecutive_failures == 0 {
            bail!("max_consecutive_failures must be positive");
        }
        Ok(())
    }

    /// Stall budget
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    /// Check period
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = ClientConfig::default();
        config.validate()?;
        assert_eq!(config.stall_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_consecutive_failures, 5);
        Ok(())
    }

    #[test]
    fn test_zero_failure_budget_rejected() {
        let config = ClientConfig {
            max_consecutive_failures: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
