//! Automatic update policy driven by node `ota_check` reports.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use meshota_protocol::NodeId;
use tracing::info;

/// Whether automatic updates run and how often each node may be retried.
#[derive(Debug)]
pub struct AutoUpdatePolicy {
    enabled: bool,
    cooldown: Duration,
    last_attempt: HashMap<NodeId, Instant>,
}

impl AutoUpdatePolicy {
    /// Policy with the given switch and per-node cooldown.
    pub fn new(enabled: bool, cooldown: Duration) -> Self {
        Self {
            enabled,
            cooldown,
            last_attempt: HashMap::new(),
        }
    }

    /// Whether automatic updates are on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn automatic updates on or off
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("Automatic updates {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    /// Flip the switch, returning the new state
    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    /// Whether `node` had an automatic attempt within the cooldown window.
    pub fn in_cooldown(&self, node: NodeId, now: Instant) -> bool {
        self.last_attempt
            .get(&node)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.cooldown)
    }

    /// Whether an `ota_check` from `node` may trigger an attempt now.
    pub fn may_attempt(&self, node: NodeId, now: Instant) -> bool {
        self.enabled && !self.in_cooldown(node, now)
    }

    /// Record an automatic attempt for `node`.
    pub fn stamp(&mut self, node: NodeId, now: Instant) {
        self.last_attempt.insert(node, now);
    }

    /// Time left in `node`'s cooldown
    pub fn cooldown_remaining(&self, node: NodeId, now: Instant) -> Duration {
        self.last_attempt
            .get(&node)
            .map(|last| {
                self.cooldown
                    .saturating_sub(now.saturating_duration_since(*last))
            })
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_window() {
        let mut policy = AutoUpdatePolicy::new(true, Duration::from_secs(300));
        let start = Instant::now();
        assert!(policy.may_attempt(NodeId(1), start));
        policy.stamp(NodeId(1), start);
        assert!(!policy.may_attempt(NodeId(1), start + Duration::from_secs(299)));
        assert!(policy.may_attempt(NodeId(2), start + Duration::from_secs(1)));
        assert!(policy.may_attempt(NodeId(1), start + Duration::from_secs(300)));
        assert_eq!(
            policy.cooldown_remaining(NodeId(1), start + Duration::from_secs(100)),
            Duration::from_secs(200)
        );
    }

    #[test]
    fn test_disabled_blocks_attempts() {
        let mut policy = AutoUpdatePolicy::new(true, Duration::from_secs(300));
        assert!(!policy.toggle());
        assert!(!policy.may_attempt(NodeId(1), Instant::now()));
        assert!(policy.toggle());
    }
}
