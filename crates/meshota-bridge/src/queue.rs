//! Dual-priority queue with congestion-based admission.
//!
//! High-priority arrivals are always admitted. Normal arrivals are dropped
//! and counted once combined occupancy reaches the congestion threshold.
//! Each drain pass empties the high queue and forwards at most one batch of
//! normal messages.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, warn};

use crate::priority::Priority;

/// A message waiting to be forwarded to the serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Line to forward
    pub payload: String,
    /// Arrival time
    pub enqueued_at: Instant,
    /// Priority class
    pub priority: Priority,
}

/// Bounded high/normal queue pair.
#[derive(Debug)]
pub struct AdmissionQueue {
    high: VecDeque<QueuedMessage>,
    normal: VecDeque<QueuedMessage>,
    capacity: u32,
    threshold: f64,
    dropped: u64,
}

impl AdmissionQueue {
    /// Empty queue pair with combined `capacity` and congestion `threshold`
    /// as a fraction of capacity.
    pub fn new(capacity: u32, threshold: f64) -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
            capacity,
            threshold,
            dropped: 0,
        }
    }

    /// Messages held in both queues
    pub fn occupancy(&self) -> usize {
        self.high.len().saturating_add(self.normal.len())
    }

    /// Occupancy as a fraction of capacity
    pub fn load(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        f64::from(self.occupancy_u32()) / f64::from(self.capacity)
    }

    fn occupancy_u32(&self) -> u32 {
        u32::try_from(self.occupancy()).unwrap_or(u32::MAX)
    }

    /// Whether occupancy has reached the threshold
    pub fn is_congested(&self) -> bool {
        f64::from(self.occupancy_u32()) >= self.threshold * f64::from(self.capacity)
    }

    /// Admission decision for an arrival of `priority`.
    pub fn admit(&self, priority: Priority) -> bool {
        match priority {
            Priority::High => true,
            Priority::Normal => !self.is_congested() && self.occupancy_u32() < self.capacity,
        }
    }

    /// Enqueue `message` if admitted; otherwise count it as dropped.
    pub fn push(&mut self, message: QueuedMessage) -> bool {
        if !self.admit(message.priority) {
            self.dropped = self.dropped.saturating_add(1);
            warn!(
                "Queue congested ({}/{}), dropping normal message ({} dropped)",
                self.occupancy(),
                self.capacity,
                self.dropped
            );
            return false;
        }
        match message.priority {
            Priority::High => self.high.push_back(message),
            Priority::Normal => self.normal.push_back(message),
        }
        true
    }

    /// One drain pass: every high message, then up to `batch` normal ones.
    pub fn drain(&mut self, batch: usize) -> Vec<QueuedMessage> {
        let normal = batch.min(self.normal.len());
        let mut out = Vec::with_capacity(self.high.len().saturating_add(normal));
        out.extend(self.high.drain(..));
        out.extend(self.normal.drain(..normal));
        if !out.is_empty() {
            debug!(
                "Drained {} messages, {} normal pending",
                out.len(),
                self.normal.len()
            );
        }
        out
    }

    /// High-priority messages waiting
    pub fn high_len(&self) -> usize {
        self.high.len()
    }

    /// Normal messages waiting
    pub fn normal_len(&self) -> usize {
        self.normal.len()
    }

    /// Normal messages refused under congestion
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Combined capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Both queues empty
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }
}
