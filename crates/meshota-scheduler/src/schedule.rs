//! A set of independent timers checked once per pass.

use std::time::{Duration, Instant};

use crate::error::{SchedulerError, SchedulerResult};
use crate::timer::IntervalTimer;

/// Named periodic duties.
///
/// `K` identifies a duty (usually a small `Copy` enum owned by the host).
/// Duties are reported in registration order.
#[derive(Debug, Clone)]
pub struct TickSchedule<K> {
    start: Instant,
    timers: Vec<(K, IntervalTimer)>,
    passes: u64,
}

impl<K: Copy + PartialEq> TickSchedule<K> {
    /// Empty schedule anchored at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            timers: Vec::new(),
            passes: 0,
        }
    }

    /// Register a duty firing every `period`, first one period after start.
    pub fn add(&mut self, duty: K, period: Duration) -> SchedulerResult<()> {
        let timer = IntervalTimer::new(period, self.start)?;
        self.insert(duty, timer)
    }

    /// Register a duty that fires on the first pass.
    pub fn add_immediate(&mut self, duty: K, period: Duration) -> SchedulerResult<()> {
        let timer = IntervalTimer::immediate(period, self.start)?;
        self.insert(duty, timer)
    }

    fn insert(&mut self, duty: K, timer: IntervalTimer) -> SchedulerResult<()> {
        if self.timers.iter().any(|(k, _)| *k == duty) {
            return Err(SchedulerError::DuplicateDuty);
        }
        self.timers.push((duty, timer));
        Ok(())
    }

    /// Duties due at `now`. Each due timer is re-armed.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        self.passes = self.passes.saturating_add(1);
        self.timers
            .iter_mut()
            .filter_map(|(duty, timer)| timer.poll(now).then_some(*duty))
            .collect()
    }

    /// Re-arm one duty a full period past `now`.
    pub fn reset(&mut self, duty: K, now: Instant) {
        if let Some((_, timer)) = self.timers.iter_mut().find(|(k, _)| *k == duty) {
            timer.reset(now);
        }
    }

    /// Timer backing a duty.
    pub fn timer(&self, duty: K) -> Option<&IntervalTimer> {
        self.timers.iter().find(|(k, _)| *k == duty).map(|(_, t)| t)
    }

    /// Shortest wait until any duty is due.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.timers.iter().map(|(_, t)| t.remaining(now)).min()
    }

    /// Number of passes evaluated.
    pub fn passes(&self) -> u64 {
        self.passes
    }
}
