//! A single fixed-interval timer.

use std::time::{Duration, Instant};

use crate::error::{SchedulerError, SchedulerResult};

/// Fires at most once per `period` when polled.
///
/// If a pass arrives late by more than one period, the timer fires once and
/// the skipped periods are counted as missed; it never fires in a burst to
/// catch up.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Instant,
    fired: u64,
    missed: u64,
}

impl IntervalTimer {
    /// Timer whose first firing is one period after `start`.
    pub fn new(period: Duration, start: Instant) -> SchedulerResult<Self> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        Ok(Self {
            period,
            next_due: start.checked_add(period).unwrap_or(start),
            fired: 0,
            missed: 0,
        })
    }

    /// Timer that fires on the first poll at or after `start`.
    pub fn immediate(period: Duration, start: Instant) -> SchedulerResult<Self> {
        let mut timer = Self::new(period, start)?;
        timer.next_due = start;
        Ok(timer)
    }

    /// Returns `true` if the timer is due at `now`, re-arming it.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(late) = now.checked_duration_since(self.next_due) else {
            return false;
        };
        let skipped = late.as_nanos() / self.period.as_nanos().max(1);
        self.missed = self
            .missed
            .saturating_add(u64::try_from(skipped).unwrap_or(u64::MAX));
        self.fired = self.fired.saturating_add(1);
        self.next_due = now.checked_add(self.period).unwrap_or(now);
        true
    }

    /// Push the next firing one full period past `now`.
    pub fn reset(&mut self, now: Instant) {
        self.next_due = now.checked_add(self.period).unwrap_or(now);
    }

    /// Time left until the timer is due, zero if overdue.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Configured period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Times the timer has fired.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Periods skipped because passes arrived late.
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_period_rejected() {
        assert_eq!(
            IntervalTimer::new(Duration::ZERO, Instant::now()).err(),
            Some(SchedulerError::ZeroPeriod)
        );
    }

    #[test]
    fn test_fires_once_per_period() -> SchedulerResult<()> {
        let start = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_millis(100), start)?;
        assert!(!timer.poll(start));
        assert!(!timer.poll(start + Duration::from_millis(99)));
        assert!(timer.poll(start + Duration::from_millis(100)));
        assert!(!timer.poll(start + Duration::from_millis(150)));
        assert!(timer.poll(start + Duration::from_millis(200)));
        assert_eq!(timer.fired(), 2);
        assert_eq!(timer.missed(), 0);
        Ok(())
    }

    #[test]
    fn test_late_pass_counts_missed_without_burst() -> SchedulerResult<()> {
        let start = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_millis(10), start)?;
        let late = start + Duration::from_millis(45);
        assert!(timer.poll(late));
        assert!(!timer.poll(late));
        assert_eq!(timer.missed(), 3);
        Ok(())
    }

    #[test]
    fn test_immediate_fires_on_first_poll() -> SchedulerResult<()> {
        let start = Instant::now();
        let mut timer = IntervalTimer::immediate(Duration::from_secs(1), start)?;
        assert!(timer.poll(start));
        assert_eq!(timer.remaining(start), Duration::from_secs(1));
        Ok(())
    }
}
