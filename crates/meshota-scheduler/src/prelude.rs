//! Convenience re-exports.

pub use crate::error::{SchedulerError, SchedulerResult};
pub use crate::schedule::TickSchedule;
pub use crate::timer::IntervalTimer;
