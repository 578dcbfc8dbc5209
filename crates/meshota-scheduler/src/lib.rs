//! Fixed-interval timers for a cooperative scheduling pass.
//!
//! Gateway, bridge and node all run a single loop that pumps the transport
//! and then checks a handful of periodic duties: session timeout sweep,
//! liveness sweep, heartbeat, queue draining, status broadcast. Each duty is
//! an [`IntervalTimer`]; a [`TickSchedule`] groups them so the loop asks once
//! per pass which duties are due. Timing logic therefore never lives inside
//! message handlers.
//!
//! Timers never sleep. The caller supplies `now`, which keeps every duty
//! deterministic under test.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use meshota_scheduler::TickSchedule;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Duty { Sweep, Heartbeat }
//!
//! let start = Instant::now();
//! let mut schedule = TickSchedule::new(start);
//! schedule.add(Duty::Sweep, Duration::from_secs(5))?;
//! schedule.add(Duty::Heartbeat, Duration::from_secs(20))?;
//!
//! assert!(schedule.due(start + Duration::from_secs(1)).is_empty());
//! assert_eq!(schedule.due(start + Duration::from_secs(5)), vec![Duty::Sweep]);
//! # Ok::<(), meshota_scheduler::SchedulerError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]

pub mod error;
pub mod prelude;
pub mod schedule;
pub mod timer;

pub use error::{SchedulerError, SchedulerResult};
pub use schedule::TickSchedule;
pub use timer::IntervalTimer;
