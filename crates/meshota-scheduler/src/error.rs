//! Scheduler configuration errors.

use thiserror::Error;

/// Errors raised when building timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A timer period of zero would fire on every pass
    #[error("timer period must be non-zero")]
    ZeroPeriod,

    /// The same duty was registered twice
    #[error("duty already scheduled")]
    DuplicateDuty,
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
