//! Contract checking for the threading core.
//!
//! The primitives in this crate form a trusted layer beneath higher-level
//! code: a broken precondition indicates a defect in the caller, not a
//! transient condition. Violations are therefore fatal: they panic with a
//! [`ContractViolation`] and there is no retry or recovery path anywhere in
//! the crate.

use core::fmt;

/// A broken precondition or internal invariant.
///
/// Every fatal condition the runtime can detect is enumerated here so that
/// failure messages are uniform and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// An operation that requires the interrupt line to be masked was
    /// called with interrupts enabled.
    InterruptsNotMasked,
    /// `fork` was called on a thread that is not in the `New` state.
    ForkNonNewThread,
    /// `fork` was called on a thread with no attached computation.
    ForkWithoutTarget,
    /// `ready` was called on a thread that is already `Ready`.
    ThreadAlreadyReady,
    /// `yield_now` was called while the current thread is not `Running`.
    YieldNotRunning,
    /// A thread attempted to join itself.
    JoinSelf,
    /// The boot context attempted to finish; it has no parent to tear it
    /// down.
    BootContextFinished,
    /// A mutex was acquired again by the thread that already owns it.
    MutexReacquired,
    /// A mutex was released (or used through a condition variable) by a
    /// thread that does not own it.
    MutexNotHeld,
    /// A priority outside the allowed range was requested.
    PriorityOutOfRange(u8),
    /// A delay of zero ticks was passed where a positive delay is required.
    NonPositiveDelay,
    /// A queue expected to have an empty waiting set was handed off while
    /// threads were still waiting on it.
    QueueNotIdle,
    /// An internal invariant of the runtime failed.
    Internal(&'static str),
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::InterruptsNotMasked => {
                write!(f, "operation requires the interrupt line to be masked")
            }
            ContractViolation::ForkNonNewThread => {
                write!(f, "fork called on a thread that was already forked")
            }
            ContractViolation::ForkWithoutTarget => {
                write!(f, "fork called on a thread with no target computation")
            }
            ContractViolation::ThreadAlreadyReady => {
                write!(f, "ready called on a thread that is already ready")
            }
            ContractViolation::YieldNotRunning => {
                write!(f, "yield called outside the running thread")
            }
            ContractViolation::JoinSelf => write!(f, "a thread cannot join itself"),
            ContractViolation::BootContextFinished => {
                write!(f, "the boot context cannot finish")
            }
            ContractViolation::MutexReacquired => {
                write!(f, "mutex acquired twice by its owner")
            }
            ContractViolation::MutexNotHeld => {
                write!(f, "mutex operation by a thread that does not hold it")
            }
            ContractViolation::PriorityOutOfRange(p) => {
                write!(f, "priority {} outside the allowed range", p)
            }
            ContractViolation::NonPositiveDelay => {
                write!(f, "delay must be at least one tick")
            }
            ContractViolation::QueueNotIdle => {
                write!(f, "queue handed off while its waiting set is non-empty")
            }
            ContractViolation::Internal(what) => write!(f, "invariant failed: {}", what),
        }
    }
}

/// Abort the simulation with the given violation.
#[track_caller]
pub(crate) fn violation(v: ContractViolation) -> ! {
    log::error!("contract violation: {}", v);
    panic!("contract violation: {}", v);
}

/// Check a precondition, aborting with `v` when it does not hold.
#[track_caller]
pub(crate) fn require(cond: bool, v: ContractViolation) {
    if !cond {
        violation(v);
    }
}
