//! Failure taxonomy (component C10, `spec.md` §4.10).
//!
//! The closed set of outcomes a run can end in besides ordinary success.
//! These are ordinary return values, not Rust exceptions — `braid` never
//! panics to report one of these, matching `spec.md` §7's two-channel
//! design. `Display`/`Error` are implemented by hand, the way the teacher's
//! `rt/thread.rs::AccessError` does it, rather than pulling in `thiserror`.

use std::fmt;

use crate::rt::id::ThreadId;

/// Why a run did not reach an ordinary `Stop` of the main thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The scheduler picked a thread id that either does not exist or is
    /// currently blocked (`spec.md` §4.8 step 5).
    Abort,
    /// Every thread is blocked and at least one is blocked on something
    /// other than STM retry (`spec.md` §4.8 step 3).
    Deadlock,
    /// Every thread is blocked and every blocked non-main thread is
    /// blocked purely on an STM retry with an empty or unsatisfiable
    /// read-set (`spec.md` §4.8 step 3, §7).
    STMDeadlock,
    /// An exception escaped the main thread's handler stack
    /// (`spec.md` §4.7).
    UncaughtException(crate::rt::exception::Exc),
    /// The interpreter detected a violation of one of its own invariants.
    /// This indicates a bug in `braid` itself, not in the user program.
    InternalError(String),
    /// The run stepped more actions than [`crate::Builder::max_branches`]
    /// allows without reaching `Stop`. Not a schedule-search bound — a
    /// guard against a user program that never terminates.
    BranchBudgetExceeded(u64),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Abort => write!(f, "scheduler requested a non-runnable thread"),
            Failure::Deadlock => write!(f, "every thread is blocked (deadlock)"),
            Failure::STMDeadlock => {
                write!(f, "every thread is blocked retrying a transaction (STM deadlock)")
            }
            Failure::UncaughtException(exc) => {
                write!(f, "uncaught exception escaped the main thread: {}", exc)
            }
            Failure::InternalError(msg) => write!(f, "internal error: {}", msg),
            Failure::BranchBudgetExceeded(budget) => {
                write!(f, "exceeded branch budget of {} actions without reaching Stop", budget)
            }
        }
    }
}

impl std::error::Error for Failure {}

/// Narrows a killed thread's cause for logging; not part of the public
/// failure taxonomy since only the main thread's death is user-visible as
/// a `Failure` (`spec.md` §3 "Lifecycles").
#[derive(Debug, Clone, Copy)]
pub(crate) enum ThreadDeath {
    Stopped,
    Uncaught,
    KilledBy(ThreadId),
}
