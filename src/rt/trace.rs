//! Trace & failure (component C10, `spec.md` §3 "Trace", §4.10).
//!
//! A completed run's trace is the ordered `(Decision, ThreadAction,
//! Lookahead)` triple list `spec.md` §3 describes. Unlike the source
//! language, where prepending to an immutable list is the only O(1) option
//! (hence "build reversed, reverse once at the end"), `Vec::push` is already
//! O(1) amortized, so entries are appended directly in forward order.

use std::fmt;

#[cfg(feature = "trace-serde")]
use serde::{Deserialize, Serialize};

use crate::rt::action::Lookahead;
use crate::rt::id::{MRefId, MVarId, ThreadId, TVarId};

/// Why the interpreter stepped this particular thread (`spec.md` §4.8 step
/// 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
pub enum Decision {
    /// First step ever taken by this thread.
    Start(ThreadId),
    /// Same thread as the previous step.
    Continue,
    /// A different thread than the previous step.
    SwitchTo(ThreadId),
}

/// A narrowed, logging-friendly record of one executed action: which ids it
/// touched and which threads it woke, per `spec.md` §3's `ThreadAction`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
pub enum ThreadAction {
    /// Spawned the given child thread.
    Fork(ThreadId),
    /// Looked up the running thread's own id.
    MyThreadId,
    /// Read the current capability count.
    GetCaps,
    /// Set the capability count.
    SetCaps,
    /// Voluntarily yielded.
    Yield,
    /// Read the running thread's own masking state.
    GetMasking,
    /// Created a new `MVar`.
    NewMVar(MVarId),
    /// Filled an `MVar`, waking the given blocked readers/takers.
    Put(MVarId, Vec<ThreadId>),
    /// Blocked trying to fill an already-full `MVar`.
    BlockedPut(MVarId),
    /// Emptied an `MVar` by taking its value, waking the given blocked putters.
    Take(MVarId, Vec<ThreadId>),
    /// Blocked trying to take from an empty `MVar`.
    BlockedTake(MVarId),
    /// Read an `MVar` without emptying it.
    Read(MVarId),
    /// Blocked trying to read an empty `MVar`.
    BlockedRead(MVarId),
    /// Attempted a non-blocking put; `bool` is whether it succeeded.
    TryPut(MVarId, bool, Vec<ThreadId>),
    /// Attempted a non-blocking take; `bool` is whether it succeeded.
    TryTake(MVarId, bool, Vec<ThreadId>),
    /// Attempted a non-blocking read; `bool` is whether it succeeded.
    TryRead(MVarId, bool),
    /// Created a new mutable cell.
    NewMRef(MRefId),
    /// Read a mutable cell.
    ReadMRef(MRefId),
    /// Wrote a mutable cell.
    WriteMRef(MRefId),
    /// Applied a pure function to a mutable cell under a full barrier.
    ModifyMRef(MRefId),
    /// Attempted a compare-and-swap; `bool` is whether it succeeded.
    CasMRef(MRefId, bool),
    /// Took a ticket on a mutable cell's current value for a later CAS.
    ReadForCas(MRefId),
    /// `owner` is the thread whose pending write this pseudo-thread step
    /// published; needed to apply the "switch from a commit thread is
    /// transparent if it lands back on the interrupted thread" rule.
    CommitMRef { owner: ThreadId, id: MRefId },
    /// An STM transaction committed, waking the given threads blocked on
    /// a `retry` whose read-set it invalidated.
    AtomicallySuccess { woken: Vec<ThreadId> },
    /// An STM transaction blocked on `retry`.
    AtomicallyBlocked,
    /// An STM transaction was abandoned and retried after a conflicting
    /// commit invalidated its read-set mid-flight.
    AtomicallyAborted,
    /// Raised a synchronous exception.
    Throw,
    /// Blocked delivering an asynchronous exception to a masked-uninterruptible target.
    BlockedThrowTo(ThreadId),
    /// Delivered an asynchronous exception to the given thread.
    ThrowTo(ThreadId),
    /// Pushed an exception handler.
    Catching,
    /// Popped an exception handler.
    PopCatching,
    /// Entered a masked region.
    SetMasking,
    /// Restored the masking state from before a masked region.
    ResetMasking,
    /// Ran an embedded effect.
    Lift,
    /// Returned a pure value.
    Return,
    /// Terminated the thread.
    Stop,
    /// Entered a sub-computation.
    StartSubconcurrency,
    /// Left a sub-computation, reifying its outcome.
    StopSubconcurrency,
}

impl fmt::Display for ThreadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One stepped action, as recorded in a [`Trace`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
pub struct TraceEntry {
    /// Which thread was stepped, and why.
    pub decision: Decision,
    /// What that step actually did.
    pub action: ThreadAction,
    /// The lookahead recorded for this step, if any.
    pub lookahead: Lookahead,
}

/// The canonical forward-order record of a run's decisions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
pub struct Trace(Vec<TraceEntry>);

impl Trace {
    pub(crate) fn push(&mut self, decision: Decision, action: ThreadAction, lookahead: Lookahead) {
        self.0.push(TraceEntry { decision, action, lookahead });
    }

    /// The entries of this trace, in the order they were stepped.
    pub fn entries(&self) -> &[TraceEntry] {
        &self.0
    }

    /// The number of entries in this trace.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this trace has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Embeds another trace's entries verbatim, in order (`spec.md` §4.9:
    /// "the outer trace embeds the inner trace verbatim between its
    /// start/stop markers").
    pub(crate) fn extend(&mut self, other: Trace) {
        self.0.extend(other.0);
    }
}

/// `spec.md` §4.8 "preemption counting": switches not preceded by an
/// explicit yield, skipping commit pseudo-thread switches, and collapsing a
/// switch away from a commit thread back onto the thread it interrupted.
pub fn count_preemptions(trace: &Trace) -> u64 {
    let entries = trace.entries();
    let mut count = 0u64;
    for i in 1..entries.len() {
        let to = match entries[i].decision {
            Decision::SwitchTo(to) => to,
            _ => continue,
        };
        if to.is_commit_pseudo() {
            continue;
        }
        match &entries[i - 1].action {
            ThreadAction::Yield => continue,
            ThreadAction::CommitMRef { owner, .. } if *owner == to => continue,
            _ => {}
        }
        count += 1;
    }
    count
}
