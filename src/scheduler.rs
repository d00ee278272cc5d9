//! Pluggable scheduling (`spec.md` §6 "To schedulers", §9).
//!
//! A scheduler is a pure function from `(state, last thread, runnable
//! list)` to the next thread to step. `braid` ships two illustrative,
//! test-only implementations; schedule-space *search* strategies
//! (preemption-bounded, random, partial-order reduction) are explicitly out
//! of scope (`spec.md` §1) and are expected to live in a separate crate
//! built on top of this trait.

use crate::ThreadId;

/// Chooses the next thread to step. `state` is caller-owned and opaque to
/// the interpreter; `last` is `None` only for the very first decision of a
/// run (the interpreter does not consult the scheduler for that one — see
/// `spec.md` §4.8 step 4 — so implementations will only ever see `Some`,
/// but the type keeps the contract honest). `runnable` is always
/// non-empty, in ascending id order, and includes commit pseudo-threads
/// (`spec.md` §6).
pub trait Scheduler<S> {
    fn pick(&self, state: &mut S, last: Option<ThreadId>, runnable: &[ThreadId]) -> ThreadId;
}

/// Always steps the lowest-id runnable thread that isn't `last`, falling
/// back to `last` itself if it is the only runnable one. Deterministic and
/// fair in practice for the small thread counts the literal scenarios in
/// `spec.md` §8 exercise.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl Scheduler<()> for RoundRobin {
    fn pick(&self, _state: &mut (), last: Option<ThreadId>, runnable: &[ThreadId]) -> ThreadId {
        match last {
            Some(last) => *runnable.iter().find(|&&tid| tid != last).unwrap_or(&runnable[0]),
            None => runnable[0],
        }
    }
}

/// Replays a fixed, literal sequence of decisions recorded ahead of time
/// (e.g. by a search strategy, or by hand in a regression test). Panics if
/// asked for more decisions than it was given, or if a recorded decision is
/// not currently runnable — both indicate the replayed schedule no longer
/// matches the program being run.
#[derive(Debug, Clone)]
pub struct Fixed {
    decisions: Vec<ThreadId>,
}

impl Fixed {
    /// Builds a scheduler that replays the given sequence of decisions in
    /// order, one per call to [`Scheduler::pick`].
    pub fn new(decisions: Vec<ThreadId>) -> Fixed {
        Fixed { decisions }
    }
}

impl Scheduler<usize> for Fixed {
    fn pick(&self, state: &mut usize, _last: Option<ThreadId>, runnable: &[ThreadId]) -> ThreadId {
        let chosen = self
            .decisions
            .get(*state)
            .copied()
            .unwrap_or_else(|| panic!("Fixed scheduler ran out of recorded decisions"));
        assert!(
            runnable.contains(&chosen),
            "Fixed scheduler's next decision {:?} is not in the runnable set {:?}",
            chosen,
            runnable
        );
        *state += 1;
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_avoids_repeating_the_last_thread_when_others_are_runnable() {
        let mut ids = crate::rt::id::Source::new(crate::rt::id::RunId::first());
        let runnable = vec![ids.next_thread(None), ids.next_thread(None)];

        let sched = RoundRobin;
        let chosen = sched.pick(&mut (), Some(runnable[0]), &runnable);
        assert_eq!(chosen, runnable[1]);
    }
}
