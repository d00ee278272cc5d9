#![deny(warnings, rust_2018_idioms)]

use braid::mvar::MVar;
use braid::scheduler::{RoundRobin, Scheduler};
use braid::thread_api::fork;
use braid::{Conc, Failure, ThreadId};

/// Keeps stepping `last` for as long as it's still runnable, switching only
/// once it blocks. Unlike `RoundRobin` (which always switches away from
/// `last` whenever another thread is runnable), this lets a thread run
/// itself into a block before anything else gets a turn — needed to
/// actually exercise the blocking path of a fork/join program instead of
/// having the forked child race ahead and fill the cell first.
struct PreferLast;

impl Scheduler<()> for PreferLast {
    fn pick(&self, _state: &mut (), last: Option<ThreadId>, runnable: &[ThreadId]) -> ThreadId {
        match last {
            Some(last) if runnable.contains(&last) => last,
            _ => runnable[0],
        }
    }
}

#[test]
fn put_then_take_on_a_fresh_cell_returns_the_value() {
    let comp: Conc<i32> = MVar::new_empty().and_then(|m: MVar<i32>| m.put(9).then(move || m.take()));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 9);
}

#[test]
fn empty_take_blocks_the_only_thread_and_deadlocks() {
    let comp: Conc<i32> = MVar::new_empty().and_then(|m: MVar<i32>| m.take());

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap_err(), Failure::Deadlock);
}

#[test]
fn try_take_on_an_empty_cell_returns_none_without_blocking() {
    let comp: Conc<Option<i32>> = MVar::new_empty().and_then(|m: MVar<i32>| m.try_take());

    let (result, _, trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), None);

    use braid::ThreadAction;
    let took = trace.entries().iter().any(|e| matches!(e.action, ThreadAction::TryTake(_, false, _)));
    assert!(took, "expected a failed TryTake in the trace");
}

#[test]
fn fork_put_then_take_joins_the_forked_value() {
    let comp: Conc<i32> = MVar::new_empty().and_then(|m: MVar<i32>| fork(m.put(7)).then(move || m.take()));

    let (result, _, trace) = braid::run(comp, &PreferLast, ());
    assert_eq!(result.unwrap(), 7);

    use braid::ThreadAction;
    let actions: Vec<&ThreadAction> = trace.entries().iter().map(|e| &e.action).collect();
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::Fork(_))));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::BlockedTake(_))));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::Put(_, _))));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::Take(_, _))));
}

#[test]
fn read_does_not_empty_the_cell() {
    let comp: Conc<(i32, i32)> =
        MVar::new(5).and_then(|m: MVar<i32>| m.read().and_then(move |a| m.take().map(move |b| (a, b))));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), (5, 5));
}

#[test]
fn try_put_on_a_full_cell_fails_without_blocking() {
    let comp: Conc<bool> = MVar::new(1).and_then(|m: MVar<i32>| m.try_put(2));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(!result.unwrap());
}
