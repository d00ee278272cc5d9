#![deny(warnings, rust_2018_idioms)]

//! The six literal end-to-end scenarios of `spec.md` §8.

use std::fmt;

use braid::exception::{catch, throw_to};
use braid::mref::MRef;
use braid::mvar::MVar;
use braid::scheduler::{RoundRobin, Scheduler};
use braid::stm::{atomically, retry, TVar};
use braid::thread_api::{fork, my_thread_id};
use braid::{Conc, Failure, ThreadAction, ThreadId};

/// Keeps stepping `last` for as long as it's still runnable, switching only
/// once it blocks. Unlike `RoundRobin`, this lets scenario 3's main thread
/// run itself into `BlockedTake` before the forked child gets a turn,
/// which is what the scenario's literal trace requires.
struct PreferLast;

impl Scheduler<()> for PreferLast {
    fn pick(&self, _state: &mut (), last: Option<ThreadId>, runnable: &[ThreadId]) -> ThreadId {
        match last {
            Some(last) if runnable.contains(&last) => last,
            _ => runnable[0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Overflow;

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overflow")
    }
}
impl std::error::Error for Overflow {}

#[test]
fn scenario_1_empty_take_blocks() {
    let comp: Conc<i32> = MVar::new_empty().and_then(|m: MVar<i32>| m.take());
    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap_err(), Failure::Deadlock);
}

#[test]
fn scenario_2_try_on_empty() {
    let comp: Conc<Option<i32>> = MVar::new_empty().and_then(|m: MVar<i32>| m.try_take());
    let (result, _, trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), None);
    assert!(trace.entries().iter().any(|e| matches!(e.action, ThreadAction::TryTake(_, false, ref woken) if woken.is_empty())));
}

#[test]
fn scenario_3_fork_and_join() {
    let comp: Conc<i32> = MVar::new_empty().and_then(|m: MVar<i32>| fork(m.put(7)).then(move || m.take()));
    let (result, _, trace) = braid::run(comp, &PreferLast, ());
    assert_eq!(result.unwrap(), 7);

    let actions: Vec<&ThreadAction> = trace.entries().iter().map(|e| &e.action).collect();
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::Fork(_))));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::BlockedTake(_))));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::Put(_, _))));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::Take(_, _))));
}

#[test]
fn scenario_4_cas_on_modified() {
    let comp: Conc<(bool, i32)> = MRef::new(5).and_then(|r: MRef<i32>| {
        r.read_for_cas().and_then(move |t| {
            r.write(6).and_then(move |()| r.cas(t, 7).and_then(move |(ok, _)| r.read().map(move |v| (ok, v))))
        })
    });
    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), (false, 6));
}

#[test]
fn scenario_5_stm_retry_wakeup() {
    let comp: Conc<i32> = atomically(|| TVar::new(0i32)).and_then(|v| {
        fork(atomically(move || v.write(1))).then(move || {
            atomically(move || {
                v.read().and_then(|x| if x == 0 { retry() } else { braid::stm::Stm::pure(x) })
            })
        })
    });
    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 1);
}

#[test]
fn scenario_6_uncaught_to_main_and_caught() {
    let uncaught: Conc<()> = my_thread_id().and_then(|t| throw_to(t, Overflow));
    let (result, _, _trace) = braid::run(uncaught, &RoundRobin, ());
    assert!(matches!(result.unwrap_err(), Failure::UncaughtException(_)));

    let caught: Conc<bool> = catch(
        my_thread_id().and_then(|t| throw_to(t, Overflow)).then(|| Conc::pure(false)),
        |_e: Overflow| Conc::pure(true),
    );
    let (result, _, _trace) = braid::run(caught, &RoundRobin, ());
    assert!(result.unwrap());
}
