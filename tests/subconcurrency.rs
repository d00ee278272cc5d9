#![deny(warnings, rust_2018_idioms)]

use std::fmt;

use braid::exception::throw;
use braid::mvar::MVar;
use braid::scheduler::RoundRobin;
use braid::sub::subconcurrency;
use braid::thread_api::fork;
use braid::{Conc, Failure, ThreadAction};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Boom;

impl fmt::Display for Boom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boom")
    }
}
impl std::error::Error for Boom {}

#[test]
fn a_successful_sub_computation_reifies_its_result() {
    let comp: Conc<i32> = subconcurrency(MVar::new(3).and_then(|m: MVar<i32>| m.take().map(|v| v * 2)))
        .map(|inner| inner.unwrap());

    let (result, _, trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 6);

    let actions: Vec<&ThreadAction> = trace.entries().iter().map(|e| &e.action).collect();
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::StartSubconcurrency)));
    assert!(actions.iter().any(|a| matches!(a, ThreadAction::StopSubconcurrency)));
}

#[test]
fn a_failing_sub_computation_reifies_the_failure_instead_of_ending_the_run() {
    let comp: Conc<bool> = subconcurrency(throw::<(), Boom>(Boom)).map(|inner| {
        matches!(inner, Err(Failure::UncaughtException(_)))
    });

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(result.unwrap(), "the outer run should survive an uncaught exception inside a sub-computation");
}

#[test]
fn a_deadlocking_sub_computation_reifies_as_deadlock() {
    let comp: Conc<bool> = subconcurrency(MVar::new_empty().and_then(|m: MVar<i32>| m.take()))
        .map(|inner| matches!(inner, Err(Failure::Deadlock)));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(result.unwrap());
}

#[test]
fn the_outer_trace_embeds_the_inner_trace_between_start_and_stop_markers() {
    let comp: Conc<i32> = subconcurrency(fork(MVar::new(1).and_then(|m: MVar<i32>| m.take().map(|_| ()))).then(|| Conc::pure(5)))
        .map(|inner| inner.unwrap());

    let (result, _, trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 5);

    let start = trace.entries().iter().position(|e| matches!(e.action, ThreadAction::StartSubconcurrency));
    let stop = trace.entries().iter().position(|e| matches!(e.action, ThreadAction::StopSubconcurrency));
    let (start, stop) = (start.unwrap(), stop.unwrap());
    assert!(start < stop);
    assert!(stop - start > 1, "nested actions (the inner fork/take) should sit between the markers");
}

#[test]
fn sequential_sub_computations_on_the_same_thread_both_succeed() {
    // `spec.md` §4.9 only forbids a sub-computation in flight on the same
    // outer thread, not two run one after the other.
    let comp: Conc<(i32, i32)> = subconcurrency(MVar::new(1).and_then(|m: MVar<i32>| m.take()))
        .and_then(|first| subconcurrency(MVar::new(2).and_then(|m: MVar<i32>| m.take())).map(move |second| (first.unwrap(), second.unwrap())));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), (1, 2));
}
