#![deny(warnings, rust_2018_idioms)]

use std::fmt;

use braid::scheduler::RoundRobin;
use braid::stm::{atomically, catch_stm, or_else, retry, throw_stm, Stm, TVar};
use braid::thread_api::fork;
use braid::Conc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct NotReady;

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not ready")
    }
}
impl std::error::Error for NotReady {}

#[test]
fn write_then_read_round_trips() {
    let comp: Conc<i32> = atomically(|| TVar::new(0i32))
        .and_then(|v| atomically(move || v.write(5)).then(move || atomically(move || v.read())));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 5);
}

#[test]
fn retry_blocks_until_another_thread_writes() {
    // spec scenario 5: thread A retries on v == 0, thread B writes 1.
    let comp: Conc<i32> = atomically(|| TVar::new(0i32)).and_then(|v| {
        fork(atomically(move || v.write(1))).then(move || {
            atomically(move || v.read().and_then(|x| if x == 0 { retry() } else { Stm::pure(x) }))
        })
    });

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 1);
}

#[test]
fn or_else_runs_the_alternative_when_the_first_branch_retries() {
    let comp: Conc<i32> = atomically(move || or_else(retry(), Stm::pure(11)));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 11);
}

#[test]
fn catch_stm_recovers_a_thrown_exception_but_discards_writes_made_before_the_throw() {
    let comp: Conc<i32> = atomically(|| TVar::new(0i32)).and_then(|v| {
        atomically(move || {
            catch_stm(
                v.write(99).then(move || throw_stm::<i32, _>(NotReady)),
                move |_e: NotReady| v.write(1).then(|| Stm::pure(0)),
            )
        })
        .then(move || atomically(move || v.read()))
    });

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert_eq!(result.unwrap(), 1);
}

#[test]
fn uncaught_throw_stm_reifies_as_an_uncaught_exception_in_the_enclosing_thread() {
    let comp: Conc<i32> = atomically(move || throw_stm::<i32, _>(NotReady));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(matches!(result.unwrap_err(), braid::Failure::UncaughtException(_)));
}
