#![deny(warnings, rust_2018_idioms)]

use std::fmt;

use braid::exception::{catch, mask, throw, uninterruptible_mask};
use braid::scheduler::RoundRobin;
use braid::thread_api::{fork, my_thread_id, throw_to, yield_now};
use braid::{Conc, Failure};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Overflow;

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overflow")
    }
}
impl std::error::Error for Overflow {}

#[test]
fn uncaught_throw_to_self_kills_the_main_thread() {
    // spec scenario 6: myThreadId >>= \t -> throwTo t Overflow, no handler.
    let comp: Conc<()> = my_thread_id().and_then(|t| throw_to(t, Overflow));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(matches!(result.unwrap_err(), Failure::UncaughtException(_)));
}

#[test]
fn catch_around_throw_to_self_recovers() {
    let comp: Conc<bool> = catch(
        my_thread_id().and_then(|t| throw_to(t, Overflow)).then(|| Conc::pure(false)),
        |_e: Overflow| Conc::pure(true),
    );

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(result.unwrap());
}

#[test]
fn catch_only_intercepts_the_type_it_handles() {
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Other;
    impl fmt::Display for Other {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "other")
        }
    }
    impl std::error::Error for Other {}

    let comp: Conc<i32> = catch(throw::<i32, Overflow>(Overflow), |_e: Other| Conc::pure(1));

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(matches!(result.unwrap_err(), Failure::UncaughtException(_)));
}

#[test]
fn uninterruptible_mask_delays_throw_to_delivery_until_unmasked() {
    // While masked uninterruptible the sender's `throwTo` cannot be
    // delivered even though it blocks trying; delivery only happens once
    // `unmask.call` temporarily restores the outer (unmasked) state.
    let comp: Conc<bool> = my_thread_id().and_then(|target| {
        catch(
            uninterruptible_mask(move |unmask| {
                fork(throw_to(target, Overflow)).then(move || unmask.call(|| Conc::pure(())))
            })
            .then(|| Conc::pure(false)),
            |_e: Overflow| Conc::pure(true),
        )
    });

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(result.unwrap(), "exception should be delivered during the unmask window, not before");
}

#[test]
fn mask_keeps_exceptions_deliverable_while_blocked() {
    use braid::mvar::MVar;

    // `MaskedInterruptible` still allows delivery once the masked thread
    // is blocked (spec.md glossary "Masking state"): the forked sender
    // yields once first so its `throwTo` lands only after the main thread
    // has already blocked on the empty cell.
    let comp: Conc<bool> = catch(
        MVar::new_empty()
            .and_then(|m: MVar<i32>| {
                my_thread_id().and_then(move |target| {
                    mask(move |_unmask| fork(yield_now().then(move || throw_to(target, Overflow))).then(move || m.take()))
                })
            })
            .then(|| Conc::pure(false)),
        |_e: Overflow| Conc::pure(true),
    );

    let (result, _, _trace) = braid::run(comp, &RoundRobin, ());
    assert!(result.unwrap());
}
