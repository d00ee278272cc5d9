//! Escape hatch into ordinary Rust (`spec.md` §3 action list: `Lift`).

use crate::conc::Conc;
use crate::rt::action::{Action, Cont};
use crate::rt::value::Shared;

/// Runs `effect` as a single, opaque scheduler step and returns its result.
/// `effect` is not itself interpreted — no forking, blocking, or exception
/// handling inside it is visible to the scheduler; use the other builders
/// for anything that needs to be.
pub fn lift<T, F>(effect: F) -> Conc<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Conc::new(move |k: Cont| Action::Lift(Box::new(move || Shared::new(effect())), k))
}
