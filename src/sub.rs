//! Nested sub-computation (`spec.md` §4.9/§6 "Sub-computation:
//! subconcurrency"): runs a computation to completion in its own nested
//! interpreter, reifying its outcome as a value instead of ending the run.

use std::sync::{Arc, Mutex};

use crate::conc::Conc;
use crate::rt::action::{Action, Cont, ResultCell};
use crate::rt::failure::Failure;
use crate::rt::value::Shared;

/// Runs `comp` to completion in a fresh nested thread table sharing the
/// outer id source, cells, and memory-model state (`spec.md` §4.9). The
/// nested run's outcome is returned as a value rather than ending the
/// overall run; the whole nested execution appears as one
/// `StartSubconcurrency`/`StopSubconcurrency` pair in the outer trace.
///
/// May not be called again on the same thread before this one returns.
pub fn subconcurrency<T>(comp: Conc<T>) -> Conc<Result<T, Failure>>
where
    T: Clone + Send + Sync + 'static,
{
    Conc::new(move |k: Cont| {
        let cell: ResultCell = Arc::new(Mutex::new(None));
        let write_cell = cell.clone();
        let body_k: Cont = Box::new(move |v: Shared| {
            *write_cell.lock().unwrap() = Some(v);
            Action::Stop
        });
        let body = Box::new(comp.into_action(body_k));

        let wrap: Cont = Box::new(move |reified: Shared| {
            let result = reified.downcast_clone::<Result<Shared, Failure>>();
            k(Shared::new(result.map(|v| v.downcast_clone::<T>())))
        });
        Action::Subconcurrency(body, cell, wrap)
    })
}
