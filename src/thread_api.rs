//! Thread control surface (`spec.md` §6 "Thread control"): `fork`,
//! `myThreadId`, `yield`, `getNumCapabilities`, `setNumCapabilities`,
//! `throwTo`.

use crate::conc::Conc;
use crate::rt::action::{Action, Cont};
use crate::rt::exception::Exc;
use crate::rt::value::Shared;
use crate::ThreadId;

/// Starts `body` as a new thread running concurrently with the caller.
/// The child's own return value is discarded, matching `spec.md` §3's
/// `Fork(child, parent)` node (no implicit join).
pub fn fork<T>(body: Conc<T>) -> Conc<ThreadId>
where
    T: Send + Sync + 'static,
{
    Conc::new(move |k: Cont| {
        let child_k: Cont = Box::new(|_: Shared| Action::Stop);
        let child = Box::new(body.into_action(child_k));
        Action::Fork { child, k }
    })
}

/// The id of the calling thread.
pub fn my_thread_id() -> Conc<ThreadId> {
    Conc::new(|k: Cont| Action::MyThreadId(k))
}

/// How many capabilities (`spec.md` glossary: simulated scheduler
/// capacity) are currently configured.
pub fn get_num_capabilities() -> Conc<usize> {
    Conc::new(|k: Cont| Action::GetCaps(k))
}

/// Sets the simulated scheduler capacity.
pub fn set_num_capabilities(n: usize) -> Conc<()> {
    Conc::new(move |k: Cont| Action::SetCaps(n, k))
}

/// Suspends the calling thread for exactly one scheduler decision, without
/// blocking on anything (`spec.md` §4.8 preemption counting treats this as
/// an explicit, non-preempting switch point).
pub fn yield_now() -> Conc<()> {
    Conc::new(|k: Cont| Action::Yield(k))
}

/// Asynchronously delivers `exc` to `target` (`spec.md` §4.7). Blocks the
/// caller until `target` becomes interruptible. Throwing to one's own
/// thread id is permitted.
pub fn throw_to<E>(target: ThreadId, exc: E) -> Conc<()>
where
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    Conc::new(move |k: Cont| Action::ThrowTo(target, Exc::new(exc), k))
}
