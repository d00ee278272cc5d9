//! Exception surface (`spec.md` §6 "Exceptions", §4.7): `throw`, `catch`,
//! `mask`, `uninterruptibleMask`.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::conc::Conc;
use crate::rt::action::{Action, Cont};
use crate::rt::exception::{Exc, Handler, MaskingState};
use crate::rt::value::Shared;

/// Throws `exc` in the calling thread (`spec.md` §4.7). Unwinds to the
/// nearest handler accepting `E`, or kills the thread — the main thread's
/// uncaught throw ends the run with `Failure::UncaughtException`.
pub fn throw<T, E>(exc: E) -> Conc<T>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    Conc::new(move |_k: Cont| Action::Throw(Exc::new(exc)))
}

/// Runs `body`; if it throws an `E` before completing, runs `handler` with
/// the exception instead. Exceptions of any other type pass through
/// untouched (`spec.md` §4.7: "the first handler whose handled-type
/// matches").
pub fn catch<T, E, F>(body: Conc<T>, handler: F) -> Conc<T>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
    F: FnOnce(E) -> Conc<T> + Send + 'static,
{
    Conc::new(move |k: Cont| {
        // `k` is consumed by exactly one of the two paths below; which one
        // is only known once the interpreter actually steps `body`.
        let k: Arc<Mutex<Option<Cont>>> = Arc::new(Mutex::new(Some(k)));
        let k_handler = k.clone();

        let rt_handler = Handler::new(TypeId::of::<E>(), move |exc: Exc| {
            let e = exc.downcast::<E>().expect("handler stack matched E's TypeId but downcast failed");
            let k = k_handler.lock().unwrap().take().expect("catch continuation already consumed");
            handler(e).into_action(k)
        });

        let body_cont: Cont = Box::new(move |v: Shared| {
            let k = k.lock().unwrap().take().expect("catch continuation already consumed");
            Action::PopCatching(Box::new(move |_popped: Shared| k(v)))
        });
        Action::Catching(rt_handler, Box::new(move |_pushed: Shared| body.into_action(body_cont)))
    })
}

/// Capability handed to a `mask`/`uninterruptibleMask` body to temporarily
/// restore the masking state that was in effect before the mask was
/// entered, running `inner` under it before masking again (`spec.md` §4.7:
/// "runs body with an unmask capability that restores the saved state,
/// then restores"). May be invoked any number of times.
pub struct Unmask {
    outer: MaskingState,
    back_to: MaskingState,
}

impl fmt::Debug for Unmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unmask").field("outer", &self.outer).field("back_to", &self.back_to).finish()
    }
}

impl Unmask {
    /// Runs `inner` under the saved, pre-mask masking state, then restores
    /// the inner mask afterward.
    pub fn call<T, F>(&self, inner: F) -> Conc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Conc<T> + Send + 'static,
    {
        let outer = self.outer;
        let back_to = self.back_to;
        Conc::new(move |k: Cont| {
            Action::SetMasking(
                true,
                outer,
                Box::new(move |_unit: Shared| {
                    inner().into_action(Box::new(move |v: Shared| {
                        Action::ResetMasking(true, back_to, Box::new(move |_unit2: Shared| k(v)))
                    }))
                }),
            )
        })
    }
}

fn with_mask<T, F>(new_state: MaskingState, body: F) -> Conc<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Unmask) -> Conc<T> + Send + 'static,
{
    Conc::new(move |k: Cont| {
        let query: Cont = Box::new(move |outer_shared: Shared| {
            let outer = outer_shared.downcast_clone::<MaskingState>();
            Action::SetMasking(
                false,
                new_state,
                Box::new(move |_unit: Shared| {
                    let unmask = Unmask { outer, back_to: new_state };
                    body(unmask).into_action(Box::new(move |v: Shared| {
                        Action::ResetMasking(false, outer, Box::new(move |_unit2: Shared| k(v)))
                    }))
                }),
            )
        });
        Action::GetMasking(query)
    })
}

/// Runs `body` with masking set to `MaskedInterruptible`, restoring the
/// prior masking state afterwards.
pub fn mask<T, F>(body: F) -> Conc<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Unmask) -> Conc<T> + Send + 'static,
{
    with_mask(MaskingState::MaskedInterruptible, body)
}

/// Like [`mask`], but sets `MaskedUninterruptible`: no asynchronous
/// exception can be delivered to this thread even while it's blocked.
pub fn uninterruptible_mask<T, F>(body: F) -> Conc<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Unmask) -> Conc<T> + Send + 'static,
{
    with_mask(MaskingState::MaskedUninterruptible, body)
}
