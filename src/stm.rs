//! Software transactional memory surface (`spec.md` §6 "STM", §4.6):
//! `atomically`, `newTVar`, `readTVar`, `writeTVar`, `retry`, `orElse`,
//! `throwSTM`, `catchSTM`.
//!
//! A transaction body is built the same way `Conc<T>` is — a function from
//! "what to run next" to an action tree — but over the restricted
//! [`StmAction`] algebra, and as a repeatable `Fn` rather than a one-shot
//! `FnOnce`: `spec.md` §4.6 retries a transaction "in full", so the whole
//! tree must be rebuildable from scratch on every attempt.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::conc::Conc;
use crate::rt::action::{Action, Cont};
use crate::rt::exception::Exc;
use crate::rt::stm::{StmAction, StmCont};
use crate::rt::value::Shared;
use crate::TVarId;

type StmBuild = dyn Fn(StmCont) -> StmAction + Send + Sync;

/// A transactional computation that, once run inside [`atomically`],
/// produces a `T`. Cloning is cheap (an `Arc`).
pub struct Stm<T> {
    build: Arc<StmBuild>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Stm<T> {
    fn clone(&self) -> Self {
        Stm { build: self.build.clone(), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for Stm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stm").finish_non_exhaustive()
    }
}

impl<T> Stm<T> {
    fn new<F>(build: F) -> Stm<T>
    where
        F: Fn(StmCont) -> StmAction + Send + Sync + 'static,
    {
        Stm { build: Arc::new(build), _marker: PhantomData }
    }

    fn into_action(&self, k: StmCont) -> StmAction {
        (self.build)(k)
    }
}

impl<T: Clone + Send + Sync + 'static> Stm<T> {
    /// Lifts a plain value into the transaction without a log operation.
    pub fn pure(value: T) -> Stm<T> {
        Stm::new(move |k: StmCont| k(Shared::new(value.clone())))
    }

    /// Sequences `self` then `f`, threading `self`'s result through. `f`
    /// must be replayable (`Fn`, not `FnOnce`): a retry rebuilds this whole
    /// chain from scratch.
    pub fn and_then<U, F>(self, f: F) -> Stm<U>
    where
        U: Send + Sync + 'static,
        F: Fn(T) -> Stm<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Stm::new(move |k: StmCont| {
            let f = f.clone();
            let cont: StmCont = Box::new(move |v: Shared| {
                let t = v.downcast_clone::<T>();
                f(t).into_action(k)
            });
            self.into_action(cont)
        })
    }

    /// Runs `self` then `next`, discarding `self`'s result.
    pub fn then<U, F>(self, next: F) -> Stm<U>
    where
        U: Send + Sync + 'static,
        F: Fn() -> Stm<U> + Send + Sync + 'static,
    {
        self.and_then(move |_| next())
    }

    /// Transforms the result without a log operation.
    pub fn map<U, F>(self, f: F) -> Stm<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.and_then(move |t| Stm::pure(f(t)))
    }
}

/// A handle to a transactional variable holding a `T`. Cheap to `Clone`
/// (it is just an id).
pub struct TVar<T> {
    id: TVarId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for TVar<T> {}

impl<T> fmt::Debug for TVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TVar").field(&self.id).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> TVar<T> {
    /// Creates a new transactional variable holding `value`. Only
    /// meaningful inside [`atomically`] — `spec.md` lists `newTVar` as an
    /// STM-only operation.
    pub fn new(value: T) -> Stm<TVar<T>> {
        Stm::new(move |k: StmCont| {
            let v = value.clone();
            StmAction::TNew(
                Shared::new(v),
                Box::new(move |id: TVarId| k(Shared::new(TVar { id, _marker: PhantomData }))),
            )
        })
    }

    /// Reads the variable, recording it in the transaction's read-set.
    pub fn read(self) -> Stm<T> {
        Stm::new(move |k: StmCont| {
            StmAction::TRead(self.id, Box::new(move |v: Shared| k(Shared::new(v.downcast_clone::<T>()))))
        })
    }

    /// Writes the variable in the transaction's local log; visible to
    /// other `TVar` reads in the same transaction, not committed until the
    /// whole transaction succeeds.
    pub fn write(self, value: T) -> Stm<()> {
        Stm::new(move |k: StmCont| {
            let v = value.clone();
            StmAction::TWrite(self.id, Shared::new(v), Box::new(move || k(Shared::unit())))
        })
    }
}

/// Aborts the current transaction and blocks the thread until some `TVar`
/// in its read-set changes, at which point the whole transaction is
/// retried from scratch (`spec.md` §4.6).
pub fn retry<T: Send + Sync + 'static>() -> Stm<T> {
    Stm::new(|_k: StmCont| StmAction::TRetry)
}

/// Runs `a`; if it retries, discards its writes and runs `b` with the
/// accumulated read-set (`spec.md` §4.6). If `a` succeeds or throws, `b`
/// never runs.
pub fn or_else<T>(a: Stm<T>, b: Stm<T>) -> Stm<T>
where
    T: Send + Sync + 'static,
{
    Stm::new(move |k: StmCont| {
        let k: Arc<Mutex<Option<StmCont>>> = Arc::new(Mutex::new(Some(k)));
        let k_a = k.clone();
        let k_b = k;
        let cont_a: StmCont = Box::new(move |v: Shared| {
            (k_a.lock().unwrap().take().expect("orElse continuation already consumed"))(v)
        });
        let cont_b: StmCont = Box::new(move |v: Shared| {
            (k_b.lock().unwrap().take().expect("orElse continuation already consumed"))(v)
        });
        StmAction::TOrElse(Box::new(a.into_action(cont_a)), Box::new(b.into_action(cont_b)))
    })
}

/// Aborts the transaction with `exc`, discarding its writes
/// (`spec.md` §4.6, §4.7 "reifies its exception into the outer thread").
pub fn throw_stm<T, E>(exc: E) -> Stm<T>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    Stm::new(move |_k: StmCont| StmAction::TThrow(Exc::new(exc.clone())))
}

/// Runs `body`; if it throws an `E`, discards its writes (keeping its
/// reads) and runs `handler` with the exception instead. An exception of
/// another type propagates past `catch_stm` unchanged.
pub fn catch_stm<T, E, F>(body: Stm<T>, handler: F) -> Stm<T>
where
    T: Send + Sync + 'static,
    E: std::error::Error + Clone + Send + Sync + 'static,
    F: Fn(E) -> Stm<T> + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    Stm::new(move |k: StmCont| {
        let k: Arc<Mutex<Option<StmCont>>> = Arc::new(Mutex::new(Some(k)));
        let k_body = k.clone();
        let k_handler = k;
        let handler = handler.clone();

        let body_cont: StmCont = Box::new(move |v: Shared| {
            (k_body.lock().unwrap().take().expect("catchSTM continuation already consumed"))(v)
        });
        let on_throw: Box<dyn FnOnce(Exc) -> StmAction + Send> = Box::new(move |exc: Exc| match exc.downcast::<E>() {
            Some(e) => {
                let k = k_handler.lock().unwrap().take().expect("catchSTM continuation already consumed");
                handler(e).into_action(k)
            }
            None => StmAction::TThrow(exc),
        });
        StmAction::TCatch(Box::new(body.into_action(body_cont)), on_throw)
    })
}

/// Runs `body` as a single atomic transaction (`spec.md` §4.6). On
/// success, commits its writes and returns its value; on retry, blocks
/// the thread until some `TVar` it read changes and reruns `body` from
/// scratch; on an uncaught `throwSTM`, the exception reifies into the
/// calling thread as if `throw` had been called.
pub fn atomically<T, F>(body: F) -> Conc<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Stm<T> + Send + Sync + 'static,
{
    Conc::new(move |k: Cont| {
        let factory: Box<dyn Fn() -> StmAction + Send> = Box::new(move || {
            let root_k: StmCont = Box::new(|v: Shared| StmAction::TStop(v));
            body().into_action(root_k)
        });
        Action::AtomicallySTM(factory, k)
    })
}
