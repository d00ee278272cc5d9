//! The public `Conc<T>` builder (component C2's public face, `spec.md` §4.2).
//!
//! A concurrent computation is built up functionally as a function from "what
//! to do with my result" to an action tree: `Conc<T>` doesn't build the tree
//! eagerly, it waits for its caller to supply the continuation. Every
//! combinator in `thread_api`/`mvar`/`mref`/`stm`/`exception`/`lift`/`sub`
//! constructs a `Conc<T>` this way; `and_then` composes two such functions by
//! feeding one's result into the start of the other — this is the
//! defunctionalised CPS tree `spec.md` §9 calls for.

use std::fmt;
use std::marker::PhantomData;

use crate::rt::action::{Action, Cont};
use crate::rt::value::Shared;

/// A concurrent computation that, once driven, produces a `T`.
pub struct Conc<T> {
    pub(crate) build: Box<dyn FnOnce(Cont) -> Action + Send>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Conc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conc").finish_non_exhaustive()
    }
}

impl<T> Conc<T> {
    pub(crate) fn new<F>(build: F) -> Conc<T>
    where
        F: FnOnce(Cont) -> Action + Send + 'static,
    {
        Conc { build: Box::new(build), _marker: PhantomData }
    }

    pub(crate) fn into_action(self, k: Cont) -> Action {
        (self.build)(k)
    }
}

impl<T: Clone + Send + Sync + 'static> Conc<T> {
    /// Lifts a plain value into the computation without taking a scheduler
    /// step (`spec.md` §3 `Return`).
    pub fn pure(value: T) -> Conc<T> {
        Conc::new(move |k: Cont| Action::Return(Shared::new(value), k))
    }

    /// Sequences `self` then `f`, threading `self`'s result through.
    pub fn and_then<U, F>(self, f: F) -> Conc<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(T) -> Conc<U> + Send + 'static,
    {
        Conc::new(move |k: Cont| {
            let cont: Cont = Box::new(move |v: Shared| {
                let t = v.downcast_clone::<T>();
                f(t).into_action(k)
            });
            self.into_action(cont)
        })
    }

    /// Runs `self` then `next`, discarding `self`'s result.
    pub fn then<U, F>(self, next: F) -> Conc<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce() -> Conc<U> + Send + 'static,
    {
        self.and_then(move |_| next())
    }

    /// Transforms the result without introducing a scheduler step.
    pub fn map<U, F>(self, f: F) -> Conc<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |t| Conc::pure(f(t)))
    }
}
