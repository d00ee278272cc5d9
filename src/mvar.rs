//! Blocking cell surface (`spec.md` §6 "Blocking cell", §4.4): `newMVar`,
//! `putMVar`, `takeMVar`, `readMVar`, and the non-blocking `try*` variants.

use std::fmt;
use std::marker::PhantomData;

use crate::conc::Conc;
use crate::rt::action::{Action, Cont};
use crate::rt::value::Shared;
use crate::MVarId;

/// A handle to a single-slot blocking cell holding a `T`. Cheap to `Clone`
/// (it is just an id); the cell itself lives in the interpreter's store.
pub struct MVar<T> {
    id: MVarId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for MVar<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for MVar<T> {}

impl<T> fmt::Debug for MVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MVar").field(&self.id).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> MVar<T> {
    /// Creates an empty cell.
    pub fn new_empty() -> Conc<MVar<T>> {
        Self::build(None)
    }

    /// Creates a cell already holding `value`.
    pub fn new(value: T) -> Conc<MVar<T>> {
        Self::build(Some(Shared::new(value)))
    }

    fn build(initial: Option<Shared>) -> Conc<MVar<T>> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| {
                let id = v.downcast_clone::<MVarId>();
                k(Shared::new(MVar { id, _marker: PhantomData }))
            });
            Action::NewMV(initial, wrap)
        })
    }

    /// Blocks until the cell is empty, then fills it.
    pub fn put(self, value: T) -> Conc<()> {
        Conc::new(move |k: Cont| Action::PutMV(self.id, Shared::new(value), k))
    }

    /// Blocks until the cell is full, then empties it and returns the
    /// value.
    pub fn take(self) -> Conc<T> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| k(Shared::new(v.downcast_clone::<T>())));
            Action::TakeMV(self.id, wrap)
        })
    }

    /// Blocks until the cell is full, then returns the value without
    /// emptying it.
    pub fn read(self) -> Conc<T> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| k(Shared::new(v.downcast_clone::<T>())));
            Action::ReadMV(self.id, wrap)
        })
    }

    /// Non-blocking `put`: returns whether the cell accepted the value.
    pub fn try_put(self, value: T) -> Conc<bool> {
        Conc::new(move |k: Cont| Action::TryPutMV(self.id, Shared::new(value), k))
    }

    /// Non-blocking `take`: returns `None` without blocking if the cell
    /// was empty.
    pub fn try_take(self) -> Conc<Option<T>> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| {
                let opt = v.downcast_clone::<Option<Shared>>();
                k(Shared::new(opt.map(|inner| inner.downcast_clone::<T>())))
            });
            Action::TryTakeMV(self.id, wrap)
        })
    }

    /// Non-blocking `read`: returns `None` without blocking if the cell
    /// was empty.
    pub fn try_read(self) -> Conc<Option<T>> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| {
                let opt = v.downcast_clone::<Option<Shared>>();
                k(Shared::new(opt.map(|inner| inner.downcast_clone::<T>())))
            });
            Action::TryReadMV(self.id, wrap)
        })
    }
}
