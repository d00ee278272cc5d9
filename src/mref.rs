//! Mutable cell surface (`spec.md` §6 "Mutable cell", §4.5): `newMRef`,
//! `readMRef`, `writeMRef`, `modifyMRef`, `atomicModifyMRef`, `readForCas`,
//! `casMRef`, `peekTicket`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::conc::Conc;
use crate::rt::action::{Action, Cont};
use crate::rt::mref::Ticket as RtTicket;
use crate::rt::value::Shared;
use crate::MRefId;

/// A handle to a mutable cell holding a `T`. Cheap to `Clone` (it is just
/// an id); the cell itself lives in the interpreter's store.
pub struct MRef<T> {
    id: MRefId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for MRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for MRef<T> {}

impl<T> fmt::Debug for MRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MRef").field(&self.id).finish()
    }
}

/// A snapshot of an `MRef`'s value taken by [`MRef::read_for_cas`], used to
/// validate a later [`MRef::cas`] (`spec.md` glossary "Ticket").
pub struct Ticket<T> {
    inner: RtTicket,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Ticket<T> {
    fn clone(&self) -> Self {
        Ticket { inner: self.inner.clone(), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for Ticket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ticket").field(&self.inner).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Ticket<T> {
    /// Reads the value a ticket snapshotted, without consulting the
    /// interpreter (`spec.md` §4.5 "peekTicket is pure").
    pub fn peek(&self) -> T {
        RtTicket::peek_ticket(&self.inner).downcast_clone::<T>()
    }
}

impl<T: Clone + Send + Sync + 'static> MRef<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Conc<MRef<T>> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| {
                let id = v.downcast_clone::<MRefId>();
                k(Shared::new(MRef { id, _marker: PhantomData }))
            });
            Action::NewMR(Shared::new(value), wrap)
        })
    }

    /// Reads the cell's current value as seen by the calling thread
    /// (under TSO/PSO this may be a pending write the thread has not yet
    /// committed, `spec.md` §4.5).
    pub fn read(self) -> Conc<T> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| k(Shared::new(v.downcast_clone::<T>())));
            Action::ReadMR(self.id, wrap)
        })
    }

    /// Writes `value` to the cell. Under a relaxed memory model this
    /// queues the write rather than committing it immediately.
    pub fn write(self, value: T) -> Conc<()> {
        Conc::new(move |k: Cont| Action::WriteMR(self.id, Shared::new(value), k))
    }

    /// Applies `f` to the committed value under a full barrier, discarding
    /// any of the caller's own pending writes first (`spec.md` §4.5).
    pub fn modify<F>(self, f: F) -> Conc<()>
    where
        F: FnOnce(T) -> T + Send + 'static,
    {
        Conc::new(move |k: Cont| {
            let modify_fn: Box<dyn FnOnce(Shared) -> Shared + Send> =
                Box::new(move |v: Shared| Shared::new(f(v.downcast_clone::<T>())));
            Action::ModifyMR(self.id, modify_fn, k)
        })
    }

    /// Like [`modify`](Self::modify), but `f` also computes an auxiliary
    /// result `R` returned to the caller alongside storing the new value —
    /// the concurrent analogue of `atomicModifyIORef`.
    pub fn atomic_modify<R, F>(self, f: F) -> Conc<R>
    where
        R: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> (T, R) + Send + 'static,
    {
        let side: Arc<Mutex<Option<R>>> = Arc::new(Mutex::new(None));
        let side_write = side.clone();
        Conc::new(move |k: Cont| {
            let modify_fn: Box<dyn FnOnce(Shared) -> Shared + Send> = Box::new(move |v: Shared| {
                let (new, ret) = f(v.downcast_clone::<T>());
                *side_write.lock().unwrap() = Some(ret);
                Shared::new(new)
            });
            let wrap: Cont = Box::new(move |_unit: Shared| {
                let ret = side
                    .lock()
                    .unwrap()
                    .take()
                    .expect("atomicModifyMRef: update function did not run");
                k(Shared::new(ret))
            });
            Action::ModifyMR(self.id, modify_fn, wrap)
        })
    }

    /// Snapshots the cell for a later compare-and-swap.
    pub fn read_for_cas(self) -> Conc<Ticket<T>> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| {
                let inner = v.downcast_clone::<RtTicket>();
                k(Shared::new(Ticket { inner, _marker: PhantomData }))
            });
            Action::ReadForCas(self.id, wrap)
        })
    }

    /// Compares `ticket` against the cell's current write count; on match
    /// commits `value` under a full barrier and returns `true` plus a
    /// fresh ticket, otherwise returns `false` plus a ticket reflecting
    /// the current state so the caller can retry.
    pub fn cas(self, ticket: Ticket<T>, value: T) -> Conc<(bool, Ticket<T>)> {
        Conc::new(move |k: Cont| {
            let wrap: Cont = Box::new(move |v: Shared| {
                let (ok, new_inner) = v.downcast_clone::<(bool, RtTicket)>();
                k(Shared::new((ok, Ticket { inner: new_inner, _marker: PhantomData })))
            });
            Action::CasMR(self.id, ticket.inner, Shared::new(value), wrap)
        })
    }
}
