//! Mutable cell & memory model (component C5, `spec.md` §4.5).
//!
//! Each `MRef` holds a committed value plus, under TSO/PSO, a per-thread
//! FIFO of writes that have not yet committed. `read` always returns a
//! thread's own most recent pending write if it has one, otherwise the
//! committed value, matching `spec.md` §3's "view" definition.

use std::collections::{HashMap, VecDeque};

use crate::rt::id::{MRefId, ThreadId};
use crate::rt::memory_model::MemoryModel;
use crate::rt::value::Shared;

struct PendingWrite {
    ordinal: u64,
    value: Shared,
}

struct MRef {
    committed: Shared,
    write_counter: u64,
    next_ordinal: u64,
    pending: HashMap<ThreadId, VecDeque<PendingWrite>>,
}

impl MRef {
    fn new(initial: Shared) -> MRef {
        MRef {
            committed: initial,
            write_counter: 0,
            next_ordinal: 0,
            pending: HashMap::new(),
        }
    }

    fn view(&self, tid: ThreadId) -> Shared {
        match self.pending.get(&tid).and_then(|q| q.back()) {
            Some(w) => w.value.clone(),
            None => self.committed.clone(),
        }
    }

    fn has_pending(&self, tid: ThreadId) -> bool {
        self.pending.get(&tid).is_some_and(|q| !q.is_empty())
    }

    /// Commits the oldest pending write for `tid` on this ref, if any.
    /// Returns `true` if a write was committed.
    fn commit_one(&mut self, tid: ThreadId) -> bool {
        if let Some(q) = self.pending.get_mut(&tid) {
            if let Some(w) = q.pop_front() {
                self.committed = w.value;
                self.write_counter += 1;
                return true;
            }
        }
        false
    }

    fn flush(&mut self, tid: ThreadId) {
        while self.commit_one(tid) {}
    }
}

/// Snapshot of an `MRef`'s value plus its write counter, used to validate
/// a compare-and-swap (`spec.md` glossary "Ticket").
#[derive(Debug, Clone)]
pub(crate) struct Ticket {
    pub(crate) mref: MRefId,
    pub(crate) value: Shared,
    counter: u64,
}

/// All mutable cells live for a single run, keyed by id.
#[derive(Default)]
pub(crate) struct Store {
    model: Option<MemoryModel>,
    refs: HashMap<MRefId, MRef>,
    /// TSO only: the global, cross-ref, per-thread order writes were
    /// issued in. A ref's head commit is eligible exactly when its id is
    /// at the front of its thread's entry here (`spec.md` §4.5).
    global_order: HashMap<ThreadId, VecDeque<MRefId>>,
}

impl Store {
    pub(crate) fn new(model: MemoryModel) -> Store {
        Store {
            model: Some(model),
            refs: HashMap::new(),
            global_order: HashMap::new(),
        }
    }

    fn model(&self) -> MemoryModel {
        self.model.expect("memory model not configured")
    }

    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, id: MRefId, initial: T) {
        self.insert_shared(id, Shared::new(initial));
    }

    /// Like [`insert`](Self::insert), for callers that already hold a
    /// type-erased value (the interpreter, stepping `Action::NewMR`).
    pub(crate) fn insert_shared(&mut self, id: MRefId, initial: Shared) {
        self.refs.insert(id, MRef::new(initial));
    }

    pub(crate) fn read(&self, id: MRefId, tid: ThreadId) -> Shared {
        self.refs[&id].view(tid)
    }

    pub(crate) fn write(&mut self, id: MRefId, tid: ThreadId, value: Shared) {
        let model = self.model();
        let mref = self.refs.get_mut(&id).expect("unknown MRef");

        if model.commits_immediately() {
            mref.committed = value;
            mref.write_counter += 1;
            return;
        }

        let ordinal = mref.next_ordinal;
        mref.next_ordinal += 1;
        mref.pending.entry(tid).or_default().push_back(PendingWrite { ordinal, value });

        if model == MemoryModel::TotalStoreOrder {
            self.global_order.entry(tid).or_default().push_back(id);
        }
    }

    /// `spec.md` §4.5: "imposes a full barrier — flush `tid`'s pending
    /// writes first" for `modify`/`cas`.
    pub(crate) fn modify(&mut self, id: MRefId, tid: ThreadId, f: impl FnOnce(Shared) -> Shared) {
        self.full_barrier_flush(tid);
        let mref = self.refs.get_mut(&id).expect("unknown MRef");
        let new = f(mref.committed.clone());
        mref.committed = new;
        mref.write_counter += 1;
    }

    pub(crate) fn read_for_cas(&self, id: MRefId, tid: ThreadId) -> Ticket {
        let mref = &self.refs[&id];
        Ticket {
            mref: id,
            value: mref.view(tid),
            counter: mref.write_counter,
        }
    }

    pub(crate) fn peek_ticket(ticket: &Ticket) -> Shared {
        ticket.value.clone()
    }

    /// Returns `(success, new_ticket)`. On success the cell commits `v`
    /// under a full barrier; on failure a fresh ticket reflecting the
    /// current state is returned so the caller can retry.
    pub(crate) fn cas(&mut self, tid: ThreadId, ticket: &Ticket, v: Shared) -> (bool, Ticket) {
        let id = ticket.mref;
        self.full_barrier_flush(tid);
        let mref = self.refs.get_mut(&id).expect("unknown MRef");

        if ticket.counter == mref.write_counter {
            mref.committed = v;
            mref.write_counter += 1;
            (
                true,
                Ticket {
                    mref: id,
                    value: mref.committed.clone(),
                    counter: mref.write_counter,
                },
            )
        } else {
            (
                false,
                Ticket {
                    mref: id,
                    value: mref.view(tid),
                    counter: mref.write_counter,
                },
            )
        }
    }

    /// `spec.md` §4.5's "flush `tid`'s pending writes first": every ref
    /// `tid` has a write queued against, not just the one being
    /// modified/CAS'd — a full barrier is per-thread, not per-ref.
    fn full_barrier_flush(&mut self, tid: ThreadId) {
        for mref in self.refs.values_mut() {
            mref.flush(tid);
        }
        self.global_order.remove(&tid);
    }

    /// Every `(thread, ref)` pair with at least one pending write offers a
    /// commit pseudo-thread, gated by the TSO global ordering rule.
    pub(crate) fn runnable_commits(&self) -> Vec<(ThreadId, MRefId)> {
        let mut out = Vec::new();
        for (&id, mref) in &self.refs {
            for (&tid, q) in &mref.pending {
                if q.is_empty() {
                    continue;
                }
                if self.model() == MemoryModel::TotalStoreOrder {
                    let eligible = self
                        .global_order
                        .get(&tid)
                        .and_then(|order| order.front())
                        .map(|front| *front == id)
                        .unwrap_or(false);
                    if !eligible {
                        continue;
                    }
                }
                out.push((tid, id));
            }
        }
        out
    }

    /// Commits the given `(thread, ref)` pending write (a `CommitMR`
    /// pseudo-thread step, `spec.md` §4.2).
    pub(crate) fn commit(&mut self, tid: ThreadId, id: MRefId) {
        let committed = self
            .refs
            .get_mut(&id)
            .expect("unknown MRef")
            .commit_one(tid);
        assert!(committed, "CommitMR stepped with nothing pending");

        if self.model() == MemoryModel::TotalStoreOrder {
            if let Some(order) = self.global_order.get_mut(&tid) {
                if order.front() == Some(&id) {
                    order.pop_front();
                }
            }
        }
    }
}
