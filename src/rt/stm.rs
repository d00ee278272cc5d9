//! STM kernel (component C6, `spec.md` §4.6).
//!
//! A transaction is evaluated against a local log (reads and writes) before
//! ever touching the committed `TVar` store. `run_transaction` returns one
//! of `Success`/`Retry`/`Aborted`, mirroring the three outcomes of
//! `spec.md` §4.6 exactly; the scheduler loop (C8) is responsible for
//! committing writes, delivering exceptions, or blocking the thread.

use std::collections::{HashMap, HashSet};

use crate::rt::exception::Exc;
use crate::rt::id::{self, ThreadId, TVarId};
use crate::rt::value::Shared;

pub(crate) type StmCont = Box<dyn FnOnce(Shared) -> StmAction + Send>;

/// The restricted action algebra a transaction body is built from
/// (`spec.md` §4.6).
pub(crate) enum StmAction {
    TRead(TVarId, StmCont),
    TWrite(TVarId, Shared, Box<dyn FnOnce() -> StmAction + Send>),
    TNew(Shared, Box<dyn FnOnce(TVarId) -> StmAction + Send>),
    TRetry,
    TOrElse(Box<StmAction>, Box<StmAction>),
    TCatch(Box<StmAction>, Box<dyn FnOnce(Exc) -> StmAction + Send>),
    TThrow(Exc),
    /// Successful completion of the transaction with a final value.
    TStop(Shared),
}

/// Durable storage for committed `TVar` values, plus the reverse index of
/// which threads are blocked on which vars (`spec.md` §3 "TVar").
#[derive(Default)]
pub(crate) struct TVarStore {
    values: HashMap<TVarId, Shared>,
    blocked: HashMap<TVarId, HashSet<ThreadId>>,
}

impl TVarStore {
    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, id: TVarId, initial: T) {
        self.values.insert(id, Shared::new(initial));
    }

    pub(crate) fn get(&self, id: TVarId) -> Shared {
        self.values[&id].clone()
    }

    fn commit(&mut self, writes: HashMap<TVarId, Shared>) -> HashSet<TVarId> {
        let changed: HashSet<TVarId> = writes.keys().copied().collect();
        self.values.extend(writes);
        changed
    }

    /// Records that `tid` is now blocked retrying, having read `reads`.
    pub(crate) fn block(&mut self, tid: ThreadId, reads: &HashSet<TVarId>) {
        for &id in reads {
            self.blocked.entry(id).or_default().insert(tid);
        }
    }

    pub(crate) fn unblock_all(&mut self, tid: ThreadId) {
        for set in self.blocked.values_mut() {
            set.remove(&tid);
        }
    }
}

/// Outcome of evaluating a transaction body to completion.
pub(crate) enum Outcome {
    Success {
        value: Shared,
        writes: HashMap<TVarId, Shared>,
        reads: HashSet<TVarId>,
    },
    Retry {
        reads: HashSet<TVarId>,
    },
    Aborted {
        exc: Exc,
    },
}

struct Log<'a> {
    vars: &'a TVarStore,
    ids: &'a mut id::Source,
    writes: HashMap<TVarId, Shared>,
    reads: HashSet<TVarId>,
}

impl Log<'_> {
    fn read(&mut self, id: TVarId) -> Shared {
        self.reads.insert(id);
        self.writes
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.vars.get(id))
    }

    fn snapshot(&self) -> (HashMap<TVarId, Shared>, HashSet<TVarId>) {
        (self.writes.clone(), self.reads.clone())
    }

    fn restore(&mut self, snap: (HashMap<TVarId, Shared>, HashSet<TVarId>)) {
        self.writes = snap.0;
        self.reads = snap.1;
    }
}

/// Evaluate `root` to completion. `ids` allocates any `TVar`s created with
/// `TNew` mid-transaction; `vars` is the pre-transaction committed store,
/// never mutated here (commits happen only on `Success`, via
/// [`TVarStore::commit`] called by the scheduler loop).
pub(crate) fn run_transaction(root: StmAction, vars: &TVarStore, ids: &mut id::Source) -> Outcome {
    let mut log = Log {
        vars,
        ids,
        writes: HashMap::new(),
        reads: HashSet::new(),
    };
    eval(root, &mut log)
}

fn eval(action: StmAction, log: &mut Log) -> Outcome {
    match action {
        StmAction::TRead(id, k) => {
            let v = log.read(id);
            eval(k(v), log)
        }
        StmAction::TWrite(id, v, k) => {
            log.writes.insert(id, v);
            eval(k(), log)
        }
        StmAction::TNew(initial, k) => {
            let id = log.ids.next_tvar(None);
            log.writes.insert(id, initial);
            eval(k(id), log)
        }
        StmAction::TRetry => Outcome::Retry { reads: log.reads.clone() },
        StmAction::TOrElse(a, b) => {
            let before = log.snapshot();
            match eval(*a, log) {
                Outcome::Retry { reads: a_reads } => {
                    log.restore(before);
                    log.reads.extend(a_reads);
                    eval(*b, log)
                }
                other => other,
            }
        }
        StmAction::TCatch(a, h) => {
            let before = log.snapshot();
            match eval(*a, log) {
                Outcome::Aborted { exc } => {
                    // Discard `a`'s writes but keep its reads (it still
                    // observed those vars before throwing).
                    let a_reads = log.reads.clone();
                    log.restore(before);
                    log.reads.extend(a_reads);
                    eval(h(exc), log)
                }
                other => other,
            }
        }
        StmAction::TThrow(exc) => Outcome::Aborted { exc },
        StmAction::TStop(value) => Outcome::Success {
            value,
            writes: log.writes.clone(),
            reads: log.reads.clone(),
        },
    }
}

/// Applies a successful transaction's writes to the store, returning the
/// set of vars that actually changed (for the wake computation).
pub(crate) fn commit(vars: &mut TVarStore, writes: HashMap<TVarId, Shared>) -> HashSet<TVarId> {
    vars.commit(writes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::id::RunId;

    #[test]
    fn read_after_write_in_same_transaction_sees_own_write() {
        let mut ids = id::Source::new(RunId::first());
        let vars = TVarStore::default();
        let v = ids.next_tvar(None);

        let action = StmAction::TWrite(
            v,
            Shared::new(5i32),
            Box::new(move || {
                StmAction::TRead(
                    v,
                    Box::new(|shared| StmAction::TStop(Shared::new(shared.downcast_clone::<i32>()))),
                )
            }),
        );

        match run_transaction(action, &vars, &mut ids) {
            Outcome::Success { value, .. } => assert_eq!(value.downcast_clone::<i32>(), 5),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn retry_reports_its_read_set() {
        let mut ids = id::Source::new(RunId::first());
        let mut vars = TVarStore::default();
        let v = ids.next_tvar(None);
        vars.insert(v, 0i32);

        let action = StmAction::TRead(v, Box::new(move |_| StmAction::TRetry));
        match run_transaction(action, &vars, &mut ids) {
            Outcome::Retry { reads } => assert!(reads.contains(&v)),
            _ => panic!("expected retry"),
        }
    }
}
