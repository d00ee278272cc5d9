//! Scheduler loop (component C8, `spec.md` §4.8).
//!
//! Ties every other runtime component together: one call to [`Execution::run`]
//! drives a whole computation to completion by repeatedly asking a
//! [`Scheduler`] for the next thread to step, advancing it by exactly one
//! [`Action`], and recording the decision in the [`Trace`]. Mirrors the
//! teacher's `rt/execution.rs::schedule` in shape (pick a runnable id, step
//! it, record, loop) with the internal DPOR search replaced by a call out to
//! the caller-supplied policy.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::rt::action::{Action, Cont, Lookahead, ResultCell};
use crate::rt::exception::{Exc, PendingThrowTo};
use crate::rt::failure::Failure;
use crate::rt::id::{self, MRefId, RunId, ThreadId};
use crate::rt::memory_model::MemoryModel;
use crate::rt::mref;
use crate::rt::mvar;
use crate::rt::stm::{self, StmAction, TVarStore};
use crate::rt::thread::{self, BlockedOn};
use crate::rt::trace::{count_preemptions, Decision, ThreadAction, Trace};
use crate::rt::value::Shared;
use crate::scheduler::Scheduler;

/// All mutable state shared by a run and every sub-computation nested
/// inside it. A single value is reused (not reconstructed) across
/// `subconcurrency` boundaries for the fields `spec.md` §4.9 says are
/// shared (`ids`, the memory-model stores); the thread table and its
/// satellite bookkeeping are swapped out for the duration of a nested run
/// and restored afterwards.
pub(crate) struct Execution {
    #[allow(dead_code)]
    run: RunId,
    ids: id::Source,
    threads: thread::Table,
    mvars: mvar::Store,
    mrefs: mref::Store,
    tvars: TVarStore,
    main: Option<ThreadId>,
    caps: usize,
    last: Option<ThreadId>,
    pending_throws: Vec<PendingThrowTo>,
    commit_pseudo: HashMap<(ThreadId, MRefId), ThreadId>,
    sub_active: HashSet<ThreadId>,
    uncaught: Option<Exc>,
    internal_error: Option<String>,
    trace: Trace,
    branch_budget: Option<u64>,
    steps: u64,
}

impl Execution {
    pub(crate) fn new(run: RunId, model: MemoryModel) -> Execution {
        Execution {
            run,
            ids: id::Source::new(run),
            threads: thread::Table::default(),
            mvars: mvar::Store::default(),
            mrefs: mref::Store::new(model),
            tvars: TVarStore::default(),
            main: None,
            caps: 1,
            last: None,
            pending_throws: Vec::new(),
            commit_pseudo: HashMap::new(),
            sub_active: HashSet::new(),
            uncaught: None,
            internal_error: None,
            trace: Trace::default(),
            branch_budget: None,
            steps: 0,
        }
    }

    /// Caps the number of actions this run will step before giving up with
    /// [`Failure::BranchBudgetExceeded`] — a guard against a user program
    /// that never reaches `Stop`, not a schedule-search bound (the core
    /// interpreter never chooses schedules itself).
    pub(crate) fn with_branch_budget(mut self, budget: Option<u64>) -> Execution {
        self.branch_budget = budget;
        self
    }

    pub(crate) fn ids(&mut self) -> &mut id::Source {
        &mut self.ids
    }

    /// Installs `root` as the main thread's initial action and returns its
    /// id (always `0`, the first thread this `Execution` allocates).
    pub(crate) fn install(&mut self, root: Action) -> ThreadId {
        let main = self.ids.next_thread(None);
        self.threads.install_main(main, root);
        self.main = Some(main);
        main
    }

    fn main_id(&self) -> ThreadId {
        self.main.expect("Execution::install must run before Execution::run")
    }

    /// Drives the installed computation to completion. Returns the
    /// forward-order trace alongside the outcome (the real return value
    /// lives wherever the caller's `Lift`-into-a-cell wrapper put it, per
    /// `spec.md` §4.8).
    pub(crate) fn run<S>(&mut self, scheduler: &dyn Scheduler<S>, state: &mut S) -> (Result<(), Failure>, Trace) {
        let outcome = self.drive(scheduler, state);
        (outcome, std::mem::take(&mut self.trace))
    }

    /// Preemption count of the run just completed (`spec.md` §4.8).
    pub(crate) fn preemptions(trace: &Trace) -> u64 {
        count_preemptions(trace)
    }

    fn drive<S>(&mut self, scheduler: &dyn Scheduler<S>, state: &mut S) -> Result<(), Failure> {
        loop {
            self.sync_commit_threads();

            if !self.threads.main_alive(self.main_id()) {
                return Ok(());
            }

            if let Some(budget) = self.branch_budget {
                if self.steps >= budget {
                    return Err(Failure::BranchBudgetExceeded(budget));
                }
            }
            self.steps += 1;

            let runnable = self.threads.runnable();
            if runnable.is_empty() {
                let blocked = self.threads.non_main_blocked_ids(self.main_id());
                if blocked.iter().any(|&tid| self.threads.is_blocked_only_on_tvars(tid)) {
                    return Err(Failure::STMDeadlock);
                }
                return Err(Failure::Deadlock);
            }

            let chosen = match self.last {
                None => self.main_id(),
                Some(last) => scheduler.pick(state, Some(last), &runnable),
            };

            let runnable_now = self.threads.get(chosen).map(|t| t.is_runnable()).unwrap_or(false);
            if !runnable_now {
                return Err(Failure::Abort);
            }

            let started = self.threads.get(chosen).expect("checked above").started;
            let decision = if !started {
                Decision::Start(chosen)
            } else if self.last == Some(chosen) {
                Decision::Continue
            } else {
                Decision::SwitchTo(chosen)
            };
            self.threads.get_mut(chosen).unwrap().started = true;

            let action = self
                .threads
                .get_mut(chosen)
                .unwrap()
                .next
                .take()
                .expect("runnable thread with no installed action");

            match action {
                Action::Subconcurrency(body, cell, k) => {
                    self.step_subconcurrency(chosen, *body, cell, k, decision, scheduler, state);
                }
                other => {
                    let taken = self.dispatch(chosen, other);
                    trace!(thread = %chosen, action = %taken, ?decision, "stepped");
                    let lookahead = self
                        .threads
                        .get(chosen)
                        .and_then(|t| t.next.as_ref())
                        .map(Action::lookahead)
                        .unwrap_or(Lookahead::WillStop);
                    self.trace.push(decision, taken, lookahead);
                }
            }

            if let Some(exc) = self.uncaught.take() {
                return Err(Failure::UncaughtException(exc));
            }
            if let Some(msg) = self.internal_error.take() {
                return Err(Failure::InternalError(msg));
            }

            self.last = Some(chosen);
        }
    }

    /// Non-generic dispatch for every primitive except `Subconcurrency`
    /// (handled by `drive` itself, since only it recurses into a nested
    /// `drive` call and needs the scheduler type parameter).
    fn dispatch(&mut self, tid: ThreadId, action: Action) -> ThreadAction {
        match action {
            Action::Subconcurrency(..) => unreachable!("handled in drive"),

            Action::Fork { child, k } => {
                let child_id = self.ids.next_thread(None);
                self.threads.launch(tid, child_id, *child);
                self.threads.goto(tid, k(Shared::new(child_id)));
                ThreadAction::Fork(child_id)
            }
            Action::MyThreadId(k) => {
                self.threads.goto(tid, k(Shared::new(tid)));
                ThreadAction::MyThreadId
            }
            Action::GetCaps(k) => {
                let caps = self.caps;
                self.threads.goto(tid, k(Shared::new(caps)));
                ThreadAction::GetCaps
            }
            Action::SetCaps(n, k) => {
                self.caps = n;
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::SetCaps
            }
            Action::Yield(k) => {
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::Yield
            }
            Action::GetMasking(k) => {
                let masking = self.threads.get(tid).unwrap().masking;
                self.threads.goto(tid, k(Shared::new(masking)));
                ThreadAction::GetMasking
            }

            Action::NewMV(initial, k) => {
                let id = self.ids.next_mvar(None);
                self.mvars.new_mvar(id, initial);
                self.threads.goto(tid, k(Shared::new(id)));
                ThreadAction::NewMVar(id)
            }
            Action::PutMV(id, value, k) => {
                if self.mvars.is_full(id) {
                    self.threads.goto(tid, Action::PutMV(id, value, k));
                    self.threads.block(tid, BlockedOn::WaitFull(id));
                    ThreadAction::BlockedPut(id)
                } else {
                    self.mvars.put(id, value);
                    let woken = self.threads.wake_wait_full(id);
                    self.threads.goto(tid, k(Shared::unit()));
                    ThreadAction::Put(id, woken)
                }
            }
            Action::TakeMV(id, k) => {
                if self.mvars.is_full(id) {
                    let v = self.mvars.take(id).expect("checked full above");
                    let woken = self.threads.wake_wait_empty(id);
                    self.threads.goto(tid, k(v));
                    ThreadAction::Take(id, woken)
                } else {
                    self.threads.goto(tid, Action::TakeMV(id, k));
                    self.threads.block(tid, BlockedOn::WaitEmpty(id));
                    ThreadAction::BlockedTake(id)
                }
            }
            Action::ReadMV(id, k) => {
                if self.mvars.is_full(id) {
                    let v = self.mvars.read(id).expect("checked full above");
                    self.threads.goto(tid, k(v));
                    ThreadAction::Read(id)
                } else {
                    self.threads.goto(tid, Action::ReadMV(id, k));
                    self.threads.block(tid, BlockedOn::WaitEmpty(id));
                    ThreadAction::BlockedRead(id)
                }
            }
            Action::TryPutMV(id, value, k) => {
                let ok = !self.mvars.is_full(id);
                let woken = if ok {
                    self.mvars.put(id, value);
                    self.threads.wake_wait_full(id)
                } else {
                    Vec::new()
                };
                self.threads.goto(tid, k(Shared::new(ok)));
                ThreadAction::TryPut(id, ok, woken)
            }
            Action::TryTakeMV(id, k) => {
                if self.mvars.is_full(id) {
                    let v = self.mvars.take(id).expect("checked full above");
                    let woken = self.threads.wake_wait_empty(id);
                    self.threads.goto(tid, k(Shared::new(Some(v))));
                    ThreadAction::TryTake(id, true, woken)
                } else {
                    self.threads.goto(tid, k(Shared::new(None::<Shared>)));
                    ThreadAction::TryTake(id, false, Vec::new())
                }
            }
            Action::TryReadMV(id, k) => {
                if self.mvars.is_full(id) {
                    let v = self.mvars.read(id).expect("checked full above");
                    self.threads.goto(tid, k(Shared::new(Some(v))));
                    ThreadAction::TryRead(id, true)
                } else {
                    self.threads.goto(tid, k(Shared::new(None::<Shared>)));
                    ThreadAction::TryRead(id, false)
                }
            }

            Action::NewMR(initial, k) => {
                let id = self.ids.next_mref(None);
                self.mrefs.insert_shared(id, initial);
                self.threads.goto(tid, k(Shared::new(id)));
                ThreadAction::NewMRef(id)
            }
            Action::ReadMR(id, k) => {
                let v = self.mrefs.read(id, tid);
                self.threads.goto(tid, k(v));
                ThreadAction::ReadMRef(id)
            }
            Action::WriteMR(id, value, k) => {
                self.mrefs.write(id, tid, value);
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::WriteMRef(id)
            }
            Action::ModifyMR(id, f, k) => {
                self.mrefs.modify(id, tid, f);
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::ModifyMRef(id)
            }
            Action::ReadForCas(id, k) => {
                let ticket = self.mrefs.read_for_cas(id, tid);
                self.threads.goto(tid, k(Shared::new(ticket)));
                ThreadAction::ReadForCas(id)
            }
            Action::CasMR(id, ticket, v, k) => {
                let (ok, new_ticket) = self.mrefs.cas(tid, &ticket, v);
                self.threads.goto(tid, k(Shared::new((ok, new_ticket))));
                ThreadAction::CasMRef(id, ok)
            }
            Action::CommitMR(owner, id, k) => {
                self.mrefs.commit(owner, id);
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::CommitMRef { owner, id }
            }

            Action::AtomicallySTM(factory, k) => self.step_stm(tid, factory, k),

            Action::Throw(exc) => {
                self.handle_exception(tid, exc);
                ThreadAction::Throw
            }
            Action::ThrowTo(target, exc, k) => self.step_throw_to(tid, target, exc, k),
            Action::Catching(handler, k) => {
                self.threads.get_mut(tid).unwrap().handlers.push(handler);
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::Catching
            }
            Action::PopCatching(k) => {
                self.threads.get_mut(tid).unwrap().handlers.pop();
                self.threads.goto(tid, k(Shared::unit()));
                ThreadAction::PopCatching
            }
            Action::SetMasking(_outer, newmask, k) => {
                self.threads.get_mut(tid).unwrap().masking = newmask;
                self.threads.goto(tid, k(Shared::unit()));
                self.attempt_deliver(tid);
                ThreadAction::SetMasking
            }
            Action::ResetMasking(_outer, newmask, k) => {
                self.threads.get_mut(tid).unwrap().masking = newmask;
                self.threads.goto(tid, k(Shared::unit()));
                self.attempt_deliver(tid);
                ThreadAction::ResetMasking
            }

            Action::Lift(effect, k) => {
                let v = effect();
                self.threads.goto(tid, k(v));
                ThreadAction::Lift
            }
            Action::Return(value, k) => {
                self.threads.goto(tid, k(value));
                ThreadAction::Return
            }
            Action::Stop => {
                self.threads.kill(tid);
                self.flush_pending_throws_to_dead(tid);
                ThreadAction::Stop
            }
        }
    }

    fn step_stm(&mut self, tid: ThreadId, factory: Box<dyn Fn() -> StmAction + Send>, k: Cont) -> ThreadAction {
        let root = factory();
        match stm::run_transaction(root, &self.tvars, &mut self.ids) {
            stm::Outcome::Success { value, writes, reads: _ } => {
                let changed = stm::commit(&mut self.tvars, writes);
                let woken = self.threads.wake_tvars(&changed);
                for &w in &woken {
                    self.tvars.unblock_all(w);
                }
                self.threads.goto(tid, k(value));
                ThreadAction::AtomicallySuccess { woken }
            }
            stm::Outcome::Retry { reads } => {
                self.tvars.block(tid, &reads);
                self.threads.block(tid, BlockedOn::TVars(reads));
                self.threads.goto(tid, Action::AtomicallySTM(factory, k));
                ThreadAction::AtomicallyBlocked
            }
            stm::Outcome::Aborted { exc } => {
                self.handle_exception(tid, exc);
                ThreadAction::AtomicallyAborted
            }
        }
    }

    fn step_throw_to(&mut self, tid: ThreadId, target: ThreadId, exc: Exc, k: Cont) -> ThreadAction {
        self.pending_throws.push(PendingThrowTo { sender: tid, target, exc, k });
        self.attempt_deliver(target);

        let still_pending = self.pending_throws.iter().any(|p| p.sender == tid && p.target == target);
        if still_pending {
            self.threads.block(tid, BlockedOn::Mask(target));
            ThreadAction::BlockedThrowTo(target)
        } else {
            ThreadAction::ThrowTo(target)
        }
    }

    /// Delivers every pending `ThrowTo` targeting `target` that has become
    /// deliverable, in FIFO order, waking each sender as part of the same
    /// delivery step (`spec.md` §4.7).
    fn attempt_deliver(&mut self, target: ThreadId) {
        loop {
            let pos = self.pending_throws.iter().position(|p| p.target == target);
            let Some(pos) = pos else { return };

            let (currently_blocked, masking) = match self.threads.get(target) {
                Some(t) => (t.blocked_on.is_some(), t.masking),
                None => return,
            };
            if !masking.is_interruptible(currently_blocked) {
                return;
            }

            let pending = self.pending_throws.remove(pos);
            self.handle_exception(target, pending.exc);
            if let Some(sender) = self.threads.get_mut(pending.sender) {
                sender.blocked_on = None;
            }
            let next = (pending.k)(Shared::unit());
            self.threads.goto(pending.sender, next);
        }
    }

    /// Routes `exc` through `tid`'s handler stack (`spec.md` §4.7), whether
    /// it got there via a self-`Throw`, a delivered `ThrowTo`, or an
    /// aborted STM transaction. Interrupts whatever `tid` was blocked on.
    fn handle_exception(&mut self, tid: ThreadId, exc: Exc) {
        if let Some(thread) = self.threads.get_mut(tid) {
            thread.blocked_on = None;
        }
        self.tvars.unblock_all(tid);

        let delivered = self.threads.get_mut(tid).and_then(|t| t.handlers.deliver(exc.clone()));
        match delivered {
            Some(next_action) => self.threads.goto(tid, next_action),
            None => {
                if self.main == Some(tid) {
                    self.uncaught = Some(exc);
                }
                self.threads.kill(tid);
                self.flush_pending_throws_to_dead(tid);
            }
        }
    }

    /// A thread that died (by `Stop`, by an uncaught exception, or by
    /// being killed) can never become interruptible; any sender still
    /// waiting to throw to it is released with a no-op delivery rather
    /// than blocked forever.
    fn flush_pending_throws_to_dead(&mut self, dead: ThreadId) {
        let (to_release, remaining): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending_throws).into_iter().partition(|p| p.target == dead);
        self.pending_throws = remaining;
        for p in to_release {
            if let Some(sender) = self.threads.get_mut(p.sender) {
                sender.blocked_on = None;
            }
            let next = (p.k)(Shared::unit());
            self.threads.goto(p.sender, next);
        }
    }

    /// Keeps the thread table's commit pseudo-threads (`spec.md` §4.5, §9)
    /// in sync with `mrefs.runnable_commits()`: allocates one for every
    /// newly-pending `(thread, ref)` pair and retires any whose pending
    /// write has since been fully flushed.
    fn sync_commit_threads(&mut self) {
        let pending: HashSet<(ThreadId, MRefId)> = self.mrefs.runnable_commits().into_iter().collect();

        let stale: Vec<(ThreadId, MRefId)> =
            self.commit_pseudo.keys().copied().filter(|pair| !pending.contains(pair)).collect();
        for pair in stale {
            if let Some(pseudo_id) = self.commit_pseudo.remove(&pair) {
                self.threads.kill(pseudo_id);
            }
        }

        for pair in pending {
            if self.commit_pseudo.contains_key(&pair) {
                continue;
            }
            let (owner, mref_id) = pair;
            let pseudo_id = self.ids.next_commit_thread();
            let action = Action::CommitMR(owner, mref_id, Box::new(|_| Action::Stop));
            self.threads.install_main(pseudo_id, action);
            self.commit_pseudo.insert(pair, pseudo_id);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_subconcurrency<S>(
        &mut self,
        tid: ThreadId,
        body: Action,
        cell: ResultCell,
        k: Cont,
        decision: Decision,
        scheduler: &dyn Scheduler<S>,
        state: &mut S,
    ) {
        if !self.sub_active.insert(tid) {
            self.internal_error = Some(format!("subconcurrency nested on thread {}", tid));
            return;
        }

        let outer_masking = self.threads.get(tid).map(|t| t.masking).unwrap_or_default();
        let saved_threads = std::mem::take(&mut self.threads);
        let saved_main = self.main;
        let saved_last = self.last.take();
        let saved_pending = std::mem::take(&mut self.pending_throws);
        let saved_uncaught = self.uncaught.take();
        let saved_trace = std::mem::take(&mut self.trace);

        let nested_main = self.ids.next_thread(None);
        self.threads.install_main(nested_main, body);
        self.threads.get_mut(nested_main).unwrap().masking = outer_masking;
        self.main = Some(nested_main);

        let inner_result = self.drive(scheduler, state);
        let inner_trace = std::mem::replace(&mut self.trace, saved_trace);

        self.threads = saved_threads;
        self.main = saved_main;
        self.last = saved_last;
        self.pending_throws = saved_pending;
        self.uncaught = saved_uncaught;
        self.sub_active.remove(&tid);

        let reified: Result<Shared, Failure> = match inner_result {
            Ok(()) => Ok(cell.lock().unwrap().take().unwrap_or_else(Shared::unit)),
            Err(f) => Err(f),
        };

        self.threads.goto(tid, k(Shared::new(reified)));
        let lookahead = self
            .threads
            .get(tid)
            .and_then(|t| t.next.as_ref())
            .map(Action::lookahead)
            .unwrap_or(Lookahead::WillStop);

        self.trace.push(decision, ThreadAction::StartSubconcurrency, Lookahead::WillSubconcurrency);
        self.trace.extend(inner_trace);
        self.trace.push(Decision::Continue, ThreadAction::StopSubconcurrency, lookahead);
    }
}
