//! Thread table (component C3, `spec.md` §4.3).

use std::collections::{BTreeMap, HashSet};

use crate::rt::action::Action;
use crate::rt::exception::{HandlerStack, MaskingState};
use crate::rt::id::{MVarId, ThreadId, TVarId};

/// Why a thread is not currently runnable (`spec.md` §3).
#[derive(Debug, Clone)]
pub(crate) enum BlockedOn {
    WaitFull(MVarId),
    WaitEmpty(MVarId),
    TVars(HashSet<TVarId>),
    Mask(ThreadId),
}

pub(crate) struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) next: Option<Action>,
    pub(crate) blocked_on: Option<BlockedOn>,
    pub(crate) handlers: HandlerStack,
    pub(crate) masking: MaskingState,
    /// Set once this thread has taken its first step, so the scheduler
    /// loop can tell `Start(tid)` from `Continue`/`SwitchTo(tid)`
    /// (`spec.md` §4.8 step 6).
    pub(crate) started: bool,
    pub(crate) terminated: bool,
}

impl Thread {
    fn new(id: ThreadId, next: Action, masking: MaskingState) -> Thread {
        Thread {
            id,
            next: Some(next),
            blocked_on: None,
            handlers: HandlerStack::default(),
            masking,
            started: false,
            terminated: false,
        }
    }

    pub(crate) fn is_runnable(&self) -> bool {
        !self.terminated && self.blocked_on.is_none()
    }
}

/// Maps every live thread id to its state; keyed by a `BTreeMap` so
/// ascending-tid iteration (required by `wake` and by the scheduler's
/// runnable-set presentation, `spec.md` §4.3, §6) falls out for free.
#[derive(Default)]
pub(crate) struct Table {
    threads: BTreeMap<ThreadId, Thread>,
}

impl Table {
    pub(crate) fn install_main(&mut self, id: ThreadId, initial: Action) {
        self.threads.insert(id, Thread::new(id, initial, MaskingState::Unmasked));
    }

    /// `spec.md` §4.3: inserts a new thread inheriting the parent's
    /// masking state.
    pub(crate) fn launch(&mut self, parent: ThreadId, new_id: ThreadId, initial: Action) {
        let masking = self.threads[&parent].masking;
        self.threads.insert(new_id, Thread::new(new_id, initial, masking));
    }

    pub(crate) fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    pub(crate) fn goto(&mut self, id: ThreadId, next: Action) {
        let thread = self.threads.get_mut(&id).expect("goto on unknown thread");
        thread.next = Some(next);
    }

    pub(crate) fn kill(&mut self, id: ThreadId) {
        if let Some(thread) = self.threads.get_mut(&id) {
            thread.terminated = true;
            thread.next = None;
            thread.blocked_on = None;
        }
    }

    pub(crate) fn block(&mut self, id: ThreadId, reason: BlockedOn) {
        let thread = self.threads.get_mut(&id).expect("block on unknown thread");
        thread.blocked_on = Some(reason);
    }

    /// Ascending-tid order runnable ids, as presented to the scheduler
    /// (`spec.md` §6: "runnable list ... in ascending id order").
    pub(crate) fn runnable(&self) -> Vec<ThreadId> {
        self.threads
            .values()
            .filter(|t| t.is_runnable())
            .map(|t| t.id)
            .collect()
    }

    pub(crate) fn is_blocked_only_on_tvars(&self, id: ThreadId) -> bool {
        matches!(
            self.threads.get(&id).and_then(|t| t.blocked_on.as_ref()),
            Some(BlockedOn::TVars(_))
        )
    }

    pub(crate) fn main_alive(&self, main: ThreadId) -> bool {
        self.threads.get(&main).is_some_and(|t| !t.terminated)
    }

    pub(crate) fn non_main_blocked_ids(&self, main: ThreadId) -> Vec<ThreadId> {
        self.threads
            .values()
            .filter(|t| t.id != main && t.blocked_on.is_some())
            .map(|t| t.id)
            .collect()
    }

    fn wake_if<F>(&mut self, matches: F) -> Vec<ThreadId>
    where
        F: Fn(&BlockedOn) -> bool,
    {
        let mut woken = Vec::new();
        for (&id, thread) in self.threads.iter_mut() {
            if thread.blocked_on.as_ref().is_some_and(&matches) {
                thread.blocked_on = None;
                woken.push(id);
            }
        }
        woken.sort();
        woken
    }

    /// `spec.md` §4.3 wake-matching rule.
    pub(crate) fn wake_wait_full(&mut self, mv: MVarId) -> Vec<ThreadId> {
        self.wake_if(|reason| matches!(reason, BlockedOn::WaitFull(id) if *id == mv))
    }

    pub(crate) fn wake_wait_empty(&mut self, mv: MVarId) -> Vec<ThreadId> {
        self.wake_if(|reason| matches!(reason, BlockedOn::WaitEmpty(id) if *id == mv))
    }

    pub(crate) fn wake_tvars(&mut self, changed: &HashSet<TVarId>) -> Vec<ThreadId> {
        self.wake_if(|reason| match reason {
            BlockedOn::TVars(set) => !set.is_disjoint(changed),
            _ => false,
        })
    }
}
