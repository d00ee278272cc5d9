//! Action algebra & continuation model (component C2, `spec.md` §4.2).
//!
//! A suspended user computation is a tree of [`Action`] nodes. Each
//! non-terminal variant carries its continuation as an explicit boxed
//! closure — the defunctionalised CPS encoding `spec.md` §9 calls for in a
//! language without native delimited continuations. The interpreter
//! (`rt::execution`) never looks past the currently-executing root of a
//! thread's tree; [`Lookahead`] is a separate, side-effect-free pattern
//! match used only to annotate the trace with what the *next* step would
//! be before it runs.

use std::sync::{Arc, Mutex};

#[cfg(feature = "trace-serde")]
use serde::{Deserialize, Serialize};

use crate::rt::exception::{Exc, Handler, MaskingState};
use crate::rt::id::{MRefId, MVarId, ThreadId};
use crate::rt::mref::Ticket;
use crate::rt::stm::StmAction;
use crate::rt::value::Shared;

/// Where a computation's final value is deposited once it reaches `Stop`,
/// since `Stop` itself carries no payload (`spec.md` §3). The public
/// builder (`src/conc.rs`) wires the user's last continuation to write
/// here via the ordinary `Lift` primitive before chaining to `Stop`; the
/// driver (top-level `run`, or `Subconcurrency` below) reads it back out
/// after the loop ends. This is the "single-slot result cell" `spec.md`
/// §4.8 describes.
pub(crate) type ResultCell = Arc<Mutex<Option<Shared>>>;

/// What to do with the result of the action currently completing.
pub(crate) type Cont = Box<dyn FnOnce(Shared) -> Action + Send>;

/// One primitive step a thread can be asked to take, per `spec.md` §3
/// "Action algebra".
pub(crate) enum Action {
    Fork { child: Box<Action>, k: Cont },
    MyThreadId(Cont),
    GetCaps(Cont),
    SetCaps(usize, Cont),
    Yield(Cont),
    /// Reads the calling thread's current masking state. Needed by
    /// `src/exception.rs`'s `mask`/`uninterruptibleMask` to know what to
    /// restore once their body (or an `unmask` within it) completes —
    /// `spec.md` §4.7 says `mask` "pushes the current masking state", which
    /// means a query, since masking isn't otherwise observable from the
    /// builder side of the CPS tree.
    GetMasking(Cont),

    NewMV(Option<Shared>, Cont),
    PutMV(MVarId, Shared, Cont),
    TakeMV(MVarId, Cont),
    ReadMV(MVarId, Cont),
    TryPutMV(MVarId, Shared, Cont),
    TryTakeMV(MVarId, Cont),
    TryReadMV(MVarId, Cont),

    NewMR(Shared, Cont),
    ReadMR(MRefId, Cont),
    WriteMR(MRefId, Shared, Cont),
    ModifyMR(MRefId, Box<dyn FnOnce(Shared) -> Shared + Send>, Cont),
    CasMR(MRefId, Ticket, Shared, Cont),
    ReadForCas(MRefId, Cont),
    /// Produced only by the interpreter itself, never by user code
    /// (`spec.md` §3): publishes one pending write under TSO/PSO.
    CommitMR(ThreadId, MRefId, Cont),

    /// `spec.md` §4.6: "a retried transaction will be retried in full next
    /// time any var in the read set is written". Since an `StmAction` tree
    /// is consumed by evaluating it (its continuations are `FnOnce`), the
    /// body is carried as a repeatable factory rather than a single tree so
    /// the interpreter can rebuild it from scratch on every retry.
    AtomicallySTM(Box<dyn Fn() -> StmAction + Send>, Cont),

    Throw(Exc),
    ThrowTo(ThreadId, Exc, Cont),
    /// Pushes `handler`, then runs the continuation it wraps (the
    /// protected body). The body's own chain must end with `PopCatching`
    /// before resuming whatever follows the `catch` block — this is how
    /// the builder in `src/exception.rs` assembles it, keeping the
    /// handler-stack balance invariant (`spec.md` §3 invariant 6)
    /// structural rather than merely conventional.
    Catching(Handler, Cont),
    PopCatching(Cont),
    SetMasking(bool, MaskingState, Cont),
    ResetMasking(bool, MaskingState, Cont),

    Lift(Box<dyn FnOnce() -> Shared + Send>, Cont),
    /// The identity of the action monad: carries no interpreter-visible
    /// effect and consumes no scheduler step. Exists so the builder API in
    /// `src/conc.rs` can express "pure" values uniformly with every other
    /// primitive, per `spec.md` §4.2's action list.
    Return(Shared, Cont),
    /// Thread terminates. For the main thread this ends the run
    /// successfully with whatever value was written to the result slot.
    Stop,

    /// `spec.md` §4.9/§6 "Sub-computation: subconcurrency". Not named in
    /// §3's literal action list, which enumerates only the primitives a
    /// *single* thread exposes — this is the one action whose stepping
    /// recursively drives a whole nested interpreter, so it is modelled as
    /// its own node rather than forced into `Lift`'s fully-opaque-effect
    /// contract. `body` already ends in a `Lift` that writes into the
    /// paired [`ResultCell`], built by `src/sub.rs`; `k` receives the
    /// reified `Result<Shared, Failure>`.
    Subconcurrency(Box<Action>, ResultCell, Cont),
}

/// A side-effect-free peek at what a thread's *next* action would be,
/// computed by a single pattern match without executing anything
/// (`spec.md` §4.2). Feeds `Trace`'s lookahead column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
pub(crate) enum Lookahead {
    WillFork,
    WillMyThreadId,
    WillGetCaps,
    WillSetCaps,
    WillYield,
    WillGetMasking,
    WillNewMV,
    WillPutMV(MVarId),
    WillTakeMV(MVarId),
    WillReadMV(MVarId),
    WillTryPutMV(MVarId),
    WillTryTakeMV(MVarId),
    WillTryReadMV(MVarId),
    WillNewMR,
    WillReadMR(MRefId),
    WillWriteMR(MRefId),
    WillModifyMR(MRefId),
    WillCasMR(MRefId),
    WillReadForCas(MRefId),
    WillCommitMR(MRefId),
    WillAtomically,
    WillThrow,
    WillThrowTo(ThreadId),
    WillCatching,
    WillPopCatching,
    WillSetMasking,
    WillResetMasking,
    WillLift,
    WillReturn,
    WillStop,
    WillSubconcurrency,
}

impl Action {
    pub(crate) fn lookahead(&self) -> Lookahead {
        match self {
            Action::Fork { .. } => Lookahead::WillFork,
            Action::MyThreadId(_) => Lookahead::WillMyThreadId,
            Action::GetCaps(_) => Lookahead::WillGetCaps,
            Action::SetCaps(..) => Lookahead::WillSetCaps,
            Action::Yield(_) => Lookahead::WillYield,
            Action::GetMasking(_) => Lookahead::WillGetMasking,
            Action::NewMV(..) => Lookahead::WillNewMV,
            Action::PutMV(id, ..) => Lookahead::WillPutMV(*id),
            Action::TakeMV(id, _) => Lookahead::WillTakeMV(*id),
            Action::ReadMV(id, _) => Lookahead::WillReadMV(*id),
            Action::TryPutMV(id, ..) => Lookahead::WillTryPutMV(*id),
            Action::TryTakeMV(id, _) => Lookahead::WillTryTakeMV(*id),
            Action::TryReadMV(id, _) => Lookahead::WillTryReadMV(*id),
            Action::NewMR(..) => Lookahead::WillNewMR,
            Action::ReadMR(id, _) => Lookahead::WillReadMR(*id),
            Action::WriteMR(id, ..) => Lookahead::WillWriteMR(*id),
            Action::ModifyMR(id, ..) => Lookahead::WillModifyMR(*id),
            Action::CasMR(id, ..) => Lookahead::WillCasMR(*id),
            Action::ReadForCas(id, _) => Lookahead::WillReadForCas(*id),
            Action::CommitMR(_, id, _) => Lookahead::WillCommitMR(*id),
            Action::AtomicallySTM(..) => Lookahead::WillAtomically,
            Action::Throw(_) => Lookahead::WillThrow,
            Action::ThrowTo(tid, ..) => Lookahead::WillThrowTo(*tid),
            Action::Catching(..) => Lookahead::WillCatching,
            Action::PopCatching(_) => Lookahead::WillPopCatching,
            Action::SetMasking(..) => Lookahead::WillSetMasking,
            Action::ResetMasking(..) => Lookahead::WillResetMasking,
            Action::Lift(..) => Lookahead::WillLift,
            Action::Return(..) => Lookahead::WillReturn,
            Action::Stop => Lookahead::WillStop,
            Action::Subconcurrency(..) => Lookahead::WillSubconcurrency,
        }
    }
}
