#![deny(missing_debug_implementations, missing_docs, rust_2018_idioms)]

//! `braid` is a deterministic concurrency interpreter: rather than running a
//! concurrent program on real OS threads, it builds the program as a tree of
//! primitive actions and drives that tree itself, one action at a time,
//! asking a caller-supplied [`Scheduler`] which thread goes next at every
//! step.
//!
//! Because the interpreter — not the OS — picks the interleaving, the same
//! program run against the same scheduler and the same scheduler state
//! produces the exact same [`Trace`] every time. That determinism is the
//! whole point: a [`scheduler::Fixed`] replays a previously recorded schedule
//! bit for bit, and higher-level search strategies (preemption-bounded,
//! random, partial-order reduction) can be built on top of [`Scheduler`]
//! without touching anything in this crate.
//!
//! # Writing a computation
//!
//! A computation is built functionally out of [`Conc`] values, composed with
//! [`Conc::and_then`]/[`Conc::then`]/[`Conc::map`]. The primitive builders
//! live in their own modules: [`thread_api`] (fork, thread ids, `throwTo`),
//! [`mvar`] (single-slot blocking cells), [`mref`] (mutable cells under a
//! pluggable memory model), [`stm`] (software transactional memory),
//! [`exception`] (`throw`/`catch`/masking), [`lift`] (escape into ordinary
//! Rust), and [`sub`] (nested sub-computations). [`run`] drives a `Conc<T>`
//! to completion and returns its outcome alongside the recorded [`Trace`].
//!
//! ```no_run
//! use braid::{mvar::MVar, thread_api::fork, Conc};
//!
//! let comp: Conc<i32> = MVar::new_empty().and_then(|cell: MVar<i32>| {
//!     fork(cell.put(42)).then(move || cell.take())
//! });
//!
//! let (result, _state, _trace) = braid::run(comp, &braid::scheduler::RoundRobin, ());
//! assert_eq!(result.unwrap(), 42);
//! ```

mod conc;
mod rt;

pub mod exception;
pub mod lift;
pub mod mref;
pub mod mvar;
pub mod scheduler;
pub mod stm;
pub mod sub;
pub mod thread_api;

macro_rules! if_trace_serde {
    ($($t:tt)*) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "trace-serde")] {
                $($t)*
            }
        }
    }
}

if_trace_serde! {
    pub mod trace_json;
}

pub use conc::Conc;
pub use rt::failure::Failure;
pub use rt::id::{MRefId, MVarId, ThreadId, TVarId};
pub use rt::memory_model::MemoryModel;
pub use rt::trace::{count_preemptions, Decision, ThreadAction, Trace, TraceEntry};

use std::env;

use tracing::{info, info_span, subscriber};
use tracing_subscriber::{fmt, EnvFilter};

use rt::action::{Action, Cont};
use rt::execution::Execution;
use rt::id::RunId;
use rt::value::Shared;
use scheduler::Scheduler;

/// Configures a single [`run`] (`BRAID_LOG`/`BRAID_LOCATION` env vars, the
/// memory model under test). Mirrors the teacher's env-driven `Builder`, cut
/// down to what a single deterministic run — rather than an exhaustive
/// permutation search — actually needs.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Builder {
    /// Which relaxed-memory model mutable cells (`MRef`) are checked under.
    ///
    /// Defaults to [`MemoryModel::SequentialConsistency`].
    pub memory_model: MemoryModel,

    /// Caps the number of actions a run may step before giving up with
    /// [`Failure::BranchBudgetExceeded`]. A guard against a user program
    /// that never reaches `Stop`, not a schedule-search bound — the core
    /// interpreter never chooses schedules itself, so there is nothing here
    /// analogous to the teacher's `max_permutations`.
    ///
    /// `None` (the default) means unbounded.
    pub max_branches: Option<u64>,

    /// When `true`, every stepped action is logged via `tracing` at `trace`
    /// level.
    ///
    /// Defaults to the presence of the `BRAID_LOG` environment variable.
    pub log: bool,

    /// When `true`, the run's top-level span records the source location
    /// [`Builder::run`] was called from, to help tell apart log output from
    /// multiple runs in the same process.
    ///
    /// Defaults to the presence of the `BRAID_LOCATION` environment
    /// variable.
    pub location: bool,
}

impl Builder {
    /// Creates a `Builder` with defaults taken from the environment.
    pub fn new() -> Builder {
        Builder {
            memory_model: MemoryModel::default(),
            max_branches: None,
            log: env::var("BRAID_LOG").is_ok(),
            location: env::var("BRAID_LOCATION").is_ok(),
        }
    }

    /// Drives `comp` to completion under `scheduler`, starting from `state`.
    ///
    /// Returns the computation's outcome, the scheduler's final state (so a
    /// caller doing a permutation search can inspect or reuse it), and the
    /// full [`Trace`] of the run.
    #[track_caller]
    pub fn run<T, S>(&self, comp: Conc<T>, scheduler: &dyn Scheduler<S>, mut state: S) -> (Result<T, Failure>, S, Trace)
    where
        T: Clone + Send + Sync + 'static,
    {
        let caller = self.location.then(std::panic::Location::caller);
        let _span = info_span!("braid_run", location = caller.map(ToString::to_string)).entered();

        let run_with = || {
            let mut execution = Execution::new(RunId::first(), self.memory_model).with_branch_budget(self.max_branches);
            let cell = std::sync::Arc::new(std::sync::Mutex::new(None));
            let write_cell = cell.clone();
            let root_k: Cont = Box::new(move |v: Shared| {
                *write_cell.lock().unwrap() = Some(v);
                Action::Stop
            });
            let root = comp.into_action(root_k);
            execution.install(root);

            let (outcome, trace) = execution.run(scheduler, &mut state);
            let result = outcome.map(|()| {
                let v = cell
                    .lock()
                    .unwrap()
                    .take()
                    .expect("main thread stopped without writing its result");
                v.downcast_clone::<T>()
            });
            if let Err(ref failure) = result {
                info!(%failure, "run ended without reaching Stop");
            }
            (result, state, trace)
        };

        if self.log {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(EnvFilter::from_env("BRAID_LOG"))
                .with_test_writer()
                .without_time()
                .finish();
            subscriber::with_default(subscriber, run_with)
        } else {
            run_with()
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives `comp` to completion under `scheduler` using the default
/// [`Builder`]. See [`Builder::run`].
pub fn run<T, S>(comp: Conc<T>, scheduler: &dyn Scheduler<S>, state: S) -> (Result<T, Failure>, S, Trace)
where
    T: Clone + Send + Sync + 'static,
{
    Builder::new().run(comp, scheduler, state)
}
