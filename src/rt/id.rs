//! Identifier allocation (component C1).
//!
//! Every id is a pair of an optional user-supplied name and a monotonic
//! integer; ordering and equality are taken from the integer alone, as
//! `spec.md` §3 requires. Repeated names are disambiguated by suffixing
//! `-k`, mirroring the teacher's small, cheaply `Copy`/cheap-`Clone` id
//! newtypes (`rt/thread.rs::Id`, `rt/object.rs::Id`).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "trace-serde")]
use serde::{Deserialize, Serialize};

/// Identifies a single run of the interpreter. Every id produced by a
/// [`Source`] is tagged with the `RunId` of the run that produced it so
/// that a cell from one run can never be touched by another (the phantom
/// run-identity property from `spec.md` §9, enforced dynamically here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
pub(crate) struct RunId(u64);

impl RunId {
    pub(crate) fn first() -> RunId {
        RunId(0)
    }

    pub(crate) fn next(self) -> RunId {
        RunId(self.0 + 1)
    }
}

macro_rules! def_id {
    ($name:ident, $int:ty) => {
        #[doc = concat!(
            " A run-scoped identifier (`spec.md` §3). Equality and ordering\n",
            " come from the allocation counter alone; the optional name is\n",
            " carried only for `Display`/`Debug`.",
        )]
        #[derive(Clone, Copy, Eq)]
        #[cfg_attr(feature = "trace-serde", derive(Serialize, Deserialize))]
        pub struct $name {
            run: RunId,
            name: Option<Arc<str>>,
            num: $int,
        }

        impl $name {
            pub(crate) fn run(&self) -> RunId {
                self.run
            }

            /// The bare integer this id was allocated with, used as the
            /// main thread's reserved id and for ascending-order sorts.
            pub(crate) fn num(&self) -> $int {
                self.num
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.run == other.run && self.num == other.num
            }
        }

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.run.hash(state);
                self.num.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                (self.run, self.num).cmp(&(other.run, other.num))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.name {
                    Some(name) => write!(f, "{}({})", name, self.num),
                    None => write!(f, "{}({})", stringify!($name), self.num),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.name {
                    Some(name) => write!(f, "{}", name),
                    None => write!(f, "{}", self.num),
                }
            }
        }
    };
}

def_id!(ThreadId, i64);
def_id!(MVarId, u64);
def_id!(MRefId, u64);
def_id!(TVarId, u64);

impl ThreadId {
    /// The reserved id of the main thread (invariant 1 of `spec.md` §3).
    pub(crate) const MAIN: i64 = 0;

    pub(crate) fn is_main(&self) -> bool {
        self.num == Self::MAIN
    }

    pub(crate) fn is_commit_pseudo(&self) -> bool {
        self.num < 0
    }
}

/// Allocates unique, optionally-named identifiers for a single run.
///
/// `next(name)` returns `(name, name-1, name-2, ...)` on repeats; an
/// absent/empty name yields an anonymous id whose `Display` is its bare
/// integer, per `spec.md` §4.1.
#[derive(Debug, Clone)]
pub(crate) struct Source {
    run: RunId,
    next_thread: i64,
    next_commit: i64,
    next_mvar: u64,
    next_mref: u64,
    next_tvar: u64,
    used_names: HashMap<&'static str, u32>,
}

impl Source {
    pub(crate) fn new(run: RunId) -> Source {
        Source {
            run,
            next_thread: 0,
            next_commit: -1,
            next_mvar: 0,
            next_mref: 0,
            next_tvar: 0,
            used_names: HashMap::new(),
        }
    }

    /// Allocates a fresh commit pseudo-thread id (`spec.md` §4.5, §9):
    /// strictly negative, anonymous, disjoint from every real thread id.
    pub(crate) fn next_commit_thread(&mut self) -> ThreadId {
        let num = self.next_commit;
        self.next_commit -= 1;
        ThreadId {
            run: self.run,
            name: None,
            num,
        }
    }

    fn disambiguate(&mut self, name: Option<&'static str>) -> Option<Arc<str>> {
        let base = name.filter(|n| !n.is_empty())?;
        let count = self.used_names.entry(base).or_insert(0);
        let disambiguated = if *count == 0 {
            base.to_string()
        } else {
            format!("{}-{}", base, *count)
        };
        *count += 1;
        Some(Arc::from(disambiguated))
    }

    pub(crate) fn next_thread(&mut self, name: Option<&'static str>) -> ThreadId {
        let num = self.next_thread;
        self.next_thread += 1;
        ThreadId {
            run: self.run,
            name: self.disambiguate(name),
            num,
        }
    }

    pub(crate) fn next_mvar(&mut self, name: Option<&'static str>) -> MVarId {
        let num = self.next_mvar;
        self.next_mvar += 1;
        MVarId {
            run: self.run,
            name: self.disambiguate(name),
            num,
        }
    }

    pub(crate) fn next_mref(&mut self, name: Option<&'static str>) -> MRefId {
        let num = self.next_mref;
        self.next_mref += 1;
        MRefId {
            run: self.run,
            name: self.disambiguate(name),
            num,
        }
    }

    pub(crate) fn next_tvar(&mut self, name: Option<&'static str>) -> TVarId {
        let num = self.next_tvar;
        self.next_tvar += 1;
        TVarId {
            run: self.run,
            name: self.disambiguate(name),
            num,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_ids_count_up() {
        let mut src = Source::new(RunId::first());
        let a = src.next_thread(None);
        let b = src.next_thread(None);
        assert_eq!(a.num(), 0);
        assert_eq!(b.num(), 1);
        assert_eq!(format!("{}", a), "0");
    }

    #[test]
    fn repeated_names_are_disambiguated() {
        let mut src = Source::new(RunId::first());
        let a = src.next_mvar(Some("buf"));
        let b = src.next_mvar(Some("buf"));
        let c = src.next_mvar(Some("buf"));
        assert_eq!(format!("{}", a), "buf");
        assert_eq!(format!("{}", b), "buf-1");
        assert_eq!(format!("{}", c), "buf-2");
    }

    #[test]
    fn ids_from_different_runs_are_unequal_even_with_same_number() {
        let mut a = Source::new(RunId::first());
        let mut b = Source::new(RunId::first().next());
        assert_ne!(a.next_thread(None), b.next_thread(None));
    }
}
