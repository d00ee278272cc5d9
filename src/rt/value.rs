//! Dynamically typed values flowing through the action algebra.
//!
//! `spec.md` §9 prescribes representing user exceptions as "a tagged value
//! carrying a type tag plus a down-cast"; `braid` applies the same trick to
//! every value the interpreter holds without knowing its concrete type: MVar
//! contents, MRef contents, TVar contents, and the payload passed to a
//! continuation closure. Backed by `Arc<dyn Any + Send + Sync>` so the
//! handle is cheap to clone (needed for non-consuming reads like `readMVar`
//! and `readMR`); extracting a typed copy requires the value to be `Clone`,
//! which every public constructor (`new_mvar`, `new_mref`, `new_tvar`, ...)
//! requires of its caller.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct Shared(Arc<dyn Any + Send + Sync>);

impl Shared {
    pub(crate) fn new<T: Send + Sync + 'static>(value: T) -> Shared {
        Shared(Arc::new(value))
    }

    pub(crate) fn unit() -> Shared {
        Shared::new(())
    }

    pub(crate) fn downcast_clone<T: Clone + Send + Sync + 'static>(&self) -> T {
        self.0
            .downcast_ref::<T>()
            .unwrap_or_else(|| panic!("braid: dynamic value downcast mismatch"))
            .clone()
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared(..)")
    }
}
