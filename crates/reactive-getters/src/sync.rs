#![forbid(unsafe_code)]

//! Reconciliation of the composite with foreign container state.
//!
//! Collaborators (rehydration, devtools, other layers) may write to the
//! container directly. Before each canonical read the [`SyncGuard`]
//! compares the container's raw state with the composite and, when a plain
//! field differs, absorbs the raw state through the mutation adapter.
//!
//! Only keys present in the raw state and not accessors in the composite
//! take part in the comparison. Values are compared by identity
//! ([`Value::same`](crate::value::Value::same)), so an absorb never evaluates anything.

use std::cell::Cell;
use std::rc::Rc;

use crate::adapter::MutationAdapter;
use crate::record::{Record, Slot};

/// Re-entrancy-safe reconciler.
#[derive(Debug, Default)]
pub struct SyncGuard {
    reconciling: Cell<bool>,
}

/// Clears the in-progress flag on drop.
struct Held<'a>(&'a Cell<bool>);

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl SyncGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a reconciliation is running on this guard right now.
    #[must_use]
    pub fn is_reconciling(&self) -> bool {
        self.reconciling.get()
    }

    /// Absorb the container's state if it has diverged from the composite.
    ///
    /// Returns `true` when an absorb happened. Nested calls made while a
    /// reconciliation is in progress return `false` immediately.
    pub fn reconcile(&self, adapter: &MutationAdapter) -> bool {
        let Some(_held) = self.enter() else {
            return false;
        };

        let raw = adapter.raw().state();
        let current = adapter.current();
        if Rc::ptr_eq(&raw, &current) || !diverges(&current, &raw) {
            return false;
        }
        adapter.absorb(&raw);
        true
    }

    fn enter(&self) -> Option<Held<'_>> {
        if self.reconciling.replace(true) {
            return None;
        }
        Some(Held(&self.reconciling))
    }
}

/// Whether `raw` holds a plain value the composite does not.
#[must_use]
pub fn diverges(composite: &Record, raw: &Record) -> bool {
    raw.iter().any(|(key, slot)| {
        let Slot::Field(incoming) = slot else {
            return false;
        };
        match composite.slot(key) {
            Some(Slot::Accessor(_)) => false,
            Some(Slot::Field(known)) => !incoming.same(known),
            None => true,
        }
    })
}
