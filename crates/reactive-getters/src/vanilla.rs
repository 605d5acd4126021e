#![forbid(unsafe_code)]

//! Minimal reference container.
//!
//! [`VanillaStore`] is the innermost layer used by tests and simple
//! embeddings: one state pointer, a raw `set_state`, and listeners.
//!
//! # Semantics
//!
//! 1. Setting the identical `Rc` that is already current is a no-op: no
//!    swap, no notification.
//! 2. Update functions run against a draft copy. `Some(next)` is used as the
//!    incoming value; `None` commits the mutated draft.
//! 3. `replace == false` is a slot-level shallow assign; `replace == true`
//!    stores the incoming record as-is.
//! 4. Listeners run in registration order against a snapshot of the listener
//!    list, so they may subscribe, unsubscribe, or mutate re-entrantly.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::container::{Listener, SetArg, StateContainer, Subscription};
use crate::error::Result;
use crate::record::Record;

struct VanillaInner {
    state: RefCell<Rc<Record>>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_listener_id: Cell<u64>,
    version: Cell<u64>,
}

/// Reference implementation of [`StateContainer`].
///
/// Cloning a `VanillaStore` creates another handle to the **same** state.
#[derive(Clone)]
pub struct VanillaStore {
    inner: Rc<VanillaInner>,
}

impl Default for VanillaStore {
    fn default() -> Self {
        Self::new(Record::new())
    }
}

impl std::fmt::Debug for VanillaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VanillaStore")
            .field("state", &self.inner.state.borrow())
            .field("listeners", &self.inner.listeners.borrow().len())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl VanillaStore {
    #[must_use]
    pub fn new(initial: Record) -> Self {
        Self {
            inner: Rc::new(VanillaInner {
                state: RefCell::new(Rc::new(initial)),
                listeners: RefCell::new(Vec::new()),
                next_listener_id: Cell::new(0),
                version: Cell::new(0),
            }),
        }
    }

    /// Number of accepted mutations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn notify(&self, next: &Rc<Record>, prev: &Rc<Record>) {
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            listener(next, prev);
        }
    }
}

impl StateContainer for VanillaStore {
    fn state(&self) -> Rc<Record> {
        Rc::clone(&self.inner.state.borrow())
    }

    fn set_state(&self, partial: SetArg, replace: bool) -> Result<()> {
        let prev = self.state();
        let incoming = match partial {
            SetArg::Value(record) => record,
            SetArg::Update(updater) => {
                let mut draft = (*prev).clone();
                match updater.apply(&mut draft)? {
                    Some(next) => Rc::new(next),
                    None => Rc::new(draft),
                }
            }
        };
        if Rc::ptr_eq(&incoming, &prev) {
            return Ok(());
        }

        let next = if replace {
            incoming
        } else {
            Rc::new(prev.assign(&incoming))
        };
        *self.inner.state.borrow_mut() = Rc::clone(&next);
        self.inner.version.set(self.inner.version.get() + 1);
        self.notify(&next, &prev);
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_listener_id.get();
        self.inner.next_listener_id.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, listener));

        let weak: Weak<VanillaInner> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
            }
        })
    }
}
