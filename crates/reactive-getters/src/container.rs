#![forbid(unsafe_code)]

//! Contract with the external state container.
//!
//! The store does not own notification delivery or persistence. It talks to
//! whatever sits underneath it through [`StateContainer`]: a state accessor,
//! a raw mutation entry point, and listener registration. [`Store`] itself
//! implements the trait, so layers can be stacked in any order.
//!
//! [`Store`]: crate::store::Store

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::record::Record;

/// Update function accepted by the mutation entry points.
///
/// Two conventions are supported:
///
/// - **immutable**: build a new record and return `Ok(Some(next))`;
/// - **draft**: mutate the argument in place and return `Ok(None)`.
///
/// An updater may be applied more than once (the store resolves it, then the
/// container may apply it to its own draft), so it must not have side effects
/// outside the record it is given.
#[derive(Clone)]
pub struct Updater(Rc<dyn Fn(&mut Record) -> Result<Option<Record>>>);

impl Updater {
    pub fn new(f: impl Fn(&mut Record) -> Result<Option<Record>> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Immutable convention: derive the next record from the current one.
    pub fn returning(f: impl Fn(&Record) -> Result<Record> + 'static) -> Self {
        Self::new(move |state| f(state).map(Some))
    }

    /// Draft convention: mutate in place, produce no value.
    pub fn draft(f: impl Fn(&mut Record) -> Result<()> + 'static) -> Self {
        Self::new(move |state| f(state).map(|()| None))
    }

    pub fn apply(&self, draft: &mut Record) -> Result<Option<Record>> {
        (self.0)(draft)
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Updater(..)")
    }
}

/// Argument of a mutation: a (partial or full) record, or an update function.
#[derive(Clone, Debug)]
pub enum SetArg {
    Value(Rc<Record>),
    Update(Updater),
}

impl From<Record> for SetArg {
    fn from(record: Record) -> Self {
        Self::Value(Rc::new(record))
    }
}

impl From<Rc<Record>> for SetArg {
    fn from(record: Rc<Record>) -> Self {
        Self::Value(record)
    }
}

impl From<Updater> for SetArg {
    fn from(updater: Updater) -> Self {
        Self::Update(updater)
    }
}

/// Change listener, called with `(next, prev)` after every accepted mutation.
pub type Listener = Rc<dyn Fn(&Rc<Record>, &Rc<Record>)>;

/// Wrap a closure as a [`Listener`].
pub fn listener(f: impl Fn(&Rc<Record>, &Rc<Record>) + 'static) -> Listener {
    Rc::new(f)
}

/// RAII guard that runs its release hook on drop.
///
/// Returned by listener and access-callback registration; dropping it
/// unregisters the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release.
    pub fn empty() -> Self {
        Self { release: None }
    }

    /// Release now instead of at drop.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// The external state container.
pub trait StateContainer {
    /// The container's last-written state.
    fn state(&self) -> Rc<Record>;

    /// Raw mutation entry point. `replace` selects whole-state replacement
    /// instead of a shallow merge.
    fn set_state(&self, partial: SetArg, replace: bool) -> Result<()>;

    /// Register a change listener.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

impl<C: StateContainer + ?Sized> StateContainer for Rc<C> {
    fn state(&self) -> Rc<Record> {
        (**self).state()
    }

    fn set_state(&self, partial: SetArg, replace: bool) -> Result<()> {
        (**self).set_state(partial, replace)
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        (**self).subscribe(listener)
    }
}
