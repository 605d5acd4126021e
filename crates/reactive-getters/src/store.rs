#![forbid(unsafe_code)]

//! The getters store: a decorator over any [`StateContainer`].
//!
//! [`Store::create`] runs the user's initializer once, seeds the container
//! with the resulting composite record, and from then on:
//!
//! - [`Store::get_state`] returns one long-lived [`ReactiveView`] that
//!   resolves accessors against the latest composite;
//! - mutations made through [`SetFn`] (or [`Store::set`]) go through the
//!   mutation adapter, which keeps every accessor intact;
//! - writes made to the container directly are absorbed on the next read.
//!
//! `Store<C>` implements [`StateContainer`] itself, so it can sit anywhere
//! in a stack of layers: `state()` yields the composite, everything else is
//! delegated to `C`.
//!
//! # Example
//!
//! ```
//! use reactive_getters::{Record, Store, Value, VanillaStore};
//!
//! let store = Store::create(VanillaStore::default(), |set, _get, _api| {
//!     Record::new()
//!         .field("count", 5)
//!         .accessor("double", |s| Ok(Value::from(s.int("count")? * 2)))
//!         .action("increment", move |_| {
//!             set.update(|s| Ok(Record::new().field("count", s.int("count")? + 1)))
//!         })
//! })?;
//!
//! let state = store.get_state();
//! assert_eq!(state.int("double")?, 10);
//! state.call("increment", &[])?;
//! assert_eq!(state.int("double")?, 12);
//! # Ok::<(), reactive_getters::Error>(())
//! ```

use std::fmt;
use std::rc::{Rc, Weak};

use crate::adapter::MutationAdapter;
use crate::config::StoreConfig;
use crate::container::{Listener, SetArg, StateContainer, Subscription, Updater};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::sync::SyncGuard;
use crate::view::{GetterCache, ReactiveView};

struct Shared {
    adapter: MutationAdapter,
    sync: SyncGuard,
    view: ReactiveView,
    config: StoreConfig,
}

impl Shared {
    /// The composite after absorbing any foreign container state.
    fn latest(&self) -> Rc<Record> {
        self.sync.reconcile(&self.adapter);
        self.adapter.current()
    }

    fn set(&self, partial: SetArg, replace: bool) -> Result<()> {
        if self.config.reconcile_before_set {
            self.sync.reconcile(&self.adapter);
        }
        self.adapter.set(partial, replace)
    }
}

// ---------------------------------------------------------------------------
// Handles given to the initializer
// ---------------------------------------------------------------------------

/// Mutation handle passed to the initializer.
///
/// Holds the store weakly, so actions that capture it do not keep the store
/// alive. Calls made before [`Store::create`] returns, or after the store is
/// dropped, fail with [`Error::StoreDropped`].
#[derive(Clone)]
pub struct SetFn {
    shared: Weak<Shared>,
}

impl fmt::Debug for SetFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetFn")
            .field("live", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl SetFn {
    fn upgrade(&self) -> Result<Rc<Shared>> {
        self.shared.upgrade().ok_or(Error::StoreDropped)
    }

    /// Mutate through the adapter.
    ///
    /// Unless `replace` is set, accessors in `partial` are dropped for keys
    /// that are not accessors already; declare accessors in the initializer.
    pub fn set(&self, partial: impl Into<SetArg>, replace: bool) -> Result<()> {
        self.upgrade()?.set(partial.into(), replace)
    }

    /// Shallow-merge `partial` into the composite. Plain fields are merged;
    /// accessors in `partial` are dropped, so the composite keeps exactly the
    /// accessors it was created with.
    pub fn merge(&self, partial: Record) -> Result<()> {
        self.set(partial, false)
    }

    /// Replace the composite wholesale. `next` must declare any accessors it
    /// wants to keep.
    pub fn replace(&self, next: Record) -> Result<()> {
        self.set(next, true)
    }

    /// Immutable update: derive a partial record from the current one.
    pub fn update(&self, f: impl Fn(&Record) -> Result<Record> + 'static) -> Result<()> {
        self.set(Updater::returning(f), false)
    }

    /// Draft update: mutate a copy of the state in place.
    pub fn mutate(&self, f: impl Fn(&mut Record) -> Result<()> + 'static) -> Result<()> {
        self.set(Updater::draft(f), false)
    }
}

/// Read handle passed to the initializer. Same lifetime rules as [`SetFn`].
#[derive(Clone)]
pub struct GetFn {
    shared: Weak<Shared>,
}

impl fmt::Debug for GetFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetFn")
            .field("live", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl GetFn {
    /// The current composite record.
    pub fn get(&self) -> Result<Rc<Record>> {
        let shared = self.shared.upgrade().ok_or(Error::StoreDropped)?;
        Ok(shared.latest())
    }

    /// The store's reactive view, for reading accessors from inside actions.
    pub fn view(&self) -> Result<ReactiveView> {
        let shared = self.shared.upgrade().ok_or(Error::StoreDropped)?;
        Ok(shared.view.clone())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A state container decorated with computed accessors.
///
/// Cloning a `Store` creates another handle to the **same** store.
pub struct Store<C> {
    shared: Rc<Shared>,
    inner: Rc<C>,
    /// Keeps the default access callback registered.
    _access_hook: Rc<Subscription>,
}

impl<C> Clone for Store<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            inner: Rc::clone(&self.inner),
            _access_hook: Rc::clone(&self._access_hook),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for Store<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.shared.config.name)
            .field("adapter", &self.shared.adapter)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<C: StateContainer + 'static> Store<C> {
    /// Build a store over `container` with the default configuration.
    ///
    /// `init` runs exactly once and returns the initial composite record,
    /// accessors and actions included.
    pub fn create<F>(container: C, init: F) -> Result<Self>
    where
        F: FnOnce(SetFn, GetFn, &C) -> Record,
    {
        Self::with_config(container, StoreConfig::default(), init)
    }

    pub fn with_config<F>(container: C, config: StoreConfig, init: F) -> Result<Self>
    where
        F: FnOnce(SetFn, GetFn, &C) -> Record,
    {
        let inner = Rc::new(container);
        let raw: Rc<dyn StateContainer> = inner.clone();
        let cache = Rc::new(GetterCache::new());
        let policy = config.cache_policy;

        let shared = Rc::new_cyclic(|weak: &Weak<Shared>| {
            let initial = init(
                SetFn {
                    shared: weak.clone(),
                },
                GetFn {
                    shared: weak.clone(),
                },
                &*inner,
            );

            let source = weak.clone();
            let view = ReactiveView::new(
                move || match source.upgrade() {
                    Some(shared) => shared.latest(),
                    None => Rc::new(Record::new()),
                },
                Rc::clone(&cache),
                policy,
            );

            Shared {
                adapter: MutationAdapter::new(
                    raw,
                    Rc::new(initial),
                    cache,
                    config.name.clone(),
                ),
                sync: SyncGuard::new(),
                view,
                config,
            }
        });

        inner.set_state(SetArg::Value(shared.adapter.current()), true)?;

        let access_hook = if shared.config.notify_on_access {
            register_access_hook(&shared)
        } else {
            Subscription::empty()
        };

        Ok(Self {
            shared,
            inner,
            _access_hook: Rc::new(access_hook),
        })
    }

    /// The long-lived reactive view over the latest composite.
    #[must_use]
    pub fn get_state(&self) -> ReactiveView {
        self.shared.sync.reconcile(&self.shared.adapter);
        self.shared.view.clone()
    }

    /// The latest composite record, with accessors unevaluated.
    #[must_use]
    pub fn composite(&self) -> Rc<Record> {
        self.shared.latest()
    }

    /// Mutate through the adapter; same as [`SetFn::set`], including the
    /// rule that a non-replacing write cannot introduce new accessors.
    pub fn set(&self, partial: impl Into<SetArg>, replace: bool) -> Result<()> {
        self.shared.set(partial.into(), replace)
    }

    #[must_use]
    pub fn set_fn(&self) -> SetFn {
        SetFn {
            shared: Rc::downgrade(&self.shared),
        }
    }

    #[must_use]
    pub fn get_fn(&self) -> GetFn {
        GetFn {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// The decorated container.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Number of composite swaps so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.adapter.generation()
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }
}

impl<C: StateContainer + 'static> StateContainer for Store<C> {
    fn state(&self) -> Rc<Record> {
        self.composite()
    }

    /// Raw write to the inner container. Writing back this store's own
    /// composite is an identity update and does nothing.
    fn set_state(&self, partial: SetArg, replace: bool) -> Result<()> {
        if let SetArg::Value(record) = &partial
            && !replace
            && Rc::ptr_eq(record, &self.shared.adapter.current())
        {
            return Ok(());
        }
        self.inner.set_state(partial, replace)
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.inner.subscribe(listener)
    }
}

/// Poke the container with an identity update whenever an accessor is
/// evaluated, so layers below observe reads of computed values.
fn register_access_hook(shared: &Rc<Shared>) -> Subscription {
    let weak = Rc::downgrade(shared);
    shared.view.on_access(move |event| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let raw = shared.adapter.raw();
        if let Err(err) = raw.set_state(SetArg::Value(raw.state()), false) {
            tracing::warn!(
                message = "getters.access_hook_failed",
                store = %shared.config.name,
                key = event.key,
                error = %err,
            );
        }
    })
}
