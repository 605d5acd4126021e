#![forbid(unsafe_code)]

//! Mutation adapter: the single writer of the composite state.
//!
//! Every mutation passes through [`MutationAdapter::set`], which clears the
//! getter cache, resolves the incoming argument against the current
//! composite, merges it with descriptor fidelity and forwards the result to
//! the container. [`MutationAdapter::absorb`] is the other way in: it folds
//! state written to the container behind the adapter's back into the
//! composite.
//!
//! # Invariants
//!
//! 1. The current pointer changes by single assignment only, and every
//!    change bumps the generation and clears the cache first.
//! 2. The cache is cleared before the update function runs, so no read made
//!    after a mutation starts observes a result from the previous generation.
//! 3. A failed update function leaves the current pointer, the generation
//!    and the container untouched.
//! 4. No `RefCell` borrow is held while an updater or the container runs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::container::{SetArg, StateContainer};
use crate::error::Result;
use crate::merge::merge;
use crate::record::Record;
use crate::view::GetterCache;

pub struct MutationAdapter {
    current: RefCell<Rc<Record>>,
    generation: Cell<u64>,
    cache: Rc<GetterCache>,
    raw: Rc<dyn StateContainer>,
    name: String,
}

impl fmt::Debug for MutationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationAdapter")
            .field("name", &self.name)
            .field("generation", &self.generation.get())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl MutationAdapter {
    pub fn new(
        raw: Rc<dyn StateContainer>,
        initial: Rc<Record>,
        cache: Rc<GetterCache>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            current: RefCell::new(initial),
            generation: Cell::new(0),
            cache,
            raw,
            name: name.into(),
        }
    }

    /// The current composite record.
    #[must_use]
    pub fn current(&self) -> Rc<Record> {
        Rc::clone(&self.current.borrow())
    }

    /// Number of swaps of the current pointer so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    #[must_use]
    pub fn cache(&self) -> &Rc<GetterCache> {
        &self.cache
    }

    /// The container underneath.
    #[must_use]
    pub fn raw(&self) -> &Rc<dyn StateContainer> {
        &self.raw
    }

    /// Apply a mutation.
    ///
    /// A draft updater (one returning `Ok(None)`) is forwarded to the
    /// container unchanged, and whatever the container ends up holding is
    /// then absorbed, so the composite is current when `set` returns.
    pub fn set(&self, partial: SetArg, replace: bool) -> Result<()> {
        self.clear_cache();

        let resolved = match &partial {
            SetArg::Value(record) => Some(Rc::clone(record)),
            SetArg::Update(updater) => {
                let mut scratch = (*self.current()).clone();
                updater.apply(&mut scratch)?.map(Rc::new)
            }
        };
        let Some(next) = resolved else {
            #[cfg(feature = "tracing")]
            log_set(&self.name, self.generation(), replace, true);
            self.raw.set_state(partial, replace)?;
            let raw = self.raw.state();
            let current = self.current();
            if !Rc::ptr_eq(&raw, &current) && crate::sync::diverges(&current, &raw) {
                self.absorb(&raw);
            }
            return Ok(());
        };

        let merged = Rc::new(merge(&self.current(), &next, replace));
        self.swap(Rc::clone(&merged));

        #[cfg(feature = "tracing")]
        log_set(&self.name, self.generation(), replace, false);

        self.raw.set_state(SetArg::Value(merged), replace)
    }

    /// Fold foreign container state into the composite without disturbing
    /// accessors.
    pub fn absorb(&self, raw: &Record) {
        self.clear_cache();
        let merged = merge(&self.current(), raw, false);
        self.swap(Rc::new(merged));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            message = "getters.absorb",
            store = %self.name,
            generation = self.generation(),
        );
    }

    fn clear_cache(&self) {
        #[cfg(feature = "tracing")]
        {
            if !self.cache.is_empty() {
                tracing::trace!(
                    message = "getters.cache_clear",
                    store = %self.name,
                    entries = self.cache.len(),
                );
            }
        }
        self.cache.clear();
    }

    fn swap(&self, next: Rc<Record>) {
        *self.current.borrow_mut() = next;
        self.generation.set(self.generation.get() + 1);
    }
}

#[cfg(feature = "tracing")]
fn log_set(store: &str, generation: u64, replace: bool, draft: bool) {
    tracing::debug!(
        message = "getters.set",
        store,
        generation,
        replace,
        draft,
    );
}
