#![forbid(unsafe_code)]

//! Reactive getters: descriptor-preserving computed accessors layered over a
//! minimal state container.
//!
//! A [`Store`] wraps any [`StateContainer`]. The state is a [`Record`] of
//! plain fields, actions, and computed accessors. Reads go through a
//! [`ReactiveView`] that evaluates accessors against the latest state;
//! mutations go through a [`SetFn`] that never downgrades an accessor into
//! a stale snapshot.
//!
//! Everything is single-threaded (`Rc`/`RefCell`).

pub mod adapter;
pub mod config;
pub mod container;
pub mod error;
pub mod merge;
pub mod record;
pub mod store;
pub mod sync;
pub mod value;
pub mod vanilla;
pub mod view;

pub use adapter::MutationAdapter;
pub use config::{CachePolicy, StoreConfig};
pub use container::{Listener, SetArg, StateContainer, Subscription, Updater, listener};
pub use error::{Error, Result};
pub use merge::merge;
pub use record::{Accessor, Derivable, Descriptor, Record, Slot, SlotKind};
pub use store::{GetFn, SetFn, Store};
pub use sync::SyncGuard;
pub use value::{Action, Value};
pub use vanilla::VanillaStore;
pub use view::{AccessEvent, GetterCache, Reading, ReactiveView, Scope};

pub mod prelude {
    pub use crate::{
        CachePolicy, Error, Record, Result, SetArg, StateContainer, Store, StoreConfig, Updater,
        Value, VanillaStore,
    };
}
