#![forbid(unsafe_code)]

//! Read-through views that resolve computed accessors transparently.
//!
//! # Design
//!
//! A [`ReactiveView`] holds no state of its own. Every read first pulls the
//! latest composite record from its source function, then:
//!
//! - a plain field is returned as-is;
//! - a plain field holding a nested record is returned as a nested view,
//!   one per record instance;
//! - an accessor is evaluated against that same latest record through a
//!   [`Scope`], after consulting the generation-scoped [`GetterCache`].
//!
//! # Invariants
//!
//! 1. An accessor read never returns a value computed against a record older
//!    than the one current when the read started.
//! 2. Within one cache epoch, an accessor whose result the cache policy keeps
//!    is evaluated at most once; repeated reads return the same allocation.
//! 3. A result computed while the cache was cleared underneath it is
//!    returned but not cached.
//! 4. Introspection (`keys`, `has_key`, `descriptor`) always reflects the
//!    latest record.
//! 5. No `RefCell` borrow is held while user code (derivations, access
//!    callbacks) runs.
//!
//! # Failure Modes
//!
//! - **Derivation fails**: the error is returned unmodified and nothing is
//!   cached.
//! - **Cyclic accessors**: not detected. An accessor that (transitively)
//!   reads itself recurses until the stack is exhausted.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::CachePolicy;
use crate::container::Subscription;
use crate::error::{Error, Result};
use crate::record::{Accessor, Descriptor, Record, Slot, typed};
use crate::value::Value;

pub(crate) type LatestFn = Rc<dyn Fn() -> Rc<Record>>;

// ---------------------------------------------------------------------------
// Getter cache
// ---------------------------------------------------------------------------

/// Accessor results for the current generation, keyed by accessor path.
///
/// Shared between the mutation adapter, which clears it at every generation
/// boundary, and all views of one store.
#[derive(Default)]
pub struct GetterCache {
    entries: RefCell<HashMap<Vec<String>, Value>>,
    /// Bumped on every clear.
    epoch: Cell<u64>,
}

impl fmt::Debug for GetterCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterCache")
            .field("entries", &self.entries.borrow().len())
            .field("epoch", &self.epoch.get())
            .finish()
    }
}

impl GetterCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, path: &[String]) -> Option<Value> {
        self.entries.borrow().get(path).cloned()
    }

    /// Drop every entry and start a new epoch.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.epoch.set(self.epoch.get() + 1);
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Store `value` unless the cache was cleared since `epoch` was read.
    fn insert_if_current(&self, epoch: u64, path: Vec<String>, value: Value) -> bool {
        if self.epoch.get() != epoch {
            return false;
        }
        self.entries.borrow_mut().insert(path, value);
        true
    }
}

// ---------------------------------------------------------------------------
// Access callbacks
// ---------------------------------------------------------------------------

/// Passed to access callbacks when an accessor is about to be evaluated.
#[derive(Debug, Clone, Copy)]
pub struct AccessEvent<'a> {
    /// Path of the view the accessor was read through; empty at the root.
    pub path: &'a [String],
    pub key: &'a str,
}

type AccessCallback = Rc<dyn Fn(&AccessEvent<'_>)>;

#[derive(Default)]
struct AccessHooks {
    entries: RefCell<Vec<(u64, AccessCallback)>>,
    next_id: Cell<u64>,
}

impl AccessHooks {
    fn register(self: &Rc<Self>, callback: AccessCallback) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, callback));

        let weak: Weak<Self> = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(hooks) = weak.upgrade() {
                hooks.entries.borrow_mut().retain(|(hid, _)| *hid != id);
            }
        })
    }

    fn fire(&self, event: &AccessEvent<'_>) {
        let snapshot: Vec<AccessCallback> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

// ---------------------------------------------------------------------------
// Reactive view
// ---------------------------------------------------------------------------

struct NestedEntry {
    instance: Weak<Record>,
    view: ReactiveView,
}

impl NestedEntry {
    /// The weak reference keeps the allocation reserved, so an address match
    /// means the same instance.
    fn holds(&self, instance: &Rc<Record>) -> bool {
        std::ptr::eq(self.instance.as_ptr(), Rc::as_ptr(instance))
    }
}

struct ViewInner {
    latest: LatestFn,
    path: Vec<String>,
    cache: Rc<GetterCache>,
    hooks: Rc<AccessHooks>,
    policy: CachePolicy,
    nested: RefCell<HashMap<String, NestedEntry>>,
}

impl ViewInner {
    fn cache_key(&self, key: &str) -> Vec<String> {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend(self.path.iter().cloned());
        path.push(key.to_owned());
        path
    }

    fn qualified(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{}", self.path.join("."), key)
        }
    }

    fn resolve(&self, state: &Rc<Record>, key: &str) -> Result<Value> {
        match state.slot(key) {
            Some(Slot::Accessor(accessor)) => self.evaluate(state, key, accessor),
            Some(Slot::Field(value)) => Ok(value.clone()),
            None => Err(Error::missing(self.qualified(key))),
        }
    }

    fn evaluate(&self, state: &Rc<Record>, key: &str, accessor: &Accessor) -> Result<Value> {
        let cache_key = self.cache_key(key);
        if let Some(hit) = self.cache.get(&cache_key) {
            return Ok(hit);
        }

        // Read before the callbacks run: a callback may mutate the store.
        let epoch = self.cache.epoch();
        self.hooks.fire(&AccessEvent {
            path: &self.path,
            key,
        });

        let this = Scope { view: self, state };
        let result = accessor.evaluate(&this)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            message = "getters.evaluate",
            key = %self.qualified(key),
            kind = result.kind(),
        );

        if self.policy.should_cache(&result) {
            self.cache.insert_if_current(epoch, cache_key, result.clone());
        }
        Ok(result)
    }
}

/// Result of reading one key through a [`ReactiveView`].
#[derive(Clone, Debug)]
pub enum Reading {
    /// A plain value or an evaluated accessor result.
    Value(Value),
    /// A nested plain record, wrapped in its own view.
    Nested(ReactiveView),
}

impl Reading {
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Nested(_) => None,
        }
    }

    #[must_use]
    pub fn into_nested(self) -> Option<ReactiveView> {
        match self {
            Self::Nested(view) => Some(view),
            Self::Value(_) => None,
        }
    }

    /// Collapse to a plain value; nested views yield their current record.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Nested(view) => Value::Record(view.latest()),
        }
    }
}

/// A read-through view over the latest composite state.
///
/// Cloning a `ReactiveView` creates a new handle to the **same** view;
/// [`ptr_eq`](Self::ptr_eq) tells handles of one view apart from another.
#[derive(Clone)]
pub struct ReactiveView {
    inner: Rc<ViewInner>,
}

impl fmt::Debug for ReactiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveView")
            .field("path", &self.inner.path)
            .field("policy", &self.inner.policy)
            .field("nested", &self.inner.nested.borrow().len())
            .field("access_hooks", &self.inner.hooks.len())
            .finish()
    }
}

impl ReactiveView {
    /// Create a root view.
    ///
    /// `latest` is called at the start of every read and must return the
    /// current composite record. Access callbacks are registered separately
    /// with [`on_access`](Self::on_access).
    pub fn new(
        latest: impl Fn() -> Rc<Record> + 'static,
        cache: Rc<GetterCache>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            inner: Rc::new(ViewInner {
                latest: Rc::new(latest),
                path: Vec::new(),
                cache,
                hooks: Rc::new(AccessHooks::default()),
                policy,
                nested: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The record this view currently reads from.
    #[must_use]
    pub fn latest(&self) -> Rc<Record> {
        (self.inner.latest)()
    }

    /// Key path from the root view; empty for the root.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.inner.path
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a callback fired whenever an accessor is evaluated (a cache
    /// miss) through this view or any of its nested views.
    pub fn on_access(&self, callback: impl Fn(&AccessEvent<'_>) + 'static) -> Subscription {
        self.inner.hooks.register(Rc::new(callback))
    }

    // -- reads ----------------------------------------------------------

    pub fn read(&self, key: &str) -> Result<Reading> {
        let state = self.latest();
        match state.slot(key) {
            Some(Slot::Accessor(accessor)) => self
                .inner
                .evaluate(&state, key, accessor)
                .map(Reading::Value),
            Some(Slot::Field(Value::Record(instance))) => {
                Ok(Reading::Nested(self.nested_view(key, instance)))
            }
            Some(Slot::Field(value)) => Ok(Reading::Value(value.clone())),
            None => Err(Error::missing(self.inner.qualified(key))),
        }
    }

    /// Read a value, resolving accessors; nested records come back as plain
    /// [`Value::Record`]s.
    pub fn get(&self, key: &str) -> Result<Value> {
        let state = self.latest();
        self.inner.resolve(&state, key)
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        let value = self.get(key)?;
        typed(&self.inner.qualified(key), &value, "int", Value::as_int)
    }

    pub fn float(&self, key: &str) -> Result<f64> {
        let value = self.get(key)?;
        typed(&self.inner.qualified(key), &value, "float", Value::as_float)
    }

    pub fn boolean(&self, key: &str) -> Result<bool> {
        let value = self.get(key)?;
        typed(&self.inner.qualified(key), &value, "bool", Value::as_bool)
    }

    pub fn str(&self, key: &str) -> Result<Rc<str>> {
        let value = self.get(key)?;
        typed(&self.inner.qualified(key), &value, "str", |v| match v {
            Value::Str(s) => Some(Rc::clone(s)),
            _ => None,
        })
    }

    pub fn list(&self, key: &str) -> Result<Rc<Vec<Value>>> {
        let value = self.get(key)?;
        typed(&self.inner.qualified(key), &value, "list", |v| {
            v.as_list().cloned()
        })
    }

    /// The nested view for a plain record field.
    pub fn child(&self, key: &str) -> Result<ReactiveView> {
        match self.read(key)? {
            Reading::Nested(view) => Ok(view),
            Reading::Value(value) => Err(Error::mismatch(
                self.inner.qualified(key),
                "record",
                value.kind(),
            )),
        }
    }

    /// Invoke the action stored under `key`.
    pub fn call(&self, key: &str, args: &[Value]) -> Result<()> {
        match self.get(key)? {
            Value::Action(action) => action.call(args),
            _ => Err(Error::NotAnAction {
                key: self.inner.qualified(key),
            }),
        }
    }

    // -- introspection --------------------------------------------------

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.latest().keys().map(str::to_owned).collect()
    }

    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.latest().contains_key(key)
    }

    #[must_use]
    pub fn descriptor(&self, key: &str) -> Option<Descriptor> {
        self.latest().descriptor(key)
    }

    #[must_use]
    pub fn is_accessor(&self, key: &str) -> bool {
        self.latest().is_accessor(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.latest().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest().is_empty()
    }

    // -- nested views ---------------------------------------------------

    fn nested_view(&self, key: &str, instance: &Rc<Record>) -> ReactiveView {
        let cached = self
            .inner
            .nested
            .borrow()
            .get(key)
            .filter(|entry| entry.holds(instance))
            .map(|entry| entry.view.clone());
        if let Some(view) = cached {
            return view;
        }

        let parent = Rc::clone(&self.inner.latest);
        let field = key.to_owned();
        let latest: LatestFn = Rc::new(move || {
            parent()
                .value(&field)
                .and_then(Value::as_record)
                .cloned()
                .unwrap_or_default()
        });
        let mut path = self.inner.path.clone();
        path.push(key.to_owned());

        let view = ReactiveView {
            inner: Rc::new(ViewInner {
                latest,
                path,
                cache: Rc::clone(&self.inner.cache),
                hooks: Rc::clone(&self.inner.hooks),
                policy: self.inner.policy,
                nested: RefCell::new(HashMap::new()),
            }),
        };
        self.inner.nested.borrow_mut().insert(
            key.to_owned(),
            NestedEntry {
                instance: Rc::downgrade(instance),
                view: view.clone(),
            },
        );
        view
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// The self-reference handed to a derivation.
///
/// Reads resolve against the record that was current when the outer read
/// started. Accessor reads go through the same cache as view reads, so a
/// chain of accessors is evaluated once per generation.
pub struct Scope<'a> {
    view: &'a ViewInner,
    state: &'a Rc<Record>,
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("path", &self.view.path)
            .field("state", self.state)
            .finish()
    }
}

impl Scope<'_> {
    /// The record this scope resolves against.
    #[must_use]
    pub fn state(&self) -> &Rc<Record> {
        self.state
    }

    pub fn get(&self, key: &str) -> Result<Value> {
        self.view.resolve(self.state, key)
    }

    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        typed(key, &self.get(key)?, "int", Value::as_int)
    }

    pub fn float(&self, key: &str) -> Result<f64> {
        typed(key, &self.get(key)?, "float", Value::as_float)
    }

    pub fn boolean(&self, key: &str) -> Result<bool> {
        typed(key, &self.get(key)?, "bool", Value::as_bool)
    }

    pub fn str(&self, key: &str) -> Result<Rc<str>> {
        typed(key, &self.get(key)?, "str", |v| match v {
            Value::Str(s) => Some(Rc::clone(s)),
            _ => None,
        })
    }

    pub fn list(&self, key: &str) -> Result<Rc<Vec<Value>>> {
        typed(key, &self.get(key)?, "list", |v| v.as_list().cloned())
    }

    /// The nested record under `key`, unevaluated: its plain fields are
    /// readable, but its accessors fail with [`Error::UnresolvedAccessor`].
    /// Read those through [`ReactiveView::child`] instead.
    pub fn record(&self, key: &str) -> Result<Rc<Record>> {
        typed(key, &self.get(key)?, "record", |v| v.as_record().cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A swappable record source standing in for the mutation adapter.
    struct Source {
        current: Rc<RefCell<Rc<Record>>>,
        cache: Rc<GetterCache>,
    }

    impl Source {
        fn new(record: Record) -> Self {
            Self {
                current: Rc::new(RefCell::new(Rc::new(record))),
                cache: Rc::new(GetterCache::new()),
            }
        }

        fn view(&self, policy: CachePolicy) -> ReactiveView {
            let current = Rc::clone(&self.current);
            ReactiveView::new(
                move || Rc::clone(&current.borrow()),
                Rc::clone(&self.cache),
                policy,
            )
        }

        fn swap(&self, f: impl FnOnce(&Record) -> Record) {
            self.cache.clear();
            let next = f(&self.current.borrow());
            *self.current.borrow_mut() = Rc::new(next);
        }
    }

    fn counted(counter: &Rc<Cell<u32>>) -> Rc<Cell<u32>> {
        Rc::clone(counter)
    }

    #[test]
    fn plain_and_computed_reads() {
        let src = Source::new(
            Record::new()
                .field("count", 5)
                .accessor("double", |s| Ok(Value::from(s.int("count")? * 2)))
                .accessor("triple", |s| Ok(Value::from(s.int("count")? * 3))),
        );
        let view = src.view(CachePolicy::default());
        assert_eq!(view.int("count").expect("count"), 5);
        assert_eq!(view.int("double").expect("double"), 10);
        assert_eq!(view.int("triple").expect("triple"), 15);

        src.swap(|r| r.clone().with("count", 6).expect("plain write"));
        assert_eq!(view.int("double").expect("double"), 12);
        assert_eq!(view.int("triple").expect("triple"), 18);
    }

    #[test]
    fn primitive_results_recompute_each_read() {
        let evals = Rc::new(Cell::new(0u32));
        let e = counted(&evals);
        let src = Source::new(Record::new().field("n", 1).accessor("n2", move |s| {
            e.set(e.get() + 1);
            Ok(Value::from(s.int("n")? * 2))
        }));
        let view = src.view(CachePolicy::ObjectsOnly);
        let _ = view.get("n2").expect("n2");
        let _ = view.get("n2").expect("n2");
        assert_eq!(evals.get(), 2);
        assert!(src.cache.is_empty());
    }

    #[test]
    fn object_results_are_stable_within_a_generation() {
        let src = Source::new(Record::new().field("n", 2).accessor("pair", |s| {
            let n = s.int("n")?;
            Ok(Value::list(vec![Value::Int(n), Value::Int(n + 1)]))
        }));
        let view = src.view(CachePolicy::ObjectsOnly);
        let first = view.get("pair").expect("pair");
        let second = view.get("pair").expect("pair");
        assert!(first.same(&second));

        src.swap(|r| r.clone().with("n", 3).expect("plain write"));
        let third = view.get("pair").expect("pair");
        assert!(!third.same(&first));
        assert_eq!(third, Value::list(vec![Value::Int(3), Value::Int(4)]));
    }

    #[test]
    fn chains_resolve_through_the_live_record() {
        let src = Source::new(
            Record::new()
                .field("value", 5)
                .accessor("double", |s| Ok(Value::from(s.int("value")? * 2)))
                .accessor("quadruple", |s| Ok(Value::from(s.int("double")? * 2))),
        );
        let view = src.view(CachePolicy::default());
        assert_eq!(view.int("quadruple").expect("quadruple"), 20);
        src.swap(|r| r.clone().with("value", 10).expect("plain write"));
        assert_eq!(view.int("double").expect("double"), 20);
        assert_eq!(view.int("quadruple").expect("quadruple"), 40);
    }

    #[test]
    fn diamond_evaluates_shared_dependency_once() {
        let base_evals = Rc::new(Cell::new(0u32));
        let e = counted(&base_evals);
        let src = Source::new(
            Record::new()
                .field("n", 10)
                .accessor("base", move |s| {
                    e.set(e.get() + 1);
                    Ok(Value::from(s.int("n")? + 1))
                })
                .accessor("left", |s| Ok(Value::from(s.int("base")? * 2)))
                .accessor("right", |s| Ok(Value::from(s.int("base")? * 3)))
                .accessor("sum", |s| Ok(Value::from(s.int("left")? + s.int("right")?))),
        );
        let view = src.view(CachePolicy::All);
        assert_eq!(view.int("sum").expect("sum"), 55);
        assert_eq!(view.int("sum").expect("sum"), 55);
        assert_eq!(base_evals.get(), 1);

        src.swap(|r| r.clone().with("n", 4).expect("plain write"));
        assert_eq!(view.int("sum").expect("sum"), 25);
        assert_eq!(base_evals.get(), 2);
    }

    #[test]
    fn disabled_policy_never_caches() {
        let src = Source::new(
            Record::new().accessor("items", |_| Ok(Value::list(vec![Value::Int(1)]))),
        );
        let view = src.view(CachePolicy::Disabled);
        let a = view.get("items").expect("items");
        let b = view.get("items").expect("items");
        assert!(!a.same(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn access_callbacks_fire_on_cache_misses_only() {
        let src = Source::new(
            Record::new()
                .field("plain", 1)
                .accessor("obj", |_| Ok(Value::list(vec![])))
                .accessor("prim", |_| Ok(Value::Int(1))),
        );
        let view = src.view(CachePolicy::ObjectsOnly);
        let seen = Rc::new(RefCell::new(Vec::<String>::new()));
        let s = Rc::clone(&seen);
        let sub = view.on_access(move |event| s.borrow_mut().push(event.key.to_owned()));

        let _ = view.get("plain").expect("plain");
        let _ = view.get("obj").expect("obj");
        let _ = view.get("obj").expect("obj");
        let _ = view.get("prim").expect("prim");
        let _ = view.get("prim").expect("prim");
        assert_eq!(*seen.borrow(), ["obj", "prim", "prim"]);

        drop(sub);
        src.swap(Record::clone);
        let _ = view.get("obj").expect("obj");
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn result_is_not_cached_across_a_clear() {
        let src = Source::new(Record::new().accessor("obj", |_| Ok(Value::list(vec![]))));
        let view = src.view(CachePolicy::ObjectsOnly);
        let cache = Rc::clone(&src.cache);
        // Simulates a generation boundary triggered by the access callback.
        let _sub = view.on_access(move |_| cache.clear());
        let _ = view.get("obj").expect("obj");
        assert!(src.cache.is_empty());
    }

    #[test]
    fn nested_views_are_cached_per_instance() {
        let settings = Record::new().field("theme", "light").field("language", "en");
        let src = Source::new(
            Record::new()
                .field("settings", settings)
                .accessor("display", |s| {
                    let settings = s.record("settings")?;
                    Ok(Value::from(format!(
                        "Theme: {}, Language: {}",
                        settings.str("theme")?,
                        settings.str("language")?
                    )))
                }),
        );
        let view = src.view(CachePolicy::default());
        let a = view.child("settings").expect("nested");
        let b = view.child("settings").expect("nested");
        assert!(a.ptr_eq(&b));
        assert_eq!(a.path(), ["settings".to_owned()]);
        assert_eq!(&*a.str("theme").expect("theme"), "light");

        src.swap(|r| {
            let settings = r.record("settings").expect("settings");
            let next = (*settings).clone().with("theme", "dark").expect("write");
            r.clone().with("settings", next).expect("write")
        });
        let c = view.child("settings").expect("nested");
        assert!(!c.ptr_eq(&a));
        assert_eq!(&*c.str("theme").expect("theme"), "dark");
        // The old handle still reads through its parent.
        assert_eq!(&*a.str("theme").expect("theme"), "dark");
        assert_eq!(
            &*view.str("display").expect("display"),
            "Theme: dark, Language: en"
        );
    }

    #[test]
    fn nested_accessors_resolve_against_the_nested_record() {
        let inner = Record::new()
            .field("price", 10)
            .field("qty", 3)
            .accessor("line_total", |s| Ok(Value::from(s.int("price")? * s.int("qty")?)));
        let src = Source::new(Record::new().field("line", inner));
        let view = src.view(CachePolicy::All);
        let line = view.child("line").expect("nested");
        assert_eq!(line.int("line_total").expect("total"), 30);
        assert!(src.cache.get(&["line".to_owned(), "line_total".to_owned()]).is_some());
    }

    #[test]
    fn missing_keys_and_non_actions_error() {
        let src = Source::new(Record::new().field("settings", Record::new()).field("n", 1));
        let view = src.view(CachePolicy::default());
        assert!(matches!(view.read("nope"), Err(Error::MissingKey { .. })));
        let nested = view.child("settings").expect("nested");
        match nested.get("theme") {
            Err(Error::MissingKey { key }) => assert_eq!(key, "settings.theme"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(view.call("n", &[]), Err(Error::NotAnAction { .. })));
        assert!(matches!(view.child("n"), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn nested_accessor_through_scope_record_is_unresolved() {
        let line = Record::new()
            .field("price", 10)
            .accessor("line_total", |s| Ok(Value::from(s.int("price")? * 2)));
        let src = Source::new(
            Record::new()
                .field("line", line)
                .accessor("price_copy", |s| Ok(Value::from(s.record("line")?.int("price")?)))
                .accessor("total_copy", |s| Ok(Value::from(s.record("line")?.int("line_total")?))),
        );
        let view = src.view(CachePolicy::default());
        assert_eq!(view.int("price_copy").expect("plain nested field"), 10);
        match view.get("total_copy") {
            Err(Error::UnresolvedAccessor { key }) => assert_eq!(key, "line_total"),
            other => panic!("unexpected: {other:?}"),
        }
        let nested = view.child("line").expect("nested");
        assert_eq!(nested.int("line_total").expect("through the view"), 20);
    }

    #[test]
    fn derivation_errors_propagate_and_are_not_cached() {
        let fail = Rc::new(Cell::new(true));
        let f = Rc::clone(&fail);
        let src = Source::new(Record::new().accessor("obj", move |_| {
            if f.get() {
                Err(Error::msg("derivation failed"))
            } else {
                Ok(Value::list(vec![]))
            }
        }));
        let view = src.view(CachePolicy::default());
        let err = view.get("obj").expect_err("first read fails");
        assert_eq!(err.to_string(), "derivation failed");
        fail.set(false);
        assert!(view.get("obj").is_ok());
    }

    #[test]
    fn introspection_is_live() {
        let src = Source::new(
            Record::new()
                .field("a", 1)
                .accessor("b", |s| s.get("a")),
        );
        let view = src.view(CachePolicy::default());
        assert_eq!(view.keys(), ["a", "b"]);
        assert!(view.is_accessor("b"));
        assert!(!view.descriptor("a").expect("a").is_accessor());

        src.swap(|r| r.clone().with("c", true).expect("write"));
        assert!(view.has_key("c"));
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn actions_are_callable_through_the_view() {
        let calls = Rc::new(Cell::new(0i64));
        let c = Rc::clone(&calls);
        let src = Source::new(Record::new().action("bump", move |args| {
            let by = args.first().and_then(Value::as_int).unwrap_or(1);
            c.set(c.get() + by);
            Ok(())
        }));
        let view = src.view(CachePolicy::default());
        view.call("bump", &[]).expect("call");
        view.call("bump", &[Value::Int(4)]).expect("call");
        assert_eq!(calls.get(), 5);
    }
}
