#![forbid(unsafe_code)]

//! Composite state records.
//!
//! A [`Record`] is an ordered map from key to [`Slot`]. A slot is either a
//! plain [`Field`](Slot::Field) (data or an action) or a computed
//! [`Accessor`](Slot::Accessor): a derivation with no stored value that is
//! re-evaluated against the record current at read time.
//!
//! # Invariants
//!
//! 1. Cloning or copying a record copies accessor declarations as
//!    declarations; nothing in this module ever evaluates an accessor.
//! 2. [`Record::set`] refuses to overwrite an accessor with a plain value.
//! 3. Key order is declaration order and survives every copy.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::{Action, Value};
use crate::view::Scope;

/// A derivation evaluated against the current composite state.
///
/// The `this` scope is the self-reference: it resolves plain fields and other
/// accessors of the record that is current when the read happens, never the
/// one that existed when the accessor was declared.
pub trait Derivable {
    fn evaluate(&self, this: &Scope<'_>) -> Result<Value>;
}

impl<F> Derivable for F
where
    F: Fn(&Scope<'_>) -> Result<Value>,
{
    fn evaluate(&self, this: &Scope<'_>) -> Result<Value> {
        self(this)
    }
}

/// A computed accessor declaration.
#[derive(Clone)]
pub struct Accessor(Rc<dyn Derivable>);

impl Accessor {
    pub fn new(derivation: impl Derivable + 'static) -> Self {
        Self(Rc::new(derivation))
    }

    pub fn evaluate(&self, this: &Scope<'_>) -> Result<Value> {
        self.0.evaluate(this)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Accessor(..)")
    }
}

/// One entry of a record.
#[derive(Clone, Debug)]
pub enum Slot {
    Field(Value),
    Accessor(Accessor),
}

impl Slot {
    #[must_use]
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor(_))
    }

    #[must_use]
    pub fn as_field(&self) -> Option<&Value> {
        match self {
            Self::Field(value) => Some(value),
            Self::Accessor(_) => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Field(_) => SlotKind::Field,
            Self::Accessor(_) => SlotKind::Accessor,
        }
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Field(a), Self::Field(b)) => a == b,
            (Self::Accessor(a), Self::Accessor(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Field,
    Accessor,
}

/// Introspection metadata for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: SlotKind,
    /// Plain fields are writable; accessors never are.
    pub writable: bool,
    pub enumerable: bool,
}

impl Descriptor {
    #[must_use]
    pub fn of(slot: &Slot) -> Self {
        Self {
            kind: slot.kind(),
            writable: !slot.is_accessor(),
            enumerable: true,
        }
    }

    #[must_use]
    pub fn is_accessor(&self) -> bool {
        self.kind == SlotKind::Accessor
    }
}

/// An ordered map of plain fields and accessor declarations.
#[derive(Clone, Default, PartialEq)]
pub struct Record {
    slots: IndexMap<String, Slot>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.slots.iter()).finish()
    }
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- declaration builders -------------------------------------------

    /// Declare a plain field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.slots.insert(key.into(), Slot::Field(value.into()));
        self
    }

    /// Declare a computed accessor.
    #[must_use]
    pub fn accessor(
        mut self,
        key: impl Into<String>,
        derive: impl Fn(&Scope<'_>) -> Result<Value> + 'static,
    ) -> Self {
        self.slots
            .insert(key.into(), Slot::Accessor(Accessor::new(derive)));
        self
    }

    /// Declare a computed accessor from any [`Derivable`].
    #[must_use]
    pub fn derived(mut self, key: impl Into<String>, derivation: impl Derivable + 'static) -> Self {
        self.slots
            .insert(key.into(), Slot::Accessor(Accessor::new(derivation)));
        self
    }

    /// Declare an action.
    #[must_use]
    pub fn action(
        mut self,
        key: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<()> + 'static,
    ) -> Self {
        self.slots
            .insert(key.into(), Slot::Field(Value::Action(Action::new(f))));
        self
    }

    // -- lookup ---------------------------------------------------------

    #[must_use]
    pub fn slot(&self, key: &str) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// The plain value stored under `key`; `None` for accessors and absent keys.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.slots.get(key).and_then(Slot::as_field)
    }

    #[must_use]
    pub fn accessor_of(&self, key: &str) -> Option<&Accessor> {
        match self.slots.get(key) {
            Some(Slot::Accessor(accessor)) => Some(accessor),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_accessor(&self, key: &str) -> bool {
        self.slots.get(key).is_some_and(Slot::is_accessor)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    #[must_use]
    pub fn descriptor(&self, key: &str) -> Option<Descriptor> {
        self.slots.get(key).map(Descriptor::of)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.slots.iter().map(|(k, s)| (k.as_str(), s))
    }

    /// Plain fields only, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots
            .iter()
            .filter_map(|(k, s)| s.as_field().map(|v| (k.as_str(), v)))
    }

    pub fn accessor_keys(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter(|(_, s)| s.is_accessor())
            .map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // -- mutation -------------------------------------------------------

    /// Write a plain value. Writing to an accessor key is rejected and
    /// leaves the accessor untouched.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        if self.is_accessor(&key) {
            return Err(Error::AccessorWrite { key });
        }
        self.slots.insert(key, Slot::Field(value.into()));
        Ok(())
    }

    /// Owned variant of [`set`](Self::set) for immutable-style updates.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Install a slot exactly as given, replacing whatever was there.
    pub fn define(&mut self, key: impl Into<String>, slot: Slot) -> Option<Slot> {
        self.slots.insert(key.into(), slot)
    }

    pub fn remove(&mut self, key: &str) -> Option<Slot> {
        self.slots.shift_remove(key)
    }

    /// Slot-level shallow assign: every slot of `other` overwrites the slot
    /// of the same key, accessors included.
    #[must_use]
    pub fn assign(&self, other: &Record) -> Record {
        let mut out = self.clone();
        for (key, slot) in &other.slots {
            out.slots.insert(key.clone(), slot.clone());
        }
        out
    }

    // -- typed plain reads ----------------------------------------------

    /// Plain value of `key`.
    ///
    /// A record never evaluates its accessors: reading one here fails with
    /// [`Error::UnresolvedAccessor`]. Accessors of a nested record are read
    /// through [`ReactiveView::child`](crate::view::ReactiveView::child).
    pub fn get(&self, key: &str) -> Result<&Value> {
        match self.slot(key) {
            Some(Slot::Field(value)) => Ok(value),
            Some(Slot::Accessor(_)) => Err(Error::UnresolvedAccessor {
                key: key.to_owned(),
            }),
            None => Err(Error::missing(key)),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        typed(key, self.get(key)?, "int", Value::as_int)
    }

    pub fn float(&self, key: &str) -> Result<f64> {
        typed(key, self.get(key)?, "float", Value::as_float)
    }

    pub fn boolean(&self, key: &str) -> Result<bool> {
        typed(key, self.get(key)?, "bool", Value::as_bool)
    }

    pub fn str(&self, key: &str) -> Result<Rc<str>> {
        typed(key, self.get(key)?, "str", |v| match v {
            Value::Str(s) => Some(Rc::clone(s)),
            _ => None,
        })
    }

    pub fn list(&self, key: &str) -> Result<Rc<Vec<Value>>> {
        typed(key, self.get(key)?, "list", |v| v.as_list().cloned())
    }

    pub fn record(&self, key: &str) -> Result<Rc<Record>> {
        typed(key, self.get(key)?, "record", |v| v.as_record().cloned())
    }

    // -- plain snapshots ------------------------------------------------

    /// JSON object of the plain, non-action fields. Accessors are never
    /// serialized; they are recomputed rather than restored.
    #[must_use]
    pub fn to_plain_json(&self) -> serde_json::Value {
        let map = self
            .fields()
            .filter_map(|(k, v)| v.to_json().map(|json| (k.to_owned(), json)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Build a plain-field record from a JSON object.
    pub fn from_json(json: &serde_json::Value) -> Result<Record> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(Error::Snapshot(format!(
                "expected a JSON object, found {}",
                json_kind(other)
            ))),
        }
    }

    pub(crate) fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Record {
        let slots = map
            .iter()
            .map(|(k, v)| (k.clone(), Slot::Field(Value::from_json(v))))
            .collect();
        Record { slots }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let slots = iter
            .into_iter()
            .map(|(k, v)| (k.into(), Slot::Field(v.into())))
            .collect();
        Record { slots }
    }
}

/// Extract a typed view of `value` or report a mismatch for `key`.
pub(crate) fn typed<T>(
    key: &str,
    value: &Value,
    expected: &'static str,
    extract: impl FnOnce(&Value) -> Option<T>,
) -> Result<T> {
    extract(value).ok_or_else(|| Error::mismatch(key, expected, value.kind()))
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
