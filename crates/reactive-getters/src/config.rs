#![forbid(unsafe_code)]

//! Store configuration.

use crate::value::Value;

/// Which accessor results the getter cache keeps for the rest of a
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Cache list and record results so repeated reads return the same
    /// allocation; recompute primitives on every read.
    #[default]
    ObjectsOnly,
    /// Cache every result.
    All,
    /// Never cache; every read recomputes.
    Disabled,
}

impl CachePolicy {
    #[must_use]
    pub fn should_cache(self, result: &Value) -> bool {
        match self {
            Self::ObjectsOnly => result.is_object(),
            Self::All => true,
            Self::Disabled => false,
        }
    }
}

/// Configuration for a [`Store`](crate::store::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name attached to log events.
    pub name: String,
    pub cache_policy: CachePolicy,
    /// Register the default access hook that pokes the container when an
    /// accessor is evaluated.
    pub notify_on_access: bool,
    /// Absorb foreign container state before resolving each mutation.
    pub reconcile_before_set: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_owned(),
            cache_policy: CachePolicy::default(),
            notify_on_access: true,
            reconcile_before_set: true,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    #[must_use]
    pub fn with_notify_on_access(mut self, enabled: bool) -> Self {
        self.notify_on_access = enabled;
        self
    }

    #[must_use]
    pub fn with_reconcile_before_set(mut self, enabled: bool) -> Self {
        self.reconcile_before_set = enabled;
        self
    }
}
