#![forbid(unsafe_code)]

//! Error type shared by every layer of the store.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by reads, mutations and snapshots.
///
/// User code (derivations, updaters, actions) reports its own failures
/// through [`Error::User`]; those pass through the store unmodified.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key not found: {key}")]
    MissingKey { key: String },

    #[error("type mismatch for `{key}`: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{key}` is a computed accessor and cannot be written")]
    AccessorWrite { key: String },

    #[error("`{key}` is a computed accessor; read it through a view")]
    UnresolvedAccessor { key: String },

    #[error("`{key}` is not an action")]
    NotAnAction { key: String },

    #[error("store is not available (dropped or still initializing)")]
    StoreDropped,

    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error("{0}")]
    User(Box<dyn std::error::Error>),
}

impl Error {
    /// Wrap an arbitrary error raised by user code.
    #[must_use]
    pub fn user(err: impl std::error::Error + 'static) -> Self {
        Self::User(Box::new(err))
    }

    /// Build a user error from a plain message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::User(message.into())
    }

    #[must_use]
    pub(crate) fn missing(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    #[must_use]
    pub(crate) fn mismatch(
        key: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected,
            found,
        }
    }

    /// Borrow the wrapped user error, if this is one.
    #[must_use]
    pub fn as_user(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::User(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn user_errors_keep_their_type() {
        let err = Error::user(Boom);
        assert_eq!(err.to_string(), "boom");
        assert!(err.as_user().is_some_and(|e| e.downcast_ref::<Boom>().is_some()));
    }

    #[test]
    fn messages_render_verbatim() {
        assert_eq!(Error::msg("no items").to_string(), "no items");
        assert_eq!(
            Error::mismatch("count", "int", "str").to_string(),
            "type mismatch for `count`: expected int, found str"
        );
        assert!(Error::missing("x").as_user().is_none());
    }
}
