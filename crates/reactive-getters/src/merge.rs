#![forbid(unsafe_code)]

//! Descriptor-preserving merge of composite state records.
//!
//! # Invariants
//!
//! 1. Every accessor of `prior` is an accessor of the result, with the same
//!    derivation (descriptor fidelity).
//! 2. An incoming slot never overwrites an accessor of `prior`, whatever its
//!    variant.
//! 3. Keys that are plain in `prior` (or absent from it) take the incoming
//!    plain value; new keys are appended in `next`'s order.
//! 4. An incoming accessor on a key that is not already an accessor is
//!    dropped: the accessor set is fixed when the store is created, and
//!    only a replacing write can change it.
//! 5. Neither input is modified.
//!
//! With `replace == true` the result is `next` unchanged: a wholesale
//! replacement must carry its own accessor declarations.

use crate::record::{Record, Slot};

/// Merge `next` into `prior` without ever evaluating or downgrading an
/// accessor.
#[must_use]
pub fn merge(prior: &Record, next: &Record, replace: bool) -> Record {
    if replace {
        return next.clone();
    }

    let mut merged = prior.clone();
    for (key, slot) in next.iter() {
        if prior.is_accessor(key) {
            continue;
        }
        match slot {
            Slot::Field(value) => {
                merged.define(key, Slot::Field(value.clone()));
            }
            Slot::Accessor(_) => {
                // The accessor set is fixed when the store is created.
                #[cfg(feature = "tracing")]
                log_dropped_accessor(key);
            }
        }
    }
    merged
}

/// Whether every accessor of `prior` survived into `merged` unchanged.
#[must_use]
pub fn preserves_accessors(prior: &Record, merged: &Record) -> bool {
    prior.iter().all(|(key, slot)| match slot {
        Slot::Accessor(a) => merged.accessor_of(key).is_some_and(|b| a.ptr_eq(b)),
        Slot::Field(_) => true,
    })
}

#[cfg(feature = "tracing")]
fn log_dropped_accessor(key: &str) {
    tracing::debug!(message = "getters.merge.accessor_dropped", key);
}
