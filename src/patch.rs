//! The merge contract for partial updates.
//!
//! A [`Patch`] is a partial value: a set of fields, each either present or
//! absent. Patches submitted for the same key within one cycle are folded
//! together with [`Patch::merge`] before the batch function sees them.
//!
//! Merging is **shallow** and **last write wins per field**: a field present
//! in the incoming patch replaces the accumulated one wholesale (nested maps
//! are not merged recursively), fields absent from the incoming patch are left
//! untouched. A different policy (deep merge, first write wins) is a
//! deliberate choice made by implementing `Patch` by hand.
//!
//! Implementations are provided for [`HashMap`] and [`BTreeMap`], for
//! `serde_json` objects with the `json` feature, and for structs of `Option`
//! fields via `#[derive(Patch)]` with the `macros` feature.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

/// A partial value that can be merged with another of the same type.
pub trait Patch {
    /// Whether the patch carries no fields at all.
    ///
    /// Empty patches are rejected by `submit`.
    fn is_empty(&self) -> bool;

    /// Fold `other` into `self`; fields in `other` overwrite fields in `self`.
    fn merge(&mut self, other: Self);
}

impl<K, V, S> Patch for HashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn is_empty(&self) -> bool {
        HashMap::is_empty(self)
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<K: Ord, V> Patch for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }

    fn merge(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

#[cfg(feature = "json")]
mod json {
    use super::Patch;
    use serde_json::{Map, Value};

    impl Patch for Map<String, Value> {
        fn is_empty(&self) -> bool {
            Map::is_empty(self)
        }

        fn merge(&mut self, other: Self) {
            self.extend(other);
        }
    }

    /// Objects merge field by field; any other incoming value replaces the
    /// accumulated one. `null` and `{}` count as empty.
    impl Patch for Value {
        fn is_empty(&self) -> bool {
            match self {
                Value::Null => true,
                Value::Object(map) => map.is_empty(),
                _ => false,
            }
        }

        fn merge(&mut self, other: Self) {
            match (self, other) {
                (Value::Object(acc), Value::Object(incoming)) => acc.merge(incoming),
                (acc, incoming) => *acc = incoming,
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
