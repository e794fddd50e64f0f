//! Marker traits for the key and value shapes the engine moves around.
//!
//! The engine never inspects key contents; keys only need equality, hashing,
//! and the usual thread-safety bounds. Composite query descriptors and
//! operation-typed keys are ordinary consumer enums deriving `Eq` + `Hash`
//! over all fields.

use std::hash::Hash;

/// Opaque identifier for a unit of cached data.
///
/// Blanket-implemented for every eligible type; consumers never implement
/// this by hand.
pub trait StoreKey: Clone + Eq + Hash + Send + Sync + 'static {}

impl<K> StoreKey for K where K: Clone + Eq + Hash + Send + Sync + 'static {}

/// Bound shared by the domain (`V`), local (`L`), and network (`N`) value
/// shapes.
///
/// Values are immutable from the engine's perspective; `Clone` is required so
/// a single emission can be multicast to every subscriber.
pub trait StoreValue: Clone + Send + Sync + 'static {}

impl<V> StoreValue for V where V: Clone + Send + Sync + 'static {}
