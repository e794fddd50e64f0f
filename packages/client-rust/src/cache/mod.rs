//! Advisory in-memory cache for the read pipeline.
//!
//! - [`MemoryCache`]: bounded, optionally TTL'd mapping from key to the most
//!   recent domain value, with sampling-based least-recently-used eviction
//! - [`CacheEntry`] / [`EntryMetadata`]: stored value plus access metadata
//! - [`CacheConfig`] / [`CacheStats`]: tuning knobs and hit/miss counters
//!
//! The cache is advisory: misses never fail, and eviction is a best-effort
//! bound rather than a hard limit under concurrent writers.

pub mod entry;
pub mod memory;

pub use entry::*;
pub use memory::*;
