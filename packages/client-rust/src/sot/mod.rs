//! Source-of-truth layer: the write barrier and an in-memory backend.
//!
//! - [`SourceOfTruthWithBarrier`]: per-key read/write serialization and
//!   version stamping over any [`SourceOfTruth`](depot_core::SourceOfTruth)
//! - [`InMemorySourceOfTruth`]: volatile backend for tests and ephemeral data

pub mod barrier;
pub mod memory;

pub use barrier::*;
pub use memory::*;
