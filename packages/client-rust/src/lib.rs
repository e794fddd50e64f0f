//! Depot Client — client-side data-access engine coordinating a memory
//! cache, a durable source of truth, and a remote origin.
//!
//! Consumers subscribe to a reactive stream per key. The engine serves
//! cached data when valid, fetches from the origin when not, persists what
//! it fetched, and de-duplicates concurrent origin calls. In mutable mode it
//! also accepts local-first writes: applied optimistically, pushed to the
//! origin asynchronously, with failed pushes recorded for replay before
//! later reads.

pub mod bookkeeper;
pub mod cache;
pub mod fetch;
pub(crate) mod gate;
pub(crate) mod pipeline;
pub mod sot;
pub mod store;
pub mod write;

pub use bookkeeper::InMemoryBookkeeper;
pub use cache::{CacheConfig, CacheStats, MemoryCache};
pub use fetch::{FetchEvent, FetchSubscription, FetcherController};
pub use sot::{InMemorySourceOfTruth, SourceOfTruthWithBarrier, Versioned};
pub use store::{ReadStream, Store, StoreBuilder};
pub use write::{PendingWrite, WriteQueue};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
