//! Depot Core — data model and collaborator contracts for the Depot
//! data-access engine.
//!
//! Defines the shapes that cross the engine boundary: read/write requests and
//! responses, the typed error taxonomy, and the contracts implemented by
//! collaborators ([`Fetcher`], [`SourceOfTruth`], [`Updater`], [`Bookkeeper`],
//! [`Converter`], [`Validator`]). The coordination machinery lives in
//! `depot-client`.

pub mod clock;
pub mod error;
pub mod fetch;
pub mod key;
pub mod request;
pub mod response;
pub mod traits;
pub mod update;

pub use error::{ConversionError, FetcherError, SourceOfTruthError, StoreError, UpdaterError};
pub use fetch::{Fetcher, FetcherResult};
pub use key::{StoreKey, StoreValue};
pub use request::{ReadPolicy, ReadRequest, WriteRequest};
pub use response::{ReadResponse, ResponseOrigin, WriteResponse};
pub use traits::{
    Bookkeeper, Converter, IdentityConverter, SourceOfTruth, SyncFailureRecord, Validator,
};
pub use update::{Updater, UpdaterResult};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
