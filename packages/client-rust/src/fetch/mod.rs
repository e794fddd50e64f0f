//! Origin fetch de-duplication and multicast.
//!
//! [`FetcherController`] guarantees at most one live origin call per key and
//! multicasts its outcome to every attached read pipeline.

pub mod controller;

pub use controller::*;
