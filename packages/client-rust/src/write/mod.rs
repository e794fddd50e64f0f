//! Local-first write path: per-key FIFO queue and the updater driver.
//!
//! Writes apply optimistically to the source of truth, then push to the
//! origin. A failed push stays queued and is recorded with the bookkeeper;
//! the conflict-resolution gate replays it before a later read.

pub mod driver;
pub mod queue;

pub use driver::*;
pub use queue::*;
