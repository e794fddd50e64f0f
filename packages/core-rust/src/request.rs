//! Read and write request types.
//!
//! A read request names a key and a [`ReadPolicy`] deciding which layers may
//! satisfy it. A write request carries the new value plus the wall-clock
//! `created_at` used for write-queue coalescing.

use serde::{Deserialize, Serialize};

use crate::clock::now_millis;

// ---------------------------------------------------------------------------
// ReadPolicy
// ---------------------------------------------------------------------------

/// Decides which layers a read may consult and whether the origin is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPolicy {
    /// Serve memory and disk. With `refresh`, also fetch from the origin in
    /// parallel even when the local layers are satisfactory.
    Cached {
        /// Request a parallel origin fetch.
        refresh: bool,
    },
    /// Bypass both local layers; only origin-sourced data satisfies the read.
    Fresh,
    /// Bypass the memory cache; serve disk, fetching when `refresh` is set.
    SkipMemory {
        /// Request a parallel origin fetch.
        refresh: bool,
    },
    /// Bypass the local store; serve memory or fetch from the origin.
    /// Fetched data is still persisted.
    SkipDisk,
}

impl ReadPolicy {
    /// Whether the memory cache may satisfy this read.
    #[must_use]
    pub fn reads_memory(self) -> bool {
        matches!(self, Self::Cached { .. } | Self::SkipDisk)
    }

    /// Whether the source of truth may satisfy this read.
    #[must_use]
    pub fn reads_disk(self) -> bool {
        matches!(self, Self::Cached { .. } | Self::SkipMemory { .. })
    }

    /// Whether this read calls the origin.
    #[must_use]
    pub fn wants_fetch(self) -> bool {
        match self {
            Self::Cached { refresh } | Self::SkipMemory { refresh } => refresh,
            Self::Fresh | Self::SkipDisk => true,
        }
    }
}

// ---------------------------------------------------------------------------
// ReadRequest
// ---------------------------------------------------------------------------

/// A request for the reactive stream keyed by `key`.
#[derive(Debug, Clone)]
pub struct ReadRequest<K> {
    /// Consumer-supplied opaque key.
    pub key: K,
    /// Layer selection for this read.
    pub policy: ReadPolicy,
}

impl<K> ReadRequest<K> {
    /// Cached read; fetches in parallel when `refresh` is set.
    #[must_use]
    pub fn cached(key: K, refresh: bool) -> Self {
        Self {
            key,
            policy: ReadPolicy::Cached { refresh },
        }
    }

    /// Origin-only read; local layers are not emitted.
    #[must_use]
    pub fn fresh(key: K) -> Self {
        Self {
            key,
            policy: ReadPolicy::Fresh,
        }
    }

    /// Disk-first read that bypasses the memory cache.
    #[must_use]
    pub fn skip_memory(key: K, refresh: bool) -> Self {
        Self {
            key,
            policy: ReadPolicy::SkipMemory { refresh },
        }
    }

    /// Memory-or-origin read that bypasses the local store.
    #[must_use]
    pub fn skip_disk(key: K) -> Self {
        Self {
            key,
            policy: ReadPolicy::SkipDisk,
        }
    }
}

// ---------------------------------------------------------------------------
// WriteRequest
// ---------------------------------------------------------------------------

/// A local-first write destined for the origin.
///
/// `created_at` orders same-key writes in the queue: once a write with a
/// strictly newer `created_at` is acknowledged by the origin, older pending
/// writes are superseded and never pushed.
#[derive(Debug, Clone)]
pub struct WriteRequest<K, V> {
    /// Consumer-supplied opaque key.
    pub key: K,
    /// The new domain value.
    pub value: V,
    /// Wall-clock creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl<K, V> WriteRequest<K, V> {
    /// Creates a write request stamped with the current wall-clock time.
    #[must_use]
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            created_at: now_millis(),
        }
    }

    /// Overrides the creation timestamp; used when replaying journaled writes.
    #[must_use]
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_without_refresh_stays_local() {
        let policy = ReadPolicy::Cached { refresh: false };
        assert!(policy.reads_memory());
        assert!(policy.reads_disk());
        assert!(!policy.wants_fetch());
    }

    #[test]
    fn fresh_suppresses_local_layers() {
        assert!(!ReadPolicy::Fresh.reads_memory());
        assert!(!ReadPolicy::Fresh.reads_disk());
        assert!(ReadPolicy::Fresh.wants_fetch());
    }

    #[test]
    fn skip_memory_reads_disk_only() {
        let policy = ReadPolicy::SkipMemory { refresh: true };
        assert!(!policy.reads_memory());
        assert!(policy.reads_disk());
        assert!(policy.wants_fetch());
    }

    #[test]
    fn skip_disk_always_fetches() {
        assert!(ReadPolicy::SkipDisk.reads_memory());
        assert!(!ReadPolicy::SkipDisk.reads_disk());
        assert!(ReadPolicy::SkipDisk.wants_fetch());
    }

    #[test]
    fn write_request_is_stamped_and_overridable() {
        let req = WriteRequest::new("k", 1);
        assert!(req.created_at > 1_600_000_000_000);

        let replayed = WriteRequest::new("k", 2).with_created_at(42);
        assert_eq!(replayed.created_at, 42);
    }

    #[test]
    fn request_constructors_set_policy() {
        assert_eq!(
            ReadRequest::cached(1, true).policy,
            ReadPolicy::Cached { refresh: true }
        );
        assert_eq!(ReadRequest::fresh(1).policy, ReadPolicy::Fresh);
        assert_eq!(
            ReadRequest::skip_memory(1, false).policy,
            ReadPolicy::SkipMemory { refresh: false }
        );
        assert_eq!(ReadRequest::skip_disk(1).policy, ReadPolicy::SkipDisk);
    }
}
