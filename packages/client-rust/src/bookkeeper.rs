//! Volatile [`Bookkeeper`] implementation.
//!
//! Keeps failed-sync timestamps in process memory. Suitable for tests and
//! deployments that accept losing cross-session reconciliation; persistent
//! backends implement the same trait over a `{key, timestamp}` table.

use async_trait::async_trait;
use dashmap::DashMap;

use depot_core::{Bookkeeper, StoreKey};

/// In-memory failed-sync ledger.
pub struct InMemoryBookkeeper<K> {
    failures: DashMap<K, i64>,
}

impl<K: StoreKey> InMemoryBookkeeper<K> {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            failures: DashMap::new(),
        }
    }

    /// Number of keys with unresolved failed syncs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether every key is in sync.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<K: StoreKey> Default for InMemoryBookkeeper<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: StoreKey> Bookkeeper<K> for InMemoryBookkeeper<K> {
    async fn last_failed_sync(&self, key: &K) -> Option<i64> {
        self.failures.get(key).map(|entry| *entry)
    }

    async fn set_last_failed_sync(&self, key: &K, timestamp_millis: i64) -> bool {
        self.failures.insert(key.clone(), timestamp_millis);
        true
    }

    async fn clear(&self, key: &K) -> bool {
        self.failures.remove(key);
        true
    }

    async fn clear_all(&self) -> bool {
        self.failures.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_clears_failures() {
        let bookkeeper: InMemoryBookkeeper<u32> = InMemoryBookkeeper::new();
        assert!(bookkeeper.last_failed_sync(&1).await.is_none());

        assert!(bookkeeper.set_last_failed_sync(&1, 1_000).await);
        assert_eq!(bookkeeper.last_failed_sync(&1).await, Some(1_000));

        // A newer failure overwrites the old timestamp.
        bookkeeper.set_last_failed_sync(&1, 2_000).await;
        assert_eq!(bookkeeper.last_failed_sync(&1).await, Some(2_000));

        assert!(bookkeeper.clear(&1).await);
        assert!(bookkeeper.last_failed_sync(&1).await.is_none());
    }

    #[tokio::test]
    async fn clear_all_wipes_every_record() {
        let bookkeeper: InMemoryBookkeeper<u32> = InMemoryBookkeeper::new();
        bookkeeper.set_last_failed_sync(&1, 10).await;
        bookkeeper.set_last_failed_sync(&2, 20).await;
        assert_eq!(bookkeeper.len(), 2);

        assert!(bookkeeper.clear_all().await);
        assert!(bookkeeper.is_empty());
    }
}
