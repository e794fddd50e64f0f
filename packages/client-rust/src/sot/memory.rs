//! In-memory [`SourceOfTruth`] implementation.
//!
//! Volatile backend for tests, benchmarks, and ephemeral data that does not
//! need to survive the process. Entries live in a [`DashMap`]; each key gets
//! a broadcast change feed that readers chain after their initial snapshot.

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use async_trait::async_trait;
use depot_core::{SourceOfTruth, StoreKey, StoreValue};

/// Buffered changes per key before a slow reader starts lagging.
const CHANGE_FEED_CAPACITY: usize = 64;

/// Volatile `SourceOfTruth` for tests and ephemeral data.
///
/// Same-key writes are expected to be externally serialized -- the engine's
/// barrier does this. A reader subscribes to the change feed before taking
/// its snapshot, so a racing write is observed either in the snapshot or on
/// the feed (possibly both; duplicate emissions are permitted by the reader
/// contract).
pub struct InMemorySourceOfTruth<K, L> {
    entries: DashMap<K, L>,
    feeds: DashMap<K, broadcast::Sender<Option<L>>>,
}

impl<K, L> InMemorySourceOfTruth<K, L>
where
    K: StoreKey,
    L: StoreValue,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            feeds: DashMap::new(),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn feed_for(&self, key: &K) -> broadcast::Sender<Option<L>> {
        self.feeds
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(CHANGE_FEED_CAPACITY).0)
            .clone()
    }
}

impl<K, L> Default for InMemorySourceOfTruth<K, L>
where
    K: StoreKey,
    L: StoreValue,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, L> SourceOfTruth<K, L> for InMemorySourceOfTruth<K, L>
where
    K: StoreKey,
    L: StoreValue,
{
    fn reader(&self, key: K) -> BoxStream<'static, anyhow::Result<Option<L>>> {
        let receiver = self.feed_for(&key).subscribe();
        let current = self.entries.get(&key).map(|entry| entry.clone());

        let initial = stream::once(async move { Ok(current) });
        let changes = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(value) => Some(Ok(value)),
                // A lagged reader missed intermediate states only; the next
                // change re-synchronizes it.
                Err(BroadcastStreamRecvError::Lagged(_)) => None,
            }
        });

        initial.chain(changes).boxed()
    }

    async fn write(&self, key: K, value: L) -> anyhow::Result<()> {
        let feed = self.feed_for(&key);
        self.entries.insert(key, value.clone());
        // No subscribers is fine.
        let _ = feed.send(Some(value));
        Ok(())
    }

    async fn delete(&self, key: K) -> anyhow::Result<()> {
        self.entries.remove(&key);
        if let Some(feed) = self.feeds.get(&key) {
            let _ = feed.send(None);
        }
        Ok(())
    }

    async fn delete_all(&self) -> anyhow::Result<()> {
        self.entries.clear();
        for feed in self.feeds.iter() {
            let _ = feed.send(None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next<L: Clone + Send>(
        reader: &mut BoxStream<'static, anyhow::Result<Option<L>>>,
    ) -> Option<L> {
        timeout(Duration::from_secs(1), reader.next())
            .await
            .expect("reader emission timed out")
            .expect("reader ended unexpectedly")
            .expect("reader errored")
    }

    #[tokio::test]
    async fn reader_emits_absent_for_unknown_key() {
        let sot: InMemorySourceOfTruth<u32, String> = InMemorySourceOfTruth::new();
        let mut reader = sot.reader(1);
        assert!(next(&mut reader).await.is_none());
    }

    #[tokio::test]
    async fn reader_emits_snapshot_then_changes() {
        let sot: Arc<InMemorySourceOfTruth<u32, String>> = Arc::new(InMemorySourceOfTruth::new());
        sot.write(1, "a".to_string()).await.unwrap();

        let mut reader = sot.reader(1);
        assert_eq!(next(&mut reader).await.as_deref(), Some("a"));

        sot.write(1, "b".to_string()).await.unwrap();
        assert_eq!(next(&mut reader).await.as_deref(), Some("b"));

        sot.delete(1).await.unwrap();
        assert!(next(&mut reader).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_readers_all_observe_writes() {
        let sot: Arc<InMemorySourceOfTruth<u32, i32>> = Arc::new(InMemorySourceOfTruth::new());

        let mut first = sot.reader(7);
        let mut second = sot.reader(7);
        assert!(next(&mut first).await.is_none());
        assert!(next(&mut second).await.is_none());

        sot.write(7, 42).await.unwrap();
        assert_eq!(next(&mut first).await, Some(42));
        assert_eq!(next(&mut second).await, Some(42));
    }

    #[tokio::test]
    async fn delete_all_notifies_every_key() {
        let sot: Arc<InMemorySourceOfTruth<u32, i32>> = Arc::new(InMemorySourceOfTruth::new());
        sot.write(1, 1).await.unwrap();
        sot.write(2, 2).await.unwrap();

        let mut first = sot.reader(1);
        let mut second = sot.reader(2);
        assert_eq!(next(&mut first).await, Some(1));
        assert_eq!(next(&mut second).await, Some(2));

        sot.delete_all().await.unwrap();
        assert!(next(&mut first).await.is_none());
        assert!(next(&mut second).await.is_none());
        assert!(sot.is_empty());
    }

    #[tokio::test]
    async fn writes_to_other_keys_are_not_observed() {
        let sot: Arc<InMemorySourceOfTruth<u32, i32>> = Arc::new(InMemorySourceOfTruth::new());

        let mut reader = sot.reader(1);
        assert!(next(&mut reader).await.is_none());

        sot.write(2, 99).await.unwrap();
        sot.write(1, 1).await.unwrap();
        // The next emission for key 1 is its own write, not key 2's.
        assert_eq!(next(&mut reader).await, Some(1));
    }
}
