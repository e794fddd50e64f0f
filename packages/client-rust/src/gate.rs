//! Conflict-resolution gate consulted at the start of mutable-mode reads.
//!
//! If bookkeeping shows unresolved local changes for a key, pending writes
//! are replayed to the origin before the read proceeds -- local mutations go
//! out before potentially stale origin data is pulled on top of them. A
//! failed replay is reported on the read stream but never blocks the read;
//! consumers may then observe a locally-newer-than-origin value.

use std::sync::Arc;

use depot_core::{Bookkeeper, StoreKey, StoreValue, UpdaterError};

use crate::write::driver::WritePipeline;

/// Pre-read replay of pending origin pushes.
pub(crate) struct ConflictGate<K, V, L> {
    bookkeeper: Arc<dyn Bookkeeper<K>>,
    writes: Arc<WritePipeline<K, V, L>>,
}

impl<K, V, L> ConflictGate<K, V, L>
where
    K: StoreKey,
    V: StoreValue,
    L: StoreValue,
{
    pub(crate) fn new(
        bookkeeper: Arc<dyn Bookkeeper<K>>,
        writes: Arc<WritePipeline<K, V, L>>,
    ) -> Self {
        Self { bookkeeper, writes }
    }

    /// Replays pending writes for `key` when bookkeeping shows a failed sync.
    ///
    /// Returns `Ok` when there was no conflict or the replay drained the
    /// queue; returns the blocking error otherwise (the read proceeds either
    /// way).
    pub(crate) async fn resolve(&self, key: &K) -> Result<(), UpdaterError> {
        if self.bookkeeper.last_failed_sync(key).await.is_none() {
            return Ok(());
        }

        tracing::debug!("unresolved local changes; replaying pending writes before read");
        self.writes.replay(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookkeeper::InMemoryBookkeeper;
    use crate::sot::{InMemorySourceOfTruth, SourceOfTruthWithBarrier};
    use async_trait::async_trait;
    use depot_core::{Updater, UpdaterResult, WriteRequest};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Updater that fails until `healthy` is flipped, counting every post.
    struct FlakyUpdater {
        healthy: AtomicBool,
        posts: AtomicUsize,
    }

    #[async_trait]
    impl Updater<u32, String> for FlakyUpdater {
        type Response = ();

        async fn post(&self, _key: &u32, _value: &String) -> UpdaterResult<()> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                UpdaterResult::Success(())
            } else {
                UpdaterResult::Error(depot_core::UpdaterError::message("offline"))
            }
        }
    }

    fn gate_with(
        updater: Arc<FlakyUpdater>,
    ) -> (
        ConflictGate<u32, String, String>,
        Arc<WritePipeline<u32, String, String>>,
        Arc<InMemoryBookkeeper<u32>>,
    ) {
        let bookkeeper = Arc::new(InMemoryBookkeeper::new());
        let sot = Arc::new(SourceOfTruthWithBarrier::new(Arc::new(
            InMemorySourceOfTruth::new(),
        )));
        let writes = Arc::new(WritePipeline::new(
            updater,
            Arc::clone(&bookkeeper) as Arc<dyn Bookkeeper<u32>>,
            Arc::new(|value| Ok(value)),
            sot,
            None,
        ));
        let gate = ConflictGate::new(
            Arc::clone(&bookkeeper) as Arc<dyn Bookkeeper<u32>>,
            Arc::clone(&writes),
        );
        (gate, writes, bookkeeper)
    }

    #[tokio::test]
    async fn no_bookkeeping_record_passes_without_replay() {
        let updater = Arc::new(FlakyUpdater {
            healthy: AtomicBool::new(true),
            posts: AtomicUsize::new(0),
        });
        let (gate, _writes, _bookkeeper) = gate_with(Arc::clone(&updater));

        gate.resolve(&1).await.unwrap();
        assert_eq!(updater.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replay_after_recovery_clears_the_record() {
        let updater = Arc::new(FlakyUpdater {
            healthy: AtomicBool::new(false),
            posts: AtomicUsize::new(0),
        });
        let (gate, writes, bookkeeper) = gate_with(Arc::clone(&updater));

        let failed = writes.write(WriteRequest::new(1, "v1".to_string())).await;
        assert!(!failed.is_success());
        assert!(bookkeeper.last_failed_sync(&1).await.is_some());

        // Origin comes back; the gate replays and clears the record.
        updater.healthy.store(true, Ordering::SeqCst);
        gate.resolve(&1).await.unwrap();
        assert!(bookkeeper.last_failed_sync(&1).await.is_none());
        assert_eq!(writes.pending_count(&1), 0);
    }

    #[tokio::test]
    async fn failed_replay_keeps_the_record() {
        let updater = Arc::new(FlakyUpdater {
            healthy: AtomicBool::new(false),
            posts: AtomicUsize::new(0),
        });
        let (gate, writes, bookkeeper) = gate_with(Arc::clone(&updater));

        writes.write(WriteRequest::new(1, "v1".to_string())).await;
        let err = gate.resolve(&1).await.unwrap_err();
        assert!(err.to_string().contains("offline"));
        assert!(bookkeeper.last_failed_sync(&1).await.is_some());
        assert_eq!(writes.pending_count(&1), 1);
    }
}
