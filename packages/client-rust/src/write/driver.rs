//! Updater driver: applies writes locally, pushes them to the origin, and
//! keeps the bookkeeper honest about failures.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use depot_core::clock::now_millis;
use depot_core::{
    Bookkeeper, ConversionError, StoreError, StoreKey, StoreValue, Updater, UpdaterError,
    UpdaterResult, WriteRequest, WriteResponse,
};

use crate::cache::MemoryCache;
use crate::sot::SourceOfTruthWithBarrier;

use super::queue::WriteQueue;

// ---------------------------------------------------------------------------
// AnyUpdater
// ---------------------------------------------------------------------------

/// Response-erased view of an [`Updater`]: one push attempt including the
/// `on_completion` hook, reduced to pass/fail for queue bookkeeping.
#[async_trait]
pub(crate) trait AnyUpdater<K, V>: Send + Sync {
    async fn drive(&self, key: &K, value: &V) -> Result<(), UpdaterError>;
}

#[async_trait]
impl<K, V, U> AnyUpdater<K, V> for U
where
    K: Send + Sync,
    V: Send + Sync,
    U: Updater<K, V>,
{
    async fn drive(&self, key: &K, value: &V) -> Result<(), UpdaterError> {
        let result = self.post(key, value).await;
        self.on_completion(&result).await;
        match result {
            UpdaterResult::Success(_) => Ok(()),
            UpdaterResult::Error(error) => Err(error),
        }
    }
}

// ---------------------------------------------------------------------------
// WritePipeline
// ---------------------------------------------------------------------------

/// Per-key write state: the pending queue and the drive mutex serializing
/// same-key pushes. Created lazily, never removed while the engine is alive.
struct KeyWrites<V> {
    queue: Mutex<WriteQueue<V>>,
    drive: AsyncMutex<()>,
}

impl<V: Clone> KeyWrites<V> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(WriteQueue::new()),
            drive: AsyncMutex::new(()),
        }
    }
}

type FromDomain<V, L> = Arc<dyn Fn(V) -> Result<L, ConversionError> + Send + Sync>;

/// Drives the write path: enqueue, optimistic local write, origin push,
/// failure bookkeeping.
///
/// Same-key writes are strictly serialized by the per-key drive mutex;
/// different keys proceed in parallel.
pub(crate) struct WritePipeline<K, V, L> {
    updater: Arc<dyn AnyUpdater<K, V>>,
    bookkeeper: Arc<dyn Bookkeeper<K>>,
    from_domain: FromDomain<V, L>,
    sot: Arc<SourceOfTruthWithBarrier<K, L>>,
    cache: Option<Arc<MemoryCache<K, V>>>,
    states: DashMap<K, Arc<KeyWrites<V>>>,
}

impl<K, V, L> WritePipeline<K, V, L>
where
    K: StoreKey,
    V: StoreValue,
    L: StoreValue,
{
    pub(crate) fn new(
        updater: Arc<dyn AnyUpdater<K, V>>,
        bookkeeper: Arc<dyn Bookkeeper<K>>,
        from_domain: FromDomain<V, L>,
        sot: Arc<SourceOfTruthWithBarrier<K, L>>,
        cache: Option<Arc<MemoryCache<K, V>>>,
    ) -> Self {
        Self {
            updater,
            bookkeeper,
            from_domain,
            sot,
            cache,
            states: DashMap::new(),
        }
    }

    fn state_for(&self, key: &K) -> Arc<KeyWrites<V>> {
        self.states
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyWrites::new()))
            .clone()
    }

    /// Number of pushes still pending for `key`.
    pub(crate) fn pending_count(&self, key: &K) -> usize {
        self.states.get(key).map_or(0, |state| state.queue.lock().len())
    }

    /// Processes one write request: enqueue, optimistic local write, then
    /// drive the updater until this request's entry is resolved.
    pub(crate) async fn write(&self, request: WriteRequest<K, V>) -> WriteResponse {
        let WriteRequest {
            key,
            value,
            created_at,
        } = request;
        let state = self.state_for(&key);

        // Step 1: Enqueue.
        let sequence = state.queue.lock().enqueue(value.clone(), created_at);

        // Step 2: Optimistic local write. A failure here discards the entry --
        // nothing was applied, so there is nothing to replay.
        let local = match (self.from_domain)(value.clone()) {
            Ok(local) => local,
            Err(error) => {
                state.queue.lock().remove(sequence);
                return WriteResponse::Error(error.into());
            }
        };
        if let Err(error) = self.sot.write(key.clone(), local).await {
            state.queue.lock().remove(sequence);
            return WriteResponse::Error(error.into());
        }
        if let Some(cache) = &self.cache {
            cache.put(key.clone(), value);
        }

        // Step 3: Drive the updater until this entry is acknowledged,
        // superseded by a newer acknowledged entry, or blocked by a failure.
        let _drive = state.drive.lock().await;
        loop {
            if !state.queue.lock().contains(sequence) {
                return WriteResponse::Success;
            }
            let candidate = state.queue.lock().candidate();
            let Some(candidate) = candidate else {
                return WriteResponse::Success;
            };

            match self.updater.drive(&key, &candidate.value).await {
                Ok(()) => {
                    state
                        .queue
                        .lock()
                        .complete(candidate.sequence, candidate.created_at);
                    let _ = self.bookkeeper.clear(&key).await;
                }
                Err(error) => {
                    let _ = self
                        .bookkeeper
                        .set_last_failed_sync(&key, now_millis())
                        .await;
                    tracing::warn!(
                        error = %error,
                        "origin push failed; write stays queued for replay"
                    );
                    return WriteResponse::Error(StoreError::Updater(error));
                }
            }
        }
    }

    /// Re-drives the queue for `key` until it drains or a push fails.
    ///
    /// On full drain the bookkeeping record is cleared -- including the case
    /// where a persisted record outlived a volatile queue and there is
    /// nothing left to replay this session.
    pub(crate) async fn replay(&self, key: &K) -> Result<(), UpdaterError> {
        let state = self.state_for(key);
        let _drive = state.drive.lock().await;
        loop {
            let candidate = state.queue.lock().candidate();
            let Some(candidate) = candidate else {
                let _ = self.bookkeeper.clear(key).await;
                return Ok(());
            };

            match self.updater.drive(key, &candidate.value).await {
                Ok(()) => {
                    state
                        .queue
                        .lock()
                        .complete(candidate.sequence, candidate.created_at);
                }
                Err(error) => {
                    let _ = self
                        .bookkeeper
                        .set_last_failed_sync(key, now_millis())
                        .await;
                    return Err(error);
                }
            }
        }
    }
}
