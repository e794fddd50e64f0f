//! Per-key write barrier over the source of truth.
//!
//! Every write for a key takes that key's exclusive barrier and bumps a
//! monotonically increasing version before calling through. Reader
//! subscriptions forward the underlying emissions, but acquire the shared
//! side of the barrier before each forward -- so an emission is never
//! delivered while a write for the same key is still in flight, and each
//! emission is stamped with the version current once that write has landed.
//!
//! Contract: for a given key, the values any subscriber observes form a
//! suffix of the totally ordered write history of that key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::RwLock;

use depot_core::{SourceOfTruth, SourceOfTruthError, StoreKey, StoreValue};

/// A source-of-truth emission stamped with its barrier version.
#[derive(Debug, Clone)]
pub struct Versioned<L> {
    /// Version current once the producing write completed.
    pub version: u64,
    /// The stored value, or `None` when the key is absent.
    pub value: Option<L>,
}

/// Per-key barrier state. Created lazily, never removed while the engine is
/// alive -- removal would race against concurrent lookups.
#[derive(Default)]
struct KeyState {
    barrier: RwLock<()>,
    version: AtomicU64,
}

/// Serializes writes against concurrent reads, per key.
pub struct SourceOfTruthWithBarrier<K, L> {
    inner: Arc<dyn SourceOfTruth<K, L>>,
    states: DashMap<K, Arc<KeyState>>,
}

impl<K, L> SourceOfTruthWithBarrier<K, L>
where
    K: StoreKey,
    L: StoreValue,
{
    /// Wraps a source of truth.
    #[must_use]
    pub fn new(inner: Arc<dyn SourceOfTruth<K, L>>) -> Self {
        Self {
            inner,
            states: DashMap::new(),
        }
    }

    fn state_for(&self, key: &K) -> Arc<KeyState> {
        self.states
            .entry(key.clone())
            .or_insert_with(Arc::default)
            .clone()
    }

    /// Current version for `key` (0 if never written through the barrier).
    #[must_use]
    pub fn current_version(&self, key: &K) -> u64 {
        self.states
            .get(key)
            .map_or(0, |state| state.version.load(Ordering::Acquire))
    }

    /// Upserts `value` under the key's exclusive barrier.
    ///
    /// Returns the version established by this write.
    pub async fn write(&self, key: K, value: L) -> Result<u64, SourceOfTruthError> {
        self.write_with(key, value, |_| {}).await
    }

    /// Upserts `value` and runs `on_committed` with the new version while the
    /// exclusive barrier is still held.
    ///
    /// Readers stamping emissions wait on the shared side of the barrier, so
    /// anything `on_committed` publishes is observable before the write's own
    /// echo can be delivered.
    pub async fn write_with<F>(
        &self,
        key: K,
        value: L,
        on_committed: F,
    ) -> Result<u64, SourceOfTruthError>
    where
        F: FnOnce(u64) + Send,
    {
        let state = self.state_for(&key);
        let _guard = state.barrier.write().await;
        let version = state.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner
            .write(key, value)
            .await
            .map_err(SourceOfTruthError::write)?;
        on_committed(version);
        Ok(version)
    }

    /// Deletes the key under its exclusive barrier.
    ///
    /// Returns the version established by the deletion.
    pub async fn delete(&self, key: K) -> Result<u64, SourceOfTruthError> {
        let state = self.state_for(&key);
        let _guard = state.barrier.write().await;
        let version = state.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner
            .delete(key)
            .await
            .map_err(SourceOfTruthError::write)?;
        Ok(version)
    }

    /// Deletes everything.
    ///
    /// Not transactional across keys: writes racing this call may land before
    /// or after the sweep. Versions of all known keys are bumped afterwards so
    /// their readers re-emit.
    pub async fn delete_all(&self) -> Result<(), SourceOfTruthError> {
        self.inner
            .delete_all()
            .await
            .map_err(SourceOfTruthError::write)?;
        for state in self.states.iter() {
            state.version.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Observable sequence of version-stamped values for `key`.
    ///
    /// Lazy and restartable; each call is an independent subscription bound
    /// to the version observed at subscribe time.
    #[must_use]
    pub fn reader(
        &self,
        key: K,
    ) -> BoxStream<'static, Result<Versioned<L>, SourceOfTruthError>> {
        let state = self.state_for(&key);
        let inner = self.inner.reader(key);

        stream::unfold((inner, state), |(mut inner, state)| async move {
            let item = inner.next().await?;
            // Wait out any in-flight write for this key, then stamp with the
            // version that write established.
            let version = {
                let _guard = state.barrier.read().await;
                state.version.load(Ordering::Acquire)
            };
            let stamped = match item {
                Ok(value) => Ok(Versioned { version, value }),
                Err(cause) => Err(SourceOfTruthError::read(cause)),
            };
            Some((stamped, (inner, state)))
        })
        .boxed()
    }
}
