//! The public store: builder, read streams, writes, and clears.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use depot_core::{
    Bookkeeper, Converter, Fetcher, IdentityConverter, ReadRequest, ReadResponse, SourceOfTruth,
    SourceOfTruthError, StoreKey, StoreValue, Updater, UpdaterError, Validator, WriteRequest,
    WriteResponse,
};

use crate::bookkeeper::InMemoryBookkeeper;
use crate::cache::{CacheConfig, CacheStats, MemoryCache};
use crate::fetch::FetcherController;
use crate::gate::ConflictGate;
use crate::pipeline;
use crate::sot::SourceOfTruthWithBarrier;
use crate::write::driver::{AnyUpdater, WritePipeline};

/// Response records buffered per subscription before the pipeline task waits
/// for the consumer.
const READ_CHANNEL_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// StoreInner
// ---------------------------------------------------------------------------

/// Shared engine state behind every [`Store`] clone.
pub(crate) struct StoreInner<K, V, N, L> {
    pub(crate) cache: Option<Arc<MemoryCache<K, V>>>,
    pub(crate) sot: Arc<SourceOfTruthWithBarrier<K, L>>,
    pub(crate) controller: FetcherController<K, V, N, L>,
    pub(crate) converter: Arc<dyn Converter<N, L, V>>,
    pub(crate) validator: Option<Arc<dyn Validator<V>>>,
    pub(crate) writes: Option<Arc<WritePipeline<K, V, L>>>,
    pub(crate) gate: Option<ConflictGate<K, V, L>>,
}

impl<K, V, N, L> StoreInner<K, V, N, L> {
    pub(crate) fn is_valid(&self, value: &V) -> bool {
        self.validator
            .as_ref()
            .is_none_or(|validator| validator.is_valid(value))
    }
}

// ---------------------------------------------------------------------------
// ReadStream
// ---------------------------------------------------------------------------

/// An independent subscription to a read request.
///
/// Unbounded: it keeps delivering records until dropped. Dropping it cancels
/// the pipeline task, the local read, and -- when this was the last subscriber
/// for the key -- the in-flight origin call.
pub struct ReadStream<V> {
    inner: ReceiverStream<ReadResponse<V>>,
}

impl<V> ReadStream<V> {
    fn new(receiver: mpsc::Receiver<ReadResponse<V>>) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
        }
    }

    /// Next response record. `None` only after the engine is gone.
    pub async fn next(&mut self) -> Option<ReadResponse<V>> {
        self.inner.next().await
    }
}

impl<V> Stream for ReadStream<V> {
    type Item = ReadResponse<V>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Client-side data-access engine over a memory cache, a durable source of
/// truth, and a remote origin.
///
/// Cheap to clone; clones share all state. Reads are served through
/// [`stream`](Store::stream); local-first writes through
/// [`write`](Store::write) when the store was built with an updater.
pub struct Store<K, V, N = V, L = V> {
    inner: Arc<StoreInner<K, V, N, L>>,
}

impl<K, V, N, L> Clone for Store<K, V, N, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, N, L> Store<K, V, N, L>
where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    /// Subscribes to `request`, returning an independent response stream.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn stream(&self, request: ReadRequest<K>) -> ReadStream<V> {
        let (tx, rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
        tokio::spawn(pipeline::run(Arc::clone(&self.inner), request, tx));
        ReadStream::new(rx)
    }

    /// Applies a local-first write and pushes it to the origin.
    ///
    /// Resolves once both the optimistic local write and the origin push have
    /// settled. Cancelling the returned future does not cancel the write: the
    /// work runs on a detached task so a started push always completes its
    /// bookkeeping.
    pub async fn write(&self, request: WriteRequest<K, V>) -> WriteResponse {
        let Some(writes) = &self.inner.writes else {
            return WriteResponse::Error(
                UpdaterError::message("store was built without an updater").into(),
            );
        };

        let writes = Arc::clone(writes);
        let task = tokio::spawn(async move { writes.write(request).await });
        match task.await {
            Ok(response) => response,
            Err(_) => {
                WriteResponse::Error(UpdaterError::message("write task terminated").into())
            }
        }
    }

    /// Invalidates the memory entry and deletes the source-of-truth entry for
    /// `key`. The origin is not touched; active subscribers observe the
    /// deletion through their readers.
    pub async fn clear(&self, key: K) -> Result<(), SourceOfTruthError> {
        if let Some(cache) = &self.inner.cache {
            cache.invalidate(&key);
        }
        self.inner.sot.delete(key).await.map(|_| ())
    }

    /// Invalidates the entire memory cache and deletes everything from the
    /// source of truth. In-flight fetches are not cancelled; their results
    /// repopulate the emptied store.
    pub async fn clear_all(&self) -> Result<(), SourceOfTruthError> {
        if let Some(cache) = &self.inner.cache {
            cache.invalidate_all();
        }
        self.inner.sot.delete_all().await
    }

    /// Hit/miss counters of the memory cache, when one is configured.
    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.inner.cache.as_ref().map(|cache| cache.stats())
    }
}

// ---------------------------------------------------------------------------
// StoreBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`Store`] from its collaborators.
///
/// Mutable mode is opted into by configuring an [`Updater`]; the bookkeeper
/// defaults to the volatile in-memory one unless a persistent implementation
/// is supplied.
pub struct StoreBuilder<K, V, N = V, L = V> {
    fetcher: Fetcher<K, N>,
    source_of_truth: Arc<dyn SourceOfTruth<K, L>>,
    converter: Arc<dyn Converter<N, L, V>>,
    validator: Option<Arc<dyn Validator<V>>>,
    cache_config: CacheConfig,
    cache_enabled: bool,
    updater: Option<Arc<dyn AnyUpdater<K, V>>>,
    bookkeeper: Option<Arc<dyn Bookkeeper<K>>>,
}

impl<K, V, N, L> StoreBuilder<K, V, N, L>
where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    /// Starts a builder from the three mandatory collaborators.
    #[must_use]
    pub fn new(
        fetcher: Fetcher<K, N>,
        source_of_truth: Arc<dyn SourceOfTruth<K, L>>,
        converter: impl Converter<N, L, V> + 'static,
    ) -> Self {
        Self {
            fetcher,
            source_of_truth,
            converter: Arc::new(converter),
            validator: None,
            cache_config: CacheConfig::default(),
            cache_enabled: true,
            updater: None,
            bookkeeper: None,
        }
    }

    /// Installs a validator consulted for cache and source-of-truth values.
    #[must_use]
    pub fn validator(mut self, validator: impl Validator<V> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Overrides the memory-cache configuration.
    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Disables the memory cache entirely; reads go straight to the source of
    /// truth.
    #[must_use]
    pub fn no_memory_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Enables mutable mode with the given updater.
    #[must_use]
    pub fn updater<U>(mut self, updater: U) -> Self
    where
        U: Updater<K, V> + 'static,
    {
        self.updater = Some(Arc::new(updater));
        self
    }

    /// Installs a bookkeeper for failed-sync records; defaults to the
    /// volatile in-memory implementation.
    #[must_use]
    pub fn bookkeeper(mut self, bookkeeper: Arc<dyn Bookkeeper<K>>) -> Self {
        self.bookkeeper = Some(bookkeeper);
        self
    }

    /// Wires everything together.
    #[must_use]
    pub fn build(self) -> Store<K, V, N, L> {
        let cache = self
            .cache_enabled
            .then(|| Arc::new(MemoryCache::new(self.cache_config)));
        let sot = Arc::new(SourceOfTruthWithBarrier::new(self.source_of_truth));
        let controller =
            FetcherController::new(self.fetcher, Arc::clone(&self.converter), Arc::clone(&sot));

        let (writes, gate) = match self.updater {
            Some(updater) => {
                let bookkeeper = self
                    .bookkeeper
                    .unwrap_or_else(|| Arc::new(InMemoryBookkeeper::new()));
                let converter = Arc::clone(&self.converter);
                let writes = Arc::new(WritePipeline::new(
                    updater,
                    Arc::clone(&bookkeeper),
                    Arc::new(move |value| converter.from_domain(value)),
                    Arc::clone(&sot),
                    cache.clone(),
                ));
                let gate = ConflictGate::new(bookkeeper, Arc::clone(&writes));
                (Some(writes), Some(gate))
            }
            None => (None, None),
        };

        Store {
            inner: Arc::new(StoreInner {
                cache,
                sot,
                controller,
                converter: self.converter,
                validator: self.validator,
                writes,
                gate,
            }),
        }
    }
}

impl<K, V> StoreBuilder<K, V>
where
    K: StoreKey,
    V: StoreValue,
{
    /// Builder for stores whose network, local, and domain shapes coincide.
    #[must_use]
    pub fn identity(fetcher: Fetcher<K, V>, source_of_truth: Arc<dyn SourceOfTruth<K, V>>) -> Self {
        Self::new(fetcher, source_of_truth, IdentityConverter)
    }
}
