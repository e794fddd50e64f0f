//! Per-key origin fetch controller.
//!
//! For each key the controller keeps one multicast slot `{subscriber count,
//! broadcast sender, origin task}`. The first subscriber starts the origin
//! drive task; later subscribers attach to the multicast; when the last one
//! detaches the origin task is aborted and the remote call cancelled with it.
//! Slots are created lazily and never removed while the engine is alive.
//!
//! The drive task owns every network-boundary crossing exactly once per
//! emission: convert `N → L`, write through the barrier, convert `L → V`,
//! multicast the outcome. Source-of-truth writes run on their own task, so a
//! cancelled fetch never abandons a half-applied write.

use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use depot_core::{
    Converter, Fetcher, FetcherResult, StoreError, StoreKey, StoreValue,
};

use crate::sot::SourceOfTruthWithBarrier;

/// Buffered events per key before a slow pipeline starts lagging.
const FETCH_CHANNEL_CAPACITY: usize = 64;

/// One multicast emission from a shared fetch.
#[derive(Debug, Clone)]
pub enum FetchEvent<V> {
    /// Origin data was converted and durably written; `version` is the
    /// barrier version the write established.
    Written {
        /// The fetched value in domain shape.
        value: V,
        /// Barrier version of the source-of-truth write.
        version: u64,
    },
    /// The origin call or its persistence failed; the slot stays live and
    /// later emissions keep flowing.
    Failed(StoreError),
}

/// Per-key multicast slot.
struct FetchSlot<V> {
    subscribers: usize,
    sender: broadcast::Sender<FetchEvent<V>>,
    task: Option<JoinHandle<()>>,
}

impl<V: StoreValue> FetchSlot<V> {
    fn new() -> Self {
        Self {
            subscribers: 0,
            sender: broadcast::channel(FETCH_CHANNEL_CAPACITY).0,
            task: None,
        }
    }

    fn origin_live(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Handle held by a read pipeline attached to a shared fetch.
///
/// Dropping the handle detaches it; the last detach for a key aborts the
/// origin task.
pub struct FetchSubscription<V> {
    slot: Arc<Mutex<FetchSlot<V>>>,
    receiver: broadcast::Receiver<FetchEvent<V>>,
}

impl<V: StoreValue> FetchSubscription<V> {
    /// Next multicast event. `None` only if the slot sender is gone, which
    /// cannot happen while the controller is alive.
    pub async fn recv(&mut self) -> Option<FetchEvent<V>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "fetch subscriber lagged; skipping to latest");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl<V> Drop for FetchSubscription<V> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        slot.subscribers = slot.subscribers.saturating_sub(1);
        if slot.subscribers == 0 {
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }
}

/// De-duplicates concurrent origin calls per key and multicasts the results.
pub struct FetcherController<K, V, N, L> {
    fetcher: Arc<Fetcher<K, N>>,
    converter: Arc<dyn Converter<N, L, V>>,
    sot: Arc<SourceOfTruthWithBarrier<K, L>>,
    slots: DashMap<K, Arc<Mutex<FetchSlot<V>>>>,
}

impl<K, V, N, L> FetcherController<K, V, N, L>
where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    /// Creates a controller over the given fetcher, converter, and barrier.
    #[must_use]
    pub fn new(
        fetcher: Fetcher<K, N>,
        converter: Arc<dyn Converter<N, L, V>>,
        sot: Arc<SourceOfTruthWithBarrier<K, L>>,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            converter,
            sot,
            slots: DashMap::new(),
        }
    }

    /// Attaches to the shared fetch for `key`, starting an origin call if
    /// none is live.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, key: &K) -> FetchSubscription<V> {
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(FetchSlot::new())))
            .clone();

        let mut guard = slot.lock();
        guard.subscribers += 1;
        let receiver = guard.sender.subscribe();

        if !guard.origin_live() {
            let task = tokio::spawn(drive_origin(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.converter),
                Arc::clone(&self.sot),
                key.clone(),
                guard.sender.clone(),
            ));
            guard.task = Some(task);
        }
        drop(guard);

        FetchSubscription { slot, receiver }
    }
}

/// Drives one origin call for `key`, walking the fallback chain when the
/// primary errors before producing any data.
async fn drive_origin<K, V, N, L>(
    fetcher: Arc<Fetcher<K, N>>,
    converter: Arc<dyn Converter<N, L, V>>,
    sot: Arc<SourceOfTruthWithBarrier<K, L>>,
    key: K,
    sink: broadcast::Sender<FetchEvent<V>>,
) where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    let mut current = fetcher;
    let mut delivered_data = false;

    loop {
        let mut stream = current.invoke(key.clone());
        let mut switched = false;

        while let Some(result) = stream.next().await {
            match result {
                FetcherResult::Data { value, .. } => {
                    delivered_data = true;
                    // Persist on an independent task: aborting this fetch
                    // must not abandon an in-flight source-of-truth write.
                    let persist = tokio::spawn(persist_fetched(
                        Arc::clone(&converter),
                        Arc::clone(&sot),
                        key.clone(),
                        value,
                        sink.clone(),
                    ));
                    let _ = persist.await;
                }
                FetcherResult::Error(error) => {
                    if !delivered_data {
                        if let Some(fallback) = current.fallback().cloned() {
                            tracing::debug!(
                                from = current.name().unwrap_or("<unnamed>"),
                                to = fallback.name().unwrap_or("<unnamed>"),
                                "fetch failed before data; switching to fallback"
                            );
                            current = fallback;
                            switched = true;
                            break;
                        }
                    }
                    let _ = sink.send(FetchEvent::Failed(error.into()));
                }
            }
        }

        if !switched {
            break;
        }
    }
}

/// Converts one fetched value, writes it through the barrier, and multicasts
/// the outcome. The `Written` event is published while the write barrier is
/// still held, so no reader can surface the echo before subscribers learn its
/// version.
async fn persist_fetched<K, V, N, L>(
    converter: Arc<dyn Converter<N, L, V>>,
    sot: Arc<SourceOfTruthWithBarrier<K, L>>,
    key: K,
    network: N,
    sink: broadcast::Sender<FetchEvent<V>>,
) where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    let local = match converter.from_network(network) {
        Ok(local) => local,
        Err(error) => {
            let _ = sink.send(FetchEvent::Failed(error.into()));
            return;
        }
    };
    let domain = match converter.to_domain(local.clone()) {
        Ok(domain) => domain,
        Err(error) => {
            let _ = sink.send(FetchEvent::Failed(error.into()));
            return;
        }
    };

    let publish = sink.clone();
    match sot
        .write_with(key, local, move |version| {
            let _ = publish.send(FetchEvent::Written {
                value: domain,
                version,
            });
        })
        .await
    {
        Ok(_) => {}
        Err(error) => {
            tracing::warn!(error = %error, "failed to persist fetched value");
            let _ = sink.send(FetchEvent::Failed(error.into()));
        }
    }
}
