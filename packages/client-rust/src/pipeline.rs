//! The read pipeline: gate, memory cache, source of truth, and fetch
//! controller composed into one unbounded response stream.
//!
//! Each subscription runs this pipeline on its own task, feeding a bounded
//! channel. The stream never terminates on its own -- it ends when the
//! consumer drops the receiving end, which cancels the local read and
//! detaches from the fetch multicast.
//!
//! Fetch-echo discipline: the controller publishes `Written { version }`
//! while the write barrier is still held, so the event is always observable
//! before the write's echo can reach a reader. The pipeline emits the fetched
//! value once, tagged `Fetcher`, and drops source-of-truth emissions stamped
//! at or below the last fetch version -- those carry states the fetch already
//! superseded.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;

use depot_core::{
    ReadPolicy, ReadRequest, ReadResponse, ResponseOrigin, SourceOfTruthError, StoreError,
    StoreKey, StoreValue,
};

use crate::fetch::FetchEvent;
use crate::sot::Versioned;
use crate::store::StoreInner;

pub(crate) async fn run<K, V, N, L>(
    inner: Arc<StoreInner<K, V, N, L>>,
    request: ReadRequest<K>,
    tx: mpsc::Sender<ReadResponse<V>>,
) where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    let ReadRequest { key, policy } = request;

    // Step 1: Conflict-resolution gate. Unresolved local changes are pushed
    // before origin data can be pulled on top of them; a failed replay is
    // reported but the read proceeds.
    if let Some(gate) = &inner.gate {
        if let Err(error) = gate.resolve(&key).await {
            if tx
                .send(ReadResponse::Error(StoreError::Updater(error)))
                .await
                .is_err()
            {
                return;
            }
        }
    }

    // Step 2: Memory cache.
    let mut emitted_any = false;
    if policy.reads_memory() {
        if let Some(cache) = &inner.cache {
            if let Some(value) = cache.get(&key) {
                if inner.is_valid(&value) {
                    if tx
                        .send(ReadResponse::Data {
                            value,
                            origin: ResponseOrigin::Cache,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    emitted_any = true;
                }
            }
        }
    }

    // Step 3: Decision -- plan a fetch or a local-only read.
    if policy.wants_fetch() {
        composite(&inner, key, policy, emitted_any, &tx).await;
    } else {
        local_only(&inner, key, &tx).await;
    }
}

/// Local-only plan: serve the source-of-truth reader until the consumer
/// leaves. Absent and validator-rejected values surface as `NoNewData`.
async fn local_only<K, V, N, L>(
    inner: &Arc<StoreInner<K, V, N, L>>,
    key: K,
    tx: &mpsc::Sender<ReadResponse<V>>,
) where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    let mut reader = inner.sot.reader(key.clone());

    loop {
        tokio::select! {
            item = reader.next() => {
                let Some(item) = item else {
                    // The underlying reader ended; the response stream stays
                    // open until the consumer unsubscribes.
                    tx.closed().await;
                    return;
                };
                let response = match item {
                    Err(error) => ReadResponse::Error(StoreError::SourceOfTruth(error)),
                    Ok(Versioned { value: None, .. }) => ReadResponse::NoNewData {
                        origin: ResponseOrigin::SourceOfTruth,
                    },
                    Ok(Versioned { value: Some(local), .. }) => {
                        match inner.converter.to_domain(local) {
                            Err(error) => ReadResponse::Error(error.into()),
                            Ok(value) if inner.is_valid(&value) => {
                                if let Some(cache) = &inner.cache {
                                    cache.put(key.clone(), value.clone());
                                }
                                ReadResponse::Data {
                                    value,
                                    origin: ResponseOrigin::SourceOfTruth,
                                }
                            }
                            Ok(_) => ReadResponse::NoNewData {
                                origin: ResponseOrigin::SourceOfTruth,
                            },
                        }
                    }
                };
                if tx.send(response).await.is_err() {
                    return;
                }
            }
            () = tx.closed() => return,
        }
    }
}

/// Composite plan: source-of-truth reader and fetch multicast together.
async fn composite<K, V, N, L>(
    inner: &Arc<StoreInner<K, V, N, L>>,
    key: K,
    policy: ReadPolicy,
    emitted_any: bool,
    tx: &mpsc::Sender<ReadResponse<V>>,
) where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    // `Fresh` observes the reader only to stay live after the fetch; it never
    // surfaces pre-fetch local state. `SkipDisk` runs without a reader.
    let use_reader = policy.reads_disk() || policy == ReadPolicy::Fresh;
    let suppress_until_fetch = policy == ReadPolicy::Fresh;

    let mut reader = if use_reader {
        Some(inner.sot.reader(key.clone()))
    } else {
        None
    };
    let mut fetch = inner.controller.subscribe(&key);

    if !emitted_any && tx.send(ReadResponse::Loading).await.is_err() {
        return;
    }

    // Highest barrier version already surfaced via a fetch event.
    let mut last_fetch_version: u64 = 0;
    let mut saw_initial = false;
    let mut fetch_delivered = false;

    loop {
        tokio::select! {
            // Events first: a `Written` event must register before the
            // write's echo is classified.
            biased;

            event = fetch.recv() => {
                let Some(event) = event else { return; };
                match event {
                    FetchEvent::Written { value, version } => {
                        fetch_delivered = true;
                        if version > last_fetch_version {
                            last_fetch_version = version;
                            if let Some(cache) = &inner.cache {
                                cache.put(key.clone(), value.clone());
                            }
                            if tx
                                .send(ReadResponse::Data {
                                    value,
                                    origin: ResponseOrigin::Fetcher,
                                })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    FetchEvent::Failed(error) => {
                        if tx.send(ReadResponse::Error(error)).await.is_err() {
                            return;
                        }
                    }
                }
            }

            item = next_versioned(&mut reader), if reader.is_some() => {
                let Some(item) = item else {
                    reader = None;
                    continue;
                };
                let initial = !saw_initial;
                saw_initial = true;

                let response = match item {
                    Err(error) => Some(ReadResponse::Error(StoreError::SourceOfTruth(error))),
                    Ok(versioned) => {
                        // States at or below the last fetch version were
                        // already superseded by the fetched emission.
                        if last_fetch_version > 0 && versioned.version <= last_fetch_version {
                            None
                        } else if suppress_until_fetch && !fetch_delivered {
                            None
                        } else {
                            classify_local(inner, &key, versioned, initial)
                        }
                    }
                };
                if let Some(response) = response {
                    if tx.send(response).await.is_err() {
                        return;
                    }
                }
            }

            () = tx.closed() => return,
        }
    }
}

/// Classifies one source-of-truth emission in composite mode.
///
/// The initial emission of absent or invalid data is skipped silently -- the
/// outstanding fetch supplies the data and nothing should sit between
/// `Loading` and it. A later absent emission is a deletion and surfaces as
/// `NoNewData`.
fn classify_local<K, V, N, L>(
    inner: &Arc<StoreInner<K, V, N, L>>,
    key: &K,
    versioned: Versioned<L>,
    initial: bool,
) -> Option<ReadResponse<V>>
where
    K: StoreKey,
    V: StoreValue,
    N: StoreValue,
    L: StoreValue,
{
    match versioned.value {
        None => {
            if initial {
                None
            } else {
                Some(ReadResponse::NoNewData {
                    origin: ResponseOrigin::SourceOfTruth,
                })
            }
        }
        Some(local) => match inner.converter.to_domain(local) {
            Err(error) => Some(ReadResponse::Error(error.into())),
            Ok(value) => {
                if inner.is_valid(&value) {
                    if let Some(cache) = &inner.cache {
                        cache.put(key.clone(), value.clone());
                    }
                    Some(ReadResponse::Data {
                        value,
                        origin: ResponseOrigin::SourceOfTruth,
                    })
                } else {
                    None
                }
            }
        },
    }
}

/// Polls the optional reader; pends forever when it is gone so the
/// surrounding `select!` arm stays quiet.
async fn next_versioned<L>(
    reader: &mut Option<BoxStream<'static, Result<Versioned<L>, SourceOfTruthError>>>,
) -> Option<Result<Versioned<L>, SourceOfTruthError>> {
    match reader.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
