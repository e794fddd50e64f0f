//! The fetcher contract: how the engine pulls from the remote origin.
//!
//! A [`Fetcher`] is a named factory from key to a lazy sequence of
//! [`FetcherResult`] records. One-shot fetchers emit a single record and
//! complete; streaming fetchers keep emitting (server-sent events, long
//! polls). An optional fallback fetcher is consulted when the primary errors
//! before producing any data; fallbacks chain.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::FetcherError;

// ---------------------------------------------------------------------------
// FetcherResult
// ---------------------------------------------------------------------------

/// One emission from the origin.
#[derive(Debug, Clone)]
pub enum FetcherResult<N> {
    /// The origin produced a network-shaped value.
    Data {
        /// The network-shaped value.
        value: N,
        /// Name of the fetcher that produced it, when known.
        origin: Option<String>,
    },
    /// The origin failed; the engine surfaces this without tearing down the
    /// read stream.
    Error(FetcherError),
}

impl<N> FetcherResult<N> {
    /// Builds an unattributed data record.
    #[must_use]
    pub fn data(value: N) -> Self {
        Self::Data {
            value,
            origin: None,
        }
    }

    /// Whether this emission carries data.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

type FetchFactory<K, N> = Arc<dyn Fn(K) -> BoxStream<'static, FetcherResult<N>> + Send + Sync>;

/// Pulls network-shaped values from the remote origin.
///
/// Held as a value and shared via `Arc` by the fetch controller; `invoke`
/// starts one lazy origin sequence per call. The engine guarantees at most
/// one live invocation per key -- de-duplication happens above this type.
pub struct Fetcher<K, N> {
    name: Option<String>,
    fallback: Option<Arc<Fetcher<K, N>>>,
    factory: FetchFactory<K, N>,
}

impl<K, N: 'static> Fetcher<K, N> {
    /// Streaming fetcher: the factory returns a sequence of results.
    pub fn from_stream<F, S>(factory: F) -> Self
    where
        F: Fn(K) -> S + Send + Sync + 'static,
        S: Stream<Item = FetcherResult<N>> + Send + 'static,
    {
        Self {
            name: None,
            fallback: None,
            factory: Arc::new(move |key| factory(key).boxed()),
        }
    }

    /// One-shot fetcher: a single [`FetcherResult`] then completion.
    pub fn of_result<F, Fut>(factory: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<N>> + Send + 'static,
    {
        Self::from_stream(move |key| stream::once(factory(key)))
    }

    /// One-shot fetcher from a fallible async function. Errors are wrapped as
    /// [`FetcherError::Exception`].
    pub fn of<F, Fut>(factory: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<N>> + Send + 'static,
        N: Send + 'static,
    {
        Self::of_result(move |key| {
            let fut = factory(key);
            async move {
                match fut.await {
                    Ok(value) => FetcherResult::data(value),
                    Err(cause) => FetcherResult::Error(FetcherError::exception(cause)),
                }
            }
        })
    }

    /// Names this fetcher; the name is attached to data records and fallback
    /// log events.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Chains a fallback fetcher consulted when this one errors before
    /// producing any data.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Fetcher<K, N>) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// The configured name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The configured fallback, if any.
    #[must_use]
    pub fn fallback(&self) -> Option<&Arc<Fetcher<K, N>>> {
        self.fallback.as_ref()
    }

    /// Starts one origin sequence for `key`.
    ///
    /// The returned stream is lazy: nothing happens until it is polled.
    /// Fallback switching is the caller's job -- this invokes only the
    /// receiver itself.
    #[must_use]
    pub fn invoke(&self, key: K) -> BoxStream<'static, FetcherResult<N>> {
        let stream = (self.factory)(key);
        match &self.name {
            Some(name) => {
                let name = name.clone();
                stream
                    .map(move |result| match result {
                        FetcherResult::Data {
                            value,
                            origin: None,
                        } => FetcherResult::Data {
                            value,
                            origin: Some(name.clone()),
                        },
                        other => other,
                    })
                    .boxed()
            }
            None => stream,
        }
    }
}

impl<K, N> Clone for Fetcher<K, N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fallback: self.fallback.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<K, N> fmt::Debug for Fetcher<K, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("name", &self.name)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_shot_fetcher_emits_single_data_then_completes() {
        let fetcher = Fetcher::of(|key: u32| async move { Ok(key * 2) });

        let mut stream = fetcher.invoke(21);
        match stream.next().await {
            Some(FetcherResult::Data { value, origin }) => {
                assert_eq!(value, 42);
                assert_eq!(origin, None);
            }
            other => panic!("expected data, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn named_fetcher_stamps_data_records() {
        let fetcher = Fetcher::of(|_: u32| async move { Ok(1) }).with_name("api");

        let mut stream = fetcher.invoke(0);
        match stream.next().await {
            Some(FetcherResult::Data { origin, .. }) => {
                assert_eq!(origin.as_deref(), Some("api"));
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallible_fetcher_wraps_errors() {
        let fetcher = Fetcher::of(|_: u32| async move { Err::<i32, _>(anyhow::anyhow!("down")) });

        let mut stream = fetcher.invoke(0);
        match stream.next().await {
            Some(FetcherResult::Error(FetcherError::Exception(cause))) => {
                assert!(cause.to_string().contains("down"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn streaming_fetcher_emits_in_order() {
        let fetcher = Fetcher::from_stream(|base: i32| {
            stream::iter(vec![
                FetcherResult::data(base),
                FetcherResult::data(base + 1),
            ])
        });

        let collected: Vec<_> = fetcher.invoke(10).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(FetcherResult::is_data));
    }

    #[test]
    fn fallback_chain_is_discoverable() {
        let primary = Fetcher::of(|_: u32| async move { Ok(1) })
            .with_name("primary")
            .with_fallback(Fetcher::of(|_: u32| async move { Ok(2) }).with_name("secondary"));

        assert_eq!(primary.name(), Some("primary"));
        assert_eq!(
            primary.fallback().and_then(|f| f.name()),
            Some("secondary")
        );
    }
}
