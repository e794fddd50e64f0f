//! Collaborator contracts plugged into the engine.
//!
//! The engine coordinates; these traits do the actual storage, translation,
//! and bookkeeping. Implementations: SQLite/room-style databases or a plain
//! file tree for [`SourceOfTruth`], a `{key, timestamp}` table for
//! [`Bookkeeper`], and in-memory variants (in `depot-client`) for tests and
//! ephemeral data.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

// ---------------------------------------------------------------------------
// SourceOfTruth
// ---------------------------------------------------------------------------

/// Durable local store treated as authoritative for offline reads.
///
/// Used as `Arc<dyn SourceOfTruth<K, L>>`.
#[async_trait]
pub trait SourceOfTruth<K, L>: Send + Sync {
    /// Lazy observable sequence for `key`: emits the currently stored value
    /// (or `None` when absent) promptly, then every subsequent change, until
    /// the subscriber detaches. Restartable; must support concurrent
    /// subscriptions for the same key.
    fn reader(&self, key: K) -> BoxStream<'static, anyhow::Result<Option<L>>>;

    /// Upsert; resolves once the value is durable.
    async fn write(&self, key: K, value: L) -> anyhow::Result<()>;

    /// Durable removal of a single key.
    async fn delete(&self, key: K) -> anyhow::Result<()>;

    /// Durable removal of everything.
    async fn delete_all(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Bookkeeper
// ---------------------------------------------------------------------------

/// Records origin pushes that failed, for later reconciliation.
///
/// A present timestamp for a key means at least one local write has not been
/// durably pushed; a successful push clears it. Persistence is recommended --
/// volatile implementations lose cross-session reconciliation.
///
/// Used as `Arc<dyn Bookkeeper<K>>`.
#[async_trait]
pub trait Bookkeeper<K>: Send + Sync {
    /// Wall-clock millis of the most recent failed push for `key`, if any.
    async fn last_failed_sync(&self, key: &K) -> Option<i64>;

    /// Records a failed push. Returns `false` if the record could not be
    /// stored.
    async fn set_last_failed_sync(&self, key: &K, timestamp_millis: i64) -> bool;

    /// Clears the record for `key`. Returns `false` on storage failure.
    async fn clear(&self, key: &K) -> bool;

    /// Clears every record. Returns `false` on storage failure.
    async fn clear_all(&self) -> bool;
}

/// Row shape for persistent bookkeeper backends.
///
/// `key` is any stable rendering of the engine key (persistent backends must
/// be able to derive it from `K`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailureRecord {
    /// Stable rendering of the engine key.
    pub key: String,
    /// Wall-clock millis of the most recent failed push.
    pub timestamp_millis: i64,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Pure transforms between the network (`N`), local (`L`), and domain (`V`)
/// shapes.
///
/// The engine calls each function exactly once per boundary crossing.
/// Converters are expected to be total; a `ConversionError` is surfaced on
/// the response stream in the rare case they are not.
pub trait Converter<N, L, V>: Send + Sync {
    /// Network shape to local shape, applied to fetched data before the
    /// source-of-truth write.
    fn from_network(&self, network: N) -> Result<L, ConversionError>;

    /// Domain shape to local shape, applied to consumer writes.
    fn from_domain(&self, value: V) -> Result<L, ConversionError>;

    /// Local shape to domain shape, applied to everything read back out.
    fn to_domain(&self, local: L) -> Result<V, ConversionError>;
}

/// Converter for stores where the three shapes coincide.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl<T> Converter<T, T, T> for IdentityConverter
where
    T: Send + Sync,
{
    fn from_network(&self, network: T) -> Result<T, ConversionError> {
        Ok(network)
    }

    fn from_domain(&self, value: T) -> Result<T, ConversionError> {
        Ok(value)
    }

    fn to_domain(&self, local: T) -> Result<T, ConversionError> {
        Ok(local)
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Decides whether a locally held value is still acceptable to serve.
///
/// Consulted for memory-cache and source-of-truth values only; origin-fetched
/// data is assumed valid. Must be pure and must not block. Absent validator
/// means every value is valid.
pub trait Validator<V>: Send + Sync {
    /// `true` when the value may be served.
    fn is_valid(&self, value: &V) -> bool;
}

impl<V, F> Validator<V> for F
where
    F: Fn(&V) -> bool + Send + Sync,
{
    fn is_valid(&self, value: &V) -> bool {
        self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_converter_round_trips() {
        let converter = IdentityConverter;
        let local = converter.from_network(5).unwrap();
        assert_eq!(converter.to_domain(local).unwrap(), 5);
        assert_eq!(converter.from_domain(5).unwrap(), 5);
    }

    #[test]
    fn closures_are_validators() {
        let validator = |v: &i32| *v > 0;
        assert!(Validator::is_valid(&validator, &1));
        assert!(!Validator::is_valid(&validator, &-1));
    }

    #[test]
    fn sync_failure_record_serializes_camel_case() {
        let record = SyncFailureRecord {
            key: "user:1".to_string(),
            timestamp_millis: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("timestampMillis"));

        let parsed: SyncFailureRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
