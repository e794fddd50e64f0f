//! Typed error taxonomy for the read and write pipelines.
//!
//! Collaborators fail with `anyhow::Error`; the engine wraps each cause into
//! the per-layer enum for the boundary it crossed and surfaces the result as
//! a [`StoreError`] record on the response streams. Every variant is `Clone`
//! (causes are reference-counted) so a single failure can be multicast to all
//! subscribers of a shared fetch.

use std::sync::Arc;

// ---------------------------------------------------------------------------
// FetcherError
// ---------------------------------------------------------------------------

/// Errors produced by the origin fetcher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetcherError {
    /// The fetcher raised an error carrying a full cause chain.
    #[error("fetch failed: {0}")]
    Exception(Arc<anyhow::Error>),
    /// The fetcher reported a bare message with no cause attached.
    #[error("fetch failed: {0}")]
    Message(String),
    /// Origin-specific structured payload, passed through verbatim.
    #[error("fetch failed: {0}")]
    Custom(serde_json::Value),
}

impl FetcherError {
    /// Wraps a cause chain into a multicast-safe `Exception` variant.
    #[must_use]
    pub fn exception(cause: anyhow::Error) -> Self {
        Self::Exception(Arc::new(cause))
    }

    /// Builds a bare-message error.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }
}

// ---------------------------------------------------------------------------
// SourceOfTruthError
// ---------------------------------------------------------------------------

/// Errors produced by the durable local store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceOfTruthError {
    /// A reader subscription failed.
    #[error("source-of-truth read failed: {0}")]
    Read(Arc<anyhow::Error>),
    /// An upsert or delete failed.
    #[error("source-of-truth write failed: {0}")]
    Write(Arc<anyhow::Error>),
}

impl SourceOfTruthError {
    /// Wraps a read-path cause.
    #[must_use]
    pub fn read(cause: anyhow::Error) -> Self {
        Self::Read(Arc::new(cause))
    }

    /// Wraps a write-path cause.
    #[must_use]
    pub fn write(cause: anyhow::Error) -> Self {
        Self::Write(Arc::new(cause))
    }
}

// ---------------------------------------------------------------------------
// UpdaterError
// ---------------------------------------------------------------------------

/// Errors produced when pushing a local write to the origin.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpdaterError {
    /// The push raised an error carrying a full cause chain.
    #[error("origin push failed: {0}")]
    Exception(Arc<anyhow::Error>),
    /// The push failed with a bare message.
    #[error("origin push failed: {0}")]
    Message(String),
}

impl UpdaterError {
    /// Wraps a cause chain into a multicast-safe `Exception` variant.
    #[must_use]
    pub fn exception(cause: anyhow::Error) -> Self {
        Self::Exception(Arc::new(cause))
    }

    /// Builds a bare-message error.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }
}

// ---------------------------------------------------------------------------
// ConversionError
// ---------------------------------------------------------------------------

/// A converter rejected a value at a boundary crossing.
///
/// Converters are expected to be total; this surfaces the rare cases where
/// they are not (corrupt local rows, incompatible schema revisions).
#[derive(Debug, Clone, thiserror::Error)]
#[error("conversion failed: {cause}")]
pub struct ConversionError {
    cause: Arc<anyhow::Error>,
}

impl ConversionError {
    /// Wraps the underlying cause.
    #[must_use]
    pub fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            cause: Arc::new(cause.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Aggregate error record carried by read and write responses.
///
/// The variant names the boundary that failed; the payload carries the kind
/// and detail. Errors are data on the response streams, never panics: a read
/// stream stays open after emitting one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The origin fetch failed.
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),
    /// The durable local store failed.
    #[error("source-of-truth error: {0}")]
    SourceOfTruth(#[from] SourceOfTruthError),
    /// The origin push failed.
    #[error("updater error: {0}")]
    Updater(#[from] UpdaterError),
    /// A converter rejected a value.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),
}

impl StoreError {
    /// Returns `true` if this error came from the origin fetch.
    #[must_use]
    pub fn is_fetcher(&self) -> bool {
        matches!(self, Self::Fetcher(_))
    }

    /// Returns `true` if this error came from the durable local store.
    #[must_use]
    pub fn is_source_of_truth(&self) -> bool {
        matches!(self, Self::SourceOfTruth(_))
    }

    /// Returns `true` if this error came from the origin push.
    #[must_use]
    pub fn is_updater(&self) -> bool {
        matches!(self, Self::Updater(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_message_displays_text() {
        let err = StoreError::from(FetcherError::message("boom"));
        assert_eq!(err.to_string(), "fetcher error: fetch failed: boom");
        assert!(err.is_fetcher());
    }

    #[test]
    fn source_of_truth_error_carries_cause() {
        let err = SourceOfTruthError::write(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("disk full"));

        let aggregated = StoreError::from(err.clone());
        assert!(aggregated.is_source_of_truth());
        assert!(!aggregated.is_fetcher());

        // Clones share the cause.
        let clone = err.clone();
        assert_eq!(clone.to_string(), err.to_string());
    }

    #[test]
    fn conversion_error_wraps_any_std_error() {
        let parse_err = "abc".parse::<i64>().unwrap_err();
        let err = ConversionError::new(parse_err);
        assert!(err.to_string().starts_with("conversion failed"));
    }

    #[test]
    fn custom_payload_round_trips_through_display() {
        let err = FetcherError::Custom(serde_json::json!({"code": 429}));
        assert!(err.to_string().contains("429"));
    }
}
