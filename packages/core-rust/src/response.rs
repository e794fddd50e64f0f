//! Read and write response types.
//!
//! Every emission on a read stream is a [`ReadResponse`]; every failure mode
//! is observable as a typed record. Streams never terminate with an error --
//! errors are data and the stream stays open.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// ResponseOrigin
// ---------------------------------------------------------------------------

/// The layer a response record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseOrigin {
    /// The in-memory cache.
    Cache,
    /// The durable local store.
    SourceOfTruth,
    /// The remote origin.
    Fetcher,
}

// ---------------------------------------------------------------------------
// ReadResponse
// ---------------------------------------------------------------------------

/// One record on a read stream.
#[derive(Debug, Clone)]
pub enum ReadResponse<V> {
    /// A fetch is outstanding and no layer has produced anything yet.
    Loading,
    /// A value, tagged with the layer that produced it.
    Data {
        /// The domain value.
        value: V,
        /// Layer that produced the value.
        origin: ResponseOrigin,
    },
    /// The layer was consulted and holds nothing acceptable.
    NoNewData {
        /// Layer that came up empty.
        origin: ResponseOrigin,
    },
    /// A non-terminal failure; subsequent records keep flowing.
    Error(StoreError),
}

impl<V> ReadResponse<V> {
    /// Consumes the record, returning the value if it carries one.
    #[must_use]
    pub fn value(self) -> Option<V> {
        match self {
            Self::Data { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Borrows the value if the record carries one.
    #[must_use]
    pub fn value_ref(&self) -> Option<&V> {
        match self {
            Self::Data { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The layer this record came from, when it names one.
    #[must_use]
    pub fn origin(&self) -> Option<ResponseOrigin> {
        match self {
            Self::Data { origin, .. } | Self::NoNewData { origin } => Some(*origin),
            _ => None,
        }
    }

    /// Whether this is the initial `Loading` record.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Borrows the error if this is an error record.
    #[must_use]
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// WriteResponse
// ---------------------------------------------------------------------------

/// Outcome of a [`WriteRequest`](crate::request::WriteRequest).
///
/// `Success` means the optimistic local write landed and the origin
/// acknowledged the push. `Error` is terminal for this request but not for
/// the per-key queue: a failed push stays queued for later replay.
#[derive(Debug, Clone)]
pub enum WriteResponse {
    /// Locally durable and acknowledged by the origin.
    Success,
    /// The write failed at the named boundary.
    Error(StoreError),
}

impl WriteResponse {
    /// Whether the write fully succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Borrows the error if the write failed.
    #[must_use]
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Self::Error(err) => Some(err),
            Self::Success => None,
        }
    }
}
