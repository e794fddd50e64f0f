//! The updater contract: how the engine pushes local writes to the origin.

use async_trait::async_trait;

use crate::error::UpdaterError;

/// Outcome of pushing one write to the origin.
#[derive(Debug, Clone)]
pub enum UpdaterResult<R> {
    /// The origin acknowledged the write.
    Success(R),
    /// The push failed; the write stays queued for replay.
    Error(UpdaterError),
}

impl<R> UpdaterResult<R> {
    /// Whether the origin acknowledged the write.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Borrows the error if the push failed.
    #[must_use]
    pub fn error(&self) -> Option<&UpdaterError> {
        match self {
            Self::Error(err) => Some(err),
            Self::Success(_) => None,
        }
    }
}

/// Pushes locally applied writes to the remote origin.
///
/// Used as `Arc<dyn Updater<K, V, Response = R>>`. Implementations own
/// transport concerns (retries, timeouts, auth); the engine owns ordering:
/// same-key pushes are serialized, and a failed push parks the write in the
/// per-key queue until a later read replays it.
#[async_trait]
pub trait Updater<K, V>: Send + Sync {
    /// Response payload the origin returns on a successful push.
    type Response: Send + Sync + 'static;

    /// Pushes `value` for `key` to the origin.
    async fn post(&self, key: &K, value: &V) -> UpdaterResult<Self::Response>;

    /// Hook invoked with the outcome of every push attempt, including
    /// replays. Default is a no-op.
    async fn on_completion(&self, result: &UpdaterResult<Self::Response>) {
        let _ = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_error_accessors() {
        let ok: UpdaterResult<bool> = UpdaterResult::Success(true);
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let failed: UpdaterResult<bool> = UpdaterResult::Error(UpdaterError::message("offline"));
        assert!(!failed.is_success());
        assert!(failed.error().unwrap().to_string().contains("offline"));
    }
}
