//! Cache entry types: stored value plus access metadata.

/// Access metadata tracked for every cache entry.
///
/// Drives TTL and max-idle expiry checks and supplies the recency signal for
/// eviction sampling.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// Wall-clock time (millis since epoch) when this entry was created.
    pub created_at: i64,
    /// Wall-clock time of the last read access.
    pub last_access_at: i64,
    /// Number of read accesses.
    pub hits: u32,
}

impl EntryMetadata {
    /// Creates metadata for a freshly inserted entry.
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            created_at: now,
            last_access_at: now,
            hits: 0,
        }
    }

    /// Records a read access.
    pub fn on_access(&mut self, now: i64) {
        self.hits = self.hits.saturating_add(1);
        self.last_access_at = now;
    }
}

/// A cached domain value plus its access metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached domain value.
    pub value: V,
    /// Access metadata for expiry and eviction.
    pub metadata: EntryMetadata,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stamped at `now`.
    #[must_use]
    pub fn new(value: V, now: i64) -> Self {
        Self {
            value,
            metadata: EntryMetadata::new(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_access_bumps_hits_and_recency() {
        let mut metadata = EntryMetadata::new(100);
        assert_eq!(metadata.hits, 0);
        assert_eq!(metadata.last_access_at, 100);

        metadata.on_access(250);
        assert_eq!(metadata.hits, 1);
        assert_eq!(metadata.last_access_at, 250);
        assert_eq!(metadata.created_at, 100);
    }

    #[test]
    fn hits_saturate_instead_of_wrapping() {
        let mut metadata = EntryMetadata::new(0);
        metadata.hits = u32::MAX;
        metadata.on_access(1);
        assert_eq!(metadata.hits, u32::MAX);
    }
}
