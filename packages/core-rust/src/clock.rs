//! Wall-clock helpers shared across the engine.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
///
/// Millisecond timestamps fit comfortably in `i64` for the next few hundred
/// million years.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_positive_and_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 1_600_000_000_000);
        assert!(b >= a);
    }
}
