//! Clock helpers

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Wall-clock time in nanoseconds since the UNIX epoch
///
/// Returns 0 if the system clock reads earlier than the epoch.
pub fn now_ns() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => duration_ns(elapsed),
        Err(_) => {
            warn!("system clock is before the UNIX epoch");
            0
        }
    }
}

/// Saturating conversion of a duration to nanoseconds
pub fn duration_ns(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(now_ns() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn test_duration_ns_saturates() {
        assert_eq!(duration_ns(Duration::from_millis(3)), 3_000_000);
        assert_eq!(duration_ns(Duration::MAX), u64::MAX);
    }
}
