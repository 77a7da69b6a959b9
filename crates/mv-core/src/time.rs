//! Time utilities for mixvpn

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in seconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Seconds elapsed since a Unix timestamp, 0 if it lies in the future.
pub fn elapsed_secs(since: u64) -> u64 {
    current_time_secs().saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_secs_is_positive() {
        assert!(current_time_secs() > 0);
    }

    #[test]
    fn test_elapsed_future_is_zero() {
        assert_eq!(elapsed_secs(current_time_secs() + 1000), 0);
    }
}
