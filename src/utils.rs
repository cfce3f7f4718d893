//! Utility functions for the hrs-watchdog crate.

use std::time::Duration;

/// Delay before retry number `attempt` (1-based) under exponential backoff.
///
/// The first retry waits `initial`; each further retry doubles the delay, up
/// to `max`.
///
/// # Example
///
/// ```
/// use hrs_watchdog::backoff_delay;
/// use std::time::Duration;
///
/// let initial = Duration::from_secs(1);
/// let max = Duration::from_secs(30);
/// assert_eq!(backoff_delay(1, initial, max), Duration::from_secs(1));
/// assert_eq!(backoff_delay(3, initial, max), Duration::from_secs(4));
/// assert_eq!(backoff_delay(10, initial, max), max);
/// ```
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    initial
        .checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}
