//! Supervisor configuration.

use std::time::Duration;

use crate::ble::transport::PeripheralAddress;
use crate::error::{Error, Result};

/// Tunables for the liveness supervisor.
///
/// The check interval always equals the staleness window, so a silent link
/// is detected between one and two windows after the last payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Address of the peripheral to supervise.
    pub target: PeripheralAddress,
    /// Maximum silence before a check is classified stale.
    pub staleness_window: Duration,
    /// Consecutive stale checks tolerated; one more forces a reconnect.
    pub stale_threshold: u32,
    /// Upper bound on a single scan. `None` scans until cancelled.
    pub scan_timeout: Option<Duration>,
    /// Setup attempts before giving up on a (re)connect.
    pub connect_attempts: u32,
    /// Delay before the second setup attempt.
    pub initial_backoff: Duration,
    /// Cap on the delay between setup attempts.
    pub max_backoff: Duration,
}

impl SupervisorConfig {
    /// Default staleness window (3 seconds).
    pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(3);
    /// Default stale threshold.
    pub const DEFAULT_STALE_THRESHOLD: u32 = 2;
    /// Default scan timeout (30 seconds).
    pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default number of setup attempts.
    pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
    /// Longest accepted staleness window (one day).
    pub const MAX_STALENESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    /// Default configuration for a target address.
    pub fn new(target: impl Into<PeripheralAddress>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Set the staleness window (and with it the check interval).
    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Set the stale threshold.
    pub fn with_stale_threshold(mut self, threshold: u32) -> Self {
        self.stale_threshold = threshold;
        self
    }

    /// Set or clear the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the number of setup attempts per (re)connect.
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Set the retry backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Interval between liveness checks.
    pub fn check_interval(&self) -> Duration {
        self.staleness_window
    }

    /// Check the configuration for values the supervisor cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty target, a window that is
    /// zero or longer than [`Self::MAX_STALENESS_WINDOW`], a zero scan
    /// timeout, a zero attempt budget or inverted backoff bounds.
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(Error::Configuration {
                reason: "no target peripheral address configured".to_string(),
            });
        }
        if self.staleness_window.is_zero() {
            return Err(Error::Configuration {
                reason: "staleness window must be greater than zero".to_string(),
            });
        }
        if self.staleness_window > Self::MAX_STALENESS_WINDOW {
            return Err(Error::Configuration {
                reason: format!(
                    "staleness window {:?} exceeds the maximum of {:?}",
                    self.staleness_window,
                    Self::MAX_STALENESS_WINDOW
                ),
            });
        }
        if self.scan_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::Configuration {
                reason: "scan timeout must be greater than zero (omit it to scan until cancelled)"
                    .to_string(),
            });
        }
        if self.connect_attempts == 0 {
            return Err(Error::Configuration {
                reason: "connect attempts must be at least 1".to_string(),
            });
        }
        if self.initial_backoff > self.max_backoff {
            return Err(Error::Configuration {
                reason: format!(
                    "initial backoff {:?} exceeds max backoff {:?}",
                    self.initial_backoff, self.max_backoff
                ),
            });
        }
        Ok(())
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            target: PeripheralAddress::new(""),
            staleness_window: Self::DEFAULT_STALENESS_WINDOW,
            stale_threshold: Self::DEFAULT_STALE_THRESHOLD,
            scan_timeout: Some(Self::DEFAULT_SCAN_TIMEOUT),
            connect_attempts: Self::DEFAULT_CONNECT_ATTEMPTS,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}
