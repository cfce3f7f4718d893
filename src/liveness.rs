//! Notification recency tracking.
//!
//! The tracker holds the time of the most recent notification and the number
//! of consecutive stale checks. Both live behind one mutex: notifications
//! arrive on the transport's task while checks run on the supervisor's, and
//! each side does a read-modify-write of the pair.
//!
//! Times are [`tokio::time::Instant`]s so that tests can drive the tracker
//! with a paused clock.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Classification of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// A notification arrived within the window.
    Fresh,
    /// The stream has been silent for longer than the window.
    Stale,
}

/// Result of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// The classification.
    pub freshness: Freshness,
    /// Time since the last notification (or session start).
    pub elapsed: Duration,
    /// Consecutive stale checks, including this one.
    pub consecutive_stale: u32,
}

#[derive(Debug)]
struct LivenessState {
    /// Session the state belongs to.
    generation: u64,
    /// Most recent notification, or the session start if none yet.
    last_notification: Instant,
    /// Consecutive stale classifications.
    consecutive_stale: u32,
}

impl LivenessState {
    fn touch(&mut self, at: Instant) {
        if at > self.last_notification {
            self.last_notification = at;
        }
    }
}

/// Tracks how recently notifications arrived for the current session.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    window: Duration,
    state: Arc<Mutex<LivenessState>>,
}

impl LivenessTracker {
    /// Create a tracker with a staleness window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(LivenessState {
                generation: 0,
                last_notification: Instant::now(),
                consecutive_stale: 0,
            })),
        }
    }

    /// The staleness window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start tracking a new session.
    ///
    /// Resets the stale count and the clock, and returns a recorder bound to
    /// the new session. Recorders from earlier sessions stop having any
    /// effect.
    pub fn begin_session(&self) -> NotificationRecorder {
        let mut state = self.state.lock();
        state.generation += 1;
        state.last_notification = Instant::now();
        state.consecutive_stale = 0;

        NotificationRecorder {
            generation: state.generation,
            state: self.state.clone(),
        }
    }

    /// Restart the window for the current session without changing it.
    ///
    /// Called once setup has completed, so time spent scanning and
    /// connecting does not count as silence. Returns the new window start;
    /// checks scheduled from it classify against the same instant.
    pub fn restart_window(&self) -> Instant {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.last_notification = now;
        state.consecutive_stale = 0;
        now
    }

    /// Record a notification for the current session at the current time.
    pub fn on_notification_received(&self) {
        self.state.lock().touch(Instant::now());
    }

    /// Classify the current time against the last notification.
    pub fn check_tick(&self) -> TickOutcome {
        self.check_tick_at(Instant::now())
    }

    /// Classify `now` against the last notification.
    ///
    /// Fresh when `now - last <= window`; a fresh check resets the stale
    /// count, a stale one increments it by one.
    pub fn check_tick_at(&self, now: Instant) -> TickOutcome {
        let mut state = self.state.lock();
        let elapsed = now.saturating_duration_since(state.last_notification);

        let freshness = if elapsed <= self.window {
            state.consecutive_stale = 0;
            Freshness::Fresh
        } else {
            state.consecutive_stale = state.consecutive_stale.saturating_add(1);
            Freshness::Stale
        };

        trace!(
            "Liveness check: {:?} after {:?} (stale count {})",
            freshness,
            elapsed,
            state.consecutive_stale
        );

        TickOutcome {
            freshness,
            elapsed,
            consecutive_stale: state.consecutive_stale,
        }
    }

    /// Consecutive stale checks so far.
    pub fn consecutive_stale(&self) -> u32 {
        self.state.lock().consecutive_stale
    }

    /// Time of the last notification (or session start).
    pub fn last_notification(&self) -> Instant {
        self.state.lock().last_notification
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

/// Session-bound handle for the notification callback.
#[derive(Debug, Clone)]
pub struct NotificationRecorder {
    generation: u64,
    state: Arc<Mutex<LivenessState>>,
}

impl NotificationRecorder {
    /// Record a notification now.
    ///
    /// Returns `false` without touching the tracker if a newer session has
    /// started since this recorder was issued.
    pub fn record(&self) -> bool {
        self.record_at(Instant::now())
    }

    /// Record a notification at a given time.
    pub fn record_at(&self, at: Instant) -> bool {
        let mut state = self.state.lock();
        if state.generation != self.generation {
            return false;
        }
        state.touch(at);
        true
    }

    /// Session this recorder belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_secs(3);

    proptest! {
        #[test]
        fn prop_within_window_is_fresh(elapsed_ms in 0u64..=3_000, prior_stale in 0u32..10) {
            let tracker = LivenessTracker::new(WINDOW);
            let base = tracker.last_notification();

            // Build up some stale history first.
            for i in 0..prior_stale {
                tracker.check_tick_at(base + WINDOW + Duration::from_millis(1 + u64::from(i)));
            }
            tracker.on_notification_received();
            let base = tracker.last_notification();

            let outcome = tracker.check_tick_at(base + Duration::from_millis(elapsed_ms));
            prop_assert_eq!(outcome.freshness, Freshness::Fresh);
            prop_assert_eq!(outcome.consecutive_stale, 0);
            prop_assert_eq!(tracker.consecutive_stale(), 0);
        }

        #[test]
        fn prop_beyond_window_increments_by_one(extra_ms in 1u64..60_000, prior_stale in 0u32..10) {
            let tracker = LivenessTracker::new(WINDOW);
            let base = tracker.last_notification();
            let now = base + WINDOW + Duration::from_millis(extra_ms);

            for _ in 0..prior_stale {
                tracker.check_tick_at(now);
            }
            let before = tracker.consecutive_stale();

            let outcome = tracker.check_tick_at(now);
            prop_assert_eq!(outcome.freshness, Freshness::Stale);
            prop_assert_eq!(outcome.consecutive_stale, before + 1);
        }
    }

    #[test]
    fn test_boundary_is_fresh() {
        let tracker = LivenessTracker::new(WINDOW);
        let base = tracker.last_notification();

        assert_eq!(tracker.check_tick_at(base + WINDOW).freshness, Freshness::Fresh);
        assert_eq!(
            tracker
                .check_tick_at(base + WINDOW + Duration::from_nanos(1))
                .freshness,
            Freshness::Stale
        );
    }

    #[test]
    fn test_third_stale_tick_exceeds_threshold() {
        let threshold = 2;
        let tracker = LivenessTracker::new(WINDOW);
        let base = tracker.last_notification();
        let jitter = Duration::from_millis(5);

        let ticks: Vec<u32> = [3u64, 6, 9, 12]
            .iter()
            .map(|s| {
                tracker
                    .check_tick_at(base + Duration::from_secs(*s) + jitter)
                    .consecutive_stale
            })
            .collect();

        assert_eq!(ticks, vec![1, 2, 3, 4]);
        let first_breach = ticks.iter().position(|count| *count > threshold);
        assert_eq!(first_breach, Some(2)); // the t=9 tick
    }

    #[test]
    fn test_restart_window_anchors_checks() {
        let tracker = LivenessTracker::new(WINDOW);
        let base = tracker.last_notification();
        tracker.check_tick_at(base + Duration::from_secs(10));

        let start = tracker.restart_window();
        assert_eq!(tracker.last_notification(), start);
        assert_eq!(tracker.consecutive_stale(), 0);

        let counts: Vec<(Freshness, u32)> = (1..=4)
            .map(|k| {
                let outcome = tracker.check_tick_at(start + WINDOW * k);
                (outcome.freshness, outcome.consecutive_stale)
            })
            .collect();
        assert_eq!(
            counts,
            vec![
                (Freshness::Fresh, 0),
                (Freshness::Stale, 1),
                (Freshness::Stale, 2),
                (Freshness::Stale, 3),
            ]
        );
    }

    #[test]
    fn test_notification_resets_after_staleness() {
        let tracker = LivenessTracker::new(WINDOW);
        let base = tracker.last_notification();

        tracker.check_tick_at(base + Duration::from_secs(4));
        tracker.check_tick_at(base + Duration::from_secs(7));
        assert_eq!(tracker.consecutive_stale(), 2);

        let recorder = tracker.begin_session();
        assert!(recorder.record_at(base + Duration::from_secs(8)));

        let outcome = tracker.check_tick_at(base + Duration::from_secs(10));
        assert_eq!(outcome.freshness, Freshness::Fresh);
        assert_eq!(outcome.consecutive_stale, 0);
    }

    #[test]
    fn test_begin_session_resets_count() {
        let tracker = LivenessTracker::new(WINDOW);
        let base = tracker.last_notification();
        tracker.check_tick_at(base + Duration::from_secs(10));
        tracker.check_tick_at(base + Duration::from_secs(20));
        assert_eq!(tracker.consecutive_stale(), 2);

        let recorder = tracker.begin_session();
        assert_eq!(tracker.consecutive_stale(), 0);
        assert_eq!(recorder.generation(), tracker.generation());
    }

    #[test]
    fn test_superseded_recorder_is_ignored() {
        let tracker = LivenessTracker::new(WINDOW);
        let old = tracker.begin_session();
        let _current = tracker.begin_session();
        let start = tracker.last_notification();

        assert!(!old.record_at(start + Duration::from_secs(5)));
        assert_eq!(tracker.last_notification(), start);
    }

    #[test]
    fn test_last_notification_never_moves_backwards() {
        let tracker = LivenessTracker::new(WINDOW);
        let recorder = tracker.begin_session();
        let start = tracker.last_notification();

        recorder.record_at(start + Duration::from_secs(2));
        recorder.record_at(start + Duration::from_secs(1));

        assert_eq!(tracker.last_notification(), start + Duration::from_secs(2));
    }

    #[test]
    fn test_concurrent_reads_see_whole_timestamps() {
        let tracker = LivenessTracker::new(WINDOW);
        let recorder = tracker.begin_session();
        let start = tracker.last_notification();
        let writes = 10_000u64;

        let writer = std::thread::spawn(move || {
            for i in 1..=writes {
                recorder.record_at(start + Duration::from_micros(i));
            }
        });

        let reader_tracker = tracker.clone();
        let reader = std::thread::spawn(move || {
            let mut previous = start;
            for _ in 0..writes {
                let seen = reader_tracker.last_notification();
                let offset = seen.duration_since(start);
                assert!(offset <= Duration::from_micros(writes));
                assert_eq!(offset.as_nanos() % 1_000, 0, "partially written timestamp");
                assert!(seen >= previous);
                previous = seen;

                reader_tracker.check_tick_at(start + Duration::from_micros(writes));
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(
            tracker.last_notification(),
            start + Duration::from_micros(writes)
        );
        assert_eq!(tracker.check_tick_at(start + WINDOW).freshness, Freshness::Fresh);
    }
}
