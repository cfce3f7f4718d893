//! Reconnect supervisor.
//!
//! Runs setup, watches the liveness of the resulting session, and replaces
//! the session when the notification stream has been stale for more than
//! `stale_threshold` consecutive checks.
//!
//! ```text
//!            ┌──────────────┐  ok   ┌─────────────┐
//!  start ───►│    setup     ├──────►│  watching   │── tick: fresh ──┐
//!            │ (with retry) │       │ (interval W)│◄────────────────┘
//!            └──────▲───────┘       └──────┬──────┘
//!                   │                      │ stale count > N
//!                   │   disconnect +       │
//!                   └──── reconnect event ─┘
//! ```

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::ble::connection::{ConnectionEvent, ConnectionState};
use crate::ble::transport::{BleTransport, NotificationCallback};
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::events::{EventKind, EventSink, LinkEvent};
use crate::liveness::{Freshness, LivenessTracker, NotificationRecorder};
use crate::setup::{ConnectionSession, SetupPhase, SetupSequencer};
use crate::shutdown::ShutdownSignal;
use crate::utils::backoff_delay;

/// Why the watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchExit {
    /// The stale threshold was exceeded.
    Stale,
    /// Shutdown was requested.
    Shutdown,
}

/// Keeps one Heart Rate peripheral connected and its notifications flowing.
pub struct Supervisor {
    transport: Arc<dyn BleTransport>,
    config: SupervisorConfig,
    sequencer: SetupSequencer,
    tracker: LivenessTracker,
    sink: Arc<dyn EventSink>,
    /// Current connection state.
    state: RwLock<ConnectionState>,
    /// Channel for connection events.
    event_tx: broadcast::Sender<ConnectionEvent>,
    /// Sessions established so far.
    sessions: AtomicU64,
    /// Reconnects forced by staleness so far.
    reconnects: AtomicU64,
}

impl Supervisor {
    /// Create a supervisor. Nothing happens until [`Supervisor::run`].
    pub fn new(
        transport: Arc<dyn BleTransport>,
        config: SupervisorConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        let sequencer =
            SetupSequencer::new(transport.clone(), config.target.clone(), config.scan_timeout);

        Self {
            transport,
            tracker: LivenessTracker::new(config.staleness_window),
            config,
            sequencer,
            sink,
            state: RwLock::new(ConnectionState::Disconnected),
            event_tx,
            sessions: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Liveness state of the current session.
    pub fn tracker(&self) -> &LivenessTracker {
        &self.tracker
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Step reached by the current or last setup attempt.
    pub fn setup_phase(&self) -> SetupPhase {
        self.sequencer.phase()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Number of sessions established.
    pub fn session_count(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Number of reconnects forced by staleness.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Supervise the target until shutdown or a fatal error.
    ///
    /// Returns `Ok(())` after a requested shutdown, having disconnected the
    /// active session.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for an invalid configuration.
    /// - [`Error::BluetoothUnavailable`] if the radio cannot be enabled.
    /// - [`Error::ServiceNotFound`] / [`Error::CharacteristicNotFound`] if the
    ///   target lacks the Heart Rate profile.
    /// - [`Error::ReconnectFailed`] once `connect_attempts` consecutive setup
    ///   attempts failed with retryable errors.
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> Result<()> {
        self.config.validate()?;

        info!(
            "Supervising {} (window {:?}, stale threshold {})",
            self.config.target, self.config.staleness_window, self.config.stale_threshold
        );
        self.emit(EventKind::Start);

        loop {
            let session = match self.establish(&mut shutdown).await {
                Ok(session) => session,
                Err(Error::Cancelled) => {
                    info!("Shutdown requested during setup");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
            };

            let started = self.tracker.restart_window();
            self.sessions.fetch_add(1, Ordering::SeqCst);
            self.set_state(ConnectionState::Connected);

            let exit = self.watch(started, &mut shutdown).await;

            self.set_state(ConnectionState::Disconnecting);
            if let Err(e) = session.close(self.transport.as_ref()).await {
                // A dead radio link is the usual reason we got here.
                warn!("Disconnect failed, continuing: {}", e);
            }
            self.set_state(ConnectionState::Disconnected);

            match exit {
                WatchExit::Stale => {
                    self.emit(EventKind::Reconnect);
                    let count = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("Reconnecting to {} (reconnect #{})", self.config.target, count);
                }
                WatchExit::Shutdown => {
                    info!("Supervisor stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Run setup until it succeeds, fails fatally, or the budget runs out.
    async fn establish(&self, shutdown: &mut ShutdownSignal) -> Result<ConnectionSession> {
        self.set_state(ConnectionState::Connecting);

        let mut attempt = 0;
        loop {
            if shutdown.is_triggered() {
                return Err(Error::Cancelled);
            }
            attempt += 1;

            let recorder = self.tracker.begin_session();
            let callback = self.notification_callback(recorder);

            match self.sequencer.run(callback, shutdown).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_retryable() && attempt < self.config.connect_attempts => {
                    let delay = backoff_delay(
                        attempt,
                        self.config.initial_backoff,
                        self.config.max_backoff,
                    );
                    warn!(
                        "Setup attempt {} of {} failed: {}; retrying in {:?}",
                        attempt, self.config.connect_attempts, e, delay
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait() => return Err(Error::Cancelled),
                    }
                }
                Err(e) if e.is_retryable() => {
                    return Err(Error::ReconnectFailed {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Check liveness every window from `started` until the threshold is
    /// exceeded or shutdown.
    ///
    /// Each check is classified at its scheduled instant, not at the moment
    /// the timer happened to fire, so the first check on a silent link sees
    /// exactly one window of silence.
    async fn watch(&self, started: Instant, shutdown: &mut ShutdownSignal) -> WatchExit {
        let interval = self.config.check_interval();
        let mut ticker = tokio::time::interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                scheduled = ticker.tick() => {
                    let outcome = self.tracker.check_tick_at(scheduled);

                    match outcome.freshness {
                        Freshness::Fresh => {
                            debug!("Liveness pass ({:?} since last notification)", outcome.elapsed);
                            self.emit(EventKind::Pass);
                        }
                        Freshness::Stale => {
                            warn!(
                                "Liveness overdue ({:?} since last notification, {} in a row)",
                                outcome.elapsed, outcome.consecutive_stale
                            );
                            self.emit(EventKind::Overdue);

                            if outcome.consecutive_stale > self.config.stale_threshold {
                                return WatchExit::Stale;
                            }
                        }
                    }
                }
                _ = shutdown.wait() => return WatchExit::Shutdown,
            }
        }
    }

    /// Callback for one session's notifications.
    fn notification_callback(&self, recorder: NotificationRecorder) -> NotificationCallback {
        let sink = self.sink.clone();

        Arc::new(move |payload: Bytes| {
            if recorder.record() {
                trace!("Heart rate notification: {} bytes", payload.len());
                sink.record(&LinkEvent::now(EventKind::Received));
            } else {
                trace!("Dropping notification from a superseded session");
            }
        })
    }

    fn emit(&self, kind: EventKind) {
        self.sink.record(&LinkEvent::now(kind));
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                address: self.config.target.to_string(),
                state: new_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::MockBleTransport;
    use crate::events::MemoryEventLog;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_config_touches_nothing() {
        let mut mock = MockBleTransport::new();
        mock.expect_enable_adapter().never();
        mock.expect_scan().never();

        let sink = Arc::new(MemoryEventLog::new());
        let supervisor = Supervisor::new(Arc::new(mock), SupervisorConfig::default(), sink.clone());

        let err = supervisor.run(ShutdownSignal::never()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_setup_skips_transport() {
        let mut mock = MockBleTransport::new();
        mock.expect_enable_adapter().never();
        mock.expect_scan().never();

        let sink = Arc::new(MemoryEventLog::new());
        let config = SupervisorConfig::new("EE:74:7D:C9:2A:68");
        let supervisor = Supervisor::new(Arc::new(mock), config, sink.clone());

        let (trigger, signal) = crate::shutdown::shutdown_channel();
        trigger.trigger();

        supervisor.run(signal).await.unwrap();
        assert_eq!(sink.kinds(), vec![EventKind::Start]);
        assert_eq!(supervisor.setup_phase(), SetupPhase::Idle);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_attempts() {
        let mut mock = MockBleTransport::new();
        mock.expect_enable_adapter().returning(|| Ok(()));
        mock.expect_scan()
            .times(3)
            .returning(|| Ok(futures::stream::empty().boxed()));
        mock.expect_stop_scan().returning(|| Ok(()));

        let config = SupervisorConfig::new("EE:74:7D:C9:2A:68")
            .with_connect_attempts(3)
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1));
        let supervisor = Supervisor::new(Arc::new(mock), config, Arc::new(MemoryEventLog::new()));
        let mut states = supervisor.subscribe();

        let err = supervisor.run(ShutdownSignal::never()).await.unwrap_err();

        assert!(matches!(err, Error::ReconnectFailed { attempts: 3, .. }));
        assert_eq!(err.exit_code(), 5);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(supervisor.session_count(), 0);
        assert_eq!(states.recv().await.unwrap().state, ConnectionState::Connecting);
        assert_eq!(states.recv().await.unwrap().state, ConnectionState::Disconnected);
    }
}
