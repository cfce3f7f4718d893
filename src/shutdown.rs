//! Cooperative shutdown signal.

use tokio::sync::watch;

/// Fires a shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a shutdown request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    ///
    /// Pends forever if the trigger is dropped without firing.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_trigger() {
        let (trigger, mut signal) = shutdown_channel();
        assert!(!signal.is_triggered());

        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("signal should fire");
        assert!(signal.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut signal = ShutdownSignal::never();
        let waited = tokio::time::timeout(Duration::from_secs(60), signal.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_clones_observe_trigger() {
        let (trigger, signal) = shutdown_channel();
        let mut clone = signal.clone();

        let waiter = tokio::spawn(async move { clone.wait().await });
        trigger.trigger();

        tokio_test::assert_ok!(waiter.await);
        assert!(signal.is_triggered());
    }
}
