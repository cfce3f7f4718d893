//! Setup sequence: enable, scan, connect, discover, subscribe.
//!
//! One [`SetupSequencer::run`] is one attempt. It stops at the first failing
//! step and leaves retry decisions to the caller.

use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::transport::{
    BleTransport, CharacteristicHandle, DeviceHandle, DiscoveredPeripheral, DiscoveryStream,
    NotificationCallback, PeripheralAddress, ServiceHandle,
};
use crate::ble::uuids::{HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID};
use crate::error::{Error, Result};
use crate::matcher::AddressMatcher;
use crate::shutdown::ShutdownSignal;

/// Step of the setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetupPhase {
    /// No attempt in progress.
    #[default]
    Idle,
    /// Bringing up the radio adapter.
    AdapterEnabling,
    /// Waiting for the target to advertise.
    Scanning,
    /// Opening the link.
    Connecting,
    /// Looking for the Heart Rate service.
    DiscoveringService,
    /// Looking for the Heart Rate Measurement characteristic.
    DiscoveringCharacteristic,
    /// Enabling notifications.
    Subscribing,
    /// Subscribed; the session is live.
    Active,
    /// The last attempt failed.
    Failed,
}

impl std::fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AdapterEnabling => write!(f, "AdapterEnabling"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringService => write!(f, "DiscoveringService"),
            Self::DiscoveringCharacteristic => write!(f, "DiscoveringCharacteristic"),
            Self::Subscribing => write!(f, "Subscribing"),
            Self::Active => write!(f, "Active"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// A subscribed connection to the target.
///
/// The session owns the device handle; [`ConnectionSession::close`] consumes
/// it so a closed session cannot be used again.
#[derive(Debug)]
pub struct ConnectionSession {
    characteristic: CharacteristicHandle,
    established_at: Instant,
}

impl ConnectionSession {
    /// Address of the connected peripheral.
    pub fn address(&self) -> &PeripheralAddress {
        self.device().address()
    }

    /// The connected device.
    pub fn device(&self) -> &DeviceHandle {
        self.characteristic.device()
    }

    /// The Heart Rate service.
    pub fn service(&self) -> &ServiceHandle {
        self.characteristic.service()
    }

    /// The Heart Rate Measurement characteristic.
    pub fn characteristic(&self) -> &CharacteristicHandle {
        &self.characteristic
    }

    /// When setup completed.
    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// Disconnect and end the session.
    pub async fn close(self, transport: &dyn BleTransport) -> Result<()> {
        info!("Disconnecting from {}", self.address());
        transport.disconnect(self.device()).await
    }
}

/// Drives one peripheral from unknown to subscribed.
pub struct SetupSequencer {
    transport: Arc<dyn BleTransport>,
    matcher: AddressMatcher,
    scan_timeout: Option<Duration>,
    phase: RwLock<SetupPhase>,
}

impl SetupSequencer {
    /// Create a sequencer for a target address.
    pub fn new(
        transport: Arc<dyn BleTransport>,
        target: PeripheralAddress,
        scan_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            matcher: AddressMatcher::new(target),
            scan_timeout,
            phase: RwLock::new(SetupPhase::Idle),
        }
    }

    /// Step the current or most recent attempt reached.
    pub fn phase(&self) -> SetupPhase {
        *self.phase.read()
    }

    /// Run one setup attempt.
    ///
    /// `on_notify` is registered on the Heart Rate Measurement characteristic
    /// when every earlier step succeeded.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the target address is empty (nothing is
    ///   scanned).
    /// - [`Error::BluetoothUnavailable`] if the adapter cannot be enabled.
    /// - [`Error::ScanTimeout`], [`Error::PeripheralNotFound`] or
    ///   [`Error::Cancelled`] if the scan ends without a match.
    /// - [`Error::ConnectionFailed`] if the link cannot be opened.
    /// - [`Error::ServiceNotFound`] / [`Error::CharacteristicNotFound`] if the
    ///   peripheral does not expose the Heart Rate profile.
    pub async fn run(
        &self,
        on_notify: NotificationCallback,
        shutdown: &mut ShutdownSignal,
    ) -> Result<ConnectionSession> {
        let result = self.run_steps(on_notify, shutdown).await;

        match &result {
            Ok(session) => {
                self.set_phase(SetupPhase::Active);
                info!("Subscribed to heart rate notifications from {}", session.address());
            }
            Err(e) => {
                warn!("Setup failed during {}: {}", self.phase(), e);
                self.set_phase(SetupPhase::Failed);
            }
        }

        result
    }

    async fn run_steps(
        &self,
        on_notify: NotificationCallback,
        shutdown: &mut ShutdownSignal,
    ) -> Result<ConnectionSession> {
        if self.matcher.target().is_empty() {
            return Err(Error::Configuration {
                reason: "no target peripheral address configured".to_string(),
            });
        }

        self.set_phase(SetupPhase::AdapterEnabling);
        self.transport.enable_adapter().await.map_err(|e| {
            warn!("Failed to enable adapter: {}", e);
            Error::BluetoothUnavailable
        })?;

        self.set_phase(SetupPhase::Scanning);
        let found = self.scan_for_target(shutdown).await?;

        self.set_phase(SetupPhase::Connecting);
        let device = self.transport.connect(&found.address).await?;
        info!("Connected to {}", device.address());

        match self.subscribe_on(&device, on_notify).await {
            Ok(characteristic) => Ok(ConnectionSession {
                characteristic,
                established_at: Instant::now(),
            }),
            Err(e) => {
                // Do not leak the link of a failed attempt.
                if let Err(disconnect_err) = self.transport.disconnect(&device).await {
                    debug!("Disconnect after failed setup also failed: {}", disconnect_err);
                }
                Err(e)
            }
        }
    }

    /// Scan until the target is seen, the scan times out, or shutdown.
    async fn scan_for_target(&self, shutdown: &mut ShutdownSignal) -> Result<DiscoveredPeripheral> {
        info!("Scanning for {}", self.matcher.target());
        let mut stream = self.transport.scan().await?;

        let result = {
            let search = Self::first_match(&mut stream, &self.matcher);
            let bounded = async {
                match self.scan_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, search)
                        .await
                        .map_err(|_| Error::ScanTimeout {
                            address: self.matcher.target().to_string(),
                            timeout,
                        })?,
                    None => search.await,
                }
            };

            tokio::select! {
                result = bounded => result,
                _ = shutdown.wait() => Err(Error::Cancelled),
            }
        };

        drop(stream);
        if let Err(e) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        result
    }

    async fn first_match(
        stream: &mut DiscoveryStream,
        matcher: &AddressMatcher,
    ) -> Result<DiscoveredPeripheral> {
        while let Some(peripheral) = stream.next().await {
            debug!(
                "Found device: {} rssi={:?} name={:?}",
                peripheral.address, peripheral.rssi, peripheral.local_name
            );

            if matcher.is_target(&peripheral) {
                return Ok(peripheral);
            }
        }

        Err(Error::PeripheralNotFound {
            address: matcher.target().to_string(),
        })
    }

    /// Discover the Heart Rate profile on a connected device and subscribe.
    async fn subscribe_on(
        &self,
        device: &DeviceHandle,
        on_notify: NotificationCallback,
    ) -> Result<CharacteristicHandle> {
        self.set_phase(SetupPhase::DiscoveringService);
        let service = self
            .transport
            .discover_services(device, &[HEART_RATE_SERVICE_UUID])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: HEART_RATE_SERVICE_UUID.to_string(),
            })?;
        info!("Found service {}", service.uuid());

        self.set_phase(SetupPhase::DiscoveringCharacteristic);
        let characteristic = self
            .transport
            .discover_characteristics(&service, &[HEART_RATE_MEASUREMENT_UUID])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: HEART_RATE_MEASUREMENT_UUID.to_string(),
            })?;
        info!("Found characteristic {}", characteristic.uuid());

        self.set_phase(SetupPhase::Subscribing);
        self.transport.subscribe(&characteristic, on_notify).await?;

        Ok(characteristic)
    }

    fn set_phase(&self, new_phase: SetupPhase) {
        let old_phase = std::mem::replace(&mut *self.phase.write(), new_phase);
        if old_phase != new_phase {
            debug!("Setup phase changed: {} -> {}", old_phase, new_phase);
        }
    }
}
