//! GATT characteristic handling.
//!
//! Looks up characteristics on a connected btleplug peripheral and forwards
//! its notifications to a [`NotificationCallback`].

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::stream::StreamExt;
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::ble::transport::NotificationCallback;
use crate::error::{Error, Result};

/// Find a characteristic by service and characteristic UUID.
pub(crate) fn find_characteristic(
    peripheral: &Peripheral,
    service_uuid: Uuid,
    uuid: Uuid,
) -> Option<Characteristic> {
    peripheral
        .services()
        .into_iter()
        .filter(|service| service.uuid == service_uuid)
        .flat_map(|service| service.characteristics)
        .find(|characteristic| characteristic.uuid == uuid)
}

/// Background task forwarding notifications for one characteristic.
///
/// The task stops when the listener is dropped or the peripheral's
/// notification stream ends.
pub(crate) struct NotificationListener {
    handle: tokio::task::JoinHandle<()>,
}

impl NotificationListener {
    /// Subscribe to `characteristic` and start forwarding its payloads.
    pub(crate) async fn start(
        peripheral: Peripheral,
        characteristic: Characteristic,
        on_notify: NotificationCallback,
    ) -> Result<Self> {
        debug!(
            "Subscribing to characteristic {}, properties: {:?}",
            characteristic.uuid, characteristic.properties
        );

        // Open the stream first so a notification racing the CCCD write is kept.
        let mut notifications = peripheral.notifications().await.map_err(|e| {
            error!("Failed to get notifications stream: {}", e);
            Error::Bluetooth(e)
        })?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        let uuid = characteristic.uuid;
        let handle = tokio::spawn(async move {
            debug!("Notification listener started for {}", uuid);

            while let Some(notification) = notifications.next().await {
                if notification.uuid != uuid {
                    continue;
                }

                trace!(
                    "Notification received from {}: {} bytes",
                    notification.uuid,
                    notification.value.len()
                );

                on_notify(Bytes::from(notification.value));
            }

            debug!("Notification listener stopped for {}", uuid);
        });

        Ok(Self { handle })
    }

    /// Stop forwarding notifications.
    pub(crate) fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
