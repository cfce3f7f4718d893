//! [`BleTransport`] backed by the platform BLE stack via btleplug.

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::{Adapter, Peripheral};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ble::characteristics::{find_characteristic, NotificationListener};
use crate::ble::connection::{close_link, open_link};
use crate::ble::scanner::{first_adapter, start_discovery, stop_discovery, PeripheralCache};
use crate::ble::transport::{
    BleTransport, CharacteristicHandle, DeviceHandle, DiscoveryStream, NotificationCallback,
    PeripheralAddress, ServiceHandle,
};
use crate::error::{Error, Result};

/// BLE transport using the first adapter of the host.
///
/// Addresses are the `BDAddr` string form reported by the platform
/// (upper-case, colon separated on Linux and Windows). macOS hides hardware
/// addresses, so address targeting is not usable there.
#[derive(Default)]
pub struct BtleplugTransport {
    /// The adapter, once enabled.
    adapter: RwLock<Option<Adapter>>,
    /// Peripherals seen while scanning.
    peripherals: PeripheralCache,
    /// Active notification listeners by device address.
    listeners: Mutex<HashMap<PeripheralAddress, NotificationListener>>,
}

impl BtleplugTransport {
    /// Create a transport. No Bluetooth calls are made until
    /// [`BleTransport::enable_adapter`].
    pub fn new() -> Self {
        Self::default()
    }

    fn adapter(&self) -> Result<Adapter> {
        self.adapter.read().clone().ok_or(Error::BluetoothUnavailable)
    }

    fn peripheral(&self, address: &PeripheralAddress) -> Result<Peripheral> {
        self.peripherals
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                address: address.to_string(),
            })
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn enable_adapter(&self) -> Result<()> {
        if self.adapter.read().is_some() {
            debug!("Adapter already enabled");
            return Ok(());
        }

        let adapter = first_adapter().await?;
        *self.adapter.write() = Some(adapter);
        Ok(())
    }

    async fn scan(&self) -> Result<DiscoveryStream> {
        let adapter = self.adapter()?;
        start_discovery(&adapter, self.peripherals.clone()).await
    }

    async fn stop_scan(&self) -> Result<()> {
        let adapter = self.adapter()?;
        stop_discovery(&adapter).await
    }

    async fn connect(&self, address: &PeripheralAddress) -> Result<DeviceHandle> {
        let peripheral = self.peripheral(address).map_err(|_| Error::ConnectionFailed {
            reason: format!("{} was never seen while scanning", address),
        })?;

        open_link(&peripheral).await?;

        Ok(DeviceHandle::new(address.clone()))
    }

    async fn discover_services(
        &self,
        device: &DeviceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<ServiceHandle>> {
        let peripheral = self.peripheral(device.address())?;

        let services = peripheral
            .services()
            .into_iter()
            .filter(|service| uuids.contains(&service.uuid))
            .map(|service| ServiceHandle::new(device.clone(), service.uuid))
            .collect();

        Ok(services)
    }

    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<CharacteristicHandle>> {
        let peripheral = self.peripheral(service.device().address())?;

        let characteristics = uuids
            .iter()
            .filter_map(|uuid| find_characteristic(&peripheral, service.uuid(), *uuid))
            .map(|characteristic| CharacteristicHandle::new(service.clone(), characteristic.uuid))
            .collect();

        Ok(characteristics)
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        on_notify: NotificationCallback,
    ) -> Result<()> {
        let address = characteristic.device().address();
        let peripheral = self.peripheral(address)?;

        let target = find_characteristic(
            &peripheral,
            characteristic.service().uuid(),
            characteristic.uuid(),
        )
        .ok_or_else(|| Error::CharacteristicNotFound {
            uuid: characteristic.uuid().to_string(),
        })?;

        let listener = NotificationListener::start(peripheral, target, on_notify).await?;

        if let Some(previous) = self.listeners.lock().insert(address.clone(), listener) {
            previous.stop();
        }

        Ok(())
    }

    async fn disconnect(&self, device: &DeviceHandle) -> Result<()> {
        if let Some(listener) = self.listeners.lock().remove(device.address()) {
            listener.stop();
        }

        let peripheral = match self.peripheral(device.address()) {
            Ok(p) => p,
            Err(e) => {
                warn!("Disconnect requested for unknown device {}", device.address());
                return Err(e);
            }
        };

        close_link(&peripheral).await
    }
}
