//! The transport seam between the supervisor and a BLE stack.
//!
//! The supervisor only ever talks to a [`BleTransport`]. Handles returned by
//! the transport are plain values identifying a device, service or
//! characteristic; the transport keeps whatever platform objects back them.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// Callback invoked once per inbound notification payload.
pub type NotificationCallback = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Stream of scan results, alive until the scan is stopped.
pub type DiscoveryStream = BoxStream<'static, DiscoveredPeripheral>;

/// Hardware address of a peripheral, compared byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    /// Wrap an address string as given (no normalization).
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeripheralAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// A peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    /// Hardware address.
    pub address: PeripheralAddress,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Advertised local name.
    pub local_name: Option<String>,
}

impl DiscoveredPeripheral {
    /// A scan result with only an address.
    pub fn new(address: impl Into<PeripheralAddress>) -> Self {
        Self {
            address: address.into(),
            rssi: None,
            local_name: None,
        }
    }
}

/// A connected device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    address: PeripheralAddress,
}

impl DeviceHandle {
    /// Create a handle for a connected device.
    pub fn new(address: PeripheralAddress) -> Self {
        Self { address }
    }

    /// Address of the device.
    pub fn address(&self) -> &PeripheralAddress {
        &self.address
    }
}

/// A GATT service on a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    device: DeviceHandle,
    uuid: Uuid,
}

impl ServiceHandle {
    /// Create a handle for a discovered service.
    pub fn new(device: DeviceHandle, uuid: Uuid) -> Self {
        Self { device, uuid }
    }

    /// Device the service belongs to.
    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Service UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// A GATT characteristic under a discovered service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    service: ServiceHandle,
    uuid: Uuid,
}

impl CharacteristicHandle {
    /// Create a handle for a discovered characteristic.
    pub fn new(service: ServiceHandle, uuid: Uuid) -> Self {
        Self { service, uuid }
    }

    /// Service the characteristic belongs to.
    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }

    /// Device the characteristic belongs to.
    pub fn device(&self) -> &DeviceHandle {
        self.service.device()
    }

    /// Characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// Operations the supervisor needs from a BLE stack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Bring up the radio adapter. Failure means no radio is usable.
    async fn enable_adapter(&self) -> Result<()>;

    /// Start scanning and return the stream of discovered peripherals.
    async fn scan(&self) -> Result<DiscoveryStream>;

    /// Stop an active scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to a previously discovered peripheral.
    async fn connect(&self, address: &PeripheralAddress) -> Result<DeviceHandle>;

    /// Discover services on a device, restricted to the given UUIDs.
    async fn discover_services(
        &self,
        device: &DeviceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<ServiceHandle>>;

    /// Discover characteristics under a service, restricted to the given UUIDs.
    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<CharacteristicHandle>>;

    /// Enable notifications on a characteristic; `on_notify` runs per payload.
    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        on_notify: NotificationCallback,
    ) -> Result<()>;

    /// Disconnect a device. Its handles are invalid afterwards.
    async fn disconnect(&self, device: &DeviceHandle) -> Result<()>;
}
