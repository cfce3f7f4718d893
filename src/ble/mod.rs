//! BLE communication module.
//!
//! This module defines the [`BleTransport`] seam the supervisor drives and a
//! btleplug implementation of it for real hardware.

mod characteristics;
pub mod connection;
pub mod platform;
mod scanner;
pub mod transport;
pub mod uuids;

pub use connection::{ConnectionEvent, ConnectionState};
pub use platform::BtleplugTransport;
pub use transport::{
    BleTransport, CharacteristicHandle, DeviceHandle, DiscoveredPeripheral, DiscoveryStream,
    NotificationCallback, PeripheralAddress, ServiceHandle,
};
pub use uuids::*;
