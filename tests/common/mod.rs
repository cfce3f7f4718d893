//! Scripted in-memory transport for supervisor tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use hrs_watchdog::ble::{
    BleTransport, CharacteristicHandle, DeviceHandle, DiscoveredPeripheral, DiscoveryStream,
    NotificationCallback, PeripheralAddress, ServiceHandle,
};
use hrs_watchdog::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

pub const TARGET: &str = "EE:74:7D:C9:2A:68";

/// Fake peripheral world: advertises a fixed set of addresses and hands out
/// a Heart Rate profile on connect.
#[derive(Default)]
pub struct FakeTransport {
    advertised: Vec<&'static str>,
    failing_connects: AtomicU32,
    without_service: bool,
    pub connects: AtomicU32,
    pub disconnects: AtomicU32,
    pub subscribes: AtomicU32,
    pub scans: AtomicU32,
    callbacks: Mutex<Vec<NotificationCallback>>,
}

impl FakeTransport {
    /// A world where `TARGET` and one other device advertise.
    pub fn new() -> Self {
        Self {
            advertised: vec!["11:22:33:44:55:66", TARGET],
            ..Self::default()
        }
    }

    /// A world where only non-matching devices advertise.
    pub fn without_target() -> Self {
        Self {
            advertised: vec!["11:22:33:44:55:66", "ee:74:7d:c9:2a:68"],
            ..Self::default()
        }
    }

    /// Fail the first `count` connects.
    pub fn failing_connects(self, count: u32) -> Self {
        self.failing_connects.store(count, Ordering::SeqCst);
        self
    }

    /// Peripheral without the Heart Rate service.
    pub fn without_service(mut self) -> Self {
        self.without_service = true;
        self
    }

    /// Deliver a payload through the latest subscription.
    pub fn notify(&self) {
        let callback = self.callbacks.lock().last().cloned();
        if let Some(callback) = callback {
            callback(Bytes::from_static(&[0x06, 0x48]));
        }
    }

    /// Deliver a payload through the subscription of session `index` (0-based).
    pub fn notify_session(&self, index: usize) {
        let callback = self.callbacks.lock().get(index).cloned();
        if let Some(callback) = callback {
            callback(Bytes::from_static(&[0x06, 0x48]));
        }
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    async fn enable_adapter(&self) -> Result<()> {
        Ok(())
    }

    async fn scan(&self) -> Result<DiscoveryStream> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let found: Vec<DiscoveredPeripheral> = self
            .advertised
            .iter()
            .map(|address| DiscoveredPeripheral::new(*address))
            .collect();
        // A real scan keeps running until stopped.
        Ok(stream::iter(found).chain(stream::pending()).boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, address: &PeripheralAddress) -> Result<DeviceHandle> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::ConnectionFailed {
                reason: "connection attempt timed out".to_string(),
            });
        }

        Ok(DeviceHandle::new(address.clone()))
    }

    async fn discover_services(
        &self,
        device: &DeviceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<ServiceHandle>> {
        if self.without_service {
            return Ok(Vec::new());
        }
        Ok(uuids
            .iter()
            .map(|uuid| ServiceHandle::new(device.clone(), *uuid))
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<CharacteristicHandle>> {
        Ok(uuids
            .iter()
            .map(|uuid| CharacteristicHandle::new(service.clone(), *uuid))
            .collect())
    }

    async fn subscribe(
        &self,
        _characteristic: &CharacteristicHandle,
        on_notify: NotificationCallback,
    ) -> Result<()> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().push(on_notify);
        Ok(())
    }

    async fn disconnect(&self, _device: &DeviceHandle) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        // The radio link is usually already dead when we get here.
        Err(Error::NotConnected)
    }
}
