//! BLE scanning functionality.
//!
//! Turns btleplug central events into a stream of [`DiscoveredPeripheral`]s
//! and remembers the platform peripheral behind each address so a later
//! connect can find it.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::ble::transport::{DiscoveredPeripheral, DiscoveryStream, PeripheralAddress};
use crate::error::{Error, Result};

/// Platform peripherals seen while scanning, by address.
pub(crate) type PeripheralCache = Arc<RwLock<HashMap<PeripheralAddress, Peripheral>>>;

/// Open the first Bluetooth adapter of the platform manager.
///
/// # Errors
///
/// Returns [`Error::BluetoothUnavailable`] if there is no usable adapter.
pub(crate) async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new()
        .await
        .map_err(|_e| Error::BluetoothUnavailable)?;

    let adapters = manager
        .adapters()
        .await
        .map_err(|_e| Error::BluetoothUnavailable)?;

    let adapter = adapters
        .into_iter()
        .next()
        .ok_or(Error::BluetoothUnavailable)?;

    info!(
        "Using Bluetooth adapter: {:?}",
        adapter.adapter_info().await.ok()
    );

    Ok(adapter)
}

/// Start scanning and stream every discovered or updated peripheral.
///
/// The event stream is opened before the scan starts so that early
/// advertisements are not lost.
pub(crate) async fn start_discovery(
    adapter: &Adapter,
    cache: PeripheralCache,
) -> Result<DiscoveryStream> {
    let events = adapter.events().await.map_err(Error::Bluetooth)?;

    info!("Starting BLE scan");

    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(Error::Bluetooth)?;

    let adapter = adapter.clone();
    let stream = events.filter_map(move |event| {
        let adapter = adapter.clone();
        let cache = cache.clone();
        async move {
            match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                    trace!("Device seen: {:?}", id);
                    process_peripheral(&adapter, id, &cache).await
                }
                CentralEvent::DeviceDisconnected(id) => {
                    debug!("Device disconnected: {:?}", id);
                    None
                }
                _ => None,
            }
        }
    });

    Ok(stream.boxed())
}

/// Stop an active scan.
pub(crate) async fn stop_discovery(adapter: &Adapter) -> Result<()> {
    info!("Stopping BLE scan");
    adapter.stop_scan().await.map_err(Error::Bluetooth)
}

/// Resolve a peripheral id into a scan result and cache the peripheral.
async fn process_peripheral(
    adapter: &Adapter,
    id: PeripheralId,
    cache: &PeripheralCache,
) -> Option<DiscoveredPeripheral> {
    let peripheral = match adapter.peripheral(&id).await {
        Ok(p) => p,
        Err(e) => {
            trace!("Failed to get peripheral: {}", e);
            return None;
        }
    };

    let properties = match peripheral.properties().await {
        Ok(Some(p)) => p,
        _ => return None,
    };

    let address = PeripheralAddress::new(properties.address.to_string());

    cache.write().insert(address.clone(), peripheral);

    Some(DiscoveredPeripheral {
        address,
        rssi: properties.rssi,
        local_name: properties.local_name,
    })
}
