//! BLE connection management.
//!
//! Connection state reported by the supervisor, plus the btleplug calls that
//! open and close a link.

use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Connection state of the supervised peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected to the peripheral.
    #[default]
    Disconnected,
    /// Running the setup sequence.
    Connecting,
    /// Subscribed and receiving notifications.
    Connected,
    /// Tearing the session down.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Address of the peripheral.
    pub address: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Open a link to a peripheral and run full GATT discovery on it.
pub(crate) async fn open_link(peripheral: &Peripheral) -> Result<()> {
    if peripheral.is_connected().await.unwrap_or(false) {
        info!("Peripheral already connected at BLE level");
    } else {
        peripheral
            .connect()
            .await
            .map_err(|e| Error::ConnectionFailed {
                reason: e.to_string(),
            })?;
        info!("Successfully connected to peripheral");
    }

    // btleplug only fills `services()` after an explicit discovery pass.
    peripheral.discover_services().await.map_err(Error::Bluetooth)?;
    debug!("Discovered {} services", peripheral.services().len());

    Ok(())
}

/// Close a link.
pub(crate) async fn close_link(peripheral: &Peripheral) -> Result<()> {
    match peripheral.disconnect().await {
        Ok(_) => {
            info!("Successfully disconnected from peripheral");
            Ok(())
        }
        Err(e) => {
            error!("Failed to disconnect: {}", e);
            Err(Error::Bluetooth(e))
        }
    }
}
