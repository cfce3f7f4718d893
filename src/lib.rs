//! # hrs-watchdog
//!
//! Keeps a Bluetooth Low Energy Heart Rate sensor streaming.
//!
//! BLE links to chest straps and watches often fail silently: the link
//! stays up as far as the host stack is concerned, but Heart Rate
//! Measurement notifications stop arriving. This crate supervises such a
//! link. It connects to one peripheral by address, subscribes to the Heart
//! Rate Measurement characteristic, checks on a fixed interval how long ago
//! the last notification arrived, and tears the session down and sets it up
//! again once the stream has been stale for too many checks in a row.
//!
//! ## Features
//!
//! - **Setup sequencing**: enable → scan → connect → discover → subscribe,
//!   stopping at the first failing step
//! - **Liveness tracking**: fresh/stale classification against a window
//! - **Debounced reconnects**: only after `N + 1` consecutive stale checks
//! - **Bounded retries**: exponential backoff on connect and scan failures
//! - **Event log**: append-only `start`/`pass`/`overdue`/`received`/`reconnect` records
//!
//! Payload contents are not interpreted; only their arrival matters.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hrs_watchdog::{
//!     shutdown_channel, BtleplugTransport, FileEventLog, Result, Supervisor, SupervisorConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SupervisorConfig::new("EE:74:7D:C9:2A:68");
//!     let sink = Arc::new(FileEventLog::open("bluetooth.log")?);
//!     let supervisor = Supervisor::new(Arc::new(BtleplugTransport::new()), config, sink);
//!
//!     let (trigger, signal) = shutdown_channel();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         trigger.trigger();
//!     });
//!
//!     supervisor.run(signal).await
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! CoreBluetooth does not expose hardware addresses, so targeting by
//! address does not work there.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for event types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod events;
pub mod liveness;
pub mod matcher;
pub mod setup;
pub mod shutdown;
pub mod supervisor;
pub mod utils;

// Re-exports for convenience
pub use ble::{
    BleTransport, BtleplugTransport, ConnectionEvent, ConnectionState, DiscoveredPeripheral,
    NotificationCallback, PeripheralAddress,
};
pub use config::SupervisorConfig;
pub use error::{Error, Result};
pub use events::{
    EventKind, EventSink, FileEventLog, LinkEvent, MemoryEventLog, MultiSink, TracingEventSink,
};
pub use liveness::{Freshness, LivenessTracker, NotificationRecorder, TickOutcome};
pub use matcher::AddressMatcher;
pub use setup::{ConnectionSession, SetupPhase, SetupSequencer};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use supervisor::Supervisor;
pub use utils::backoff_delay;
