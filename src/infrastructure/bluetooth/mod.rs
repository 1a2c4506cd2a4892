//! Bluetooth Module
//!
//! Seam between the session controller and the platform Bluetooth stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SessionController                       │
//! │  (owns the adapter, drains AdapterEvents one at a time)  │
//! └──────────────┬──────────────────────────▲───────────────┘
//!                │ calls                    │ AdapterEvent
//!                ▼                          │
//! ┌──────────────────────────┐   ┌──────────┴──────────┐
//! │ BluetoothAdapter          │   │ ScanSink            │
//! │  - scan / stop / connect  │──▶│ TelemetrySink       │
//! │ DeviceSession             │   │ (callback threads)  │
//! │  - subscribe / write      │   └─────────────────────┘
//! └──────────────────────────┘
//! ```
//!
//! Platform callbacks never touch controller state directly: they push an
//! [`AdapterEvent`] tagged with the generation of the scan or session that
//! produced it, and the controller drops events whose generation is stale.
//!
//! ## Modules
//!
//! - [`protocol`] - Channel UUIDs and payload decoding
//! - `winrt` - Windows implementation of the adapter traits

#![allow(async_fn_in_trait)]

pub mod protocol;

#[cfg(test)]
pub mod mock;

#[cfg(windows)]
pub mod winrt;

use crate::domain::error::BleError;
use crate::domain::models::{DeviceId, DiscoveredDevice};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Message delivered from adapter callbacks (or the scan timer) to the
/// controller's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Discovered {
        scan: u64,
        result: Result<DiscoveredDevice, BleError>,
    },
    ScanTimeout {
        scan: u64,
    },
    Telemetry {
        session: u64,
        result: Result<Vec<u8>, BleError>,
    },
}

/// Handed to [`BluetoothAdapter::start_scan`]; reports results of one scan.
#[derive(Debug, Clone)]
pub struct ScanSink {
    scan: u64,
    events: mpsc::UnboundedSender<AdapterEvent>,
}

impl ScanSink {
    pub fn new(scan: u64, events: mpsc::UnboundedSender<AdapterEvent>) -> Self {
        Self { scan, events }
    }

    /// Returns false once the controller is gone.
    pub fn report(&self, result: Result<DiscoveredDevice, BleError>) -> bool {
        self.events
            .send(AdapterEvent::Discovered {
                scan: self.scan,
                result,
            })
            .is_ok()
    }
}

/// Handed to [`DeviceSession::subscribe`]; delivers notifications of one session.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    session: u64,
    events: mpsc::UnboundedSender<AdapterEvent>,
}

impl TelemetrySink {
    pub fn new(session: u64, events: mpsc::UnboundedSender<AdapterEvent>) -> Self {
        Self { session, events }
    }

    pub fn deliver(&self, result: Result<Vec<u8>, BleError>) -> bool {
        self.events
            .send(AdapterEvent::Telemetry {
                session: self.session,
                result,
            })
            .is_ok()
    }
}

/// Radio-level capability: discovery and connection establishment.
pub trait BluetoothAdapter {
    type Session: DeviceSession;

    /// Whether the radio is powered and usable.
    async fn is_enabled(&self) -> Result<bool, BleError>;

    /// Starts reporting advertisements to `sink`. The name filter is a hint;
    /// the controller applies it again on every result.
    fn start_scan(&mut self, name_filter: Option<&str>, sink: ScanSink) -> Result<(), BleError>;

    /// Must be safe to call when no scan is running.
    fn stop_scan(&mut self) -> Result<(), BleError>;

    async fn connect(&mut self, id: &DeviceId) -> Result<Self::Session, BleError>;

    /// Releases the adapter entirely.
    fn destroy(&mut self);
}

/// An established connection to one peripheral.
pub trait DeviceSession {
    async fn discover_capabilities(&mut self) -> Result<(), BleError>;

    async fn subscribe(
        &mut self,
        service: Uuid,
        channel: Uuid,
        sink: TelemetrySink,
    ) -> Result<(), BleError>;

    async fn write(&mut self, service: Uuid, channel: Uuid, bytes: &[u8]) -> Result<(), BleError>;

    async fn close(&mut self) -> Result<(), BleError>;
}
