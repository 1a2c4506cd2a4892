//! Windows Runtime implementation of the adapter traits.

mod scanner;
mod session;

pub use scanner::BleScanner;
pub use session::WinRtSession;

use crate::domain::error::BleError;
use crate::domain::models::DeviceId;
use crate::infrastructure::bluetooth::{protocol, BluetoothAdapter, ScanSink};
use tracing::{info, warn};
use windows::Devices::Bluetooth::BluetoothAdapter as RadioAdapter;
use windows::Devices::Radios::RadioState;

#[derive(Default)]
pub struct WinRtAdapter {
    scanner: BleScanner,
}

impl WinRtAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    async fn radio_enabled() -> anyhow::Result<bool> {
        let adapter = RadioAdapter::GetDefaultAsync()?.await?;
        if !adapter.IsLowEnergySupported()? {
            warn!("Default Bluetooth adapter does not support LE");
            return Ok(false);
        }
        let radio = adapter.GetRadioAsync()?.await?;
        Ok(radio.State()? == RadioState::On)
    }
}

impl BluetoothAdapter for WinRtAdapter {
    type Session = WinRtSession;

    async fn is_enabled(&self) -> Result<bool, BleError> {
        match Self::radio_enabled().await {
            Ok(enabled) => Ok(enabled),
            Err(e) => {
                warn!("Could not query Bluetooth radio: {:#}", e);
                Ok(false)
            }
        }
    }

    fn start_scan(&mut self, name_filter: Option<&str>, sink: ScanSink) -> Result<(), BleError> {
        self.scanner
            .start(name_filter, sink)
            .map_err(|e| BleError::Scan(format!("{:#}", e)))
    }

    fn stop_scan(&mut self) -> Result<(), BleError> {
        self.scanner
            .stop()
            .map_err(|e| BleError::Scan(format!("{:#}", e)))
    }

    async fn connect(&mut self, id: &DeviceId) -> Result<WinRtSession, BleError> {
        let address = protocol::parse_address(id.as_str())
            .map_err(|e| BleError::Connection(format!("{:#}", e)))?;
        WinRtSession::open(address)
            .await
            .map_err(|e| BleError::Connection(format!("{:#}", e)))
    }

    fn destroy(&mut self) {
        if let Err(e) = self.scanner.stop() {
            warn!("Failed to stop scanner on release: {:#}", e);
        }
        info!("WinRT Bluetooth adapter released");
    }
}
