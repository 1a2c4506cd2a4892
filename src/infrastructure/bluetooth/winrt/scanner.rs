//! BLE Scanner Module
//!
//! Advertisement watcher feeding a [`ScanSink`].

use crate::domain::error::BleError;
use crate::domain::models::DiscoveredDevice;
use crate::domain::session::matches_name_filter;
use crate::infrastructure::bluetooth::{protocol, ScanSink};
use anyhow::Result;
use tracing::{info, warn};
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEAdvertisementWatcherStoppedEventArgs, BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::BluetoothError;
use windows::Foundation::TypedEventHandler;

#[derive(Default)]
pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
}

impl BleScanner {
    /// Start reporting advertisements. Any running watcher is stopped first.
    pub fn start(&mut self, name_filter: Option<&str>, sink: ScanSink) -> Result<()> {
        self.stop()?;
        info!("Starting BLE scan (name filter: {:?})", name_filter);

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let filter = name_filter.map(str::to_string);
        let results = sink.clone();
        let received = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    let address = args.BluetoothAddress()?;
                    let device =
                        DiscoveredDevice::new(protocol::format_address(address), Some(name));

                    // An advertisement without a name is still reported; the
                    // controller takes the name from a later scan response.
                    if matches_name_filter(&device, filter.as_deref()) {
                        results.report(Ok(device));
                    }
                }
                Ok(())
            },
        );
        watcher.Received(&received)?;

        let stopped = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementWatcherStoppedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let error = args.Error()?;
                    if error != BluetoothError::Success {
                        warn!("Advertisement watcher aborted: {:?}", error);
                        sink.report(Err(BleError::Scan(format!("{:?}", error))));
                    }
                }
                Ok(())
            },
        );
        watcher.Stopped(&stopped)?;

        watcher.Start()?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// No-op when idle.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan...");
            watcher.Stop()?;
        }
        Ok(())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
