//! GATT session on top of a `BluetoothLEDevice`.

use crate::domain::error::BleError;
use crate::infrastructure::bluetooth::{DeviceSession, TelemetrySink};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattCommunicationStatus, GattDeviceService, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::BluetoothLEDevice;
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

pub(crate) fn from_guid(guid: GUID) -> Uuid {
    Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4)
}

fn read_buffer(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let length = reader.UnconsumedBufferLength()? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}

pub struct WinRtSession {
    device: BluetoothLEDevice,
    services: HashMap<Uuid, GattDeviceService>,
    characteristics: HashMap<(Uuid, Uuid), GattCharacteristic>,
    subscriptions: Vec<(GattCharacteristic, i64)>,
    released: bool,
}

impl WinRtSession {
    pub async fn open(address: u64) -> Result<Self> {
        info!("Connecting to Bluetooth device: {:#X}", address);
        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;
        info!("Device connected: {:?}", device.Name()?);

        Ok(Self {
            device,
            services: HashMap::new(),
            characteristics: HashMap::new(),
            subscriptions: Vec::new(),
            released: false,
        })
    }

    async fn load_services(&mut self) -> Result<()> {
        let result = self.device.GetGattServicesAsync()?.await?;
        let status = result.Status()?;
        if status != GattCommunicationStatus::Success {
            anyhow::bail!("Failed to get GATT services: {:?}", status);
        }

        let services = result.Services()?;
        for i in 0..services.Size()? {
            let service = services.GetAt(i)?;
            self.services.insert(from_guid(service.Uuid()?), service);
        }
        info!("Found {} GATT services", self.services.len());
        Ok(())
    }

    async fn characteristic(&mut self, service: Uuid, channel: Uuid) -> Result<GattCharacteristic> {
        if let Some(found) = self.characteristics.get(&(service, channel)) {
            return Ok(found.clone());
        }

        let gatt_service = self
            .services
            .get(&service)
            .ok_or_else(|| anyhow!("Service {} not found", service))?;

        let result = gatt_service.GetCharacteristicsAsync()?.await?;
        if result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!("Failed to get characteristics of {}", service);
        }

        let characteristics = result.Characteristics()?;
        for i in 0..characteristics.Size()? {
            let c = characteristics.GetAt(i)?;
            if from_guid(c.Uuid()?) == channel {
                self.characteristics.insert((service, channel), c.clone());
                return Ok(c);
            }
        }
        Err(anyhow!("Characteristic {} not found", channel))
    }

    async fn enable_notifications(
        &mut self,
        service: Uuid,
        channel: Uuid,
        sink: TelemetrySink,
    ) -> Result<()> {
        let characteristic = self.characteristic(service, channel).await?;

        let status = characteristic
            .WriteClientCharacteristicConfigurationDescriptorAsync(
                GattClientCharacteristicConfigurationDescriptorValue::Notify,
            )?
            .await?;
        if status != GattCommunicationStatus::Success {
            anyhow::bail!("Notification subscription returned status: {:?}", status);
        }

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let result = read_buffer(&args.CharacteristicValue()?)
                        .map_err(|e| BleError::Telemetry(e.to_string()));
                    sink.deliver(result);
                }
                Ok(())
            },
        );
        let token = characteristic.ValueChanged(&handler)?;
        self.subscriptions.push((characteristic, token));

        info!("Notifications enabled on {}", channel);
        Ok(())
    }

    async fn write_value(&mut self, service: Uuid, channel: Uuid, bytes: &[u8]) -> Result<()> {
        let characteristic = self.characteristic(service, channel).await?;

        let writer = DataWriter::new()?;
        writer.WriteBytes(bytes)?;
        let buffer = writer.DetachBuffer()?;

        let status = characteristic.WriteValueAsync(&buffer)?.await?;
        if status != GattCommunicationStatus::Success {
            anyhow::bail!("Write returned status: {:?}", status);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        for (characteristic, token) in self.subscriptions.drain(..) {
            if let Err(e) = characteristic.RemoveValueChanged(token) {
                warn!("Failed to remove notification handler: {}", e);
            }
        }
        self.characteristics.clear();
        for (_, service) in self.services.drain() {
            let _ = service.Close();
        }
        self.device.Close()?;
        info!("Disconnected from device");
        Ok(())
    }
}

impl Drop for WinRtSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release session on drop: {:#}", e);
        }
    }
}

impl DeviceSession for WinRtSession {
    async fn discover_capabilities(&mut self) -> Result<(), BleError> {
        self.load_services()
            .await
            .map_err(|e| BleError::Connection(format!("{:#}", e)))
    }

    async fn subscribe(
        &mut self,
        service: Uuid,
        channel: Uuid,
        sink: TelemetrySink,
    ) -> Result<(), BleError> {
        self.enable_notifications(service, channel, sink)
            .await
            .map_err(|e| BleError::Connection(format!("{:#}", e)))
    }

    async fn write(&mut self, service: Uuid, channel: Uuid, bytes: &[u8]) -> Result<(), BleError> {
        self.write_value(service, channel, bytes)
            .await
            .map_err(|e| BleError::Write(format!("{:#}", e)))
    }

    async fn close(&mut self) -> Result<(), BleError> {
        self.release()
            .map_err(|e| BleError::Connection(format!("{:#}", e)))
    }
}
