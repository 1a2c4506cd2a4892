//! Recording adapter used by the session controller tests.

use super::{BluetoothAdapter, DeviceSession, ScanSink, TelemetrySink};
use crate::domain::error::BleError;
use crate::domain::models::DeviceId;
use crate::infrastructure::permissions::{Capability, PermissionGate};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug)]
pub struct MockState {
    pub enabled: bool,
    pub start_scan_calls: usize,
    pub stop_scan_calls: usize,
    pub scan_filters: Vec<Option<String>>,
    pub scan_sinks: Vec<ScanSink>,
    pub start_scan_failure: Option<BleError>,
    pub connect_calls: Vec<DeviceId>,
    pub connect_failure: Option<BleError>,
    pub connect_delay: Option<Duration>,
    pub discover_failure: Option<BleError>,
    pub write_failure: Option<BleError>,
    pub subscriptions: Vec<(Uuid, Uuid)>,
    pub telemetry_sinks: Vec<TelemetrySink>,
    pub writes: Vec<(Uuid, Uuid, Vec<u8>)>,
    pub close_calls: usize,
    pub destroy_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            enabled: true,
            start_scan_calls: 0,
            stop_scan_calls: 0,
            scan_filters: Vec::new(),
            scan_sinks: Vec::new(),
            start_scan_failure: None,
            connect_calls: Vec::new(),
            connect_failure: None,
            connect_delay: None,
            discover_failure: None,
            write_failure: None,
            subscriptions: Vec::new(),
            telemetry_sinks: Vec::new(),
            writes: Vec::new(),
            close_calls: 0,
            destroy_calls: 0,
        }
    }
}

/// Clones share state, so a test keeps one clone to script and inspect the
/// adapter owned by the controller.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Sink of the most recent scan.
    pub fn scan_sink(&self) -> ScanSink {
        self.with(|s| s.scan_sinks.last().cloned())
            .expect("no scan was started")
    }

    /// Sink of the most recent telemetry subscription.
    pub fn telemetry_sink(&self) -> TelemetrySink {
        self.with(|s| s.telemetry_sinks.last().cloned())
            .expect("no telemetry subscription")
    }
}

impl BluetoothAdapter for MockAdapter {
    type Session = MockSession;

    async fn is_enabled(&self) -> Result<bool, BleError> {
        Ok(self.with(|s| s.enabled))
    }

    fn start_scan(&mut self, name_filter: Option<&str>, sink: ScanSink) -> Result<(), BleError> {
        self.with(|s| {
            s.start_scan_calls += 1;
            if let Some(err) = s.start_scan_failure.clone() {
                return Err(err);
            }
            s.scan_filters.push(name_filter.map(str::to_string));
            s.scan_sinks.push(sink);
            Ok(())
        })
    }

    fn stop_scan(&mut self) -> Result<(), BleError> {
        self.with(|s| s.stop_scan_calls += 1);
        Ok(())
    }

    async fn connect(&mut self, id: &DeviceId) -> Result<MockSession, BleError> {
        if let Some(delay) = self.with(|s| s.connect_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| {
            s.connect_calls.push(id.clone());
            match s.connect_failure.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })?;
        Ok(MockSession {
            state: self.state.clone(),
        })
    }

    fn destroy(&mut self) {
        self.with(|s| s.destroy_calls += 1);
    }
}

#[derive(Debug)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

impl DeviceSession for MockSession {
    async fn discover_capabilities(&mut self) -> Result<(), BleError> {
        match self.with(|s| s.discover_failure.clone()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &mut self,
        service: Uuid,
        channel: Uuid,
        sink: TelemetrySink,
    ) -> Result<(), BleError> {
        self.with(|s| {
            s.subscriptions.push((service, channel));
            s.telemetry_sinks.push(sink);
        });
        Ok(())
    }

    async fn write(&mut self, service: Uuid, channel: Uuid, bytes: &[u8]) -> Result<(), BleError> {
        self.with(|s| {
            if let Some(err) = s.write_failure.clone() {
                return Err(err);
            }
            s.writes.push((service, channel, bytes.to_vec()));
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<(), BleError> {
        self.with(|s| s.close_calls += 1);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MockPermissions {
    granted: bool,
}

impl MockPermissions {
    pub fn granted() -> Self {
        Self { granted: true }
    }

    pub fn denied() -> Self {
        Self { granted: false }
    }
}

impl PermissionGate for MockPermissions {
    async fn ensure_granted(&mut self, _capabilities: &[Capability]) -> bool {
        self.granted
    }
}
