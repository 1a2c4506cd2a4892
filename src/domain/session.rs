//! Device Session Controller
//!
//! Owns the scan / connect / stream / send / disconnect lifecycle for a single
//! peripheral and the observable [`ControllerState`].
//!
//! ```text
//!   Idle ──start_scan──▶ Scanning ──timeout / error / stop──▶ Idle
//!    │                      │
//!    └────select_device─────┴──▶ Connecting ──fail──▶ Idle
//!                                   │
//!                                   ▼ ok
//!                               Connected ──disconnect──▶ Disconnecting ──▶ Idle
//! ```
//!
//! The controller is the only writer of its state. Adapter callbacks and the
//! scan timer reach it as [`AdapterEvent`]s; each event carries the
//! generation of the scan or session that produced it and is dropped if that
//! scan or session is no longer current. Failures are logged and absorbed,
//! nothing is retried automatically.

use crate::domain::error::BleError;
use crate::domain::log::{EventLog, DEFAULT_RETENTION};
use crate::domain::models::{
    Alert, ControllerCommand, ControllerState, DeviceId, DiscoveredDevice, OutputCommand,
    SessionPhase, DEFAULT_COLOR,
};
use crate::infrastructure::bluetooth::{
    protocol, AdapterEvent, BluetoothAdapter, DeviceSession, ScanSink, TelemetrySink,
};
use crate::infrastructure::permissions::{PermissionGate, REQUIRED_CAPABILITIES};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration, derived from the persisted settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub scan_timeout: Duration,
    pub name_filter: Option<String>,
    pub telemetry_service: Uuid,
    pub telemetry_channel: Uuid,
    pub control_service: Uuid,
    pub control_channel: Uuid,
    pub log_retention: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: SCAN_TIMEOUT,
            name_filter: None,
            telemetry_service: protocol::TELEMETRY_SERVICE_UUID,
            telemetry_channel: protocol::TELEMETRY_CHAR_UUID,
            control_service: protocol::CONTROL_SERVICE_UUID,
            control_channel: protocol::CONTROL_CHAR_UUID,
            log_retention: DEFAULT_RETENTION,
        }
    }
}

/// Case-insensitive substring match on the advertised name. Unnamed devices
/// never match a configured filter.
pub fn matches_name_filter(device: &DiscoveredDevice, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    device
        .display_name
        .as_deref()
        .map(|name| name.to_lowercase().contains(&filter.to_lowercase()))
        .unwrap_or(false)
}

struct ActiveSession<S> {
    device: DiscoveredDevice,
    handle: S,
    generation: u64,
}

pub struct SessionController<A: BluetoothAdapter, P: PermissionGate> {
    adapter: A,
    permissions: P,
    config: SessionConfig,

    phase: SessionPhase,
    devices: Vec<DiscoveredDevice>,
    last_color: String,
    alert: Option<Alert>,
    log: EventLog,
    session: Option<ActiveSession<A::Session>>,

    scan_generation: u64,
    session_generation: u64,
    scan_timer: Option<JoinHandle<()>>,
    released: bool,

    events_tx: mpsc::UnboundedSender<AdapterEvent>,
    events_rx: mpsc::UnboundedReceiver<AdapterEvent>,
    state_tx: watch::Sender<ControllerState>,
}

impl<A: BluetoothAdapter, P: PermissionGate> SessionController<A, P> {
    pub fn new(adapter: A, permissions: P, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ControllerState::default());

        Self {
            adapter,
            permissions,
            log: EventLog::new(config.log_retention),
            config,
            phase: SessionPhase::Idle,
            devices: Vec::new(),
            last_color: DEFAULT_COLOR.to_string(),
            alert: None,
            session: None,
            scan_generation: 0,
            session_generation: 0,
            scan_timer: None,
            released: false,
            events_tx,
            events_rx,
            state_tx,
        }
    }

    /// Receiver that sees every published state.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ControllerState {
        ControllerState {
            phase: self.phase,
            devices: self.devices.clone(),
            session: self.session.as_ref().map(|s| s.device.clone()),
            scanning: self.phase == SessionPhase::Scanning,
            last_color: self.last_color.clone(),
            log: self.log.snapshot(),
            alert: self.alert,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    /// Drive the controller until a `Shutdown` command arrives or every
    /// command sender is dropped, then tear down.
    ///
    /// A shutdown interrupts the command in flight (a slow connect, say).
    /// Other commands that arrive meanwhile are queued in order.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ControllerCommand>) {
        self.initialize().await;
        let mut backlog = VecDeque::new();

        loop {
            let next = match backlog.pop_front() {
                Some(command) => Some(command),
                None => tokio::select! {
                    command = commands.recv() => command,
                    Some(event) = self.events_rx.recv() => {
                        self.handle_event(event);
                        continue;
                    }
                },
            };
            let command = match next {
                Some(ControllerCommand::Shutdown) | None => break,
                Some(command) => command,
            };

            let interrupted = {
                let work = self.dispatch(command);
                tokio::pin!(work);
                loop {
                    tokio::select! {
                        biased;
                        () = &mut work => break false,
                        queued = commands.recv() => match queued {
                            Some(ControllerCommand::Shutdown) | None => break true,
                            Some(queued) => backlog.push_back(queued),
                        },
                    }
                }
            };
            if interrupted {
                info!("Shutdown interrupted a pending command");
                break;
            }
        }

        self.teardown().await;
    }

    pub async fn dispatch(&mut self, command: ControllerCommand) {
        if self.released {
            warn!("Ignoring {:?}, adapter already released", command);
            return;
        }

        match command {
            ControllerCommand::StartScan => self.start_scan().await,
            ControllerCommand::StopScan => self.stop_scan(),
            ControllerCommand::SelectDevice(id) => self.select_device(&id).await,
            ControllerCommand::Send(output) => self.send(output).await,
            ControllerCommand::Disconnect => self.disconnect().await,
            ControllerCommand::DismissAlert => self.dismiss_alert(),
            ControllerCommand::UpdateConfig(config) => self.update_config(config),
            ControllerCommand::Shutdown => self.teardown().await,
        }
    }

    /// Startup checks: permissions first, then radio state. Failures raise an
    /// alert but leave the controller usable so the user can retry.
    pub async fn initialize(&mut self) {
        info!("Initializing device session");
        if let Err(e) = self.ensure_ready().await {
            self.report(e);
        }
        self.publish();
    }

    pub async fn start_scan(&mut self) {
        match self.phase {
            SessionPhase::Idle => {}
            SessionPhase::Scanning => {
                debug!("Scan already running, restarting");
                self.cancel_scan();
            }
            SessionPhase::Connecting | SessionPhase::Connected | SessionPhase::Disconnecting => {
                self.log.log_event("Disconnect before scanning for other devices");
                self.publish();
                return;
            }
        }

        if let Err(e) = self.ensure_ready().await {
            self.report(e);
            self.publish();
            return;
        }

        self.devices.clear();
        self.scan_generation += 1;
        let sink = ScanSink::new(self.scan_generation, self.events_tx.clone());

        if let Err(e) = self
            .adapter
            .start_scan(self.config.name_filter.as_deref(), sink)
        {
            self.report(e);
            self.publish();
            return;
        }

        self.phase = SessionPhase::Scanning;
        self.arm_scan_timer();

        match &self.config.name_filter {
            Some(filter) => self
                .log
                .log_event(format!("Scanning for devices named \"{}\"...", filter)),
            None => self.log.log_event("Scanning for devices..."),
        };
        self.publish();
    }

    /// Safe to call at any time; only logs if a scan was actually running.
    pub fn stop_scan(&mut self) {
        let was_scanning = self.phase == SessionPhase::Scanning;
        self.cancel_scan();

        if was_scanning {
            self.log.log_event(format!(
                "Scan stopped, {} device(s) found",
                self.devices.len()
            ));
            self.publish();
        }
    }

    pub async fn select_device(&mut self, id: &DeviceId) {
        if !matches!(self.phase, SessionPhase::Idle | SessionPhase::Scanning) {
            self.log
                .log_event("Already connected, disconnect before selecting another device");
            self.publish();
            return;
        }

        let device = self
            .devices
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .unwrap_or_else(|| DiscoveredDevice {
                id: id.clone(),
                display_name: None,
            });

        self.cancel_scan();
        self.phase = SessionPhase::Connecting;
        self.log
            .log_event(format!("Connecting to {}...", device.label()));
        self.publish();

        match self.establish(&device).await {
            Ok(active) => {
                self.session = Some(active);
                self.phase = SessionPhase::Connected;
                self.log
                    .log_event(format!("Connected to {}", device.label()));
            }
            Err(e) => {
                self.phase = SessionPhase::Idle;
                self.report(e);
            }
        }
        self.publish();
    }

    pub async fn send(&mut self, command: OutputCommand) {
        let (service, channel) = (self.config.control_service, self.config.control_channel);
        let bytes = command.as_bytes();

        let Some(active) = self.session.as_mut() else {
            self.alert = Some(Alert::NoDeviceConnected);
            self.log.log_error(Alert::NoDeviceConnected.message());
            self.publish();
            return;
        };

        match active.handle.write(service, channel, bytes).await {
            Ok(()) => self
                .log
                .log_event(format!("Sent data: {}", String::from_utf8_lossy(bytes))),
            Err(e) => self.log.log_error(e.to_string()),
        };
        self.publish();
    }

    /// Second and later calls without a session are no-ops.
    pub async fn disconnect(&mut self) {
        let Some(mut active) = self.session.take() else {
            debug!("Disconnect requested with no active session");
            return;
        };

        self.phase = SessionPhase::Disconnecting;
        self.publish();

        if let Err(e) = active.handle.close().await {
            self.log.log_error(e.to_string());
        }

        self.phase = SessionPhase::Idle;
        self.log
            .log_event(format!("Disconnected from {}", active.device.label()));
        self.publish();
    }

    /// Releases every adapter resource. The adapter is destroyed exactly once
    /// no matter how often this is called.
    pub async fn teardown(&mut self) {
        if self.released {
            return;
        }

        self.cancel_scan();
        if let Some(mut active) = self.session.take() {
            if let Err(e) = active.handle.close().await {
                warn!("Failed to close session during teardown: {}", e);
            }
        }

        self.adapter.destroy();
        self.released = true;
        self.phase = SessionPhase::Idle;
        info!("Bluetooth adapter released");
        self.publish();
    }

    pub fn dismiss_alert(&mut self) {
        if self.alert.take().is_some() {
            self.publish();
        }
    }

    /// Takes effect on the next scan or connect.
    pub fn update_config(&mut self, config: SessionConfig) {
        debug!("Session config updated: {:?}", config);
        self.log.set_retention(config.log_retention);
        self.config = config;
        self.publish();
    }

    pub fn handle_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Discovered { scan, result } => {
                if !self.is_current_scan(scan) {
                    debug!(scan, "Dropping result of a finished scan");
                    return;
                }
                match result {
                    Ok(device) => {
                        if !self.insert_device(device) {
                            return;
                        }
                    }
                    Err(e) => {
                        self.cancel_scan();
                        self.report(e);
                    }
                }
            }
            AdapterEvent::ScanTimeout { scan } => {
                if !self.is_current_scan(scan) {
                    debug!(scan, "Dropping timeout of a finished scan");
                    return;
                }
                // The timer task has already completed.
                self.scan_timer = None;
                self.cancel_scan();
                self.log.log_event(format!(
                    "Scan finished, {} device(s) found",
                    self.devices.len()
                ));
            }
            AdapterEvent::Telemetry { session, result } => {
                if !self
                    .session
                    .as_ref()
                    .is_some_and(|active| active.generation == session)
                {
                    debug!(session, "Dropping telemetry for a closed session");
                    return;
                }
                match result.and_then(|bytes| protocol::decode_color(&bytes)) {
                    Ok(color) => {
                        self.log.log_event(format!("Received color: {}", color));
                        self.last_color = color;
                    }
                    Err(e) => {
                        self.log.log_error(e.to_string());
                    }
                }
            }
        }
        self.publish();
    }

    /// Handle every event that is already queued. Returns how many there were.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event and handle it.
    pub async fn wait_event(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    async fn ensure_ready(&mut self) -> Result<(), BleError> {
        if !self.permissions.ensure_granted(REQUIRED_CAPABILITIES).await {
            return Err(BleError::PermissionDenied);
        }
        match self.adapter.is_enabled().await? {
            true => Ok(()),
            false => Err(BleError::AdapterDisabled),
        }
    }

    async fn establish(
        &mut self,
        device: &DiscoveredDevice,
    ) -> Result<ActiveSession<A::Session>, BleError> {
        let mut handle = self.adapter.connect(&device.id).await?;

        self.session_generation += 1;
        let generation = self.session_generation;
        let sink = TelemetrySink::new(generation, self.events_tx.clone());

        let setup = match handle.discover_capabilities().await {
            Ok(()) => {
                handle
                    .subscribe(
                        self.config.telemetry_service,
                        self.config.telemetry_channel,
                        sink,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = setup {
            if let Err(close_err) = handle.close().await {
                warn!("Failed to close half-open session: {}", close_err);
            }
            return Err(e);
        }

        Ok(ActiveSession {
            device: device.clone(),
            handle,
            generation,
        })
    }

    fn insert_device(&mut self, device: DiscoveredDevice) -> bool {
        if !matches_name_filter(&device, self.config.name_filter.as_deref()) {
            debug!("Ignoring {} (name filter)", device.label());
            return false;
        }
        if let Some(known) = self.devices.iter_mut().find(|d| d.id == device.id) {
            // A scan response can name a device first seen in a bare advertisement.
            if known.display_name.is_none() && device.display_name.is_some() {
                debug!("Named {} as {}", known.id, device.label());
                known.display_name = device.display_name;
                return true;
            }
            return false;
        }
        debug!("Discovered {} ({})", device.label(), device.id);
        self.devices.push(device);
        true
    }

    fn is_current_scan(&self, scan: u64) -> bool {
        self.phase == SessionPhase::Scanning && scan == self.scan_generation
    }

    fn arm_scan_timer(&mut self) {
        let events = self.events_tx.clone();
        let scan = self.scan_generation;
        let timeout = self.config.scan_timeout;

        self.scan_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(AdapterEvent::ScanTimeout { scan });
        }));
    }

    /// Idempotent: aborts the timer, stops the adapter scan, leaves Scanning.
    fn cancel_scan(&mut self) {
        if let Some(timer) = self.scan_timer.take() {
            timer.abort();
        }
        if let Err(e) = self.adapter.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }
        if self.phase == SessionPhase::Scanning {
            self.phase = SessionPhase::Idle;
        }
    }

    fn report(&mut self, error: BleError) {
        if let Some(alert) = error.alert() {
            self.alert = Some(alert);
        }
        self.log.log_error(error.to_string());
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state());
    }
}

impl<A: BluetoothAdapter, P: PermissionGate> Drop for SessionController<A, P> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(timer) = self.scan_timer.take() {
            timer.abort();
        }
        let _ = self.adapter.stop_scan();
        self.session = None;
        self.adapter.destroy();
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LogEntry, LogLevel};
    use crate::infrastructure::bluetooth::mock::{MockAdapter, MockPermissions};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    type TestController = SessionController<MockAdapter, MockPermissions>;

    fn controller_with(config: SessionConfig) -> (TestController, MockAdapter) {
        let adapter = MockAdapter::new();
        let controller =
            SessionController::new(adapter.clone(), MockPermissions::granted(), config);
        (controller, adapter)
    }

    fn controller() -> (TestController, MockAdapter) {
        controller_with(SessionConfig::default())
    }

    fn device(id: &str, name: Option<&str>) -> DiscoveredDevice {
        DiscoveredDevice::new(id, name.map(str::to_string))
    }

    fn ids(controller: &TestController) -> Vec<&str> {
        controller.devices().iter().map(|d| d.id.as_str()).collect()
    }

    fn count(log: &[LogEntry], level: LogLevel) -> usize {
        log.iter().filter(|e| e.level == level).count()
    }

    async fn connected() -> (TestController, MockAdapter) {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        adapter.scan_sink().report(Ok(device("A", Some("Arduino"))));
        controller.process_pending_events();
        controller.select_device(&DeviceId::new("A")).await;
        assert_eq!(controller.phase(), SessionPhase::Connected);
        (controller, adapter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_dedupes_in_discovery_order() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        assert_eq!(controller.phase(), SessionPhase::Scanning);
        assert!(controller.state().scanning);

        let sink = adapter.scan_sink();
        sink.report(Ok(device("A", Some("Arduino"))));
        sink.report(Ok(device("B", None)));
        sink.report(Ok(device("A", Some("Arduino renamed"))));
        assert_eq!(controller.process_pending_events(), 3);

        assert_eq!(ids(&controller), vec!["A", "B"]);
        assert_eq!(controller.devices()[0].label(), "Arduino");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_name_fills_unnamed_entry() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;

        let sink = adapter.scan_sink();
        sink.report(Ok(device("A", None)));
        sink.report(Ok(device("B", Some("Beacon"))));
        sink.report(Ok(device("A", Some("Arduino"))));
        sink.report(Ok(device("A", None)));
        assert_eq!(controller.process_pending_events(), 4);

        assert_eq!(ids(&controller), vec!["A", "B"]);
        assert_eq!(controller.devices()[0].label(), "Arduino");
        assert_eq!(
            controller.state().devices[0].display_name.as_deref(),
            Some("Arduino")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_results_returns_to_idle() {
        let (mut controller, adapter) = controller();
        let started = Instant::now();
        controller.start_scan().await;

        controller.wait_event().await;

        assert!(started.elapsed() >= SCAN_TIMEOUT);
        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert!(controller.devices().is_empty());
        assert!(adapter.with(|s| s.stop_scan_calls) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_after_timeout_is_ignored() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        let sink = adapter.scan_sink();

        controller.wait_event().await;
        assert_eq!(controller.phase(), SessionPhase::Idle);

        sink.report(Ok(device("late", None)));
        controller.process_pending_events();
        assert!(controller.devices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_leaves_single_timer() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        let first = adapter.scan_sink();
        controller.start_scan().await;
        let second = adapter.scan_sink();

        assert_eq!(adapter.with(|s| s.start_scan_calls), 2);
        assert_eq!(controller.phase(), SessionPhase::Scanning);

        first.report(Ok(device("stale", None)));
        second.report(Ok(device("fresh", None)));
        controller.process_pending_events();
        assert_eq!(ids(&controller), vec!["fresh"]);

        tokio::time::sleep(SCAN_TIMEOUT * 3).await;
        assert_eq!(controller.process_pending_events(), 1);
        assert_eq!(controller.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_error_is_terminal() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        adapter
            .scan_sink()
            .report(Err(BleError::Scan("radio busy".into())));
        controller.process_pending_events();

        let state = controller.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(count(&state.log, LogLevel::Error), 1);
        assert_eq!(adapter.with(|s| s.start_scan_calls), 1);

        tokio::time::sleep(SCAN_TIMEOUT * 2).await;
        assert_eq!(controller.process_pending_events(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_refusing_scan_stays_idle() {
        let (mut controller, adapter) = controller();
        adapter.with(|s| s.start_scan_failure = Some(BleError::Scan("busy".into())));

        controller.start_scan().await;

        let state = controller.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(count(&state.log, LogLevel::Error), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_filter_discards_silently() {
        let config = SessionConfig {
            name_filter: Some("arduino".to_string()),
            ..SessionConfig::default()
        };
        let (mut controller, adapter) = controller_with(config);
        controller.start_scan().await;
        assert_eq!(
            adapter.with(|s| s.scan_filters.last().cloned()),
            Some(Some("arduino".to_string()))
        );

        let sink = adapter.scan_sink();
        sink.report(Ok(device("1", Some("Arduino Nano 33"))));
        sink.report(Ok(device("2", Some("HC-05"))));
        sink.report(Ok(device("3", None)));
        controller.process_pending_events();

        assert_eq!(ids(&controller), vec!["1"]);
        assert_eq!(count(&controller.state().log, LogLevel::Error), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_scan_is_idempotent() {
        let (mut controller, _adapter) = controller();
        controller.stop_scan();
        controller.stop_scan();
        assert_eq!(controller.phase(), SessionPhase::Idle);
        assert!(controller.state().log.is_empty());

        controller.start_scan().await;
        controller.stop_scan();
        controller.stop_scan();
        assert_eq!(controller.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_keeps_devices() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        let sink = adapter.scan_sink();
        sink.report(Ok(device("A", None)));
        sink.report(Ok(device("B", None)));
        controller.process_pending_events();

        adapter.with(|s| s.connect_failure = Some(BleError::Connection("timeout".into())));
        let errors_before = count(&controller.state().log, LogLevel::Error);
        controller.select_device(&DeviceId::new("B")).await;

        let state = controller.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.session, None);
        assert_eq!(ids(&controller), vec!["A", "B"]);
        assert_eq!(count(&state.log, LogLevel::Error), errors_before + 1);
        assert_eq!(adapter.with(|s| s.connect_calls.clone()), vec![DeviceId::new("B")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_stops_scan_and_subscribes() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        adapter.scan_sink().report(Ok(device("A", Some("Arduino"))));
        controller.process_pending_events();

        let stops_before = adapter.with(|s| s.stop_scan_calls);
        controller.select_device(&DeviceId::new("A")).await;
        assert_eq!(controller.phase(), SessionPhase::Connected);
        assert!(adapter.with(|s| s.stop_scan_calls) > stops_before);

        // The scan timer was aborted and never fires while connected.
        tokio::time::sleep(SCAN_TIMEOUT * 2).await;
        assert_eq!(controller.process_pending_events(), 0);
        assert_eq!(controller.phase(), SessionPhase::Connected);

        let state = controller.state();
        assert!(!state.scanning);
        assert_eq!(state.session.as_ref().map(|d| d.label()), Some("Arduino"));

        let subscriptions = adapter.with(|s| s.subscriptions.clone());
        assert_eq!(
            subscriptions,
            vec![(protocol::TELEMETRY_SERVICE_UUID, protocol::TELEMETRY_CHAR_UUID)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_failure_closes_half_open_session() {
        let (mut controller, adapter) = controller();
        adapter.with(|s| s.discover_failure = Some(BleError::Connection("no services".into())));

        controller.select_device(&DeviceId::new("A")).await;

        let state = controller.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.session, None);
        assert_eq!(count(&state.log, LogLevel::Error), 1);
        assert_eq!(adapter.with(|s| s.close_calls), 1);
        assert!(adapter.with(|s| s.subscriptions.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_on_then_off() {
        let (mut controller, adapter) = connected().await;
        let session_before = controller.state().session;

        controller.send(OutputCommand::On).await;
        controller.send(OutputCommand::Off).await;

        let writes = adapter.with(|s| s.writes.clone());
        assert_eq!(
            writes,
            vec![
                (
                    protocol::CONTROL_SERVICE_UUID,
                    protocol::CONTROL_CHAR_UUID,
                    b"1".to_vec()
                ),
                (
                    protocol::CONTROL_SERVICE_UUID,
                    protocol::CONTROL_CHAR_UUID,
                    b"0".to_vec()
                ),
            ]
        );
        assert_eq!(controller.state().session, session_before);
        assert_eq!(controller.phase(), SessionPhase::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_logged_only() {
        let (mut controller, adapter) = connected().await;
        adapter.with(|s| s.write_failure = Some(BleError::Write("gatt busy".into())));
        let errors_before = count(&controller.state().log, LogLevel::Error);

        controller.send(OutputCommand::On).await;

        let state = controller.state();
        assert_eq!(state.phase, SessionPhase::Connected);
        assert!(state.session.is_some());
        assert_eq!(count(&state.log, LogLevel::Error), errors_before + 1);
        assert!(adapter.with(|s| s.writes.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_session_alerts() {
        let (mut controller, adapter) = controller();
        controller.send(OutputCommand::On).await;

        let state = controller.state();
        assert_eq!(state.alert, Some(Alert::NoDeviceConnected));
        assert_eq!(count(&state.log, LogLevel::Error), 1);
        assert!(adapter.with(|s| s.writes.is_empty()));

        controller.dismiss_alert();
        assert_eq!(controller.state().alert, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_updates_color() {
        let (mut controller, adapter) = connected().await;
        let before = controller.state();
        assert_eq!(before.last_color, "white");

        adapter.telemetry_sink().deliver(Ok(b"red".to_vec()));
        controller.process_pending_events();

        let after = controller.state();
        assert_eq!(after.last_color, "red");
        assert_eq!(
            count(&after.log, LogLevel::Info),
            count(&before.log, LogLevel::Info) + 1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_error_keeps_color() {
        let (mut controller, adapter) = connected().await;
        let sink = adapter.telemetry_sink();
        sink.deliver(Ok(b"red".to_vec()));
        controller.process_pending_events();

        sink.deliver(Err(BleError::Telemetry("notification dropped".into())));
        sink.deliver(Ok(vec![0xc3, 0x28]));
        controller.process_pending_events();

        let state = controller.state();
        assert_eq!(state.last_color, "red");
        assert_eq!(count(&state.log, LogLevel::Error), 2);
        assert_eq!(state.phase, SessionPhase::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_telemetry_after_disconnect_is_ignored() {
        let (mut controller, adapter) = connected().await;
        let sink = adapter.telemetry_sink();
        controller.disconnect().await;
        let log_len = controller.state().log.len();

        sink.deliver(Ok(b"blue".to_vec()));
        controller.process_pending_events();

        let state = controller.state();
        assert_eq!(state.last_color, "white");
        assert_eq!(state.log.len(), log_len);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_twice_is_safe() {
        let (mut controller, adapter) = connected().await;

        controller.disconnect().await;
        let state = controller.state();
        assert_eq!(state.session, None);
        assert_eq!(state.phase, SessionPhase::Idle);
        let log_len = state.log.len();

        controller.disconnect().await;
        assert_eq!(controller.state().log.len(), log_len);
        assert_eq!(adapter.with(|s| s.close_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_controller_refuses_scan_and_select() {
        let (mut controller, adapter) = connected().await;

        controller.start_scan().await;
        controller.select_device(&DeviceId::new("B")).await;

        assert_eq!(controller.phase(), SessionPhase::Connected);
        assert_eq!(adapter.with(|s| s.start_scan_calls), 1);
        assert_eq!(adapter.with(|s| s.connect_calls.len()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_releases_adapter_once() {
        let (mut controller, adapter) = controller();
        controller.teardown().await;
        controller.teardown().await;
        assert_eq!(adapter.with(|s| s.destroy_calls), 1);

        drop(controller);
        assert_eq!(adapter.with(|s| s.destroy_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_closes_live_session() {
        let (mut controller, adapter) = connected().await;
        controller.teardown().await;

        assert_eq!(adapter.with(|s| s.close_calls), 1);
        assert_eq!(adapter.with(|s| s.destroy_calls), 1);
        assert_eq!(controller.state().session, None);

        controller.dispatch(ControllerCommand::StartScan).await;
        assert_eq!(adapter.with(|s| s.start_scan_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_adapter() {
        let (mut controller, adapter) = controller();
        controller.start_scan().await;
        drop(controller);

        assert_eq!(adapter.with(|s| s.destroy_calls), 1);
        assert!(adapter.with(|s| s.stop_scan_calls) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_blocks_scan() {
        let adapter = MockAdapter::new();
        let mut controller = SessionController::new(
            adapter.clone(),
            MockPermissions::denied(),
            SessionConfig::default(),
        );

        controller.start_scan().await;

        let state = controller.state();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.alert, Some(Alert::PermissionDenied));
        assert_eq!(adapter.with(|s| s.start_scan_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_reports_disabled_adapter() {
        let (mut controller, adapter) = controller();
        adapter.with(|s| s.enabled = false);

        controller.initialize().await;

        let state = controller.state();
        assert_eq!(state.alert, Some(Alert::AdapterDisabled));
        assert_eq!(count(&state.log, LogLevel::Error), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_applies_retention() {
        let (mut controller, _adapter) = controller();
        for _ in 0..5 {
            controller.stop_scan();
            controller.start_scan().await;
        }
        controller.update_config(SessionConfig {
            log_retention: 2,
            ..SessionConfig::default()
        });
        assert_eq!(controller.state().log.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_and_tears_down() {
        let (controller, adapter) = controller();
        let mut state_rx = controller.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ControllerCommand::StartScan).unwrap();
        tx.send(ControllerCommand::StopScan).unwrap();
        tx.send(ControllerCommand::Shutdown).unwrap();
        controller.run(rx).await;

        assert!(state_rx.has_changed().unwrap_or(true));
        let state = state_rx.borrow_and_update().clone();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state
            .log
            .iter()
            .any(|e| e.message.starts_with("Scanning for devices")));
        assert_eq!(adapter.with(|s| s.destroy_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_slow_connect() {
        let (controller, adapter) = controller();
        adapter.with(|s| s.connect_delay = Some(Duration::from_secs(3600)));
        let (tx, rx) = mpsc::unbounded_channel();
        let started = Instant::now();

        tx.send(ControllerCommand::SelectDevice(DeviceId::new("A")))
            .unwrap();
        tx.send(ControllerCommand::StopScan).unwrap();
        tx.send(ControllerCommand::Shutdown).unwrap();
        controller.run(rx).await;

        assert!(started.elapsed() < Duration::from_secs(3600));
        assert_eq!(adapter.with(|s| s.connect_calls.clone()), vec![DeviceId::new("A")]);
        assert!(adapter.with(|s| s.subscriptions.is_empty()));
        assert_eq!(adapter.with(|s| s.destroy_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_during_dispatch_keep_order() {
        let (controller, adapter) = controller();
        let mut state_rx = controller.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(ControllerCommand::StartScan).unwrap();
        tx.send(ControllerCommand::StopScan).unwrap();
        tx.send(ControllerCommand::StartScan).unwrap();
        drop(tx);
        controller.run(rx).await;

        assert_eq!(adapter.with(|s| s.start_scan_calls), 2);
        let state = state_rx.borrow_and_update().clone();
        let scans = state
            .log
            .iter()
            .filter(|e| e.message.starts_with("Scanning for devices"))
            .count();
        assert_eq!(scans, 2);
        assert!(state.log.iter().any(|e| e.message.starts_with("Scan stopped")));
        assert_eq!(adapter.with(|s| s.destroy_calls), 1);
    }

    #[test]
    fn test_matches_name_filter() {
        let hc05 = device("1", Some("HC-05"));
        assert!(matches_name_filter(&hc05, None));
        assert!(matches_name_filter(&hc05, Some("hc-05")));
        assert!(!matches_name_filter(&hc05, Some("Arduino")));
        assert!(!matches_name_filter(&device("2", None), Some("HC")));
        assert!(matches_name_filter(&device("2", None), None));
    }
}
