use std::fmt;

use crate::domain::session::SessionConfig;

/// Opaque, adapter-assigned device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub display_name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: DeviceId::new(id),
            display_name: display_name.filter(|name| !name.is_empty()),
        }
    }

    /// Name if the device advertised one, otherwise its id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "IDLE",
            SessionPhase::Scanning => "SCANNING",
            SessionPhase::Connecting => "CONNECTING...",
            SessionPhase::Connected => "CONNECTED",
            SessionPhase::Disconnecting => "DISCONNECTING...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub sequence: u64,
}

/// Blocking notice the user has to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    PermissionDenied,
    AdapterDisabled,
    NoDeviceConnected,
}

impl Alert {
    pub fn message(&self) -> &'static str {
        match self {
            Alert::PermissionDenied => "Permissions are required to use Bluetooth",
            Alert::AdapterDisabled => "Bluetooth is not enabled",
            Alert::NoDeviceConnected => "No device connected",
        }
    }
}

/// Output state requested from the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCommand {
    On,
    Off,
}

impl OutputCommand {
    /// Single ASCII character understood by the board firmware.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::On => b"1",
            Self::Off => b"0",
        }
    }
}

pub const DEFAULT_COLOR: &str = "white";

/// Observable controller state, published to the presentation layer after
/// every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub phase: SessionPhase,
    pub devices: Vec<DiscoveredDevice>,
    pub session: Option<DiscoveredDevice>,
    pub scanning: bool,
    pub last_color: String,
    pub log: Vec<LogEntry>,
    pub alert: Option<Alert>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            devices: Vec::new(),
            session: None,
            scanning: false,
            last_color: DEFAULT_COLOR.to_string(),
            log: Vec::new(),
            alert: None,
        }
    }
}

impl ControllerState {
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

/// Requests sent from the UI to the session controller.
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    StartScan,
    StopScan,
    SelectDevice(DeviceId),
    Send(OutputCommand),
    Disconnect,
    DismissAlert,
    UpdateConfig(SessionConfig),
    Shutdown,
}
