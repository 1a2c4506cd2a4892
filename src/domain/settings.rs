use crate::domain::log::DEFAULT_RETENTION;
use crate::domain::session::SessionConfig;
use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `ble_led_remote=debug`.
    pub level: String,
    pub console: bool,
    /// Rolling file output under `dir`. Never colored.
    pub file: bool,
    pub dir: PathBuf,
    pub rotation: LogRotation,
    pub source_locations: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: true,
            dir: PathBuf::from("logs"),
            rotation: LogRotation::Daily,
            source_locations: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // Scanning
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Only list devices whose advertised name contains this text.
    #[serde(default)]
    pub device_name_filter: Option<String>,

    // Channels
    #[serde(default = "default_telemetry_service")]
    pub telemetry_service_uuid: Uuid,
    #[serde(default = "default_telemetry_char")]
    pub telemetry_char_uuid: Uuid,
    #[serde(default = "default_control_service")]
    pub control_service_uuid: Uuid,
    #[serde(default = "default_control_char")]
    pub control_char_uuid: Uuid,

    // Event log panel, 0 = unbounded
    #[serde(default = "default_log_retention")]
    pub log_retention: usize,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_timeout_secs: default_scan_timeout_secs(),
            device_name_filter: None,
            telemetry_service_uuid: default_telemetry_service(),
            telemetry_char_uuid: default_telemetry_char(),
            control_service_uuid: default_control_service(),
            control_char_uuid: default_control_char(),
            log_retention: default_log_retention(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            scan_timeout: Duration::from_secs(self.scan_timeout_secs.max(1)),
            name_filter: self
                .device_name_filter
                .as_ref()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            telemetry_service: self.telemetry_service_uuid,
            telemetry_channel: self.telemetry_char_uuid,
            control_service: self.control_service_uuid,
            control_channel: self.control_char_uuid,
            log_retention: self.log_retention,
        }
    }
}

fn default_scan_timeout_secs() -> u64 {
    10
}
fn default_telemetry_service() -> Uuid {
    protocol::TELEMETRY_SERVICE_UUID
}
fn default_telemetry_char() -> Uuid {
    protocol::TELEMETRY_CHAR_UUID
}
fn default_control_service() -> Uuid {
    protocol::CONTROL_SERVICE_UUID
}
fn default_control_char() -> Uuid {
    protocol::CONTROL_CHAR_UUID
}
fn default_log_retention() -> usize {
    DEFAULT_RETENTION
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults if it is missing
    /// or unreadable.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({}): {:#}", settings_path.display(), e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleLedRemote");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
