//! Error taxonomy for the device session.
//!
//! Every variant is caught by the session controller where it is produced and
//! turned into a log entry; none of them escapes the controller.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    /// The platform refused one of the requested Bluetooth capabilities.
    #[error("Bluetooth permissions were not granted")]
    PermissionDenied,

    /// The radio is off or no adapter is present.
    #[error("Bluetooth is not enabled")]
    AdapterDisabled,

    #[error("scan failed: {0}")]
    Scan(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl BleError {
    /// Alert that has to be shown on top of the log entry, if any.
    pub fn alert(&self) -> Option<crate::domain::models::Alert> {
        use crate::domain::models::Alert;
        match self {
            Self::PermissionDenied => Some(Alert::PermissionDenied),
            Self::AdapterDisabled => Some(Alert::AdapterDisabled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Alert;

    #[test]
    fn test_only_platform_errors_raise_alerts() {
        assert_eq!(BleError::PermissionDenied.alert(), Some(Alert::PermissionDenied));
        assert_eq!(BleError::AdapterDisabled.alert(), Some(Alert::AdapterDisabled));
        assert_eq!(BleError::Write("gone".into()).alert(), None);
    }

    #[test]
    fn test_display_includes_cause() {
        let err = BleError::Connection("device unreachable".into());
        assert_eq!(err.to_string(), "connection failed: device unreachable");
    }
}
