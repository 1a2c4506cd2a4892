//! Runtime permission checks for Bluetooth access.

#![allow(async_fn_in_trait)]

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Scan,
    Connect,
    Location,
}

/// Every capability the session controller needs before scanning.
pub const REQUIRED_CAPABILITIES: &[Capability] =
    &[Capability::Scan, Capability::Connect, Capability::Location];

pub trait PermissionGate {
    /// Prompts as needed; true only if every capability was granted.
    async fn ensure_granted(&mut self, capabilities: &[Capability]) -> bool;
}

/// Desktop platforms have no runtime permission model; access is governed by
/// the radio state alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopPermissionGate;

impl PermissionGate for DesktopPermissionGate {
    async fn ensure_granted(&mut self, capabilities: &[Capability]) -> bool {
        debug!("No runtime permission model, granting {:?}", capabilities);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_desktop_gate_grants_everything() {
        let mut gate = DesktopPermissionGate;
        assert!(gate.ensure_granted(REQUIRED_CAPABILITIES).await);
    }
}
