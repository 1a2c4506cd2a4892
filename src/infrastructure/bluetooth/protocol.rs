//! LED Board Protocol
//!
//! Channel identifiers and payload decoding for the LED controller board.

use crate::domain::error::BleError;
use uuid::Uuid;

/// Telemetry service - the board pushes its current color here
pub const TELEMETRY_SERVICE_UUID: Uuid = Uuid::from_u128(0x19b10000_e8f2_537e_4f6c_d104768a1214);

/// Telemetry characteristic - notifications carry the color name
pub const TELEMETRY_CHAR_UUID: Uuid = Uuid::from_u128(0x19b10001_e8f2_537e_4f6c_d104768a1217);

/// Control service (HM-10 / HC-05 style serial bridge)
pub const CONTROL_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// Control characteristic - where output commands are written
pub const CONTROL_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// Decode a telemetry notification into a color name.
///
/// The payload is opaque UTF-8 text; surrounding whitespace and trailing NULs
/// written by the firmware are stripped.
pub fn decode_color(bytes: &[u8]) -> Result<String, BleError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| BleError::Telemetry(format!("payload is not UTF-8: {}", e)))?;
    Ok(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
}

/// Render a 48-bit Bluetooth address as `AA:BB:CC:DD:EE:FF`.
pub fn format_address(address: u64) -> String {
    (0..6)
        .rev()
        .map(|i| format!("{:02X}", (address >> (i * 8)) & 0xff))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse an address in the form produced by [`format_address`] (separators
/// optional).
pub fn parse_address(text: &str) -> anyhow::Result<u64> {
    let hex: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.is_empty() || hex.len() > 12 {
        anyhow::bail!("Invalid Bluetooth address: {}", text);
    }
    Ok(u64::from_str_radix(&hex, 16)?)
}
