//! Device identity derived from the board serial number.
//!
//! Produces a stable device ID in the form `PX<serial>` (prefix is
//! configurable).  This ID is:
//! - Deterministic across reboots (read from the device tree)
//! - Used as the access point / BLE advertising name
//! - Served by the BLE serial characteristic
//! - Substituted for `{serial}` in the kiosk URL

use std::path::Path;

use log::warn;

/// Fixed-size device ID string.  Raspberry Pi serials are 16 hex digits.
pub type DeviceIdString = heapless::String<32>;

const UNKNOWN: &str = "unknown";

/// Build the device ID from the raw contents of the serial file.
///
/// NUL terminators and whitespace are stripped.  An empty serial, or one
/// that does not fit, falls back to `<prefix>unknown`.
pub fn device_id(prefix: &str, raw: &[u8]) -> DeviceIdString {
    let serial = String::from_utf8_lossy(raw);
    let serial = serial.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    let mut id = DeviceIdString::new();
    if !serial.is_empty() && id.push_str(prefix).is_ok() && id.push_str(serial).is_ok() {
        return id;
    }

    id.clear();
    if id.push_str(prefix).is_err() || id.push_str(UNKNOWN).is_err() {
        id.clear();
        let _ = id.push_str(UNKNOWN);
    }
    id
}

/// Read the serial file and derive the device ID.
pub fn read_device_id(path: &Path, prefix: &str) -> DeviceIdString {
    match std::fs::read(path) {
        Ok(raw) => device_id(prefix, &raw),
        Err(e) => {
            warn!("Identity: cannot read {}: {}", path.display(), e);
            device_id(prefix, &[])
        }
    }
}
