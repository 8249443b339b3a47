//! BLE provisioning intake.
//!
//! Implements [`CredentialIntake`] for the BLE channel and the GATT
//! semantics behind it.  The radio side (advertising, the GATT server
//! itself) runs in an external helper started by `enable-ble-broadcast`;
//! characteristic reads and writes reach [`GattService`] through the
//! socket bridge in [`super::ble_transport`].
//!
//! ## GATT Service Layout
//!
//! | Characteristic   | UUID                                    | Perms       |
//! |------------------|-----------------------------------------|-------------|
//! | Service          | `12345678-1234-5678-1234-56789abcdef0`  | Primary     |
//! | WiFi Credentials | `12345678-1234-5678-1234-56789abcdef1`  | Read+Write  |
//! | Device Serial    | `12345678-1234-5678-1234-56789abcdef2`  | Read        |
//!
//! A credentials write carries UTF-8 JSON `{"ssid": "...", "password": "..."}`.
//! Reading the credentials characteristic returns the current mode name.

use core::fmt;

use log::{info, warn};
use uuid::Uuid;

use super::device_id::DeviceIdString;
use crate::app::commands::SubmitOutcome;
use crate::app::ports::{CredentialIntake, IntakeGate};
use crate::credentials::Credentials;
use crate::error::ProvisionError;
use crate::events::ProvisioningHandle;
use crate::fsm::BroadcastChannel;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);
pub const CHAR_WIFI_CREDENTIALS: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);
pub const CHAR_DEVICE_SERIAL: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef2);

/// Largest characteristic value accepted (ATT long-write limit).
pub const MAX_VALUE_LEN: usize = 512;

// ───────────────────────────────────────────────────────────────
// ATT error codes
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttError {
    /// Intake disarmed, submission already accepted, or read-only attribute.
    WriteNotPermitted = 0x03,
    AttributeNotFound = 0x0A,
    /// Value exceeds [`MAX_VALUE_LEN`].
    InvalidAttributeValueLength = 0x0D,
    /// Persistence failure or full mailbox.
    Unlikely = 0x0E,
    /// Empty or whitespace-only field.
    ValueNotAllowed = 0x13,
    /// Payload did not parse.
    Application = 0x80,
}

impl AttError {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteNotPermitted => write!(f, "write not permitted"),
            Self::AttributeNotFound => write!(f, "attribute not found"),
            Self::InvalidAttributeValueLength => write!(f, "invalid attribute value length"),
            Self::Unlikely => write!(f, "unlikely error"),
            Self::ValueNotAllowed => write!(f, "value not allowed"),
            Self::Application => write!(f, "malformed payload"),
        }
    }
}

impl From<&ProvisionError> for AttError {
    fn from(e: &ProvisionError) -> Self {
        match e {
            ProvisionError::Validation(_) => Self::ValueNotAllowed,
            _ => Self::Unlikely,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// UUID text form
// ───────────────────────────────────────────────────────────────

/// Parse a characteristic UUID as sent by the helper, case-insensitive.
pub fn parse_uuid(text: &str) -> Option<Uuid> {
    Uuid::parse_str(text).ok()
}

// ───────────────────────────────────────────────────────────────
// Intake
// ───────────────────────────────────────────────────────────────

/// The BLE variant of [`CredentialIntake`].  Arming opens the gate shared
/// with the [`GattService`].
pub struct BleIntake {
    gate: IntakeGate,
}

impl BleIntake {
    pub fn new(gate: IntakeGate) -> Self {
        Self { gate }
    }
}

impl CredentialIntake for BleIntake {
    fn channel(&self) -> BroadcastChannel {
        BroadcastChannel::Ble
    }

    fn arm(&mut self) {
        info!("BLE: intake armed");
        self.gate.open();
    }

    fn disarm(&mut self) {
        info!("BLE: intake disarmed");
        self.gate.close();
    }

    fn is_armed(&self) -> bool {
        self.gate.is_open()
    }
}

// ───────────────────────────────────────────────────────────────
// GATT service
// ───────────────────────────────────────────────────────────────

/// Characteristic read/write handling for the provisioning service.
pub struct GattService {
    gate: IntakeGate,
    handle: ProvisioningHandle,
    serial: DeviceIdString,
}

impl GattService {
    pub fn new(gate: IntakeGate, handle: ProvisioningHandle, serial: DeviceIdString) -> Self {
        Self {
            gate,
            handle,
            serial,
        }
    }

    /// Handle a characteristic write.
    ///
    /// On success returns the apply ticket, if any.  The caller MUST send
    /// the ATT response first and only then call [`GattService::apply`].
    pub fn on_write(&self, characteristic: Uuid, value: &[u8]) -> Result<Option<u64>, AttError> {
        if characteristic == CHAR_DEVICE_SERIAL {
            return Err(AttError::WriteNotPermitted);
        }
        if characteristic != CHAR_WIFI_CREDENTIALS {
            warn!("BLE: write to unknown characteristic {}", characteristic.hyphenated());
            return Err(AttError::AttributeNotFound);
        }
        if !self.gate.is_open() {
            info!("BLE: write while intake disarmed");
            return Err(AttError::WriteNotPermitted);
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(AttError::InvalidAttributeValueLength);
        }

        let credentials = match Credentials::from_ble_payload(value) {
            Ok(Ok(creds)) => creds,
            Ok(Err(e)) => {
                info!("BLE: rejected credentials: {}", e);
                return Err(AttError::ValueNotAllowed);
            }
            Err(e) => {
                warn!("BLE: {}", e);
                return Err(AttError::Application);
            }
        };

        info!("BLE: credentials received for '{}'", credentials.network_id());
        match self.handle.submit(credentials, BroadcastChannel::Ble) {
            Ok(SubmitOutcome::Accepted { ticket }) => Ok(Some(ticket)),
            Ok(SubmitOutcome::Ignored { mode }) => {
                info!("BLE: submission ignored in {}", mode);
                Err(AttError::WriteNotPermitted)
            }
            Err(e) => {
                warn!("BLE: submission failed: {}", e);
                Err(AttError::from(&e))
            }
        }
    }

    /// Handle a characteristic read.
    pub fn on_read(&self, characteristic: Uuid) -> Result<String, AttError> {
        if characteristic == CHAR_DEVICE_SERIAL {
            Ok(self.serial.as_str().to_string())
        } else if characteristic == CHAR_WIFI_CREDENTIALS {
            Ok(self.handle.snapshot().mode.name().to_string())
        } else {
            Err(AttError::AttributeNotFound)
        }
    }

    /// Queue the apply phase for a ticket returned by [`GattService::on_write`].
    pub fn apply(&self, ticket: u64) {
        self.handle.apply(ticket);
    }
}
