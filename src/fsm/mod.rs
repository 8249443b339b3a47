//! Provisioning mode machine.
//!
//! ```text
//!            boot, no valid record                 boot, valid record
//!                     │                                    │
//!                     ▼                                    ▼
//!   ┌──────────────────────────────┐  submit  ┌───────────────┐  apply ok  ┌─────────────┐
//!   │ Unprovisioned { AP | BLE }   │─────────▶│ Transitioning │───────────▶│ Provisioned │
//!   └──────────────────────────────┘          └───────────────┘            └─────────────┘
//!                  ▲                                  │ apply failed: stays        │
//!                  └──────────────── reset ───────────┴────────────────────────────┘
//! ```
//!
//! The mode itself is plain data; the side effects that accompany each
//! edge live in [`ProvisioningService`](crate::app::service::ProvisioningService).
//! The mode is never persisted.  It is re-derived from the credential
//! store on every start.

pub mod context;

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Broadcast channel
// ---------------------------------------------------------------------------

/// The discoverable channel used while unprovisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastChannel {
    /// Self-hosted access point serving the captive portal.
    Ap,
    /// BLE advertisement with the provisioning GATT service.
    Ble,
}

impl BroadcastChannel {
    /// Pick the intake channel: AP when available, else BLE.
    pub fn preferred(available: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut best = None;
        for channel in available {
            match channel {
                Self::Ap => return Some(Self::Ap),
                Self::Ble => best = Some(Self::Ble),
            }
        }
        best
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ap => "ap",
            Self::Ble => "ble",
        }
    }
}

impl fmt::Display for BroadcastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ap => "AP",
            Self::Ble => "BLE",
        })
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Process-wide provisioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProvisioningMode {
    /// Broadcasting on `channel`, no client network.
    Unprovisioned { channel: BroadcastChannel },
    /// Credentials accepted; the side-effect sequence is in flight or aborted.
    Transitioning,
    /// Client network active, display launched.
    Provisioned,
}

impl ProvisioningMode {
    /// The `Unprovisioned → Transitioning` guard.
    pub fn accepts_submissions(self) -> bool {
        matches!(self, Self::Unprovisioned { .. })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unprovisioned { .. } => "unprovisioned",
            Self::Transitioning => "transitioning",
            Self::Provisioned => "provisioned",
        }
    }
}

impl fmt::Display for ProvisioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unprovisioned { channel } => write!(f, "Unprovisioned({channel})"),
            Self::Transitioning => f.write_str("Transitioning"),
            Self::Provisioned => f.write_str("Provisioned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
