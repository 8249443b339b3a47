//! Mutable provisioning context owned by the orchestrator.
//!
//! `ProvisioningContext` holds the current mode together with the two
//! network-personality flags whose mutual exclusion is the core safety
//! property of the daemon.  Only the actor thread touches it; everyone
//! else sees a [`ModeSnapshot`] copy.

use serde::Serialize;

use super::{BroadcastChannel, ProvisioningMode};
use crate::credentials::Credentials;

// ---------------------------------------------------------------------------
// Failure record
// ---------------------------------------------------------------------------

/// The last action that aborted a provisioning cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// External action name, e.g. `apply-client-config`.
    pub action: &'static str,
    /// Human-readable reason.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Pending apply
// ---------------------------------------------------------------------------

/// Credentials accepted in the first phase, waiting for their apply ticket.
#[derive(Debug, Clone)]
pub struct PendingApply {
    pub ticket: u64,
    pub credentials: Credentials,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    pub mode: ProvisioningMode,
    /// An intake broadcast (AP or BLE advertising) is up.
    pub broadcast_active: bool,
    /// The client network is (or may be) configured.
    pub client_active: bool,
    /// `LaunchDisplay` succeeded in this process.
    pub display_launched: bool,
    pub pending: Option<PendingApply>,
    pub next_ticket: u64,
    pub last_failure: Option<FailureReport>,
    /// Result of the most recent connectivity probe, if any.
    pub online: Option<bool>,
    /// Consecutive failed probes since the last success or reconnect.
    pub offline_streak: u32,
}

impl ProvisioningContext {
    pub fn new(channel: BroadcastChannel) -> Self {
        Self {
            mode: ProvisioningMode::Unprovisioned { channel },
            broadcast_active: false,
            client_active: false,
            display_launched: false,
            pending: None,
            next_ticket: 1,
            last_failure: None,
            online: None,
            offline_streak: 0,
        }
    }

    /// At most one network personality is active.
    pub fn personalities_exclusive(&self) -> bool {
        !(self.broadcast_active && self.client_active)
    }

    /// Hand out a fresh apply ticket.
    pub fn issue_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        ticket
    }

    /// Take the pending credentials if `ticket` is the current one.
    pub fn take_pending(&mut self, ticket: u64) -> Option<Credentials> {
        match &self.pending {
            Some(p) if p.ticket == ticket => self.pending.take().map(|p| p.credentials),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        ModeSnapshot {
            mode: self.mode,
            broadcast_active: self.broadcast_active,
            client_active: self.client_active,
            display_launched: self.display_launched,
            last_failure: self.last_failure.clone(),
            online: self.online,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only copy published after every event, served by `/api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeSnapshot {
    #[serde(flatten)]
    pub mode: ProvisioningMode,
    pub broadcast_active: bool,
    pub client_active: bool,
    pub display_launched: bool,
    pub last_failure: Option<FailureReport>,
    pub online: Option<bool>,
}

impl ModeSnapshot {
    /// Snapshot used before the orchestrator has booted.
    pub fn initial(channel: BroadcastChannel) -> Self {
        ProvisioningContext::new(channel).snapshot()
    }
}
