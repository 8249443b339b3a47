//! Inbound commands to the provisioning service.
//!
//! These represent requests from the outside world (HTTP portal, BLE
//! bridge, health ticker) that the
//! [`ProvisioningService`](super::service::ProvisioningService) interprets
//! and acts upon.  They travel through the mailbox in
//! [`crate::events`].

use crate::credentials::Credentials;
use crate::fsm::{BroadcastChannel, ProvisioningMode};

/// Commands that producers can send into the provisioning core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Accept phase: validate, persist, enter `Transitioning`.
    Submit {
        credentials: Credentials,
        source: BroadcastChannel,
    },

    /// Apply phase, sent by the intake once its response is flushed.
    Apply { ticket: u64 },

    /// Forget the credentials and go back to broadcasting.
    Reset,

    /// Periodic connectivity / display check.
    HealthCheck,

    /// Stop the actor loop.
    Shutdown,
}

/// Reply to [`AppCommand::Submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Credentials saved; enqueue `Apply { ticket }` after responding.
    Accepted { ticket: u64 },
    /// Another submission already won; nothing was saved.
    Ignored { mode: ProvisioningMode },
}

/// Reply to [`AppCommand::Reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    /// The stored record is gone.
    pub record_deleted: bool,
    /// Mode after the reset.
    pub mode: ProvisioningMode,
}
