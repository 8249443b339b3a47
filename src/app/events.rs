//! Outbound application events.
//!
//! The [`ProvisioningService`](super::service::ProvisioningService) emits
//! these through the [`EventSink`](super::ports::EventSink) port.

use crate::fsm::{BroadcastChannel, ProvisioningMode};

/// Structured events emitted by the provisioning core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The service booted into its initial mode.
    Started(ProvisioningMode),

    /// The mode changed.
    ModeChanged {
        from: ProvisioningMode,
        to: ProvisioningMode,
    },

    /// An intake gate opened.
    IntakeArmed(BroadcastChannel),

    /// An intake gate closed.
    IntakeDisarmed(BroadcastChannel),

    /// Credentials were written to the store.
    CredentialsSaved { network_id: String },

    /// A submission arrived after another one had already won.
    SubmissionIgnored(ProvisioningMode),

    /// An external action or store operation failed.
    ActionFailed {
        action: &'static str,
        reason: String,
    },

    /// The connectivity probe changed its answer.
    ConnectivityChanged { online: bool },

    /// A reset finished; the credential record is gone if `record_deleted`.
    ResetCompleted { record_deleted: bool },
}
