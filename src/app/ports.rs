//! Port traits: the hexagonal boundary between the provisioning core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ProvisioningService (domain)
//! ```
//!
//! Driven adapters (credential file, shell runner, connectivity probe,
//! event sinks) implement these traits.  The
//! [`ProvisioningService`](super::service::ProvisioningService) consumes
//! them via generics, so the core never spawns a process or touches the
//! filesystem itself.
//!
//! ## Security notes
//!
//! - **CredentialStore** implementations MUST replace the record atomically.
//! - **ProcessRunner** implementations MUST NOT put the secret on argv.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::{ProcessError, StoreError};
use crate::fsm::BroadcastChannel;

// ───────────────────────────────────────────────────────────────
// Credential store (driven adapter: domain ↔ disk)
// ───────────────────────────────────────────────────────────────

/// Durable storage for the single credential record.
pub trait CredentialStore {
    /// True iff a record is present and passes the credential rule.
    /// A missing or unparseable record is `false`, never an error.
    fn exists_valid(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    /// The stored record, or `None` when absent or invalid.
    fn load(&self) -> Result<Option<Credentials>, StoreError>;

    /// Replace the record atomically.
    fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Remove the record.  Returns `Ok(())` if it did not exist.
    fn delete(&mut self) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Process runner (driven adapter: domain → OS)
// ───────────────────────────────────────────────────────────────

/// Side-effecting actions the core asks the OS to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    EnableBroadcast(BroadcastChannel),
    DisableBroadcast,
    ApplyClientConfig(Credentials),
    LaunchDisplay,
    StopDisplay,
    DisableClient,
    ReconnectClient,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnableBroadcast(BroadcastChannel::Ap) => "enable-ap-broadcast",
            Self::EnableBroadcast(BroadcastChannel::Ble) => "enable-ble-broadcast",
            Self::DisableBroadcast => "disable-broadcast",
            Self::ApplyClientConfig(_) => "apply-client-config",
            Self::LaunchDisplay => "launch-display",
            Self::StopDisplay => "stop-display",
            Self::DisableClient => "disable-client",
            Self::ReconnectClient => "reconnect-client",
        }
    }
}

/// What a successful action produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Executes named external actions.
///
/// `timeout` is imposed by the core; an implementation MUST give up and
/// clean up once it elapses, returning [`ProcessError::Timeout`].
pub trait ProcessRunner {
    fn execute(&mut self, action: &Action, timeout: Duration)
    -> Result<ActionOutput, ProcessError>;
}

// ───────────────────────────────────────────────────────────────
// Credential intake (driving adapter: user → domain)
// ───────────────────────────────────────────────────────────────

/// A channel through which a user submits credentials.
///
/// The orchestrator arms exactly one intake.  Arming opens the intake's
/// gate; the broadcast itself is brought up by the orchestrator through
/// [`Action::EnableBroadcast`].
pub trait CredentialIntake: Send {
    fn channel(&self) -> BroadcastChannel;

    /// Begin accepting submissions.
    fn arm(&mut self);

    /// Stop accepting submissions.
    fn disarm(&mut self);

    fn is_armed(&self) -> bool;
}

/// Shared open/closed flag between an intake and its server thread.
#[derive(Debug, Clone, Default)]
pub struct IntakeGate(Arc<AtomicBool>);

impl IntakeGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Connectivity port (driven adapter: domain → network)
// ───────────────────────────────────────────────────────────────

/// Answers "can we reach the internet right now?".
pub trait ConnectivityPort {
    fn is_online(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the mailbox)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the scheduler invokes when a schedule fires.
///
/// The daemon implements this by enqueuing a health check; the
/// [`Scheduler`](crate::scheduler::Scheduler) itself knows nothing about
/// the mailbox.
pub trait SchedulerDelegate {
    fn on_schedule_fired(&mut self, label: &str, kind: ScheduleFiredKind);
}

/// Discriminant passed to [`SchedulerDelegate::on_schedule_fired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleFiredKind {
    /// A recurring periodic schedule fired.
    Periodic,
    /// A one-shot schedule fired (auto-disables after).
    OneShot,
}
