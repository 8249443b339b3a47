//! Mailbox between producers and the provisioning actor.
//!
//! Every producer (HTTP portal thread, BLE bridge thread, health ticker)
//! talks to the orchestrator through one bounded queue.  Producers never
//! touch the mode; they read the [`ModeSnapshot`] the actor publishes
//! after each command.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ HTTP portal │────▶│              │     │                    │
//! │ BLE bridge  │────▶│   Mailbox    │────▶│ ProvisioningService│
//! │ Ticker      │────▶│  (bounded)   │     │   (actor thread)   │
//! └─────────────┘     └──────────────┘     └─────────┬──────────┘
//!        ▲                                           │
//!        └──────────── reply Signal / snapshot ◀─────┘
//! ```
//!
//! A full queue is reported back to the producer instead of blocking,
//! except for [`ProvisioningHandle::apply`]: an apply ticket must never be
//! lost, so it waits for room.
//!
//! Health checks are coalesced: at most one sits in the queue at a time, so
//! a slow probe cannot crowd out a reset.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use futures_lite::future::block_on;
use log::warn;

use crate::app::commands::{AppCommand, ResetOutcome, SubmitOutcome};
use crate::credentials::Credentials;
use crate::error::ProvisionError;
use crate::fsm::BroadcastChannel;
use crate::fsm::context::ModeSnapshot;

/// Maximum number of pending commands.
pub const QUEUE_DEPTH: usize = 16;

type SubmitSignal = Signal<CriticalSectionRawMutex, Result<SubmitOutcome, ProvisionError>>;
type ResetSignal = Signal<CriticalSectionRawMutex, ResetOutcome>;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Where the actor sends the answer to a command, if anywhere.
pub enum ReplyTo {
    None,
    Submit(Arc<SubmitSignal>),
    Reset(Arc<ResetSignal>),
}

impl ReplyTo {
    pub fn submitted(self, result: Result<SubmitOutcome, ProvisionError>) {
        if let Self::Submit(signal) = self {
            signal.signal(result);
        }
    }

    pub fn reset(self, outcome: ResetOutcome) {
        if let Self::Reset(signal) = self {
            signal.signal(outcome);
        }
    }
}

/// A command plus its reply slot.  Only built through [`ProvisioningHandle`],
/// which keeps the command and reply kinds paired.
pub struct Envelope {
    command: AppCommand,
    reply: ReplyTo,
}

impl Envelope {
    fn fire_and_forget(command: AppCommand) -> Self {
        Self {
            command,
            reply: ReplyTo::None,
        }
    }

    pub fn into_parts(self) -> (AppCommand, ReplyTo) {
        (self.command, self.reply)
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Queue plus the published snapshot.
pub struct Mailbox {
    queue: Channel<CriticalSectionRawMutex, Envelope, QUEUE_DEPTH>,
    status: Mutex<CriticalSectionRawMutex, RefCell<ModeSnapshot>>,
    /// Set while a `HealthCheck` is queued and not yet received.
    health_pending: AtomicBool,
}

impl Mailbox {
    pub fn new(initial: ModeSnapshot) -> Self {
        Self {
            queue: Channel::new(),
            status: Mutex::new(RefCell::new(initial)),
            health_pending: AtomicBool::new(false),
        }
    }

    fn try_push(&self, envelope: Envelope) -> Result<(), ProvisionError> {
        self.queue.try_send(envelope).map_err(|_| {
            warn!("Mailbox: queue full, rejecting command");
            ProvisionError::QueueFull
        })
    }

    /// Queue a health check unless one is already waiting.
    fn push_health_check(&self) -> Result<(), ProvisionError> {
        if self.health_pending.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.try_push(Envelope::fire_and_forget(AppCommand::HealthCheck))
            .inspect_err(|_| self.health_pending.store(false, Ordering::Release))
    }

    fn received(&self, envelope: Envelope) -> Envelope {
        if matches!(envelope.command, AppCommand::HealthCheck) {
            self.health_pending.store(false, Ordering::Release);
        }
        envelope
    }

    /// Block the actor until a command arrives.
    pub fn recv(&self) -> Envelope {
        self.received(block_on(self.queue.receive()))
    }

    /// Non-blocking receive; `None` when the queue is empty.
    pub fn try_recv(&self) -> Option<Envelope> {
        self.queue.try_receive().ok().map(|e| self.received(e))
    }

    pub fn publish(&self, snapshot: ModeSnapshot) {
        self.status.lock(|s| *s.borrow_mut() = snapshot);
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.status.lock(|s| s.borrow().clone())
    }
}

// ---------------------------------------------------------------------------
// Producer handle
// ---------------------------------------------------------------------------

/// Cloneable producer-side API.
#[derive(Clone)]
pub struct ProvisioningHandle {
    mailbox: Arc<Mailbox>,
}

impl ProvisioningHandle {
    pub fn new(mailbox: Arc<Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Run the accept phase and wait for its outcome.
    pub fn submit(
        &self,
        credentials: Credentials,
        source: BroadcastChannel,
    ) -> Result<SubmitOutcome, ProvisionError> {
        let signal = Arc::new(SubmitSignal::new());
        self.mailbox.try_push(Envelope {
            command: AppCommand::Submit {
                credentials,
                source,
            },
            reply: ReplyTo::Submit(Arc::clone(&signal)),
        })?;
        block_on(signal.wait())
    }

    /// Queue the apply phase.  Waits for room rather than dropping the ticket.
    pub fn apply(&self, ticket: u64) {
        block_on(
            self.mailbox
                .queue
                .send(Envelope::fire_and_forget(AppCommand::Apply { ticket })),
        );
    }

    /// Queue a reset and wait until it has been processed.
    pub fn reset(&self) -> Result<ResetOutcome, ProvisionError> {
        let signal = Arc::new(ResetSignal::new());
        self.mailbox.try_push(Envelope {
            command: AppCommand::Reset,
            reply: ReplyTo::Reset(Arc::clone(&signal)),
        })?;
        Ok(block_on(signal.wait()))
    }

    /// Queue a health check.  A no-op while one is already queued.
    pub fn health_check(&self) -> Result<(), ProvisionError> {
        self.mailbox.push_health_check()
    }

    /// Ask the actor loop to exit.  Waits for room so it is never dropped.
    pub fn shutdown(&self) {
        block_on(
            self.mailbox
                .queue
                .send(Envelope::fire_and_forget(AppCommand::Shutdown)),
        );
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.mailbox.snapshot()
    }
}
