//! Provisioning service: the hexagonal core.
//!
//! [`ProvisioningService`] owns the mode, the credential store, the
//! process runner and the armed intake.  It is driven by one thread (see
//! [`ProvisioningService::run`]) so every transition is serialized.
//!
//! ```text
//!  Mailbox ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!              │   ProvisioningService     │
//!  Store  ◀───▶│  mode · flags · tickets   │──▶ ProcessRunner
//!              └──────────────────────────┘
//! ```
//!
//! Submission is split in two phases.  `submit` persists and enters
//! `Transitioning`; `apply` runs the side-effect sequence once the intake
//! has flushed its response.  Sequence order:
//! disarm → DisableBroadcast → ApplyClientConfig → LaunchDisplay.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::credentials::Credentials;
use crate::error::ProvisionError;
use crate::events::Mailbox;
use crate::fsm::context::{FailureReport, ModeSnapshot, PendingApply, ProvisioningContext};
use crate::fsm::{BroadcastChannel, ProvisioningMode};

use super::commands::{AppCommand, ResetOutcome, SubmitOutcome};
use super::events::AppEvent;
use super::ports::{
    Action, ActionOutput, ConnectivityPort, CredentialIntake, CredentialStore, EventSink,
    ProcessRunner,
};

/// Tunables the core needs from [`DaemonConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub action_timeout: Duration,
    pub fail_max: u32,
}

impl From<&DaemonConfig> for ServiceSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            action_timeout: config.action_timeout(),
            fail_max: config.fail_max,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

// ───────────────────────────────────────────────────────────────
// ProvisioningService
// ───────────────────────────────────────────────────────────────

pub struct ProvisioningService<S, R> {
    ctx: ProvisioningContext,
    store: S,
    runner: R,
    intake: Box<dyn CredentialIntake>,
    settings: ServiceSettings,
}

impl<S: CredentialStore, R: ProcessRunner> ProvisioningService<S, R> {
    /// Construct the service and choose the intake: AP when offered, else BLE.
    ///
    /// Does **not** touch the store or run any action; call [`boot`] next.
    ///
    /// [`boot`]: Self::boot
    pub fn new(
        store: S,
        runner: R,
        intakes: Vec<Box<dyn CredentialIntake>>,
        settings: ServiceSettings,
    ) -> Result<Self, ProvisionError> {
        let channel = BroadcastChannel::preferred(intakes.iter().map(|i| i.channel()))
            .ok_or(ProvisionError::NoIntake)?;
        let intake = intakes
            .into_iter()
            .find(|i| i.channel() == channel)
            .ok_or(ProvisionError::NoIntake)?;
        info!("Prov: {} intake selected", channel);

        Ok(Self {
            ctx: ProvisioningContext::new(channel),
            store,
            runner,
            intake,
            settings,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Derive the initial mode from the credential store.
    pub fn boot(&mut self, sink: &mut impl EventSink) -> ProvisioningMode {
        if self.store.exists_valid() {
            info!("Prov: valid credentials found, booting provisioned");
            self.ctx.client_active = true;
            self.ctx.mode = ProvisioningMode::Provisioned;
        } else {
            info!("Prov: no valid credentials, entering setup mode");
            self.arm_intake(sink);
            self.ctx.mode = ProvisioningMode::Unprovisioned {
                channel: self.channel(),
            };
        }
        self.check_exclusive();
        sink.emit(&AppEvent::Started(self.ctx.mode));
        self.ctx.mode
    }

    /// Serve the mailbox until [`AppCommand::Shutdown`].
    ///
    /// The snapshot is republished after every command.
    pub fn run(
        &mut self,
        mailbox: &Mailbox,
        probe: &mut impl ConnectivityPort,
        sink: &mut impl EventSink,
    ) {
        mailbox.publish(self.snapshot());
        loop {
            let (command, reply) = mailbox.recv().into_parts();
            match command {
                AppCommand::Submit {
                    credentials,
                    source,
                } => reply.submitted(self.submit(credentials, source, sink)),
                AppCommand::Apply { ticket } => self.apply(ticket, sink),
                AppCommand::Reset => reply.reset(self.reset(sink)),
                AppCommand::HealthCheck => self.health_check(probe, sink),
                AppCommand::Shutdown => {
                    info!("Prov: actor stopping in {}", self.ctx.mode);
                    break;
                }
            }
            mailbox.publish(self.snapshot());
        }
    }

    // ── Submission ────────────────────────────────────────────

    /// Accept phase.  At most one submission wins per provisioning cycle.
    pub fn submit(
        &mut self,
        credentials: Credentials,
        source: BroadcastChannel,
        sink: &mut impl EventSink,
    ) -> Result<SubmitOutcome, ProvisionError> {
        let mode = self.ctx.mode;
        if !mode.accepts_submissions() {
            info!("Prov: {} submission ignored in {}", source, mode);
            sink.emit(&AppEvent::SubmissionIgnored(mode));
            return Ok(SubmitOutcome::Ignored { mode });
        }

        if let Err(e) = self.store.save(&credentials) {
            error!("Prov: could not persist credentials: {}", e);
            sink.emit(&AppEvent::ActionFailed {
                action: "save-credentials",
                reason: e.to_string(),
            });
            return Err(e.into());
        }
        sink.emit(&AppEvent::CredentialsSaved {
            network_id: credentials.network_id().to_string(),
        });

        let ticket = self.ctx.issue_ticket();
        self.ctx.pending = Some(PendingApply {
            ticket,
            credentials,
        });
        self.ctx.last_failure = None;
        self.set_mode(ProvisioningMode::Transitioning, sink);
        Ok(SubmitOutcome::Accepted { ticket })
    }

    /// Apply phase.  A ticket that no longer matches is ignored.
    pub fn apply(&mut self, ticket: u64, sink: &mut impl EventSink) {
        let Some(credentials) = self.ctx.take_pending(ticket) else {
            debug!("Prov: stale apply ticket {}", ticket);
            return;
        };
        if self.ctx.mode != ProvisioningMode::Transitioning {
            warn!("Prov: apply ticket {} outside Transitioning", ticket);
            return;
        }

        match self.client_sequence(credentials, sink) {
            Ok(()) => self.set_mode(ProvisioningMode::Provisioned, sink),
            Err(e) => {
                error!("Prov: sequence aborted, reset required: {}", e);
                self.record_failure(e, sink);
            }
        }
    }

    fn client_sequence(
        &mut self,
        credentials: Credentials,
        sink: &mut impl EventSink,
    ) -> Result<(), ProvisionError> {
        self.disarm_intake(sink);

        self.run_action(Action::DisableBroadcast)?;
        self.ctx.broadcast_active = false;

        // Flag first: a failed apply may have half-configured the client.
        self.ctx.client_active = true;
        self.check_exclusive();
        self.run_action(Action::ApplyClientConfig(credentials))?;

        self.run_action(Action::LaunchDisplay)?;
        self.ctx.display_launched = true;
        Ok(())
    }

    // ── Reset ─────────────────────────────────────────────────

    /// Delete the record, tear down the client side, re-arm the intake.
    /// Every step is best-effort.
    pub fn reset(&mut self, sink: &mut impl EventSink) -> ResetOutcome {
        info!("Prov: reset requested in {}", self.ctx.mode);
        self.ctx.pending = None;
        self.ctx.last_failure = None;
        self.ctx.online = None;
        self.ctx.offline_streak = 0;

        let record_deleted = match self.store.delete() {
            Ok(()) => true,
            Err(e) => {
                warn!("Prov: could not delete credentials: {}", e);
                sink.emit(&AppEvent::ActionFailed {
                    action: "delete-credentials",
                    reason: e.to_string(),
                });
                false
            }
        };

        if self.ctx.display_launched {
            if let Err(e) = self.run_action(Action::StopDisplay) {
                self.record_failure(e, sink);
            }
            self.ctx.display_launched = false;
        }
        if self.ctx.client_active {
            if let Err(e) = self.run_action(Action::DisableClient) {
                self.record_failure(e, sink);
            }
            self.ctx.client_active = false;
        }

        self.arm_intake(sink);
        let mode = ProvisioningMode::Unprovisioned {
            channel: self.channel(),
        };
        self.set_mode(mode, sink);
        sink.emit(&AppEvent::ResetCompleted { record_deleted });
        ResetOutcome {
            record_deleted,
            mode,
        }
    }

    // ── Display watchdog ──────────────────────────────────────

    /// Probe connectivity while provisioned; relaunch or reconnect as needed.
    pub fn health_check(&mut self, probe: &mut impl ConnectivityPort, sink: &mut impl EventSink) {
        if self.ctx.mode != ProvisioningMode::Provisioned {
            return;
        }

        let online = probe.is_online();
        if self.ctx.online != Some(online) {
            sink.emit(&AppEvent::ConnectivityChanged { online });
        }
        self.ctx.online = Some(online);

        if online {
            self.ctx.offline_streak = 0;
            if !self.ctx.display_launched {
                match self.run_action(Action::LaunchDisplay) {
                    Ok(_) => self.ctx.display_launched = true,
                    Err(e) => self.record_failure(e, sink),
                }
            }
            return;
        }

        self.ctx.offline_streak += 1;
        warn!(
            "Prov: offline ({}/{})",
            self.ctx.offline_streak, self.settings.fail_max
        );
        if self.ctx.offline_streak >= self.settings.fail_max {
            self.ctx.offline_streak = 0;
            if let Err(e) = self.run_action(Action::ReconnectClient) {
                self.record_failure(e, sink);
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> ProvisioningMode {
        self.ctx.mode
    }

    pub fn context(&self) -> &ProvisioningContext {
        &self.ctx
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.ctx.snapshot()
    }

    pub fn intake(&self) -> &dyn CredentialIntake {
        self.intake.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    // ── Internals ─────────────────────────────────────────────

    fn channel(&self) -> BroadcastChannel {
        self.intake.channel()
    }

    fn arm_intake(&mut self, sink: &mut impl EventSink) {
        let channel = self.channel();
        if self.ctx.broadcast_active {
            debug!("Prov: {} broadcast already up", channel);
        } else {
            match self.run_action(Action::EnableBroadcast(channel)) {
                Ok(_) => self.ctx.broadcast_active = true,
                Err(e) => {
                    error!("Prov: {} broadcast failed to start: {}", channel, e);
                    self.record_failure(e, sink);
                }
            }
        }
        self.check_exclusive();
        self.intake.arm();
        sink.emit(&AppEvent::IntakeArmed(channel));
    }

    fn disarm_intake(&mut self, sink: &mut impl EventSink) {
        self.intake.disarm();
        sink.emit(&AppEvent::IntakeDisarmed(self.channel()));
    }

    fn run_action(&mut self, action: Action) -> Result<ActionOutput, ProvisionError> {
        let name = action.name();
        info!("Prov: running {}", name);
        match self.runner.execute(&action, self.settings.action_timeout) {
            Ok(output) => {
                debug!("Prov: {} ok (exit {})", name, output.exit_code);
                Ok(output)
            }
            Err(error) => Err(ProvisionError::Process {
                action: name,
                error,
            }),
        }
    }

    fn record_failure(&mut self, e: ProvisionError, sink: &mut impl EventSink) {
        let action = match &e {
            ProvisionError::Process { action, .. } => *action,
            _ => "provisioning",
        };
        let reason = match &e {
            ProvisionError::Process { error, .. } => error.to_string(),
            other => other.to_string(),
        };
        sink.emit(&AppEvent::ActionFailed {
            action,
            reason: reason.clone(),
        });
        self.ctx.last_failure = Some(FailureReport { action, reason });
    }

    fn set_mode(&mut self, to: ProvisioningMode, sink: &mut impl EventSink) {
        let from = self.ctx.mode;
        self.ctx.mode = to;
        self.check_exclusive();
        if from != to {
            sink.emit(&AppEvent::ModeChanged { from, to });
        }
    }

    fn check_exclusive(&self) {
        if !self.ctx.personalities_exclusive() {
            error!(
                "Prov: broadcast and client both active in {}",
                self.ctx.mode
            );
        }
    }
}
