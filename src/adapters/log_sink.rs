//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the process logger (journald via stderr in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] as a one-line record.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(mode) => info!("START | mode={}", mode),
            AppEvent::ModeChanged { from, to } => info!("MODE  | {} -> {}", from, to),
            AppEvent::IntakeArmed(channel) => info!("INTAKE| {} armed", channel),
            AppEvent::IntakeDisarmed(channel) => info!("INTAKE| {} disarmed", channel),
            AppEvent::CredentialsSaved { network_id } => {
                info!("CREDS | saved ssid='{}'", network_id);
            }
            AppEvent::SubmissionIgnored(mode) => {
                info!("CREDS | submission ignored in {}", mode);
            }
            AppEvent::ActionFailed { action, reason } => {
                warn!("FAIL  | {} | {}", action, reason);
            }
            AppEvent::ConnectivityChanged { online } => {
                info!("NET   | {}", if *online { "online" } else { "offline" });
            }
            AppEvent::ResetCompleted { record_deleted } => {
                info!("RESET | record_deleted={}", record_deleted);
            }
        }
    }
}
