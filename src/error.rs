//! Error types for the provisioning daemon.
//!
//! One enum per boundary, all funnelling into [`ProvisionError`] so the
//! intakes can map any failure of the submission path onto a single
//! HTTP status or ATT error code.

use core::fmt;
use std::io;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level provisioning error
// ---------------------------------------------------------------------------

/// Every failure an intake can observe while talking to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// A submitted field was empty or whitespace-only.
    Validation(ValidationError),
    /// The credential record could not be written or removed.
    Persistence(StoreError),
    /// An external action failed, timed out or could not be spawned.
    Process {
        action: &'static str,
        error: ProcessError,
    },
    /// The orchestrator mailbox is full; the producer should retry later.
    QueueFull,
    /// No intake variant is available for the configured channels.
    NoIntake,
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Persistence(e) => write!(f, "persistence: {e}"),
            Self::Process { action, error } => write!(f, "{action}: {error}"),
            Self::QueueFull => write!(f, "provisioning queue is full"),
            Self::NoIntake => write!(f, "no credential intake available"),
        }
    }
}

impl std::error::Error for ProvisionError {}

impl From<ValidationError> for ProvisionError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StoreError> for ProvisionError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `ssid` missing, empty, or whitespace-only.
    EmptyNetworkId,
    /// `password` missing, empty, or whitespace-only.
    EmptySecret,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNetworkId => write!(f, "network name is required"),
            Self::EmptySecret => write!(f, "password is required"),
        }
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Credential store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Filesystem operation failed.
    Io {
        op: &'static str,
        kind: io::ErrorKind,
    },
    /// The record could not be serialised.
    Encode(String),
}

impl StoreError {
    pub(crate) fn io(op: &'static str, err: &io::Error) -> Self {
        Self::Io {
            op,
            kind: err.kind(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { op, kind } => write!(f, "{op} failed: {kind}"),
            Self::Encode(msg) => write!(f, "encode failed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// External action errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// No command is configured for the action.
    NotConfigured,
    /// The command could not be started.
    Spawn(io::ErrorKind),
    /// The command ran and exited unsuccessfully (`None` = killed by signal).
    Exit { code: Option<i32>, stderr: String },
    /// The command outlived the action timeout and was killed.
    Timeout { after: Duration },
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "no command configured"),
            Self::Spawn(kind) => write!(f, "spawn failed: {kind}"),
            Self::Exit {
                code: Some(code),
                stderr,
            } if !stderr.is_empty() => write!(f, "exited with status {code}: {stderr}"),
            Self::Exit { code: Some(code), .. } => write!(f, "exited with status {code}"),
            Self::Exit { code: None, .. } => write!(f, "terminated by signal"),
            Self::Timeout { after } => write!(f, "timed out after {after:?}"),
        }
    }
}

impl std::error::Error for ProcessError {}

// ---------------------------------------------------------------------------
// BLE payload errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Characteristic value was not valid UTF-8.
    InvalidUtf8,
    /// Value did not parse as `{"ssid": ..., "password": ...}`.
    Malformed(String),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "payload is not UTF-8"),
            Self::Malformed(msg) => write!(f, "malformed payload: {msg}"),
        }
    }
}

impl std::error::Error for PayloadError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    Io(io::Error),
    /// The config file is not valid JSON for [`DaemonConfig`](crate::config::DaemonConfig).
    Parse(serde_json::Error),
    /// A field failed validation; the message names the field.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config read failed: {e}"),
            Self::Parse(e) => write!(f, "config parse failed: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
