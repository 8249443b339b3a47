//! BLE bridge transport: GATT operations over a Unix socket.
//!
//! The GATT peripheral helper owns the radio and forwards every
//! characteristic access on the provisioning service to this daemon as
//! newline-delimited JSON:
//!
//! ```text
//! helper → daemon   {"op":"write","characteristic":"<uuid>","value":"<utf-8>"}
//! daemon → helper   {"status":"ok"}  |  {"status":"error","code":<att code>}
//!
//! helper → daemon   {"op":"read","characteristic":"<uuid>"}
//! daemon → helper   {"status":"ok","value":"..."}
//! ```
//!
//! After a write that was accepted, the response line is flushed before
//! the apply ticket is queued.  The ticket is queued even when the flush
//! fails.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::ble::{AttError, GattService, MAX_VALUE_LEN, parse_uuid};
use crate::error::PayloadError;

// ── Constants ────────────────────────────────────────────────

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_POLL: Duration = Duration::from_millis(200);

/// Longest frame accepted: a maximal value, JSON-escaped, plus envelope.
const MAX_FRAME_LEN: usize = MAX_VALUE_LEN * 6 + 256;

// ── Frames ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BridgeRequest {
    Write {
        characteristic: String,
        value: String,
    },
    Read {
        characteristic: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BridgeResponse {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Error {
        code: u8,
    },
}

impl BridgeResponse {
    fn error(e: AttError) -> Self {
        Self::Error { code: e.code() }
    }

    fn encode(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self)
            .unwrap_or_else(|_| br#"{"status":"error","code":14}"#.to_vec());
        line.push(b'\n');
        line
    }
}

/// Parse one frame (without its trailing newline).
pub fn decode_request(line: &[u8]) -> Result<BridgeRequest, PayloadError> {
    let text = core::str::from_utf8(line).map_err(|_| PayloadError::InvalidUtf8)?;
    serde_json::from_str(text.trim_end()).map_err(|e| PayloadError::Malformed(e.to_string()))
}

/// Dispatch one request.  Returns the response and, for an accepted
/// write, the ticket to apply once the response is on the wire.
pub fn handle_request(gatt: &GattService, request: &BridgeRequest) -> (BridgeResponse, Option<u64>) {
    match request {
        BridgeRequest::Write {
            characteristic,
            value,
        } => {
            let Some(uuid) = parse_uuid(characteristic) else {
                return (BridgeResponse::error(AttError::AttributeNotFound), None);
            };
            match gatt.on_write(uuid, value.as_bytes()) {
                Ok(ticket) => (BridgeResponse::Ok { value: None }, ticket),
                Err(e) => (BridgeResponse::error(e), None),
            }
        }
        BridgeRequest::Read { characteristic } => {
            let Some(uuid) = parse_uuid(characteristic) else {
                return (BridgeResponse::error(AttError::AttributeNotFound), None);
            };
            match gatt.on_read(uuid) {
                Ok(value) => (BridgeResponse::Ok { value: Some(value) }, None),
                Err(e) => (BridgeResponse::error(e), None),
            }
        }
    }
}

// ── Bridge server ────────────────────────────────────────────

/// Listens on the bridge socket; one thread per connected helper.
/// Drop it to stop.
pub struct BleBridge {
    path: PathBuf,
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl BleBridge {
    pub fn start(path: &Path, gatt: Arc<GattService>) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // A stale socket from a previous run blocks bind.
        match std::fs::remove_file(path) {
            Ok(()) => debug!("BLE: removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        info!("BLE: bridge listening on {}", path.display());

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("ble-bridge".into())
            .spawn(move || Self::accept_loop(&listener, &gatt, &shutdown_clone))?;

        Ok(Self {
            path: path.to_path_buf(),
            handle: Some(handle),
            shutdown,
        })
    }

    fn accept_loop(listener: &UnixListener, gatt: &Arc<GattService>, shutdown: &Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, _)) => {
                    info!("BLE: helper connected");
                    let gatt = Arc::clone(gatt);
                    let shutdown = Arc::clone(shutdown);
                    let spawned = thread::Builder::new()
                        .name("ble-conn".into())
                        .spawn(move || {
                            if let Err(e) = serve_connection(stream, &gatt, &shutdown) {
                                warn!("BLE: connection ended: {}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        error!("BLE: cannot spawn connection thread: {}", e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    error!("BLE: accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        info!("BLE: bridge shutting down");
    }

    /// Stop accepting.  May take up to one poll interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for BleBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serve one helper connection until EOF, error or shutdown.
pub fn serve_connection(
    stream: UnixStream,
    gatt: &GattService,
    shutdown: &AtomicBool,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        if shutdown.load(Ordering::Acquire) {
            return Ok(());
        }
        // Bounded so a helper that never sends a newline cannot grow `line`.
        let budget = (MAX_FRAME_LEN + 1).saturating_sub(line.len()) as u64;
        let read = (&mut reader).take(budget).read_until(b'\n', &mut line);
        if line.len() > MAX_FRAME_LEN {
            warn!("BLE: frame exceeds {} bytes, dropping connection", MAX_FRAME_LEN);
            writer.write_all(&BridgeResponse::error(AttError::InvalidAttributeValueLength).encode())?;
            return Ok(());
        }
        match read {
            Ok(0) if line.is_empty() => {
                debug!("BLE: helper disconnected");
                return Ok(());
            }
            Ok(_) => {
                // No trailing newline means EOF in the middle of a frame.
                let complete = line.last() == Some(&b'\n');
                process_frame(&line, gatt, &mut writer)?;
                line.clear();
                if !complete {
                    return Ok(());
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }
    }
}

fn process_frame(line: &[u8], gatt: &GattService, writer: &mut UnixStream) -> io::Result<()> {
    let (response, ticket) = match decode_request(line) {
        Ok(request) => handle_request(gatt, &request),
        Err(e) => {
            warn!("BLE: bad bridge frame: {}", e);
            (BridgeResponse::error(AttError::Application), None)
        }
    };
    let sent = writer
        .write_all(&response.encode())
        .and_then(|()| writer.flush());
    // The record is already saved; the apply must run even if the helper
    // hung up before reading the response.
    if let Some(ticket) = ticket {
        gatt.apply(ticket);
    }
    sent
}
