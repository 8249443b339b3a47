//! Captive portal HTTP intake.
//!
//! Implements [`CredentialIntake`] for the access-point channel and serves
//! the portal itself on a background thread.
//!
//! | Route               | Method | Response                                   |
//! |---------------------|--------|--------------------------------------------|
//! | `/`                 | GET    | 302 → `/setup` while unprovisioned, else status page |
//! | `/setup`            | GET    | credential form                            |
//! | `/setup/qrcode`     | GET    | PNG of the setup URL, 503 if unavailable   |
//! | `/setup/wifi`       | POST   | 200 / 400 / 409 / 500 / 503                |
//! | `/reset`            | POST   | `{"success": ..., "message": ...}`         |
//! | `/api/status`       | GET    | JSON [`ModeSnapshot`]                      |
//! | anything else       | GET    | 302 → `/setup` while unprovisioned, else 404 |
//!
//! The apply ticket for an accepted submission is queued only after the
//! response has been written to the client.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server};

use super::pages;
use super::shell::QrRenderer;
use super::utils::{decode_form, form_value};
use crate::app::commands::SubmitOutcome;
use crate::app::ports::{CredentialIntake, IntakeGate};
use crate::credentials::Credentials;
use crate::error::ProvisionError;
use crate::events::ProvisioningHandle;
use crate::fsm::context::ModeSnapshot;
use crate::fsm::{BroadcastChannel, ProvisioningMode};

const RECV_POLL: Duration = Duration::from_millis(100);

/// Largest request body read.
const MAX_BODY: u64 = 8 * 1024;

// ───────────────────────────────────────────────────────────────
// Intake
// ───────────────────────────────────────────────────────────────

/// The access-point variant of [`CredentialIntake`].
pub struct HttpIntake {
    gate: IntakeGate,
}

impl HttpIntake {
    pub fn new(gate: IntakeGate) -> Self {
        Self { gate }
    }
}

impl CredentialIntake for HttpIntake {
    fn channel(&self) -> BroadcastChannel {
        BroadcastChannel::Ap
    }

    fn arm(&mut self) {
        info!("HTTP: intake armed");
        self.gate.open();
    }

    fn disarm(&mut self) {
        info!("HTTP: intake disarmed");
        self.gate.close();
    }

    fn is_armed(&self) -> bool {
        self.gate.is_open()
    }
}

// ───────────────────────────────────────────────────────────────
// Request handling
// ───────────────────────────────────────────────────────────────

/// Everything the portal needs to answer a request.
pub struct Portal {
    pub gate: IntakeGate,
    pub handle: ProvisioningHandle,
    pub device_name: String,
    pub setup_url: String,
    pub qr: QrRenderer,
}

/// A rendered response, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub location: Option<&'static str>,
}

impl Reply {
    fn html(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            body: body.into_bytes(),
            location: None,
        }
    }

    fn json(status: u16, value: &impl Serialize) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: serde_json::to_vec(value).unwrap_or_default(),
            location: None,
        }
    }

    fn redirect(location: &'static str) -> Self {
        Self {
            status: 302,
            content_type: "text/plain; charset=utf-8",
            body: format!("See {location}").into_bytes(),
            location: Some(location),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain; charset=utf-8",
            body: b"Not Found".to_vec(),
            location: None,
        }
    }

    fn method_not_allowed() -> Self {
        Self {
            status: 405,
            content_type: "text/plain; charset=utf-8",
            body: b"Method Not Allowed".to_vec(),
            location: None,
        }
    }
}

/// `{ssid, password}` as submitted; absent fields decode as empty.
#[derive(Debug, Default, Deserialize)]
struct WifiForm {
    #[serde(default)]
    ssid: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    success: bool,
    message: &'a str,
}

impl Portal {
    /// Route one request.  Returns the reply and, for an accepted
    /// submission, the ticket to apply once the reply is sent.
    pub fn route(
        &self,
        method: &Method,
        url: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> (Reply, Option<u64>) {
        let path = url.split('?').next().unwrap_or(url);
        let snapshot = self.handle.snapshot();
        let unprovisioned = matches!(snapshot.mode, ProvisioningMode::Unprovisioned { .. });

        match (method, path) {
            (Method::Get, "/") if unprovisioned => (Reply::redirect("/setup"), None),
            (Method::Get, "/") => (
                Reply::html(200, pages::status_page(&self.device_name, &snapshot)),
                None,
            ),
            (Method::Get, "/setup") => (self.setup_form(&snapshot), None),
            (Method::Get, "/setup/qrcode") => (self.qr_code(), None),
            (Method::Post, "/setup/wifi") => self.submit(content_type, body),
            (Method::Post, "/reset") => (self.reset(), None),
            (Method::Get, "/api/status") => (Reply::json(200, &snapshot), None),
            (_, "/" | "/setup" | "/setup/qrcode" | "/setup/wifi" | "/reset" | "/api/status") => {
                (Reply::method_not_allowed(), None)
            }
            (Method::Get, _) if unprovisioned => (Reply::redirect("/setup"), None),
            _ => (Reply::not_found(), None),
        }
    }

    fn setup_form(&self, snapshot: &ModeSnapshot) -> Reply {
        if self.gate.is_open() {
            Reply::html(200, pages::setup_page(&self.device_name, None))
        } else {
            Reply::html(200, pages::status_page(&self.device_name, snapshot))
        }
    }

    fn qr_code(&self) -> Reply {
        match self.qr.render(&self.setup_url) {
            Ok(png) => Reply {
                status: 200,
                content_type: "image/png",
                body: png,
                location: None,
            },
            Err(e) => {
                warn!("HTTP: QR code unavailable: {}", e);
                Reply::html(
                    503,
                    pages::message_page("QR code unavailable", &self.setup_url),
                )
            }
        }
    }

    fn submit(&self, content_type: Option<&str>, body: &[u8]) -> (Reply, Option<u64>) {
        let json = content_type.is_some_and(|ct| ct.starts_with("application/json"));
        let form = if json {
            match serde_json::from_slice::<WifiForm>(body) {
                Ok(form) => form,
                Err(e) => {
                    info!("HTTP: unparseable JSON submission: {}", e);
                    return (
                        self.submit_error(true, 400, "Request body must be {ssid, password}"),
                        None,
                    );
                }
            }
        } else {
            let Some(pairs) = decode_form(body) else {
                info!("HTTP: form submission is not valid UTF-8");
                return (
                    self.submit_error(false, 400, "Network name and password must be valid UTF-8"),
                    None,
                );
            };
            WifiForm {
                ssid: form_value(&pairs, "ssid").unwrap_or_default().to_string(),
                password: form_value(&pairs, "password").unwrap_or_default().to_string(),
            }
        };

        if !self.gate.is_open() {
            info!("HTTP: submission while intake disarmed");
            return (
                self.submit_error(json, 409, "Setup is not accepting credentials"),
                None,
            );
        }

        let credentials = match Credentials::new(form.ssid, form.password) {
            Ok(creds) => creds,
            Err(e) => {
                info!("HTTP: rejected credentials: {}", e);
                return (self.submit_error(json, 400, &e.to_string()), None);
            }
        };

        let network_id = credentials.network_id().to_string();
        match self.handle.submit(credentials, BroadcastChannel::Ap) {
            Ok(SubmitOutcome::Accepted { ticket }) => {
                info!("HTTP: credentials accepted for '{}'", network_id);
                let reply = if json {
                    Reply::json(
                        200,
                        &ApiMessage {
                            success: true,
                            message: "Credentials saved, connecting",
                        },
                    )
                } else {
                    Reply::html(200, pages::confirmation_page(&network_id))
                };
                (reply, Some(ticket))
            }
            Ok(SubmitOutcome::Ignored { mode }) => {
                info!("HTTP: submission ignored in {}", mode);
                (self.submit_error(json, 409, "Setup is already in progress"), None)
            }
            Err(e) => {
                warn!("HTTP: submission failed: {}", e);
                let status = match e {
                    ProvisionError::Validation(_) => 400,
                    ProvisionError::QueueFull => 503,
                    _ => 500,
                };
                (self.submit_error(json, status, "Could not save credentials"), None)
            }
        }
    }

    fn submit_error(&self, json: bool, status: u16, message: &str) -> Reply {
        if json {
            Reply::json(
                status,
                &ApiMessage {
                    success: false,
                    message,
                },
            )
        } else if status == 400 && self.gate.is_open() {
            Reply::html(status, pages::setup_page(&self.device_name, Some(message)))
        } else {
            Reply::html(status, pages::message_page("Setup", message))
        }
    }

    fn reset(&self) -> Reply {
        match self.handle.reset() {
            Ok(outcome) if outcome.record_deleted => Reply::json(
                200,
                &ApiMessage {
                    success: true,
                    message: "Device reset to setup mode",
                },
            ),
            Ok(_) => Reply::json(
                500,
                &ApiMessage {
                    success: false,
                    message: "Setup mode restored but stored credentials could not be deleted",
                },
            ),
            Err(e) => {
                warn!("HTTP: reset failed: {}", e);
                Reply::json(
                    503,
                    &ApiMessage {
                        success: false,
                        message: "Device busy, try again",
                    },
                )
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Server
// ───────────────────────────────────────────────────────────────

/// Portal server thread.  Drop it to stop the server.
pub struct PortalServer {
    addr: Option<SocketAddr>,
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PortalServer {
    pub fn start(bind: &str, portal: Portal) -> io::Result<Self> {
        let server = Server::http(bind)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{e}")))?;
        let addr = server.server_addr().to_ip();
        info!("HTTP: portal listening on {}", bind);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("http-portal".into())
            .spawn(move || Self::run_server(&server, &Arc::new(portal), &shutdown_clone))?;

        Ok(Self {
            addr,
            handle: Some(handle),
            shutdown,
        })
    }

    /// Bound address; useful when started on port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Accept loop.  Each request gets its own thread so a slow `/reset`
    /// does not hold up the status page.
    fn run_server(server: &Server, portal: &Arc<Portal>, shutdown: &AtomicBool) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("HTTP: portal shutting down");
                break;
            }
            match server.recv_timeout(RECV_POLL) {
                Ok(Some(request)) => {
                    let portal = Arc::clone(portal);
                    if let Err(e) = thread::Builder::new()
                        .name("http-request".into())
                        .spawn(move || Self::serve(request, &portal))
                    {
                        error!("HTTP: failed to spawn request thread: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("HTTP: server error: {}", e);
                    break;
                }
            }
        }
    }

    fn serve(mut request: Request, portal: &Portal) {
        let method = request.method().clone();
        let url = request.url().to_string();
        debug!("HTTP: {} {}", method, url);

        let content_type = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Content-Type"))
            .map(|h| h.value.as_str().to_ascii_lowercase());

        let mut body = Vec::new();
        let mut reader = request.as_reader().take(MAX_BODY + 1);
        if let Err(e) = reader.read_to_end(&mut body) {
            warn!("HTTP: failed to read body: {}", e);
            let _ = request.respond(Response::from_string("Bad Request").with_status_code(400));
            return;
        }
        if body.len() as u64 > MAX_BODY {
            let _ = request.respond(Response::from_string("Payload Too Large").with_status_code(413));
            return;
        }

        let (reply, ticket) = portal.route(&method, &url, content_type.as_deref(), &body);
        let status = reply.status;
        let mut response = Response::from_data(reply.body).with_status_code(status);
        if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
            response = response.with_header(h);
        }
        if let Some(location) = reply.location {
            if let Ok(h) = Header::from_bytes(&b"Location"[..], location.as_bytes()) {
                response = response.with_header(h);
            }
        }

        if let Err(e) = request.respond(response) {
            warn!("HTTP: failed to send {} response: {}", status, e);
        }
        if let Some(ticket) = ticket {
            portal.handle.apply(ticket);
        }
    }

    /// Stop the server.  May take up to one poll interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PortalServer {
    fn drop(&mut self) {
        self.stop();
    }
}
