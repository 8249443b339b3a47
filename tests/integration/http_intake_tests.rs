//! Captive portal over a real socket.
//!
//! Each test binds the portal to an ephemeral port, speaks raw HTTP/1.1
//! to it and checks both the response and the resulting mode.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use framekeeper::adapters::http::{Portal, PortalServer};
use framekeeper::adapters::shell::QrRenderer;
use framekeeper::credentials::Credentials;
use framekeeper::fsm::{BroadcastChannel, ProvisioningMode};

use crate::mock_runner::{Actor, MockStore, actions, stored};

struct Reply {
    status: u16,
    head: String,
    body: Vec<u8>,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

fn portal(actor: &Actor) -> PortalServer {
    portal_with_qr(actor, QrRenderer::new(Vec::new(), Duration::from_secs(1)))
}

fn portal_with_qr(actor: &Actor, qr: QrRenderer) -> PortalServer {
    PortalServer::start(
        "127.0.0.1:0",
        Portal {
            gate: actor.gate.clone(),
            handle: actor.handle.clone(),
            device_name: "PX00C0FFEE".into(),
            setup_url: "http://192.168.4.1/setup".into(),
            qr,
        },
    )
    .unwrap()
}

fn send(addr: SocketAddr, method: &str, path: &str, content_type: Option<&str>, body: &[u8]) -> Reply {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n",
        body.len()
    );
    if let Some(ct) = content_type {
        head.push_str(&format!("Content-Type: {ct}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    Reply {
        status,
        head,
        body: raw[split + 4..].to_vec(),
    }
}

const FORM: Option<&str> = Some("application/x-www-form-urlencoded");
const JSON: Option<&str> = Some("application/json");

#[test]
fn root_redirects_to_setup_while_unprovisioned() {
    let actor = Actor::start(BroadcastChannel::Ap, MockStore::new);
    let server = portal(&actor);
    let addr = server.local_addr().unwrap();

    let reply = send(addr, "GET", "/", None, b"");
    assert_eq!(reply.status, 302);
    assert!(reply.head.contains("Location: /setup"));

    let reply = send(addr, "GET", "/setup", None, b"");
    assert_eq!(reply.status, 200);
    assert!(reply.text().contains("action=\"/setup/wifi\""));

    drop(server);
    actor.finish();
}

#[test]
fn form_submission_provisions_device() {
    let actor = Actor::start(BroadcastChannel::Ap, MockStore::new);
    let server = portal(&actor);
    let addr = server.local_addr().unwrap();

    let reply = send(
        addr,
        "POST",
        "/setup/wifi",
        FORM,
        b"ssid=HomeNet&password=s3cret%21%21",
    );
    assert_eq!(reply.status, 200);
    assert!(reply.text().contains("HomeNet"));

    let snapshot = actor.wait_for(|s| s.mode == ProvisioningMode::Provisioned);
    assert_eq!(snapshot.mode, ProvisioningMode::Provisioned);
    assert!(snapshot.client_active && !snapshot.broadcast_active);
    assert_eq!(
        stored(&actor.log),
        Some(Credentials::new("HomeNet", "s3cret!!").unwrap())
    );
    assert_eq!(
        actions(&actor.log),
        vec![
            "enable-ap-broadcast",
            "disable-broadcast",
            "apply-client-config",
            "launch-display",
        ]
    );

    drop(server);
    actor.finish();
}

#[test]
fn empty_json_body_is_rejected() {
    let actor = Actor::start(BroadcastChannel::Ap, MockStore::new);
    let server = portal(&actor);
    let addr = server.local_addr().unwrap();

    let reply = send(addr, "POST", "/setup/wifi", JSON, b"{}");
    assert_eq!(reply.status, 400);
    assert_eq!(reply.json()["success"], false);

    let reply = send(
        addr,
        "POST",
        "/setup/wifi",
        JSON,
        br#"{"ssid":"   ","password":"x"}"#,
    );
    assert_eq!(reply.status, 400);

    assert_eq!(stored(&actor.log), None);
    assert!(matches!(
        actor.handle.snapshot().mode,
        ProvisioningMode::Unprovisioned { .. }
    ));

    drop(server);
    let svc = actor.finish();
    assert_eq!(svc.mode(), ProvisioningMode::Unprovisioned {
        channel: BroadcastChannel::Ap
    });
}

#[test]
fn second_submission_conflicts() {
    let actor = Actor::start(BroadcastChannel::Ap, MockStore::new);
    let server = portal(&actor);
    let addr = server.local_addr().unwrap();

    let body = br#"{"ssid":"HomeNet","password":"x"}"#;
    let first = send(addr, "POST", "/setup/wifi", JSON, body);
    assert_eq!(first.status, 200);
    assert_eq!(first.json()["success"], true);

    let second = send(
        addr,
        "POST",
        "/setup/wifi",
        JSON,
        br#"{"ssid":"Other","password":"y"}"#,
    );
    assert_eq!(second.status, 409);

    actor.wait_for(|s| s.mode == ProvisioningMode::Provisioned);
    let record = actor.log.lock().unwrap();
    assert_eq!(record.saves, 1);
    assert_eq!(record.applied.len(), 1);
    drop(record);

    drop(server);
    actor.finish();
}

#[test]
fn reset_while_provisioned_returns_to_setup() {
    let actor = Actor::start(BroadcastChannel::Ap, |log| {
        MockStore::with_record(log, Credentials::new("HomeNet", "x").unwrap())
    });
    let server = portal(&actor);
    let addr = server.local_addr().unwrap();

    let status = send(addr, "GET", "/", None, b"");
    assert_eq!(status.status, 200);
    assert!(status.text().contains("Connected"));

    let reply = send(addr, "POST", "/reset", None, b"");
    assert_eq!(reply.status, 200);
    let json = reply.json();
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Device reset to setup mode");

    assert_eq!(stored(&actor.log), None);
    assert_eq!(
        actor.handle.snapshot().mode,
        ProvisioningMode::Unprovisioned {
            channel: BroadcastChannel::Ap
        }
    );
    assert!(actor.gate.is_open());
    assert_eq!(
        actions(&actor.log),
        vec!["disable-client", "enable-ap-broadcast"]
    );

    drop(server);
    actor.finish();
}

#[test]
fn status_api_and_unknown_routes() {
    let actor = Actor::start(BroadcastChannel::Ap, MockStore::new);
    let server = portal(&actor);
    let addr = server.local_addr().unwrap();

    let reply = send(addr, "GET", "/api/status", None, b"");
    assert_eq!(reply.status, 200);
    let json = reply.json();
    assert_eq!(json["mode"], "unprovisioned");
    assert_eq!(json["broadcast_active"], true);

    let reply = send(addr, "GET", "/hotspot-detect.html", None, b"");
    assert_eq!(reply.status, 302);

    let reply = send(addr, "DELETE", "/setup/wifi", None, b"");
    assert_eq!(reply.status, 405);

    let reply = send(addr, "GET", "/setup/qrcode", None, b"");
    assert_eq!(reply.status, 503);

    drop(server);
    actor.finish();
}

#[cfg(unix)]
#[test]
fn slow_request_does_not_block_status() {
    let actor = Actor::start(BroadcastChannel::Ap, MockStore::new);
    let slow_qr = QrRenderer::new(
        vec!["/bin/sh".into(), "-c".into(), "sleep 2; printf png".into()],
        Duration::from_secs(5),
    );
    let server = portal_with_qr(&actor, slow_qr);
    let addr = server.local_addr().unwrap();

    let qr = thread::spawn(move || send(addr, "GET", "/setup/qrcode", None, b""));
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    let status = send(addr, "GET", "/api/status", None, b"");
    assert_eq!(status.status, 200);
    assert!(started.elapsed() < Duration::from_secs(1));

    let qr = qr.join().unwrap();
    assert_eq!(qr.status, 200);
    assert_eq!(qr.body, b"png");

    drop(server);
    actor.finish();
}
