//! BLE bridge over a real Unix socket, standing in for the GATT helper.

use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use framekeeper::adapters::ble::GattService;
use framekeeper::adapters::ble_transport::BleBridge;
use framekeeper::adapters::device_id::device_id;
use framekeeper::credentials::Credentials;
use framekeeper::fsm::{BroadcastChannel, ProvisioningMode};

use crate::mock_runner::{Actor, MockStore, actions, stored};

const CREDS: &str = "12345678-1234-5678-1234-56789abcdef1";
const SERIAL: &str = "12345678-1234-5678-1234-56789abcdef2";

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn socket_path() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("fk-ble-{}-{n}.sock", std::process::id()))
}

struct Helper {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Helper {
    fn connect(path: &PathBuf) -> Self {
        let stream = UnixStream::connect(path).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        Self {
            writer: stream.try_clone().unwrap(),
            reader: BufReader::new(stream),
        }
    }

    fn call(&mut self, frame: &serde_json::Value) -> serde_json::Value {
        let mut line = serde_json::to_vec(frame).unwrap();
        line.push(b'\n');
        self.call_raw(&line)
    }

    fn call_raw(&mut self, line: &[u8]) -> serde_json::Value {
        self.writer.write_all(line).unwrap();
        let mut reply = String::new();
        self.reader.read_line(&mut reply).unwrap();
        serde_json::from_str(&reply).unwrap()
    }
}

fn bridge(actor: &Actor) -> (BleBridge, PathBuf) {
    let path = socket_path();
    let gatt = GattService::new(
        actor.gate.clone(),
        actor.handle.clone(),
        device_id("PX", b"00c0ffee\0"),
    );
    (BleBridge::start(&path, Arc::new(gatt)).unwrap(), path)
}

fn write(value: &str) -> serde_json::Value {
    serde_json::json!({"op": "write", "characteristic": CREDS, "value": value})
}

#[test]
fn credentials_write_provisions_device() {
    let actor = Actor::start(BroadcastChannel::Ble, MockStore::new);
    let (bridge, path) = bridge(&actor);
    let mut helper = Helper::connect(&path);

    let reply = helper.call(&write(r#"{"ssid":"HomeNet","password":"x"}"#));
    assert_eq!(reply, serde_json::json!({"status": "ok"}));

    let snapshot = actor.wait_for(|s| s.mode == ProvisioningMode::Provisioned);
    assert_eq!(snapshot.mode, ProvisioningMode::Provisioned);
    assert!(!snapshot.broadcast_active);
    assert!(snapshot.display_launched);
    assert_eq!(
        stored(&actor.log),
        Some(Credentials::new("HomeNet", "x").unwrap())
    );
    assert_eq!(
        actions(&actor.log),
        vec![
            "enable-ble-broadcast",
            "disable-broadcast",
            "apply-client-config",
            "launch-display",
        ]
    );

    // The gate closed with the broadcast.
    let reply = helper.call(&write(r#"{"ssid":"Other","password":"y"}"#));
    assert_eq!(reply["code"], 0x03);

    drop(bridge);
    actor.finish();
}

#[test]
fn helper_hangup_after_write_still_provisions() {
    let actor = Actor::start(BroadcastChannel::Ble, MockStore::new);
    let (bridge, path) = bridge(&actor);

    let mut stream = UnixStream::connect(&path).unwrap();
    let mut line = serde_json::to_vec(&write(r#"{"ssid":"HomeNet","password":"x"}"#)).unwrap();
    line.push(b'\n');
    stream.write_all(&line).unwrap();
    stream.shutdown(Shutdown::Both).unwrap();
    drop(stream);

    let snapshot = actor.wait_for(|s| s.mode == ProvisioningMode::Provisioned);
    assert_eq!(snapshot.mode, ProvisioningMode::Provisioned);
    assert_eq!(snapshot.last_failure, None);
    assert_eq!(
        actions(&actor.log),
        vec![
            "enable-ble-broadcast",
            "disable-broadcast",
            "apply-client-config",
            "launch-display",
        ]
    );

    drop(bridge);
    actor.finish();
}

#[test]
fn unterminated_stream_is_cut_off() {
    let actor = Actor::start(BroadcastChannel::Ble, MockStore::new);
    let (bridge, path) = bridge(&actor);
    let mut helper = Helper::connect(&path);

    let reply = helper.call_raw(&vec![b'x'; 8 * 1024]);
    assert_eq!(reply["code"], 0x0D);

    let mut rest = String::new();
    assert_eq!(helper.reader.read_line(&mut rest).unwrap(), 0);
    assert_eq!(stored(&actor.log), None);

    drop(bridge);
    actor.finish();
}

#[test]
fn non_json_write_changes_nothing() {
    let actor = Actor::start(BroadcastChannel::Ble, MockStore::new);
    let (bridge, path) = bridge(&actor);
    let mut helper = Helper::connect(&path);

    let reply = helper.call(&write("HomeNet:x"));
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["code"], 0x80);

    let reply = helper.call(&write(r#"{"ssid":"","password":"x"}"#));
    assert_eq!(reply["code"], 0x13);

    assert_eq!(stored(&actor.log), None);
    assert_eq!(
        actor.handle.snapshot().mode,
        ProvisioningMode::Unprovisioned {
            channel: BroadcastChannel::Ble
        }
    );
    assert_eq!(actions(&actor.log), vec!["enable-ble-broadcast"]);

    drop(bridge);
    actor.finish();
}

#[test]
fn reads_serial_and_mode() {
    let actor = Actor::start(BroadcastChannel::Ble, MockStore::new);
    let (bridge, path) = bridge(&actor);
    let mut helper = Helper::connect(&path);

    let reply = helper.call(&serde_json::json!({"op": "read", "characteristic": SERIAL}));
    assert_eq!(reply, serde_json::json!({"status": "ok", "value": "PX00c0ffee"}));

    let reply = helper.call(&serde_json::json!({"op": "read", "characteristic": CREDS}));
    assert_eq!(reply["value"], "unprovisioned");

    let reply = helper.call(&serde_json::json!({"op": "write", "characteristic": SERIAL, "value": "x"}));
    assert_eq!(reply["code"], 0x03);

    drop(bridge);
    actor.finish();
}

#[test]
fn garbage_frame_keeps_connection_open() {
    let actor = Actor::start(BroadcastChannel::Ble, MockStore::new);
    let (bridge, path) = bridge(&actor);
    let mut helper = Helper::connect(&path);

    let reply = helper.call_raw(b"not a frame\n");
    assert_eq!(reply["code"], 0x80);

    let reply = helper.call(&serde_json::json!({"op": "read", "characteristic": "bogus"}));
    assert_eq!(reply["code"], 0x0A);

    drop(bridge);
    actor.finish();
}
