//! Framekeeper: Main Entry Point
//!
//! Hexagonal architecture with a single provisioning actor.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  PortalServer   BleBridge      FileCredentialStore  ShellRunner│
//! │  (HTTP intake)  (BLE intake)   (CredentialStore)    (Process)  │
//! │  TcpProbe       LogEventSink                                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │       ProvisioningService (actor, main thread)         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Mailbox (bounded) · HealthTicker (delegate-driven)            │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use framekeeper::adapters::ble::{BleIntake, GattService};
use framekeeper::adapters::connectivity::TcpProbe;
use framekeeper::adapters::device_id::read_device_id;
use framekeeper::adapters::file_store::FileCredentialStore;
use framekeeper::adapters::http::{HttpIntake, Portal, PortalServer};
use framekeeper::adapters::log_sink::LogEventSink;
use framekeeper::adapters::shell::{ActionEnv, QrRenderer, ShellRunner};
use framekeeper::app::ports::{CredentialIntake, IntakeGate};
use framekeeper::app::service::{ProvisioningService, ServiceSettings};
use framekeeper::config::{CONFIG_ENV, DaemonConfig};
use framekeeper::events::{Mailbox, ProvisioningHandle};
use framekeeper::fsm::BroadcastChannel;
use framekeeper::scheduler::HealthTicker;

const DEFAULT_CONFIG_PATH: &str = "/etc/framekeeper/config.json";

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Framekeeper v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Config + identity ──────────────────────────────────
    let path = config_path();
    let config = DaemonConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    info!("Config: loaded from {}", path.display());

    let serial = read_device_id(&config.serial_path, &config.serial_prefix);
    info!("Identity: {}", serial);

    // ── 3. Adapters ───────────────────────────────────────────
    let ap_gate = IntakeGate::new();
    let ble_gate = IntakeGate::new();
    let mut intakes: Vec<Box<dyn CredentialIntake>> = Vec::new();
    if config.supports(BroadcastChannel::Ap) {
        intakes.push(Box::new(HttpIntake::new(ap_gate.clone())));
    }
    if config.supports(BroadcastChannel::Ble) {
        intakes.push(Box::new(BleIntake::new(ble_gate.clone())));
    }

    let store = FileCredentialStore::new(config.credentials_path.clone());
    let runner = ShellRunner::new(
        config.commands.clone(),
        ActionEnv {
            device_name: serial.to_string(),
            kiosk_url: config.kiosk_url(&serial),
            ble_socket: config.ble_socket_path.clone(),
        },
    );
    let mut probe = TcpProbe::new(config.connectivity_probe.clone(), config.probe_timeout());
    let mut sink = LogEventSink::new();

    // ── 4. Core ───────────────────────────────────────────────
    let mut service = ProvisioningService::new(store, runner, intakes, ServiceSettings::from(&config))
        .context("building provisioning service")?;
    service.boot(&mut sink);

    let mailbox = Arc::new(Mailbox::new(service.snapshot()));
    let handle = ProvisioningHandle::new(Arc::clone(&mailbox));

    // ── 5. Intake servers ─────────────────────────────────────
    // The portal stays up in every mode: it serves status and reset.
    let _portal = PortalServer::start(
        &config.http_bind,
        Portal {
            gate: ap_gate,
            handle: handle.clone(),
            device_name: serial.to_string(),
            setup_url: config.setup_url.clone(),
            qr: QrRenderer::new(config.commands.render_qr.clone(), config.action_timeout()),
        },
    )
    .with_context(|| format!("starting portal on {}", config.http_bind))?;

    #[cfg(unix)]
    let _bridge = if config.supports(BroadcastChannel::Ble) {
        let gatt = Arc::new(GattService::new(ble_gate, handle.clone(), serial.clone()));
        Some(
            framekeeper::adapters::ble_transport::BleBridge::start(&config.ble_socket_path, gatt)
                .with_context(|| {
                    format!("starting BLE bridge on {}", config.ble_socket_path.display())
                })?,
        )
    } else {
        None
    };

    // ── 6. Watchdog ticker ────────────────────────────────────
    let _ticker = HealthTicker::start(handle, config.health_interval())
        .context("starting health ticker")?;

    // ── 7. Actor loop ─────────────────────────────────────────
    service.run(&mailbox, &mut probe, &mut sink);
    info!("Framekeeper stopped");
    Ok(())
}
