//! Daemon configuration
//!
//! All tunable parameters for the provisioning daemon.  Loaded from a JSON
//! file named on the command line or by `FRAMEKEEPER_CONFIG`; every field
//! has a default so a partial (or absent) file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fsm::BroadcastChannel;

/// Environment variable naming the config file when no argument is given.
pub const CONFIG_ENV: &str = "FRAMEKEEPER_CONFIG";

/// Core daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    // --- Storage ---
    /// Location of the single credential record
    pub credentials_path: PathBuf,

    // --- Intakes ---
    /// Captive portal listen address
    pub http_bind: String,
    /// URL encoded into the setup QR code
    pub setup_url: String,
    /// Unix socket the GATT helper connects to
    pub ble_socket_path: PathBuf,
    /// Channels this hardware can broadcast on; AP wins when both are listed
    pub supported_channels: Vec<BroadcastChannel>,

    // --- Actions ---
    /// Upper bound for every external action (seconds)
    pub action_timeout_secs: u64,
    pub commands: CommandSet,

    // --- Display watchdog ---
    /// Health check interval while provisioned (seconds)
    pub health_interval_secs: u64,
    /// `host:port` reached with a TCP connect to decide whether we are online
    pub connectivity_probe: String,
    pub probe_timeout_ms: u64,
    /// Consecutive failed probes before a client reconnect is requested
    pub fail_max: u32,
    /// Kiosk URL; `{serial}` is replaced by the device serial
    pub kiosk_url_template: String,

    // --- Identity ---
    pub serial_path: PathBuf,
    pub serial_prefix: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("/var/lib/framekeeper/wifi.json"),

            http_bind: "0.0.0.0:80".into(),
            setup_url: "http://192.168.4.1/setup".into(),
            ble_socket_path: PathBuf::from("/run/framekeeper/ble.sock"),
            supported_channels: vec![BroadcastChannel::Ap, BroadcastChannel::Ble],

            action_timeout_secs: 60,
            commands: CommandSet::default(),

            health_interval_secs: 5,
            connectivity_probe: "8.8.8.8:53".into(),
            probe_timeout_ms: 3000,
            fail_max: 3,
            kiosk_url_template: "https://pixelpaper.com/frame.html?id={serial}".into(),

            serial_path: PathBuf::from("/proc/device-tree/serial-number"),
            serial_prefix: "PX".into(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Config: {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let config: Self = serde_json::from_str(&text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_channels.is_empty() {
            return Err(ConfigError::Invalid("supported_channels is empty"));
        }
        if self.action_timeout_secs == 0 {
            return Err(ConfigError::Invalid("action_timeout_secs must be > 0"));
        }
        if self.health_interval_secs == 0 {
            return Err(ConfigError::Invalid("health_interval_secs must be > 0"));
        }
        if self.fail_max == 0 {
            return Err(ConfigError::Invalid("fail_max must be > 0"));
        }
        self.commands.validate()
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn supports(&self, channel: BroadcastChannel) -> bool {
        self.supported_channels.contains(&channel)
    }

    pub fn kiosk_url(&self, serial: &str) -> String {
        self.kiosk_url_template.replace("{serial}", serial)
    }
}

// ---------------------------------------------------------------------------
// External commands
// ---------------------------------------------------------------------------

/// One argv per external action.  The first element is the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSet {
    pub enable_ap: Vec<String>,
    pub enable_ble: Vec<String>,
    pub disable_broadcast: Vec<String>,
    pub apply_client: Vec<String>,
    pub disable_client: Vec<String>,
    pub launch_display: Vec<String>,
    pub stop_display: Vec<String>,
    pub reconnect_client: Vec<String>,
    /// Receives the setup URL as its last argument and writes a PNG to stdout
    pub render_qr: Vec<String>,
}

fn helper(name: &str) -> Vec<String> {
    vec![format!("/usr/lib/framekeeper/{name}")]
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            enable_ap: helper("enable-ap"),
            enable_ble: helper("enable-ble"),
            disable_broadcast: helper("disable-broadcast"),
            apply_client: helper("apply-client"),
            disable_client: helper("disable-client"),
            launch_display: helper("launch-display"),
            stop_display: helper("stop-display"),
            reconnect_client: helper("reconnect-client"),
            render_qr: ["qrencode", "-t", "PNG", "-o", "-"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl CommandSet {
    fn entries(&self) -> [(&'static str, &Vec<String>); 9] {
        [
            ("enable_ap", &self.enable_ap),
            ("enable_ble", &self.enable_ble),
            ("disable_broadcast", &self.disable_broadcast),
            ("apply_client", &self.apply_client),
            ("disable_client", &self.disable_client),
            ("launch_display", &self.launch_display),
            ("stop_display", &self.stop_display),
            ("reconnect_client", &self.reconnect_client),
            ("render_qr", &self.render_qr),
        ]
    }

    /// An argv may be empty (action not configured) but never contain blanks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, argv) in self.entries() {
            if argv.iter().any(|arg| arg.is_empty()) {
                log::error!("Config: commands.{name} contains an empty argument");
                return Err(ConfigError::Invalid("commands contain an empty argument"));
            }
        }
        Ok(())
    }
}
