//! Shell process runner.
//!
//! Implements [`ProcessRunner`] by mapping each [`Action`] to the argv
//! configured in [`CommandSet`] and running it with a hard deadline.
//!
//! Values reach the helpers through the environment, never argv:
//!
//! | Variable                    | Set for                  |
//! |-----------------------------|--------------------------|
//! | `FRAMEKEEPER_SSID`          | apply-client-config      |
//! | `FRAMEKEEPER_PASSWORD`      | apply-client-config      |
//! | `FRAMEKEEPER_KIOSK_URL`     | launch-display           |
//! | `FRAMEKEEPER_DEVICE_NAME`   | enable-*-broadcast       |
//! | `FRAMEKEEPER_BLE_SOCKET`    | enable-ble-broadcast     |

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ports::{Action, ActionOutput, ProcessRunner};
use crate::config::CommandSet;
use crate::error::ProcessError;
use crate::fsm::BroadcastChannel;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for pipe readers once the child has exited.  A helper
/// that backgrounds a daemon may leave the pipe open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

// ───────────────────────────────────────────────────────────────
// Raw command execution
// ───────────────────────────────────────────────────────────────

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `argv` to completion or until `timeout`, whichever comes first.
///
/// A non-zero exit is an error.  On timeout the child is killed and reaped.
pub fn run_command(
    argv: &[String],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<CommandOutput, ProcessError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ProcessError::NotConfigured);
    };

    let mut child = Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            warn!("Runner: cannot start {}: {}", program, e);
            ProcessError::Spawn(e.kind())
        })?;
    debug!("Runner: started {} (pid {})", program, child.id());

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                warn!("Runner: {} exceeded {:?}, killing", program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Timeout { after: timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Spawn(e.kind()));
            }
        }
    };

    let stdout = collect(&stdout);
    let stderr = collect(&stderr);
    if status.success() {
        Ok(CommandOutput {
            exit_code: 0,
            stdout,
            stderr,
        })
    } else {
        Err(ProcessError::Exit {
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

fn collect(rx: &Receiver<Vec<u8>>) -> Vec<u8> {
    rx.recv_timeout(DRAIN_GRACE).unwrap_or_default()
}

// ───────────────────────────────────────────────────────────────
// ShellRunner
// ───────────────────────────────────────────────────────────────

/// Per-device values handed to the helpers.
#[derive(Debug, Clone, Default)]
pub struct ActionEnv {
    pub device_name: String,
    pub kiosk_url: String,
    pub ble_socket: PathBuf,
}

pub struct ShellRunner {
    commands: CommandSet,
    env: ActionEnv,
}

impl ShellRunner {
    pub fn new(commands: CommandSet, env: ActionEnv) -> Self {
        Self { commands, env }
    }

    fn argv(&self, action: &Action) -> &[String] {
        let c = &self.commands;
        match action {
            Action::EnableBroadcast(BroadcastChannel::Ap) => &c.enable_ap,
            Action::EnableBroadcast(BroadcastChannel::Ble) => &c.enable_ble,
            Action::DisableBroadcast => &c.disable_broadcast,
            Action::ApplyClientConfig(_) => &c.apply_client,
            Action::LaunchDisplay => &c.launch_display,
            Action::StopDisplay => &c.stop_display,
            Action::DisableClient => &c.disable_client,
            Action::ReconnectClient => &c.reconnect_client,
        }
    }

    fn envs<'a>(&'a self, action: &'a Action) -> Vec<(&'static str, &'a str)> {
        match action {
            Action::EnableBroadcast(channel) => {
                let mut envs = vec![("FRAMEKEEPER_DEVICE_NAME", self.env.device_name.as_str())];
                if *channel == BroadcastChannel::Ble {
                    if let Some(path) = self.env.ble_socket.to_str() {
                        envs.push(("FRAMEKEEPER_BLE_SOCKET", path));
                    }
                }
                envs
            }
            Action::ApplyClientConfig(creds) => vec![
                ("FRAMEKEEPER_SSID", creds.network_id()),
                ("FRAMEKEEPER_PASSWORD", creds.secret()),
            ],
            Action::LaunchDisplay => vec![("FRAMEKEEPER_KIOSK_URL", self.env.kiosk_url.as_str())],
            _ => Vec::new(),
        }
    }
}

impl ProcessRunner for ShellRunner {
    fn execute(
        &mut self,
        action: &Action,
        timeout: Duration,
    ) -> Result<ActionOutput, ProcessError> {
        let argv = self.argv(action);
        if argv.is_empty() {
            warn!("Runner: no command configured for {}", action.name());
            return Err(ProcessError::NotConfigured);
        }
        info!("Runner: {} -> {}", action.name(), argv[0]);

        let envs = self.envs(action);
        let output = run_command(argv, &envs, timeout)?;
        Ok(ActionOutput {
            exit_code: output.exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ───────────────────────────────────────────────────────────────
// QR renderer
// ───────────────────────────────────────────────────────────────

/// Renders the setup URL to a PNG by running the configured command with
/// the URL appended as its last argument.
#[derive(Debug, Clone)]
pub struct QrRenderer {
    argv: Vec<String>,
    timeout: Duration,
}

impl QrRenderer {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    pub fn render(&self, url: &str) -> Result<Vec<u8>, ProcessError> {
        if self.argv.is_empty() {
            return Err(ProcessError::NotConfigured);
        }
        let mut argv = self.argv.clone();
        argv.push(url.to_string());
        let output = run_command(&argv, &[], self.timeout)?;
        if output.stdout.is_empty() {
            return Err(ProcessError::Exit {
                code: Some(0),
                stderr: "renderer produced no output".into(),
            });
        }
        Ok(output.stdout)
    }
}
