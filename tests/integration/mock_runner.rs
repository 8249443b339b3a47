//! Mock adapters for integration tests.
//!
//! Every runner call and store operation lands in a shared log so tests
//! can assert on the full history, even after the service has moved to
//! an actor thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Barrier, Mutex};
use std::time::{Duration, Instant};

use framekeeper::app::events::AppEvent;
use framekeeper::app::ports::{
    Action, ActionOutput, ConnectivityPort, CredentialIntake, CredentialStore, EventSink,
    IntakeGate, ProcessRunner,
};
use framekeeper::app::service::{ProvisioningService, ServiceSettings};
use framekeeper::credentials::Credentials;
use framekeeper::error::{ProcessError, StoreError};
use framekeeper::events::{Mailbox, ProvisioningHandle};
use framekeeper::fsm::BroadcastChannel;
use framekeeper::fsm::context::ModeSnapshot;

// ── Shared record ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Record {
    pub actions: Vec<&'static str>,
    pub timeouts: Vec<Duration>,
    pub applied: Vec<Credentials>,
    pub stored: Option<Credentials>,
    pub saves: usize,
    pub deletes: usize,
}

pub type Shared = Arc<Mutex<Record>>;

pub fn shared() -> Shared {
    Arc::new(Mutex::new(Record::default()))
}

pub fn actions(log: &Shared) -> Vec<&'static str> {
    log.lock().unwrap().actions.clone()
}

pub fn stored(log: &Shared) -> Option<Credentials> {
    log.lock().unwrap().stored.clone()
}

// ── MockRunner ────────────────────────────────────────────────

/// Two-party rendezvous around one action: the runner waits on `entered`
/// when the action starts and on `release` before it returns.
pub struct Pause {
    pub entered: Barrier,
    pub release: Barrier,
}

impl Pause {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        })
    }
}

/// Records every action.  Failures are injected per action name.
pub struct MockRunner {
    log: Shared,
    failures: HashMap<&'static str, ProcessError>,
    pause: Option<(&'static str, Arc<Pause>)>,
}

#[allow(dead_code)]
impl MockRunner {
    pub fn new(log: Shared) -> Self {
        Self {
            log,
            failures: HashMap::new(),
            pause: None,
        }
    }

    /// Block inside `action` until the test releases it.
    pub fn pause_at(mut self, action: &'static str, pause: Arc<Pause>) -> Self {
        self.pause = Some((action, pause));
        self
    }

    pub fn fail(mut self, action: &'static str, error: ProcessError) -> Self {
        self.failures.insert(action, error);
        self
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }
}

impl ProcessRunner for MockRunner {
    fn execute(&mut self, action: &Action, timeout: Duration) -> Result<ActionOutput, ProcessError> {
        {
            let mut log = self.log.lock().unwrap();
            log.actions.push(action.name());
            log.timeouts.push(timeout);
            if let Action::ApplyClientConfig(creds) = action {
                log.applied.push(creds.clone());
            }
        }
        if let Some((name, pause)) = &self.pause {
            if *name == action.name() {
                pause.entered.wait();
                pause.release.wait();
            }
        }
        match self.failures.get(action.name()) {
            Some(e) => Err(e.clone()),
            None => Ok(ActionOutput::default()),
        }
    }
}

// ── MockStore ─────────────────────────────────────────────────

pub struct MockStore {
    log: Shared,
    pub fail_save: bool,
    pub fail_delete: bool,
}

#[allow(dead_code)]
impl MockStore {
    pub fn new(log: Shared) -> Self {
        Self {
            log,
            fail_save: false,
            fail_delete: false,
        }
    }

    pub fn with_record(log: Shared, creds: Credentials) -> Self {
        log.lock().unwrap().stored = Some(creds);
        Self::new(log)
    }
}

impl CredentialStore for MockStore {
    fn load(&self) -> Result<Option<Credentials>, StoreError> {
        Ok(self.log.lock().unwrap().stored.clone())
    }

    fn save(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        if self.fail_save {
            return Err(StoreError::Io {
                op: "write",
                kind: std::io::ErrorKind::PermissionDenied,
            });
        }
        let mut log = self.log.lock().unwrap();
        log.saves += 1;
        log.stored = Some(credentials.clone());
        Ok(())
    }

    fn delete(&mut self) -> Result<(), StoreError> {
        if self.fail_delete {
            return Err(StoreError::Io {
                op: "remove",
                kind: std::io::ErrorKind::PermissionDenied,
            });
        }
        let mut log = self.log.lock().unwrap();
        log.deletes += 1;
        log.stored = None;
        Ok(())
    }
}

// ── Intake, probe, sink ───────────────────────────────────────

pub struct GateIntake {
    channel: BroadcastChannel,
    gate: IntakeGate,
}

impl GateIntake {
    pub fn new(channel: BroadcastChannel, gate: IntakeGate) -> Self {
        Self { channel, gate }
    }
}

impl CredentialIntake for GateIntake {
    fn channel(&self) -> BroadcastChannel {
        self.channel
    }

    fn arm(&mut self) {
        self.gate.open();
    }

    fn disarm(&mut self) {
        self.gate.close();
    }

    fn is_armed(&self) -> bool {
        self.gate.is_open()
    }
}

/// Answers from a script; `true` once the script runs out.
pub struct ScriptedProbe(pub VecDeque<bool>);

impl ScriptedProbe {
    pub fn new(answers: &[bool]) -> Self {
        Self(answers.iter().copied().collect())
    }
}

impl ConnectivityPort for ScriptedProbe {
    fn is_online(&mut self) -> bool {
        self.0.pop_front().unwrap_or(true)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Builders ──────────────────────────────────────────────────

pub type TestService = ProvisioningService<MockStore, MockRunner>;

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        action_timeout: Duration::from_secs(60),
        fail_max: 3,
    }
}

pub fn service_with(
    store: MockStore,
    runner: MockRunner,
    channel: BroadcastChannel,
    gate: IntakeGate,
) -> TestService {
    ProvisioningService::new(
        store,
        runner,
        vec![Box::new(GateIntake::new(channel, gate))],
        settings(),
    )
    .unwrap()
}

// ── Actor harness ─────────────────────────────────────────────

/// A booted service running its mailbox loop on a background thread.
pub struct Actor {
    pub log: Shared,
    pub gate: IntakeGate,
    pub mailbox: Arc<Mailbox>,
    pub handle: ProvisioningHandle,
    thread: Option<std::thread::JoinHandle<TestService>>,
}

#[allow(dead_code)]
impl Actor {
    pub fn start(channel: BroadcastChannel, store: impl FnOnce(Shared) -> MockStore) -> Self {
        Self::start_with(channel, store, MockRunner::new)
    }

    pub fn start_with(
        channel: BroadcastChannel,
        store: impl FnOnce(Shared) -> MockStore,
        runner: impl FnOnce(Shared) -> MockRunner,
    ) -> Self {
        let log = shared();
        let gate = IntakeGate::new();
        let mut svc = service_with(
            store(log.clone()),
            runner(log.clone()),
            channel,
            gate.clone(),
        );
        let mut sink = RecordingSink::default();
        svc.boot(&mut sink);

        let mailbox = Arc::new(Mailbox::new(svc.snapshot()));
        let handle = ProvisioningHandle::new(Arc::clone(&mailbox));
        let thread = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::spawn(move || {
                let mut probe = ScriptedProbe::new(&[]);
                svc.run(&mailbox, &mut probe, &mut sink);
                svc
            })
        };
        Self {
            log,
            gate,
            mailbox,
            handle,
            thread: Some(thread),
        }
    }

    /// Poll the published snapshot until `pred` holds or two seconds pass.
    pub fn wait_for(&self, pred: impl Fn(&ModeSnapshot) -> bool) -> ModeSnapshot {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let snapshot = self.handle.snapshot();
            if pred(&snapshot) || Instant::now() >= deadline {
                return snapshot;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop the loop and hand back the service for inspection.
    pub fn finish(mut self) -> TestService {
        self.handle.shutdown();
        self.thread.take().unwrap().join().unwrap()
    }
}
