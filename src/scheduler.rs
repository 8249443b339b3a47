//! Timer/scheduler engine.
//!
//! Drives the display watchdog.  The scheduler notifies a
//! [`SchedulerDelegate`] when schedules fire; the ticker thread implements
//! the delegate to push health checks into the mailbox.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  ┌───────────┐            ┌───────────┐       │
//! │  │ Periodic  │            │ One-Shot  │       │
//! │  │ (watchdog)│            │ (boot)    │       │
//! │  └─────┬─────┘            └─────┬─────┘       │
//! │        ▼                        ▼             │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │           SchedulerDelegate             │  │
//! │  │    (ticker pushes HealthCheck)          │  │
//! │  └────────────────────┬────────────────────┘  │
//! │                       ▼                       │
//! │          ProvisioningService.health_check()   │
//! └───────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ports::{ScheduleFiredKind, SchedulerDelegate};
use crate::error::ProvisionError;
use crate::events::ProvisioningHandle;

// ═══════════════════════════════════════════════════════════════
//  Schedule types
// ═══════════════════════════════════════════════════════════════

/// A single schedule entry.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub label: &'static str,
    pub kind: ScheduleKind,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ScheduleKind {
    /// Fire every `interval`.
    Periodic { interval: Duration },
    /// Fire once after `delay`, then auto-disable.
    OneShot { delay: Duration },
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

const MAX_SCHEDULES: usize = 4;

/// The scheduler engine.
///
/// Decoupled from the mailbox: firing invokes the delegate, so the
/// engine is testable with a recording delegate and a fake clock.
pub struct Scheduler {
    schedules: [Option<ScheduleEntry>; MAX_SCHEDULES],
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    schedule: Schedule,
    /// Time accumulated since the last fire.
    elapsed: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            schedules: [None, None, None, None],
        }
    }

    /// Add a schedule.  Returns the slot index, or `None` if full.
    pub fn add(&mut self, schedule: Schedule) -> Option<usize> {
        let (i, slot) = self
            .schedules
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())?;
        info!("Scheduler: added '{}' at slot {}", schedule.label, i);
        *slot = Some(ScheduleEntry {
            schedule,
            elapsed: Duration::ZERO,
        });
        Some(i)
    }

    pub fn remove(&mut self, slot: usize) {
        if let Some(entry) = self.schedules.get_mut(slot).and_then(Option::take) {
            info!("Scheduler: removed '{}' from slot {}", entry.schedule.label, slot);
        }
    }

    /// Advance every enabled schedule by `elapsed` and notify `delegate`
    /// of each one that fires.
    pub fn tick(&mut self, elapsed: Duration, delegate: &mut dyn SchedulerDelegate) {
        for entry in self.schedules.iter_mut().flatten() {
            if !entry.schedule.enabled {
                continue;
            }
            entry.elapsed += elapsed;

            match entry.schedule.kind {
                ScheduleKind::Periodic { interval } => {
                    if entry.elapsed >= interval {
                        debug!("Scheduler: '{}' periodic fire", entry.schedule.label);
                        delegate.on_schedule_fired(entry.schedule.label, ScheduleFiredKind::Periodic);
                        entry.elapsed = Duration::ZERO;
                    }
                }
                ScheduleKind::OneShot { delay } => {
                    if entry.elapsed >= delay {
                        info!(
                            "Scheduler: '{}' one-shot fired (after {:?})",
                            entry.schedule.label, delay
                        );
                        delegate.on_schedule_fired(entry.schedule.label, ScheduleFiredKind::OneShot);
                        entry.schedule.enabled = false;
                    }
                }
            }
        }
    }

    /// Number of enabled schedules.
    pub fn active_count(&self) -> usize {
        self.schedules
            .iter()
            .flatten()
            .filter(|e| e.schedule.enabled)
            .count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Health ticker
// ═══════════════════════════════════════════════════════════════

/// Granularity of the ticker thread.
const TICK: Duration = Duration::from_millis(250);

/// Pushes a health check for every fire.  Fires while one is still queued
/// coalesce into it; a full queue skips the beat.
struct HealthDelegate {
    handle: ProvisioningHandle,
}

impl SchedulerDelegate for HealthDelegate {
    fn on_schedule_fired(&mut self, label: &str, _kind: ScheduleFiredKind) {
        match self.handle.health_check() {
            Ok(()) => {}
            Err(ProvisionError::QueueFull) => {
                warn!("Scheduler: '{}' skipped, mailbox full", label)
            }
            Err(e) => warn!("Scheduler: '{}' failed: {}", label, e),
        }
    }
}

/// Background thread running a [`Scheduler`] with the watchdog schedules.
/// Drop it to stop.
pub struct HealthTicker {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl HealthTicker {
    /// One check shortly after boot, then one every `interval`.
    pub fn start(handle: ProvisioningHandle, interval: Duration) -> std::io::Result<Self> {
        let mut scheduler = Scheduler::new();
        scheduler.add(Schedule {
            label: "boot-check",
            kind: ScheduleKind::OneShot { delay: TICK },
            enabled: true,
        });
        scheduler.add(Schedule {
            label: "display-watchdog",
            kind: ScheduleKind::Periodic { interval },
            enabled: true,
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let mut delegate = HealthDelegate { handle };
        let thread = thread::Builder::new()
            .name("health-ticker".into())
            .spawn(move || {
                let mut last = Instant::now();
                while !shutdown_clone.load(Ordering::Acquire) {
                    thread::sleep(TICK);
                    let now = Instant::now();
                    scheduler.tick(now - last, &mut delegate);
                    last = now;
                }
                info!("Scheduler: ticker stopped");
            })?;

        Ok(Self {
            handle: Some(thread),
            shutdown,
        })
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HealthTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
