//! The update loop.
//!
//! [`UpdateScheduler`] alternates between two states:
//!
//! - **Idle**: nobody is watching. The loop only services the publisher
//!   (accepting connections) with a bounded wait and never scans.
//! - **Active**: at least one observer is attached. Each iteration
//!   services the publisher, then runs one scan pass if the rate cap
//!   allows it.
//!
//! Everything happens on the calling task. A pass is never interrupted;
//! stopping takes effect at the next iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::engine::{MirrorEngine, PassReport};
use crate::error::FbVncError;
use crate::publish::Publisher;

// ── SchedulerConfig ──────────────────────────────────────────────

/// Timing knobs for [`UpdateScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum time between the starts of two scan passes.
    pub min_interval: Duration,
    /// Bounded wait while no observer is attached.
    pub idle_poll: Duration,
    /// Bounded wait for publisher I/O while active.
    pub service_wait: Duration,
    /// Passes slower than this are logged.
    pub slow_pass: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100), // 10 passes/s max
            idle_poll: Duration::from_millis(100),
            service_wait: Duration::from_millis(100),
            slow_pass: Duration::from_millis(10),
        }
    }
}

// ── Throttle ─────────────────────────────────────────────────────

/// Rate cap: lets an action through at most once per `min_interval`.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    next_due: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_due: None,
        }
    }

    /// Whether an action may run at `now`. A `true` answer arms the next
    /// deadline at `now + min_interval`.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.min_interval);
                true
            }
        }
    }
}

// ── SchedulerState ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No observer attached.
    Idle,
    /// At least one observer attached.
    Active,
}

// ── UpdateScheduler ──────────────────────────────────────────────

pub struct UpdateScheduler {
    config: SchedulerConfig,
    throttle: Throttle,
    state: SchedulerState,
    running: Arc<AtomicBool>,
}

impl UpdateScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let throttle = Throttle::new(config.min_interval);
        Self {
            config,
            throttle,
            state: SchedulerState::Idle,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A cloneable handle that stops the loop when set to `false`.
    ///
    /// Clearing it before [`run`](Self::run) starts makes `run` return
    /// immediately.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the loop to stop after the current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run until [`stop`](Self::stop) is called (or the stop handle is
    /// cleared).
    pub async fn run<F, P>(
        &mut self,
        engine: &mut MirrorEngine<F>,
        publisher: &mut P,
    ) -> Result<(), FbVncError>
    where
        F: FrameSource,
        P: Publisher + ?Sized,
    {
        while self.is_running() {
            self.tick(engine, publisher).await;
        }
        info!("update loop stopped after {} passes", engine.passes());
        Ok(())
    }

    /// One loop iteration. Returns the pass report if a pass ran.
    pub async fn tick<F, P>(
        &mut self,
        engine: &mut MirrorEngine<F>,
        publisher: &mut P,
    ) -> Option<PassReport>
    where
        F: FrameSource,
        P: Publisher + ?Sized,
    {
        self.observe(publisher.has_observers());
        let wait = match self.state {
            SchedulerState::Idle => self.config.idle_poll,
            SchedulerState::Active => self.config.service_wait,
        };
        if let Err(e) = publisher.service_events(engine.mirror(), wait).await {
            warn!("event servicing failed: {e}");
            tokio::time::sleep(wait).await;
        }

        self.observe(publisher.has_observers());
        if self.state == SchedulerState::Idle {
            return None;
        }

        let now = Instant::now();
        if !self.throttle.ready(now) {
            return None;
        }

        match engine.pass(publisher) {
            Ok(report) => {
                if report.elapsed > self.config.slow_pass {
                    warn!("update took {} us", report.elapsed.as_micros());
                }
                Some(report)
            }
            Err(e) => {
                warn!("scan pass skipped: {e}");
                None
            }
        }
    }

    fn observe(&mut self, has_observers: bool) {
        match (self.state, has_observers) {
            (SchedulerState::Idle, true) => {
                info!("observer attached; updates active");
                self.state = SchedulerState::Active;
            }
            (SchedulerState::Active, false) => {
                info!("no observers; idling");
                self.state = SchedulerState::Idle;
            }
            _ => {}
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
