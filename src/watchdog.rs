//! Per-connection inactivity watchdog.
//!
//! The session loop arms the watchdog right before it waits for a frame and
//! disarms it as soon as one arrives, so the deadline only runs while the
//! connection is idle. When the deadline passes, the callback runs on its own
//! task, concurrently with whatever the session loop is doing.
//!
//! Each arm cycle gets its own state cell that moves `Armed -> Fired` (timer
//! task) or `Armed -> Disarmed` (session loop), whichever wins the exchange.
//! That makes firing at-most-once per cycle, and a disarm that loses the race
//! reports [`WatchdogState::Fired`] instead of pretending nothing happened.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

const ARMED: u8 = 0;
const DISARMED: u8 = 1;
const FIRED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Disarmed,
    Armed,
    Fired,
}

struct Cycle {
    state: Arc<AtomicU8>,
    task: JoinHandle<()>,
}

/// Resettable one-shot deadline owned by a single session loop.
///
/// Dropping the watchdog disarms it.
pub struct Watchdog {
    timeout: Duration,
    on_fire: Arc<dyn Fn() + Send + Sync>,
    cycle: Option<Cycle>,
    fired: bool,
}

impl Watchdog {
    /// `on_fire` runs on a spawned task, at most once per arm cycle.
    pub fn new(timeout: Duration, on_fire: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            timeout,
            on_fire: Arc::new(on_fire),
            cycle: None,
            fired: false,
        }
    }

    /// Start a new deadline, cancelling any pending one first.
    pub fn arm(&mut self) {
        self.disarm();

        let state = Arc::new(AtomicU8::new(ARMED));
        let task_state = Arc::clone(&state);
        let on_fire = Arc::clone(&self.on_fire);
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if task_state
                .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                on_fire();
            }
        });

        self.cycle = Some(Cycle { state, task });
        self.fired = false;
    }

    /// Cancel the pending deadline. Idempotent.
    ///
    /// Returns [`WatchdogState::Fired`] if the deadline beat the disarm.
    pub fn disarm(&mut self) -> WatchdogState {
        if let Some(cycle) = self.cycle.take() {
            match cycle.state.compare_exchange(
                ARMED,
                DISARMED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => cycle.task.abort(),
                Err(_) => self.fired = true,
            }
        }
        self.state()
    }

    pub fn state(&self) -> WatchdogState {
        match &self.cycle {
            Some(cycle) => match cycle.state.load(Ordering::Acquire) {
                FIRED => WatchdogState::Fired,
                _ => WatchdogState::Armed,
            },
            None if self.fired => WatchdogState::Fired,
            None => WatchdogState::Disarmed,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
