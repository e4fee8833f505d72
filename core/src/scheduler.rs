//! One-shot and fixed-period timers owned through cancellable handles.
//!
//! Each timer is a task on the tokio runtime the scheduler was created on.
//! The fired routine is run synchronously inside the task; a panic in it is
//! caught and logged so a repeating timer keeps its cadence no matter what
//! the routine does. Dropping a [`TimerHandle`] cancels the timer.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::report::panic_message;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Lifecycle of a timer. One-shots go `Armed` → `Fired`; repeating timers
/// stay `Running` until cancelled. Either kind ends `Stopped` on cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerState {
    Armed = 0,
    Fired = 1,
    Running = 2,
    Stopped = 3,
}

impl TimerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TimerState::Armed,
            1 => TimerState::Fired,
            2 => TimerState::Running,
            _ => TimerState::Stopped,
        }
    }
}

#[derive(Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: TimerState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> TimerState {
        TimerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: TimerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    // A one-shot that already fired keeps reporting `Fired` after cancel.
    fn stop(&self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current != TimerState::Fired as u8).then_some(TimerState::Stopped as u8)
        });
    }
}

/// An armed timer. Cancelled on drop.
pub struct TimerHandle {
    name: String,
    state: SharedState,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TimerState {
        self.state.get()
    }

    pub fn cancel(&self) {
        if !self.task.is_finished() {
            debug!("Cancelling timer '{}'", self.name);
        }
        self.task.abort();
        self.state.stop();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Arms timers on a tokio runtime.
#[derive(Clone)]
pub struct Scheduler {
    runtime: Handle,
}

impl Scheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Scheduler on the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Run `routine` once, `delay` from now.
    pub fn once<F>(&self, name: &str, delay: Duration, routine: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let state = SharedState::new(TimerState::Armed);
        let task_state = state.clone();
        let task_name = name.to_string();

        let task = self.runtime.spawn(async move {
            time::sleep(delay).await;
            task_state.set(TimerState::Fired);
            debug!("Timer '{}' fired", task_name);
            run_guarded(&task_name, routine);
        });

        info!("Armed one-shot timer '{}' ({:?})", name, delay);
        TimerHandle {
            name: name.to_string(),
            state,
            task,
        }
    }

    /// Run `routine` every `period`, first one period from now, until the
    /// handle is cancelled or dropped.
    pub fn every<F>(&self, name: &str, period: Duration, mut routine: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(
                "Timer '{}': period {:?} too short, using {:?}",
                name, period, MIN_PERIOD
            );
            MIN_PERIOD
        } else {
            period
        };

        let state = SharedState::new(TimerState::Running);
        let task_name = name.to_string();

        let task = self.runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                run_guarded(&task_name, &mut routine);
            }
        });

        info!("Started repeating timer '{}' every {:?}", name, period);
        TimerHandle {
            name: name.to_string(),
            state,
            task,
        }
    }
}

fn run_guarded<F: FnOnce()>(name: &str, routine: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(routine)) {
        error!(
            "Timer '{}' routine panicked: {}",
            name,
            panic_message(payload.as_ref())
        );
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
