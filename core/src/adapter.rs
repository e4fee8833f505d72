//! One running monitor bound to one platform's page.
//!
//! An adapter arms two timers when it starts: a one-shot that reports the
//! current identity after the warm-up delay, and a repeating timer that
//! reports the unread-message state every poll period. The two streams are
//! independent and may interleave. Nothing an extraction or delivery does
//! can escape a tick; the timers stop only when the adapter is stopped or
//! dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{ConfigError, IdentityConfig, PlatformConfig};
use crate::extract::{extract_identity, extract_message_state};
use crate::platform::{Document, HostBridge};
use crate::protocol::Report;
use crate::report::Reporter;
use crate::scheduler::{Scheduler, TimerHandle, TimerState};

/// Errors from starting an adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no tokio runtime to run adapter timers on")]
    NoRuntime,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Point-in-time view of an adapter, for hosts that display health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterStatus {
    pub platform: String,
    pub running: bool,
    pub identity_timer: TimerState,
    pub message_ticks: u64,
    pub reports_delivered: u64,
    pub reports_dropped: u64,
    pub last_identity_at: Option<DateTime<Local>>,
    pub last_message_at: Option<DateTime<Local>>,
}

// State the timer routines share with the adapter.
struct Monitor {
    platform: String,
    document: Arc<dyn Document>,
    reporter: Reporter,
    message_ticks: AtomicU64,
    last_identity_at: Mutex<Option<DateTime<Local>>>,
    last_message_at: Mutex<Option<DateTime<Local>>>,
}

impl Monitor {
    fn report_identity(&self, config: &IdentityConfig) {
        let extraction = match extract_identity(config, self.document.as_ref()) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!("[{}] identity not reported: {}", self.platform, e);
                return;
            }
        };
        if extraction.is_degraded() {
            warn!(
                "[{}] identity fell back to defaults for {} field(s)",
                self.platform,
                extraction.faults.len()
            );
        }

        if self.reporter.report(&Report::CurrentUser(extraction.value)) {
            *lock(&self.last_identity_at) = Some(Local::now());
        }
    }

    fn report_messages(&self, selectors: &[String]) {
        let tick = self.message_ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let extraction = match extract_message_state(selectors, self.document.as_ref()) {
            Ok(extraction) => extraction,
            Err(e) => {
                debug!("[{}] tick {}: no message report: {}", self.platform, tick, e);
                return;
            }
        };
        debug!(
            "[{}] tick {}: {} unread",
            self.platform,
            tick,
            extraction.value.new_message_count()
        );

        if self.reporter.report(&Report::NewMessage(extraction.value)) {
            *lock(&self.last_message_at) = Some(Local::now());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Adapter {
    monitor: Arc<Monitor>,
    identity_timer: TimerHandle,
    message_timer: TimerHandle,
}

impl Adapter {
    /// Start an adapter on the current tokio runtime.
    pub fn start(
        platform: &str,
        config: &PlatformConfig,
        document: Arc<dyn Document>,
        bridge: Arc<dyn HostBridge>,
    ) -> Result<Self, AdapterError> {
        let scheduler = Scheduler::current().ok_or(AdapterError::NoRuntime)?;
        Self::start_with(&scheduler, platform, config, document, bridge)
    }

    /// Validate `config` and arm both timers on `scheduler`.
    pub fn start_with(
        scheduler: &Scheduler,
        platform: &str,
        config: &PlatformConfig,
        document: Arc<dyn Document>,
        bridge: Arc<dyn HostBridge>,
    ) -> Result<Self, AdapterError> {
        config.validate(platform)?;

        let monitor = Arc::new(Monitor {
            platform: platform.to_string(),
            document,
            reporter: Reporter::new(platform, bridge),
            message_ticks: AtomicU64::new(0),
            last_identity_at: Mutex::new(None),
            last_message_at: Mutex::new(None),
        });

        let identity_timer = {
            let monitor = Arc::clone(&monitor);
            let identity = config.identity_config();
            scheduler.once(
                &format!("{platform}/currentuser"),
                config.warmup(),
                move || monitor.report_identity(&identity),
            )
        };

        let message_timer = {
            let monitor = Arc::clone(&monitor);
            let selectors = config.message_selectors.clone();
            scheduler.every(
                &format!("{platform}/newmessage"),
                config.poll_period(),
                move || monitor.report_messages(&selectors),
            )
        };

        info!(
            "[{}] adapter started ({} selectors, warm-up {:?}, period {:?})",
            platform,
            config.message_selectors.len(),
            config.warmup(),
            config.poll_period()
        );

        Ok(Self {
            monitor,
            identity_timer,
            message_timer,
        })
    }

    pub fn platform(&self) -> &str {
        &self.monitor.platform
    }

    pub fn is_running(&self) -> bool {
        self.message_timer.state() == TimerState::Running
    }

    /// Cancel both timers. Idempotent; dropping the adapter does the same.
    pub fn stop(&self) {
        if self.is_running() {
            info!("[{}] adapter stopping", self.monitor.platform);
        }
        self.identity_timer.cancel();
        self.message_timer.cancel();
    }

    pub fn status(&self) -> AdapterStatus {
        AdapterStatus {
            platform: self.monitor.platform.clone(),
            running: self.is_running(),
            identity_timer: self.identity_timer.state(),
            message_ticks: self.monitor.message_ticks.load(Ordering::Relaxed),
            reports_delivered: self.monitor.reporter.delivered(),
            reports_dropped: self.monitor.reporter.dropped(),
            last_identity_at: *lock(&self.monitor.last_identity_at),
            last_message_at: *lock(&self.monitor.last_message_at),
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
